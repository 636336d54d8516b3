//! Keysight B1500 mainframe.
//!
//! The mainframe owns the link shared by every module plugged into it and
//! the timeouts used for its transactions.

use log::{debug, info};
use std::time::Duration;

use super::constants::ChNr;
use super::message_builder::CommandBuilder;
use crate::config::TimeoutSettings;
use crate::error::AppResult;
use crate::instrument::command::Command;
use crate::instrument::link::{self, SharedLink};

/// Root instrument of a B1500 setup.
#[derive(Clone)]
pub struct KeysightB1500 {
    link: SharedLink,
    timeouts: TimeoutSettings,
}

impl KeysightB1500 {
    /// Mainframe on `link`.
    pub fn new(link: SharedLink, timeouts: TimeoutSettings) -> Self {
        Self { link, timeouts }
    }

    /// The shared link.
    pub fn link(&self) -> &SharedLink {
        &self.link
    }

    /// Configured timeouts.
    pub fn timeouts(&self) -> &TimeoutSettings {
        &self.timeouts
    }

    /// Timeout used when an operation does not pick its own.
    pub fn default_timeout(&self) -> Duration {
        self.timeouts.link_timeout()
    }

    /// Send an instruction without reply.
    pub async fn write(&self, command: &Command) -> AppResult<()> {
        link::write(&self.link, command).await
    }

    /// Query with the default timeout.
    pub async fn ask(&self, command: &Command) -> AppResult<String> {
        self.ask_with_timeout(command, self.default_timeout()).await
    }

    /// Query with an explicit timeout.
    pub async fn ask_with_timeout(&self, command: &Command, timeout: Duration) -> AppResult<String> {
        link::ask(&self.link, command, timeout).await
    }

    /// Oldest entry of the error buffer (`ERRX?`), e.g. `+0,"No Error."`.
    pub async fn error_message(&self) -> AppResult<String> {
        self.ask(&CommandBuilder::new().errx_query()).await
    }

    /// Drain the error buffer (`ERR?`); the reply is discarded.
    pub async fn clear_buffer_of_error_message(&self) -> AppResult<()> {
        let reply = self.ask(&CommandBuilder::new().err_query()).await?;
        debug!("error buffer cleared: {}", reply);
        Ok(())
    }

    /// Enable source/measurement channels (`CN`); all channels when empty.
    pub async fn enable_channels(&self, channels: &[ChNr]) -> AppResult<()> {
        let command = CommandBuilder::new().cn(channels)?;
        self.write(&command).await?;
        info!("channels enabled: {}", command);
        Ok(())
    }
}
