//! Instrument link abstraction
//!
//! The link is the message-based bus between the driver and the mainframe. It
//! carries one instruction at a time and, for queries, one reply line back.
//! The driver never manages the physical transport; it only picks the timeout
//! for each transaction.
//!
//! The link is a single serial resource. [`SharedLink`] wraps it in an async
//! mutex and [`write`]/[`ask`] hold the lock for the full transaction, so a
//! second command is never issued before the previous reply was consumed.

use async_trait::async_trait;
use log::debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::command::Command;
use crate::error::AppResult;

/// Request/response transport to an instrument.
#[async_trait]
pub trait InstrumentLink: Send {
    /// Send an instruction that produces no reply.
    async fn send(&mut self, command: &Command) -> AppResult<()>;

    /// Send an instruction and wait up to `timeout` for one reply line.
    ///
    /// Returns the reply without line terminator. Fails with
    /// [`crate::error::DaqError::Timeout`] when no reply arrives in time.
    async fn send_and_receive(&mut self, command: &Command, timeout: Duration)
        -> AppResult<String>;

    /// Human readable description of the endpoint.
    fn resource(&self) -> &str;
}

/// Link shared by a mainframe and its modules.
pub type SharedLink = Arc<Mutex<dyn InstrumentLink>>;

/// Wrap a link for shared use.
pub fn shared(link: impl InstrumentLink + 'static) -> SharedLink {
    Arc::new(Mutex::new(link))
}

/// Fire-and-forget write.
pub async fn write(link: &SharedLink, command: &Command) -> AppResult<()> {
    let mut guard = link.lock().await;
    debug!("[{}] write: {}", guard.resource(), command);
    guard.send(command).await
}

/// Write and block for the reply.
pub async fn ask(link: &SharedLink, command: &Command, timeout: Duration) -> AppResult<String> {
    let mut guard = link.lock().await;
    debug!("[{}] ask: {} (timeout {:?})", guard.resource(), command, timeout);
    let response = guard.send_and_receive(command, timeout).await?;
    debug!("[{}] reply: {}", guard.resource(), response);
    Ok(response)
}
