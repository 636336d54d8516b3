//! Mock instrument link for testing
//!
//! Provides a scripted [`InstrumentLink`] for exercising drivers without
//! hardware. It provides:
//! - Scripted replies, consumed in order by queries
//! - Injected timeouts and transport failures
//! - A log of every instruction sent, for test verification
//!
//! `MockLink` is a cheap handle: clones share the same script and log, so a
//! test can keep one clone while the driver owns another.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::command::Command;
use super::link::InstrumentLink;
use crate::error::{AppResult, DaqError};

#[derive(Debug, Clone)]
enum ScriptedReply {
    Line(String),
    Timeout,
    LinkError(String),
}

#[derive(Debug, Default)]
struct MockState {
    replies: VecDeque<ScriptedReply>,
    sent: Vec<String>,
    fail_next_send: Option<String>,
}

/// Scripted instrument link
///
/// # Example
///
/// ```
/// use labdaq::instrument::MockLink;
///
/// let link = MockLink::new("mock::b1500");
/// link.push_reply("+0,\"No Error.\"");
/// assert!(link.sent().is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct MockLink {
    resource: String,
    state: Arc<Mutex<MockState>>,
}

impl Default for MockLink {
    fn default() -> Self {
        Self::new("mock")
    }
}

impl MockLink {
    /// Create a mock link with an empty script
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue a reply line for the next query
    pub fn push_reply(&self, line: impl Into<String>) {
        self.state()
            .replies
            .push_back(ScriptedReply::Line(line.into()));
    }

    /// Let the next query time out
    pub fn push_timeout(&self) {
        self.state().replies.push_back(ScriptedReply::Timeout);
    }

    /// Let the next query fail at transport level
    pub fn push_link_error(&self, message: impl Into<String>) {
        self.state()
            .replies
            .push_back(ScriptedReply::LinkError(message.into()));
    }

    /// Fail the next fire-and-forget write
    pub fn inject_send_failure(&self, message: impl Into<String>) {
        self.state().fail_next_send = Some(message.into());
    }

    /// Every instruction sent so far, in order
    pub fn sent(&self) -> Vec<String> {
        self.state().sent.clone()
    }

    /// Forget the sent-instruction log
    pub fn clear_log(&self) {
        self.state().sent.clear();
    }

    /// Number of scripted replies not yet consumed
    pub fn pending_replies(&self) -> usize {
        self.state().replies.len()
    }
}

#[async_trait]
impl InstrumentLink for MockLink {
    async fn send(&mut self, command: &Command) -> AppResult<()> {
        let mut state = self.state();
        if let Some(message) = state.fail_next_send.take() {
            return Err(DaqError::Link(message));
        }
        state.sent.push(command.to_string());
        Ok(())
    }

    async fn send_and_receive(
        &mut self,
        command: &Command,
        timeout: Duration,
    ) -> AppResult<String> {
        let mut state = self.state();
        state.sent.push(command.to_string());
        match state.replies.pop_front() {
            Some(ScriptedReply::Line(line)) => Ok(line),
            Some(ScriptedReply::LinkError(message)) => Err(DaqError::Link(message)),
            Some(ScriptedReply::Timeout) | None => Err(DaqError::Timeout(timeout)),
        }
    }

    fn resource(&self) -> &str {
        &self.resource
    }
}
