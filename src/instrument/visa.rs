//! VISA link for GPIB/USB/Ethernet instruments
//!
//! Provides an [`InstrumentLink`] over the VISA standard using the `visa-rs`
//! crate. VISA calls are blocking, so every transaction runs on Tokio's
//! blocking executor. The session I/O timeout is set to the transaction's
//! timeout before each write/read, so a VISA timeout surfaces as
//! [`DaqError::Timeout`].
//!
//! Supports resource strings like:
//! - "GPIB0::17::INSTR" (GPIB interface, the usual B1500 setup)
//! - "USB0::0x0957::0x0001::SERIAL::INSTR" (USB)
//! - "TCPIP0::192.168.1.100::INSTR" (Ethernet/LXI)
//!
//! Without the `instrument_visa` feature every operation fails with
//! [`DaqError::FeatureNotEnabled`].

use async_trait::async_trait;
use std::io;
use std::time::Duration;

use super::command::Command;
use super::link::InstrumentLink;
use crate::error::{AppResult, DaqError};

#[cfg(feature = "instrument_visa")]
use log::debug;
#[cfg(feature = "instrument_visa")]
use std::sync::{Arc, Mutex};

/// Timeout of instructions that expect no reply.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Extra time the async side waits for the blocking task after the VISA
/// timeout has elapsed.
#[cfg(feature = "instrument_visa")]
const TASK_GRACE: Duration = Duration::from_secs(1);

/// VISA timeout attribute value (ms) for `timeout`, saturating at `u32::MAX`.
#[cfg_attr(not(feature = "instrument_visa"), allow(dead_code))]
fn timeout_millis(timeout: Duration) -> u32 {
    u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX)
}

/// Map an I/O error of the session, reporting VISA timeouts as `Timeout`.
#[cfg_attr(not(feature = "instrument_visa"), allow(dead_code))]
fn map_io_error(err: io::Error, timeout: Duration) -> DaqError {
    match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => DaqError::Timeout(timeout),
        _ => DaqError::Io(err),
    }
}

/// VISA link to one instrument session
pub struct VisaLink {
    /// VISA resource string (e.g., "GPIB0::17::INSTR")
    resource: String,

    /// Line terminator appended to every instruction
    #[cfg_attr(not(feature = "instrument_visa"), allow(dead_code))]
    line_terminator: String,

    /// Session timeout for [`InstrumentLink::send`]
    #[cfg_attr(not(feature = "instrument_visa"), allow(dead_code))]
    write_timeout: Duration,

    #[cfg(feature = "instrument_visa")]
    session: Arc<Mutex<visa_rs::Instrument>>,
}

impl VisaLink {
    /// Open a VISA session
    #[cfg(feature = "instrument_visa")]
    pub fn open(resource: &str) -> AppResult<Self> {
        use std::ffi::CString;
        use visa_rs::prelude::*;

        let rm = DefaultRM::new().map_err(|e| DaqError::Link(e.to_string()))?;
        let c_string = CString::new(resource)
            .map_err(|e| DaqError::invalid_argument("resource", e.to_string()))?;
        let visa_string = visa_rs::VisaString::from(c_string);
        let session = rm
            .open(&visa_string, AccessMode::NO_LOCK, TIMEOUT_IMMEDIATE)
            .map_err(|e| DaqError::Link(format!("failed to open '{resource}': {e}")))?;

        debug!("VISA resource '{}' opened", resource);
        Ok(Self {
            resource: resource.to_string(),
            line_terminator: "\n".to_string(),
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            session: Arc::new(Mutex::new(session)),
        })
    }

    /// Open a VISA session
    #[cfg(not(feature = "instrument_visa"))]
    pub fn open(resource: &str) -> AppResult<Self> {
        let _ = resource;
        Err(DaqError::FeatureNotEnabled("instrument_visa".to_string()))
    }

    /// Set line terminator for instructions
    pub fn with_line_terminator(mut self, terminator: impl Into<String>) -> Self {
        self.line_terminator = terminator.into();
        self
    }

    /// Set the session timeout used for instructions without reply
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Run one write (and optional read) on the blocking executor with the
    /// session timeout set to `timeout`. The session lock is held for the
    /// whole transaction.
    #[cfg(feature = "instrument_visa")]
    async fn transact(
        &self,
        command: &Command,
        timeout: Duration,
        expect_reply: bool,
    ) -> AppResult<String> {
        use std::io::{Read, Write};
        use visa_rs::attribute::AttrTmoValue;
        use visa_rs::prelude::*;

        let payload = format!("{}{}", command, self.line_terminator);
        let session = Arc::clone(&self.session);

        let task = tokio::task::spawn_blocking(move || {
            let mut guard = session
                .lock()
                .map_err(|_| DaqError::Link("VISA session lock poisoned".to_string()))?;

            let attr = AttrTmoValue::new_checked(timeout_millis(timeout)).ok_or_else(|| {
                DaqError::invalid_argument("timeout", format!("{timeout:?} is not a VISA timeout"))
            })?;
            guard
                .set_attr(attr)
                .map_err(|e| DaqError::Link(format!("failed to set VISA timeout: {e}")))?;

            guard
                .write_all(payload.as_bytes())
                .map_err(|e| map_io_error(e, timeout))?;
            guard.flush().map_err(|e| map_io_error(e, timeout))?;
            if !expect_reply {
                return Ok(String::new());
            }

            let mut response = Vec::new();
            let mut buf = [0u8; 1024];
            loop {
                let n = guard.read(&mut buf).map_err(|e| map_io_error(e, timeout))?;
                if n == 0 {
                    break;
                }
                response.extend_from_slice(&buf[..n]);
                if buf[..n].contains(&b'\n') {
                    break;
                }
            }
            Ok::<String, DaqError>(String::from_utf8_lossy(&response).trim().to_string())
        });

        // The VISA timeout bounds the task; the outer wait only guards
        // against a driver that ignores it.
        match tokio::time::timeout(timeout.saturating_add(TASK_GRACE), task).await {
            Ok(joined) => {
                joined.map_err(|e| DaqError::Link(format!("VISA I/O task failed: {e}")))?
            }
            Err(_) => Err(DaqError::Timeout(timeout)),
        }
    }
}

#[async_trait]
impl InstrumentLink for VisaLink {
    #[cfg(feature = "instrument_visa")]
    async fn send(&mut self, command: &Command) -> AppResult<()> {
        self.transact(command, self.write_timeout, false).await?;
        Ok(())
    }

    #[cfg(not(feature = "instrument_visa"))]
    async fn send(&mut self, _command: &Command) -> AppResult<()> {
        Err(DaqError::FeatureNotEnabled("instrument_visa".to_string()))
    }

    #[cfg(feature = "instrument_visa")]
    async fn send_and_receive(
        &mut self,
        command: &Command,
        timeout: Duration,
    ) -> AppResult<String> {
        self.transact(command, timeout, true).await
    }

    #[cfg(not(feature = "instrument_visa"))]
    async fn send_and_receive(
        &mut self,
        _command: &Command,
        _timeout: Duration,
    ) -> AppResult<String> {
        Err(DaqError::FeatureNotEnabled("instrument_visa".to_string()))
    }

    fn resource(&self) -> &str {
        &self.resource
    }
}
