//! Custom error types for the library.
//!
//! This module defines the primary error type, `DaqError`. Using the `thiserror`
//! crate, it gives one consistent error surface for both halves of the crate:
//! the run-metadata schema upgrade and the B1500/B1520A instrument driver.
//!
//! ## Error Hierarchy
//!
//! - **`MalformedDocument`**: a run description that is not valid JSON or lacks
//!   the `interdependencies` entry. Aborts the whole upgrade transaction.
//! - **`InvalidArgument`**: a command or parameter value outside its declared
//!   domain. Always raised before any I/O happens.
//! - **`Timeout`** / **`Link`**: transport-level failures of the instrument link.
//!   Surfaced to the caller, never retried.
//! - **`UnparsableResponse`** / **`ResultFormatMismatch`**: the instrument reply
//!   did not match the expected grammar or tag sequence. No partial value is
//!   ever returned.
//! - **`NotReady`**: an operation was invoked before its configuration sequence
//!   completed.
//! - **`Storage`**, **`Json`**, **`Config`**, **`Io`**: wrapped errors from
//!   `rusqlite`, `serde_json`, `figment` and `std::io`.
//!
//! By using `#[from]`, `DaqError` can be created from the underlying error types
//! with the `?` operator.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the library error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Errors of the metadata store and the instrument drivers.
#[derive(Error, Debug)]
pub enum DaqError {
    /// A run description is not valid JSON or lacks `interdependencies`.
    #[error("Malformed run description: {0}")]
    MalformedDocument(String),

    /// A value was rejected before anything was sent.
    #[error("Invalid argument '{parameter}': {reason}")]
    InvalidArgument {
        /// Offending parameter or argument
        parameter: String,
        /// Why it was rejected
        reason: String,
    },

    /// No reply within the transaction timeout.
    #[error("Instrument did not reply within {0:?}")]
    Timeout(Duration),

    /// Transport failure.
    #[error("Instrument link error: {0}")]
    Link(String),

    /// A reply does not match its grammar.
    #[error("Response for grammar '{grammar}' could not be parsed: {raw:?}")]
    UnparsableResponse {
        /// Grammar the reply was parsed with
        grammar: String,
        /// Reply as received
        raw: String,
    },

    /// Measurement data with unexpected token count or data types.
    #[error("Result format not supported: {0}")]
    ResultFormatMismatch(String),

    /// Operation needs a value or setup that is not there yet.
    #[error("Not ready: {0}")]
    NotReady(String),

    /// No upgrade path to or from the schema version.
    #[error("Unsupported schema version {found}: {reason}")]
    UnsupportedSchemaVersion {
        /// Version found or requested
        found: i64,
        /// Why no upgrade applies
        reason: String,
    },

    /// SQLite failure.
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// JSON (de)serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration loaded but invalid.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Cargo feature needed for the operation is off.
    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),
}

impl DaqError {
    /// Shorthand for an [`DaqError::InvalidArgument`].
    pub fn invalid_argument(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for an [`DaqError::UnparsableResponse`].
    pub fn unparsable(grammar: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::UnparsableResponse {
            grammar: grammar.into(),
            raw: raw.into(),
        }
    }
}

impl From<figment::Error> for DaqError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}
