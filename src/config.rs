//! Configuration loading using Figment
//!
//! Configuration is loaded from:
//! 1. a TOML file (base configuration, optional)
//! 2. Environment variables (prefixed with `LABDAQ_`, nested keys separated by `__`)
//!
//! ```text
//! LABDAQ_LOG_LEVEL=debug
//! LABDAQ_DATABASE__PATH=/data/experiments.db
//! LABDAQ_TIMEOUTS__LINK_TIMEOUT_MS=10000
//! ```
//!
//! ## Example file
//!
//! ```toml
//! log_level = "info"
//!
//! [database]
//! path = "experiments.db"
//!
//! [timeouts]
//! link_timeout_ms = 5000
//! phase_compensation_timeout_ms = 60000
//! sweep_timeout_factor = 6.0
//!
//! [instrument]
//! resource = "GPIB0::17::INSTR"
//! cmu_slot = 3
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppResult, DaqError};

/// Top-level settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Experiment metadata database
    #[serde(default)]
    pub database: DatabaseSettings,
    /// Instrument link timeouts
    #[serde(default)]
    pub timeouts: TimeoutSettings,
    /// Mainframe connection
    #[serde(default)]
    pub instrument: InstrumentSettings,
}

/// Location of the run-metadata database
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseSettings {
    /// Path to the SQLite file
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

/// Timeouts used when waiting for instrument replies
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeoutSettings {
    /// Default wait for one reply line
    #[serde(default = "default_link_timeout_ms")]
    pub link_timeout_ms: u64,
    /// Phase compensation (`ADJ?`) takes around 30 s on the CMU
    #[serde(default = "default_phase_compensation_timeout_ms")]
    pub phase_compensation_timeout_ms: u64,
    /// Multiplier applied to `step_delay * steps` when waiting for a CV sweep
    #[serde(default = "default_sweep_timeout_factor")]
    pub sweep_timeout_factor: f64,
}

/// B1500 mainframe connection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstrumentSettings {
    /// VISA resource string (e.g., "GPIB0::17::INSTR")
    #[serde(default = "default_resource")]
    pub resource: String,
    /// Slot of the B1520A module in the mainframe
    #[serde(default = "default_cmu_slot")]
    pub cmu_slot: u8,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_database_path() -> PathBuf {
    PathBuf::from("experiments.db")
}

fn default_link_timeout_ms() -> u64 {
    5000
}

fn default_phase_compensation_timeout_ms() -> u64 {
    60_000
}

fn default_sweep_timeout_factor() -> f64 {
    6.0
}

fn default_resource() -> String {
    "GPIB0::17::INSTR".to_string()
}

fn default_cmu_slot() -> u8 {
    3
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            database: DatabaseSettings::default(),
            timeouts: TimeoutSettings::default(),
            instrument: InstrumentSettings::default(),
        }
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            link_timeout_ms: default_link_timeout_ms(),
            phase_compensation_timeout_ms: default_phase_compensation_timeout_ms(),
            sweep_timeout_factor: default_sweep_timeout_factor(),
        }
    }
}

impl Default for InstrumentSettings {
    fn default() -> Self {
        Self {
            resource: default_resource(),
            cmu_slot: default_cmu_slot(),
        }
    }
}

impl TimeoutSettings {
    /// Default reply timeout as a [`Duration`]
    pub fn link_timeout(&self) -> Duration {
        Duration::from_millis(self.link_timeout_ms)
    }

    /// Phase compensation timeout as a [`Duration`]
    pub fn phase_compensation_timeout(&self) -> Duration {
        Duration::from_millis(self.phase_compensation_timeout_ms)
    }
}

impl Settings {
    /// Load settings from an optional TOML file and `LABDAQ_` environment variables.
    ///
    /// Missing files are not an error; every field has a default.
    pub fn new(path: Option<&Path>) -> AppResult<Self> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        let settings: Self = figment
            .merge(Env::prefixed("LABDAQ_").split("__"))
            .extract()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate settings after loading
    pub fn validate(&self) -> AppResult<()> {
        const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
        if !LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(DaqError::Configuration(format!(
                "invalid log level '{}'",
                self.log_level
            )));
        }
        if self.timeouts.link_timeout_ms == 0 || self.timeouts.phase_compensation_timeout_ms == 0
        {
            return Err(DaqError::Configuration(
                "timeouts must be greater than zero".to_string(),
            ));
        }
        if !(self.timeouts.sweep_timeout_factor > 0.0) {
            return Err(DaqError::Configuration(format!(
                "sweep_timeout_factor must be positive, got {}",
                self.timeouts.sweep_timeout_factor
            )));
        }
        if self.instrument.resource.trim().is_empty() {
            return Err(DaqError::Configuration(
                "instrument resource string is empty".to_string(),
            ));
        }
        if !(1..=10).contains(&self.instrument.cmu_slot) {
            return Err(DaqError::Configuration(format!(
                "cmu_slot {} is not a mainframe slot (1-10)",
                self.instrument.cmu_slot
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.timeouts.link_timeout(), Duration::from_secs(5));
        assert_eq!(
            settings.timeouts.phase_compensation_timeout(),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "log_level = \"debug\"\n[database]\npath = \"runs.db\"\n[timeouts]\nlink_timeout_ms = 2500\n[instrument]\ncmu_slot = 5"
        )
        .unwrap();

        let settings = Settings::new(Some(file.path())).unwrap();
        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.database.path, PathBuf::from("runs.db"));
        assert_eq!(settings.timeouts.link_timeout_ms, 2500);
        assert_eq!(settings.timeouts.phase_compensation_timeout_ms, 60_000);
        assert_eq!(settings.instrument.cmu_slot, 5);
    }

    #[test]
    fn test_validation_rejects_zero_timeout() {
        let mut settings = Settings::default();
        settings.timeouts.link_timeout_ms = 0;
        assert!(matches!(
            settings.validate(),
            Err(DaqError::Configuration(_))
        ));
    }

    #[test]
    fn test_validation_rejects_bad_slot() {
        let mut settings = Settings::default();
        settings.instrument.cmu_slot = 11;
        assert!(settings.validate().is_err());
    }
}
