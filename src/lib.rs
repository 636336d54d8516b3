//! Core library for the labdaq application.
//!
//! Two independent parts share one error type and configuration layer:
//!
//! - [`metadata`]: the run-metadata database and its schema upgrades
//! - [`instrument`]: instrument links and the Keysight B1500/B1520A driver
//!
//! The `labdaq` binary wires both to a small command line interface.

pub mod config;
pub mod error;
pub mod instrument;
pub mod logging;
pub mod metadata;
