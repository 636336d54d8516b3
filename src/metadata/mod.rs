//! Experiment run metadata.
//!
//! Each recorded run keeps a JSON description in the `runs` table of the
//! metadata database. This module owns that document format
//! ([`description`]), the SQLite access to it ([`registry`]) and the schema
//! upgrades that rewrite it ([`upgrade`]).
//!
//! ## Usage
//!
//! ```rust,ignore
//! use labdaq::metadata::{perform_db_upgrade, RunRegistry, LATEST_SCHEMA_VERSION};
//!
//! let registry = RunRegistry::open("experiments.db")?;
//! perform_db_upgrade(&registry, LATEST_SCHEMA_VERSION)?;
//! ```

pub mod description;
pub mod registry;
pub mod upgrade;

pub use description::RunDescription;
pub use registry::RunRegistry;
pub use upgrade::{perform_db_upgrade, upgrade_5_to_6, LATEST_SCHEMA_VERSION};
