//! Keysight B1500 semiconductor parameter analyzer
//!
//! - [`mainframe`]: the `KeysightB1500` root instrument owning the link
//! - [`b1520a`]: the B1520A capacitance measurement unit
//! - [`correction`]: open/short/load correction of the B1520A
//! - [`message_builder`]: FLEX instruction formatting
//! - [`response`]: reply grammars
//! - [`constants`]: enumerated command codes

pub mod b1520a;
pub mod constants;
pub mod correction;
pub mod mainframe;
pub mod message_builder;
pub mod response;

pub use b1520a::{CvSweepSetup, SweepResult, SweepState, B1520A};
pub use correction::{Correction, FrequencyList, ReferenceValues};
pub use mainframe::KeysightB1500;
pub use message_builder::CommandBuilder;
pub use response::{Grammar, ParsedFields};
