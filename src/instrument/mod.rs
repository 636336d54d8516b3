//! Instrument control
//!
//! Drivers talk to instruments through an [`InstrumentLink`]: a
//! request/response transport that carries formatted [`Command`]s and
//! returns reply lines. [`VisaLink`] is the hardware transport and
//! [`MockLink`] the scripted one used in tests.
//!
//! Driver settings are [`parameter`]s with a cache; the B1500 family lives
//! in [`b1500`].

pub mod b1500;
pub mod command;
pub mod link;
pub mod mock;
pub mod parameter;
pub mod value;
pub mod visa;

pub use command::Command;
pub use link::{InstrumentLink, SharedLink};
pub use mock::MockLink;
pub use parameter::{ParameterRegistry, ParameterState, Validator};
pub use value::ParamValue;
pub use visa::VisaLink;
