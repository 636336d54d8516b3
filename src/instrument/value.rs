//! Typed values carried by parameters and parsed response fields.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An integer or floating point instrument value.
///
/// Enumerated settings travel as their integer code.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Integer, channel number or enum code
    Int(i64),
    /// Floating point quantity
    Float(f64),
}

impl ParamValue {
    /// Numeric value as `f64`.
    pub fn as_f64(&self) -> f64 {
        match *self {
            ParamValue::Int(v) => v as f64,
            ParamValue::Float(v) => v,
        }
    }

    /// Integer value, `None` for floats.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            ParamValue::Int(v) => Some(v),
            ParamValue::Float(_) => None,
        }
    }

    /// Wire representation (`11`, `0.0`, `1e-5`).
    pub fn to_wire(&self) -> String {
        match *self {
            ParamValue::Int(v) => v.to_string(),
            ParamValue::Float(v) => format_float(v),
        }
    }
}

/// Shortest round-trip representation that always carries a decimal point
/// or exponent, e.g. `0.0`, `1.0`, `655.35`, `1e-5`.
pub fn format_float(value: f64) -> String {
    format!("{value:?}")
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire())
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Int(i64::from(v))
    }
}

impl From<u8> for ParamValue {
    fn from(v: u8) -> Self {
        ParamValue::Int(i64::from(v))
    }
}

impl From<u32> for ParamValue {
    fn from(v: u32) -> Self {
        ParamValue::Int(i64::from(v))
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Int(i64::from(v))
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}
