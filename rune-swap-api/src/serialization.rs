//! Serialization helpers for loosely-shaped upstream responses
//!
//! The quote service represents numeric fields inconsistently, sometimes
//! as JSON numbers and sometimes as strings. These helpers capture that
//! shape verbatim so the boundary parser can validate it explicitly.
use serde::{Deserialize, Serialize};

/// A JSON value that may be either a number or a numeric string
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StringOrNumber {
    /// The value arrived as a JSON number
    Number(f64),
    /// The value arrived as a JSON string
    Text(String),
}

impl StringOrNumber {
    /// Interpret the value as an `f64`, if it parses as one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Interpret the value as a `u64`, if it is a non-negative integer
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Number(n) if n.fract() == 0.0 && *n >= 0.0 => Some(*n as u64),
            Self::Number(_) => None,
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}
