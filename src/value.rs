//! # Value Type System
//!
//! Typed scalar values flowing through the engine: Int, Float, String, Bool.
//! Facts, condition constants, and action values are all `Value`s; the
//! compiler and the VM agree on types through the `DataType` tag.
//!
//! ## Type inference
//!
//! Serialization is untagged, so JSON scalars keep their textual type:
//! `30` is an Int, `30.0` a Float, `"30"` a String, `true` a Bool. The
//! engine never silently widens Int to Float; a comparison between the two
//! yields false.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Scalar data types the engine distinguishes at compile and run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Int,
    Float,
    String,
    Bool,
}

impl DataType {
    /// True for Int and Float.
    pub fn is_numeric(self) -> bool {
        matches!(self, DataType::Int | DataType::Float)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Int => write!(f, "int"),
            DataType::Float => write!(f, "float"),
            DataType::String => write!(f, "string"),
            DataType::Bool => write!(f, "bool"),
        }
    }
}

/// A typed scalar value.
///
/// Variant order matters for untagged deserialization: a JSON number
/// written without a decimal point deserializes as `Int`, one written with
/// a decimal point as `Float`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl Value {
    /// The runtime type tag of this value.
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Bool(_) => DataType::Bool,
            Value::Int(_) => DataType::Int,
            Value::Float(_) => DataType::Float,
            Value::String(_) => DataType::String,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

/// Parse a transport update message of the form `<key>=<literal>`.
///
/// Returns `None` when the message has no `=` or an empty key. Everything
/// after the first `=` is parsed as a literal.
pub fn parse_update(message: &str) -> Option<(String, Value)> {
    let (key, raw) = message.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), parse_literal(raw.trim())))
}

/// Parse a literal per standard syntax: bool, then integer, then float,
/// falling back to a string (surrounding double quotes stripped).
pub fn parse_literal(raw: &str) -> Value {
    match raw {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Value::Int(i);
    }
    if let Ok(x) = raw.parse::<f64>() {
        return Value::Float(x);
    }
    let unquoted = raw
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(raw);
    Value::String(unquoted.to_string())
}
