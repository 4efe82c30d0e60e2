//! Elimination-based column type inference
//!
//! Every column starts with an ordered list of candidate converters, from the
//! most general (float) to the most specific (caller-supplied converters).
//! Each sampled value is run through every surviving candidate. A converter
//! that rejects a single value is removed for good.
//!
//! # Example
//!
//! Given a column with values: ["4", "10", "2.5"]
//!
//! - "4" and "10" are accepted by float and integer, rejected by both datetime
//!   converters
//! - "2.5" is rejected by integer
//! - float is the only survivor, so the column is typed as float
//!
//! When every candidate has been eliminated the column falls back to string.

pub mod candidates;
pub mod converters;

pub use candidates::{ColumnExtras, EliminationEvidence, TypeCandidateSet, TypeInfo};
pub use converters::{
    ConversionError, Converter, ConverterList, DATETIME_FORMAT, DATETIME_FRACTION_FORMAT,
    MAX_FRACTION_DIGITS,
};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Type tags produced by converters.
///
/// The set is closed: caller-supplied converters must produce one of these
/// variants through [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// 64-bit signed integer
    Integer,
    /// 64-bit floating point
    Float,
    /// `YYYY-MM-DD HH:MM:SS`
    DateTime,
    /// `YYYY-MM-DD HH:MM:SS.ffffff`
    DateTimeWithFraction,
    /// Fallback when every candidate was eliminated
    String,
    /// Fallback in wide-character mode
    WideString,
}

impl DataType {
    /// Returns true if this type is numeric
    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Integer | DataType::Float)
    }

    /// Returns true if this type is temporal
    pub fn is_temporal(&self) -> bool {
        matches!(self, DataType::DateTime | DataType::DateTimeWithFraction)
    }

    /// Returns true for the two string fallbacks
    pub fn is_textual(&self) -> bool {
        matches!(self, DataType::String | DataType::WideString)
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataType::Integer => write!(f, "integer"),
            DataType::Float => write!(f, "float"),
            DataType::DateTime => write!(f, "datetime"),
            DataType::DateTimeWithFraction => write!(f, "datetime_fraction"),
            DataType::String => write!(f, "string"),
            DataType::WideString => write!(f, "wide_string"),
        }
    }
}

/// A converted field.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Blank or `NULL` field in sanitize mode
    Null,
    Integer(i64),
    Float(f64),
    DateTime(NaiveDateTime),
    DateTimeWithFraction(NaiveDateTime),
    String(String),
    WideString(String),
}

impl Value {
    /// Type tag of this value, `None` for null.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::Integer(_) => Some(DataType::Integer),
            Value::Float(_) => Some(DataType::Float),
            Value::DateTime(_) => Some(DataType::DateTime),
            Value::DateTimeWithFraction(_) => Some(DataType::DateTimeWithFraction),
            Value::String(_) => Some(DataType::String),
            Value::WideString(_) => Some(DataType::WideString),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Value::DateTime(v) | Value::DateTimeWithFraction(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) | Value::WideString(v) => Some(v),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::DateTime(v) => write!(f, "{}", v.format(DATETIME_FORMAT)),
            Value::DateTimeWithFraction(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S%.6f")),
            Value::String(v) | Value::WideString(v) => write!(f, "{}", v),
        }
    }
}
