//! Candidate converters
//!
//! A converter turns one field into a [`Value`] or rejects it. The built-in
//! list is ordered from general to specific; caller-supplied converters are
//! appended after the built-ins and are therefore the most specific.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use chrono::NaiveDateTime;
use thiserror::Error;

use super::Value;

/// Date-time without fractional seconds
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Date-time with fractional seconds (the `.` is mandatory)
pub const DATETIME_FRACTION_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Longest fraction accepted, microseconds; `%.f` alone would take nanoseconds
pub const MAX_FRACTION_DIGITS: usize = 6;

/// A converter rejected a value.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{converter} cannot convert '{value}': {reason}")]
pub struct ConversionError {
    pub converter: String,
    pub value: String,
    pub reason: String,
}

impl ConversionError {
    pub fn new(converter: impl Into<String>, value: &str, reason: impl fmt::Display) -> Self {
        Self {
            converter: converter.into(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

type ConvertFn = dyn Fn(&str) -> Result<Value, ConversionError> + Send + Sync;

/// Named conversion function, cheap to clone.
#[derive(Clone)]
pub struct Converter {
    name: Cow<'static, str>,
    func: Arc<ConvertFn>,
}

impl Converter {
    /// Wrap a caller-supplied conversion function.
    pub fn new<F>(name: impl Into<Cow<'static, str>>, func: F) -> Self
    where
        F: Fn(&str) -> Result<Value, ConversionError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn convert(&self, value: &str) -> Result<Value, ConversionError> {
        (self.func)(value)
    }

    /// Standard textual float parsing.
    pub fn float() -> Self {
        Self::new("float", |s| {
            s.trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|e| ConversionError::new("float", s, e))
        })
    }

    /// Standard textual integer parsing (64-bit signed).
    pub fn integer() -> Self {
        Self::new("integer", |s| {
            s.trim()
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|e| ConversionError::new("integer", s, e))
        })
    }

    /// `YYYY-MM-DD HH:MM:SS`
    pub fn datetime() -> Self {
        Self::new("datetime", |s| {
            NaiveDateTime::parse_from_str(s.trim(), DATETIME_FORMAT)
                .map(Value::DateTime)
                .map_err(|e| ConversionError::new("datetime", s, e))
        })
    }

    /// `YYYY-MM-DD HH:MM:SS.ffffff`
    pub fn datetime_fraction() -> Self {
        Self::new("datetime_fraction", |s| {
            let trimmed = s.trim();
            // %.f also accepts a missing fraction, which belongs to the plain datetime converter
            let fraction = match trimmed.rsplit_once('.') {
                Some((_, fraction)) => fraction,
                None => {
                    return Err(ConversionError::new(
                        "datetime_fraction",
                        s,
                        "missing fractional seconds",
                    ))
                }
            };
            if fraction.len() > MAX_FRACTION_DIGITS {
                return Err(ConversionError::new(
                    "datetime_fraction",
                    s,
                    format!("more than {} fractional digits", MAX_FRACTION_DIGITS),
                ));
            }
            NaiveDateTime::parse_from_str(trimmed, DATETIME_FRACTION_FORMAT)
                .map(Value::DateTimeWithFraction)
                .map_err(|e| ConversionError::new("datetime_fraction", s, e))
        })
    }

    /// Fallback converter; never fails.
    pub fn raw_string() -> Self {
        Self::new("string", |s| Ok(Value::String(s.to_string())))
    }

    /// Fallback converter in wide-character mode; never fails.
    pub fn wide_string() -> Self {
        Self::new("wide_string", |s| Ok(Value::WideString(s.to_string())))
    }

    /// Map blank and `NULL` (any case) to [`Value::Null`], delegate the rest.
    pub fn null_safe(inner: Converter) -> Self {
        let name = format!("nullsafe_{}", inner.name);
        Self::new(name, move |s| {
            if is_null_literal(s) {
                Ok(Value::Null)
            } else {
                inner.convert(s)
            }
        })
    }
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Converter({})", self.name)
    }
}

/// True for values that sanitize mode treats as null.
pub fn is_null_literal(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null")
}

/// Ordered seed list for a [`TypeCandidateSet`](super::TypeCandidateSet),
/// general first, specific last.
#[derive(Debug, Clone)]
pub struct ConverterList {
    converters: Vec<Converter>,
}

impl ConverterList {
    /// float, integer, datetime, datetime with fraction
    pub fn builtin() -> Self {
        Self {
            converters: vec![
                Converter::float(),
                Converter::integer(),
                Converter::datetime(),
                Converter::datetime_fraction(),
            ],
        }
    }

    /// Built-ins followed by `extra`, which rank as more specific.
    pub fn with_extra(extra: impl IntoIterator<Item = Converter>) -> Self {
        let mut list = Self::builtin();
        list.converters.extend(extra);
        list
    }

    pub fn len(&self) -> usize {
        self.converters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Converter> {
        self.converters.iter()
    }
}

impl Default for ConverterList {
    fn default() -> Self {
        Self::builtin()
    }
}
