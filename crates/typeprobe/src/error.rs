//! Error types for typeprobe

use std::io;
use thiserror::Error;

use crate::type_inference::ConversionError;

/// Typeprobe error type
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Stream is not seekable: {0}")]
    NotSeekable(#[source] io::Error),

    #[error("Continue-on-error requires an error sink")]
    MissingErrorSink,

    #[error("Config error: {0}")]
    InvalidConfig(String),

    #[error("Column '{column}' has not been fed with any value")]
    NotFed { column: String },

    #[error("Line {line}: row has {found} columns, header has {expected}")]
    RowWidth {
        line: u64,
        found: usize,
        expected: usize,
    },

    #[error("Sampled row has {found} columns, header has {expected}")]
    SampleWidth { found: usize, expected: usize },

    #[error("Line {line}, column '{column}': {source}")]
    Conversion {
        line: u64,
        column: String,
        #[source]
        source: ConversionError,
    },
}

impl ProbeError {
    /// Row-width and conversion errors are subject to the row error policy;
    /// everything else is fatal.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ProbeError::RowWidth { .. }
                | ProbeError::SampleWidth { .. }
                | ProbeError::Conversion { .. }
        )
    }

    /// Line number (1-based, header is line 1) of a row error
    pub fn line(&self) -> Option<u64> {
        match self {
            ProbeError::RowWidth { line, .. } | ProbeError::Conversion { line, .. } => Some(*line),
            _ => None,
        }
    }

    /// Creates an invalid configuration error with the given message.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ProbeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        let width = ProbeError::RowWidth {
            line: 4,
            found: 1,
            expected: 2,
        };
        assert!(width.is_recoverable());
        assert_eq!(width.line(), Some(4));
        assert!(width.to_string().contains("1 columns"));

        assert!(!ProbeError::MissingErrorSink.is_recoverable());
        assert!(!ProbeError::NotFed { column: "a".into() }.is_recoverable());
        assert_eq!(ProbeError::MissingErrorSink.line(), None);
    }

    #[test]
    fn test_conversion_error_message() {
        let err = ProbeError::Conversion {
            line: 7,
            column: "amount".into(),
            source: ConversionError::new("integer", "abc", "invalid digit found in string"),
        };
        let msg = err.to_string();
        assert!(msg.contains("Line 7"));
        assert!(msg.contains("amount"));
        assert!(msg.contains("abc"));
    }
}
