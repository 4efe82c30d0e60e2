//! Per-column candidate set
//!
//! The set holds the surviving converters in specificity order together with
//! the type each one last produced. Elimination is monotone: a converter that
//! fails on any observed value never comes back.

use serde::{Deserialize, Serialize};

use super::converters::{is_null_literal, Converter, ConverterList};
use super::DataType;
use crate::error::{ProbeError, Result};

/// Finalized converter for a column.
#[derive(Debug, Clone)]
pub struct TypeInfo {
    pub converter: Converter,
    pub data_type: DataType,
}

/// Auxiliary facts gathered while observing a column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnExtras {
    /// Longest value seen once every converter had been eliminated
    pub max_string_len: Option<usize>,
}

/// Record of a converter being removed (for debugging/explainability)
#[derive(Debug, Clone, PartialEq)]
pub struct EliminationEvidence {
    /// Name of the eliminated converter
    pub converter: String,
    /// The value that defeated it
    pub value: String,
    /// Converter's failure message
    pub reason: String,
    /// Which observation triggered the elimination (0-indexed, nulls excluded)
    pub observation_index: usize,
}

#[derive(Debug, Clone)]
struct Candidate {
    converter: Converter,
    last_type: Option<DataType>,
}

/// Narrows a column's type across successive sampled values.
#[derive(Debug, Clone)]
pub struct TypeCandidateSet {
    /// Column name (for error messages)
    column_name: String,

    /// Surviving candidates, general first
    candidates: Vec<Candidate>,

    /// Skip blank/NULL values and null-wrap the final converter
    sanitize: bool,

    /// Use the wide-character fallback and byte lengths
    wide: bool,

    extras: ColumnExtras,

    elimination_evidence: Vec<EliminationEvidence>,

    /// Non-null values fed so far
    values_observed: usize,

    /// Values skipped by sanitize
    null_count: usize,
}

impl TypeCandidateSet {
    /// Create a set seeded with the built-in converters.
    pub fn new(column_name: impl Into<String>) -> Self {
        Self::with_converters(column_name, ConverterList::builtin())
    }

    /// Create a set seeded with an explicit converter list.
    pub fn with_converters(column_name: impl Into<String>, converters: ConverterList) -> Self {
        let candidates = converters
            .iter()
            .map(|converter| Candidate {
                converter: converter.clone(),
                last_type: None,
            })
            .collect();

        Self {
            column_name: column_name.into(),
            candidates,
            sanitize: true,
            wide: false,
            extras: ColumnExtras::default(),
            elimination_evidence: Vec::new(),
            values_observed: 0,
            null_count: 0,
        }
    }

    pub fn sanitize(mut self, enable: bool) -> Self {
        self.sanitize = enable;
        self
    }

    pub fn wide_strings(mut self, enable: bool) -> Self {
        self.wide = enable;
        self
    }

    /// Feed one value.
    pub fn observe(&mut self, value: &str) {
        let trimmed = value.trim();

        if self.sanitize && is_null_literal(trimmed) {
            self.null_count += 1;
            return;
        }

        let index = self.values_observed;
        let evidence = &mut self.elimination_evidence;
        self.candidates
            .retain_mut(|candidate| match candidate.converter.convert(trimmed) {
                Ok(produced) => {
                    candidate.last_type = produced.data_type();
                    true
                }
                Err(err) => {
                    evidence.push(EliminationEvidence {
                        converter: candidate.converter.name().to_string(),
                        value: trimmed.to_string(),
                        reason: err.reason,
                        observation_index: index,
                    });
                    false
                }
            });

        if self.candidates.is_empty() {
            let len = if self.wide {
                trimmed.len()
            } else {
                trimmed.chars().count()
            };
            let current = self.extras.max_string_len.unwrap_or(0);
            self.extras.max_string_len = Some(current.max(len));
        }

        self.values_observed += 1;
    }

    /// Feed a sequence of values in order. Every value is observed even after
    /// the candidate list runs empty.
    pub fn observe_all<I, S>(&mut self, values: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for value in values {
            self.observe(value.as_ref());
        }
    }

    /// True once a non-null value has been observed.
    pub fn is_fed(&self) -> bool {
        self.values_observed > 0
    }

    /// Most specific surviving converter, or the string fallback.
    pub fn best(&self) -> Result<TypeInfo> {
        if !self.is_fed() {
            return Err(ProbeError::NotFed {
                column: self.column_name.clone(),
            });
        }

        let (converter, data_type) = match self.candidates.last() {
            Some(candidate) => (
                candidate.converter.clone(),
                // A fed survivor has always produced a value; a converter
                // returning Null is typed as the raw string
                candidate.last_type.unwrap_or(DataType::String),
            ),
            None if self.wide => (Converter::wide_string(), DataType::WideString),
            None => (Converter::raw_string(), DataType::String),
        };

        let converter = if self.sanitize {
            Converter::null_safe(converter)
        } else {
            converter
        };

        Ok(TypeInfo {
            converter,
            data_type,
        })
    }

    /// Get column name
    pub fn column_name(&self) -> &str {
        &self.column_name
    }

    /// Names of the surviving converters, general first
    pub fn candidate_names(&self) -> Vec<&str> {
        self.candidates.iter().map(|c| c.converter.name()).collect()
    }

    pub fn candidate_count(&self) -> usize {
        self.candidates.len()
    }

    pub fn extras(&self) -> &ColumnExtras {
        &self.extras
    }

    /// Get elimination evidence
    pub fn elimination_evidence(&self) -> &[EliminationEvidence] {
        &self.elimination_evidence
    }

    pub fn values_observed(&self) -> usize {
        self.values_observed
    }

    /// Get null count
    pub fn null_count(&self) -> usize {
        self.null_count
    }
}
