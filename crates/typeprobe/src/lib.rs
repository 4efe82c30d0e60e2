//! Typeprobe: column type inference for delimited text files
//!
//! Reads a bounded, spread-out sample of a file, narrows each column down to
//! the most specific type every sampled value converts to, then streams the
//! whole file back as typed rows.
//!
//! ```no_run
//! use std::fs::File;
//! use typeprobe::{RowSourceOptions, TypedRowSource};
//!
//! let file = File::open("data.csv")?;
//! let mut source = TypedRowSource::open(file, RowSourceOptions::default())?;
//! println!("{}", source);
//! for row in source.rows()? {
//!     let row = row?;
//!     println!("{:?}", row);
//! }
//! # Ok::<(), typeprobe::ProbeError>(())
//! ```

pub mod error;
pub mod row_source;
pub mod sampler;
pub mod type_inference;

pub use error::{ProbeError, Result};
pub use row_source::{
    split_row, ColumnType, Row, RowSourceOptions, Rows, TypedRowSource, ERROR_SINK_SEPARATOR,
    UTF8_BOM,
};
pub use sampler::{
    sample, sample_head, ErrorPolicy, SampleBound, SampleReport, SampleStrategy, SamplerConfig,
};
pub use type_inference::{
    ColumnExtras, ConversionError, Converter, ConverterList, DataType, EliminationEvidence,
    TypeCandidateSet, TypeInfo, Value,
};
