//! Typed row source
//!
//! Opens a delimited text stream, infers one type per column from a sparse
//! sample, then re-reads the whole stream converting every field with the
//! column's finalized converter.
//!
//! # Row errors
//!
//! A row with the wrong number of fields or a field its converter rejects is
//! a row error. What happens next depends on the policy:
//!
//! - continue on error: the row is skipped and the error is written to the
//!   error sink followed by a separator line
//! - fail fast: the error is returned in place of the row and iteration ends
//! - default: the row is dropped and the error is held back. It is returned
//!   when the next good row is about to be produced, and iteration ends. If no
//!   good row follows, the error is dropped.

use std::fmt;
use std::io::{BufReader, Read, Seek, SeekFrom, Write};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{ProbeError, Result};
use crate::sampler::{
    read_line, sample, trim_line_ending, ErrorPolicy, SampleBound, SampleReport, SamplerConfig,
};
use crate::type_inference::{
    ColumnExtras, Converter, ConverterList, DataType, TypeCandidateSet, Value,
};

/// UTF-8 byte-order mark
pub const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// Line written to the error sink after every error record
pub const ERROR_SINK_SEPARATOR: &str = "----";

/// One converted row, fields in header order
pub type Row = Vec<Value>;

/// Options for [`TypedRowSource::open`]
pub struct RowSourceOptions {
    /// Field separator, not escapable (default: ",")
    pub separator: String,
    /// Lines sampled to infer types (default: 1000)
    pub sample_bound: SampleBound,
    /// Converters ranked more specific than the built-ins
    pub extra_converters: Vec<Converter>,
    /// Treat blank and NULL fields as nulls (default: true)
    pub sanitize: bool,
    /// Use the wide-character string fallback (default: false)
    pub wide_strings: bool,
    /// Skip bad rows and log them to `error_sink` (default: false)
    pub continue_on_error: bool,
    /// Return the first bad row's error immediately (default: false)
    pub fail_fast: bool,
    pub error_sink: Option<Box<dyn Write>>,
}

impl Default for RowSourceOptions {
    fn default() -> Self {
        Self {
            separator: ",".to_string(),
            sample_bound: SampleBound::Rows(1000),
            extra_converters: Vec::new(),
            sanitize: true,
            wide_strings: false,
            continue_on_error: false,
            fail_fast: false,
            error_sink: None,
        }
    }
}

impl RowSourceOptions {
    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn sample_bound(mut self, bound: SampleBound) -> Self {
        self.sample_bound = bound;
        self
    }

    pub fn extra_converter(mut self, converter: Converter) -> Self {
        self.extra_converters.push(converter);
        self
    }

    pub fn sanitize(mut self, enable: bool) -> Self {
        self.sanitize = enable;
        self
    }

    pub fn wide_strings(mut self, enable: bool) -> Self {
        self.wide_strings = enable;
        self
    }

    pub fn continue_on_error(mut self, enable: bool) -> Self {
        self.continue_on_error = enable;
        self
    }

    pub fn fail_fast(mut self, enable: bool) -> Self {
        self.fail_fast = enable;
        self
    }

    pub fn error_sink(mut self, sink: impl Write + 'static) -> Self {
        self.error_sink = Some(Box::new(sink));
        self
    }

    fn row_error_policy(&self) -> Result<RowErrorPolicy> {
        if self.separator.is_empty() {
            return Err(ProbeError::invalid_config("separator must not be empty"));
        }
        match (self.continue_on_error, self.fail_fast) {
            (true, true) => Err(ProbeError::invalid_config(
                "continue_on_error and fail_fast are mutually exclusive",
            )),
            (true, false) if self.error_sink.is_none() => Err(ProbeError::MissingErrorSink),
            (true, false) => Ok(RowErrorPolicy::Skip),
            (false, true) => Ok(RowErrorPolicy::FailFast),
            (false, false) => Ok(RowErrorPolicy::Deferred),
        }
    }
}

impl fmt::Debug for RowSourceOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowSourceOptions")
            .field("separator", &self.separator)
            .field("sample_bound", &self.sample_bound)
            .field("extra_converters", &self.extra_converters)
            .field("sanitize", &self.sanitize)
            .field("wide_strings", &self.wide_strings)
            .field("continue_on_error", &self.continue_on_error)
            .field("fail_fast", &self.fail_fast)
            .field("error_sink", &self.error_sink.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowErrorPolicy {
    Deferred,
    FailFast,
    Skip,
}

/// Finalized description of one column
#[derive(Debug, Clone, Serialize)]
pub struct ColumnType {
    pub name: String,
    pub data_type: DataType,
    pub extras: ColumnExtras,
    #[serde(skip)]
    pub converter: Converter,
}

#[derive(Debug)]
struct Column {
    name: String,
    candidates: TypeCandidateSet,
}

/// Delimited text stream exposed as typed rows.
pub struct TypedRowSource<R> {
    stream: R,
    separator: String,
    columns: Vec<Column>,
    has_bom: bool,
    /// Offset of the header line
    data_start: u64,
    policy: RowErrorPolicy,
    error_sink: Option<Box<dyn Write>>,
    probe_report: SampleReport,
}

impl<R: Read + Seek> TypedRowSource<R> {
    /// Read the header and infer column types from a sample of the stream.
    pub fn open(mut stream: R, mut options: RowSourceOptions) -> Result<Self> {
        let policy = options.row_error_policy()?;

        stream
            .seek(SeekFrom::Start(0))
            .map_err(ProbeError::NotSeekable)?;

        let mut prefix = [0u8; 3];
        let has_bom = read_prefix(&mut stream, &mut prefix)? == UTF8_BOM.len() && prefix == UTF8_BOM;
        let data_start = if has_bom { UTF8_BOM.len() as u64 } else { 0 };
        stream.seek(SeekFrom::Start(data_start))?;

        let mut header = Vec::new();
        read_line(&mut BufReader::new(&mut stream), &mut header)?;
        let names: Vec<String> = split_row(trim_line_ending(&header), &options.separator)
            .into_iter()
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();
        if names.is_empty() {
            return Err(ProbeError::invalid_config("stream has no header line"));
        }

        let converters = ConverterList::with_extra(std::mem::take(&mut options.extra_converters));
        let mut columns: Vec<Column> = names
            .into_iter()
            .map(|name| Column {
                candidates: TypeCandidateSet::with_converters(name.clone(), converters.clone())
                    .sanitize(options.sanitize)
                    .wide_strings(options.wide_strings),
                name,
            })
            .collect();
        info!(
            "Opened source with {} columns (bom: {})",
            columns.len(),
            has_bom
        );

        stream.seek(SeekFrom::Start(data_start))?;
        let sampler_config = SamplerConfig {
            skip_header: true,
            bound: options.sample_bound,
            error_policy: ErrorPolicy::Swallow,
        };
        let separator = options.separator.clone();
        let probe_report = sample(&mut stream, &sampler_config, |line| {
            let fields = split_row(line, &separator);
            if fields.len() != columns.len() {
                return Err(ProbeError::SampleWidth {
                    found: fields.len(),
                    expected: columns.len(),
                });
            }
            for (column, field) in columns.iter_mut().zip(&fields) {
                column.candidates.observe(field);
            }
            Ok(())
        })?;
        info!(
            "Probed {} sampled lines ({:?}), {} rejected",
            probe_report.lines, probe_report.strategy, probe_report.swallowed_errors
        );

        Ok(Self {
            stream,
            separator: options.separator,
            columns,
            has_bom,
            data_start,
            policy,
            error_sink: options.error_sink,
            probe_report,
        })
    }

    /// Iterate over every data row, starting from the top of the stream.
    pub fn rows(&mut self) -> Result<Rows<'_, R>> {
        self.stream.seek(SeekFrom::Start(self.data_start))?;
        let mut reader = BufReader::new(&mut self.stream);
        let mut buf = Vec::new();
        read_line(&mut reader, &mut buf)?;

        Ok(Rows {
            reader,
            buf,
            columns: &self.columns,
            separator: &self.separator,
            policy: self.policy,
            error_sink: self.error_sink.as_mut(),
            converters: None,
            line: 1,
            pending: None,
            skipped: 0,
            done: false,
        })
    }
}

impl<R> TypedRowSource<R> {
    /// Column names in header order
    pub fn headers(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Candidate set of the column at `index`
    pub fn candidates(&self, index: usize) -> Option<&TypeCandidateSet> {
        self.columns.get(index).map(|c| &c.candidates)
    }

    /// Finalized type of the column at `index`.
    pub fn column_type(&self, index: usize) -> Result<ColumnType> {
        let column = self
            .columns
            .get(index)
            .ok_or_else(|| ProbeError::invalid_config(format!("no column at index {}", index)))?;
        let best = column.candidates.best()?;
        Ok(ColumnType {
            name: column.name.clone(),
            data_type: best.data_type,
            extras: column.candidates.extras().clone(),
            converter: best.converter,
        })
    }

    /// Finalized types of every column; fails on the first column that was
    /// never fed.
    pub fn schema(&self) -> Result<Vec<ColumnType>> {
        (0..self.columns.len()).map(|i| self.column_type(i)).collect()
    }

    pub fn has_bom(&self) -> bool {
        self.has_bom
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// Outcome of the probing pass
    pub fn probe_report(&self) -> &SampleReport {
        &self.probe_report
    }

    pub fn into_inner(self) -> R {
        self.stream
    }
}

impl<R> fmt::Display for TypedRowSource<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "typeprobe:")?;
        for column in &self.columns {
            match column.candidates.best() {
                Ok(best) => write!(f, "\n  {}: {}", column.name, best.data_type)?,
                Err(_) => write!(f, "\n  {}: <not fed>", column.name)?,
            }
        }
        Ok(())
    }
}

impl<R> fmt::Debug for TypedRowSource<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedRowSource")
            .field("columns", &self.columns)
            .field("separator", &self.separator)
            .field("has_bom", &self.has_bom)
            .field("policy", &self.policy)
            .field("probe_report", &self.probe_report)
            .finish()
    }
}

/// Lazy iterator over converted rows, see [`TypedRowSource::rows`].
pub struct Rows<'a, R> {
    reader: BufReader<&'a mut R>,
    buf: Vec<u8>,
    columns: &'a [Column],
    separator: &'a str,
    policy: RowErrorPolicy,
    error_sink: Option<&'a mut Box<dyn Write>>,
    converters: Option<Vec<Converter>>,
    /// Line number of the last line read (header is 1)
    line: u64,
    pending: Option<ProbeError>,
    skipped: usize,
    done: bool,
}

impl<'a, R: Read> Rows<'a, R> {
    /// Rows skipped under continue-on-error so far
    pub fn skipped_rows(&self) -> usize {
        self.skipped
    }

    fn convert_line(&mut self) -> Result<Row> {
        if self.converters.is_none() {
            let converters = self
                .columns
                .iter()
                .map(|c| c.candidates.best().map(|best| best.converter))
                .collect::<Result<Vec<_>>>()?;
            self.converters = Some(converters);
        }
        let converters = self.converters.as_deref().unwrap_or_default();

        let fields = split_row(trim_line_ending(&self.buf), self.separator);
        if fields.len() != self.columns.len() {
            return Err(ProbeError::RowWidth {
                line: self.line,
                found: fields.len(),
                expected: self.columns.len(),
            });
        }

        fields
            .iter()
            .zip(converters)
            .zip(self.columns)
            .map(|((field, converter), column)| {
                converter
                    .convert(field)
                    .map_err(|source| ProbeError::Conversion {
                        line: self.line,
                        column: column.name.clone(),
                        source,
                    })
            })
            .collect()
    }

    fn log_skipped(&mut self, err: &ProbeError) -> Result<()> {
        warn!("Skipping row: {}", err);
        self.skipped += 1;
        if let Some(sink) = self.error_sink.as_mut() {
            writeln!(sink, "{}", err)?;
            writeln!(sink, "{}", ERROR_SINK_SEPARATOR)?;
        }
        Ok(())
    }

    fn fail(&mut self, err: ProbeError) -> Option<Result<Row>> {
        self.done = true;
        Some(Err(err))
    }
}

impl<'a, R: Read> Iterator for Rows<'a, R> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            match read_line(&mut self.reader, &mut self.buf) {
                Ok(0) => {
                    self.done = true;
                    if let Some(err) = self.pending.take() {
                        warn!("Dropping row error at end of stream: {}", err);
                    }
                    return None;
                }
                Ok(_) => self.line += 1,
                Err(e) => return self.fail(e.into()),
            }

            match self.convert_line() {
                Ok(row) => match self.pending.take() {
                    Some(err) => return self.fail(err),
                    None => return Some(Ok(row)),
                },
                Err(err) if err.is_recoverable() => match self.policy {
                    RowErrorPolicy::Skip => {
                        if let Err(e) = self.log_skipped(&err) {
                            return self.fail(e);
                        }
                    }
                    RowErrorPolicy::FailFast => return self.fail(err),
                    RowErrorPolicy::Deferred => {
                        debug!("Deferring row error: {}", err);
                        if self.pending.is_none() {
                            self.pending = Some(err);
                        }
                    }
                },
                Err(err) => return self.fail(err),
            }
        }
    }
}

/// Naively split a line on `separator`. A separator inside a field cannot be
/// escaped and always splits it.
pub fn split_row(line: &[u8], separator: &str) -> Vec<String> {
    String::from_utf8_lossy(line)
        .split(separator)
        .map(str::to_string)
        .collect()
}

/// Read up to `buf.len()` bytes, stopping early only at end of stream.
fn read_prefix<R: Read>(stream: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match stream.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::io::Cursor;
    use std::rc::Rc;

    /// Error sink the test can read back
    #[derive(Clone, Default)]
    struct SharedSink(Rc<RefCell<Vec<u8>>>);

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedSink {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.borrow()).into_owned()
        }
    }

    fn open(data: &str, options: RowSourceOptions) -> TypedRowSource<Cursor<Vec<u8>>> {
        TypedRowSource::open(Cursor::new(data.as_bytes().to_vec()), options).unwrap()
    }

    #[test]
    fn test_rowsplit() {
        assert_eq!(
            split_row(b"foo,bar,mooh,cow", ","),
            vec!["foo", "bar", "mooh", "cow"]
        );
        assert_eq!(split_row(b"foo\\,bar", ","), vec!["foo\\", "bar"]);
        assert_eq!(split_row(b"a::b::c", "::"), vec!["a", "b", "c"]);
        assert_eq!(split_row(b"", ","), vec![""]);
    }

    #[test]
    fn test_singlecol() {
        let data = format!(
            "colname\n{}",
            (0..100).map(|i| i.to_string()).collect::<Vec<_>>().join("\n")
        );
        let mut source = open(&data, RowSourceOptions::default());

        assert_eq!(source.headers(), vec!["colname"]);
        assert_eq!(source.column_type(0).unwrap().data_type, DataType::Integer);

        let rows: Vec<Row> = source.rows().unwrap().collect::<Result<_>>().unwrap();
        let every_ninth: Vec<Row> = rows.into_iter().step_by(9).collect();
        let expected: Vec<Row> = (0..100)
            .step_by(9)
            .map(|i| vec![Value::Integer(i)])
            .collect();
        assert_eq!(every_ninth, expected);
        assert_eq!(every_ninth.last(), Some(&vec![Value::Integer(99)]));
    }

    #[test]
    fn test_multicol() {
        let data = format!(
            "isaint,isafloat\n{}",
            (0..100)
                .map(|i| format!("{},{}.{}", i, i, i))
                .collect::<Vec<_>>()
                .join("\n")
        );
        let mut source = open(&data, RowSourceOptions::default());

        assert_eq!(
            source.to_string(),
            "typeprobe:\n  isaint: integer\n  isafloat: float"
        );

        let rows: Vec<Row> = source.rows().unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(rows.len(), 100);
        assert_eq!(rows[17], vec![Value::Integer(17), Value::Float(17.17)]);
        assert_eq!(rows[85], vec![Value::Integer(85), Value::Float(85.85)]);
    }

    #[test]
    fn test_rows_are_restartable() {
        let mut source = open("a\n1\n2\n3\n", RowSourceOptions::default());
        let first: Vec<Row> = source.rows().unwrap().take(2).collect::<Result<_>>().unwrap();
        let second: Vec<Row> = source.rows().unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 3);
        assert_eq!(second[0], vec![Value::Integer(1)]);
    }

    #[test]
    fn test_bom_is_skipped() {
        let mut data = UTF8_BOM.to_vec();
        data.extend_from_slice(b"id;name\n1;alice\n2;bob\n");
        let mut source = TypedRowSource::open(
            Cursor::new(data),
            RowSourceOptions::default().separator(";"),
        )
        .unwrap();

        assert!(source.has_bom());
        assert_eq!(source.headers(), vec!["id", "name"]);
        let rows: Vec<Row> = source.rows().unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(
            rows[1],
            vec![Value::Integer(2), Value::String("bob".to_string())]
        );
    }

    #[test]
    fn test_header_drops_empty_names() {
        let source = open(" a , b ,\n1,2,\n", RowSourceOptions::default());
        assert_eq!(source.headers(), vec!["a", "b"]);
    }

    #[test]
    fn test_crlf_lines() {
        let mut source = open("a,b\r\n1,x\r\n2,y\r\n", RowSourceOptions::default());
        assert_eq!(source.headers(), vec!["a", "b"]);
        let rows: Vec<Row> = source.rows().unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(rows[0], vec![Value::Integer(1), Value::String("x".into())]);
    }

    #[test]
    fn test_nulls_are_converted() {
        let mut source = open("a,b\n1,x\nNULL,\n3,z\n", RowSourceOptions::default());
        let rows: Vec<Row> = source.rows().unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(rows[1], vec![Value::Null, Value::Null]);
        assert_eq!(rows[2], vec![Value::Integer(3), Value::String("z".into())]);
    }

    #[test]
    fn test_continue_requires_sink() {
        let result = TypedRowSource::open(
            Cursor::new(b"a\n1\n".to_vec()),
            RowSourceOptions::default().continue_on_error(true),
        );
        assert!(matches!(result, Err(ProbeError::MissingErrorSink)));
    }

    #[test]
    fn test_empty_separator_rejected() {
        let result = TypedRowSource::open(
            Cursor::new(b"a\n1\n".to_vec()),
            RowSourceOptions::default().separator(""),
        );
        assert!(matches!(result, Err(ProbeError::InvalidConfig(_))));
    }

    #[test]
    fn test_empty_stream_rejected() {
        let result = TypedRowSource::open(Cursor::new(Vec::new()), RowSourceOptions::default());
        assert!(matches!(result, Err(ProbeError::InvalidConfig(_))));
    }

    #[test]
    fn test_header_only_stream() {
        let mut source = open("a,b\n", RowSourceOptions::default());
        assert!(matches!(source.schema(), Err(ProbeError::NotFed { .. })));
        assert_eq!(source.rows().unwrap().count(), 0);
    }

    #[test]
    fn test_continue_on_error_logs_and_skips() {
        let sink = SharedSink::default();
        let mut source = open(
            "a,b\n1,2\n3\n4,5\n",
            RowSourceOptions::default()
                .continue_on_error(true)
                .error_sink(sink.clone()),
        );

        let mut rows = source.rows().unwrap();
        let collected: Vec<Row> = rows.by_ref().collect::<Result<_>>().unwrap();
        assert_eq!(collected.len(), 2);
        assert_eq!(rows.skipped_rows(), 1);

        let logged = sink.contents();
        assert!(logged.contains("Line 3"));
        assert!(logged.ends_with(&format!("{}\n", ERROR_SINK_SEPARATOR)));
    }

    #[test]
    fn test_deferred_error_surfaces_on_next_good_row() {
        // With a bound of 5 the head block is rows 1-4 and the tail is 6, so
        // "foo" is never sampled
        let mut source = open(
            "a\n1\n2\n3\n4\nfoo\n5\n6\n",
            RowSourceOptions::default().sample_bound(SampleBound::Rows(5)),
        );
        assert_eq!(source.column_type(0).unwrap().data_type, DataType::Integer);
        let results: Vec<Result<Row>> = source.rows().unwrap().collect();

        assert_eq!(results.len(), 5);
        assert_eq!(results[0].as_ref().unwrap(), &vec![Value::Integer(1)]);
        assert_eq!(results[3].as_ref().unwrap(), &vec![Value::Integer(4)]);
        match &results[4] {
            Err(ProbeError::Conversion { line, column, .. }) => {
                assert_eq!(*line, 6);
                assert_eq!(column, "a");
            }
            other => panic!("Expected conversion error, got {:?}", other),
        }
    }

    #[test]
    fn test_trailing_bad_row_is_absorbed() {
        let mut source = open("a,b\n1,2\n3,4\n\n", RowSourceOptions::default());
        let results: Vec<Result<Row>> = source.rows().unwrap().collect();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.is_ok()));
    }

    #[test]
    fn test_fail_fast_returns_error_at_bad_row() {
        let mut source = open(
            "a,b\n1,2\n3\n4,5\n",
            RowSourceOptions::default().fail_fast(true),
        );
        let results: Vec<Result<Row>> = source.rows().unwrap().collect();
        assert_eq!(results.len(), 2);
        assert!(matches!(
            results[1],
            Err(ProbeError::RowWidth {
                line: 3,
                found: 1,
                expected: 2
            })
        ));
    }

    #[test]
    fn test_conflicting_policies_rejected() {
        let result = TypedRowSource::open(
            Cursor::new(b"a\n1\n".to_vec()),
            RowSourceOptions::default()
                .continue_on_error(true)
                .fail_fast(true)
                .error_sink(SharedSink::default()),
        );
        assert!(matches!(result, Err(ProbeError::InvalidConfig(_))));
    }

    #[test]
    fn test_bad_sample_row_does_not_abort_probing() {
        let mut source = open("a,b\n1,2\n3\n4,5\n", RowSourceOptions::default());
        assert_eq!(source.probe_report().swallowed_errors, 1);
        assert_eq!(source.column_type(1).unwrap().data_type, DataType::Integer);
        assert!(source.rows().is_ok());
    }
}
