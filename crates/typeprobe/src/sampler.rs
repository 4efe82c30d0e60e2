//! Sparse file sampler
//!
//! Picks a bounded set of lines spread over a file without reading all of it:
//! a head block, evenly spaced jumps through the middle, and the final line.
//! Streams whose size cannot be measured are sampled from the head only.
//!
//! The sampler works on bytes and hands each line (terminator removed) to a
//! callback. It never looks at field content.

use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};

use tracing::debug;

use crate::error::Result;

/// Smallest head block in sparse mode
const MIN_HEAD_ROWS: usize = 4;

/// First window scanned backward for the last line
const TAIL_WINDOW: u64 = 4096;

/// Tail window doublings before giving up on the last line
const MAX_TAIL_ATTEMPTS: usize = 8;

/// How many lines to sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleBound {
    /// Approximate number of lines
    Rows(usize),
    /// Read every line
    Unbounded,
}

/// What to do when the callback fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Log and keep sampling
    Swallow,
    /// Stop and return the error
    Propagate,
}

/// Configuration for a sampling pass
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Consume and discard the first line
    pub skip_header: bool,

    pub bound: SampleBound,

    pub error_policy: ErrorPolicy,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            skip_header: true,
            bound: SampleBound::Rows(10_000),
            error_policy: ErrorPolicy::Swallow,
        }
    }
}

/// Strategy chosen for a sampling pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleStrategy {
    /// First N lines only
    Head,
    /// Every line
    Full,
    /// Head block, middle jumps, last line
    Sparse,
}

/// Outcome of a sampling pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleReport {
    pub strategy: SampleStrategy,

    /// Lines handed to the callback
    pub lines: usize,

    /// Callback errors dropped under [`ErrorPolicy::Swallow`]
    pub swallowed_errors: usize,
}

impl SampleReport {
    fn new(strategy: SampleStrategy) -> Self {
        Self {
            strategy,
            lines: 0,
            swallowed_errors: 0,
        }
    }
}

/// Sample lines of `stream` starting at its current position.
///
/// Falls back to [`sample_head`] when the bound is [`SampleBound::Unbounded`]
/// or the stream size cannot be measured.
pub fn sample<R, F>(stream: &mut R, config: &SamplerConfig, callback: F) -> Result<SampleReport>
where
    R: Read + Seek,
    F: FnMut(&[u8]) -> Result<()>,
{
    let max_rows = match config.bound {
        SampleBound::Rows(n) => n,
        SampleBound::Unbounded => {
            debug!("Sampling every line");
            return sample_head(BufReader::new(stream), config, callback);
        }
    };

    match measure(stream) {
        Some((origin, end)) if end > origin && max_rows > 0 => {
            debug!(
                "Sparse sampling of ~{} lines over bytes {}..{}",
                max_rows, origin, end
            );
            sample_sparse(stream, config, max_rows, origin, end, callback)
        }
        _ => {
            debug!("Stream size unavailable, sampling first {} lines", max_rows);
            sample_head(BufReader::new(stream), config, callback)
        }
    }
}

/// Sample from the current position of any buffered reader: the first
/// `Rows(n)` lines, or every line when unbounded.
pub fn sample_head<B, F>(mut reader: B, config: &SamplerConfig, mut callback: F) -> Result<SampleReport>
where
    B: BufRead,
    F: FnMut(&[u8]) -> Result<()>,
{
    let (limit, strategy) = match config.bound {
        SampleBound::Rows(n) => (Some(n), SampleStrategy::Head),
        SampleBound::Unbounded => (None, SampleStrategy::Full),
    };
    let mut report = SampleReport::new(strategy);
    let mut buf = Vec::new();

    if config.skip_header {
        read_line(&mut reader, &mut buf)?;
    }

    loop {
        if limit.is_some_and(|limit| report.lines >= limit) {
            break;
        }
        if read_line(&mut reader, &mut buf)? == 0 {
            break;
        }
        deliver(&mut report, config.error_policy, &mut callback, trim_line_ending(&buf))?;
    }

    Ok(report)
}

fn sample_sparse<R, F>(
    stream: &mut R,
    config: &SamplerConfig,
    max_rows: usize,
    origin: u64,
    end: u64,
    mut callback: F,
) -> Result<SampleReport>
where
    R: Read + Seek,
    F: FnMut(&[u8]) -> Result<()>,
{
    let mut report = SampleReport::new(SampleStrategy::Sparse);
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    let mut pos = origin;

    if config.skip_header {
        pos += read_line(&mut reader, &mut buf)? as u64;
    }
    let data_start = pos;

    // Head block
    let head_rows = head_block_rows(max_rows);
    for _ in 0..head_rows {
        let n = read_line(&mut reader, &mut buf)?;
        if n == 0 {
            return Ok(report);
        }
        pos += n as u64;
        deliver(&mut report, config.error_policy, &mut callback, trim_line_ending(&buf))?;
    }

    // End of the last line handed out; everything before it has been seen
    let mut covered_until = pos;

    // Middle jumps, one slot reserved for the last line
    let remaining_rows = max_rows.saturating_sub(report.lines + 1);
    let remaining_size = end.saturating_sub(pos);
    if remaining_rows > 0 && remaining_size > 0 {
        let avg_line_len = (pos - data_start) / head_rows as u64;
        let mut stride = remaining_size / remaining_rows as u64;
        if stride < avg_line_len {
            stride = remaining_size * 3 / 2;
        }
        let stride = stride.max(1);
        debug!(
            "Head block: {} lines, avg {} bytes; stride {} bytes",
            head_rows, avg_line_len, stride
        );

        let mut target = pos;
        while report.lines < max_rows - 1 {
            target += stride;
            if target >= end.saturating_sub(stride) {
                break;
            }

            let seek_to = target.max(covered_until);
            reader.seek(SeekFrom::Start(seek_to))?;

            // Discard the partial line we landed in
            let skipped = read_line(&mut reader, &mut buf)?;
            if skipped == 0 || !buf.ends_with(b"\n") {
                break;
            }
            let line_start = seek_to + skipped as u64;

            let n = read_line(&mut reader, &mut buf)?;
            if n == 0 {
                break;
            }
            let line = trim_line_ending(&buf);
            if line.iter().all(u8::is_ascii_whitespace) {
                debug!("Blank line at byte {}, ending middle sampling", line_start);
                break;
            }
            deliver(&mut report, config.error_policy, &mut callback, line)?;
            covered_until = line_start + n as u64;
        }
    }

    if let Some(line) = tail_line(&mut reader, covered_until, end)? {
        deliver(&mut report, config.error_policy, &mut callback, &line)?;
    }

    Ok(report)
}

/// Last non-blank line starting at or after `lower`, scanning backward from
/// `end` in growing windows.
fn tail_line<R: Read + Seek>(reader: &mut R, lower: u64, end: u64) -> Result<Option<Vec<u8>>> {
    let mut window = TAIL_WINDOW;
    let mut chunk = Vec::new();

    for _ in 0..MAX_TAIL_ATTEMPTS {
        let start = end.saturating_sub(window).max(lower);
        reader.seek(SeekFrom::Start(start))?;
        chunk.clear();
        reader.by_ref().take(end - start).read_to_end(&mut chunk)?;

        let content_end = chunk
            .iter()
            .rposition(|b| *b != b'\n' && *b != b'\r')
            .map(|i| i + 1);

        match content_end {
            None if start == lower => return Ok(None),
            None => {}
            Some(content_end) => match chunk[..content_end].iter().rposition(|b| *b == b'\n') {
                Some(newline) => return Ok(Some(chunk[newline + 1..content_end].to_vec())),
                // `lower` is a line boundary
                None if start == lower => return Ok(Some(chunk[..content_end].to_vec())),
                None => {}
            },
        }

        if start == lower {
            return Ok(None);
        }
        window = window.saturating_mul(2);
    }

    debug!(
        "No line boundary within {} bytes of end, skipping tail sample",
        window / 2
    );
    Ok(None)
}

/// Lines read before the first jump. Small bounds still get a full head
/// block plus the tail line, so the sample may exceed `max_rows`.
fn head_block_rows(max_rows: usize) -> usize {
    if max_rows == MIN_HEAD_ROWS {
        MIN_HEAD_ROWS - 1
    } else {
        MIN_HEAD_ROWS.max(max_rows / 100)
    }
}

fn deliver<F>(report: &mut SampleReport, policy: ErrorPolicy, callback: &mut F, line: &[u8]) -> Result<()>
where
    F: FnMut(&[u8]) -> Result<()>,
{
    report.lines += 1;
    match callback(line) {
        Ok(()) => Ok(()),
        Err(e) if policy == ErrorPolicy::Swallow => {
            debug!("Sampler suppressing callback error: {}", e);
            report.swallowed_errors += 1;
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Returns (current position, end position), restoring the position.
fn measure<R: Seek>(stream: &mut R) -> Option<(u64, u64)> {
    let origin = stream.stream_position().ok()?;
    let end = stream.seek(SeekFrom::End(0)).ok()?;
    stream.seek(SeekFrom::Start(origin)).ok()?;
    Some((origin, end))
}

pub(crate) fn read_line<B: BufRead>(reader: &mut B, buf: &mut Vec<u8>) -> std::io::Result<usize> {
    buf.clear();
    reader.read_until(b'\n', buf)
}

/// Strip a trailing `\n` or `\r\n`.
pub(crate) fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
