//! Logging setup for typeprobe tools.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "typeprobe=info";
const MAX_LOG_FILES: usize = 5;
const MAX_LOG_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Logging configuration.
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    pub app_name: String,
    /// Mirror the file filter on stderr (overrides `quiet`)
    pub verbose: bool,
    /// Only warnings and errors on stderr
    pub quiet: bool,
    /// Log directory; see [`logs_dir`] for the default
    pub log_dir: Option<PathBuf>,
}

impl LogConfig {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            ..Default::default()
        }
    }
}

/// Initialize tracing with a rolling file writer and stderr output.
///
/// Returns the directory the log file lives in. Fails if a global subscriber
/// is already installed.
pub fn init_logging(config: LogConfig) -> Result<PathBuf> {
    let log_dir = match config.log_dir {
        Some(dir) => dir,
        None => logs_dir()?,
    };
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create logs directory: {}", log_dir.display()))?;
    let file_writer = SharedRollingWriter::new(&log_dir, &config.app_name)
        .context("Failed to initialize rolling log writer")?;

    let file_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let console_filter = if config.verbose {
        file_filter.to_string()
    } else if config.quiet {
        "warn".to_string()
    } else {
        file_filter.to_string()
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(EnvFilter::new(console_filter)),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(log_dir)
}

/// Typeprobe home directory: `$TYPEPROBE_HOME`, or `~/.typeprobe`
pub fn typeprobe_home() -> Result<PathBuf> {
    if let Ok(override_path) = std::env::var("TYPEPROBE_HOME") {
        return Ok(PathBuf::from(override_path));
    }
    dirs::home_dir()
        .map(|home| home.join(".typeprobe"))
        .context("Could not determine home directory")
}

/// Default logs directory: `<home>/logs`
pub fn logs_dir() -> Result<PathBuf> {
    Ok(typeprobe_home()?.join("logs"))
}

/// Size-rotated append-only log file.
///
/// Writes go to `<dir>/<name>.log`. When a write would push it past the size
/// limit the file becomes `<name>.log.1`, older files shift up by one and the
/// oldest beyond the file limit is deleted. Usable directly as a row error
/// sink.
#[derive(Debug)]
pub struct RollingFile {
    dir: PathBuf,
    base_name: String,
    max_files: usize,
    max_size: u64,
    file: Option<File>,
    current_size: u64,
}

impl RollingFile {
    /// Open with the default limits (5 files of 10 MiB).
    pub fn open(dir: impl Into<PathBuf>, base_name: &str) -> io::Result<Self> {
        Self::with_limits(dir, base_name, MAX_LOG_FILES, MAX_LOG_FILE_SIZE)
    }

    pub fn with_limits(
        dir: impl Into<PathBuf>,
        base_name: &str,
        max_files: usize,
        max_size: u64,
    ) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let mut rolling = Self {
            dir,
            base_name: sanitize_name(base_name),
            max_files: max_files.max(1),
            max_size,
            file: None,
            current_size: 0,
        };
        let (file, size) = rolling.open_current_file()?;
        rolling.file = Some(file);
        rolling.current_size = size;
        if rolling.current_size > rolling.max_size {
            rolling.rotate()?;
        }
        Ok(rolling)
    }

    /// Path of the file currently written to
    pub fn current_path(&self) -> PathBuf {
        self.dir.join(format!("{}.log", self.base_name))
    }

    /// Path of the `index`-th rotated file (1 is the most recent)
    pub fn rotated_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("{}.log.{}", self.base_name, index))
    }

    fn open_current_file(&self) -> io::Result<(File, u64)> {
        let path = self.current_path();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let size = file.metadata()?.len();
        Ok((file, size))
    }

    fn rotate(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            let _ = file.flush();
        }

        self.rotate_files()?;

        let (file, size) = self.open_current_file()?;
        self.file = Some(file);
        self.current_size = size;
        Ok(())
    }

    fn rotate_files(&self) -> io::Result<()> {
        let current = self.current_path();
        let max_index = self.max_files.saturating_sub(1);
        if max_index == 0 {
            // No history kept, start the file over
            if current.exists() {
                fs::remove_file(&current)?;
            }
            return Ok(());
        }

        let oldest = self.rotated_path(max_index);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }

        for idx in (1..max_index).rev() {
            let src = self.rotated_path(idx);
            if src.exists() {
                fs::rename(&src, self.rotated_path(idx + 1))?;
            }
        }

        if current.exists() {
            fs::rename(current, self.rotated_path(1))?;
        }

        Ok(())
    }
}

impl Write for RollingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.current_size > 0 && self.current_size + buf.len() as u64 > self.max_size {
            self.rotate()?;
        }

        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "log file unavailable"))?;
        let bytes = file.write(buf)?;
        self.current_size += bytes as u64;
        Ok(bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
        }
        Ok(())
    }
}

#[derive(Clone)]
struct SharedRollingWriter {
    inner: Arc<Mutex<RollingFile>>,
}

impl SharedRollingWriter {
    fn new(dir: &Path, base_name: &str) -> Result<Self> {
        let file = RollingFile::open(dir, base_name)
            .with_context(|| format!("Failed to open log file for {}", base_name))?;
        Ok(Self {
            inner: Arc::new(Mutex::new(file)),
        })
    }
}

struct SharedRollingWriterGuard {
    inner: Arc<Mutex<RollingFile>>,
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SharedRollingWriter {
    type Writer = SharedRollingWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        SharedRollingWriterGuard {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Write for SharedRollingWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?;
        guard.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?;
        guard.flush()
    }
}

fn sanitize_name(name: &str) -> String {
    let name: String = name
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
        .collect();
    if name.is_empty() {
        "typeprobe".to_string()
    } else {
        name
    }
}
