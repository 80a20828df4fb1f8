//! Logging configuration and the rotating log file sink

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::errors::OpsError;

/// Size above which the log file is rotated (10 MiB)
pub const DEFAULT_ROTATE_BYTES: u64 = 10 * 1024 * 1024;

/// Suffix of the single retained log generation
pub const ROTATED_SUFFIX: &str = ".old";

/// Log level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_filter_string(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(format!("Invalid log level: {}", s)),
        }
    }
}

impl serde::Serialize for LogLevel {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.to_filter_string())
    }
}

impl<'de> serde::Deserialize<'de> for LogLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Logging options
#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Log level
    pub log_level: LogLevel,

    /// Write logs to stdout
    pub stdout: bool,

    /// Log file; `None` disables file output
    pub log_file: Option<PathBuf>,

    /// Rotate the log file once it grows past this many bytes
    pub rotate_bytes: u64,

    /// Enable JSON format on stdout
    pub json_format: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            stdout: true,
            log_file: None,
            rotate_bytes: DEFAULT_ROTATE_BYTES,
            json_format: false,
        }
    }
}

/// Initialize logging.
///
/// The returned guard flushes the file writer when dropped and must be held
/// until the process exits.
pub fn init_logging(options: LogOptions) -> Result<Option<WorkerGuard>, OpsError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(options.log_level.to_filter_string()));

    let stdout_layer = if !options.stdout {
        None
    } else if options.json_format {
        Some(fmt::layer().json().boxed())
    } else {
        Some(fmt::layer().with_target(false).boxed())
    };

    let (file_layer, guard) = match &options.log_file {
        Some(path) => {
            let sink = LogSink::open(path, options.rotate_bytes)?;
            let (writer, guard) = tracing_appender::non_blocking(sink);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| OpsError::ConfigError(e.to_string()))?;

    Ok(guard)
}

/// Append-only log file that keeps exactly one prior generation.
///
/// The size check runs when a session opens the sink and again before every
/// write, so a session never starts on an oversized file. Several processes
/// may share the file: the size is read from disk, and a sink whose file was
/// rotated away by another process reopens the path before writing.
#[derive(Debug)]
pub struct LogSink {
    path: PathBuf,
    rotate_bytes: u64,
    file: fs::File,
}

impl LogSink {
    /// Open the sink for a new session, rotating first if the file is oversized
    pub fn open(path: impl Into<PathBuf>, rotate_bytes: u64) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let current = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        if current > rotate_bytes {
            fs::rename(&path, rotated_path(&path))?;
        }

        let file = open_append(&path)?;
        Ok(Self {
            path,
            rotate_bytes,
            file,
        })
    }

    /// Path of the live log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the retained previous generation
    pub fn rotated_path(&self) -> PathBuf {
        rotated_path(&self.path)
    }

    /// Size of the live file, reopening it if the open handle went stale
    fn current_len(&mut self) -> io::Result<u64> {
        let open = self.file.metadata()?;
        if let Ok(on_disk) = fs::metadata(&self.path) {
            if same_file(&open, &on_disk) {
                return Ok(on_disk.len());
            }
        }
        self.file.flush()?;
        self.file = open_append(&self.path)?;
        Ok(self.file.metadata()?.len())
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        fs::rename(&self.path, self.rotated_path())?;
        self.file = open_append(&self.path)?;
        Ok(())
    }
}

impl Write for LogSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let len = self.current_len()?;
        if len > 0 && len + buf.len() as u64 > self.rotate_bytes {
            self.rotate()?;
        }
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

#[cfg(unix)]
fn same_file(open: &fs::Metadata, on_disk: &fs::Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    open.dev() == on_disk.dev() && open.ino() == on_disk.ino()
}

// Without inode identity a rotation by another process shows up as a file
// shorter than the open handle
#[cfg(not(unix))]
fn same_file(open: &fs::Metadata, on_disk: &fs::Metadata) -> bool {
    open.len() <= on_disk.len()
}

fn open_append(path: &Path) -> io::Result<fs::File> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn rotated_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(ROTATED_SUFFIX);
    PathBuf::from(name)
}
