//! # Logging Utilities
//!
//! Logging infrastructure for Heapwalk using `tracing`.
//!
//! This module provides structured logging with support for:
//! - Two output formats (JSON for machines, pretty for people)
//! - Environment variable configuration
//! - Log level filtering
//! - Optional file output next to the console
//!
//! Console output goes to stderr so that command output on stdout (reports,
//! JSON dumps) stays machine readable.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use heapwalk_utils::init_logging;
//!
//! // Reads RUST_LOG, HEAPWALK_LOG_FORMAT and HEAPWALK_LOG_FILE
//! let _guard = init_logging().expect("Failed to initialize logging");
//!
//! tracing::info!("Application started");
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level filter (e.g., `RUST_LOG=debug`, `RUST_LOG=heapwalk_core=trace`)
//! - `HEAPWALK_LOG_FORMAT`: Set output format (`json` or `pretty`, default: `pretty`)
//! - `HEAPWALK_LOG_FILE`: Optional path to a log file, or to a directory for a dated file
//!
//! ## Examples
//!
//! ```rust,no_run
//! use heapwalk_utils::{LogFormat, LogLevel, LoggingConfig, init_logging_with, init_logging_with_level};
//!
//! // Initialize with specific log level
//! let _guard = init_logging_with_level(LogLevel::Debug, LogFormat::Pretty).expect("Failed to initialize logging");
//!
//! // Or build the configuration explicitly
//! let config = LoggingConfig::from_env().with_level(LogLevel::Trace).with_file("/tmp/heapwalk.log");
//! let _guard = init_logging_with(config).expect("Failed to initialize logging");
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, fs, io};

use chrono::Utc;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::{self};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Environment variable selecting the output format
pub const LOG_FORMAT_ENV: &str = "HEAPWALK_LOG_FORMAT";

/// Environment variable naming the optional log file
pub const LOG_FILE_ENV: &str = "HEAPWALK_LOG_FILE";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat
{
    /// Pretty-printed, human-readable format (default)
    #[default]
    Pretty,
    /// JSON format, one object per line
    Json,
}

impl FromStr for LogFormat
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "pretty" | "dev" | "development" => Ok(LogFormat::Pretty),
            "json" | "prod" | "production" => Ok(LogFormat::Json),
            _ => Err(format!("Unknown log format: {s}. Use 'pretty' or 'json'")),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel
{
    /// Error level
    Error,
    /// Warning level
    Warn,
    /// Info level (default)
    Info,
    /// Debug level
    Debug,
    /// Trace level (most verbose)
    Trace,
}

impl From<LogLevel> for Level
{
    fn from(level: LogLevel) -> Self
    {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

impl FromStr for LogLevel
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "error" | "err" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" | "dbg" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(format!(
                "Unknown log level: {s}. Use 'error', 'warn', 'info', 'debug', or 'trace'"
            )),
        }
    }
}

/// Everything needed to install the global subscriber
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggingConfig
{
    /// Explicit level; overrides `RUST_LOG` when set
    pub level: Option<LogLevel>,
    pub format: LogFormat,
    /// Log file, or directory receiving a dated log file
    pub file: Option<PathBuf>,
}

impl LoggingConfig
{
    /// Read `HEAPWALK_LOG_FORMAT` and `HEAPWALK_LOG_FILE`
    ///
    /// Unparseable formats fall back to pretty output. `RUST_LOG` is read
    /// later, when the filter is built, so that module-specific directives
    /// keep working.
    pub fn from_env() -> Self
    {
        let format = env::var(LOG_FORMAT_ENV)
            .ok()
            .and_then(|s| LogFormat::from_str(&s).ok())
            .unwrap_or_default();
        let file = env::var(LOG_FILE_ENV).ok().filter(|s| !s.is_empty()).map(PathBuf::from);
        Self {
            level: None,
            format,
            file,
        }
    }

    #[must_use]
    pub fn with_level(mut self, level: LogLevel) -> Self
    {
        self.level = Some(level);
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self
    {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self
    {
        self.file = Some(file.into());
        self
    }

    /// Filter to install
    ///
    /// Priority:
    /// 1. An explicit level (from a `--log-level` flag)
    /// 2. `RUST_LOG`, including module-specific filters like `heapwalk_core=debug`
    /// 3. `INFO`
    fn env_filter(&self) -> EnvFilter
    {
        if let Some(level) = self.level {
            return EnvFilter::new(Level::from(level).to_string());
        }
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()))
    }
}

/// Keeps the background file writer alive
///
/// Dropping the guard flushes buffered log lines. Hold it until the program
/// exits.
#[derive(Debug, Default)]
pub struct LoggingGuard
{
    file: Option<WorkerGuard>,
    path: Option<PathBuf>,
}

impl LoggingGuard
{
    /// Path of the log file being written, if any
    pub fn log_file(&self) -> Option<&Path>
    {
        self.path.as_deref()
    }

    pub fn has_file(&self) -> bool
    {
        self.file.is_some()
    }
}

/// Initialize logging with default settings
///
/// Reads configuration from environment variables:
/// - `RUST_LOG`: Log level filter (e.g., `debug`, `heapwalk_core=debug`)
/// - `HEAPWALK_LOG_FORMAT`: Output format (`json` or `pretty`, default: `pretty`)
/// - `HEAPWALK_LOG_FILE`: Optional path to log file
///
/// ## Example
///
/// ```rust,no_run
/// use heapwalk_utils::init_logging;
///
/// let _guard = init_logging().expect("Failed to initialize logging");
/// tracing::info!("Application started");
/// ```
///
/// ## Errors
///
/// Returns an error if:
/// - Logging is already initialized
/// - File logging fails (if `HEAPWALK_LOG_FILE` is set)
pub fn init_logging() -> Result<LoggingGuard, LoggingError>
{
    init_logging_with(LoggingConfig::from_env())
}

/// Initialize logging with explicit level and format
///
/// ## Errors
///
/// Returns an error if logging is already initialized or file logging fails.
pub fn init_logging_with_level(level: LogLevel, format: LogFormat) -> Result<LoggingGuard, LoggingError>
{
    init_logging_with(LoggingConfig::from_env().with_level(level).with_format(format))
}

/// Initialize logging from a complete configuration
///
/// ## Errors
///
/// Returns an error if logging is already initialized or the log file cannot
/// be created.
pub fn init_logging_with(config: LoggingConfig) -> Result<LoggingGuard, LoggingError>
{
    let env_filter = config.env_filter();
    let mut layers: Vec<BoxedLayer> = vec![format_layer(config.format, io::stderr, true)
        .with_filter(env_filter.clone())
        .boxed()];
    let mut guard = LoggingGuard::default();

    if let Some(requested) = config.file.as_deref() {
        let log_file = resolve_log_file(requested)?;
        // never roll; directory-derived names already carry the date
        let file_appender = tracing_appender::rolling::never(
            log_file.parent().unwrap_or(Path::new(".")),
            log_file.file_name().unwrap_or_default(),
        );
        let (non_blocking, worker) = tracing_appender::non_blocking(file_appender);
        layers.push(format_layer(config.format, non_blocking, false).with_filter(env_filter).boxed());
        guard = LoggingGuard {
            file: Some(worker),
            path: Some(log_file),
        };
    }

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|err| LoggingError::InitializationFailed(err.to_string()))?;
    Ok(guard)
}

/// Turn a requested log location into a file path
///
/// Existing directories receive `YYYY-MM-DD-heapwalk.log`. Missing parent
/// directories are created.
fn resolve_log_file(requested: &Path) -> Result<PathBuf, LoggingError>
{
    let path = if requested.is_dir() {
        let today = Utc::now().format("%Y-%m-%d");
        requested.join(format!("{today}-heapwalk.log"))
    } else {
        requested.to_path_buf()
    };
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(LoggingError::FileError)?;
    }
    Ok(path)
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn format_layer<W>(format: LogFormat, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(true)
            .with_line_number(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_ansi(ansi)
            .with_writer(writer)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(writer)
            .boxed(),
    }
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    /// Invalid log format
    #[error("Invalid log format: {0}")]
    InvalidFormat(String),

    /// Invalid log level
    #[error("Invalid log level: {0}")]
    InvalidLevel(String),

    /// Failed to initialize logging
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    /// File logging error
    #[error("File logging error: {0}")]
    FileError(#[from] io::Error),
}
