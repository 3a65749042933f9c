use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::clock::{Clock, SystemClock};
use super::format::JsonFormatter;
use super::record::{LogRecord, Severity};
use super::writer::{RotatingWriter, WriterConfig, DEFAULT_RETENTION};
use crate::error::LogError;

pub const ACCESS_LOG_FILE: &str = "access.log";
pub const APPLICATION_LOG_FILE: &str = "application.log";

/// Settings shared by both named streams.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub dir: PathBuf,
    pub retention: usize,
    pub access_level: Severity,
    pub application_level: Severity,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./logs"),
            retention: DEFAULT_RETENTION,
            access_level: Severity::Info,
            application_level: Severity::Info,
        }
    }
}

impl LogConfig {
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Self::default()
        }
    }
}

/// A named stream: formatter + rotating writer + level threshold.
pub struct Logger {
    name: &'static str,
    threshold: Severity,
    formatter: JsonFormatter,
    writer: RotatingWriter,
}

impl Logger {
    pub fn new(name: &'static str, threshold: Severity, writer: RotatingWriter) -> Self {
        Self {
            name,
            threshold,
            formatter: JsonFormatter,
            writer,
        }
    }

    pub fn path(&self) -> PathBuf {
        self.writer.path()
    }

    pub fn writer(&self) -> &RotatingWriter {
        &self.writer
    }

    pub fn enabled(&self, level: Severity) -> bool {
        level >= self.threshold
    }

    /// Format and append `record`, returning once the line is on disk.
    ///
    /// Records below the threshold are skipped. Write failures are reported
    /// on the diagnostics channel and the record is dropped; logging never
    /// fails the caller.
    pub fn emit(&self, level: Severity, record: impl Into<LogRecord>) {
        if let Err(e) = self.try_emit(level, record) {
            tracing::error!(
                logger   = self.name,
                severity = %level,
                error    = %e,
                "Dropping log record"
            );
        }
    }

    /// [`Logger::emit`] for async callers. The formatted write and its
    /// `sync_data` run on the blocking pool so request tasks never stall a
    /// runtime worker; the future resolves once the line is on disk.
    pub async fn log(self: &Arc<Self>, level: Severity, record: impl Into<LogRecord>) {
        if !self.enabled(level) {
            return;
        }
        let logger = Arc::clone(self);
        let record = record.into();

        if let Err(e) = tokio::task::spawn_blocking(move || logger.emit(level, record)).await {
            tracing::error!(
                logger   = self.name,
                severity = %level,
                error    = %e,
                "Log write task failed"
            );
        }
    }

    /// Like [`Logger::emit`] but hands the write error back.
    pub fn try_emit(&self, level: Severity, record: impl Into<LogRecord>) -> Result<(), LogError> {
        if !self.enabled(level) {
            return Ok(());
        }
        let line = self.formatter.format(&record.into());
        self.writer.append(&line)
    }

    pub fn info(&self, record: impl Into<LogRecord>) {
        self.emit(Severity::Info, record)
    }

    pub fn warning(&self, record: impl Into<LogRecord>) {
        self.emit(Severity::Warning, record)
    }

    pub fn error(&self, record: impl Into<LogRecord>) {
        self.emit(Severity::Error, record)
    }
}

/// The two streams every request may touch.
#[derive(Clone)]
pub struct Loggers {
    pub access: Arc<Logger>,
    pub application: Arc<Logger>,
}

impl Loggers {
    pub fn open(config: &LogConfig) -> Result<Self, LogError> {
        Self::open_with_clock(config, Arc::new(SystemClock))
    }

    pub fn open_with_clock(config: &LogConfig, clock: Arc<dyn Clock>) -> Result<Self, LogError> {
        let access = open_logger(
            "access",
            &config.dir,
            ACCESS_LOG_FILE,
            config.retention,
            config.access_level,
            clock.clone(),
        )?;
        let application = open_logger(
            "application",
            &config.dir,
            APPLICATION_LOG_FILE,
            config.retention,
            config.application_level,
            clock,
        )?;

        Ok(Self {
            access: Arc::new(access),
            application: Arc::new(application),
        })
    }
}

fn open_logger(
    name: &'static str,
    dir: &Path,
    file_name: &str,
    retention: usize,
    threshold: Severity,
    clock: Arc<dyn Clock>,
) -> Result<Logger, LogError> {
    let mut config = WriterConfig::new(dir, file_name);
    config.retention = retention;
    let writer = RotatingWriter::open(config, clock)?;
    Ok(Logger::new(name, threshold, writer))
}
