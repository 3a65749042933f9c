use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::LogError;

pub const ACCESS_EVENT: &str = "access_log";
pub const APPLICATION_EVENT: &str = "application_log";

/// Severity of an application record, also used as the per-stream level
/// threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            other => Err(LogError::InvalidRecord(format!(
                "unknown severity '{other}', expected info, warning or error"
            ))),
        }
    }
}

/// Anything the formatter knows how to turn into a line.
#[derive(Debug, Clone, PartialEq)]
pub enum LogRecord {
    Access(AccessRecord),
    Application(ApplicationRecord),
    /// Bare text with no structured fields, written as `{"message": ...}`.
    Message(String),
}

impl From<AccessRecord> for LogRecord {
    fn from(record: AccessRecord) -> Self {
        LogRecord::Access(record)
    }
}

impl From<ApplicationRecord> for LogRecord {
    fn from(record: ApplicationRecord) -> Self {
        LogRecord::Application(record)
    }
}

impl From<String> for LogRecord {
    fn from(message: String) -> Self {
        LogRecord::Message(message)
    }
}

impl From<&str> for LogRecord {
    fn from(message: &str) -> Self {
        LogRecord::Message(message.to_string())
    }
}

/// One line per HTTP request/response cycle.
///
/// Serialized field order is the declaration order below.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccessRecord {
    event: &'static str,
    #[serde(serialize_with = "iso8601")]
    timestamp: DateTime<Utc>,
    method: String,
    path: String,
    status_code: u16,
    remote_addr: String,
    user_agent: Option<String>,
    duration_seconds: f64,
}

impl AccessRecord {
    pub fn new(
        method: impl Into<String>,
        path: impl Into<String>,
        status_code: u16,
        remote_addr: impl Into<String>,
        user_agent: Option<String>,
        duration_seconds: f64,
    ) -> Result<Self, LogError> {
        Self::at(
            Utc::now(),
            method,
            path,
            status_code,
            remote_addr,
            user_agent,
            duration_seconds,
        )
    }

    pub fn at(
        timestamp: DateTime<Utc>,
        method: impl Into<String>,
        path: impl Into<String>,
        status_code: u16,
        remote_addr: impl Into<String>,
        user_agent: Option<String>,
        duration_seconds: f64,
    ) -> Result<Self, LogError> {
        if !(100..=599).contains(&status_code) {
            return Err(LogError::InvalidRecord(format!(
                "status code {status_code} is outside 100-599"
            )));
        }
        if !duration_seconds.is_finite() || duration_seconds < 0.0 {
            return Err(LogError::InvalidRecord(format!(
                "duration {duration_seconds} must be a non-negative number of seconds"
            )));
        }
        // Scaling for the 4-place rounding overflows near f64::MAX.
        let rounded = round_to_4(duration_seconds);
        if !rounded.is_finite() {
            return Err(LogError::InvalidRecord(format!(
                "duration {duration_seconds} is too large to record"
            )));
        }

        Ok(Self {
            event: ACCESS_EVENT,
            timestamp: timestamp.trunc_subsecs(6),
            method: method.into(),
            path: path.into(),
            status_code,
            remote_addr: remote_addr.into(),
            user_agent,
            duration_seconds: rounded,
        })
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration_seconds
    }
}

/// A trace event or error raised by handler code.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplicationRecord {
    event: String,
    #[serde(serialize_with = "iso8601")]
    timestamp: DateTime<Utc>,
    level: Severity,
    message: String,
    trace: Vec<String>,
    ip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    stacktrace: Option<String>,
}

impl ApplicationRecord {
    pub fn new(
        level: Severity,
        message: impl Into<String>,
        trace: Vec<String>,
        ip: impl Into<String>,
    ) -> Self {
        Self::at(Utc::now(), level, APPLICATION_EVENT, message, trace, ip)
    }

    pub fn at(
        timestamp: DateTime<Utc>,
        level: Severity,
        event: impl Into<String>,
        message: impl Into<String>,
        trace: Vec<String>,
        ip: impl Into<String>,
    ) -> Self {
        Self {
            event: event.into(),
            timestamp: timestamp.trunc_subsecs(6),
            level,
            message: message.into(),
            trace,
            ip: ip.into(),
            stacktrace: None,
        }
    }

    /// An `error` record carrying a stack trace.
    pub fn error_with_stacktrace(
        message: impl Into<String>,
        trace: Vec<String>,
        ip: impl Into<String>,
        stacktrace: impl Into<String>,
    ) -> Self {
        let mut record = Self::new(Severity::Error, message, trace, ip);
        record.stacktrace = Some(stacktrace.into());
        record
    }

    /// Attach a stack trace. Only `error` records may carry one.
    pub fn with_stacktrace(mut self, stacktrace: impl Into<String>) -> Result<Self, LogError> {
        if self.level != Severity::Error {
            return Err(LogError::InvalidRecord(format!(
                "stack traces are only allowed on error records, got {}",
                self.level
            )));
        }
        self.stacktrace = Some(stacktrace.into());
        Ok(self)
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn level(&self) -> Severity {
        self.level
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn trace(&self) -> &[String] {
        &self.trace
    }

    pub fn ip(&self) -> &str {
        &self.ip
    }

    pub fn stacktrace(&self) -> Option<&str> {
        self.stacktrace.as_deref()
    }
}

/// UTC timestamps are always written with microseconds and a `Z` suffix.
fn iso8601<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Micros, true))
}

fn round_to_4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
