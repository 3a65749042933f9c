//! Structured log streams: records, the JSON line formatter, the rotating
//! file writer and the named loggers built on top of them.

pub mod clock;
pub mod format;
pub mod logger;
pub mod record;
pub mod writer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use format::JsonFormatter;
pub use logger::{LogConfig, Logger, Loggers, ACCESS_LOG_FILE, APPLICATION_LOG_FILE};
pub use record::{AccessRecord, ApplicationRecord, LogRecord, Severity};
pub use writer::{RetentionSet, RotatingWriter, WriterConfig, DEFAULT_RETENTION};
