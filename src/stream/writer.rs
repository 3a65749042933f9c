//! Append-only log file with daily (UTC) rotation and bounded retention.
//!
//! The live file is always `<dir>/<file_name>`. When the first append of a
//! new UTC day arrives, the live file is renamed to
//! `<file_name>.YYYY-MM-DD` (the day it was last written), a fresh live file
//! is opened and the oldest archives beyond the retention count are removed.
//! Rotation is lazy: there is no timer, an idle stream rotates on its next
//! write.
//!
//! Check-rotate-write-sync runs under one mutex, so concurrent appends never
//! interleave and land in lock-acquisition order. A write that fails part
//! way is cut back to the previous length so the file only ever holds whole
//! lines; a partial line left by a crash is dropped when the file is opened.

use chrono::{DateTime, NaiveDate, Utc};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use super::clock::Clock;
use crate::error::LogError;

pub const DEFAULT_RETENTION: usize = 7;

const DATE_FORMAT: &str = "%Y-%m-%d";

// ── Configuration ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Directory holding the live file and its archives.
    pub dir: PathBuf,
    /// Live file name, e.g. `access.log`.
    pub file_name: String,
    /// Number of archived files to keep.
    pub retention: usize,
}

impl WriterConfig {
    pub fn new(dir: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            file_name: file_name.into(),
            retention: DEFAULT_RETENTION,
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }
}

// ── Retention ────────────────────────────────────────────────────────────────

/// Archived files of one stream, oldest first.
#[derive(Debug, Default, Clone)]
pub struct RetentionSet {
    files: Vec<(NaiveDate, PathBuf)>,
}

impl RetentionSet {
    /// Collect every `<file_name>.YYYY-MM-DD` in `dir`. Names that do not
    /// carry a valid date suffix are left alone.
    pub fn scan(dir: &Path, file_name: &str) -> io::Result<Self> {
        let mut files = Vec::new();

        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let date = name
                .strip_prefix(file_name)
                .and_then(|rest| rest.strip_prefix('.'))
                .and_then(|suffix| NaiveDate::parse_from_str(suffix, DATE_FORMAT).ok());
            if let Some(date) = date {
                files.push((date, entry.path()));
            }
        }

        files.sort();
        Ok(Self { files })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.files.iter().map(|(d, _)| *d).collect()
    }

    /// Delete the oldest archives until at most `keep` remain. Returns the
    /// removed paths.
    pub fn prune(&mut self, keep: usize) -> io::Result<Vec<PathBuf>> {
        let excess = self.files.len().saturating_sub(keep);
        let mut removed = Vec::with_capacity(excess);

        for (_, path) in self.files.drain(..excess) {
            debug!(path = %path.display(), "Pruning old log archive");
            fs::remove_file(&path)?;
            removed.push(path);
        }

        Ok(removed)
    }
}

// ── Writer ───────────────────────────────────────────────────────────────────

pub struct RotatingWriter {
    config: WriterConfig,
    clock: Arc<dyn Clock>,
    stream: Mutex<LogStream>,
}

struct LogStream {
    file: Option<File>,
    /// UTC day the live file belongs to.
    day: NaiveDate,
    /// A failed write could not be rolled back; the tail may hold a
    /// partial line.
    torn: bool,
}

impl RotatingWriter {
    /// Open (or create) the live file.
    ///
    /// A non-empty live file left over from an earlier run keeps the day of
    /// its last modification, so it is archived under that date on the first
    /// append of a later day.
    pub fn open(config: WriterConfig, clock: Arc<dyn Clock>) -> Result<Self, LogError> {
        fs::create_dir_all(&config.dir).map_err(|e| LogError::write(&config.dir, e))?;

        let path = config.path();
        let last_active = fs::metadata(&path)
            .ok()
            .filter(|m| m.len() > 0)
            .and_then(|m| m.modified().ok())
            .map(|t| DateTime::<Utc>::from(t).date_naive());

        let file = open_append(&path).map_err(|e| LogError::write(&path, e))?;
        if last_active.is_some() {
            trim_torn_tail(&file, &path).map_err(|e| LogError::write(&path, e))?;
        }
        let day = last_active.unwrap_or_else(|| clock.now().date_naive());

        info!(path = %path.display(), day = %day, "Log stream opened");

        Ok(Self {
            config,
            clock,
            stream: Mutex::new(LogStream {
                file: Some(file),
                day,
                torn: false,
            }),
        })
    }

    pub fn path(&self) -> PathBuf {
        self.config.path()
    }

    /// Append one already formatted line and sync it to disk.
    pub fn append(&self, line: &str) -> Result<(), LogError> {
        let path = self.config.path();
        let mut stream = self.stream.lock().map_err(|_| {
            LogError::write(&path, io::Error::new(io::ErrorKind::Other, "log stream lock poisoned"))
        })?;

        let today = self.clock.now().date_naive();
        if stream.file.is_none() || stream.day != today {
            self.rotate(&mut stream, today)?;
        }

        let LogStream { file, torn, .. } = &mut *stream;
        let file = file.as_mut().ok_or_else(|| {
            LogError::write(&path, io::Error::new(io::ErrorKind::Other, "log stream is closed"))
        })?;

        if *torn {
            trim_torn_tail(file, &path).map_err(|e| LogError::write(&path, e))?;
            *torn = false;
        }

        let start = file.metadata().map_err(|e| LogError::write(&path, e))?.len();
        if let Err(e) = file.write_all(line.as_bytes()).and_then(|_| file.sync_data()) {
            if let Err(undo) = file.set_len(start) {
                warn!(error = %undo, path = %path.display(), "Failed to roll back partial log write");
                *torn = true;
            }
            return Err(LogError::write(&path, e));
        }
        Ok(())
    }

    /// Snapshot of the archived files currently on disk.
    pub fn archives(&self) -> Result<RetentionSet, LogError> {
        RetentionSet::scan(&self.config.dir, &self.config.file_name)
            .map_err(|e| LogError::write(&self.config.dir, e))
    }

    fn rotate(&self, stream: &mut LogStream, today: NaiveDate) -> Result<(), LogError> {
        let live = self.config.path();

        // Close before renaming.
        stream.file = None;

        if stream.day != today {
            match archive(&live, stream.day) {
                Ok(Some(to)) => {
                    info!(from = %live.display(), to = %to.display(), "Rotated log file");
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, path = %live.display(), "Failed to archive log file");
                }
            }

            match RetentionSet::scan(&self.config.dir, &self.config.file_name)
                .and_then(|mut set| set.prune(self.config.retention))
            {
                Ok(removed) if !removed.is_empty() => {
                    info!(count = removed.len(), "Pruned old log archives");
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Failed to prune old log archives"),
            }
        }

        let file = open_append(&live).map_err(|e| LogError::write(&live, e))?;
        stream.file = Some(file);
        stream.day = today;
        stream.torn = false;
        Ok(())
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Length of the file at `path` up to and including its last newline.
fn complete_len(path: &Path) -> io::Result<u64> {
    let mut file = File::open(path)?;
    let mut end = file.metadata()?.len();
    let mut buf = [0u8; 8192];

    while end > 0 {
        let start = end.saturating_sub(buf.len() as u64);
        let chunk = &mut buf[..(end - start) as usize];
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(chunk)?;
        if let Some(pos) = chunk.iter().rposition(|&b| b == b'\n') {
            return Ok(start + pos as u64 + 1);
        }
        end = start;
    }

    Ok(0)
}

/// Cut a trailing partial line off the live file.
fn trim_torn_tail(file: &File, path: &Path) -> io::Result<()> {
    let len = file.metadata()?.len();
    let keep = complete_len(path)?;
    if keep < len {
        warn!(path = %path.display(), dropped = len - keep, "Dropping partial line at end of log file");
        file.set_len(keep)?;
    }
    Ok(())
}

/// `access.log` → `access.log.2024-05-01`.
fn archived_path(live: &Path, day: NaiveDate) -> PathBuf {
    let mut path = live.as_os_str().to_owned();
    path.push(".");
    path.push(day.format(DATE_FORMAT).to_string());
    PathBuf::from(path)
}

/// Move the live file aside under `day`. An empty or missing live file is
/// not archived. If an archive for `day` already exists the live contents
/// are appended to it.
fn archive(live: &Path, day: NaiveDate) -> io::Result<Option<PathBuf>> {
    let len = match fs::metadata(live) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    if len == 0 {
        return Ok(None);
    }

    let target = archived_path(live, day);
    if target.exists() {
        let mut src = File::open(live)?;
        let mut dst = OpenOptions::new().append(true).open(&target)?;
        io::copy(&mut src, &mut dst)?;
        dst.sync_data()?;
        fs::remove_file(live)?;
    } else {
        fs::rename(live, &target)?;
    }

    Ok(Some(target))
}

// ── Tests ────────────────────────────────────────────────────────────────────
