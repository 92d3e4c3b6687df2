//! Per-run sync log appended to a plain text file.
//!
//! Lines look like `[2024-05-01T12:00:00.000Z] [INFO] Sync started | {"source":"poll"}`.
//! The file is rotated to `<name>.old` once it reaches [`MAX_LOG_SIZE_BYTES`].

use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Size at which the log is rotated before appending.
pub const MAX_LOG_SIZE_BYTES: u64 = 2 * 1024 * 1024;

/// Severity of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Normal progress.
    Info,
    /// Recoverable problem.
    Warn,
    /// Failed run.
    Error,
}

impl LogLevel {
    fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

/// Lines buffered during one run and written at its end.
#[derive(Debug, Default)]
pub struct RunLog {
    lines: Vec<String>,
}

impl RunLog {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers an info line.
    pub fn info(&mut self, message: &str, details: Option<Value>) {
        self.push(LogLevel::Info, message, details);
    }

    /// Buffers a warning line.
    pub fn warn(&mut self, message: &str, details: Option<Value>) {
        self.push(LogLevel::Warn, message, details);
    }

    /// Buffers an error line.
    pub fn error(&mut self, message: &str, details: Option<Value>) {
        self.push(LogLevel::Error, message, details);
    }

    /// Buffered lines.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Appends all buffered lines to `path`, rotating first if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or written.
    pub fn flush(&mut self, path: &Path) -> io::Result<()> {
        if self.lines.is_empty() {
            return Ok(());
        }

        if let Ok(meta) = fs::metadata(path) {
            if meta.len() >= MAX_LOG_SIZE_BYTES {
                let _ = fs::copy(path, rotated_path(path));
                let _ = fs::write(path, b"");
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        for line in self.lines.drain(..) {
            writeln!(file, "{line}")?;
        }
        Ok(())
    }

    fn push(&mut self, level: LogLevel, message: &str, details: Option<Value>) {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let line = match details {
            Some(details) => format!("[{timestamp}] [{}] {message} | {details}", level.as_str()),
            None => format!("[{timestamp}] [{}] {message}", level.as_str()),
        };
        self.lines.push(line);
    }
}

/// Path of the rotated log next to `path`.
pub fn rotated_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "sync.log".into());
    name.push(".old");
    path.with_file_name(name)
}

/// Returns the last `lines` lines of the log, or all of it with `None`.
///
/// A missing log yields an empty string.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read.
pub fn tail(path: &Path, lines: Option<usize>) -> io::Result<String> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(String::new()),
        Err(e) => return Err(e),
    };

    Ok(match lines {
        Some(n) => {
            let all: Vec<&str> = content.lines().collect();
            all[all.len().saturating_sub(n)..].join("\n")
        }
        None => content,
    })
}
