#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Structured JSON logging shared by the processing loop and the training CLI.

use std::{
    fmt,
    fs::{self, OpenOptions},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Log severity level, ordered from least to most severe.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Debug information.
    Debug,
    /// Informational events.
    Info,
    /// Warning indicator.
    Warn,
    /// Error indicator.
    Error,
}

impl FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(Self::Debug),
            "INFO" => Ok(Self::Info),
            "WARN" | "WARNING" => Ok(Self::Warn),
            "ERROR" | "CRITICAL" => Ok(Self::Error),
            other => bail!("unknown log level {other:?}"),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// Sink receiving the JSON lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogDestination {
    /// Process standard output.
    Stdout,
    /// Process standard error.
    Stderr,
    /// Append-only file; parent directories are created on open.
    File(PathBuf),
}

impl FromStr for LogDestination {
    type Err = anyhow::Error;

    /// Parses `stdout`, `stderr` or anything else as a file path.
    fn from_str(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        Ok(match trimmed.to_ascii_lowercase().as_str() {
            "" | "stdout" | "-" => Self::Stdout,
            "stderr" => Self::Stderr,
            _ => Self::File(PathBuf::from(trimmed)),
        })
    }
}

/// Structured log record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    /// Timestamp in ISO8601.
    pub timestamp: DateTime<Utc>,
    /// Module emitting the log.
    pub module: String,
    /// Severity.
    pub level: LogLevel,
    /// Human-readable message.
    pub message: String,
    /// Arbitrary JSON payload (status ids, operation names, metrics).
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl LogRecord {
    /// Creates a record with the provided info.
    #[must_use]
    pub fn new(module: impl Into<String>, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            module: module.into(),
            level,
            message: message.into(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Attaches metadata. Non-object values are stored under `data`.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        match metadata {
            serde_json::Value::Object(map) => self.metadata = map,
            serde_json::Value::Null => {}
            other => {
                self.metadata.insert("data".into(), other);
            }
        }
        self
    }
}

/// Thread-safe JSON-lines logger with a minimum severity filter.
pub struct JsonLogger {
    destination: LogDestination,
    min_level: LogLevel,
    writer: Mutex<Box<dyn Write + Send>>,
}

impl fmt::Debug for JsonLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonLogger")
            .field("destination", &self.destination)
            .field("min_level", &self.min_level)
            .finish_non_exhaustive()
    }
}

impl JsonLogger {
    /// Creates or opens a file logger at the desired path, accepting every level.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_destination(
            LogDestination::File(path.as_ref().to_path_buf()),
            LogLevel::Debug,
        )
    }

    /// Creates a logger writing to `destination`, dropping records below `min_level`.
    pub fn with_destination(destination: LogDestination, min_level: LogLevel) -> Result<Self> {
        let writer: Box<dyn Write + Send> = match &destination {
            LogDestination::Stdout => Box::new(io::stdout()),
            LogDestination::Stderr => Box::new(io::stderr()),
            LogDestination::File(path) => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                Box::new(BufWriter::new(file))
            }
        };
        Ok(Self {
            destination,
            min_level,
            writer: Mutex::new(writer),
        })
    }

    /// Whether records at `level` pass the filter.
    #[must_use]
    pub fn enabled(&self, level: LogLevel) -> bool {
        level >= self.min_level
    }

    /// Writes a log record as a JSON line. Warnings and errors are flushed immediately.
    pub fn log(&self, record: &LogRecord) -> Result<()> {
        if !self.enabled(record.level) {
            return Ok(());
        }
        let mut writer = self.writer.lock();
        serde_json::to_writer(&mut *writer, record)?;
        writer.write_all(b"\n")?;
        if record.level >= LogLevel::Warn {
            writer.flush()?;
        }
        Ok(())
    }

    /// Flushes buffered lines to the destination.
    pub fn flush(&self) -> Result<()> {
        self.writer.lock().flush()?;
        Ok(())
    }

    /// Configured destination.
    #[must_use]
    pub const fn destination(&self) -> &LogDestination {
        &self.destination
    }

    /// Returns the underlying file path for file destinations.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match &self.destination {
            LogDestination::File(path) => Some(path),
            _ => None,
        }
    }
}
