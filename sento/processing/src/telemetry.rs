use std::{fmt, path::PathBuf, sync::Arc};

use anyhow::Result;
use serde_json::Value;
use shared_logging::{JsonLogger, LogLevel, LogRecord};

/// Builder configuring telemetry for processing and training.
pub struct SentoTelemetryBuilder {
    module: String,
    log_path: Option<PathBuf>,
    logger: Option<Arc<JsonLogger>>,
}

impl SentoTelemetryBuilder {
    /// Creates a new builder.
    #[must_use]
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            log_path: None,
            logger: None,
        }
    }

    /// Sets the JSON log path. Ignored when a shared logger is supplied.
    #[must_use]
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Shares an already opened logger.
    #[must_use]
    pub fn logger(mut self, logger: Arc<JsonLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Finalizes the builder.
    pub fn build(self) -> Result<SentoTelemetry> {
        let logger = match (self.logger, self.log_path) {
            (Some(logger), _) => Some(logger),
            (None, Some(path)) => Some(Arc::new(JsonLogger::new(path)?)),
            (None, None) => None,
        };
        Ok(SentoTelemetry {
            module: Arc::from(self.module),
            logger,
        })
    }
}

/// Module-scoped handle on the shared JSON logger.
#[derive(Clone)]
pub struct SentoTelemetry {
    module: Arc<str>,
    logger: Option<Arc<JsonLogger>>,
}

impl fmt::Debug for SentoTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SentoTelemetry")
            .field("module", &self.module)
            .field("enabled", &self.logger.is_some())
            .finish()
    }
}

impl SentoTelemetry {
    /// Returns a builder for this telemetry helper.
    #[must_use]
    pub fn builder(module: impl Into<String>) -> SentoTelemetryBuilder {
        SentoTelemetryBuilder::new(module)
    }

    /// Telemetry that discards everything.
    #[must_use]
    pub fn disabled(module: impl Into<String>) -> Self {
        Self {
            module: Arc::from(module.into()),
            logger: None,
        }
    }

    /// Same sink, different module name.
    #[must_use]
    pub fn for_module(&self, module: impl Into<String>) -> Self {
        Self {
            module: Arc::from(module.into()),
            logger: self.logger.clone(),
        }
    }

    /// Module name stamped on records.
    #[must_use]
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Logs a structured record.
    pub fn log(&self, level: LogLevel, message: &str, metadata: Value) -> Result<()> {
        if let Some(logger) = &self.logger {
            if logger.enabled(level) {
                let record = LogRecord::new(&*self.module, level, message).with_metadata(metadata);
                logger.log(&record)?;
            }
        }
        Ok(())
    }

    /// Flushes the underlying logger.
    pub fn flush(&self) -> Result<()> {
        if let Some(logger) = &self.logger {
            logger.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn telemetry_logs_with_module_name() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("processing.log");
        let telemetry = SentoTelemetry::builder("inference")
            .log_path(&log_path)
            .build()
            .unwrap();
        telemetry
            .for_module("gateway")
            .log(LogLevel::Info, "batch.fetched", json!({ "records": 3 }))
            .unwrap();
        telemetry.flush().unwrap();
        let content = std::fs::read_to_string(log_path).unwrap();
        assert!(content.contains("\"module\":\"gateway\""));
        assert!(content.contains("\"records\":3"));
    }

    #[test]
    fn disabled_telemetry_is_silent() {
        let telemetry = SentoTelemetry::disabled("inference");
        telemetry
            .log(LogLevel::Error, "ignored", Value::Null)
            .unwrap();
        telemetry.flush().unwrap();
        assert_eq!(telemetry.module(), "inference");
    }
}
