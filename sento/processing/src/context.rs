use std::{path::Path, sync::Arc};

use shared_logging::JsonLogger;

use crate::{
    config::SentoConfig,
    error::{Result, SentoError},
    telemetry::SentoTelemetry,
};

/// Process-wide state built once at startup and handed to every component.
#[derive(Debug, Clone)]
pub struct ProcessingContext {
    config: Arc<SentoConfig>,
    telemetry: SentoTelemetry,
}

impl ProcessingContext {
    /// Loads the configuration file and opens the configured log sink.
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        Self::from_config(SentoConfig::load(config_path)?)
    }

    /// Opens the log sink described by `config.logging`.
    pub fn from_config(config: SentoConfig) -> Result<Self> {
        let logger = JsonLogger::with_destination(
            config.logging.destination()?,
            config.logging.level()?,
        )
        .map_err(|err| SentoError::Configuration(format!("opening log sink: {err}")))?;
        let telemetry = SentoTelemetry::builder("sento")
            .logger(Arc::new(logger))
            .build()
            .map_err(|err| SentoError::Configuration(err.to_string()))?;
        Ok(Self::with_telemetry(config, telemetry))
    }

    /// Uses an existing telemetry handle; handy for tests.
    #[must_use]
    pub fn with_telemetry(config: SentoConfig, telemetry: SentoTelemetry) -> Self {
        Self {
            config: Arc::new(config),
            telemetry,
        }
    }

    /// Loaded configuration.
    #[must_use]
    pub fn config(&self) -> &SentoConfig {
        &self.config
    }

    /// Telemetry scoped to `module`.
    #[must_use]
    pub fn telemetry(&self, module: &str) -> SentoTelemetry {
        self.telemetry.for_module(module)
    }

    /// Flushes pending log lines.
    pub fn flush_logs(&self) {
        if let Err(err) = self.telemetry.flush() {
            eprintln!("failed to flush logs: {err:?}");
        }
    }
}
