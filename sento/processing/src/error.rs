use std::{io, path::PathBuf};

use thiserror::Error;

/// Boxed source error carried by store failures.
pub type BoxedSource = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised across the processing runtime and training pipeline.
#[derive(Debug, Error)]
pub enum SentoError {
    /// Label outside the closed `N`/`NEU`/`P` enumeration.
    #[error("unknown sentiment label: {0:?}")]
    UnknownLabel(String),
    /// Classifier returned an empty score mapping.
    #[error("classifier produced no category scores")]
    EmptyScores,
    /// Training corpus could not be read or is structurally invalid.
    #[error("corpus format error in {}: {reason}", path.display())]
    CorpusFormat {
        /// Offending corpus file.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },
    /// Backing store could not complete the operation.
    #[error("store unavailable during {operation}: {source}")]
    StoreUnavailable {
        /// Gateway operation that failed (`fetch_unprocessed`, `store_predictions`).
        operation: &'static str,
        /// Driver-level cause.
        #[source]
        source: BoxedSource,
    },
    /// Classifier failed on a single text.
    #[error("classification failed: {0}")]
    Classification(String),
    /// Model artifact is malformed or inconsistent.
    #[error("model error: {0}")]
    Model(String),
    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Filesystem failure.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// JSON (de)serialization failure.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// TOML parse failure.
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

impl SentoError {
    /// Wraps a driver error as [`SentoError::StoreUnavailable`].
    pub fn store(operation: &'static str, source: impl Into<BoxedSource>) -> Self {
        Self::StoreUnavailable {
            operation,
            source: source.into(),
        }
    }

    /// Whether the polling loop should retry after this error.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. })
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = SentoError> = std::result::Result<T, E>;
