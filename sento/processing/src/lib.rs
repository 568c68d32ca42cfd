#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Sento sentiment processing runtime and training pipeline.

/// Text classifiers.
pub mod classifier;

/// TOML configuration with environment overrides.
pub mod config;

/// Process-wide context built at startup.
pub mod context;

/// TASS XML corpus reader.
pub mod corpus;

/// Error type shared by every component.
pub mod error;

/// Status store gateways.
pub mod gateway;

/// Polling inference loop.
pub mod inference;

/// Sentiment labels and score mapping.
pub mod labels;

/// Telemetry helpers.
pub mod telemetry;

/// Categorizer training procedure.
pub mod training;

pub use classifier::{TextCategorizer, TextClassifier, TrainableClassifier};
pub use config::SentoConfig;
pub use context::ProcessingContext;
pub use error::{Result, SentoError};
pub use gateway::{InMemoryGateway, PgStatusGateway, Prediction, Record, StatusGateway, StatusId};
pub use inference::{InferenceLoop, InferenceSettings, LoopStats};
pub use labels::SentimentCategory;
pub use training::{TrainingData, TrainingProcedure, TrainingReport, TrainingSettings};
