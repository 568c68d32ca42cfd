//! Polling loop that drains unprocessed statuses through the classifier.

use std::{sync::Arc, time::Duration};

use indexmap::IndexSet;
use serde::Serialize;
use serde_json::json;
use shared_logging::LogLevel;
use tokio::{sync::watch, time::sleep};

use crate::{
    classifier::TextClassifier,
    config::ProcessingSettings,
    error::SentoError,
    gateway::{Prediction, Record, StatusGateway, StatusId},
    labels::from_model_scores,
    telemetry::SentoTelemetry,
};

/// Unclassifiable status ids remembered across polls; the oldest is forgotten first.
pub const FAILED_ID_CAPACITY: usize = 4096;

/// Loop tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InferenceSettings {
    /// Records requested per fetch.
    pub batch_size: usize,
    /// Wait when the store has nothing left to process.
    pub idle_interval: Duration,
    /// Wait after a store failure or a fully failed batch.
    pub retry_interval: Duration,
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self::from(&ProcessingSettings::default())
    }
}

impl From<&ProcessingSettings> for InferenceSettings {
    fn from(settings: &ProcessingSettings) -> Self {
        Self {
            batch_size: settings.batch_size,
            idle_interval: settings.idle_interval(),
            retry_interval: settings.retry_interval(),
        }
    }
}

/// Why the loop is idling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleReason {
    /// No unprocessed statuses left.
    Drained,
    /// The store failed or no record of the batch could be classified.
    Failure,
}

/// Loop state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Fetch, classify and store the next batch.
    Polling,
    /// Wait before polling again.
    Idle(IdleReason),
}

/// Counters reported when the loop stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoopStats {
    /// Batches committed to the store.
    pub batches: u64,
    /// Predictions committed to the store.
    pub predictions_stored: u64,
    /// Records dropped because classification failed.
    pub classification_failures: u64,
    /// Failed fetch or store calls.
    pub store_failures: u64,
    /// Idle or retry waits entered.
    pub idle_suspensions: u64,
}

/// Fetch → classify → store loop with idle backoff and cooperative shutdown.
pub struct InferenceLoop {
    gateway: Arc<dyn StatusGateway>,
    classifier: Arc<dyn TextClassifier>,
    settings: InferenceSettings,
    telemetry: SentoTelemetry,
    pending: Option<Vec<Prediction>>,
    failed: IndexSet<StatusId>,
    stats: LoopStats,
}

impl std::fmt::Debug for InferenceLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceLoop")
            .field("settings", &self.settings)
            .field("pending", &self.pending.as_ref().map(Vec::len))
            .field("failed", &self.failed.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl InferenceLoop {
    /// Creates a loop over `gateway` and `classifier`.
    #[must_use]
    pub fn new(
        gateway: Arc<dyn StatusGateway>,
        classifier: Arc<dyn TextClassifier>,
        settings: InferenceSettings,
        telemetry: SentoTelemetry,
    ) -> Self {
        Self {
            gateway,
            classifier,
            settings,
            telemetry,
            pending: None,
            failed: IndexSet::new(),
            stats: LoopStats::default(),
        }
    }

    /// Counters so far.
    #[must_use]
    pub const fn stats(&self) -> LoopStats {
        self.stats
    }

    /// Predictions waiting to be written again after a store failure.
    #[must_use]
    pub fn pending(&self) -> Option<&[Prediction]> {
        self.pending.as_deref()
    }

    /// Whether `id` failed classification earlier and is skipped by later polls.
    #[must_use]
    pub fn is_skipped(&self, id: StatusId) -> bool {
        self.failed.contains(&id)
    }

    /// Classifies every record, preserving order. Failed records are logged and skipped.
    pub fn classify_batch(&mut self, records: &[Record]) -> Vec<Prediction> {
        let mut predictions = Vec::with_capacity(records.len());
        for record in records {
            let outcome = self
                .classifier
                .classify(&record.content)
                .and_then(|scores| from_model_scores(&scores));
            match outcome {
                Ok(sentiment) => predictions.push(Prediction {
                    id: record.id,
                    sentiment,
                }),
                Err(err) => {
                    self.stats.classification_failures += 1;
                    self.remember_failure(record.id);
                    self.log(
                        LogLevel::Warn,
                        "record.classification_failed",
                        json!({ "status_id": record.id, "error": err.to_string() }),
                    );
                }
            }
        }
        predictions
    }

    fn remember_failure(&mut self, id: StatusId) {
        if self.failed.len() >= FAILED_ID_CAPACITY {
            self.failed.shift_remove_index(0);
        }
        self.failed.insert(id);
    }

    /// One `Polling` step: flush pending writes, then fetch, classify and store a batch.
    pub async fn poll(&mut self) -> LoopState {
        if let Some(pending) = self.pending.take() {
            self.log(
                LogLevel::Info,
                "batch.retry_store",
                json!({ "predictions": pending.len() }),
            );
            if !self.store(pending).await {
                return LoopState::Idle(IdleReason::Failure);
            }
        }

        // skipped rows are still NULL in the store, so ask for enough to get past them
        let requested = self.settings.batch_size + self.failed.len();
        self.log(
            LogLevel::Debug,
            "batch.fetch",
            json!({ "batch_size": self.settings.batch_size, "requested": requested }),
        );
        let records = match self.gateway.fetch_unprocessed(requested).await {
            Ok(records) => records,
            Err(err) => {
                self.stats.store_failures += 1;
                self.log(
                    failure_level(&err),
                    "batch.fetch_failed",
                    json!({
                        "operation": "fetch_unprocessed",
                        "transient": err.is_transient(),
                        "error": err.to_string(),
                    }),
                );
                return LoopState::Idle(IdleReason::Failure);
            }
        };
        let fetched = records.len();
        let fresh: Vec<Record> = records
            .into_iter()
            .filter(|record| !self.failed.contains(&record.id))
            .take(self.settings.batch_size)
            .collect();
        if fresh.is_empty() {
            if fetched > 0 {
                self.log(
                    LogLevel::Debug,
                    "batch.only_skipped_records",
                    json!({ "records": fetched }),
                );
            }
            return LoopState::Idle(IdleReason::Drained);
        }

        let predictions = self.classify_batch(&fresh);
        if predictions.is_empty() {
            self.log(
                LogLevel::Warn,
                "batch.all_records_failed",
                json!({ "records": fresh.len() }),
            );
            return LoopState::Idle(IdleReason::Failure);
        }
        if self.store(predictions).await {
            LoopState::Polling
        } else {
            LoopState::Idle(IdleReason::Failure)
        }
    }

    async fn store(&mut self, predictions: Vec<Prediction>) -> bool {
        match self.gateway.store_predictions(&predictions).await {
            Ok(()) => {
                self.stats.batches += 1;
                self.stats.predictions_stored += predictions.len() as u64;
                self.log(
                    LogLevel::Info,
                    "batch.stored",
                    json!({ "predictions": predictions.len() }),
                );
                true
            }
            Err(err) => {
                self.stats.store_failures += 1;
                self.log(
                    failure_level(&err),
                    "batch.store_failed",
                    json!({
                        "operation": "store_predictions",
                        "transient": err.is_transient(),
                        "predictions": predictions.len(),
                        "first_status_id": predictions.first().map(|p| p.id),
                        "error": err.to_string(),
                    }),
                );
                self.pending = Some(predictions);
                false
            }
        }
    }

    /// Runs until `shutdown` turns `true` or its sender is dropped, then flushes logs.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> LoopStats {
        self.log(
            LogLevel::Info,
            "loop.started",
            json!({
                "batch_size": self.settings.batch_size,
                "idle_interval_secs": self.settings.idle_interval.as_secs(),
            }),
        );
        let mut state = LoopState::Polling;
        loop {
            if *shutdown.borrow() {
                break;
            }
            state = match state {
                LoopState::Polling => {
                    tokio::select! {
                        biased;
                        () = stop_requested(&mut shutdown) => break,
                        next = self.poll() => next,
                    }
                }
                LoopState::Idle(reason) => {
                    let delay = match reason {
                        IdleReason::Drained => self.settings.idle_interval,
                        IdleReason::Failure => self.settings.retry_interval,
                    };
                    self.stats.idle_suspensions += 1;
                    self.log(
                        LogLevel::Info,
                        "loop.idle",
                        json!({ "reason": format!("{reason:?}"), "delay_secs": delay.as_secs_f64() }),
                    );
                    if !suspend(delay, &mut shutdown).await {
                        break;
                    }
                    LoopState::Polling
                }
            };
        }
        self.log(
            LogLevel::Info,
            "loop.stopped",
            serde_json::to_value(self.stats).unwrap_or_default(),
        );
        if let Err(err) = self.telemetry.flush() {
            eprintln!("failed to flush logs: {err:?}");
        }
        self.stats
    }

    fn log(&self, level: LogLevel, message: &str, metadata: serde_json::Value) {
        let _ = self.telemetry.log(level, message, metadata);
    }
}

/// Store outages are expected and retried; anything else points at a bug or bad settings.
const fn failure_level(err: &SentoError) -> LogLevel {
    if err.is_transient() {
        LogLevel::Warn
    } else {
        LogLevel::Error
    }
}

/// Resolves once shutdown is requested or the sender is gone.
async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Cancellable wait. Returns `false` when shutdown interrupted it.
async fn suspend(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        biased;
        () = stop_requested(shutdown) => false,
        () = sleep(delay) => true,
    }
}
