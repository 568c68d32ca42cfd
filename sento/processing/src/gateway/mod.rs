//! Persistence boundary for `statuses` rows.

/// In-process table with fault injection.
pub mod memory;
/// PostgreSQL gateway.
pub mod postgres;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{error::Result, labels::SentimentCategory};

pub use memory::InMemoryGateway;
pub use postgres::PgStatusGateway;

/// Opaque status identifier (`statuses.id`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusId(pub i64);

impl fmt::Display for StatusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unprocessed status as read from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Row identifier.
    pub id: StatusId,
    /// Status text.
    pub content: String,
}

impl Record {
    /// Convenience constructor.
    #[must_use]
    pub fn new(id: i64, content: impl Into<String>) -> Self {
        Self {
            id: StatusId(id),
            content: content.into(),
        }
    }
}

/// Predicted sentiment for one status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    /// Row identifier copied from the [`Record`].
    pub id: StatusId,
    /// Predicted category.
    pub sentiment: SentimentCategory,
}

/// Source of unprocessed statuses and sink for their predictions.
#[async_trait]
pub trait StatusGateway: Send + Sync {
    /// Up to `batch_size` statuses whose sentiment is unset. Empty means nothing to do.
    async fn fetch_unprocessed(&self, batch_size: usize) -> Result<Vec<Record>>;

    /// Writes every prediction in one transaction; on error nothing is committed.
    async fn store_predictions(&self, predictions: &[Prediction]) -> Result<()>;
}
