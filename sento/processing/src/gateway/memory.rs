use async_trait::async_trait;
use parking_lot::Mutex;

use super::{Prediction, Record, StatusGateway, StatusId};
use crate::{
    error::{Result, SentoError},
    labels::SentimentCategory,
};

#[derive(Debug, Clone)]
struct Row {
    id: StatusId,
    content: String,
    sentiment: Option<SentimentCategory>,
}

#[derive(Debug, Default)]
struct Table {
    rows: Vec<Row>,
    fail_update_at: Option<usize>,
    failing_fetches: usize,
    fetches: usize,
    stores: usize,
}

/// `statuses` table kept in memory, with injectable store failures.
///
/// Writes are staged and applied only once every update of the batch has succeeded,
/// matching the all-or-nothing contract of the SQL gateway.
#[derive(Debug, Default)]
pub struct InMemoryGateway {
    table: Mutex<Table>,
}

impl InMemoryGateway {
    /// Empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Table pre-filled with unprocessed records.
    #[must_use]
    pub fn with_records(records: impl IntoIterator<Item = Record>) -> Self {
        let gateway = Self::new();
        for record in records {
            gateway.insert(record);
        }
        gateway
    }

    /// Appends an unprocessed record.
    pub fn insert(&self, record: Record) {
        self.table.lock().rows.push(Row {
            id: record.id,
            content: record.content,
            sentiment: None,
        });
    }

    /// Makes the next `store_predictions` call fail on its `index`-th update (0-based).
    pub fn fail_next_store_at(&self, index: usize) {
        self.table.lock().fail_update_at = Some(index);
    }

    /// Makes the next `count` fetches fail as if the store were unreachable.
    pub fn fail_next_fetches(&self, count: usize) {
        self.table.lock().failing_fetches = count;
    }

    /// Committed sentiment of `id`, if any.
    #[must_use]
    pub fn sentiment(&self, id: StatusId) -> Option<SentimentCategory> {
        self.table
            .lock()
            .rows
            .iter()
            .find(|row| row.id == id)
            .and_then(|row| row.sentiment)
    }

    /// Number of fetch attempts so far.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.table.lock().fetches
    }

    /// Number of store attempts so far.
    #[must_use]
    pub fn store_count(&self) -> usize {
        self.table.lock().stores
    }
}

#[async_trait]
impl StatusGateway for InMemoryGateway {
    async fn fetch_unprocessed(&self, batch_size: usize) -> Result<Vec<Record>> {
        if batch_size == 0 {
            return Err(SentoError::Configuration(
                "batch size must be positive".into(),
            ));
        }
        let mut table = self.table.lock();
        table.fetches += 1;
        if table.failing_fetches > 0 {
            table.failing_fetches -= 1;
            return Err(SentoError::store(
                "fetch_unprocessed",
                "simulated store outage",
            ));
        }
        Ok(table
            .rows
            .iter()
            .filter(|row| row.sentiment.is_none())
            .take(batch_size)
            .map(|row| Record {
                id: row.id,
                content: row.content.clone(),
            })
            .collect())
    }

    async fn store_predictions(&self, predictions: &[Prediction]) -> Result<()> {
        let mut table = self.table.lock();
        table.stores += 1;
        let fail_at = table.fail_update_at.take();
        let mut staged = Vec::with_capacity(predictions.len());
        for (index, prediction) in predictions.iter().enumerate() {
            if fail_at == Some(index) {
                return Err(SentoError::store(
                    "store_predictions",
                    format!("simulated failure updating status {}", prediction.id),
                ));
            }
            // unknown ids update nothing, like an UPDATE matching zero rows
            if let Some(position) = table.rows.iter().position(|row| row.id == prediction.id) {
                staged.push((position, prediction.sentiment));
            }
        }
        for (position, sentiment) in staged {
            table.rows[position].sentiment = Some(sentiment);
        }
        Ok(())
    }
}
