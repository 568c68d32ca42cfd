use std::time::Duration;

use async_trait::async_trait;
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions, PgRow},
    PgPool, Row,
};

use super::{Prediction, Record, StatusGateway, StatusId};
use crate::{
    config::PostgresSettings,
    error::{Result, SentoError},
};

const FETCH_UNPROCESSED: &str = r"
SELECT
  s.id AS id,
  s.content AS content
FROM
  data.statuses AS s
WHERE
  s.sentiment IS NULL
LIMIT $1";

const STORE_PREDICTION: &str = r"
UPDATE
  data.statuses
SET
  sentiment = $2
WHERE
  id = $1";

/// Gateway over `data.statuses` backed by a `sqlx` connection pool.
#[derive(Debug, Clone)]
pub struct PgStatusGateway {
    pool: PgPool,
}

impl PgStatusGateway {
    /// Wraps an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens the pool and checks that the server is reachable.
    pub async fn connect(settings: &PostgresSettings) -> Result<Self> {
        let pool = pool_options(settings)
            .connect_with(connect_options(settings))
            .await
            .map_err(|err| SentoError::store("connect", err))?;
        Ok(Self { pool })
    }

    /// Builds the pool without connecting; the first query opens a connection.
    #[must_use]
    pub fn connect_lazy(settings: &PostgresSettings) -> Self {
        let pool = pool_options(settings).connect_lazy_with(connect_options(settings));
        Self { pool }
    }

    /// Underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn connect_options(settings: &PostgresSettings) -> PgConnectOptions {
    PgConnectOptions::new()
        .host(&settings.host)
        .port(settings.port)
        .username(&settings.user)
        .password(&settings.password)
        .database(&settings.db_name)
}

fn pool_options(settings: &PostgresSettings) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs))
}

fn decode(row: &PgRow) -> std::result::Result<Record, sqlx::Error> {
    let content: Option<String> = row.try_get("content")?;
    Ok(Record {
        id: StatusId(row.try_get("id")?),
        content: content.unwrap_or_default(),
    })
}

#[async_trait]
impl StatusGateway for PgStatusGateway {
    async fn fetch_unprocessed(&self, batch_size: usize) -> Result<Vec<Record>> {
        const OPERATION: &str = "fetch_unprocessed";
        if batch_size == 0 {
            return Err(SentoError::Configuration(
                "batch size must be positive".into(),
            ));
        }
        let limit = i64::try_from(batch_size).unwrap_or(i64::MAX);
        let unavailable = |err: sqlx::Error| SentoError::store(OPERATION, err);

        let mut tx = self.pool.begin().await.map_err(unavailable)?;
        let rows = sqlx::query(FETCH_UNPROCESSED)
            .bind(limit)
            .fetch_all(&mut *tx)
            .await
            .map_err(unavailable)?;
        tx.commit().await.map_err(unavailable)?;

        rows.iter()
            .map(decode)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(unavailable)
    }

    async fn store_predictions(&self, predictions: &[Prediction]) -> Result<()> {
        const OPERATION: &str = "store_predictions";
        if predictions.is_empty() {
            return Ok(());
        }
        let unavailable = |err: sqlx::Error| SentoError::store(OPERATION, err);

        // dropping `tx` before commit rolls the whole batch back
        let mut tx = self.pool.begin().await.map_err(unavailable)?;
        for prediction in predictions {
            sqlx::query(STORE_PREDICTION)
                .bind(prediction.id.0)
                .bind(prediction.sentiment.value())
                .execute(&mut *tx)
                .await
                .map_err(unavailable)?;
        }
        tx.commit().await.map_err(unavailable)
    }
}
