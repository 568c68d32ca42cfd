use sento_processing::{
    gateway::{InMemoryGateway, Prediction, Record, StatusGateway, StatusId},
    labels::SentimentCategory,
    SentoError,
};

fn predictions(ids: &[i64]) -> Vec<Prediction> {
    ids.iter()
        .map(|&id| Prediction {
            id: StatusId(id),
            sentiment: SentimentCategory::Neutral,
        })
        .collect()
}

#[tokio::test]
async fn mid_batch_failure_commits_nothing() {
    let gateway = InMemoryGateway::with_records([
        Record::new(1, "uno"),
        Record::new(2, "dos"),
        Record::new(3, "tres"),
    ]);
    let original = gateway.fetch_unprocessed(10).await.unwrap();

    gateway.fail_next_store_at(1);
    let err = gateway
        .store_predictions(&predictions(&[1, 2, 3]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SentoError::StoreUnavailable {
            operation: "store_predictions",
            ..
        }
    ));
    assert!(err.is_transient());

    assert_eq!(gateway.fetch_unprocessed(10).await.unwrap(), original);
    assert_eq!(gateway.sentiment(StatusId(1)), None);
}

#[tokio::test]
async fn retried_write_set_commits_after_failure() {
    let gateway = InMemoryGateway::with_records([Record::new(1, "uno"), Record::new(2, "dos")]);
    let write_set = predictions(&[1, 2]);

    gateway.fail_next_store_at(0);
    assert!(gateway.store_predictions(&write_set).await.is_err());
    gateway.store_predictions(&write_set).await.unwrap();

    assert!(gateway.fetch_unprocessed(10).await.unwrap().is_empty());
    assert_eq!(gateway.store_count(), 2);
}

#[tokio::test]
async fn empty_write_set_is_a_no_op() {
    let gateway = InMemoryGateway::with_records([Record::new(7, "siete")]);
    gateway.store_predictions(&[]).await.unwrap();
    assert_eq!(gateway.fetch_unprocessed(1).await.unwrap().len(), 1);
}
