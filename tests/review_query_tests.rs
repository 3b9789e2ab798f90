/// Review query tests
///
/// Listing a store's reviews and reading its summary.
/// Run with: cargo test --test review_query_tests
mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::{FaultyStore, fresh_store};
use storereviews::{DocumentKey, Fields, ReviewDraft, ReviewError, ReviewService, Value};

#[tokio::test]
async fn test_reviews_listed_newest_first() {
    let store = fresh_store(&["S1"]).await;
    let service = ReviewService::new(store.clone());

    let mut submitted = vec![];
    for rating in [1.0, 2.0, 3.0] {
        submitted.push(service.submit(ReviewDraft::new("S1", rating)).await.unwrap());
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let listed = service.list_by_store("S1").await.unwrap();
    let ids: Vec<_> = listed.iter().map(|review| review.id.clone()).collect();
    let expected: Vec<_> = submitted.iter().rev().map(|review| review.id.clone()).collect();
    assert_eq!(ids, expected);
    assert!(listed.windows(2).all(|pair| pair[0].created_at >= pair[1].created_at));
}

#[tokio::test]
async fn test_other_stores_reviews_excluded() {
    let store = fresh_store(&["S1", "S2"]).await;
    let service = ReviewService::new(store.clone());

    service.submit(ReviewDraft::new("S1", 4.0)).await.unwrap();
    service.submit(ReviewDraft::new("S2", 2.0)).await.unwrap();
    service.submit(ReviewDraft::new("S2", 3.0)).await.unwrap();

    let listed = service.list_by_store("S1").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].store_id, "S1");
    assert_eq!(listed[0].rating, 4.0);
    assert_eq!(service.list_by_store("S2").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_store_without_reviews_lists_empty() {
    let store = fresh_store(&["S1"]).await;
    let service = ReviewService::new(store);

    assert!(service.list_by_store("S1").await.unwrap().is_empty());
    // An unknown store has no reviews either
    assert!(service.list_by_store("nowhere").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_repeated_reads_are_stable() {
    let store = fresh_store(&["S1"]).await;
    let service = ReviewService::new(store.clone());
    service
        .submit(ReviewDraft::new("S1", 5.0).text("great").image("a.png"))
        .await
        .unwrap();

    let first = service.list_by_store("S1").await.unwrap();
    let second = service.list_by_store("S1").await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first[0].text, "great");
    assert_eq!(first[0].images, vec!["a.png".to_string()]);

    let summary = service.store_summary("S1").await.unwrap();
    assert_eq!(summary, service.store_summary("S1").await.unwrap());
    assert_eq!(summary.number_of_review, 1);
}

#[tokio::test]
async fn test_store_summary_unknown_store() {
    let store = fresh_store(&[]).await;
    let service = ReviewService::new(store);

    let err = service.store_summary("ghost").await.unwrap_err();
    assert!(matches!(err, ReviewError::StoreNotFound(id) if id == "ghost"));
}

#[tokio::test]
async fn test_store_summary_reports_corrupt_aggregate() {
    let store = fresh_store(&[]).await;
    common::seed_store(&store, "S1", Some(Value::from("n/a")), Some(3)).await;
    let service = ReviewService::new(store);

    let err = service.store_summary("S1").await.unwrap_err();
    assert!(matches!(err, ReviewError::CorruptAggregate { .. }));
}

#[tokio::test]
async fn test_query_failure_surfaces() {
    let inner = fresh_store(&["S1"]).await;
    let faulty = Arc::new(FaultyStore::new(inner).fail_queries());
    let service = ReviewService::new(faulty);

    let err = service.list_by_store("S1").await.unwrap_err();
    assert!(matches!(err, ReviewError::QueryFailed(_)));
}

#[tokio::test]
async fn test_malformed_review_document_fails_listing() {
    let store = fresh_store(&["S1"]).await;

    let mut fields = Fields::new();
    fields.insert("storeId".to_string(), Value::from("S1"));
    fields.insert("rating".to_string(), Value::from("five"));
    fields.insert("createdAt".to_string(), Value::Timestamp(Utc::now()));
    store
        .insert_document(DocumentKey::new("reviews", "broken"), fields)
        .await
        .unwrap();

    let service = ReviewService::new(store);
    let err = service.list_by_store("S1").await.unwrap_err();
    assert!(matches!(err, ReviewError::QueryFailed(reason) if reason.contains("broken")));
}
