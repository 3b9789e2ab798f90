/// Concurrent submission tests
///
/// Many clients submitting at once must leave every store aggregate equal
/// to the count and mean of its committed reviews.
/// Run with: cargo test --test concurrent_submission_tests
mod common;

use std::sync::Arc;

use common::{fresh_store, patient_config};
use futures::future::join_all;
use storereviews::transaction::SetMode;
use storereviews::{DocumentKey, DocumentStore, Fields, ReviewDraft, ReviewService, Value};
use tokio::sync::Barrier;

const TOLERANCE: f64 = 1e-9;

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_submissions_keep_exact_mean() {
    let store = fresh_store(&["S1"]).await;
    let service = Arc::new(ReviewService::with_config(store.clone(), patient_config()));

    let ratings: Vec<f64> = (0..40).map(|i| (i % 11) as f64 / 2.0).collect();
    let barrier = Arc::new(Barrier::new(ratings.len()));

    let mut handles = vec![];
    for rating in ratings.iter().copied() {
        let service = Arc::clone(&service);
        let barrier = Arc::clone(&barrier);
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            service.submit(ReviewDraft::new("S1", rating)).await
        }));
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let expected = ratings.iter().sum::<f64>() / ratings.len() as f64;
    let summary = service.store_summary("S1").await.unwrap();
    assert_eq!(summary.number_of_review, ratings.len() as u64);
    assert!(
        (summary.rating - expected).abs() < TOLERANCE,
        "rating {} drifted from {}",
        summary.rating,
        expected
    );
    assert_eq!(
        service.list_by_store("S1").await.unwrap().len(),
        ratings.len()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_no_lost_updates() {
    let store = fresh_store(&["S1"]).await;
    let service = Arc::new(ReviewService::with_config(store.clone(), patient_config()));
    let k = 64;

    let submissions = (0..k).map(|_| {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.submit(ReviewDraft::new("S1", 3.0)).await })
    });
    let results = join_all(submissions).await;

    let accepted = results
        .into_iter()
        .filter(|result| matches!(result, Ok(Ok(_))))
        .count();
    assert_eq!(accepted, k);

    let summary = service.store_summary("S1").await.unwrap();
    assert_eq!(summary.number_of_review, k as u64);
    assert_eq!(summary.rating, 3.0);
    assert_eq!(store.document_count("reviews").await, k);
    assert!(store.transaction_stats().committed >= k as u64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_racing_reviews_converge() {
    // Two racing reviews must both land; repeated so either may commit first
    for _ in 0..25 {
        let store = fresh_store(&["S1"]).await;
        let service = Arc::new(ReviewService::with_config(store.clone(), patient_config()));
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = [5.0, 1.0]
            .into_iter()
            .map(|rating| {
                let service = Arc::clone(&service);
                let barrier = Arc::clone(&barrier);
                tokio::spawn(async move {
                    barrier.wait().await;
                    service.submit(ReviewDraft::new("S1", rating)).await
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let summary = service.store_summary("S1").await.unwrap();
        assert_eq!(summary.rating, 3.0);
        assert_eq!(summary.number_of_review, 2);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_many_stores_progress_independently() {
    let store_ids = ["A", "B", "C", "D"];
    let store = fresh_store(&store_ids).await;
    let service = Arc::new(ReviewService::with_config(store.clone(), patient_config()));

    let mut handles = vec![];
    for (idx, &store_id) in store_ids.iter().enumerate() {
        for n in 0..15 {
            let service = Arc::clone(&service);
            let rating = ((idx + n) % 6) as f64;
            handles.push(tokio::spawn(async move {
                service
                    .submit(ReviewDraft::new(store_id, rating))
                    .await
                    .map(|review| (review.store_id, review.rating))
            }));
        }
    }

    let mut per_store: std::collections::HashMap<String, Vec<f64>> = Default::default();
    for handle in handles {
        let (store_id, rating) = handle.await.unwrap().unwrap();
        per_store.entry(store_id).or_default().push(rating);
    }

    for store_id in store_ids {
        let ratings = &per_store[store_id];
        let expected = ratings.iter().sum::<f64>() / ratings.len() as f64;
        let summary = service.store_summary(store_id).await.unwrap();

        assert_eq!(summary.number_of_review, 15);
        assert!((summary.rating - expected).abs() < TOLERANCE);
        assert_eq!(service.list_by_store(store_id).await.unwrap().len(), 15);
    }
}

#[tokio::test]
async fn test_transactions_on_different_stores_do_not_conflict() {
    let store = fresh_store(&["A", "B"]).await;
    let key_a = DocumentKey::new("stores", "A");
    let key_b = DocumentKey::new("stores", "B");

    let mut on_a = store.begin().await.unwrap();
    let mut on_b = store.begin().await.unwrap();
    store.get_in(&mut on_a, &key_a).await.unwrap();
    store.get_in(&mut on_b, &key_b).await.unwrap();

    let mut bump = Fields::new();
    bump.insert("numberOfReview".to_string(), Value::Integer(1));
    on_a.set(key_a.clone(), bump.clone(), SetMode::Merge).unwrap();
    on_b.set(key_b.clone(), bump, SetMode::Merge).unwrap();

    store.commit(on_b).await.unwrap();
    store.commit(on_a).await.unwrap();

    assert_eq!(store.transaction_stats().conflicted, 0);
}

#[tokio::test]
async fn test_stale_aggregate_read_is_rejected() {
    let store = fresh_store(&["S1"]).await;
    let service = ReviewService::new(store.clone());
    let key = DocumentKey::new("stores", "S1");

    // A writer that read the aggregate before another submission landed
    let mut stale = store.begin().await.unwrap();
    store.get_in(&mut stale, &key).await.unwrap();

    service.submit(ReviewDraft::new("S1", 4.0)).await.unwrap();

    let mut overwrite = Fields::new();
    overwrite.insert("rating".to_string(), Value::from("1"));
    overwrite.insert("numberOfReview".to_string(), Value::Integer(1));
    stale.set(key, overwrite, SetMode::Merge).unwrap();

    assert!(store.commit(stale).await.unwrap_err().is_conflict());

    let summary = service.store_summary("S1").await.unwrap();
    assert_eq!(summary.rating, 4.0);
    assert_eq!(summary.number_of_review, 1);
}
