//! Queue invariants under pseudo-random operation sequences

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use screenwall::queue_store::{
    approved_photo, ordering, MemoryQueueBackend, PhotoSource, QueueEntry, QueueScope, QueueStore,
};
use screenwall::realtime_hub::RealtimeHub;
use screenwall::Error;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

const PHOTOS: usize = 24;
const STEPS: usize = 400;

async fn setup() -> (Arc<QueueStore>, Arc<MemoryQueueBackend>) {
    let backend = Arc::new(MemoryQueueBackend::new());
    let now = Utc::now();
    for i in 0..PHOTOS {
        let source = if i % 3 == 0 {
            PhotoSource::User
        } else {
            PhotoSource::Photographer
        };
        backend
            .insert_photo(approved_photo(&format!("p{}", i), source, now))
            .await;
    }
    let store = Arc::new(QueueStore::new(backend.clone(), Arc::new(RealtimeHub::new())));
    (store, backend)
}

fn scopes() -> Vec<QueueScope> {
    vec![
        QueueScope::Screen("s1".to_string()),
        QueueScope::Screen("s2".to_string()),
        QueueScope::Global,
    ]
}

fn positions_by_id(entries: &[QueueEntry]) -> HashMap<String, i32> {
    entries.iter().map(|e| (e.id.clone(), e.position)).collect()
}

fn assert_well_formed(scope: &QueueScope, entries: &[QueueEntry]) {
    assert!(
        ordering::is_contiguous(entries.iter().map(|e| e.position)),
        "{} positions not contiguous: {:?}",
        scope,
        entries.iter().map(|e| e.position).collect::<Vec<_>>()
    );
    let photos: HashSet<&str> = entries.iter().map(|e| e.photo_id.as_str()).collect();
    assert_eq!(photos.len(), entries.len(), "{} has a duplicate photo", scope);
}

async fn run_sequence(seed: u64) {
    let (store, backend) = setup().await;
    let mut rng = StdRng::seed_from_u64(seed);
    let scopes = scopes();

    for _ in 0..STEPS {
        let scope = &scopes[rng.gen_range(0..scopes.len())];
        let before = backend.entries(scope).await;
        let len = before.len();

        match rng.gen_range(0..4) {
            0 => {
                let photo_id = format!("p{}", rng.gen_range(0..PHOTOS));
                let requested = if rng.gen_bool(0.5) {
                    Some(rng.gen_range(0..(len as i32 + 3)))
                } else {
                    None
                };
                let already = before.iter().any(|e| e.photo_id == photo_id);
                match store.add_to_queue(scope, &photo_id, requested).await {
                    Ok(entry) => {
                        assert!(!already);
                        let expected = requested.unwrap_or(len as i32).min(len as i32);
                        assert_eq!(entry.position, expected);
                        assert_eq!(backend.entries(scope).await.len(), len + 1);
                    }
                    Err(Error::AlreadyQueued { .. }) => {
                        assert!(already);
                        assert_eq!(backend.entries(scope).await, before);
                    }
                    Err(e) => panic!("unexpected add error: {}", e),
                }
            }
            1 if len > 0 => {
                let victim = &before[rng.gen_range(0..len)];
                let removed = store.remove_from_queue(scope, &victim.id).await.unwrap();
                assert_eq!(removed.id, victim.id);

                let after = positions_by_id(&backend.entries(scope).await);
                assert_eq!(after.len(), len - 1);
                for entry in &before {
                    if entry.id == victim.id {
                        continue;
                    }
                    let expected = if entry.position > victim.position {
                        entry.position - 1
                    } else {
                        entry.position
                    };
                    assert_eq!(after[&entry.id], expected);
                }
            }
            2 if len > 0 => {
                let moved = &before[rng.gen_range(0..len)];
                let requested = rng.gen_range(0..(len as i32 + 3));
                let to = requested.min(len as i32 - 1);

                let result = store
                    .reorder_queue_item(scope, &moved.id, requested)
                    .await
                    .unwrap();
                assert_eq!(result.previous_position, moved.position);
                assert_eq!(result.entry.position, to);

                let after = positions_by_id(&backend.entries(scope).await);
                assert_eq!(after.len(), len);
                let shifted = before
                    .iter()
                    .filter(|e| e.id != moved.id && after[&e.id] != e.position)
                    .count();
                assert_eq!(shifted as i32, (to - moved.position).abs());
            }
            _ if len > 0 => {
                let head = before[0].clone();
                let skipped = store.skip_current_photo(scope).await.unwrap();
                assert_eq!(skipped.id, head.id);

                let after = backend.entries(scope).await;
                assert_eq!(after.len(), len - 1);
                for (i, entry) in after.iter().enumerate() {
                    assert_eq!(entry.id, before[i + 1].id);
                }
            }
            _ => {
                let err = store.skip_current_photo(scope).await.unwrap_err();
                assert_eq!(err.code(), "EMPTY_QUEUE");
            }
        }

        for scope in &scopes {
            assert_well_formed(scope, &backend.entries(scope).await);
        }
    }
}

#[tokio::test]
async fn test_random_sequences_keep_queues_well_formed() {
    for seed in [1, 7, 42, 2024] {
        run_sequence(seed).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_adds_stay_contiguous() {
    let (store, backend) = setup().await;
    let scope = QueueScope::Screen("s1".to_string());

    let mut tasks = Vec::new();
    for i in 0..PHOTOS {
        let store = store.clone();
        let scope = scope.clone();
        tasks.push(tokio::spawn(async move {
            let position = if i % 2 == 0 { Some(0) } else { None };
            store
                .add_to_queue(&scope, &format!("p{}", i), position)
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let entries = backend.entries(&scope).await;
    assert_eq!(entries.len(), PHOTOS);
    assert_well_formed(&scope, &entries);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_consume_sets_displayed_once() {
    let (store, backend) = setup().await;
    let scope = QueueScope::Global;
    let entry = store.add_to_queue(&scope, "p0", None).await.unwrap();

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        let id = entry.id.clone();
        tasks.push(tokio::spawn(async move { store.consume_entry(&id, Utc::now()).await }));
    }

    let mut consumed = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(e) => {
                assert!(e.displayed_at.is_some());
                consumed += 1;
            }
            Err(e) => assert_eq!(e.code(), "NOT_FOUND"),
        }
    }
    assert_eq!(consumed, 1);
    assert_eq!(backend.display_history().await.len(), 1);
    assert!(backend.entries(&scope).await.is_empty());
}
