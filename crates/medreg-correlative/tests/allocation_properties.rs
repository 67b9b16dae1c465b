//! Allocation behavior under concurrency, rollback and lock contention,
//! exercised against the in-memory backend.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use medreg_core::Prefix;
use medreg_correlative::{
    AllocationError, AllocatorConfig, CorrelativeAllocator, UnknownPrefixPolicy,
};
use medreg_db_memory::{InMemoryStorage, StorageOptions};
use medreg_storage::{RegistryStorage, StorageError};
use tokio::task::JoinSet;

fn allocator() -> Arc<CorrelativeAllocator> {
    Arc::new(CorrelativeAllocator::new(AllocatorConfig::default()).unwrap())
}

fn prefix(p: &str) -> Prefix {
    Prefix::new(p).unwrap()
}

/// Allocates one code for `prefix` in its own committed transaction.
async fn allocate_committed(
    storage: &InMemoryStorage,
    allocator: &CorrelativeAllocator,
    prefix: &str,
) -> String {
    let mut tx = storage.begin_transaction().await.unwrap();
    let code = allocator.allocate(prefix, &mut *tx).await.unwrap();
    tx.commit().await.unwrap();
    code.into_string()
}

#[tokio::test]
async fn test_sequential_allocations_have_no_gaps() {
    let storage = InMemoryStorage::new();
    let allocator = allocator();

    let mut values = Vec::new();
    for _ in 0..10 {
        let mut tx = storage.begin_transaction().await.unwrap();
        let code = allocator.allocate("CP", &mut *tx).await.unwrap();
        tx.commit().await.unwrap();
        values.push(code.value());
    }

    assert_eq!(values, (1..=10).collect::<Vec<i64>>());
    assert_eq!(storage.peek_counter(&prefix("CP")).await.unwrap(), 10);
}

#[tokio::test]
async fn test_codes_are_zero_padded() {
    let storage = InMemoryStorage::new();
    let allocator = allocator();

    assert_eq!(allocate_committed(&storage, &allocator, "CP").await, "CP000001");
    assert_eq!(allocate_committed(&storage, &allocator, "CP").await, "CP000002");
    assert_eq!(allocate_committed(&storage, &allocator, "HC").await, "HC000001");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_allocations_are_unique() {
    let storage = InMemoryStorage::new();
    let allocator = allocator();

    let mut tasks = JoinSet::new();
    for _ in 0..100 {
        let storage = storage.clone();
        let allocator = Arc::clone(&allocator);
        tasks.spawn(async move {
            let mut tx = storage.begin_transaction().await.unwrap();
            let code = allocator.allocate("CP", &mut *tx).await.unwrap();
            tx.commit().await.unwrap();
            code.into_string()
        });
    }

    let mut codes = HashSet::new();
    while let Some(result) = tasks.join_next().await {
        assert!(codes.insert(result.unwrap()), "duplicate code issued");
    }

    let expected: HashSet<String> = (1..=100).map(|n| format!("CP{n:06}")).collect();
    assert_eq!(codes, expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fifty_concurrent_registrations_form_contiguous_range() {
    let storage = InMemoryStorage::new();
    let allocator = allocator();
    for _ in 0..3 {
        allocate_committed(&storage, &allocator, "HC").await;
    }

    let mut tasks = JoinSet::new();
    for _ in 0..50 {
        let storage = storage.clone();
        let allocator = Arc::clone(&allocator);
        tasks.spawn(async move {
            let mut tx = storage.begin_transaction().await.unwrap();
            let code = allocator.allocate("HC", &mut *tx).await.unwrap();
            tokio::task::yield_now().await;
            tx.commit().await.unwrap();
            code.value()
        });
    }

    let mut values = Vec::new();
    while let Some(result) = tasks.join_next().await {
        values.push(result.unwrap());
    }
    values.sort_unstable();

    assert_eq!(values, (4..=53).collect::<Vec<i64>>());
    assert_eq!(storage.peek_counter(&prefix("HC")).await.unwrap(), 53);
}

#[tokio::test]
async fn test_rolled_back_allocation_is_reissued() {
    let storage = InMemoryStorage::new();
    let allocator = allocator();

    let mut tx = storage.begin_transaction().await.unwrap();
    let code = allocator.allocate("CP", &mut *tx).await.unwrap();
    assert_eq!(code.as_str(), "CP000001");
    tx.rollback().await.unwrap();

    assert_eq!(storage.peek_counter(&prefix("CP")).await.unwrap(), 0);
    assert_eq!(allocate_committed(&storage, &allocator, "CP").await, "CP000001");
}

#[tokio::test]
async fn test_dropped_transaction_is_rolled_back() {
    let storage = InMemoryStorage::new();
    let allocator = allocator();

    {
        let mut tx = storage.begin_transaction().await.unwrap();
        allocator.allocate("CP", &mut *tx).await.unwrap();
        allocator.allocate("CP", &mut *tx).await.unwrap();
    }

    assert_eq!(storage.peek_counter(&prefix("CP")).await.unwrap(), 0);
    assert_eq!(allocate_committed(&storage, &allocator, "CP").await, "CP000001");
    assert_eq!(storage.transaction_stats().rolled_back, 1);
}

#[tokio::test]
async fn test_repeat_allocation_in_one_transaction_continues_sequence() {
    let storage = InMemoryStorage::new();
    let allocator = allocator();

    let mut tx = storage.begin_transaction().await.unwrap();
    let first = allocator.allocate("CP", &mut *tx).await.unwrap();
    let second = allocator.allocate("CP", &mut *tx).await.unwrap();
    tx.commit().await.unwrap();

    assert_eq!((first.value(), second.value()), (1, 2));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_waiter_sees_committed_value() {
    let storage = InMemoryStorage::new();
    let allocator = allocator();

    let mut holder = storage.begin_transaction().await.unwrap();
    assert_eq!(allocator.allocate("CP", &mut *holder).await.unwrap().value(), 1);

    let waiter = {
        let storage = storage.clone();
        let allocator = Arc::clone(&allocator);
        tokio::spawn(async move {
            let mut tx = storage.begin_transaction().await.unwrap();
            let code = allocator.allocate("CP", &mut *tx).await.unwrap();
            tx.commit().await.unwrap();
            code.value()
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!waiter.is_finished());
    holder.commit().await.unwrap();

    assert_eq!(waiter.await.unwrap(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_waiter_after_rollback_sees_unincremented_value() {
    let storage = InMemoryStorage::new();
    let allocator = allocator();

    let mut holder = storage.begin_transaction().await.unwrap();
    allocator.allocate("CP", &mut *holder).await.unwrap();

    let waiter = {
        let storage = storage.clone();
        let allocator = Arc::clone(&allocator);
        tokio::spawn(async move {
            let mut tx = storage.begin_transaction().await.unwrap();
            let code = allocator.allocate("CP", &mut *tx).await.unwrap();
            tx.commit().await.unwrap();
            code.value()
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    holder.rollback().await.unwrap();

    assert_eq!(waiter.await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_held_prefix_does_not_block_other_prefix() {
    let storage = InMemoryStorage::with_options(
        StorageOptions::default().with_lock_timeout(Duration::from_millis(100)),
    );
    let allocator = allocator();

    let mut holder = storage.begin_transaction().await.unwrap();
    allocator.allocate("CP", &mut *holder).await.unwrap();

    // HC is free while CP is held.
    let hc = tokio::time::timeout(
        Duration::from_millis(50),
        allocate_committed(&storage, &allocator, "HC"),
    )
    .await
    .expect("HC allocation blocked by CP lock");
    assert_eq!(hc, "HC000001");

    // A second CP allocator times out.
    let mut waiter = storage.begin_transaction().await.unwrap();
    let err = allocator.allocate("CP", &mut *waiter).await.unwrap_err();
    assert!(err.is_retryable());
    match err {
        AllocationError::AllocationFailed { prefix, source } => {
            assert_eq!(prefix, "CP");
            assert!(matches!(source, StorageError::LockTimeout { .. }));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    waiter.rollback().await.unwrap();

    holder.commit().await.unwrap();
    assert_eq!(storage.peek_counter(&prefix("CP")).await.unwrap(), 1);
    assert_eq!(storage.transaction_stats().lock_timeouts, 1);
}

#[tokio::test]
async fn test_unknown_prefix_registered_lazily() {
    let storage = InMemoryStorage::new();
    let allocator = allocator();

    assert_eq!(allocate_committed(&storage, &allocator, "LAB").await, "LAB000001");
    assert_eq!(storage.peek_counter(&prefix("LAB")).await.unwrap(), 1);
}

#[tokio::test]
async fn test_reject_policy_refuses_unknown_prefix() {
    let storage = InMemoryStorage::new();
    let config = AllocatorConfig {
        unknown_prefix: UnknownPrefixPolicy::Reject,
        ..Default::default()
    };
    let allocator = CorrelativeAllocator::new(config).unwrap();

    let mut tx = storage.begin_transaction().await.unwrap();
    let err = allocator.allocate("LAB", &mut *tx).await.unwrap_err();
    assert!(matches!(err, AllocationError::InvalidPrefix { .. }));
    assert!(!err.is_retryable());

    // Configured prefixes still work in the same transaction.
    let code = allocator.allocate("CP", &mut *tx).await.unwrap();
    tx.commit().await.unwrap();

    assert_eq!(code.as_str(), "CP000001");
    assert_eq!(storage.peek_counter(&prefix("LAB")).await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_allocate_many_in_opposite_orders_does_not_deadlock() {
    let storage = InMemoryStorage::with_options(
        StorageOptions::default().with_lock_timeout(Duration::from_secs(2)),
    );
    let allocator = allocator();

    let mut tasks = JoinSet::new();
    for i in 0..20 {
        let storage = storage.clone();
        let allocator = Arc::clone(&allocator);
        let request: &'static [&'static str] = if i % 2 == 0 {
            &["CP", "HC"]
        } else {
            &["HC", "CP"]
        };
        tasks.spawn(async move {
            let mut tx = storage.begin_transaction().await.unwrap();
            let codes = allocator.allocate_many(request, &mut *tx).await.unwrap();
            tokio::task::yield_now().await;
            tx.commit().await.unwrap();
            codes
        });
    }

    let mut cp = HashSet::new();
    let mut hc = HashSet::new();
    while let Some(result) = tasks.join_next().await {
        for code in result.unwrap() {
            match code.prefix().as_str() {
                "CP" => assert!(cp.insert(code.value())),
                _ => assert!(hc.insert(code.value())),
            }
        }
    }

    assert_eq!(cp, (1..=20).collect::<HashSet<i64>>());
    assert_eq!(hc, (1..=20).collect::<HashSet<i64>>());
}
