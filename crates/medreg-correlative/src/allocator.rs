use std::collections::HashSet;

use medreg_core::{CorrelativeCode, Prefix};
use medreg_storage::{CounterStore, StorageError};
use tracing::{debug, info, instrument};

use crate::config::{AllocatorConfig, UnknownPrefixPolicy};
use crate::error::AllocationError;

/// A prefix checked against the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPrefix {
    pub prefix: Prefix,
    pub padding_width: usize,
    /// Position in the configured list; `None` for lazily registered prefixes.
    pub rank: Option<usize>,
}

impl ResolvedPrefix {
    /// Configured prefixes first in list order, then the rest by name.
    fn lock_order(&self) -> (usize, &str) {
        match self.rank {
            Some(rank) => (rank, ""),
            None => (usize::MAX, self.prefix.as_str()),
        }
    }
}

/// Issues the next code of a sequence inside a caller-owned transaction.
///
/// The allocator holds no counter state of its own. Every call locks the
/// counter row through the given [`CounterStore`], increments it and writes
/// it back; the number becomes permanent only when the caller commits. It
/// never begins, commits, rolls back or retries a transaction.
#[derive(Debug, Clone)]
pub struct CorrelativeAllocator {
    config: AllocatorConfig,
}

impl CorrelativeAllocator {
    pub fn new(config: AllocatorConfig) -> Result<Self, medreg_core::CoreError> {
        config.validate()?;
        info!(
            prefixes = ?config.prefixes.iter().map(|p| p.prefix.as_str()).collect::<Vec<_>>(),
            padding_width = config.padding_width,
            unknown_prefix = ?config.unknown_prefix,
            "correlative allocator configured"
        );
        Ok(Self { config })
    }

    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    /// Validates `prefix` and applies the unknown-prefix policy.
    pub fn resolve(&self, prefix: &str) -> Result<ResolvedPrefix, AllocationError> {
        let parsed = Prefix::new(prefix).map_err(|e| match e {
            medreg_core::CoreError::InvalidPrefix { reason, .. } => {
                AllocationError::invalid_prefix(prefix, reason)
            }
            other => AllocationError::invalid_prefix(prefix, other.to_string()),
        })?;

        let configured = self
            .config
            .prefixes
            .iter()
            .enumerate()
            .find(|(_, entry)| entry.prefix == parsed);

        match (configured, self.config.unknown_prefix) {
            (Some((rank, entry)), _) => Ok(ResolvedPrefix {
                prefix: parsed,
                padding_width: entry.padding_width.unwrap_or(self.config.padding_width),
                rank: Some(rank),
            }),
            (None, UnknownPrefixPolicy::Register) => Ok(ResolvedPrefix {
                prefix: parsed,
                padding_width: self.config.padding_width,
                rank: None,
            }),
            (None, UnknownPrefixPolicy::Reject) => Err(AllocationError::invalid_prefix(
                prefix,
                "not a configured sequence",
            )),
        }
    }

    /// Allocates the next code for `prefix` within `store`'s transaction.
    ///
    /// # Errors
    ///
    /// - `InvalidPrefix` if the prefix is malformed or rejected by policy;
    ///   the store is not touched.
    /// - `Exhausted` if the counter is already at `i64::MAX`.
    /// - `AllocationFailed` for any store error, lock timeouts included.
    #[instrument(skip(self, store))]
    pub async fn allocate<S>(
        &self,
        prefix: &str,
        store: &mut S,
    ) -> Result<CorrelativeCode, AllocationError>
    where
        S: CounterStore + ?Sized,
    {
        let resolved = self.resolve(prefix)?;
        self.allocate_resolved(&resolved, store).await
    }

    /// Allocates one code per prefix in a single transaction.
    ///
    /// Rows are locked in the global order regardless of request order, so
    /// two callers asking for the same set never wait on each other in a
    /// cycle. Codes are returned in request order.
    #[instrument(skip(self, store))]
    pub async fn allocate_many<S>(
        &self,
        prefixes: &[&str],
        store: &mut S,
    ) -> Result<Vec<CorrelativeCode>, AllocationError>
    where
        S: CounterStore + ?Sized,
    {
        let resolved = prefixes
            .iter()
            .map(|p| self.resolve(p))
            .collect::<Result<Vec<_>, _>>()?;

        let mut seen = HashSet::new();
        for r in &resolved {
            if !seen.insert(r.prefix.as_str()) {
                return Err(AllocationError::invalid_prefix(
                    r.prefix.as_str(),
                    "requested more than once in one transaction",
                ));
            }
        }

        let mut order: Vec<usize> = (0..resolved.len()).collect();
        order.sort_by(|a, b| resolved[*a].lock_order().cmp(&resolved[*b].lock_order()));

        let mut issued = Vec::with_capacity(resolved.len());
        for index in order {
            let code = self.allocate_resolved(&resolved[index], store).await?;
            issued.push((index, code));
        }
        issued.sort_by_key(|(index, _)| *index);
        Ok(issued.into_iter().map(|(_, code)| code).collect())
    }

    async fn allocate_resolved<S>(
        &self,
        resolved: &ResolvedPrefix,
        store: &mut S,
    ) -> Result<CorrelativeCode, AllocationError>
    where
        S: CounterStore + ?Sized,
    {
        let prefix = &resolved.prefix;

        let current = store
            .lock_and_read(prefix)
            .await
            .map_err(|source| AllocationError::failed(prefix.as_str(), source))?;
        if current < 0 {
            return Err(AllocationError::failed(
                prefix.as_str(),
                StorageError::invalid_record(format!("counter {prefix} holds {current}")),
            ));
        }

        let next = current
            .checked_add(1)
            .ok_or_else(|| AllocationError::Exhausted {
                prefix: prefix.to_string(),
            })?;

        store
            .write(prefix, next)
            .await
            .map_err(|source| AllocationError::failed(prefix.as_str(), source))?;

        let code = CorrelativeCode::format(prefix, next, resolved.padding_width).map_err(|e| {
            AllocationError::failed(prefix.as_str(), StorageError::internal(e.to_string()))
        })?;

        debug!(%prefix, value = next, code = code.as_str(), "correlative code allocated");
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;

    use super::*;
    use crate::config::PrefixConfig;

    /// Single-transaction store that records the lock order.
    #[derive(Default)]
    struct RecordingStore {
        values: HashMap<String, i64>,
        locked: Vec<String>,
        fail_with: Option<fn() -> StorageError>,
    }

    #[async_trait]
    impl CounterStore for RecordingStore {
        async fn lock_and_read(&mut self, prefix: &Prefix) -> Result<i64, StorageError> {
            if let Some(fail) = self.fail_with {
                return Err(fail());
            }
            self.locked.push(prefix.to_string());
            Ok(self.values.get(prefix.as_str()).copied().unwrap_or(0))
        }

        async fn write(&mut self, prefix: &Prefix, value: i64) -> Result<(), StorageError> {
            self.values.insert(prefix.to_string(), value);
            Ok(())
        }
    }

    fn connection_reset() -> StorageError {
        StorageError::connection_error("reset by peer")
    }

    fn allocator() -> CorrelativeAllocator {
        CorrelativeAllocator::new(AllocatorConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_allocate_increments_and_formats() {
        let allocator = allocator();
        let mut store = RecordingStore::default();

        let first = allocator.allocate("CP", &mut store).await.unwrap();
        let second = allocator.allocate("CP", &mut store).await.unwrap();

        assert_eq!(first.as_str(), "CP000001");
        assert_eq!(second.as_str(), "CP000002");
        assert_eq!(store.values["CP"], 2);
    }

    #[tokio::test]
    async fn test_per_prefix_width_override() {
        let mut config = AllocatorConfig::default();
        config.prefixes[1].padding_width = Some(3);
        let allocator = CorrelativeAllocator::new(config).unwrap();
        let mut store = RecordingStore::default();

        let code = allocator.allocate("HC", &mut store).await.unwrap();
        assert_eq!(code.as_str(), "HC001");
    }

    #[tokio::test]
    async fn test_width_is_a_minimum() {
        let allocator = allocator();
        let mut store = RecordingStore::default();
        store.values.insert("CP".into(), 999_999);

        let code = allocator.allocate("CP", &mut store).await.unwrap();
        assert_eq!(code.as_str(), "CP1000000");
    }

    #[tokio::test]
    async fn test_exhausted_counter_is_not_written() {
        let allocator = allocator();
        let mut store = RecordingStore::default();
        store.values.insert("CP".into(), i64::MAX);

        let err = allocator.allocate("CP", &mut store).await.unwrap_err();
        assert!(matches!(err, AllocationError::Exhausted { .. }));
        assert_eq!(store.values["CP"], i64::MAX);
    }

    #[tokio::test]
    async fn test_malformed_prefix_never_reaches_store() {
        let allocator = allocator();
        let mut store = RecordingStore::default();

        for bad in ["", "cp", "C-P", "TOOLONGPREFIX"] {
            let err = allocator.allocate(bad, &mut store).await.unwrap_err();
            assert!(matches!(err, AllocationError::InvalidPrefix { .. }), "{bad}");
        }
        assert!(store.locked.is_empty());
    }

    #[tokio::test]
    async fn test_store_error_is_wrapped() {
        let allocator = allocator();
        let mut store = RecordingStore {
            fail_with: Some(connection_reset),
            ..Default::default()
        };

        let err = allocator.allocate("CP", &mut store).await.unwrap_err();
        match err {
            AllocationError::AllocationFailed { prefix, source } => {
                assert_eq!(prefix, "CP");
                assert!(matches!(source, StorageError::ConnectionError { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_allocate_many_locks_in_global_order() {
        let mut config = AllocatorConfig::default();
        config
            .prefixes
            .insert(0, PrefixConfig::new(Prefix::new("ZZ").unwrap()));
        let allocator = CorrelativeAllocator::new(config).unwrap();
        let mut store = RecordingStore::default();

        let codes = allocator
            .allocate_many(&["LAB", "HC", "CP", "ZZ", "AB"], &mut store)
            .await
            .unwrap();

        assert_eq!(store.locked, ["ZZ", "CP", "HC", "AB", "LAB"]);
        let issued: Vec<&str> = codes.iter().map(|c| c.as_str()).collect();
        assert_eq!(
            issued,
            ["LAB000001", "HC000001", "CP000001", "ZZ000001", "AB000001"]
        );
    }

    #[tokio::test]
    async fn test_allocate_many_rejects_duplicates_before_locking() {
        let allocator = allocator();
        let mut store = RecordingStore::default();

        let err = allocator
            .allocate_many(&["CP", "HC", "CP"], &mut store)
            .await
            .unwrap_err();
        assert!(matches!(err, AllocationError::InvalidPrefix { .. }));
        assert!(store.locked.is_empty());
    }
}
