//! In-memory partition store.

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, trace};

use super::backend::CounterStore;
use super::counter::{PartitionState, Verdict};
use super::descriptor::PartitionKey;
use super::policy::Policy;
use crate::error::Result;

/// Counter state plus the bookkeeping needed for idle eviction.
#[derive(Debug, Clone)]
struct Partition {
    state: PartitionState,
    /// Last time this partition was checked
    last_seen: u64,
    /// Idle time after which the partition may be evicted
    idle_ttl: u64,
}

/// Process-local partition store.
///
/// Check-and-mutate runs under the shard write lock of the partition's map
/// entry, and the sweep evicts through `retain`, which takes the same lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    partitions: DashMap<PartitionKey, Partition>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live partitions.
    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    pub fn contains(&self, key: &PartitionKey) -> bool {
        self.partitions.contains_key(key)
    }

    /// Drop every partition.
    pub fn clear(&self) {
        self.partitions.clear();
    }

    /// Remove partitions idle for longer than `2 * window_ms`.
    pub fn evict_idle(&self, now_ms: u64) -> usize {
        let mut evicted = 0;
        self.partitions.retain(|key, partition| {
            let idle = now_ms.saturating_sub(partition.last_seen);
            if idle > partition.idle_ttl {
                trace!(key = %key, idle_ms = idle, "Evicting idle partition");
                evicted += 1;
                false
            } else {
                true
            }
        });
        evicted
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn check_and_consume(
        &self,
        key: &PartitionKey,
        policy: &Policy,
        weight: u64,
        now_ms: u64,
    ) -> Result<Verdict> {
        let mut entry = self.partitions.entry(key.clone()).or_insert_with(|| {
            debug!(
                key = %key,
                strategy = %policy.strategy,
                limit = policy.max_requests,
                window_ms = policy.window_ms,
                "Creating new partition"
            );
            Partition {
                state: PartitionState::new(policy, now_ms),
                last_seen: now_ms,
                idle_ttl: policy.window_ms.saturating_mul(2),
            }
        });

        let partition = entry.value_mut();
        partition.last_seen = partition.last_seen.max(now_ms);
        Ok(partition.state.check_and_consume(policy, weight, now_ms))
    }

    async fn sweep(&self, now_ms: u64) -> Result<usize> {
        Ok(self.evict_idle(now_ms))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
