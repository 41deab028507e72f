//! Counter store trait for abstracting in-memory and external state.

use async_trait::async_trait;

use super::counter::Verdict;
use super::descriptor::PartitionKey;
use super::policy::Policy;
use crate::error::Result;

/// Trait for partition state stores.
///
/// `check_and_consume` must be atomic per partition key: two concurrent calls
/// for a partition with one unit left must never both be admitted. External
/// stores have to provide a true increment-with-ceiling rather than a
/// read-modify-write from the caller.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Check `weight` units against the partition and consume them if they fit.
    async fn check_and_consume(
        &self,
        key: &PartitionKey,
        policy: &Policy,
        weight: u64,
        now_ms: u64,
    ) -> Result<Verdict>;

    /// Evict partitions idle for more than twice their window.
    ///
    /// Returns the number of evicted partitions. Stores with native expiry
    /// can rely on the default.
    async fn sweep(&self, _now_ms: u64) -> Result<usize> {
        Ok(0)
    }

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}
