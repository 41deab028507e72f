//! Core rate limiter implementation.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

use super::backend::CounterStore;
use super::clock::{Clock, SystemClock};
use super::descriptor::PartitionKey;
use super::policy::{Policy, Strategy};
use super::store::MemoryStore;
use crate::error::{Result, TurnstileError};

/// Default bound on a single counter store call.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(50);

/// Result of an admission check against one or more policies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionDecision {
    pub allowed: bool,
    /// The policy's `max_requests`
    pub limit: u64,
    /// Quota left after this check
    pub remaining: u64,
    /// 0 if allowed, otherwise time until at least one unit is available
    pub retry_after_ms: u64,
    pub policy_key: String,
    pub tier: String,
    pub strategy: Strategy,
}

impl AdmissionDecision {
    /// Seconds until a retry can succeed, rounded up.
    pub fn retry_after_secs(&self) -> u64 {
        self.retry_after_ms.div_ceil(1000)
    }
}

/// The limiter that owns all partition state.
///
/// Constructed once at process start and shared by handle; nothing else reads
/// or writes partition state.
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    store_timeout: Duration,
}

impl RateLimiter {
    /// Create a limiter backed by an in-memory store and the system clock.
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()))
    }

    /// Create a limiter backed by the given store.
    pub fn with_store(store: Arc<dyn CounterStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock::new()),
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Bound every store call by `timeout`.
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn store_name(&self) -> &'static str {
        self.store.name()
    }

    /// Check `weight` units for `identifier` under `policy` and consume them if
    /// they fit.
    ///
    /// Only a failing or slow store produces an error.
    pub async fn check_and_consume(
        &self,
        policy_key: &str,
        policy: &Policy,
        identifier: &str,
        weight: u64,
    ) -> Result<AdmissionDecision> {
        let key = PartitionKey::new(policy_key, identifier);
        let weight = weight.max(1);
        let now = self.clock.now_ms();

        if weight > policy.max_requests {
            debug!(
                key = %key,
                weight = weight,
                limit = policy.max_requests,
                "Request weight exceeds the policy quota and can never be admitted"
            );
        }

        trace!(
            key = %key,
            weight = weight,
            strategy = %policy.strategy,
            "Checking rate limit"
        );

        let verdict = tokio::time::timeout(
            self.store_timeout,
            self.store.check_and_consume(&key, policy, weight, now),
        )
        .await
        .map_err(|_| {
            TurnstileError::StoreUnavailable(format!(
                "{} store timed out after {}ms",
                self.store.name(),
                self.store_timeout.as_millis()
            ))
        })??;

        if !verdict.allowed {
            debug!(
                key = %key,
                tier = %policy.tier,
                retry_after_ms = verdict.retry_after_ms,
                "Rate limit exceeded"
            );
        }

        Ok(AdmissionDecision {
            allowed: verdict.allowed,
            limit: policy.max_requests,
            remaining: verdict.remaining.min(policy.max_requests),
            retry_after_ms: verdict.retry_after_ms,
            policy_key: policy_key.to_string(),
            tier: policy.tier.clone(),
            strategy: policy.strategy,
        })
    }

    /// Evict idle partitions from the store.
    pub async fn sweep(&self) -> Result<usize> {
        let evicted = self.store.sweep(self.clock.now_ms()).await?;
        if evicted > 0 {
            debug!(evicted, store = self.store.name(), "Swept idle partitions");
        }
        Ok(evicted)
    }

    /// Spawn the single periodic sweep task.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        info!(interval_secs = every.as_secs(), "Starting partition sweeper");

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if let Err(e) = limiter.sweep().await {
                    debug!(error = %e, "Partition sweep failed");
                }
            }
        })
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::clock::ManualClock;
    use crate::ratelimit::counter::Verdict;
    use async_trait::async_trait;

    fn limiter_at(clock: &ManualClock) -> (RateLimiter, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let limiter = RateLimiter::with_store(store.clone()).with_clock(Arc::new(clock.clone()));
        (limiter, store)
    }

    struct HangingStore;

    #[async_trait]
    impl CounterStore for HangingStore {
        async fn check_and_consume(
            &self,
            _key: &PartitionKey,
            _policy: &Policy,
            _weight: u64,
            _now_ms: u64,
        ) -> Result<Verdict> {
            std::future::pending().await
        }

        fn name(&self) -> &'static str {
            "hanging"
        }
    }

    #[tokio::test]
    async fn test_decision_echoes_policy() {
        let clock = ManualClock::new(0);
        let (limiter, _) = limiter_at(&clock);
        let policy = Policy::new(1000, 5, Strategy::FixedWindow, "strict");

        let decision = limiter
            .check_and_consume("forms.submission", &policy, "1.2.3.4", 1)
            .await
            .unwrap();

        assert!(decision.allowed);
        assert_eq!(decision.limit, 5);
        assert_eq!(decision.remaining, 4);
        assert_eq!(decision.retry_after_ms, 0);
        assert_eq!(decision.policy_key, "forms.submission");
        assert_eq!(decision.tier, "strict");
    }

    #[tokio::test]
    async fn test_zero_weight_counts_as_one() {
        let clock = ManualClock::new(0);
        let (limiter, _) = limiter_at(&clock);
        let policy = Policy::new(1000, 5, Strategy::SlidingWindow, "strict");

        let decision = limiter.check_and_consume("p", &policy, "id", 0).await.unwrap();
        assert_eq!(decision.remaining, 4);
    }

    #[tokio::test]
    async fn test_fixed_window_through_limiter() {
        let clock = ManualClock::new(0);
        let (limiter, _) = limiter_at(&clock);
        let policy = Policy::new(1000, 5, Strategy::FixedWindow, "strict");

        for _ in 0..5 {
            assert!(limiter.check_and_consume("p", &policy, "id", 1).await.unwrap().allowed);
        }
        let rejected = limiter.check_and_consume("p", &policy, "id", 1).await.unwrap();
        assert!(!rejected.allowed);
        assert_eq!(rejected.retry_after_ms, 1000);
        assert_eq!(rejected.retry_after_secs(), 1);

        clock.set(1001);
        let decision = limiter.check_and_consume("p", &policy, "id", 1).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 4);
    }

    #[tokio::test]
    async fn test_sweep_evicts_idle_partitions() {
        let clock = ManualClock::new(0);
        let (limiter, store) = limiter_at(&clock);
        let policy = Policy::new(1000, 5, Strategy::TokenBucket, "public");

        limiter.check_and_consume("p", &policy, "idle", 5).await.unwrap();
        clock.set(1500);
        limiter.check_and_consume("p", &policy, "busy", 1).await.unwrap();

        clock.set(2100);
        assert_eq!(limiter.sweep().await.unwrap(), 1);
        assert_eq!(store.len(), 1);
        assert!(!store.contains(&PartitionKey::new("p", "idle")));

        let decision = limiter.check_and_consume("p", &policy, "idle", 1).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 4);
    }

    #[tokio::test]
    async fn test_store_timeout_is_unavailable() {
        let limiter = RateLimiter::with_store(Arc::new(HangingStore))
            .with_store_timeout(Duration::from_millis(10));
        let policy = Policy::new(1000, 5, Strategy::FixedWindow, "strict");

        let err = limiter.check_and_consume("p", &policy, "id", 1).await.unwrap_err();
        assert_eq!(err.code(), "STORE_UNAVAILABLE");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_checks_never_over_admit() {
        let limiter = Arc::new(RateLimiter::new());
        let policy = Arc::new(Policy::new(60_000, 50, Strategy::SlidingWindow, "strict"));

        let handles: Vec<_> = (0..200)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                let policy = Arc::clone(&policy);
                tokio::spawn(async move {
                    limiter
                        .check_and_consume("p", &policy, "shared", 1)
                        .await
                        .unwrap()
                        .allowed
                })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 50);
    }
}
