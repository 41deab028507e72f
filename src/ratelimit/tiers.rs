//! Layered evaluation of several policies for one request.

use std::sync::Arc;
use tracing::trace;

use super::limiter::{AdmissionDecision, RateLimiter};
use super::policy::{Policy, PolicyRegistry};
use crate::error::{Result, TurnstileError};

/// Runs a request through an ordered list of policies.
#[derive(Clone)]
pub struct MultiTierEvaluator {
    registry: Arc<PolicyRegistry>,
    limiter: Arc<RateLimiter>,
}

impl MultiTierEvaluator {
    pub fn new(registry: Arc<PolicyRegistry>, limiter: Arc<RateLimiter>) -> Self {
        Self { registry, limiter }
    }

    /// Evaluate `policy_keys` in order, stopping at the first rejection.
    ///
    /// All keys are resolved before anything is consumed, so an unknown key
    /// never leaves earlier tiers charged. When every tier admits, the decision
    /// with the smallest `remaining` is returned.
    pub async fn evaluate<K: AsRef<str>>(
        &self,
        policy_keys: &[K],
        identifier: &str,
        weight: u64,
    ) -> Result<AdmissionDecision> {
        let tiers: Vec<(&str, &Policy)> = policy_keys
            .iter()
            .map(|key| {
                let key = key.as_ref();
                self.registry.get(key).map(|policy| (key, policy))
            })
            .collect::<Result<_>>()?;

        let mut binding: Option<AdmissionDecision> = None;
        for (key, policy) in tiers {
            let decision = self
                .limiter
                .check_and_consume(key, policy, identifier, weight)
                .await?;

            trace!(
                policy = key,
                allowed = decision.allowed,
                remaining = decision.remaining,
                "Tier evaluated"
            );

            if !decision.allowed {
                return Ok(decision);
            }

            binding = match binding {
                Some(current) if current.remaining <= decision.remaining => Some(current),
                _ => Some(decision),
            };
        }

        binding.ok_or(TurnstileError::NoPolicies)
    }
}
