//! Named rate limit policies and the registry that holds them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{Result, TurnstileError};

/// Counting algorithm used by a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Epoch-aligned fixed buckets of `window_ms`
    FixedWindow,
    /// Exact rolling window over admitted events
    SlidingWindow,
    /// Continuous refill at `max_requests / window_ms` tokens per ms
    TokenBucket,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::FixedWindow => "fixed_window",
            Strategy::SlidingWindow => "sliding_window",
            Strategy::TokenBucket => "token_bucket",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable quota configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    /// Size of the counting window in milliseconds
    pub window_ms: u64,
    /// Quota per window per partition
    pub max_requests: u64,
    /// Counting algorithm
    pub strategy: Strategy,
    /// Human-readable strictness label
    pub tier: String,
}

impl Policy {
    pub fn new(window_ms: u64, max_requests: u64, strategy: Strategy, tier: impl Into<String>) -> Self {
        Self {
            window_ms,
            max_requests,
            strategy,
            tier: tier.into(),
        }
    }

    /// Tokens per millisecond for token bucket policies.
    pub fn refill_rate_per_ms(&self) -> f64 {
        self.max_requests as f64 / self.window_ms as f64
    }

    /// Check the policy's own invariants.
    pub fn validate(&self, key: &str) -> Result<()> {
        if self.window_ms == 0 {
            return Err(TurnstileError::InvalidPolicy {
                key: key.to_string(),
                reason: "window_ms must be > 0".to_string(),
            });
        }
        if self.max_requests == 0 {
            return Err(TurnstileError::InvalidPolicy {
                key: key.to_string(),
                reason: "max_requests must be > 0".to_string(),
            });
        }
        if self.tier.trim().is_empty() {
            return Err(TurnstileError::InvalidPolicy {
                key: key.to_string(),
                reason: "tier must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Read-only table of named policies.
#[derive(Debug, Clone, Default)]
pub struct PolicyRegistry {
    policies: HashMap<String, Policy>,
}

impl PolicyRegistry {
    /// Build a registry, rejecting any policy that breaks its invariants.
    pub fn new(policies: HashMap<String, Policy>) -> Result<Self> {
        for (key, policy) in &policies {
            policy.validate(key)?;
        }
        Ok(Self { policies })
    }

    /// Look up a policy by key.
    pub fn get(&self, key: &str) -> Result<&Policy> {
        self.policies
            .get(key)
            .ok_or_else(|| TurnstileError::PolicyNotFound(key.to_string()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.policies.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}
