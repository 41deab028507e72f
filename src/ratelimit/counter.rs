//! Per-partition counter state and the three counting algorithms.
//!
//! Everything here is pure arithmetic over millisecond timestamps; the caller
//! is responsible for holding the partition lock across `check_and_consume`.

use std::collections::VecDeque;

use super::policy::{Policy, Strategy};

/// Outcome of a single check against one partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub allowed: bool,
    /// Quota left after this check (never above the policy limit)
    pub remaining: u64,
    /// 0 when allowed, otherwise time until `weight` units are available
    pub retry_after_ms: u64,
}

impl Verdict {
    fn allow(remaining: u64) -> Self {
        Self {
            allowed: true,
            remaining,
            retry_after_ms: 0,
        }
    }

    fn reject(remaining: u64, retry_after_ms: u64) -> Self {
        Self {
            allowed: false,
            remaining,
            retry_after_ms: retry_after_ms.max(1),
        }
    }
}

/// Mutable counter state for one (policy, identifier) pair.
#[derive(Debug, Clone, PartialEq)]
pub enum PartitionState {
    FixedWindow {
        count: u64,
        window_start: u64,
    },
    SlidingWindow {
        /// Admitted events as (timestamp, weight), oldest first
        entries: VecDeque<(u64, u64)>,
    },
    TokenBucket {
        tokens: f64,
        last_refill: u64,
    },
}

impl PartitionState {
    /// The zero state for a never-seen partition.
    pub fn new(policy: &Policy, now_ms: u64) -> Self {
        match policy.strategy {
            Strategy::FixedWindow => PartitionState::FixedWindow {
                count: 0,
                window_start: align(now_ms, policy.window_ms),
            },
            Strategy::SlidingWindow => PartitionState::SlidingWindow {
                entries: VecDeque::new(),
            },
            Strategy::TokenBucket => PartitionState::TokenBucket {
                tokens: policy.max_requests as f64,
                last_refill: now_ms,
            },
        }
    }

    pub fn strategy(&self) -> Strategy {
        match self {
            PartitionState::FixedWindow { .. } => Strategy::FixedWindow,
            PartitionState::SlidingWindow { .. } => Strategy::SlidingWindow,
            PartitionState::TokenBucket { .. } => Strategy::TokenBucket,
        }
    }

    /// Check whether `weight` units fit and consume them if so.
    pub fn check_and_consume(&mut self, policy: &Policy, weight: u64, now_ms: u64) -> Verdict {
        if self.strategy() != policy.strategy {
            *self = PartitionState::new(policy, now_ms);
        }

        let max = policy.max_requests;
        let window = policy.window_ms;

        match self {
            PartitionState::FixedWindow {
                count,
                window_start,
            } => {
                if now_ms.saturating_sub(*window_start) >= window {
                    *count = 0;
                    *window_start = align(now_ms, window);
                }

                if count.saturating_add(weight) <= max {
                    *count += weight;
                    Verdict::allow(max - *count)
                } else {
                    let retry = window_start.saturating_add(window).saturating_sub(now_ms);
                    Verdict::reject(max.saturating_sub(*count), retry)
                }
            }

            PartitionState::SlidingWindow { entries } => {
                // Entries stay sorted even if a caller's clock reading lags the last append.
                let now_ms = entries.back().map_or(now_ms, |&(ts, _)| ts.max(now_ms));

                while let Some(&(ts, _)) = entries.front() {
                    if ts.saturating_add(window) <= now_ms {
                        entries.pop_front();
                    } else {
                        break;
                    }
                }

                let used: u64 = entries.iter().map(|&(_, w)| w).sum();
                if used.saturating_add(weight) <= max {
                    entries.push_back((now_ms, weight));
                    return Verdict::allow(max - used - weight);
                }

                // Walk from the oldest entry until enough weight has expired.
                let mut freed = 0;
                let mut retry = window;
                for &(ts, w) in entries.iter() {
                    freed += w;
                    if (used - freed).saturating_add(weight) <= max {
                        retry = ts.saturating_add(window).saturating_sub(now_ms);
                        break;
                    }
                }
                Verdict::reject(max.saturating_sub(used), retry)
            }

            PartitionState::TokenBucket {
                tokens,
                last_refill,
            } => {
                let capacity = max as f64;
                let rate = policy.refill_rate_per_ms();
                let elapsed = now_ms.saturating_sub(*last_refill) as f64;
                *tokens = (*tokens + elapsed * rate).min(capacity);
                *last_refill = (*last_refill).max(now_ms);

                let needed = weight as f64;
                if *tokens + TOKEN_EPSILON >= needed {
                    *tokens = (*tokens - needed).max(0.0);
                    Verdict::allow(whole_tokens(*tokens))
                } else {
                    let retry = ((needed - *tokens) * window as f64 / capacity).ceil() as u64;
                    Verdict::reject(whole_tokens(*tokens), retry)
                }
            }
        }
    }
}

/// Slack for float rounding in the token bucket; far below one token.
const TOKEN_EPSILON: f64 = 1e-9;

fn whole_tokens(tokens: f64) -> u64 {
    (tokens + TOKEN_EPSILON).floor() as u64
}

/// Floor a timestamp to the start of its epoch-aligned window.
fn align(now_ms: u64, window_ms: u64) -> u64 {
    now_ms - now_ms % window_ms
}
