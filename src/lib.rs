//! Turnstile - Admission Control for HTTP APIs
//!
//! This crate gates API routes behind named, per-identity quotas. A request is
//! routed to one or more policies by path, partitioned by client identity, and
//! checked against fixed-window, sliding-window or token-bucket counters.
//! Rejected requests get a 429 with standard quota headers; when the limiter
//! itself is unhealthy, requests are admitted and the failure is logged.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
