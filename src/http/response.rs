//! Standard quota headers and the default 429 response.

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::ratelimit::{AdmissionDecision, Strategy};

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

const UNLIMITED: &str = "unlimited";

/// Default JSON body for a rejected request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectionBody {
    pub success: bool,
    pub error: &'static str,
    pub code: &'static str,
    /// Seconds until a retry can succeed
    pub retry_after: u64,
    pub strategy: Strategy,
    pub tier: String,
}

impl RejectionBody {
    pub fn from_decision(decision: &AdmissionDecision) -> Self {
        Self {
            success: false,
            error: "Rate limit exceeded",
            code: "RATE_LIMIT_EXCEEDED",
            retry_after: reject_secs(decision),
            strategy: decision.strategy,
            tier: decision.tier.clone(),
        }
    }
}

/// Attach limit/remaining, plus reset and `Retry-After` on rejection.
pub fn apply_quota_headers(headers: &mut HeaderMap, decision: &AdmissionDecision) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));

    if !decision.allowed {
        let secs = HeaderValue::from(reject_secs(decision));
        headers.insert(X_RATELIMIT_RESET, secs.clone());
        headers.insert(header::RETRY_AFTER, secs);
    }
}

/// Headers for requests that were not counted against any quota.
pub fn apply_unlimited_headers(headers: &mut HeaderMap) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from_static(UNLIMITED));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from_static(UNLIMITED));
}

/// The default 429 response for a rejected decision.
pub fn rejection_response(decision: &AdmissionDecision) -> Response {
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(RejectionBody::from_decision(decision)),
    )
        .into_response();
    apply_quota_headers(response.headers_mut(), decision);
    response
}

/// Rejections always advertise at least one second.
fn reject_secs(decision: &AdmissionDecision) -> u64 {
    decision.retry_after_secs().max(1)
}
