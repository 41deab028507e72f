//! HTTP boundary: identifier resolution, admission middleware and server.

mod identifier;
mod middleware;
mod response;
mod server;

pub use identifier::{client_ip, IdentifierFn, IdentifierResolver, UNKNOWN_IDENTIFIER};
pub use middleware::{
    enforce, Admission, AdmissionOptions, AdmissionOutcome, AdmissionState, RejectFn, SkipFn,
};
pub use response::{
    apply_quota_headers, apply_unlimited_headers, rejection_response, RejectionBody,
    X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING, X_RATELIMIT_RESET,
};
pub use server::{router, HttpServer};
