//! Partition key resolution from inbound requests.

use axum::extract::Request;
use axum::http::HeaderMap;
use std::fmt;
use std::sync::Arc;

/// Identifier used when no client address can be derived.
pub const UNKNOWN_IDENTIFIER: &str = "unknown";

/// Caller-supplied identifier function (user id, API key hash, ...).
///
/// Must be a pure function of the request.
pub type IdentifierFn = Arc<dyn Fn(&Request) -> String + Send + Sync>;

/// Derives the partition key for a request.
#[derive(Clone, Default)]
pub struct IdentifierResolver {
    custom: Option<IdentifierFn>,
}

impl fmt::Debug for IdentifierResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentifierResolver")
            .field("custom", &self.custom.is_some())
            .finish()
    }
}

impl IdentifierResolver {
    /// Resolver using proxy headers only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver that replaces IP-based resolution entirely.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&Request) -> String + Send + Sync + 'static,
    {
        Self {
            custom: Some(Arc::new(f)),
        }
    }

    pub fn resolve(&self, request: &Request) -> String {
        match &self.custom {
            Some(f) => f(request),
            None => client_ip(request.headers()),
        }
    }
}

/// First non-empty of `X-Forwarded-For` (first hop), `X-Real-IP`, else
/// [`UNKNOWN_IDENTIFIER`].
pub fn client_ip(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(UNKNOWN_IDENTIFIER)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request(headers: &[(&str, &str)]) -> Request {
        let mut builder = Request::builder().uri("/api/search");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_forwarded_for_first_hop() {
        let req = request(&[
            ("X-Forwarded-For", "203.0.113.9, 10.0.0.1"),
            ("X-Real-IP", "10.0.0.2"),
        ]);
        assert_eq!(IdentifierResolver::new().resolve(&req), "203.0.113.9");
    }

    #[test]
    fn test_real_ip_fallback() {
        let req = request(&[("X-Forwarded-For", " "), ("X-Real-IP", "198.51.100.4")]);
        assert_eq!(IdentifierResolver::new().resolve(&req), "198.51.100.4");
    }

    #[test]
    fn test_unknown_sentinel() {
        let req = request(&[]);
        assert_eq!(IdentifierResolver::new().resolve(&req), UNKNOWN_IDENTIFIER);
    }

    #[test]
    fn test_custom_resolver_takes_precedence() {
        let resolver = IdentifierResolver::custom(|req| {
            req.headers()
                .get("x-user-id")
                .and_then(|v| v.to_str().ok())
                .map(|id| format!("user:{}", id))
                .unwrap_or_else(|| "anonymous".to_string())
        });

        let req = request(&[("X-Forwarded-For", "203.0.113.9"), ("X-User-Id", "42")]);
        assert_eq!(resolver.resolve(&req), "user:42");

        let req = request(&[("X-Forwarded-For", "203.0.113.9")]);
        assert_eq!(resolver.resolve(&req), "anonymous");
    }
}
