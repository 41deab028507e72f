//! Admission middleware.
//!
//! Each request moves through routing, identification and evaluation and ends
//! in one of the [`AdmissionOutcome`] states. Only a rejection stops the
//! wrapped handler from running; a limiter failure degrades to admit.

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use futures::future::{BoxFuture, FutureExt};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, trace, warn};

use super::identifier::IdentifierResolver;
use super::response::{apply_quota_headers, apply_unlimited_headers, rejection_response};
use crate::error::TurnstileError;
use crate::ratelimit::{AdmissionDecision, MultiTierEvaluator, RouteResolver};

/// Predicate on the raw request; `true` skips admission control.
pub type SkipFn = Arc<dyn Fn(&Request) -> bool + Send + Sync>;

/// Builds the response for a rejected request in place of the default body.
pub type RejectFn = Arc<dyn Fn(AdmissionDecision) -> BoxFuture<'static, Response> + Send + Sync>;

/// Per-call admission options.
#[derive(Clone)]
pub struct AdmissionOptions {
    /// Explicit policy keys, evaluated in order instead of route resolution
    pub policy_keys: Vec<String>,
    /// Quota cost of the request
    pub weight: u64,
    /// Replaces the default identifier resolution
    pub identifier: Option<IdentifierResolver>,
    pub skip_if: Option<SkipFn>,
    pub on_reject: Option<RejectFn>,
}

impl Default for AdmissionOptions {
    fn default() -> Self {
        Self {
            policy_keys: Vec::new(),
            weight: 1,
            identifier: None,
            skip_if: None,
            on_reject: None,
        }
    }
}

impl fmt::Debug for AdmissionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionOptions")
            .field("policy_keys", &self.policy_keys)
            .field("weight", &self.weight)
            .field("identifier", &self.identifier)
            .field("skip_if", &self.skip_if.is_some())
            .field("on_reject", &self.on_reject.is_some())
            .finish()
    }
}

impl AdmissionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an explicit policy key.
    pub fn policy(mut self, key: impl Into<String>) -> Self {
        self.policy_keys.push(key.into());
        self
    }

    pub fn weight(mut self, weight: u64) -> Self {
        self.weight = weight;
        self
    }

    pub fn identify_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&Request) -> String + Send + Sync + 'static,
    {
        self.identifier = Some(IdentifierResolver::custom(f));
        self
    }

    pub fn skip_if<F>(mut self, f: F) -> Self
    where
        F: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        self.skip_if = Some(Arc::new(f));
        self
    }

    pub fn on_reject<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(AdmissionDecision) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.on_reject = Some(Arc::new(move |decision: AdmissionDecision| f(decision).boxed()));
        self
    }
}

/// Terminal state of one admission check.
#[derive(Debug)]
pub enum AdmissionOutcome {
    /// No policy applies to the request
    Bypassed,
    /// The skip predicate matched
    Skipped,
    Admitted(AdmissionDecision),
    Rejected(AdmissionDecision),
    /// The limiter could not evaluate; the request is admitted anyway
    Degraded(TurnstileError),
}

impl AdmissionOutcome {
    /// Whether the wrapped handler runs.
    pub fn is_admitted(&self) -> bool {
        !matches!(self, AdmissionOutcome::Rejected(_))
    }

    pub fn decision(&self) -> Option<&AdmissionDecision> {
        match self {
            AdmissionOutcome::Admitted(d) | AdmissionOutcome::Rejected(d) => Some(d),
            _ => None,
        }
    }
}

/// Routing and identification result, computed before anything is awaited.
#[derive(Debug)]
enum Plan {
    Bypass,
    Skip,
    Evaluate { keys: Vec<String>, identifier: String },
}

/// The boundary adapter between HTTP and the limiter.
pub struct Admission {
    evaluator: MultiTierEvaluator,
    routes: RouteResolver,
    identifiers: IdentifierResolver,
    global_policies: Vec<String>,
}

impl Admission {
    pub fn new(evaluator: MultiTierEvaluator, routes: RouteResolver) -> Self {
        Self {
            evaluator,
            routes,
            identifiers: IdentifierResolver::new(),
            global_policies: Vec::new(),
        }
    }

    /// Replace the default identifier resolver.
    pub fn with_identifier_resolver(mut self, resolver: IdentifierResolver) -> Self {
        self.identifiers = resolver;
        self
    }

    /// Policies evaluated before every route-resolved policy.
    pub fn with_global_policies(mut self, keys: Vec<String>) -> Self {
        self.global_policies = keys;
        self
    }

    /// Policy keys for a path. Explicit keys win over route resolution;
    /// global policies are only prepended to route-resolved keys.
    pub fn policy_keys(&self, path: &str, options: &AdmissionOptions) -> Vec<String> {
        if !options.policy_keys.is_empty() {
            return options.policy_keys.clone();
        }

        match self.routes.resolve_policy_key(path) {
            Some(route_key) => {
                let mut keys: Vec<String> = self
                    .global_policies
                    .iter()
                    .filter(|key| key.as_str() != route_key)
                    .cloned()
                    .collect();
                keys.push(route_key.to_string());
                keys
            }
            None => Vec::new(),
        }
    }

    fn plan(&self, request: &Request, options: &AdmissionOptions) -> Plan {
        let keys = self.policy_keys(request.uri().path(), options);
        if keys.is_empty() {
            return Plan::Bypass;
        }

        if options.skip_if.as_ref().is_some_and(|skip| skip(request)) {
            return Plan::Skip;
        }

        let identifier = options
            .identifier
            .as_ref()
            .unwrap_or(&self.identifiers)
            .resolve(request);

        Plan::Evaluate { keys, identifier }
    }

    async fn decide(&self, plan: Plan, weight: u64) -> AdmissionOutcome {
        let (keys, identifier) = match plan {
            Plan::Bypass => return AdmissionOutcome::Bypassed,
            Plan::Skip => return AdmissionOutcome::Skipped,
            Plan::Evaluate { keys, identifier } => (keys, identifier),
        };

        match self.evaluator.evaluate(keys.as_slice(), &identifier, weight).await {
            Ok(decision) if decision.allowed => {
                trace!(
                    identifier = %identifier,
                    policy = %decision.policy_key,
                    remaining = decision.remaining,
                    "Request admitted"
                );
                AdmissionOutcome::Admitted(decision)
            }
            Ok(decision) => {
                info!(
                    identifier = %identifier,
                    policy = %decision.policy_key,
                    tier = %decision.tier,
                    retry_after_ms = decision.retry_after_ms,
                    "Request rejected"
                );
                AdmissionOutcome::Rejected(decision)
            }
            Err(e) => {
                warn!(
                    identifier = %identifier,
                    policies = ?keys,
                    code = e.code(),
                    error = %e,
                    "Admission check degraded, failing open"
                );
                AdmissionOutcome::Degraded(e)
            }
        }
    }

    /// Run routing, identification and evaluation for a request.
    pub async fn evaluate(&self, request: &Request, options: &AdmissionOptions) -> AdmissionOutcome {
        let plan = self.plan(request, options);
        self.decide(plan, options.weight).await
    }

    /// Admit `request` to `handler`, or answer 429.
    pub async fn admit<H, Fut>(&self, request: Request, options: &AdmissionOptions, handler: H) -> Response
    where
        H: FnOnce(Request) -> Fut,
        Fut: Future<Output = Response>,
    {
        // The request body is not Sync, so no borrow of it may live across an await.
        let plan = self.plan(&request, options);
        let outcome = self.decide(plan, options.weight).await;

        match outcome {
            AdmissionOutcome::Rejected(decision) => match &options.on_reject {
                Some(build) => {
                    let mut response = build(decision.clone()).await;
                    *response.status_mut() = StatusCode::TOO_MANY_REQUESTS;
                    apply_quota_headers(response.headers_mut(), &decision);
                    response
                }
                None => rejection_response(&decision),
            },
            AdmissionOutcome::Admitted(decision) => {
                let mut response = handler(request).await;
                apply_quota_headers(response.headers_mut(), &decision);
                response
            }
            AdmissionOutcome::Bypassed | AdmissionOutcome::Skipped | AdmissionOutcome::Degraded(_) => {
                let mut response = handler(request).await;
                apply_unlimited_headers(response.headers_mut());
                response
            }
        }
    }

    /// State for [`enforce`] with the given per-route options.
    pub fn layer_state(self: &Arc<Self>, options: AdmissionOptions) -> AdmissionState {
        AdmissionState {
            admission: Arc::clone(self),
            options,
        }
    }
}

/// Middleware state: shared admission engine plus per-route options.
#[derive(Clone)]
pub struct AdmissionState {
    pub admission: Arc<Admission>,
    pub options: AdmissionOptions,
}

/// Axum middleware for `axum::middleware::from_fn_with_state`.
pub async fn enforce(State(state): State<AdmissionState>, request: Request, next: Next) -> Response {
    state
        .admission
        .admit(request, &state.options, |request| next.run(request))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::{ManualClock, Policy, PolicyRegistry, RateLimiter, RouteRule, Strategy};
    use axum::body::Body;
    use axum::response::IntoResponse;
    use std::collections::HashMap;

    fn admission() -> Admission {
        let mut policies = HashMap::new();
        policies.insert(
            "api.general".to_string(),
            Policy::new(60_000, 100, Strategy::TokenBucket, "standard"),
        );
        policies.insert(
            "auth.login".to_string(),
            Policy::new(60_000, 2, Strategy::SlidingWindow, "strict"),
        );
        let registry = Arc::new(PolicyRegistry::new(policies).unwrap());
        let limiter = Arc::new(RateLimiter::new().with_clock(Arc::new(ManualClock::new(0))));
        let routes = RouteResolver::new(
            vec![RouteRule::new("/api/auth/login", "auth.login")],
            Some(RouteRule::new("/api", "api.general")),
        );
        Admission::new(MultiTierEvaluator::new(registry, limiter), routes)
    }

    fn request(path: &str) -> Request {
        Request::builder()
            .uri(path)
            .header("x-forwarded-for", "203.0.113.5")
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn test_policy_keys_layer_globals() {
        let admission = admission().with_global_policies(vec!["api.general".to_string()]);
        let options = AdmissionOptions::new();

        assert_eq!(
            admission.policy_keys("/api/auth/login", &options),
            vec!["api.general", "auth.login"]
        );
        assert_eq!(admission.policy_keys("/api/other", &options), vec!["api.general"]);
        assert!(admission.policy_keys("/static/app.js", &options).is_empty());
    }

    #[test]
    fn test_explicit_keys_override_routes() {
        let admission = admission().with_global_policies(vec!["api.general".to_string()]);
        let options = AdmissionOptions::new().policy("auth.login");

        assert_eq!(admission.policy_keys("/api/other", &options), vec!["auth.login"]);
    }

    #[tokio::test]
    async fn test_unrouted_path_bypasses() {
        let admission = admission();
        let outcome = admission
            .evaluate(&request("/about"), &AdmissionOptions::new())
            .await;
        assert!(matches!(outcome, AdmissionOutcome::Bypassed));
    }

    #[tokio::test]
    async fn test_skip_predicate() {
        let admission = admission();
        let options = AdmissionOptions::new().skip_if(|req| req.headers().contains_key("x-internal"));

        let mut req = request("/api/auth/login");
        req.headers_mut().insert("x-internal", "1".parse().unwrap());

        let outcome = admission.evaluate(&req, &options).await;
        assert!(matches!(outcome, AdmissionOutcome::Skipped));
    }

    #[tokio::test]
    async fn test_rejection_after_quota() {
        let admission = admission();
        let options = AdmissionOptions::new();

        for _ in 0..2 {
            let outcome = admission.evaluate(&request("/api/auth/login"), &options).await;
            assert!(matches!(outcome, AdmissionOutcome::Admitted(_)));
        }
        let outcome = admission.evaluate(&request("/api/auth/login"), &options).await;
        assert!(!outcome.is_admitted());
        assert_eq!(outcome.decision().unwrap().policy_key, "auth.login");
    }

    #[tokio::test]
    async fn test_unknown_policy_degrades() {
        let admission = admission();
        let options = AdmissionOptions::new().policy("does.not.exist");

        let outcome = admission.evaluate(&request("/api/x"), &options).await;
        match outcome {
            AdmissionOutcome::Degraded(e) => assert_eq!(e.code(), "CONFIG_NOT_FOUND"),
            other => panic!("expected degraded, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_custom_rejection_keeps_status_and_headers() {
        let admission = admission();
        let options = AdmissionOptions::new()
            .weight(3)
            .on_reject(|decision| async move { format!("slow down ({})", decision.tier).into_response() });

        let response = admission
            .admit(request("/api/auth/login"), &options, |_| async {
                StatusCode::OK.into_response()
            })
            .await;

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["x-ratelimit-limit"], "2");
        assert!(response.headers().contains_key("retry-after"));
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"slow down (strict)");
    }
}
