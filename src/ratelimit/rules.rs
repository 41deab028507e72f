//! Admission rules configuration.
//!
//! A rules file holds the policy table and the route table. It is read once at
//! startup; changing either requires a restart.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

use super::policy::{Policy, PolicyRegistry, Strategy};
use super::route::RouteResolver;
use crate::error::{Result, TurnstileError};

const SECOND: u64 = 1_000;
const MINUTE: u64 = 60 * SECOND;
const HOUR: u64 = 60 * MINUTE;

/// A complete rules configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Map of policy key to policy
    #[serde(default)]
    pub policies: HashMap<String, Policy>,
    /// Path rules, matched exactly first and then by longest prefix
    #[serde(default)]
    pub routes: Vec<RouteRule>,
    /// Generic fallback applied to any path under its prefix
    #[serde(default)]
    pub catch_all: Option<RouteRule>,
}

/// Maps a path (or path prefix) to a policy key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRule {
    pub path: String,
    pub policy: String,
}

impl RouteRule {
    pub fn new(path: impl Into<String>, policy: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            policy: policy.into(),
        }
    }
}

impl RulesConfig {
    /// Load rules from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading admission rules");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load rules from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| TurnstileError::Config(format!("Failed to parse admission rules: {}", e)))
    }

    /// The policy and route table used when no rules file is configured.
    pub fn builtin() -> Self {
        use Strategy::*;

        let policies = [
            ("forms.submission", Policy::new(MINUTE, 5, SlidingWindow, "strict")),
            ("public.newsletter", Policy::new(HOUR, 3, FixedWindow, "strict")),
            ("public.contact", Policy::new(HOUR, 5, SlidingWindow, "strict")),
            ("auth.register", Policy::new(HOUR, 5, SlidingWindow, "strict")),
            ("auth.login", Policy::new(15 * MINUTE, 5, SlidingWindow, "strict")),
            ("auth.password_reset", Policy::new(HOUR, 3, FixedWindow, "strict")),
            ("search.query", Policy::new(MINUTE, 60, TokenBucket, "public")),
            ("admin.content_create", Policy::new(MINUTE, 30, TokenBucket, "admin")),
            ("upload.files", Policy::new(HOUR, 50, TokenBucket, "moderate")),
            ("admin.bulk_operations", Policy::new(HOUR, 10, FixedWindow, "admin")),
            ("api.general", Policy::new(MINUTE, 100, TokenBucket, "standard")),
            ("security.suspicious", Policy::new(HOUR, 1, FixedWindow, "security")),
        ]
        .into_iter()
        .map(|(key, policy)| (key.to_string(), policy))
        .collect();

        let routes = [
            ("/api/forms/submit", "forms.submission"),
            ("/api/forms", "forms.submission"),
            ("/api/newsletter", "public.newsletter"),
            ("/api/contact", "public.contact"),
            ("/api/auth/register", "auth.register"),
            ("/api/auth/login", "auth.login"),
            ("/api/auth/forgot-password", "auth.password_reset"),
            ("/api/auth/reset-password", "auth.password_reset"),
            ("/api/search", "search.query"),
            ("/api/admin/content", "admin.content_create"),
            ("/api/admin/bulk", "admin.bulk_operations"),
            ("/api/upload", "upload.files"),
        ]
        .into_iter()
        .map(|(path, policy)| RouteRule::new(path, policy))
        .collect();

        Self {
            policies,
            routes,
            catch_all: Some(RouteRule::new("/api", "api.general")),
        }
    }

    /// Validate every policy and build the registry.
    pub fn registry(&self) -> Result<PolicyRegistry> {
        PolicyRegistry::new(self.policies.clone())
    }

    /// Build the route resolver for this rule set.
    pub fn route_resolver(&self) -> RouteResolver {
        RouteResolver::new(self.routes.clone(), self.catch_all.clone())
    }

    /// Policy keys referenced by routes but missing from the policy table.
    ///
    /// These resolve at request time and then degrade, so they are reported
    /// rather than rejected.
    pub fn dangling_routes(&self) -> Vec<&RouteRule> {
        let dangling: Vec<&RouteRule> = self
            .routes
            .iter()
            .chain(self.catch_all.iter())
            .filter(|rule| !self.policies.contains_key(&rule.policy))
            .collect();

        for rule in &dangling {
            warn!(
                path = %rule.path,
                policy = %rule.policy,
                "Route references an unregistered policy"
            );
        }

        dangling
    }
}
