//! Path to policy-key resolution.

use super::rules::RouteRule;

/// Maps an inbound path to a policy key.
///
/// Resolution order: exact match, then the longest registered prefix, then
/// the catch-all when the path falls under its prefix. Registration order
/// never affects the result.
#[derive(Debug, Clone, Default)]
pub struct RouteResolver {
    /// Rules sorted by descending path length
    rules: Vec<RouteRule>,
    catch_all: Option<RouteRule>,
}

impl RouteResolver {
    pub fn new(mut rules: Vec<RouteRule>, catch_all: Option<RouteRule>) -> Self {
        // Stable sort keeps equal-length duplicates in registration order.
        rules.sort_by(|a, b| b.path.len().cmp(&a.path.len()));
        Self { rules, catch_all }
    }

    /// Resolve a path to a policy key. `None` means no admission control applies.
    pub fn resolve_policy_key(&self, path: &str) -> Option<&str> {
        if let Some(rule) = self.rules.iter().find(|rule| rule.path == path) {
            return Some(&rule.policy);
        }

        if let Some(rule) = self.rules.iter().find(|rule| path.starts_with(rule.path.as_str())) {
            return Some(&rule.policy);
        }

        match &self.catch_all {
            Some(rule) if path.starts_with(rule.path.as_str()) => Some(&rule.policy),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len() + usize::from(self.catch_all.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(rules: &[(&str, &str)]) -> RouteResolver {
        RouteResolver::new(
            rules.iter().map(|(p, k)| RouteRule::new(*p, *k)).collect(),
            Some(RouteRule::new("/api", "api.general")),
        )
    }

    #[test]
    fn test_exact_match() {
        let resolver = resolver(&[("/api/auth/login", "auth.login")]);
        assert_eq!(resolver.resolve_policy_key("/api/auth/login"), Some("auth.login"));
    }

    #[test]
    fn test_specific_beats_catch_all_regardless_of_order() {
        let resolver = RouteResolver::new(
            vec![
                RouteRule::new("/api", "api.general"),
                RouteRule::new("/api/forms/submit", "forms.submission"),
            ],
            None,
        );
        assert_eq!(
            resolver.resolve_policy_key("/api/forms/submit"),
            Some("forms.submission")
        );
        assert_eq!(
            resolver.resolve_policy_key("/api/forms/submit/draft"),
            Some("forms.submission")
        );
    }

    #[test]
    fn test_longest_prefix_wins() {
        let resolver = resolver(&[
            ("/api/admin", "admin.content_create"),
            ("/api/admin/bulk", "admin.bulk_operations"),
        ]);
        assert_eq!(
            resolver.resolve_policy_key("/api/admin/bulk/delete"),
            Some("admin.bulk_operations")
        );
        assert_eq!(
            resolver.resolve_policy_key("/api/admin/pages"),
            Some("admin.content_create")
        );
    }

    #[test]
    fn test_catch_all_fallback() {
        let resolver = resolver(&[("/api/search", "search.query")]);
        assert_eq!(resolver.resolve_policy_key("/api/widgets"), Some("api.general"));
        assert_eq!(resolver.resolve_policy_key("/api"), Some("api.general"));
    }

    #[test]
    fn test_unmatched_path_bypasses() {
        let resolver = resolver(&[("/api/search", "search.query")]);
        assert_eq!(resolver.resolve_policy_key("/about"), None);
        assert_eq!(resolver.resolve_policy_key("/"), None);
    }

    #[test]
    fn test_empty_resolver() {
        let resolver = RouteResolver::default();
        assert!(resolver.is_empty());
        assert_eq!(resolver.resolve_policy_key("/api/anything"), None);
    }
}
