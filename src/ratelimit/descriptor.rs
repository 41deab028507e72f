//! Partition key generation and handling.

/// A key that uniquely identifies one quota partition.
///
/// Each (policy, identifier) pair is tracked independently.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionKey {
    /// The policy this partition belongs to
    pub policy: String,
    /// The resolved identifier (client IP, user id, ...)
    pub identifier: String,
}

impl PartitionKey {
    pub fn new(policy: &str, identifier: &str) -> Self {
        Self {
            policy: policy.to_string(),
            identifier: identifier.to_string(),
        }
    }

    /// Convert the key to a flat string, suitable for external stores.
    pub fn to_string_key(&self) -> String {
        format!("{}:{}", self.policy, self.identifier)
    }
}

impl std::fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_string_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_key_to_string() {
        let key = PartitionKey::new("auth.login", "203.0.113.7");
        assert_eq!(key.to_string_key(), "auth.login:203.0.113.7");
        assert_eq!(key.to_string(), "auth.login:203.0.113.7");
    }

    #[test]
    fn test_partition_key_equality() {
        let a = PartitionKey::new("search.query", "user-1");
        let b = PartitionKey::new("search.query", "user-1");
        let c = PartitionKey::new("search.query", "user-2");

        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
