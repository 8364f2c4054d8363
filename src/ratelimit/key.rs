//! Counter key generation.

/// Prefix the identifier resolver puts in front of bearer tokens.
const USER_PREFIX: &str = "user:";

/// A key that uniquely addresses one counter entry in the store.
///
/// Rendered as `<prefix>:<identifier>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    /// Fixed namespace for all rate limit counters
    pub prefix: String,
    /// Resolved client identifier
    pub identifier: String,
}

impl RateLimitKey {
    /// Create a new key from a prefix and a resolved identifier.
    pub fn new(prefix: &str, identifier: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            identifier: identifier.to_string(),
        }
    }

    /// The string form used as the store key.
    pub fn to_string_key(&self) -> String {
        format!("{}:{}", self.prefix, self.identifier)
    }

    /// Key form safe for logs: bearer-derived identifiers are masked.
    pub fn redacted(&self) -> String {
        if self.identifier.starts_with(USER_PREFIX) {
            format!("{}:{}***", self.prefix, USER_PREFIX)
        } else {
            self.to_string_key()
        }
    }
}

impl std::fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.prefix, self.identifier)
    }
}
