//! Registry credentials, bound to a registry URL.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Controls how many times, and for which failures, an image pull or
/// registry login is retried before the image action fails the task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// HTTP status codes that trigger a retry. Any other failure (including
    /// non-HTTP transport errors) fails fast.
    #[serde(default)]
    pub retry_statuses: HashSet<u16>,
}

fn default_max_attempts() -> u32 {
    1
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_statuses: HashSet::new(),
        }
    }
}

impl RetryPolicy {
    /// Whether `status` should trigger another attempt.
    #[must_use]
    pub fn should_retry(&self, status: u16) -> bool {
        self.retry_statuses.contains(&status)
    }
}

/// Credentials for one registry host. The password may arrive already
/// decrypted by the loader, or still encrypted with a passphrase-sourced
/// key — decryption is a loader concern; this crate treats `password` as
/// an opaque string to hand to the adapter's `login` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registry {
    /// Registry host, e.g. `registry.example.com` or
    /// `registry.example.com:5000`. Matched against image repository
    /// prefixes (exact host, then FQDN fallback) to select credentials.
    pub url: String,
    /// Username.
    pub username: String,
    /// Password (opaque; may be pre-decrypted by the loader).
    pub password: String,
    /// Contact email some registries still require.
    #[serde(default)]
    pub email: Option<String>,
    /// Pull/login retry policy for this registry.
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Registry {
    /// Whether `repository` (e.g. `registry.example.com:5000/team/app`)
    /// is hosted by this registry: exact host match first, then an FQDN
    /// suffix fallback.
    #[must_use]
    pub fn matches(&self, repository_host: &str) -> bool {
        repository_host == self.url
            || repository_host.ends_with(&format!(".{}", self.url))
            || self.url.ends_with(&format!(".{repository_host}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reg(url: &str) -> Registry {
        Registry {
            url: url.into(),
            username: "u".into(),
            password: "p".into(),
            email: None,
            retry: RetryPolicy::default(),
        }
    }

    #[test]
    fn exact_host_match() {
        assert!(reg("registry.example.com").matches("registry.example.com"));
    }

    #[test]
    fn fqdn_suffix_fallback() {
        assert!(reg("example.com").matches("registry.example.com"));
        assert!(!reg("example.com").matches("other.com"));
    }

    #[test]
    fn retry_policy_checks_status_set() {
        let mut policy = RetryPolicy::default();
        policy.retry_statuses.insert(503);
        assert!(policy.should_retry(503));
        assert!(!policy.should_retry(404));
    }
}
