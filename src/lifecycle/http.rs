//! HTTP request probe.

use super::{Budget, CheckContext, LifecycleCheck, PortRef};
use crate::error::{MaestroError, MaestroResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Passes when a request to the target returns a 2xx/3xx status and,
/// if `match_regex` is set, the response body matches it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpCheck {
    /// Host to request; defaults to the container's ship address.
    #[serde(default)]
    pub host: Option<String>,
    /// Port to request, named or literal.
    pub port: PortRef,
    /// `http` or `https`.
    #[serde(default = "default_scheme")]
    pub scheme: String,
    /// Request method.
    #[serde(default = "default_method")]
    pub method: String,
    /// Request path.
    #[serde(default = "default_path")]
    pub path: String,
    /// Regex the response body must match, if set.
    #[serde(default)]
    pub match_regex: Option<String>,
    /// Request timeout, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Retry budget.
    #[serde(default)]
    pub budget: Budget,
}

fn default_scheme() -> String {
    "http".into()
}

fn default_method() -> String {
    "GET".into()
}

fn default_path() -> String {
    "/".into()
}

fn default_request_timeout_secs() -> u64 {
    5
}

#[async_trait::async_trait]
impl LifecycleCheck for HttpCheck {
    async fn attempt(&self, ctx: &CheckContext<'_>) -> MaestroResult<bool> {
        let host = self.host.as_deref().unwrap_or(ctx.ship_address);
        let port = ctx.resolve_port(&self.port)?;
        let url = format!("{}://{host}:{port}{}", self.scheme, self.path);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.request_timeout_secs))
            .build()
            .map_err(|e| MaestroError::config(format!("building http client: {e}")))?;
        let method = reqwest::Method::from_bytes(self.method.as_bytes())
            .map_err(|e| MaestroError::config(format!("invalid http method '{}': {e}", self.method)))?;

        let response = match client.request(method, &url).send().await {
            Ok(r) => r,
            Err(_) => return Ok(false),
        };
        if !response.status().is_success() && !response.status().is_redirection() {
            return Ok(false);
        }
        let Some(pattern) = &self.match_regex else {
            return Ok(true);
        };
        let re = Regex::new(pattern)
            .map_err(|e| MaestroError::config(format!("invalid match_regex '{pattern}': {e}")))?;
        let body = response.text().await.unwrap_or_default();
        Ok(re.is_match(&body))
    }

    fn budget(&self) -> &Budget {
        &self.budget
    }

    fn describe(&self) -> String {
        match &self.port {
            PortRef::Named(name) => format!("http:{name}{}", self.path),
            PortRef::Numeric(n) => format!("http:{n}{}", self.path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_plain_get_root() {
        assert_eq!(default_method(), "GET");
        assert_eq!(default_path(), "/");
        assert_eq!(default_scheme(), "http");
    }
}
