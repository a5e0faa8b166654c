//! Error types for the orchestration core.
//!
//! All errors are grouped into the six kinds from the error handling design:
//! configuration, daemon, image, lifecycle-timeout, state, and cancellation,
//! plus the lower-level IO/parse leaves that feed into them. Every fallible
//! public function in this crate returns [`MaestroResult`].

use std::time::Duration;
use thiserror::Error;

/// Result type alias for orchestration operations.
pub type MaestroResult<T> = Result<T, MaestroError>;

/// Top-level error type for the orchestration core.
#[derive(Debug, Error)]
pub enum MaestroError {
    /// Fatal configuration error: schema mismatch, unresolved name, or a
    /// cycle in the hard-dependency graph. Reported before any action runs.
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable description of what failed to resolve or validate.
        message: String,
    },

    /// Transport/RPC failure talking to a ship's Docker daemon (connection,
    /// auth, or a non-2xx response from the adapter).
    #[error("daemon error on ship {ship}: {message}")]
    Daemon {
        /// The ship whose daemon reported the failure.
        ship: String,
        /// Details of the transport or RPC failure.
        message: String,
    },

    /// Image pull or registry login failed after exhausting the registry's
    /// retry policy.
    #[error("image error for {image} on ship {ship}: {message}")]
    Image {
        /// The ship the image was being pulled onto.
        ship: String,
        /// The image reference that failed to resolve.
        image: String,
        /// Details of the pull/login failure.
        message: String,
    },

    /// A lifecycle check exhausted its `maxWait`/`attempts` budget without
    /// passing. The container is left in its current state for inspection.
    #[error("lifecycle check '{check}' timed out for {container} after {attempts} attempt(s)")]
    LifecycleTimeout {
        /// Name/kind of the check that timed out (e.g. "tcp:broker").
        check: String,
        /// The container instance the check was gating.
        container: String,
        /// Number of attempts made before giving up.
        attempts: u32,
    },

    /// An action was requested against a container in a state that makes it
    /// illegal (e.g. `logs` on an absent container).
    #[error("illegal state transition for {container}: {message}")]
    State {
        /// The container instance.
        container: String,
        /// Description of why the transition is illegal.
        message: String,
    },

    /// The task was interrupted by an external cancellation signal before
    /// it reached a terminal result.
    #[error("cancelled: {container}")]
    Cancelled {
        /// The container instance whose task was cancelled.
        container: String,
    },

    /// A blocking operation exceeded its timeout (ship default timeout, a
    /// probe budget expressed in wall-clock time, etc). Distinct from
    /// `LifecycleTimeout`, which always names a specific check.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Failed to parse a value handed to the core (already-rendered YAML
    /// fields, image references, durations).
    #[error("parse error: {0}")]
    Parse(String),

    /// Wrapped IO error, e.g. spawning a probe's exec child.
    #[error("io error: {0}")]
    Io(#[source] std::io::Error),
}

impl MaestroError {
    /// Construct a [`MaestroError::Config`].
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Construct a [`MaestroError::Config`] naming a dependency cycle,
    /// closing the loop back to the first node (`a -> b -> a`).
    pub fn cycle(path: &[String]) -> Self {
        let mut rendered = path.join(" -> ");
        if let Some(first) = path.first() {
            rendered.push_str(" -> ");
            rendered.push_str(first);
        }
        Self::Config {
            message: format!("dependency cycle detected: {rendered}"),
        }
    }

    /// Construct a [`MaestroError::Daemon`].
    pub fn daemon(ship: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Daemon {
            ship: ship.into(),
            message: message.into(),
        }
    }

    /// Construct a [`MaestroError::Image`].
    pub fn image(
        ship: impl Into<String>,
        image: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Image {
            ship: ship.into(),
            image: image.into(),
            message: message.into(),
        }
    }

    /// Construct a [`MaestroError::LifecycleTimeout`].
    pub fn lifecycle_timeout(
        check: impl Into<String>,
        container: impl Into<String>,
        attempts: u32,
    ) -> Self {
        Self::LifecycleTimeout {
            check: check.into(),
            container: container.into(),
            attempts,
        }
    }

    /// Construct a [`MaestroError::State`].
    pub fn state(container: impl Into<String>, message: impl Into<String>) -> Self {
        Self::State {
            container: container.into(),
            message: message.into(),
        }
    }

    /// Construct a [`MaestroError::Cancelled`].
    pub fn cancelled(container: impl Into<String>) -> Self {
        Self::Cancelled {
            container: container.into(),
        }
    }

    /// One-line diagnostic kind used in play summaries.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Daemon { .. } => "daemon",
            Self::Image { .. } => "image",
            Self::LifecycleTimeout { .. } => "lifecycle_timeout",
            Self::State { .. } => "state",
            Self::Cancelled { .. } => "cancelled",
            Self::Timeout(_) => "timeout",
            Self::Parse(_) => "parse",
            Self::Io(_) => "io",
        }
    }

    /// Whether retrying the same operation might succeed. Used by the image
    /// pull/login retry loop and nowhere else — most kinds here are already
    /// the terminal result of an exhausted retry budget.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Daemon { .. } | Self::Timeout(_) | Self::Io(_))
    }
}

impl From<std::io::Error> for MaestroError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_message_closes_the_loop() {
        let err = MaestroError::cycle(&["a".into(), "b".into()]);
        assert_eq!(
            err.to_string(),
            "configuration error: dependency cycle detected: a -> b -> a"
        );
    }

    #[test]
    fn kind_is_stable_per_variant() {
        assert_eq!(MaestroError::config("x").kind(), "config");
        assert_eq!(MaestroError::daemon("s1", "boom").kind(), "daemon");
        assert_eq!(
            MaestroError::lifecycle_timeout("tcp:broker", "kafka-1", 5).kind(),
            "lifecycle_timeout"
        );
    }
}
