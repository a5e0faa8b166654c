//! Audit and progress observation: side channels a play reports through,
//! kept fully decoupled from scheduling itself so a caller can plug in
//! logging, a webhook, a TUI, or nothing at all.

pub mod progress;

use async_trait::async_trait;
use tracing::warn;

/// One notable thing that happened during a play, named by the
/// daemon-facing operation it corresponds to.
#[derive(Debug, Clone, PartialEq)]
pub enum AuditEvent {
    /// An image pull started.
    PullStarted { ship: String, image: String },
    /// An image pull finished, successfully or not.
    PullFinished { ship: String, image: String, ok: bool },
    /// A container was created.
    Created { container: String },
    /// A container was started.
    Started { container: String },
    /// A container was stopped.
    Stopped { container: String },
    /// A container was removed.
    Removed { container: String },
    /// A lifecycle check passed.
    CheckPassed { container: String, check: String },
    /// A lifecycle check failed after exhausting its retry budget.
    CheckFailed { container: String, check: String },
    /// An instance's reconciliation failed.
    InstanceFailed { container: String, message: String },
}

/// A sink that observes audit events. Implementations should not block the
/// play on slow I/O; `ignore_errors` on [`AuditBus`] controls whether a
/// failing sink aborts the play or is merely logged.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Record one event. Returning `Err` aborts the play unless the bus
    /// this sink is registered with has `ignore_errors` set for it.
    async fn record(&self, event: &AuditEvent) -> Result<(), String>;
}

struct RegisteredSink {
    sink: Box<dyn AuditSink>,
    ignore_errors: bool,
}

/// Fans one event out to every registered [`AuditSink`].
#[derive(Default)]
pub struct AuditBus {
    sinks: Vec<RegisteredSink>,
}

impl AuditBus {
    /// A bus with no sinks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `sink`. When `ignore_errors` is true, a failure from this
    /// sink is logged but does not abort the play.
    pub fn register(&mut self, sink: Box<dyn AuditSink>, ignore_errors: bool) {
        self.sinks.push(RegisteredSink { sink, ignore_errors });
    }

    /// Dispatch `event` to every sink, in registration order. Returns the
    /// first error from a sink whose `ignore_errors` is false.
    pub async fn dispatch(&self, event: AuditEvent) -> Result<(), String> {
        for registered in &self.sinks {
            if let Err(e) = registered.sink.record(&event).await {
                if registered.ignore_errors {
                    warn!(error = %e, "audit sink failed, ignoring");
                } else {
                    return Err(e);
                }
            }
        }
        Ok(())
    }
}

/// Coarse-grained progress, separate from [`AuditEvent`] because a caller
/// driving a progress bar cares about counts, not daemon operation detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent {
    /// A layer of the play started, `total` containers in it.
    LayerStarted { total: usize },
    /// One container in the current layer finished, successfully or not.
    ContainerFinished { ok: bool },
    /// The play finished.
    PlayFinished,
}

/// A lightweight progress sink, typically a `tokio::sync::mpsc::Sender` or
/// a TUI handle; kept as a plain callback so it never needs `async-trait`
/// dispatch overhead for what is always a cheap, synchronous update.
pub trait ProgressSink: Send + Sync {
    /// Report one progress event.
    fn report(&self, event: ProgressEvent);
}

/// A `ProgressSink` that does nothing, for callers with no interactive UI.
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// A `ProgressSink` backed by `tracing`, logging each event at debug level.
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn report(&self, event: ProgressEvent) {
        tracing::debug!(?event, "progress");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSink(Arc<AtomicUsize>);

    #[async_trait]
    impl AuditSink for CountingSink {
        async fn record(&self, _event: &AuditEvent) -> Result<(), String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl AuditSink for FailingSink {
        async fn record(&self, _event: &AuditEvent) -> Result<(), String> {
            Err("boom".into())
        }
    }

    #[tokio::test]
    async fn dispatches_to_all_sinks() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut bus = AuditBus::new();
        bus.register(Box::new(CountingSink(counter.clone())), false);
        bus.register(Box::new(CountingSink(counter.clone())), false);
        bus.dispatch(AuditEvent::Started {
            container: "c1".into(),
        })
        .await
        .unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn ignore_errors_swallows_failure() {
        let mut bus = AuditBus::new();
        bus.register(Box::new(FailingSink), true);
        bus.dispatch(AuditEvent::Started {
            container: "c1".into(),
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn non_ignored_failure_propagates() {
        let mut bus = AuditBus::new();
        bus.register(Box::new(FailingSink), false);
        let err = bus
            .dispatch(AuditEvent::Started {
                container: "c1".into(),
            })
            .await;
        assert!(err.is_err());
    }
}
