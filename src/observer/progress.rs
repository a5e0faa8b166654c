//! A concrete multi-subscriber [`ProgressSink`].

use super::{ProgressEvent, ProgressSink};
use std::sync::Mutex;

/// Fans one [`ProgressEvent`] out to every registered subscriber, in
/// registration order. A subscriber is any closure or sink reachable as
/// `Box<dyn ProgressSink>`; registration is cheap and expected to happen
/// once, before a play starts.
#[derive(Default)]
pub struct ProgressBus {
    subscribers: Mutex<Vec<Box<dyn ProgressSink>>>,
}

impl ProgressBus {
    /// A bus with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber.
    pub fn subscribe(&self, sink: Box<dyn ProgressSink>) {
        self.subscribers.lock().unwrap().push(sink);
    }
}

impl ProgressSink for ProgressBus {
    fn report(&self, event: ProgressEvent) {
        for sink in self.subscribers.lock().unwrap().iter() {
            sink.report(event);
        }
    }
}
