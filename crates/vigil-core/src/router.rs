//! Alert routing with piggybacked delivery of deferred events.
//!
//! Deferred classes accumulate silently in a FIFO buffer; any immediate
//! event is sent at once and drags every pending deferred event out with
//! it. Sends are fire-and-forget: a failure is logged and the event is
//! dropped, never retried.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::presence::{ClassPolicy, PolicyTable};
use crate::types::DetectionEvent;

/// Outbound delivery boundary. Implementations own transport, wire format
/// and authentication; the router only decides *when* an event goes out.
pub trait AlertSink {
    fn send(&mut self, event: &DetectionEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

impl AlertSink for Box<dyn AlertSink + Send> {
    fn send(&mut self, event: &DetectionEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).send(event)
    }
}

/// FIFO holding area for deferred events.
///
/// Unbounded by default, matching the behavior this replaces. An optional
/// capacity cap evicts the oldest entry instead of growing without limit;
/// deployments that enable it trade completeness for bounded memory.
#[derive(Default)]
pub struct NotificationBuffer {
    queue: VecDeque<DetectionEvent>,
    cap: Option<usize>,
}

impl NotificationBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A buffer that never holds more than `cap` events, evicting oldest.
    pub fn bounded(cap: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            cap: Some(cap.max(1)),
        }
    }

    pub fn enqueue(&mut self, event: DetectionEvent) {
        if let Some(cap) = self.cap {
            if self.queue.len() >= cap {
                if let Some(evicted) = self.queue.pop_front() {
                    tracing::warn!(
                        class = %evicted.class,
                        cap,
                        "deferred buffer full; evicting oldest alert"
                    );
                }
            }
        }
        self.queue.push_back(event);
    }

    /// Drain the buffer in insertion order.
    pub fn flush(&mut self) -> Vec<DetectionEvent> {
        self.queue.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Classifies each event by configured priority and decides dispatch timing.
pub struct AlertRouter<S: AlertSink> {
    policy: Arc<PolicyTable>,
    buffer: NotificationBuffer,
    sink: S,
}

impl<S: AlertSink> AlertRouter<S> {
    pub fn new(policy: Arc<PolicyTable>, buffer: NotificationBuffer, sink: S) -> Self {
        Self {
            policy,
            buffer,
            sink,
        }
    }

    /// Route one event: buffer it, or send it and flush everything pending.
    pub fn route(&mut self, event: DetectionEvent) {
        match self.policy.resolve(&event.class) {
            ClassPolicy::Deferred => {
                tracing::debug!(class = %event.class, pending = self.buffer.len() + 1, "alert deferred");
                self.buffer.enqueue(event);
            }
            ClassPolicy::Suppressed => {
                // Filtered upstream by the tracker; don't send if one leaks through.
                tracing::debug!(class = %event.class, "suppressed event reached router; dropping");
            }
            ClassPolicy::Immediate => {
                tracing::info!(
                    class = %event.class,
                    piggybacked = self.buffer.len(),
                    "sending immediate alert"
                );
                self.dispatch(&event);
                for pending in self.buffer.flush() {
                    self.dispatch(&pending);
                }
            }
        }
    }

    /// Number of deferred events currently waiting for a flush.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    fn dispatch(&mut self, event: &DetectionEvent) {
        if let Err(err) = self.sink.send(event) {
            tracing::warn!(class = %event.class, error = %err, "alert send failed; dropping");
        }
    }
}
