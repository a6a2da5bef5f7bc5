//! Fire-and-forget publication of lifecycle events.
//!
//! The commit path publishes an event the moment a transition takes durable
//! effect on the remote resource. Publication never fails a commit and is
//! never rolled back: a created event stands even when a later step of the
//! same commit errors.

use std::sync::{Mutex, PoisonError};

use gantry_events::{ContainerEvent, ContainerEventKind};
use tracing::info;

/// Sink for container lifecycle events.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: ContainerEvent);
}

/// Sink that writes events to the log. The default for embedders that have
/// no event bus wired up.
#[derive(Debug, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn publish(&self, event: ContainerEvent) {
        info!(
            container_id = %event.container_id,
            kind = %event.kind,
            occurred_at = %event.occurred_at,
            "container event"
        );
    }
}

/// Sink that records events for test assertions.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ContainerEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events published so far, in order.
    pub fn events(&self) -> Vec<ContainerEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Just the kinds, in publication order.
    pub fn kinds(&self) -> Vec<ContainerEventKind> {
        self.events().into_iter().map(|e| e.kind).collect()
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, event: ContainerEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
