//! # gantry-events
//!
//! Lifecycle event definitions for the gantry container host.
//!
//! Events are immutable records of container state transitions, published by
//! the commit path as each transition takes durable effect on the backing
//! virtual machine. Publication is fire-and-forget: an event describes what
//! already happened and is never rolled back, even when a later step of the
//! same commit fails.
//!
//! Every event carries the container it belongs to, the moment it occurred,
//! and its kind (`container.created`, `container.stopped`,
//! `container.started`).

mod envelope;
mod error;
mod types;

pub use envelope::ContainerEvent;
pub use error::EventError;
pub use types::{event_types, ContainerEventKind};
