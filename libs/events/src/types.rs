//! Event kind definitions.

use serde::{Deserialize, Serialize};

use crate::EventError;

/// All event type names as constants.
pub mod event_types {
    pub const CONTAINER_CREATED: &str = "container.created";
    pub const CONTAINER_STOPPED: &str = "container.stopped";
    pub const CONTAINER_STARTED: &str = "container.started";
}

/// The kind of a container lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerEventKind {
    /// The backing VM was created.
    Created,
    /// The backing VM was powered off.
    Stopped,
    /// The backing VM was powered on.
    Started,
}

impl ContainerEventKind {
    /// Returns the canonical event type name.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            ContainerEventKind::Created => event_types::CONTAINER_CREATED,
            ContainerEventKind::Stopped => event_types::CONTAINER_STOPPED,
            ContainerEventKind::Started => event_types::CONTAINER_STARTED,
        }
    }

    /// Parses a canonical event type name. Strict: unknown names are errors,
    /// never coerced.
    pub fn from_event_type(s: &str) -> Result<Self, EventError> {
        match s {
            event_types::CONTAINER_CREATED => Ok(ContainerEventKind::Created),
            event_types::CONTAINER_STOPPED => Ok(ContainerEventKind::Stopped),
            event_types::CONTAINER_STARTED => Ok(ContainerEventKind::Started),
            other => Err(EventError::UnknownEventType(other.to_string())),
        }
    }
}

impl std::fmt::Display for ContainerEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.event_type())
    }
}
