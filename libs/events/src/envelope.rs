//! The container event record.

use chrono::{DateTime, Utc};
use gantry_id::ContainerId;
use serde::{Deserialize, Serialize};

use crate::ContainerEventKind;

/// A single container lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerEvent {
    /// The container the transition applies to.
    pub container_id: ContainerId,

    /// When the transition took effect.
    pub occurred_at: DateTime<Utc>,

    /// The kind of transition.
    pub kind: ContainerEventKind,
}

impl ContainerEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn now(container_id: ContainerId, kind: ContainerEventKind) -> Self {
        Self {
            container_id,
            occurred_at: Utc::now(),
            kind,
        }
    }
}

impl std::fmt::Display for ContainerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind, self.container_id)
    }
}
