//! Error types for the commit path.

use gantry_id::ContainerId;
use thiserror::Error;

use crate::vm::VmFault;

/// Errors returned by [`crate::CommitEngine::commit`].
///
/// `ConcurrentAccess` is deliberately distinguishable from `Task`: it means
/// the remote resource changed under this commit and the right response is to
/// refresh state and retry, not to treat the container as broken.
#[derive(Debug, Error)]
pub enum CommitError {
    /// A creation was requested without a pending spec.
    #[error("a spec must be provided for create operations")]
    MissingSpec,

    /// A creation was requested without a management API session.
    #[error("no session provided for create operations")]
    MissingSession,

    /// The cache already holds a container with this id.
    #[error("a container already exists in the cache with id {0}")]
    DuplicateContainer(ContainerId),

    /// The handle is bound to a VM the cache has never seen.
    #[error("no cached container for id {0}")]
    UnknownContainer(ContainerId),

    /// The remote change version was stale at reconfigure time.
    #[error("concurrent modification of container {id}")]
    ConcurrentAccess {
        id: ContainerId,
        #[source]
        fault: VmFault,
    },

    /// Any other failure reported by a remote create/reconfigure/power task.
    /// Propagated as-is; remote operations carry their own retry policy.
    #[error(transparent)]
    Task(#[from] VmFault),
}

impl CommitError {
    /// True when the caller should refresh cached state and re-issue the
    /// commit rather than report a failure.
    #[must_use]
    pub fn is_concurrent_access(&self) -> bool {
        matches!(self, CommitError::ConcurrentAccess { .. })
    }
}
