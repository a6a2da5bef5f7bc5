//! # gantry-exec
//!
//! The commit engine for the gantry container host. Callers describe a
//! container's intended configuration and power state in a [`Handle`]; the
//! [`CommitEngine`] turns that intent into an ordered sequence of remote
//! operations against the container's backing virtual machine.
//!
//! ## Commit ordering
//!
//! A commit performs at most one pass through:
//!
//! 1. create the VM (when the handle is not yet bound to one)
//! 2. power off (before any reconfigure, so guest-visible config is not
//!    rewritten under a running VM)
//! 3. reconfigure, guarded by the remote change version
//! 4. best-effort cache refresh
//! 5. power on
//!
//! The first error aborts the pass with no rollback: remote power and config
//! operations are not reversible without side effects of their own, so
//! recovery is a corrective re-commit, not an undo.
//!
//! ## Concurrency
//!
//! There is no multi-operation transaction on the remote side. Consistency is
//! approximated with optimistic concurrency: the outgoing spec carries the
//! change version read from the cached config, and the remote side rejects a
//! stale tag with a [`VmFault::ConcurrentAccess`] fault, surfaced to callers
//! as [`CommitError::ConcurrentAccess`] so they can refresh and retry.
//!
//! ## Modules
//!
//! - `vm`: remote management API interface and mock
//! - `handle`: the single-use transaction descriptor
//! - `container` / `cache`: cached authoritative snapshots
//! - `commit`: the state-transition engine
//! - `guest`: in-guest config reload collaborator
//! - `events`: lifecycle event sink
//! - `migration`: in-memory upgrade of older-schema persisted config

pub mod cache;
pub mod commit;
pub mod container;
pub mod error;
pub mod events;
pub mod guest;
pub mod handle;
pub mod migration;
pub mod session;
pub mod vm;

pub use cache::ContainerCache;
pub use commit::CommitEngine;
pub use container::Container;
pub use error::CommitError;
pub use events::{EventSink, LogSink, RecordingSink};
pub use guest::{GuestOps, MockGuest};
pub use handle::{Handle, TargetState};
pub use session::{Placement, Session};
pub use vm::{
    FolderRef, MockVmService, PowerState, ResourcePoolRef, Vm, VmConfig, VmFault, VmRuntime,
    VmService, VmSpec,
};
