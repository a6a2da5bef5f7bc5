//! # gantry-id
//!
//! Typed identifiers for the gantry container host.
//!
//! Every resource the commit path touches has a dedicated ID type so that a
//! container identifier can never be handed to an API expecting a VM
//! reference. All IDs share one canonical string form, `{prefix}_{ulid}`:
//!
//! - `ctr_01JDQ4W2N8XKJNM8GPQY6VBKC3` (a container)
//! - `vm_01JDQ4X3P9LTRS0JTUA8XDME5F` (a backing virtual machine)
//! - `task_01JDQ4Y4QAKPQR9HSTZ7WCLD4E` (a remote management task)
//!
//! ULIDs keep IDs time-ordered and unique; the prefix makes them
//! self-describing in logs. Parsing is strict: a missing or mismatched
//! prefix is an error, never a coercion.

mod error;
mod types;

pub use error::IdError;
pub use types::{ContainerId, TaskId, VmId};

/// Re-export for consumers that need raw ULID operations.
pub use ulid::Ulid;
