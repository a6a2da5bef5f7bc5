//! Remote management API interface for backing virtual machines.
//!
//! The authoritative state of every container lives in its backing VM on the
//! virtualization host. This module defines the slice of the management API
//! the commit path consumes: creation at a placement target, reconfiguration
//! guarded by a change version, power transitions, and a lightweight
//! runtime/config read. Each call issues the operation as a remote task and
//! resolves when that task completes, surfacing the remote fault payload as a
//! [`VmFault`].
//!
//! A mock implementation lives in [`mock`] for tests and development.

mod mock;

pub use mock::{MockVmService, OpCounts};

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use gantry_id::{TaskId, VmId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Power state reported by the remote resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerState {
    PoweredOn,
    PoweredOff,
}

impl std::fmt::Display for PowerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PowerState::PoweredOn => f.write_str("powered_on"),
            PowerState::PoweredOff => f.write_str("powered_off"),
        }
    }
}

/// Runtime snapshot of a VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmRuntime {
    pub power_state: PowerState,
}

/// Configuration snapshot of a VM as last read from the remote side.
///
/// `change_version` is the monotonically changing token used for optimistic
/// concurrency; `schema_version` records which on-resource schema the
/// persisted configuration was written with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmConfig {
    pub name: String,
    pub cpus: u32,
    pub memory_mb: u64,
    pub change_version: String,
    pub schema_version: u32,
    /// Guest-visible key/value configuration.
    pub extra_config: BTreeMap<String, String>,
}

/// A full desired configuration, sent outgoing on create and reconfigure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmSpec {
    pub name: String,
    pub cpus: u32,
    pub memory_mb: u64,

    /// Guest-visible configuration to apply. `None` leaves the existing
    /// guest-visible configuration untouched.
    pub extra_config: Option<BTreeMap<String, String>>,

    /// Change version the write is conditioned on. Stamped from the cached
    /// config immediately before a reconfigure; unset on creation.
    pub change_version: Option<String>,
}

impl VmSpec {
    pub fn new(name: impl Into<String>, cpus: u32, memory_mb: u64) -> Self {
        Self {
            name: name.into(),
            cpus,
            memory_mb,
            extra_config: None,
            change_version: None,
        }
    }

    #[must_use]
    pub fn with_extra_config(mut self, extra_config: BTreeMap<String, String>) -> Self {
        self.extra_config = Some(extra_config);
        self
    }
}

/// Reference to a pooled parent resource for child VM creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePoolRef(String);

impl ResourcePoolRef {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }
}

impl std::fmt::Display for ResourcePoolRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference to a top-level placement folder for VM creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderRef(String);

impl FolderRef {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }
}

impl std::fmt::Display for FolderRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fault payload surfaced by a remote task.
///
/// Modeled as a discriminated type rather than an opaque error channel so
/// that concurrent modification can be pattern-matched by callers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VmFault {
    /// The change version on the outgoing spec no longer matches the remote
    /// resource. Somebody else wrote first.
    #[error("concurrent modification: change version '{version}' is stale")]
    ConcurrentAccess { version: String },

    /// The requested power transition does not apply to the current state.
    #[error("invalid power state transition: VM is already {actual}")]
    InvalidPowerState { actual: PowerState },

    /// The VM does not exist on the remote side.
    #[error("VM not found: {0}")]
    NotFound(VmId),

    /// Any other remote task failure.
    #[error("remote task {task} failed: {message}")]
    TaskFailed { task: TaskId, message: String },
}

/// The slice of the remote management API the commit path consumes.
///
/// Implementations block each call until the issued remote task resolves or
/// errors; there is no cancellation distinct from the task itself failing.
#[async_trait]
pub trait VmService: Send + Sync {
    /// Create a VM as a child of a pooled parent resource.
    async fn create_child_vm(&self, spec: &VmSpec, pool: &ResourcePoolRef)
        -> Result<VmId, VmFault>;

    /// Create a VM at a top-level placement folder.
    async fn create_vm(&self, spec: &VmSpec, folder: &FolderRef) -> Result<VmId, VmFault>;

    /// Apply a full configuration, conditioned on `spec.change_version`.
    async fn reconfigure(&self, vm: VmId, spec: &VmSpec) -> Result<(), VmFault>;

    async fn power_on(&self, vm: VmId) -> Result<(), VmFault>;

    async fn power_off(&self, vm: VmId) -> Result<(), VmFault>;

    /// Lightweight, non-destructive read of current runtime and config.
    async fn fetch_state(&self, vm: VmId) -> Result<(VmRuntime, VmConfig), VmFault>;
}

/// A VM bound to the service that manages it.
///
/// Pairs the remote reference with the capability to operate on it, so that
/// containers and handles can carry one value instead of threading a service
/// everywhere.
#[derive(Clone)]
pub struct Vm {
    service: Arc<dyn VmService>,
    id: VmId,
}

impl Vm {
    pub fn new(service: Arc<dyn VmService>, id: VmId) -> Self {
        Self { service, id }
    }

    #[must_use]
    pub fn id(&self) -> VmId {
        self.id
    }

    pub async fn reconfigure(&self, spec: &VmSpec) -> Result<(), VmFault> {
        self.service.reconfigure(self.id, spec).await
    }

    pub async fn power_on(&self) -> Result<(), VmFault> {
        self.service.power_on(self.id).await
    }

    pub async fn power_off(&self) -> Result<(), VmFault> {
        self.service.power_off(self.id).await
    }

    pub async fn fetch_state(&self) -> Result<(VmRuntime, VmConfig), VmFault> {
        self.service.fetch_state(self.id).await
    }
}

impl std::fmt::Debug for Vm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vm").field("id", &self.id).finish_non_exhaustive()
    }
}
