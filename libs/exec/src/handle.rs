//! The single-use transaction descriptor consumed by the commit engine.
//!
//! A handle describes one pending multi-step change: the full desired
//! configuration (if any), the desired power state, and the backing VM it
//! targets (absent until creation). It also carries the last-known remote
//! snapshots the engine validates its steps against. A handle is exclusively
//! owned by the single commit invocation processing it.

use gantry_id::ContainerId;

use crate::container::Container;
use crate::migration::migrate_config;
use crate::vm::{PowerState, Vm, VmConfig, VmRuntime, VmSpec};

/// Desired power state for the backing VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetState {
    /// Leave power state alone.
    #[default]
    Unset,
    Stopped,
    Running,
}

/// A pending change to one container's backing VM.
#[derive(Debug, Clone)]
pub struct Handle {
    pub(crate) id: ContainerId,

    /// Full desired configuration. Present means a create or reconfigure is
    /// requested; cleared by the engine once acted upon.
    pub(crate) spec: Option<VmSpec>,

    pub(crate) target_state: TargetState,

    /// The backing VM. Absent means "not yet created".
    pub(crate) vm: Option<Vm>,

    /// Last-known remote runtime state, if any.
    pub(crate) runtime: Option<VmRuntime>,

    /// Last-known remote config snapshot, carrying the change version the
    /// next reconfigure is conditioned on.
    pub(crate) config: Option<VmConfig>,

    /// Set when the cached config was written by an older schema and has
    /// been upgraded in memory. Forces the guest-visible payload to be
    /// withheld on reconfigure.
    pub(crate) migrated: bool,

    /// Ask the running container to reload config after a reconfigure.
    pub(crate) reload_requested: bool,
}

impl Handle {
    /// A handle for a container that does not exist yet. Creation always
    /// requires a spec, so one is taken here rather than optionally.
    pub fn create(id: ContainerId, spec: VmSpec) -> Self {
        Self {
            id,
            spec: Some(spec),
            target_state: TargetState::Unset,
            vm: None,
            runtime: None,
            config: None,
            migrated: false,
            reload_requested: false,
        }
    }

    /// A handle for an existing container, seeded with its cached snapshots.
    ///
    /// An older-schema config snapshot is upgraded in memory here and the
    /// handle marked migrated.
    pub async fn from_container(container: &Container) -> Self {
        let runtime = container.runtime().await;
        let mut config = container.config().await;
        let migrated = config.as_mut().map(migrate_config).unwrap_or(false);

        Self {
            id: container.id(),
            spec: None,
            target_state: TargetState::Unset,
            vm: Some(container.vm().clone()),
            runtime,
            config,
            migrated,
            reload_requested: false,
        }
    }

    /// Request a configuration change.
    pub fn set_spec(&mut self, spec: VmSpec) {
        self.spec = Some(spec);
    }

    /// Request a power transition.
    pub fn set_target_state(&mut self, target_state: TargetState) {
        self.target_state = target_state;
    }

    /// Ask the running container process to reload configuration after a
    /// successful reconfigure.
    pub fn request_reload(&mut self) {
        self.reload_requested = true;
    }

    #[must_use]
    pub fn id(&self) -> ContainerId {
        self.id
    }

    #[must_use]
    pub fn spec(&self) -> Option<&VmSpec> {
        self.spec.as_ref()
    }

    #[must_use]
    pub fn target_state(&self) -> TargetState {
        self.target_state
    }

    #[must_use]
    pub fn vm(&self) -> Option<&Vm> {
        self.vm.as_ref()
    }

    #[must_use]
    pub fn runtime(&self) -> Option<&VmRuntime> {
        self.runtime.as_ref()
    }

    #[must_use]
    pub fn config(&self) -> Option<&VmConfig> {
        self.config.as_ref()
    }

    #[must_use]
    pub fn migrated(&self) -> bool {
        self.migrated
    }

    #[must_use]
    pub fn reload_requested(&self) -> bool {
        self.reload_requested
    }

    /// Power state as last known, if known at all.
    pub(crate) fn power_state(&self) -> Option<PowerState> {
        self.runtime.as_ref().map(|r| r.power_state)
    }
}
