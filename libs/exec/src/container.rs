//! The cached view of a committed container.
//!
//! A `Container` is created on successful creation-commit and updated on
//! every later successful commit. It owns the bound VM and the last-known
//! remote snapshots, and exposes the power primitives the engine drives.

use gantry_id::ContainerId;
use tokio::sync::RwLock;
use tracing::debug;

use crate::handle::Handle;
use crate::vm::{Vm, VmConfig, VmFault, VmRuntime};

#[derive(Debug, Default)]
struct ContainerState {
    runtime: Option<VmRuntime>,
    config: Option<VmConfig>,
}

/// A container known to this process, backed by a remote VM.
pub struct Container {
    id: ContainerId,
    vm: Vm,
    state: RwLock<ContainerState>,
}

impl Container {
    /// Registers a container around an existing VM with whatever snapshots
    /// are known. Fresh creations start with no snapshots at all.
    pub fn new(
        id: ContainerId,
        vm: Vm,
        runtime: Option<VmRuntime>,
        config: Option<VmConfig>,
    ) -> Self {
        Self {
            id,
            vm,
            state: RwLock::new(ContainerState { runtime, config }),
        }
    }

    #[must_use]
    pub fn id(&self) -> ContainerId {
        self.id
    }

    #[must_use]
    pub fn vm(&self) -> &Vm {
        &self.vm
    }

    /// Last-known runtime snapshot.
    pub async fn runtime(&self) -> Option<VmRuntime> {
        self.state.read().await.runtime
    }

    /// Last-known config snapshot.
    pub async fn config(&self) -> Option<VmConfig> {
        self.state.read().await.config.clone()
    }

    /// Power off the backing VM, resolving when the remote task completes.
    pub async fn stop(&self) -> Result<(), VmFault> {
        self.vm.power_off().await
    }

    /// Power on the backing VM, resolving when the remote task completes.
    pub async fn start(&self) -> Result<(), VmFault> {
        self.vm.power_on().await
    }

    /// Best-effort update of the cached snapshots from the handle's latest
    /// view. Only fields the handle actually knows are written.
    pub(crate) async fn refresh_from_handle(&self, handle: &Handle) {
        let mut state = self.state.write().await;
        if let Some(runtime) = handle.runtime() {
            state.runtime = Some(*runtime);
        }
        if let Some(config) = handle.config() {
            state.config = Some(config.clone());
        }
        debug!(container_id = %self.id, "refreshed cached state from handle");
    }
}
