//! In-memory VM service for tests and development.
//!
//! Models the behaviors the commit path depends on: change-version
//! compare-and-set on reconfigure, strict power transitions, and a targeted
//! runtime/config read. Operations are counted so tests can assert that a
//! no-op commit really issued nothing.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use gantry_id::{TaskId, VmId};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{
    FolderRef, PowerState, ResourcePoolRef, VmConfig, VmFault, VmRuntime, VmService, VmSpec,
};
use crate::migration::DATA_VERSION;

/// Per-operation invocation counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpCounts {
    pub creates: u64,
    pub reconfigures: u64,
    pub power_ons: u64,
    pub power_offs: u64,
    pub fetches: u64,
}

#[derive(Debug, Clone)]
struct MockVm {
    name: String,
    cpus: u32,
    memory_mb: u64,
    extra_config: BTreeMap<String, String>,
    power: PowerState,
    change_seq: u64,
}

impl MockVm {
    fn change_version(&self) -> String {
        format!("cv-{}", self.change_seq)
    }

    fn config(&self) -> VmConfig {
        VmConfig {
            name: self.name.clone(),
            cpus: self.cpus,
            memory_mb: self.memory_mb,
            change_version: self.change_version(),
            schema_version: DATA_VERSION,
            extra_config: self.extra_config.clone(),
        }
    }
}

#[derive(Default)]
struct MockInner {
    vms: HashMap<VmId, MockVm>,
    counts: OpCounts,
    /// Every spec seen by `reconfigure`, in order.
    reconfigures: Vec<VmSpec>,
}

/// Mock implementation of [`VmService`].
#[derive(Default)]
pub struct MockVmService {
    inner: Mutex<MockInner>,
    fail_creates: bool,
    fail_power: bool,
}

impl MockVmService {
    /// A mock where every operation behaves.
    pub fn new() -> Self {
        Self::default()
    }

    /// A mock whose creation tasks fail.
    pub fn failing() -> Self {
        Self {
            fail_creates: true,
            ..Self::default()
        }
    }

    /// A mock whose power tasks fail.
    pub fn failing_power() -> Self {
        Self {
            fail_power: true,
            ..Self::default()
        }
    }

    /// Operation counts so far.
    pub async fn counts(&self) -> OpCounts {
        self.inner.lock().await.counts
    }

    /// Every spec `reconfigure` was called with, in order.
    pub async fn reconfigures(&self) -> Vec<VmSpec> {
        self.inner.lock().await.reconfigures.clone()
    }

    /// Current power state of a VM, if it exists.
    pub async fn power_state(&self, vm: VmId) -> Option<PowerState> {
        self.inner.lock().await.vms.get(&vm).map(|v| v.power)
    }

    /// Current config snapshot of a VM, if it exists.
    pub async fn config(&self, vm: VmId) -> Option<VmConfig> {
        self.inner.lock().await.vms.get(&vm).map(MockVm::config)
    }

    async fn create(&self, spec: &VmSpec) -> Result<VmId, VmFault> {
        let mut inner = self.inner.lock().await;
        inner.counts.creates += 1;
        if self.fail_creates {
            return Err(VmFault::TaskFailed {
                task: TaskId::new(),
                message: "mock configured to fail creation".to_string(),
            });
        }

        let id = VmId::new();
        inner.vms.insert(
            id,
            MockVm {
                name: spec.name.clone(),
                cpus: spec.cpus,
                memory_mb: spec.memory_mb,
                extra_config: spec.extra_config.clone().unwrap_or_default(),
                power: PowerState::PoweredOff,
                change_seq: 1,
            },
        );
        info!(vm_id = %id, name = %spec.name, "[MOCK] created VM");
        Ok(id)
    }

    async fn set_power(&self, vm: VmId, target: PowerState) -> Result<(), VmFault> {
        let mut inner = self.inner.lock().await;
        match target {
            PowerState::PoweredOn => inner.counts.power_ons += 1,
            PowerState::PoweredOff => inner.counts.power_offs += 1,
        }
        if self.fail_power {
            return Err(VmFault::TaskFailed {
                task: TaskId::new(),
                message: "mock configured to fail power operations".to_string(),
            });
        }

        let mock_vm = inner.vms.get_mut(&vm).ok_or(VmFault::NotFound(vm))?;
        if mock_vm.power == target {
            return Err(VmFault::InvalidPowerState {
                actual: mock_vm.power,
            });
        }
        mock_vm.power = target;
        debug!(vm_id = %vm, power = %target, "[MOCK] power transition");
        Ok(())
    }
}

#[async_trait]
impl VmService for MockVmService {
    async fn create_child_vm(
        &self,
        spec: &VmSpec,
        pool: &ResourcePoolRef,
    ) -> Result<VmId, VmFault> {
        debug!(pool = %pool, "[MOCK] creating child VM");
        self.create(spec).await
    }

    async fn create_vm(&self, spec: &VmSpec, folder: &FolderRef) -> Result<VmId, VmFault> {
        debug!(folder = %folder, "[MOCK] creating top-level VM");
        self.create(spec).await
    }

    async fn reconfigure(&self, vm: VmId, spec: &VmSpec) -> Result<(), VmFault> {
        let mut inner = self.inner.lock().await;
        inner.counts.reconfigures += 1;
        inner.reconfigures.push(spec.clone());

        let mock_vm = inner.vms.get_mut(&vm).ok_or(VmFault::NotFound(vm))?;
        if spec.change_version.as_deref() != Some(mock_vm.change_version().as_str()) {
            return Err(VmFault::ConcurrentAccess {
                version: spec.change_version.clone().unwrap_or_default(),
            });
        }

        mock_vm.name = spec.name.clone();
        mock_vm.cpus = spec.cpus;
        mock_vm.memory_mb = spec.memory_mb;
        if let Some(extra_config) = &spec.extra_config {
            mock_vm.extra_config.extend(extra_config.clone());
        }
        mock_vm.change_seq += 1;
        debug!(vm_id = %vm, change_version = %mock_vm.change_version(), "[MOCK] reconfigured VM");
        Ok(())
    }

    async fn power_on(&self, vm: VmId) -> Result<(), VmFault> {
        self.set_power(vm, PowerState::PoweredOn).await
    }

    async fn power_off(&self, vm: VmId) -> Result<(), VmFault> {
        self.set_power(vm, PowerState::PoweredOff).await
    }

    async fn fetch_state(&self, vm: VmId) -> Result<(VmRuntime, VmConfig), VmFault> {
        let mut inner = self.inner.lock().await;
        inner.counts.fetches += 1;
        let mock_vm = inner.vms.get(&vm).ok_or(VmFault::NotFound(vm))?;
        Ok((
            VmRuntime {
                power_state: mock_vm.power,
            },
            mock_vm.config(),
        ))
    }
}
