//! The ordered state-transition pass that applies a handle.
//!
//! The engine performs at most one pass through create → stop → reconfigure
//! → cache refresh → start, validating each step against the last-known
//! remote state carried by the handle. The first error aborts the pass and
//! is returned as-is: earlier successful steps are not compensated, because
//! remote power and config operations are not reversible without side
//! effects of their own. Callers recover by re-issuing a corrective commit.

use std::sync::Arc;

use gantry_events::{ContainerEvent, ContainerEventKind};
use tracing::{debug, error, info, warn};

use crate::cache::ContainerCache;
use crate::container::Container;
use crate::error::CommitError;
use crate::events::EventSink;
use crate::guest::GuestOps;
use crate::handle::{Handle, TargetState};
use crate::session::Session;
use crate::vm::{PowerState, Vm, VmFault};

/// Applies handles to the remote resources backing their containers.
pub struct CommitEngine {
    cache: Arc<ContainerCache>,
    events: Arc<dyn EventSink>,
    guest: Arc<dyn GuestOps>,
    reload_channel: String,
}

impl CommitEngine {
    pub fn new(
        cache: Arc<ContainerCache>,
        events: Arc<dyn EventSink>,
        guest: Arc<dyn GuestOps>,
    ) -> Self {
        Self {
            cache,
            events,
            guest,
            reload_channel: "reload".to_string(),
        }
    }

    /// Override the in-guest program asked to pick up reloaded config.
    #[must_use]
    pub fn with_reload_channel(mut self, channel: impl Into<String>) -> Self {
        self.reload_channel = channel.into();
        self
    }

    #[must_use]
    pub fn cache(&self) -> Arc<ContainerCache> {
        Arc::clone(&self.cache)
    }

    /// Apply the handle's pending changes to its backing VM and the cache.
    ///
    /// Returns `Ok(())` only if every triggered step completed; otherwise the
    /// first error, with the cache and remote resource left in whatever
    /// partial state the completed steps produced.
    pub async fn commit(
        &self,
        session: Option<&Session>,
        handle: &mut Handle,
    ) -> Result<(), CommitError> {
        let creation = handle.vm.is_none();
        debug!(container_id = %handle.id, creation, "committing handle");

        let container = if creation {
            self.create(session, handle).await?
        } else {
            self.cache
                .get(&handle.id)
                .await
                .ok_or(CommitError::UnknownContainer(handle.id))?
        };

        let applied = self.apply_changes(handle, &container).await;

        // Best-effort cache update from the handle's latest view, whatever
        // became of the stop/reconfigure steps. Will not reflect the
        // power-on below.
        if !creation {
            container.refresh_from_handle(handle).await;
        }
        applied?;

        self.start_if_requested(handle, &container, creation).await
    }

    /// Step 1: create the backing VM and register the container.
    async fn create(
        &self,
        session: Option<&Session>,
        handle: &mut Handle,
    ) -> Result<Arc<Container>, CommitError> {
        let id = handle.id;
        let spec = handle.spec.clone().ok_or(CommitError::MissingSpec)?;
        let session = session.ok_or(CommitError::MissingSession)?;

        if self.cache.get(&id).await.is_some() {
            return Err(CommitError::DuplicateContainer(id));
        }

        let vm_id = match session.create_vm(&spec).await {
            Ok(vm_id) => vm_id,
            Err(fault) => {
                error!(container_id = %id, name = %spec.name, fault = %fault, "creation task failed");
                return Err(CommitError::Task(fault));
            }
        };

        let vm = Vm::new(session.service(), vm_id);
        handle.vm = Some(vm.clone());

        let container = Arc::new(Container::new(id, vm, handle.runtime, handle.config.clone()));
        self.cache.put(Arc::clone(&container)).await;

        // Inform of creation irrespective of remaining operations.
        self.events
            .publish(ContainerEvent::now(id, ContainerEventKind::Created));

        // The spec has been acted on; a follow-on reconfigure must not
        // re-apply creation data.
        handle.spec = None;

        info!(container_id = %id, vm_id = %vm_id, "created backing VM");
        Ok(container)
    }

    /// Steps 2 and 3: power off, then reconfigure.
    async fn apply_changes(
        &self,
        handle: &mut Handle,
        container: &Container,
    ) -> Result<(), CommitError> {
        // Stop before any reconfigure: guest-visible config can only be
        // rewritten safely while the VM is down.
        if handle.target_state == TargetState::Stopped {
            self.stop(handle, container).await?;
        }

        if handle.spec.is_some() {
            self.reconfigure(handle, container).await?;
        }
        Ok(())
    }

    /// Step 2: power off the backing VM.
    async fn stop(&self, handle: &mut Handle, container: &Container) -> Result<(), CommitError> {
        let id = handle.id;

        if handle.runtime.is_none() {
            warn!(container_id = %id, "commit called with incomplete runtime state");
        }

        if handle.power_state() == Some(PowerState::PoweredOff) {
            info!(container_id = %id, "dropping duplicate power off operation");
            return Ok(());
        }

        container.stop().await.map_err(CommitError::Task)?;
        self.events
            .publish(ContainerEvent::now(id, ContainerEventKind::Stopped));

        // Targeted refresh, not a full one: the stop may have advanced the
        // change version the reconfigure below must be conditioned on, and a
        // full refresh would clobber config this handle has not written yet.
        let (runtime, config) = container
            .vm()
            .fetch_state()
            .await
            .map_err(CommitError::Task)?;
        handle.runtime = Some(runtime);
        handle.config = Some(config);
        Ok(())
    }

    /// Step 3: apply the pending spec, guarded by the change version.
    async fn reconfigure(
        &self,
        handle: &mut Handle,
        container: &Container,
    ) -> Result<(), CommitError> {
        let id = handle.id;

        let (Some(_), Some(config)) = (handle.runtime.as_ref(), handle.config.as_ref()) else {
            error!(container_id = %id, "refusing to reconfigure with incomplete runtime state");
            return Ok(());
        };
        let Some(mut spec) = handle.spec.clone() else {
            return Ok(());
        };

        // Poor man's compare-and-set: read the tag from the cached config,
        // write it on the outgoing spec, let the remote side detect staleness.
        // No lock is held across the round trip.
        spec.change_version = Some(config.change_version.clone());
        debug!(container_id = %id, change_version = %config.change_version, "reconfiguring");

        if handle.migrated {
            // An upgraded in-memory config must never be written back where
            // an older-schema consumer still reads it.
            debug!(container_id = %id, "withholding guest-visible config for migrated container");
            spec.extra_config = None;
        }

        let reload = handle.reload_requested
            && handle.power_state() == Some(PowerState::PoweredOn);

        if let Err(fault) = container.vm().reconfigure(&spec).await {
            error!(container_id = %id, fault = %fault, "reconfigure failed");
            return Err(match fault {
                VmFault::ConcurrentAccess { .. } => CommitError::ConcurrentAccess { id, fault },
                other => CommitError::Task(other),
            });
        }
        handle.spec = None;

        if reload {
            // The change is durably applied either way; only the running
            // process's uptake of it is uncertain.
            if let Err(error) = self
                .guest
                .request_reload(container.vm().id(), &self.reload_channel, "")
                .await
            {
                warn!(container_id = %id, error = %error, "config reload request failed");
            }
        }
        Ok(())
    }

    /// Step 5: power on the backing VM.
    async fn start_if_requested(
        &self,
        handle: &Handle,
        container: &Container,
        creation: bool,
    ) -> Result<(), CommitError> {
        if handle.target_state != TargetState::Running {
            return Ok(());
        }
        let id = handle.id;

        if handle.power_state() == Some(PowerState::PoweredOn) {
            info!(container_id = %id, "dropping duplicate power on operation");
            return Ok(());
        }

        if handle.runtime.is_none() && !creation {
            warn!(container_id = %id, "commit called with incomplete runtime state");
        }

        container.start().await.map_err(CommitError::Task)?;
        self.events
            .publish(ContainerEvent::now(id, ContainerEventKind::Started));
        Ok(())
    }
}
