//! A connection to the remote management API plus placement policy.
//!
//! Where a new VM lands is environment-dependent: hosts running under a
//! pooled parent resource create children of that pool, everything else
//! creates top-level VMs in a placement folder. That choice is configuration
//! carried by the session, not something the commit engine decides.

use std::sync::Arc;

use gantry_id::VmId;

use crate::vm::{FolderRef, ResourcePoolRef, VmFault, VmService, VmSpec};

/// Placement target for newly created VMs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Create children of a pooled parent resource.
    Pool(ResourcePoolRef),
    /// Create top-level VMs in a folder.
    Folder(FolderRef),
}

/// Capability to talk to the remote management API.
pub struct Session {
    service: Arc<dyn VmService>,
    placement: Placement,
}

impl Session {
    pub fn new(service: Arc<dyn VmService>, placement: Placement) -> Self {
        Self { service, placement }
    }

    #[must_use]
    pub fn service(&self) -> Arc<dyn VmService> {
        Arc::clone(&self.service)
    }

    #[must_use]
    pub fn placement(&self) -> &Placement {
        &self.placement
    }

    /// Create the backing VM at the environment-appropriate placement target.
    pub(crate) async fn create_vm(&self, spec: &VmSpec) -> Result<VmId, VmFault> {
        match &self.placement {
            Placement::Pool(pool) => self.service.create_child_vm(spec, pool).await,
            Placement::Folder(folder) => self.service.create_vm(spec, folder).await,
        }
    }
}
