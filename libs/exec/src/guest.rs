//! In-guest collaborator for nudging a running container process.
//!
//! After a successful reconfigure, a running container can be asked to reload
//! its configuration in place instead of waiting for a restart. The request
//! is best-effort: the configuration is already durably applied by the time
//! it is made, only the live process's uptake is uncertain, so failures are
//! logged by the caller and never propagated.

use anyhow::Result;
use async_trait::async_trait;
use gantry_id::VmId;
use tokio::sync::Mutex;

/// Channel into the agent running inside the guest.
#[async_trait]
pub trait GuestOps: Send + Sync {
    /// Ask the guest to run the named program with the given arguments.
    async fn request_reload(&self, vm: VmId, channel: &str, args: &str) -> Result<()>;
}

/// Mock guest agent recording reload requests.
#[derive(Default)]
pub struct MockGuest {
    reloads: Mutex<Vec<(VmId, String)>>,
    fail: bool,
}

impl MockGuest {
    pub fn new() -> Self {
        Self::default()
    }

    /// A guest agent that rejects every request.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Every reload request seen, as `(vm, channel)` pairs.
    pub async fn reloads(&self) -> Vec<(VmId, String)> {
        self.reloads.lock().await.clone()
    }
}

#[async_trait]
impl GuestOps for MockGuest {
    async fn request_reload(&self, vm: VmId, channel: &str, _args: &str) -> Result<()> {
        if self.fail {
            anyhow::bail!("guest agent unavailable");
        }
        self.reloads.lock().await.push((vm, channel.to_string()));
        Ok(())
    }
}
