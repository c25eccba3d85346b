//! Reconciliation logic of the individual hooks.
//!
//! Every hook receives a [`HookContext`] with the scheduler and cloud handles instead of
//! reaching for global state, so tests can drive them with in-memory fakes.
pub mod params;
pub mod reboot;
pub mod redeploy;
pub mod resume;
pub mod resumefail;
pub mod suspend;

use crate::cloud::CloudGateway;
use crate::scheduler::SchedulerQuery;
use crate::store::InstanceStore;

pub struct HookContext<S, C> {
    pub scheduler: S,
    pub cloud: C,
}

impl<S: SchedulerQuery, C: CloudGateway> HookContext<S, C> {
    pub fn new(scheduler: S, cloud: C) -> Self {
        Self { scheduler, cloud }
    }

    /// Store located in the scheduler's `StateSaveLocation`.
    pub async fn instance_store(&self) -> crate::Result<InstanceStore> {
        let config = self.scheduler.get_config().await?;
        Ok(InstanceStore::new(config.state_save_location()?))
    }
}
