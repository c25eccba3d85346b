//! Slurm power-saving hooks that keep the scheduler's CLOUD nodes in sync with OpenStack
//! instances.
//!
//! Every hook is a short-lived program started by `slurmctld` (or, for rebooting, by `slurmd`
//! on the node itself). The reconciliation logic lives in [`hooks`] and talks to the outside
//! world only through the [`scheduler::SchedulerQuery`] and [`cloud::CloudGateway`] traits.

pub mod cloud;
pub mod commands;
pub mod common;
pub mod hooks;
pub mod scheduler;
pub mod store;

#[cfg(test)]
pub(crate) mod tests;

pub type Error = crate::common::error::HookError;
pub type Result<T> = std::result::Result<T, Error>;

pub type Map<K, V> = hashbrown::HashMap<K, V>;
pub type Set<T> = hashbrown::HashSet<T>;

/// Scheduler identifier of a worker node.
pub type NodeName = String;
/// Opaque identifier of a cloud instance.
pub type InstanceId = String;

pub const SLURM_CLOUD_VERSION: &str = {
    match option_env!("SLURM_CLOUD_BUILD_VERSION") {
        Some(version) => version,
        None => env!("CARGO_PKG_VERSION"),
    }
};
