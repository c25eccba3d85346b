//! Access to the batch scheduler (Slurm) that invokes the hooks.
mod command;
pub mod slurm;

use std::path::PathBuf;
use std::time::Duration;

use crate::common::error::HookError;
use crate::{Map, NodeName, Set};

pub use slurm::SlurmControl;

/// Node state of nodes that are powered by the cloud.
pub const CLOUD_STATE: &str = "CLOUD";

/// Raw `key=value` features of each node, as declared in the scheduler configuration.
pub type NodeFeatures = Map<NodeName, Vec<String>>;

/// Queries and commands that the hooks need from the scheduler.
#[allow(async_fn_in_trait)]
pub trait SchedulerQuery {
    /// Expand a hostlist expression (e.g. `gpu-[1-3]`) into individual node names.
    async fn expand_hostlist(&self, hostlist: &str) -> crate::Result<Vec<NodeName>>;

    async fn get_config(&self) -> crate::Result<SchedulerConfig>;

    async fn get_features(&self, hostlist: &str) -> crate::Result<NodeFeatures>;

    /// Returns a hostlist expression of the nodes from `hostlist` that are in `state`, or
    /// [`None`] if there is no such node.
    async fn filter_by_state(&self, hostlist: &str, state: &str) -> crate::Result<Option<String>>;

    /// Clears the DOWN flag of a node so that it can be resumed again.
    async fn set_node_resumable(&self, node: &str) -> crate::Result<()>;

    /// Reason set by an administrator for the node, at most `max_length` characters long.
    async fn get_node_reason(&self, node: &str, max_length: usize) -> crate::Result<String>;
}

/// Drops repeated nodes and keeps the first occurrence of each.
///
/// `sinfo` lists a node once for every partition it belongs to, so hostlists built from its
/// output can name a node several times.
pub fn unique_nodes(nodes: Vec<NodeName>) -> Vec<NodeName> {
    let mut seen = Set::new();
    nodes
        .into_iter()
        .filter(|node| seen.insert(node.clone()))
        .collect()
}

/// Global scheduler configuration (`scontrol show config`).
#[derive(Debug, Clone, Default)]
pub struct SchedulerConfig {
    items: Map<String, String>,
}

impl SchedulerConfig {
    pub fn new(items: Map<String, String>) -> Self {
        Self { items }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.items.get(key).map(|v| v.as_str())
    }

    fn require(&self, key: &str) -> crate::Result<&str> {
        self.get(key).ok_or_else(|| {
            HookError::ConfigError(format!("{key} is missing from the scheduler configuration"))
        })
    }

    /// Directory where the node -> instance mapping is stored.
    pub fn state_save_location(&self) -> crate::Result<PathBuf> {
        Ok(PathBuf::from(self.require("StateSaveLocation")?))
    }

    /// Time from issuing resume until the node is available for use.
    pub fn resume_timeout(&self) -> crate::Result<Duration> {
        parse_timeout("ResumeTimeout", self.require("ResumeTimeout")?)
    }

    /// Time from issuing suspend until the node can be resumed again.
    pub fn suspend_timeout(&self) -> crate::Result<Duration> {
        parse_timeout("SuspendTimeout", self.require("SuspendTimeout")?)
    }
}

/// Parses timeouts in the `<integer> sec` format used by `scontrol show config`.
/// Any other unit is rejected.
pub fn parse_timeout(key: &str, value: &str) -> crate::Result<Duration> {
    let mut parts = value.split_whitespace();
    let (Some(amount), Some(unit), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(HookError::ConfigError(format!(
            "{key} has unexpected format {value:?}, expected `<integer> sec`"
        )));
    };
    if unit != "sec" {
        return Err(HookError::ConfigError(format!(
            "{key} not defined in seconds: {value:?}"
        )));
    }
    let seconds = amount.parse::<u64>().map_err(|_| {
        HookError::ConfigError(format!("{key} is not an integer number of seconds: {value:?}"))
    })?;
    Ok(Duration::from_secs(seconds))
}
