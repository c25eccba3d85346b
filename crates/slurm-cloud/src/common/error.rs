use std::path::PathBuf;

use thiserror::Error;

use crate::cloud::CloudError;
use crate::{InstanceId, NodeName};

#[derive(Debug, Error)]
pub enum HookError {
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Scheduler error: {0}")]
    SchedulerError(String),
    #[error("Cloud error: {0}")]
    CloudError(#[from] CloudError),
    #[error("No instance record found at {path:?} for node {node}")]
    MissingInstanceRecord { node: NodeName, path: PathBuf },
    #[error("Invalid node name {0:?}")]
    InvalidNodeName(String),
    #[error("{count} node(s) failed: {nodes}")]
    NodeFailures { count: usize, nodes: String },
    #[error("Not all instances ACTIVE after {timeout_secs} sec: {}", format_snapshot(.snapshot))]
    NotConverged {
        timeout_secs: u64,
        snapshot: Vec<(InstanceId, Option<String>)>,
    },
    #[error("Cannot rebuild instance {instance_id}: {reason}")]
    RebuildError {
        instance_id: InstanceId,
        reason: String,
    },
    #[error("Error: {0}")]
    GenericError(String),
}

fn format_snapshot(snapshot: &[(InstanceId, Option<String>)]) -> String {
    snapshot
        .iter()
        .map(|(id, status)| format!("{id}={}", status.as_deref().unwrap_or("missing")))
        .collect::<Vec<_>>()
        .join(", ")
}
