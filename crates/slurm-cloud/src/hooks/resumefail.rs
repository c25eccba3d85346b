use std::fmt::{Display, Formatter};

use crate::cloud::{CloudGateway, DeleteMode, InstanceStatus};
use crate::hooks::HookContext;
use crate::scheduler::{SchedulerQuery, unique_nodes};
use crate::NodeName;

/// Fault reported by the provider when the instance could not be scheduled on any host.
/// Such instances are recreated on the next resume.
pub const CAPACITY_FAULT: &str = "not enough hosts available";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeFailAction {
    /// No instance existed, the node was made resumable again.
    Resumed,
    /// The instance failed for lack of capacity. It was deleted and the node made resumable.
    Recreated,
    /// The node needs attention of an operator and stays DOWN.
    LeftDown,
}

impl Display for ResumeFailAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ResumeFailAction::Resumed => "resumed",
            ResumeFailAction::Recreated => "recreated",
            ResumeFailAction::LeftDown => "left down",
        })
    }
}

/// Repairs nodes whose resume failed.
///
/// Nodes are handled independently. An error while handling a node is logged and the node is
/// left DOWN.
pub async fn resume_fail<S: SchedulerQuery, C: CloudGateway>(
    ctx: &HookContext<S, C>,
    hostlist: &str,
) -> crate::Result<Vec<(NodeName, ResumeFailAction)>> {
    let nodes = unique_nodes(ctx.scheduler.expand_hostlist(hostlist).await?);
    let mut actions = Vec::with_capacity(nodes.len());
    for node in nodes {
        let action = match repair_node(ctx, &node).await {
            Ok(action) => action,
            Err(error) => {
                log::error!("Cannot repair node {node}: {error}");
                ResumeFailAction::LeftDown
            }
        };
        log::info!("Node {node}: {action}");
        actions.push((node, action));
    }
    Ok(actions)
}

async fn repair_node<S: SchedulerQuery, C: CloudGateway>(
    ctx: &HookContext<S, C>,
    node: &str,
) -> crate::Result<ResumeFailAction> {
    let Some(instance) = ctx.cloud.find_server_by_name(node).await? else {
        ctx.scheduler.set_node_resumable(node).await?;
        return Ok(ResumeFailAction::Resumed);
    };
    let capacity_fault = instance
        .fault_message
        .as_deref()
        .is_some_and(|message| message.contains(CAPACITY_FAULT));
    if instance.status == InstanceStatus::Error && capacity_fault {
        log::warn!(
            "Instance {} of node {node} failed for lack of capacity, deleting it",
            instance.id
        );
        ctx.cloud
            .delete_instance(&instance.id, DeleteMode::Force)
            .await?;
        ctx.scheduler.set_node_resumable(node).await?;
        return Ok(ResumeFailAction::Recreated);
    }
    log::error!(
        "Instance {} of node {node} is {} ({}), leaving the node DOWN",
        instance.id,
        instance.status,
        instance.fault_message.as_deref().unwrap_or("no fault message")
    );
    Ok(ResumeFailAction::LeftDown)
}
