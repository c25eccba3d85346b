use std::time::Duration;

use tokio::time::{Instant, sleep};

use crate::cloud::{CloudGateway, InstanceStatus};
use crate::common::error::HookError;
use crate::hooks::HookContext;
use crate::hooks::resume::{ResumeMode, resume};
use crate::hooks::suspend::suspend;
use crate::scheduler::{CLOUD_STATE, SchedulerConfig, SchedulerQuery};
use crate::InstanceId;

/// Timing of a redeploy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvergencePolicy {
    /// Pause between deleting the old instances and creating the new ones.
    pub settle: Duration,
    pub poll_interval: Duration,
    /// How long to wait for all new instances to become ACTIVE.
    pub deadline: Duration,
}

impl ConvergencePolicy {
    /// Waits `SuspendTimeout` after suspending and up to `ResumeTimeout` for the instances,
    /// checking them ten times during that period.
    pub fn from_config(config: &SchedulerConfig) -> crate::Result<Self> {
        let resume_timeout = config.resume_timeout()?;
        Ok(Self {
            settle: config.suspend_timeout()?,
            poll_interval: resume_timeout / 10,
            deadline: resume_timeout,
        })
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Redeploy {
    /// None of the nodes is a CLOUD node.
    NothingToDo,
    /// All new instances are ACTIVE.
    Converged(Vec<InstanceId>),
}

/// Replaces the instances of the CLOUD nodes in `hostlist` with new ones and waits until
/// they are ACTIVE. Timing is derived from the scheduler configuration.
pub async fn redeploy<S: SchedulerQuery, C: CloudGateway>(
    ctx: &HookContext<S, C>,
    hostlist: &str,
) -> crate::Result<Redeploy> {
    let Some(nodes) = cloud_nodes(ctx, hostlist).await? else {
        return Ok(Redeploy::NothingToDo);
    };
    let policy = ConvergencePolicy::from_config(&ctx.scheduler.get_config().await?)?;
    redeploy_nodes(ctx, &nodes, &policy).await
}

pub async fn redeploy_with_policy<S: SchedulerQuery, C: CloudGateway>(
    ctx: &HookContext<S, C>,
    hostlist: &str,
    policy: &ConvergencePolicy,
) -> crate::Result<Redeploy> {
    let Some(nodes) = cloud_nodes(ctx, hostlist).await? else {
        return Ok(Redeploy::NothingToDo);
    };
    redeploy_nodes(ctx, &nodes, policy).await
}

async fn cloud_nodes<S: SchedulerQuery, C: CloudGateway>(
    ctx: &HookContext<S, C>,
    hostlist: &str,
) -> crate::Result<Option<String>> {
    let nodes = ctx.scheduler.filter_by_state(hostlist, CLOUD_STATE).await?;
    match &nodes {
        Some(nodes) => log::info!("Redeploying CLOUD nodes {nodes}"),
        None => log::info!("No CLOUD nodes in {hostlist}, nothing to redeploy"),
    }
    Ok(nodes)
}

async fn redeploy_nodes<S: SchedulerQuery, C: CloudGateway>(
    ctx: &HookContext<S, C>,
    nodes: &str,
    policy: &ConvergencePolicy,
) -> crate::Result<Redeploy> {
    let deleted = suspend(ctx, nodes).await?;
    log::debug!(
        "Deleted {} instance(s), waiting {:?} before creating new ones",
        deleted.len(),
        policy.settle
    );
    sleep(policy.settle).await;

    let started = Instant::now();
    let ids = resume(ctx, nodes, ResumeMode::Create)
        .await?
        .into_result()?;
    log::info!("Waiting for instances {} to become ACTIVE", ids.join(","));

    loop {
        let mut snapshot = Vec::with_capacity(ids.len());
        for id in &ids {
            let status = ctx.cloud.get_instance(id).await?.map(|instance| instance.status);
            snapshot.push((id.clone(), status));
        }
        if snapshot
            .iter()
            .all(|(_, status)| status.as_ref() == Some(&InstanceStatus::Active))
        {
            log::info!("All {} instance(s) are ACTIVE", ids.len());
            return Ok(Redeploy::Converged(ids));
        }
        if started.elapsed() > policy.deadline {
            return Err(HookError::NotConverged {
                timeout_secs: policy.deadline.as_secs(),
                snapshot: snapshot
                    .into_iter()
                    .map(|(id, status)| (id, status.map(|status| status.to_string())))
                    .collect(),
            });
        }
        sleep(policy.poll_interval).await;
    }
}
