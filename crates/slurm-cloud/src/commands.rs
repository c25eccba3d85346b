//! Entry points of the hook binaries.
use anyhow::Context;

use crate::cloud::OpenStackClient;
use crate::common::cli::{
    CommonOpts, RebootOpts, RedeployOpts, ResumeFailOpts, ResumeOpts, SuspendOpts,
};
use crate::common::config::CloudConfig;
use crate::hooks::HookContext;
use crate::hooks::reboot::{LocalNode, RebootOutcome, SystemReboot, rebuild_or_reboot};
use crate::hooks::redeploy::{Redeploy, redeploy};
use crate::hooks::resume::resume;
use crate::hooks::resumefail::{ResumeFailAction, resume_fail};
use crate::hooks::suspend::suspend;
use crate::scheduler::SlurmControl;

fn slurm_control(opts: &CommonOpts) -> SlurmControl {
    SlurmControl::new(opts.scontrol.clone(), opts.sinfo.clone())
}

fn connect_cloud(opts: &CommonOpts) -> crate::Result<OpenStackClient> {
    let config = CloudConfig::load(&opts.cloud_config)?;
    OpenStackClient::new(config)
}

fn create_context(opts: &CommonOpts) -> anyhow::Result<HookContext<SlurmControl, OpenStackClient>> {
    let cloud = connect_cloud(opts).with_context(|| {
        format!(
            "Cannot set up cloud access from {}",
            opts.cloud_config.display()
        )
    })?;
    Ok(HookContext::new(slurm_control(opts), cloud))
}

pub async fn command_resume(opts: ResumeOpts) -> anyhow::Result<()> {
    let ctx = create_context(&opts.common)?;
    let outcome = resume(&ctx, &opts.hostlist, opts.mode()).await?;
    log::info!(
        "Created {} instance(s): {}",
        outcome.created.len(),
        outcome.created.join(",")
    );
    outcome.into_result()?;
    Ok(())
}

pub async fn command_suspend(opts: SuspendOpts) -> anyhow::Result<()> {
    let ctx = create_context(&opts.common)?;
    let deleted = suspend(&ctx, &opts.hostlist).await?;
    log::info!(
        "Requested deletion of {} instance(s): {}",
        deleted.len(),
        deleted.join(",")
    );
    Ok(())
}

pub async fn command_resumefail(opts: ResumeFailOpts) -> anyhow::Result<()> {
    let ctx = create_context(&opts.common)?;
    let actions = resume_fail(&ctx, &opts.hostlist).await?;
    let down: Vec<&str> = actions
        .iter()
        .filter(|(_, action)| *action == ResumeFailAction::LeftDown)
        .map(|(node, _)| node.as_str())
        .collect();
    if !down.is_empty() {
        anyhow::bail!("{} node(s) left DOWN: {}", down.len(), down.join(","));
    }
    Ok(())
}

pub async fn command_redeploy(opts: RedeployOpts) -> anyhow::Result<()> {
    let ctx = create_context(&opts.common)?;
    match redeploy(&ctx, &opts.hostlist).await? {
        Redeploy::NothingToDo => {}
        Redeploy::Converged(ids) => log::info!("Redeployed instances {}", ids.join(",")),
    }
    Ok(())
}

pub async fn command_reboot(opts: RebootOpts) -> anyhow::Result<()> {
    let node = LocalNode::detect(opts.instance_id_file, opts.rebuild_image_file)?;
    let outcome = rebuild_or_reboot(
        &node,
        &slurm_control(&opts.common),
        || connect_cloud(&opts.common),
        &SystemReboot,
    )
    .await
    .with_context(|| format!("Cannot rebuild or reboot {}", node.hostname))?;
    if let RebootOutcome::Rebuilt {
        instance_id,
        image_id,
    } = outcome
    {
        log::info!("Rebuild of {instance_id} with image {image_id} requested");
    }
    Ok(())
}
