use std::path::PathBuf;

use crate::cloud::CloudGateway;
use crate::common::error::HookError;
use crate::common::fsutils::read_first_line;
use crate::scheduler::SchedulerQuery;
use crate::{InstanceId, NodeName};

/// Written by cloud-init on every instance.
pub const DEFAULT_INSTANCE_ID_FILE: &str = "/var/lib/cloud/data/instance-id";
/// Lets an administrator request a rebuild without setting a node reason.
pub const DEFAULT_REBUILD_IMAGE_FILE: &str = "/var/lib/slurm-cloud/rebuild-image";
pub const MAX_REASON_LENGTH: usize = 1000;

const REBUILD_PREFIX: &str = "rebuild";
const IMAGE_PREFIX: &str = "image:";

/// The node on which the reboot program runs.
#[derive(Debug, Clone)]
pub struct LocalNode {
    pub hostname: NodeName,
    pub instance_id_file: PathBuf,
    pub rebuild_image_file: PathBuf,
}

impl LocalNode {
    pub fn detect(instance_id_file: PathBuf, rebuild_image_file: PathBuf) -> crate::Result<Self> {
        let hostname = gethostname::gethostname()
            .into_string()
            .map_err(|name| HookError::GenericError(format!("Invalid hostname {name:?}")))?;
        Ok(Self {
            hostname: short_hostname(&hostname).to_string(),
            instance_id_file,
            rebuild_image_file,
        })
    }
}

/// Slurm node names are the short host names, without the domain part.
fn short_hostname(hostname: &str) -> &str {
    hostname
        .split_once('.')
        .map_or(hostname, |(short, _)| short)
}

pub trait PowerControl {
    /// Restarts the machine. Returns only if the restart could not be started.
    fn reboot(&self) -> crate::Result<()>;
}

/// Replaces the current process with the `reboot` command.
pub struct SystemReboot;

impl PowerControl for SystemReboot {
    fn reboot(&self) -> crate::Result<()> {
        use std::os::unix::process::CommandExt;

        log::info!("Rebooting");
        let error = std::process::Command::new("reboot").exec();
        Err(HookError::GenericError(format!(
            "Cannot execute reboot: {error}"
        )))
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum RebootOutcome {
    Rebooted,
    Rebuilt {
        instance_id: InstanceId,
        image_id: String,
    },
}

/// Extracts the image from reasons like `rebuild image:rocky-9`.
///
/// Returns [`None`] when the reason does not request a rebuild or does not name an image.
pub fn get_image_from_reason(reason: &str) -> Option<&str> {
    if !reason.starts_with(REBUILD_PREFIX) {
        return None;
    }
    reason
        .split_whitespace()
        .skip(1)
        .filter_map(|token| token.strip_prefix(IMAGE_PREFIX))
        .find(|image| !image.is_empty())
}

/// Reason of the reboot. A non-empty rebuild marker file takes precedence over the reason
/// stored in the scheduler.
pub async fn get_reboot_reason<S: SchedulerQuery>(
    node: &LocalNode,
    scheduler: &S,
) -> crate::Result<String> {
    let reason = match read_first_line(&node.rebuild_image_file)? {
        Some(image) => format!("{REBUILD_PREFIX} {IMAGE_PREFIX}{image}"),
        None => {
            scheduler
                .get_node_reason(&node.hostname, MAX_REASON_LENGTH)
                .await?
        }
    };
    Ok(reason.chars().take(MAX_REASON_LENGTH).collect())
}

/// Rebuilds the instance of this node if the reboot reason asks for it, otherwise reboots.
///
/// `connect` is only called when a rebuild was requested. Machines that are not cloud
/// instances are always rebooted.
pub async fn rebuild_or_reboot<S, C, F, P>(
    node: &LocalNode,
    scheduler: &S,
    connect: F,
    power: &P,
) -> crate::Result<RebootOutcome>
where
    S: SchedulerQuery,
    C: CloudGateway,
    F: FnOnce() -> crate::Result<C>,
    P: PowerControl,
{
    let Some(instance_id) = read_first_line(&node.instance_id_file)? else {
        log::info!(
            "{} is not a cloud instance ({} not found)",
            node.hostname,
            node.instance_id_file.display()
        );
        power.reboot()?;
        return Ok(RebootOutcome::Rebooted);
    };

    let reason = get_reboot_reason(node, scheduler).await?;
    if !reason.starts_with(REBUILD_PREFIX) {
        log::info!("Reason {reason:?} does not request a rebuild");
        power.reboot()?;
        return Ok(RebootOutcome::Rebooted);
    }

    let cloud = connect()?;
    let rebuild_error = |reason: String| HookError::RebuildError {
        instance_id: instance_id.clone(),
        reason,
    };
    let query = match get_image_from_reason(&reason) {
        Some(image) => image.to_string(),
        None => {
            let instance = cloud
                .get_instance(&instance_id)
                .await?
                .ok_or_else(|| rebuild_error("instance does not exist".to_string()))?;
            log::debug!("No image in reason, rebuilding with the current image");
            instance
                .image_id
                .ok_or_else(|| rebuild_error("instance was not booted from an image".to_string()))?
        }
    };
    let image = cloud
        .find_image(&query)
        .await?
        .ok_or_else(|| rebuild_error(format!("image {query} not found")))?;

    log::info!("Rebuilding instance {instance_id} with image {image}");
    cloud
        .rebuild_instance(&instance_id, &image.id, &node.hostname)
        .await?;
    Ok(RebootOutcome::Rebuilt {
        instance_id,
        image_id: image.id,
    })
}
