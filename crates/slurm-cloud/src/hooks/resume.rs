use std::fmt::{Display, Formatter};

use thiserror::Error;

use crate::cloud::{CloudError, CloudGateway, CloudObject, InstanceSpec, NetworkAttachment};
use crate::common::error::HookError;
use crate::hooks::HookContext;
use crate::hooks::params::{LaunchParams, ParamsError};
use crate::scheduler::{SchedulerQuery, unique_nodes};
use crate::store::InstanceStore;
use crate::{InstanceId, NodeName};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeMode {
    Create,
    /// Resolve and log everything, but do not create any instance.
    DryRun,
}

/// Reason why a single node could not be resumed. Other nodes are not affected.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("no features are defined for the node")]
    NoFeatures,
    #[error("node name cannot be used as a record file name")]
    InvalidName,
    #[error("invalid launch parameters: {0}")]
    InvalidParams(#[from] ParamsError),
    #[error("cannot find {}", format_unresolved(.0))]
    Unresolved(Vec<(&'static str, String)>),
    #[error(transparent)]
    Cloud(#[from] CloudError),
    #[error("instance {instance_id} was created, but storing its id failed: {source}")]
    Store {
        instance_id: InstanceId,
        source: Box<HookError>,
    },
}

fn format_unresolved(unresolved: &[(&'static str, String)]) -> String {
    unresolved
        .iter()
        .map(|(kind, value)| format!("{kind}={value}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug)]
pub struct NodeFailure {
    pub node: NodeName,
    pub error: NodeError,
}

impl Display for NodeFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.node, self.error)
    }
}

#[derive(Debug, Default)]
pub struct ResumeOutcome {
    /// Ids of the created instances, in the order of the expanded hostlist.
    pub created: Vec<InstanceId>,
    pub failures: Vec<NodeFailure>,
}

impl ResumeOutcome {
    /// Turns per-node failures into a single error.
    pub fn into_result(self) -> crate::Result<Vec<InstanceId>> {
        if self.failures.is_empty() {
            return Ok(self.created);
        }
        Err(HookError::NodeFailures {
            count: self.failures.len(),
            nodes: self
                .failures
                .iter()
                .map(|failure| failure.to_string())
                .collect::<Vec<_>>()
                .join("; "),
        })
    }
}

/// Creates one instance for each node of `hostlist`.
///
/// Scheduler failures abort the whole invocation, problems of an individual node are
/// collected in [`ResumeOutcome::failures`] and the remaining nodes are still processed.
pub async fn resume<S: SchedulerQuery, C: CloudGateway>(
    ctx: &HookContext<S, C>,
    hostlist: &str,
    mode: ResumeMode,
) -> crate::Result<ResumeOutcome> {
    let nodes = unique_nodes(ctx.scheduler.expand_hostlist(hostlist).await?);
    let features = ctx.scheduler.get_features(hostlist).await?;
    let store = ctx.instance_store().await?;
    log::info!("Resuming {} node(s): {}", nodes.len(), nodes.join(","));

    let mut outcome = ResumeOutcome::default();
    for node in nodes {
        let result = match features.get(&node) {
            Some(features) => resume_node(&ctx.cloud, &store, &node, features, mode).await,
            None => Err(NodeError::NoFeatures),
        };
        match result {
            Ok(Some(id)) => outcome.created.push(id),
            Ok(None) => {}
            Err(error) => {
                log::error!("Cannot resume node {node}: {error}");
                outcome.failures.push(NodeFailure { node, error });
            }
        }
    }
    Ok(outcome)
}

async fn resume_node<C: CloudGateway>(
    cloud: &C,
    store: &InstanceStore,
    node: &str,
    features: &[String],
    mode: ResumeMode,
) -> Result<Option<InstanceId>, NodeError> {
    store.path(node).map_err(|_| NodeError::InvalidName)?;
    let params = LaunchParams::parse(features)?;
    log::debug!("Node {node} requests {params}");

    let spec = resolve_instance_spec(cloud, node, &params).await?;
    match mode {
        ResumeMode::DryRun => {
            log::info!(
                "Dry run: would create {node} with image {}, flavor {}, keypair {}, {}",
                spec.image_id,
                spec.flavor_id,
                spec.keypair,
                match &spec.attachment {
                    NetworkAttachment::Network(id) => format!("network {id}"),
                    NetworkAttachment::Port(id) => format!("port {id}"),
                }
            );
            Ok(None)
        }
        ResumeMode::Create => {
            let id = cloud.create_instance(&spec).await?;
            log::info!("Created instance {id} for node {node}");
            store.write(node, &id).map_err(|error| NodeError::Store {
                instance_id: id.clone(),
                source: Box::new(error),
            })?;
            Ok(Some(id))
        }
    }
}

/// Resolves all referenced cloud objects. Every lookup is made, so that the error names
/// each object that does not exist.
async fn resolve_instance_spec<C: CloudGateway>(
    cloud: &C,
    node: &str,
    params: &LaunchParams,
) -> Result<InstanceSpec, NodeError> {
    let mut unresolved = vec![];
    let mut check = |kind: &'static str, query: &str, object: Option<CloudObject>| {
        if object.is_none() {
            unresolved.push((kind, query.to_string()));
        }
        object
    };
    let image = check("image", &params.image, cloud.find_image(&params.image).await?);
    let flavor = check("flavor", &params.flavor, cloud.find_flavor(&params.flavor).await?);
    let network = check(
        "network",
        &params.network,
        cloud.find_network(&params.network).await?,
    );
    let keypair = check(
        "keypair",
        &params.keypair,
        cloud.find_keypair(&params.keypair).await?,
    );

    let (Some(image), Some(flavor), Some(network), Some(keypair)) =
        (image, flavor, network, keypair)
    else {
        return Err(NodeError::Unresolved(unresolved));
    };

    let attachment = match cloud.find_port(node, &network.id).await? {
        Some(port) => {
            log::debug!("Using port {port} for node {node}");
            NetworkAttachment::Port(port.id)
        }
        None => NetworkAttachment::Network(network.id),
    };
    Ok(InstanceSpec {
        name: node.to_string(),
        image_id: image.id,
        flavor_id: flavor.id,
        keypair: keypair.name.unwrap_or(keypair.id),
        attachment,
    })
}
