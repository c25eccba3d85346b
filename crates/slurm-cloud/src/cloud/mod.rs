//! Access to the cloud provider that hosts the CLOUD nodes.
mod auth;
pub mod openstack;

use std::fmt::{Display, Formatter};

use thiserror::Error;

use crate::InstanceId;

pub use openstack::OpenStackClient;

#[derive(Debug, Error)]
pub enum CloudError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{method} {url} failed with status {status}: {body}")]
    Api {
        status: u16,
        method: String,
        url: String,
        body: String,
    },
    #[error("Found {count} {kind} resources matching {query:?}")]
    Ambiguous {
        kind: &'static str,
        query: String,
        count: usize,
    },
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("No {service} endpoint with interface {interface} found in the service catalog")]
    Endpoint { service: String, interface: String },
    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
}

pub type CloudResult<T> = Result<T, CloudError>;

/// A resolved provider object (image, flavor, network, keypair or port).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudObject {
    pub id: String,
    pub name: Option<String>,
}

impl CloudObject {
    pub fn new<I: Into<String>>(id: I, name: Option<String>) -> Self {
        Self {
            id: id.into(),
            name,
        }
    }
}

impl Display for CloudObject {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name} ({})", self.id),
            None => f.write_str(&self.id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceStatus {
    Active,
    Build,
    Error,
    Shutoff,
    Deleted,
    Other(String),
}

impl From<&str> for InstanceStatus {
    fn from(value: &str) -> Self {
        match value {
            "ACTIVE" => InstanceStatus::Active,
            "BUILD" => InstanceStatus::Build,
            "ERROR" => InstanceStatus::Error,
            "SHUTOFF" => InstanceStatus::Shutoff,
            "DELETED" => InstanceStatus::Deleted,
            other => InstanceStatus::Other(other.to_string()),
        }
    }
}

impl Display for InstanceStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            InstanceStatus::Active => f.write_str("ACTIVE"),
            InstanceStatus::Build => f.write_str("BUILD"),
            InstanceStatus::Error => f.write_str("ERROR"),
            InstanceStatus::Shutoff => f.write_str("SHUTOFF"),
            InstanceStatus::Deleted => f.write_str("DELETED"),
            InstanceStatus::Other(status) => f.write_str(status),
        }
    }
}

/// Provider-side view of an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudInstance {
    pub id: InstanceId,
    pub name: String,
    /// [`None`] for instances booted from a volume.
    pub image_id: Option<String>,
    pub status: InstanceStatus,
    /// Diagnostic attached by the provider to a failed instance.
    pub fault_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkAttachment {
    Network(String),
    /// Pre-created port, e.g. with a fixed address registered in DNS.
    Port(String),
}

/// Everything needed to create an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceSpec {
    pub name: String,
    pub image_id: String,
    pub flavor_id: String,
    pub keypair: String,
    pub attachment: NetworkAttachment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteMode {
    Normal,
    /// Skip any deferred (soft) delete configured in the provider.
    Force,
}

/// Operations the hooks need from the cloud provider.
///
/// Every `find_*` method accepts either a name or an id and returns [`None`] when nothing
/// matches. More than one match is reported as [`CloudError::Ambiguous`].
#[allow(async_fn_in_trait)]
pub trait CloudGateway {
    async fn find_image(&self, name_or_id: &str) -> CloudResult<Option<CloudObject>>;

    async fn find_flavor(&self, name_or_id: &str) -> CloudResult<Option<CloudObject>>;

    async fn find_network(&self, name_or_id: &str) -> CloudResult<Option<CloudObject>>;

    async fn find_keypair(&self, name: &str) -> CloudResult<Option<CloudObject>>;

    /// Find a port named `name` on the given network.
    async fn find_port(&self, name: &str, network_id: &str) -> CloudResult<Option<CloudObject>>;

    async fn create_instance(&self, spec: &InstanceSpec) -> CloudResult<InstanceId>;

    /// Request deletion of an instance. The call does not wait until the instance is gone and
    /// succeeds if the instance does not exist.
    async fn delete_instance(&self, id: &str, mode: DeleteMode) -> CloudResult<()>;

    /// Status, image and fault details of an instance, [`None`] if it does not exist.
    async fn get_instance(&self, id: &str) -> CloudResult<Option<CloudInstance>>;

    async fn find_server_by_name(&self, name: &str) -> CloudResult<Option<CloudInstance>>;

    /// Rebuild an instance with the given image. The provider power-cycles the instance.
    async fn rebuild_instance(&self, id: &str, image_id: &str, name: &str) -> CloudResult<()>;
}
