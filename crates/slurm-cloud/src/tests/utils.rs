use std::cell::RefMut;

use derive_builder::Builder;
use tempfile::TempDir;

use crate::cloud::{
    CloudError, CloudGateway, CloudInstance, CloudObject, CloudResult, DeleteMode, InstanceSpec,
    InstanceStatus,
};
use crate::common::WrappedRcRefCell;
use crate::common::error::HookError;
use crate::hooks::HookContext;
use crate::hooks::reboot::PowerControl;
use crate::scheduler::{CLOUD_STATE, NodeFeatures, SchedulerConfig, SchedulerQuery};
use crate::store::InstanceStore;
use crate::{InstanceId, Map, NodeName, Set};

pub fn complete_features() -> [&'static str; 4] {
    [
        "image=rocky-9",
        "flavor=m1.small",
        "keypair=slurm",
        "network=cluster",
    ]
}

/// Scheduler and cloud fakes plus a temporary `StateSaveLocation`.
pub struct TestEnv {
    pub scheduler: FakeScheduler,
    pub cloud: FakeCloud,
    state_dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        let state_dir = TempDir::with_prefix("slurm-cloud").unwrap();
        let scheduler = FakeScheduler::default();
        scheduler.set_config("StateSaveLocation", state_dir.path().to_str().unwrap());
        Self {
            scheduler,
            cloud: FakeCloud::with_catalog(),
            state_dir,
        }
    }

    pub fn ctx(&self) -> HookContext<FakeScheduler, FakeCloud> {
        HookContext::new(self.scheduler.clone(), self.cloud.clone())
    }

    pub fn store(&self) -> InstanceStore {
        InstanceStore::new(self.state_dir.path().to_path_buf())
    }
}

#[derive(Default)]
pub struct SchedulerState {
    features: NodeFeatures,
    config: Map<String, String>,
    cloud_nodes: Set<NodeName>,
    reasons: Map<NodeName, String>,
    resumed: Vec<NodeName>,
    failing_resume: Set<NodeName>,
}

/// Node lists are plain comma separated names, bracket expressions are not expanded.
#[derive(Default, Clone)]
pub struct FakeScheduler {
    state: WrappedRcRefCell<SchedulerState>,
}

impl FakeScheduler {
    fn state(&self) -> RefMut<'_, SchedulerState> {
        self.state.get_mut()
    }

    pub fn set_features(&self, node: &str, features: &[&str]) {
        self.state().features.insert(
            node.to_string(),
            features.iter().map(|f| f.to_string()).collect(),
        );
    }

    pub fn set_config(&self, key: &str, value: &str) {
        self.state()
            .config
            .insert(key.to_string(), value.to_string());
    }

    pub fn config(&self) -> SchedulerConfig {
        SchedulerConfig::new(self.state.get().config.clone())
    }

    pub fn add_cloud_node(&self, node: &str) {
        self.state().cloud_nodes.insert(node.to_string());
    }

    pub fn set_reason(&self, node: &str, reason: &str) {
        self.state()
            .reasons
            .insert(node.to_string(), reason.to_string());
    }

    pub fn fail_resume_of(&self, node: &str) {
        self.state().failing_resume.insert(node.to_string());
    }

    pub fn resumed(&self) -> Vec<NodeName> {
        self.state.get().resumed.clone()
    }
}

fn split_hostlist(hostlist: &str) -> Vec<NodeName> {
    hostlist
        .split(',')
        .filter(|node| !node.is_empty())
        .map(|node| node.to_string())
        .collect()
}

impl SchedulerQuery for FakeScheduler {
    async fn expand_hostlist(&self, hostlist: &str) -> crate::Result<Vec<NodeName>> {
        Ok(split_hostlist(hostlist))
    }

    async fn get_config(&self) -> crate::Result<SchedulerConfig> {
        Ok(self.config())
    }

    async fn get_features(&self, _hostlist: &str) -> crate::Result<NodeFeatures> {
        Ok(self.state.get().features.clone())
    }

    async fn filter_by_state(&self, hostlist: &str, state: &str) -> crate::Result<Option<String>> {
        assert_eq!(state, CLOUD_STATE);
        let state = self.state.get();
        let nodes: Vec<NodeName> = split_hostlist(hostlist)
            .into_iter()
            .filter(|node| state.cloud_nodes.contains(node))
            .collect();
        Ok((!nodes.is_empty()).then(|| nodes.join(",")))
    }

    async fn set_node_resumable(&self, node: &str) -> crate::Result<()> {
        let mut state = self.state();
        if state.failing_resume.contains(node) {
            return Err(HookError::SchedulerError(format!(
                "Invalid node name specified: {node}"
            )));
        }
        state.resumed.push(node.to_string());
        Ok(())
    }

    async fn get_node_reason(&self, node: &str, max_length: usize) -> crate::Result<String> {
        let reason = self.state.get().reasons.get(node).cloned().unwrap_or_default();
        Ok(reason.chars().take(max_length).collect())
    }
}

#[derive(Builder, Clone)]
#[builder(pattern = "owned")]
pub struct ServerConfig {
    #[builder(setter(into))]
    id: String,
    #[builder(setter(into))]
    name: String,
    #[builder(default, setter(into, strip_option))]
    image_id: Option<String>,
    #[builder(default = "InstanceStatus::Active")]
    status: InstanceStatus,
    #[builder(default, setter(into, strip_option))]
    fault_message: Option<String>,
}

#[derive(Default)]
pub struct CloudState {
    images: Vec<CloudObject>,
    flavors: Vec<CloudObject>,
    networks: Vec<CloudObject>,
    keypairs: Vec<CloudObject>,
    /// Ports with the id of their network.
    ports: Vec<(CloudObject, String)>,
    instances: Map<InstanceId, CloudInstance>,
    polls: Map<InstanceId, u32>,
    /// New instances become ACTIVE once polled this many times, [`None`] keeps them in BUILD.
    activate_after: Option<u32>,
    vanish_new_instances: bool,
    next_id: u32,
    created: Vec<InstanceSpec>,
    deleted: Vec<(InstanceId, DeleteMode)>,
    rebuilt: Vec<(InstanceId, String, String)>,
}

#[derive(Default, Clone)]
pub struct FakeCloud {
    state: WrappedRcRefCell<CloudState>,
}

impl FakeCloud {
    /// Cloud that resolves every parameter of [`complete_features`].
    pub fn with_catalog() -> Self {
        let cloud = FakeCloud::default();
        {
            let mut state = cloud.state.get_mut();
            state
                .images
                .push(CloudObject::new("img-rocky", Some("rocky-9".to_string())));
            state
                .flavors
                .push(CloudObject::new("flv-small", Some("m1.small".to_string())));
            state
                .networks
                .push(CloudObject::new("net-cluster", Some("cluster".to_string())));
            state
                .keypairs
                .push(CloudObject::new("slurm", Some("slurm".to_string())));
        }
        cloud
    }

    pub fn add_image(&self, image: CloudObject) {
        self.state.get_mut().images.push(image);
    }

    pub fn add_port(&self, port: CloudObject, network_id: &str) {
        self.state
            .get_mut()
            .ports
            .push((port, network_id.to_string()));
    }

    pub fn add_server(&self, builder: ServerConfigBuilder) {
        let config = builder.build().unwrap();
        self.state.get_mut().instances.insert(
            config.id.clone(),
            CloudInstance {
                id: config.id,
                name: config.name,
                image_id: config.image_id,
                status: config.status,
                fault_message: config.fault_message,
            },
        );
    }

    pub fn activate_after_polls(&self, polls: u32) {
        self.state.get_mut().activate_after = Some(polls);
    }

    pub fn vanish_new_instances(&self) {
        self.state.get_mut().vanish_new_instances = true;
    }

    pub fn server(&self, id: &str) -> Option<CloudInstance> {
        self.state.get().instances.get(id).cloned()
    }

    pub fn created(&self) -> Vec<InstanceSpec> {
        self.state.get().created.clone()
    }

    pub fn deleted(&self) -> Vec<(InstanceId, DeleteMode)> {
        self.state.get().deleted.clone()
    }

    pub fn deleted_ids(&self) -> Vec<InstanceId> {
        self.deleted().into_iter().map(|(id, _)| id).collect()
    }

    pub fn rebuilt(&self) -> Vec<(InstanceId, String, String)> {
        self.state.get().rebuilt.clone()
    }

    pub fn polls(&self) -> u32 {
        self.state.get().polls.values().sum()
    }
}

fn find_object(
    objects: &[CloudObject],
    kind: &'static str,
    name_or_id: &str,
) -> CloudResult<Option<CloudObject>> {
    if let Some(object) = objects.iter().find(|object| object.id == name_or_id) {
        return Ok(Some(object.clone()));
    }
    let mut matches: Vec<CloudObject> = objects
        .iter()
        .filter(|object| object.name.as_deref() == Some(name_or_id))
        .cloned()
        .collect();
    match matches.len() {
        0 | 1 => Ok(matches.pop()),
        count => Err(CloudError::Ambiguous {
            kind,
            query: name_or_id.to_string(),
            count,
        }),
    }
}

impl CloudGateway for FakeCloud {
    async fn find_image(&self, name_or_id: &str) -> CloudResult<Option<CloudObject>> {
        find_object(&self.state.get().images, "image", name_or_id)
    }

    async fn find_flavor(&self, name_or_id: &str) -> CloudResult<Option<CloudObject>> {
        find_object(&self.state.get().flavors, "flavor", name_or_id)
    }

    async fn find_network(&self, name_or_id: &str) -> CloudResult<Option<CloudObject>> {
        find_object(&self.state.get().networks, "network", name_or_id)
    }

    async fn find_keypair(&self, name: &str) -> CloudResult<Option<CloudObject>> {
        find_object(&self.state.get().keypairs, "keypair", name)
    }

    async fn find_port(&self, name: &str, network_id: &str) -> CloudResult<Option<CloudObject>> {
        let ports: Vec<CloudObject> = self
            .state
            .get()
            .ports
            .iter()
            .filter(|(_, network)| network == network_id)
            .map(|(port, _)| port.clone())
            .collect();
        find_object(&ports, "port", name)
    }

    async fn create_instance(&self, spec: &InstanceSpec) -> CloudResult<InstanceId> {
        let mut state = self.state.get_mut();
        state.next_id += 1;
        let id = format!("instance-{}", state.next_id);
        state.created.push(spec.clone());
        if !state.vanish_new_instances {
            state.instances.insert(
                id.clone(),
                CloudInstance {
                    id: id.clone(),
                    name: spec.name.clone(),
                    image_id: Some(spec.image_id.clone()),
                    status: InstanceStatus::Build,
                    fault_message: None,
                },
            );
        }
        Ok(id)
    }

    async fn delete_instance(&self, id: &str, mode: DeleteMode) -> CloudResult<()> {
        let mut state = self.state.get_mut();
        state.instances.remove(id);
        state.deleted.push((id.to_string(), mode));
        Ok(())
    }

    async fn get_instance(&self, id: &str) -> CloudResult<Option<CloudInstance>> {
        let mut state = self.state.get_mut();
        let polls = {
            let polls = state.polls.entry(id.to_string()).or_default();
            *polls += 1;
            *polls
        };
        let activate = state.activate_after.is_some_and(|after| polls >= after);
        Ok(state.instances.get_mut(id).map(|instance| {
            if activate && instance.status == InstanceStatus::Build {
                instance.status = InstanceStatus::Active;
            }
            instance.clone()
        }))
    }

    async fn find_server_by_name(&self, name: &str) -> CloudResult<Option<CloudInstance>> {
        let state = self.state.get();
        let mut matches: Vec<&CloudInstance> = state
            .instances
            .values()
            .filter(|instance| instance.name == name)
            .collect();
        match matches.len() {
            0 | 1 => Ok(matches.pop().cloned()),
            count => Err(CloudError::Ambiguous {
                kind: "server",
                query: name.to_string(),
                count,
            }),
        }
    }

    async fn rebuild_instance(&self, id: &str, image_id: &str, name: &str) -> CloudResult<()> {
        let mut state = self.state.get_mut();
        let Some(instance) = state.instances.get_mut(id) else {
            return Err(CloudError::Api {
                status: 404,
                method: "POST".to_string(),
                url: format!("/servers/{id}/action"),
                body: String::new(),
            });
        };
        instance.image_id = Some(image_id.to_string());
        state
            .rebuilt
            .push((id.to_string(), image_id.to_string(), name.to_string()));
        Ok(())
    }
}

#[derive(Default, Clone)]
pub struct FakePower {
    reboots: WrappedRcRefCell<u32>,
}

impl FakePower {
    pub fn reboots(&self) -> u32 {
        *self.reboots.get()
    }
}

impl PowerControl for FakePower {
    fn reboot(&self) -> crate::Result<()> {
        *self.reboots.get_mut() += 1;
        Ok(())
    }
}
