use std::path::PathBuf;

use crate::scheduler::command::run_command;
use crate::scheduler::{NodeFeatures, SchedulerConfig, SchedulerQuery, unique_nodes};
use crate::{Map, NodeName};

/// [`SchedulerQuery`] implemented on top of the `scontrol` and `sinfo` command line tools.
pub struct SlurmControl {
    scontrol: PathBuf,
    sinfo: PathBuf,
}

impl SlurmControl {
    pub fn new(scontrol: PathBuf, sinfo: PathBuf) -> Self {
        Self { scontrol, sinfo }
    }
}

impl SchedulerQuery for SlurmControl {
    async fn expand_hostlist(&self, hostlist: &str) -> crate::Result<Vec<NodeName>> {
        let output = run_command(&self.scontrol, &["show", "hostnames", hostlist]).await?;
        Ok(unique_nodes(parse_hostnames(&output)))
    }

    async fn get_config(&self) -> crate::Result<SchedulerConfig> {
        let output = run_command(&self.scontrol, &["show", "config"]).await?;
        Ok(parse_scontrol_config(&output))
    }

    async fn get_features(&self, hostlist: &str) -> crate::Result<NodeFeatures> {
        let output = run_command(&self.scontrol, &["show", "node", hostlist]).await?;
        Ok(parse_node_features(&output))
    }

    async fn filter_by_state(&self, hostlist: &str, state: &str) -> crate::Result<Option<String>> {
        let nodes = format!("--nodes={hostlist}");
        let states = format!("--states={state}");
        let output = run_command(
            &self.sinfo,
            &["--noheader", &nodes, &states, "--format=%N"],
        )
        .await?;
        Ok(join_hostlists(&output))
    }

    async fn set_node_resumable(&self, node: &str) -> crate::Result<()> {
        let nodename = format!("nodename={node}");
        run_command(&self.scontrol, &["update", "state=resume", &nodename]).await?;
        Ok(())
    }

    async fn get_node_reason(&self, node: &str, max_length: usize) -> crate::Result<String> {
        let nodes = format!("--nodes={node}");
        let format = format!("Reason:{max_length}");
        let output = run_command(&self.sinfo, &["--noheader", &nodes, "-O", &format]).await?;
        Ok(output.trim().chars().take(max_length).collect())
    }
}

/// Parse the output of `scontrol show hostnames`, one node per line.
pub fn parse_hostnames(output: &str) -> Vec<NodeName> {
    output
        .lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .map(|line| line.to_string())
        .collect()
}

/// Parse `<key> = <value>` lines from the output of `scontrol show config`.
/// The first line is a `Configuration data as of ...` header.
pub fn parse_scontrol_config(output: &str) -> SchedulerConfig {
    let mut items = Map::new();
    for line in output.lines().skip(1) {
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            if !key.is_empty() {
                items.insert(key.to_string(), value.trim().to_string());
            }
        }
    }
    SchedulerConfig::new(items)
}

/// Parse `AvailableFeatures` of each node from the output of `scontrol show node`.
///
/// Each node block starts with a `NodeName=<name> ...` line. Nodes without any feature
/// (`AvailableFeatures=(null)`) map to an empty list.
pub fn parse_node_features(output: &str) -> NodeFeatures {
    let mut features = NodeFeatures::new();
    let mut node: Option<&str> = None;
    for line in output.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("NodeName=") {
            node = rest.split_whitespace().next();
        } else if let Some(value) = line.strip_prefix("AvailableFeatures=") {
            match node {
                Some(node) => {
                    features.insert(node.to_string(), split_features(value));
                }
                None => log::warn!("Found AvailableFeatures without NodeName: {line}"),
            }
        }
    }
    features
}

fn split_features(value: &str) -> Vec<String> {
    let value = value.trim();
    if value.is_empty() || value == "(null)" {
        return vec![];
    }
    value
        .split(',')
        .map(|feature| feature.trim())
        .filter(|feature| !feature.is_empty())
        .map(|feature| feature.to_string())
        .collect()
}

/// `sinfo` prints one hostlist per partition/state combination.
fn join_hostlists(output: &str) -> Option<String> {
    let parts = unique_nodes(parse_hostnames(output));
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(","))
    }
}
