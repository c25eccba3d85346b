//! Persistent node -> instance mapping, one file per node.
use std::path::PathBuf;

use crate::common::error::HookError;
use crate::common::fsutils::{read_first_line, write_atomically};
use crate::{InstanceId, NodeName};

/// Stores the id of the instance backing each node in `<directory>/<node>`.
///
/// The directory is Slurm's `StateSaveLocation`, so the mapping survives controller restarts.
pub struct InstanceStore {
    directory: PathBuf,
}

impl InstanceStore {
    pub fn new(directory: PathBuf) -> Self {
        Self { directory }
    }

    /// Path of the record of `node`. Fails for names that are not a plain file name.
    pub fn path(&self, node: &str) -> crate::Result<PathBuf> {
        if !is_valid_node_name(node) {
            return Err(HookError::InvalidNodeName(node.to_string()));
        }
        Ok(self.directory.join(node))
    }

    pub fn write(&self, node: &str, id: &str) -> crate::Result<()> {
        let path = self.path(node)?;
        write_atomically(&path, id)?;
        log::debug!("Stored instance {id} of node {node} in {}", path.display());
        Ok(())
    }

    /// Returns [`None`] if no record exists for `node`.
    pub fn read(&self, node: &str) -> crate::Result<Option<InstanceId>> {
        Ok(read_first_line(&self.path(node)?)?)
    }

    /// Like [`Self::read`], but a missing record is an error.
    pub fn read_existing(&self, node: &NodeName) -> crate::Result<InstanceId> {
        let path = self.path(node)?;
        read_first_line(&path)?.ok_or_else(|| HookError::MissingInstanceRecord {
            node: node.clone(),
            path,
        })
    }
}

fn is_valid_node_name(node: &str) -> bool {
    !node.is_empty()
        && node != "."
        && node != ".."
        && node
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}
