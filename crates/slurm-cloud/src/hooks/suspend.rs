use crate::cloud::{CloudGateway, DeleteMode};
use crate::hooks::HookContext;
use crate::scheduler::{SchedulerQuery, unique_nodes};
use crate::{InstanceId, NodeName};

/// Deletes the instances of all nodes of `hostlist`.
///
/// Records of all nodes are read before anything is deleted. A node without a record
/// fails the invocation and no instance is deleted. Deletion is only requested, the function
/// does not wait until the instances are gone.
pub async fn suspend<S: SchedulerQuery, C: CloudGateway>(
    ctx: &HookContext<S, C>,
    hostlist: &str,
) -> crate::Result<Vec<InstanceId>> {
    let nodes = unique_nodes(ctx.scheduler.expand_hostlist(hostlist).await?);
    let store = ctx.instance_store().await?;

    let records = nodes
        .into_iter()
        .map(|node| {
            let id = store.read_existing(&node)?;
            Ok((node, id))
        })
        .collect::<crate::Result<Vec<(NodeName, InstanceId)>>>()?;

    let mut deleted = Vec::with_capacity(records.len());
    for (node, id) in records {
        log::info!("Deleting instance {id} of node {node}");
        ctx.cloud.delete_instance(&id, DeleteMode::Normal).await?;
        deleted.push(id);
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use crate::common::error::HookError;
    use crate::hooks::suspend::suspend;
    use crate::tests::utils::{ServerConfigBuilder, TestEnv};

    #[tokio::test]
    async fn delete_recorded_instances() {
        let env = TestEnv::new();
        for (node, id) in [("cloud-1", "a"), ("cloud-2", "b")] {
            env.cloud
                .add_server(ServerConfigBuilder::default().id(id).name(node));
            env.store().write(node, id).unwrap();
        }
        let deleted = suspend(&env.ctx(), "cloud-1,cloud-2").await.unwrap();
        assert_eq!(deleted, vec!["a", "b"]);
        assert_eq!(env.cloud.deleted_ids(), vec!["a", "b"]);
        assert!(env.cloud.server("a").is_none());
    }

    #[tokio::test]
    async fn repeated_node_is_deleted_once() {
        let env = TestEnv::new();
        env.store().write("cloud-1", "a").unwrap();
        let deleted = suspend(&env.ctx(), "cloud-1,cloud-1").await.unwrap();
        assert_eq!(deleted, vec!["a"]);
        assert_eq!(env.cloud.deleted_ids(), vec!["a"]);
    }

    #[tokio::test]
    async fn missing_record_aborts_before_any_delete() {
        let env = TestEnv::new();
        env.store().write("cloud-1", "a").unwrap();
        let error = suspend(&env.ctx(), "cloud-1,cloud-2").await.unwrap_err();
        assert!(matches!(
            error,
            HookError::MissingInstanceRecord { node, .. } if node == "cloud-2"
        ));
        assert!(env.cloud.deleted_ids().is_empty());
    }

    #[tokio::test]
    async fn already_deleted_instance_is_accepted() {
        let env = TestEnv::new();
        env.store().write("cloud-1", "gone").unwrap();
        assert_eq!(suspend(&env.ctx(), "cloud-1").await.unwrap(), vec!["gone"]);
    }
}
