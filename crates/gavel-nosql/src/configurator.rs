//! NoSQL cluster configuration.
//!
//! Three mutually exclusive shapes, chosen from the application's
//! `(shards, replicas)` counts:
//!
//! | shards | replicas | action |
//! |--------|----------|--------|
//! | 0      | 0        | none, the single instance is used directly |
//! | n > 0  | 0        | add shards via the router, shard every collection on a hashed key, stop the balancer |
//! | 0      | n > 0    | initiate a replica set on the first instance, add the rest as secondaries |
//!
//! Both counts non-zero is rejected before any command is issued.
//! Command output is logged verbatim; only transport failures abort.

use std::time::Duration;

use gavel_core::config::NosqlConfig;
use gavel_core::{CoreError, NosqlTopology, ServiceRole, TopologyView};
use gavel_remote::{RemoteExecutor, StageLog, run_logged};
use tracing::{info, warn};

use crate::error::NosqlResult;
use crate::shell::{eval, sibling_db};

/// Logical databases that get sharding enabled.
pub const SHARDED_DATABASES: &[&str] = &[
    "auction",
    "bid",
    "attendanceRecord",
    "imageInfo",
    "auctionFullImages",
    "auctionPreviewImages",
    "auctionThumbnailImages",
];

/// A collection sharded on a hashed key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardedCollection {
    pub database: &'static str,
    pub collection: &'static str,
    pub key: &'static str,
}

const fn sharded(database: &'static str, collection: &'static str, key: &'static str) -> ShardedCollection {
    ShardedCollection {
        database,
        collection,
        key,
    }
}

pub const SHARDED_COLLECTIONS: &[ShardedCollection] = &[
    sharded("attendanceRecord", "attendanceRecord", "userId"),
    sharded("bid", "bid", "bidderId"),
    sharded("imageInfo", "imageInfo", "entityid"),
    sharded("auctionFullImages", "imageFull", "imageid"),
    sharded("auctionPreviewImages", "imagePreview", "imageid"),
    sharded("auctionThumbnailImages", "imageThumbnail", "imageid"),
];

/// Applies the sharding or replication layout to a running NoSQL cluster.
pub struct ClusterConfigurator<'a> {
    executor: &'a dyn RemoteExecutor,
    config: &'a NosqlConfig,
    settle: Duration,
}

impl<'a> ClusterConfigurator<'a> {
    pub fn new(executor: &'a dyn RemoteExecutor, config: &'a NosqlConfig) -> Self {
        Self {
            executor,
            config,
            settle: Duration::from_secs(config.settle_secs),
        }
    }

    /// Override the replica-set settle interval.
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Configure the cluster for `view`'s shard and replica counts.
    pub async fn configure(&self, view: &TopologyView, log: &StageLog) -> NosqlResult<NosqlTopology> {
        let topology = view.nosql_topology()?;
        match topology {
            NosqlTopology::Standalone => {
                log.line("unsharded and unreplicated: nothing to configure");
            }
            NosqlTopology::Sharded { shards } => self.configure_sharded(view, shards, log).await?,
            NosqlTopology::Replicated { replicas } => {
                self.configure_replicated(view, replicas, log).await?
            }
        }
        info!(?topology, "NoSQL cluster configured");
        Ok(topology)
    }

    async fn configure_sharded(&self, view: &TopologyView, shards: u32, log: &StageLog) -> NosqlResult<()> {
        let router = self.config.router.as_deref().ok_or(CoreError::MissingRouter)?;
        let instances = view.require(ServiceRole::Nosql)?;
        if instances.len() as u32 != shards {
            warn!(
                configured = shards,
                instances = instances.len(),
                "shard count differs from NoSQL instance count"
            );
        }

        for instance in instances {
            let endpoint = instance.endpoint(&self.config.protocol)?;
            log.line(format!("adding shard {endpoint}"));
            self.run(router, &format!("sh.addShard(\"{endpoint}\")"), log).await?;
        }

        for database in SHARDED_DATABASES {
            self.run(router, &format!("sh.enableSharding(\"{database}\")"), log).await?;
        }

        for c in SHARDED_COLLECTIONS {
            let index = format!(
                "{}.{}.createIndex({{{}: \"hashed\"}})",
                sibling_db(c.database),
                c.collection,
                c.key
            );
            self.run(router, &index, log).await?;
            let shard = format!(
                "sh.shardCollection(\"{}.{}\", {{{}: \"hashed\"}})",
                c.database, c.collection, c.key
            );
            self.run(router, &shard, log).await?;
        }

        // Chunk migrations during a run would skew its results.
        self.run(router, "sh.stopBalancer()", log).await?;
        Ok(())
    }

    async fn configure_replicated(&self, view: &TopologyView, replicas: u32, log: &StageLog) -> NosqlResult<()> {
        let instances = view.require(ServiceRole::Nosql)?;
        if instances.len() as u32 != replicas {
            warn!(
                configured = replicas,
                instances = instances.len(),
                "replica count differs from NoSQL instance count"
            );
        }
        let primary = view.nosql_primary()?;
        let secondaries = instances.iter().filter(|i| !std::ptr::eq(*i, primary));
        let primary_endpoint = primary.endpoint(&self.config.protocol)?;
        let set_name = replica_set_name(primary.shard_index());

        log.line(format!("initiating replica set {set_name} on {primary_endpoint}"));
        let initiate = format!(
            "rs.initiate({{_id: \"{set_name}\", members: [{{_id: 0, host: \"{primary_endpoint}\"}}]}})"
        );
        self.run(&primary_endpoint, &initiate, log).await?;
        self.run(&primary_endpoint, "rs.status()", log).await?;

        // Status after settling only surfaces election problems in the log.
        for _ in 0..2 {
            tokio::time::sleep(self.settle).await;
        }
        self.run(&primary_endpoint, "rs.status()", log).await?;

        for secondary in secondaries {
            let endpoint = secondary.endpoint(&self.config.protocol)?;
            log.line(format!("adding secondary {endpoint}"));
            self.run(&primary_endpoint, &format!("rs.add(\"{endpoint}\")"), log).await?;
            self.run(&primary_endpoint, "rs.status()", log).await?;
        }
        Ok(())
    }

    async fn run(&self, target: &str, script: &str, log: &StageLog) -> NosqlResult<()> {
        let command = eval(self.config, target, script);
        let output = run_logged(self.executor, log, &self.config.shell_host, &command).await?;
        if !output.success() {
            warn!(target, exit = output.exit_code, "NoSQL shell command failed");
        }
        Ok(())
    }
}

/// Replica-set name for the set whose primary carries `shard_index`.
pub fn replica_set_name(shard_index: u32) -> String {
    format!("auction{shard_index}")
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use gavel_core::{DataServiceInstance, PortBinding, ReplicaRole};
    use gavel_remote::RecordingExecutor;

    use super::*;

    fn nosql(name: &str, port: u16) -> DataServiceInstance {
        let mut ports = BTreeMap::new();
        ports.insert("mongod".to_string(), PortBinding::same(port));
        DataServiceInstance {
            name: name.to_string(),
            role: ServiceRole::Nosql,
            host: name.to_string(),
            ports,
            engine: None,
            shard_index: 0,
            replica_role: ReplicaRole::Primary,
        }
    }

    fn view(shards: u32, replicas: u32) -> TopologyView {
        TopologyView::from_instances(vec![nosql("m1", 27017), nosql("m2", 27018)], shards, replicas)
    }

    fn config_with_router() -> NosqlConfig {
        NosqlConfig {
            router: Some("router:27017".to_string()),
            ..NosqlConfig::default()
        }
    }

    #[tokio::test]
    async fn standalone_issues_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let log = StageLog::create(dir.path(), "configureNosql").unwrap();
        let exec = RecordingExecutor::new();
        let config = NosqlConfig::default();
        let topology = ClusterConfigurator::new(&exec, &config)
            .configure(&view(0, 0), &log)
            .await
            .unwrap();
        assert_eq!(topology, NosqlTopology::Standalone);
        assert!(exec.calls().is_empty());
    }

    #[tokio::test]
    async fn sharded_and_replicated_fails_before_any_command() {
        let dir = tempfile::tempdir().unwrap();
        let log = StageLog::create(dir.path(), "configureNosql").unwrap();
        let exec = RecordingExecutor::new();
        let config = config_with_router();
        let err = ClusterConfigurator::new(&exec, &config)
            .configure(&view(2, 2), &log)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::NosqlError::Core(CoreError::UnsupportedTopology { shards: 2, replicas: 2 })
        ));
        assert!(exec.calls().is_empty());
    }

    #[tokio::test]
    async fn sharded_adds_shards_then_collections_then_stops_balancer() {
        let dir = tempfile::tempdir().unwrap();
        let log = StageLog::create(dir.path(), "configureNosql").unwrap();
        let exec = RecordingExecutor::new();
        let config = config_with_router();
        ClusterConfigurator::new(&exec, &config)
            .configure(&view(2, 0), &log)
            .await
            .unwrap();

        assert_eq!(exec.count("sh.addShard"), 2);
        assert!(exec.count("sh.addShard(\"m2:27018\")") == 1);
        assert_eq!(exec.count("sh.enableSharding"), SHARDED_DATABASES.len());
        assert_eq!(exec.count("createIndex"), SHARDED_COLLECTIONS.len());
        assert_eq!(exec.count("{bidderId: \"hashed\"}"), 2);
        assert!(exec.calls().iter().all(|c| c.command.contains("--host router:27017")));
        let last = exec.calls().last().unwrap().command.clone();
        assert!(last.contains("sh.stopBalancer()"));
        assert!(exec.position("sh.addShard").unwrap() < exec.position("sh.enableSharding").unwrap());
    }

    #[tokio::test]
    async fn sharded_without_router_fails() {
        let dir = tempfile::tempdir().unwrap();
        let log = StageLog::create(dir.path(), "configureNosql").unwrap();
        let exec = RecordingExecutor::new();
        let config = NosqlConfig::default();
        let err = ClusterConfigurator::new(&exec, &config)
            .configure(&view(2, 0), &log)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::NosqlError::Core(CoreError::MissingRouter)));
    }

    #[tokio::test]
    async fn replicated_initiates_on_first_and_adds_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let log = StageLog::create(dir.path(), "configureNosql").unwrap();
        let exec = RecordingExecutor::new();
        let config = NosqlConfig::default();
        ClusterConfigurator::new(&exec, &config)
            .with_settle(Duration::ZERO)
            .configure(&view(0, 2), &log)
            .await
            .unwrap();

        let initiate = &exec.matching("rs.initiate")[0].command;
        assert!(initiate.contains("--host m1:27017"));
        assert!(initiate.contains("_id: \"auction0\""));
        assert_eq!(exec.count("rs.add(\"m2:27018\")"), 1);
        assert_eq!(exec.count("rs.status()"), 3);
        assert!(exec.position("rs.initiate").unwrap() < exec.position("rs.add").unwrap());
    }

    #[tokio::test]
    async fn replicated_initiates_on_instance_marked_primary() {
        let dir = tempfile::tempdir().unwrap();
        let log = StageLog::create(dir.path(), "configureNosql").unwrap();
        let exec = RecordingExecutor::new();
        let config = NosqlConfig::default();
        let mut secondary = nosql("m1", 27017);
        secondary.replica_role = ReplicaRole::Secondary;
        let view = TopologyView::from_instances(vec![secondary, nosql("m2", 27018)], 0, 2);
        ClusterConfigurator::new(&exec, &config)
            .with_settle(Duration::ZERO)
            .configure(&view, &log)
            .await
            .unwrap();

        assert!(exec.matching("rs.initiate")[0].command.contains("--host m2:27018"));
        assert_eq!(exec.count("rs.add(\"m1:27017\")"), 1);
        assert_eq!(exec.count("rs.add"), 1);
    }

    #[tokio::test]
    async fn failed_command_output_is_logged_and_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let log = StageLog::create(dir.path(), "configureNosql").unwrap();
        let exec = RecordingExecutor::new();
        exec.respond(
            "sh.addShard",
            gavel_remote::CommandOutput {
                exit_code: 1,
                stdout: "already a member".to_string(),
                stderr: String::new(),
            },
        );
        let config = config_with_router();
        ClusterConfigurator::new(&exec, &config)
            .configure(&view(2, 0), &log)
            .await
            .unwrap();
        assert!(log.contents().unwrap().contains("already a member"));
    }
}
