//! Service topology: the application instance contract and a read-only
//! view over its data services.
//!
//! The orchestrator never mutates an [`AppInstance`]'s records; it only
//! routes lifecycle calls (start, stop, clear, port registration) back to
//! it. [`TopologyView`] snapshots the records once per operation and
//! answers role and shard/replica lookups.

use async_trait::async_trait;

use crate::error::{CoreError, CoreResult};
use crate::types::{DataServiceInstance, ReplicaRole, ServiceRole};

/// A provisioned application instance owning a set of data services.
#[async_trait]
pub trait AppInstance: Send + Sync {
    /// Active instances for `role`, in provisioning order.
    fn active_instances(&self, role: ServiceRole) -> Vec<DataServiceInstance>;

    fn num_shards(&self) -> u32;

    fn num_replicas(&self) -> u32;

    /// Comma-separated Spring profiles for loader wiring.
    fn active_profiles(&self) -> String;

    async fn stop_data_services(&self) -> anyhow::Result<()>;

    async fn clear_data_services_before_start(&self) -> anyhow::Result<()>;

    async fn clear_data_services_after_start(&self) -> anyhow::Result<()>;

    async fn cleanup_data_services(&self) -> anyhow::Result<()>;

    async fn remove_data_services(&self) -> anyhow::Result<()>;

    /// Configure and start every data service, sized for `target_users`.
    async fn configure_and_start_data_services(
        &self,
        target_users: Option<u32>,
    ) -> anyhow::Result<()>;

    async fn is_up_data_services(&self) -> anyhow::Result<bool>;

    async fn set_external_port_numbers(&self) -> anyhow::Result<()>;

    async fn unregister_port_numbers(&self) -> anyhow::Result<()>;
}

/// Shape of the NoSQL cluster.
///
/// Sharding and replication are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NosqlTopology {
    /// One instance used directly.
    Standalone,
    Sharded { shards: u32 },
    Replicated { replicas: u32 },
}

impl NosqlTopology {
    pub fn from_counts(shards: u32, replicas: u32) -> CoreResult<Self> {
        match (shards, replicas) {
            (0, 0) => Ok(Self::Standalone),
            (s, 0) => Ok(Self::Sharded { shards: s }),
            (0, r) => Ok(Self::Replicated { replicas: r }),
            (s, r) => Err(CoreError::UnsupportedTopology {
                shards: s,
                replicas: r,
            }),
        }
    }
}

/// Read-only snapshot of an application's data services.
#[derive(Debug, Clone)]
pub struct TopologyView {
    relational: Vec<DataServiceInstance>,
    nosql: Vec<DataServiceInstance>,
    file: Vec<DataServiceInstance>,
    shards: u32,
    replicas: u32,
    profiles: String,
}

impl TopologyView {
    /// Snapshot the current records of `app`.
    pub fn of(app: &dyn AppInstance) -> Self {
        Self {
            relational: app.active_instances(ServiceRole::Relational),
            nosql: app.active_instances(ServiceRole::Nosql),
            file: app.active_instances(ServiceRole::File),
            shards: app.num_shards(),
            replicas: app.num_replicas(),
            profiles: app.active_profiles(),
        }
    }

    /// Build a view from a flat instance list (declaration order kept).
    pub fn from_instances(instances: Vec<DataServiceInstance>, shards: u32, replicas: u32) -> Self {
        let mut view = Self {
            relational: Vec::new(),
            nosql: Vec::new(),
            file: Vec::new(),
            shards,
            replicas,
            profiles: String::new(),
        };
        for inst in instances {
            match inst.role {
                ServiceRole::Relational => view.relational.push(inst),
                ServiceRole::Nosql => view.nosql.push(inst),
                ServiceRole::File => view.file.push(inst),
            }
        }
        view
    }

    pub fn with_profiles(mut self, profiles: impl Into<String>) -> Self {
        self.profiles = profiles.into();
        self
    }

    /// Instances for `role`; may be empty.
    pub fn instances(&self, role: ServiceRole) -> &[DataServiceInstance] {
        match role {
            ServiceRole::Relational => &self.relational,
            ServiceRole::Nosql => &self.nosql,
            ServiceRole::File => &self.file,
        }
    }

    /// Instances for `role`, treating an empty list as a configuration error.
    pub fn require(&self, role: ServiceRole) -> CoreResult<&[DataServiceInstance]> {
        let instances = self.instances(role);
        if instances.is_empty() {
            return Err(CoreError::NoInstances(role));
        }
        Ok(instances)
    }

    /// The instance addressed as "first" for `role`.
    pub fn first(&self, role: ServiceRole) -> CoreResult<&DataServiceInstance> {
        self.require(role).map(|i| &i[0])
    }

    pub fn shards(&self) -> u32 {
        self.shards
    }

    pub fn replicas(&self) -> u32 {
        self.replicas
    }

    /// Comma-separated loader profiles; empty when none are active.
    pub fn active_profiles(&self) -> &str {
        &self.profiles
    }

    pub fn nosql_topology(&self) -> CoreResult<NosqlTopology> {
        NosqlTopology::from_counts(self.shards, self.replicas)
    }

    /// Replication is in effect (and therefore sync barriers apply).
    pub fn replication_active(&self) -> bool {
        self.replicas > 0 && self.shards == 0
    }

    /// The NoSQL instance marked primary, or the first one if none is.
    pub fn nosql_primary(&self) -> CoreResult<&DataServiceInstance> {
        let instances = self.require(ServiceRole::Nosql)?;
        Ok(instances
            .iter()
            .find(|i| i.replica_role == ReplicaRole::Primary)
            .unwrap_or(&instances[0]))
    }

    /// `host:port` clients should use to reach the NoSQL store.
    ///
    /// Sharded clusters go through the router; otherwise the primary.
    pub fn nosql_entry(&self, router: Option<&str>, protocol: &str) -> CoreResult<String> {
        if self.shards > 0 {
            return router.map(str::to_string).ok_or(CoreError::MissingRouter);
        }
        self.nosql_primary()?.endpoint(protocol)
    }
}
