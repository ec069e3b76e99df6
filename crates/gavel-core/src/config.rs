//! gavel.toml harness configuration.
//!
//! One file describes the workload size, the loader tool, the NoSQL
//! cluster, storage directories, and every data-service instance with the
//! shell commands that drive its lifecycle.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::scale::{AuctionSizing, DEFAULT_MIN_AUCTIONS, ScaleTarget, duration_floor};
use crate::types::*;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    #[serde(default)]
    pub workload: WorkloadConfig,
    pub loader: LoaderConfig,
    #[serde(default)]
    pub nosql: NosqlConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadConfig {
    pub users: u32,
    /// Negative means "size from users".
    pub scale: i64,
    pub max_users: u32,
    pub users_per_auction_scale_factor: u32,
    pub users_per_scale_unit: u32,
    pub auctions: Option<u32>,
    pub min_auctions: u32,
    pub ramp_up_secs: u64,
    pub steady_state_secs: u64,
    pub ramp_down_secs: u64,
    pub max_duration_secs: u64,
    pub image_store_type: ImageStoreType,
    /// Spring profiles selecting the loader's data-access wiring.
    pub active_profiles: String,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            users: 0,
            scale: -1,
            max_users: 0,
            users_per_auction_scale_factor: 15,
            users_per_scale_unit: 1000,
            auctions: None,
            min_auctions: DEFAULT_MIN_AUCTIONS,
            ramp_up_secs: 120,
            steady_state_secs: 300,
            ramp_down_secs: 60,
            max_duration_secs: 0,
            image_store_type: ImageStoreType::default(),
            active_profiles: "postgresql,mongodb".to_string(),
        }
    }
}

impl WorkloadConfig {
    pub fn sizing(&self) -> AuctionSizing {
        AuctionSizing {
            explicit: self.auctions,
            users_per_auction: self.users_per_auction_scale_factor,
            users_per_scale_unit: self.users_per_scale_unit,
            min_auctions: self.min_auctions,
        }
    }

    /// Seconds the prepared data must stay valid for.
    pub fn duration_floor(&self) -> u64 {
        duration_floor(
            self.max_duration_secs,
            self.ramp_up_secs,
            self.steady_state_secs,
            self.ramp_down_secs,
        )
    }

    pub fn target(&self, scale: i64, users: u32) -> ScaleTarget {
        ScaleTarget::resolve(scale, users, self.max_users)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Host the loader and verifier run on.
    pub host: String,
    #[serde(default = "default_loader::working_dir")]
    pub working_dir: String,
    /// Command that starts the bulk loader (flags are appended).
    pub loader_command: String,
    /// Command that starts the verifier/preparer (flags are appended).
    pub prep_command: String,
    /// Substring identifying the loader in a process listing.
    pub process_marker: String,
    #[serde(default = "default_loader::threads")]
    pub threads: u32,
    pub item_catalog: String,
    #[serde(default)]
    pub image_source: Option<String>,
    #[serde(default = "default_loader::run_label")]
    pub run_label: String,
    #[serde(default = "default_loader::log_file")]
    pub log_file: String,
    #[serde(default = "default_loader::discovery_grace_secs")]
    pub discovery_grace_secs: u64,
    /// Upper bound on the load itself; unbounded when absent.
    #[serde(default)]
    pub max_load_secs: Option<u64>,
}

mod default_loader {
    pub fn working_dir() -> String {
        "/opt/auction/dbLoader".to_string()
    }

    pub fn threads() -> u32 {
        8
    }

    pub fn run_label() -> String {
        "gavel".to_string()
    }

    pub fn log_file() -> String {
        "/tmp/dbLoader.log".to_string()
    }

    pub fn discovery_grace_secs() -> u64 {
        30
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NosqlConfig {
    /// Host the NoSQL shell commands are issued from.
    pub shell_host: String,
    pub shell: String,
    /// Protocol name of the NoSQL data port on each instance.
    pub protocol: String,
    /// `host:port` of the query router; required when sharded.
    pub router: Option<String>,
    pub settle_secs: u64,
    pub sync_interval_secs: u64,
    pub sync_deadline_secs: Option<u64>,
    pub data_dir: String,
    /// The three config-server data directories.
    pub config_server_dirs: Vec<String>,
    pub warm_up: bool,
    pub warm_up_concurrency: usize,
}

impl Default for NosqlConfig {
    fn default() -> Self {
        Self {
            shell_host: "localhost".to_string(),
            shell: "mongo".to_string(),
            protocol: "mongod".to_string(),
            router: None,
            settle_secs: 30,
            sync_interval_secs: 30,
            sync_deadline_secs: None,
            data_dir: "/mnt/mongoData".to_string(),
            config_server_dirs: vec![
                "/mnt/mongoC1data".to_string(),
                "/mnt/mongoC2data".to_string(),
                "/mnt/mongoC3data".to_string(),
            ],
            warm_up: false,
            warm_up_concurrency: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub relational_data_root: String,
    pub relational_log_root: String,
    pub relational_backup_root: String,
    pub nosql_backup_root: String,
    pub file_backup_root: String,
    pub blob_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            relational_data_root: "/mnt/dbData".to_string(),
            relational_log_root: "/mnt/dbLogs".to_string(),
            relational_backup_root: "/mnt/dbBackup".to_string(),
            nosql_backup_root: "/mnt/mongoBackup".to_string(),
            file_backup_root: "/mnt/imageStoreBackup".to_string(),
            blob_dir: "/mnt/imageStore".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for per-stage log files.
    pub dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./logs"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub num_nosql_shards: u32,
    pub num_nosql_replicas: u32,
}

/// One `[[services]]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub role: ServiceRole,
    #[serde(default)]
    pub engine: Option<String>,
    pub host: String,
    #[serde(default)]
    pub ports: BTreeMap<String, PortBinding>,
    #[serde(default)]
    pub shard_index: u32,
    #[serde(default)]
    pub replica_role: ReplicaRole,
    pub commands: ServiceCommands,
}

/// Shell commands run on the service's host to drive its lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCommands {
    pub start: String,
    pub stop: String,
    /// Exit status 0 means the service is up.
    pub is_up: String,
    #[serde(default)]
    pub clear_before_start: Option<String>,
    #[serde(default)]
    pub clear_after_start: Option<String>,
    #[serde(default)]
    pub cleanup: Option<String>,
    #[serde(default)]
    pub remove: Option<String>,
}

impl ServiceConfig {
    /// Validate and convert into a data-service record.
    pub fn to_instance(&self) -> CoreResult<DataServiceInstance> {
        let engine = match (self.role, self.engine.as_deref()) {
            (ServiceRole::Relational, Some(name)) => Some(name.parse::<RelationalEngine>()?),
            (ServiceRole::Relational, None) => {
                return Err(CoreError::InvalidConfig(format!(
                    "relational service {} has no engine",
                    self.name
                )));
            }
            (_, _) => None,
        };

        Ok(DataServiceInstance {
            name: self.name.clone(),
            role: self.role,
            host: self.host.clone(),
            ports: self.ports.clone(),
            engine,
            shard_index: self.shard_index,
            replica_role: self.replica_role,
        })
    }
}

impl HarnessConfig {
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CoreError::ReadConfig {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let config = Self::from_toml_str(&content)?;
        debug!(path = %path.display(), services = config.services.len(), "harness config loaded");
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> CoreResult<Self> {
        let config: HarnessConfig =
            toml::from_str(content).map_err(|e| CoreError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations no run could succeed with.
    pub fn validate(&self) -> CoreResult<()> {
        if self.nosql.config_server_dirs.len() != 3 {
            return Err(CoreError::InvalidConfig(format!(
                "expected 3 config server directories, got {}",
                self.nosql.config_server_dirs.len()
            )));
        }
        if self.app.num_nosql_shards > 0 && self.app.num_nosql_replicas > 0 {
            return Err(CoreError::UnsupportedTopology {
                shards: self.app.num_nosql_shards,
                replicas: self.app.num_nosql_replicas,
            });
        }
        let mut seen = std::collections::HashSet::new();
        for service in &self.services {
            if !seen.insert(service.name.as_str()) {
                return Err(CoreError::InvalidConfig(format!(
                    "duplicate service name: {}",
                    service.name
                )));
            }
            service.to_instance()?;
        }
        Ok(())
    }

    /// All configured data services, in declaration order.
    pub fn instances(&self) -> CoreResult<Vec<DataServiceInstance>> {
        self.services.iter().map(ServiceConfig::to_instance).collect()
    }

    /// The engine of the first relational service.
    pub fn relational_engine(&self) -> CoreResult<RelationalEngine> {
        self.instances()?
            .into_iter()
            .find(|i| i.role == ServiceRole::Relational)
            .and_then(|i| i.engine)
            .ok_or(CoreError::NoInstances(ServiceRole::Relational))
    }

    /// Backup key for `target` under this configuration.
    pub fn backup_key(&self, target: ScaleTarget) -> CoreResult<BackupKey> {
        Ok(BackupKey {
            scale_key: target.scale_key(),
            shards: self.app.num_nosql_shards,
            replicas: self.app.num_nosql_replicas,
            image_store: self.workload.image_store_type,
            engine: self.relational_engine()?,
        })
    }

    /// Live data directory of a relational engine.
    pub fn relational_data_dir(&self, engine: RelationalEngine) -> String {
        format!("{}/{}", self.storage.relational_data_root, engine)
    }

    /// Live log directory of a relational engine.
    pub fn relational_log_dir(&self, engine: RelationalEngine) -> String {
        format!("{}/{}", self.storage.relational_log_root, engine)
    }
}
