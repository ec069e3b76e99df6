//! Engine capabilities: storage layout, ownership, compaction, and backup
//! probes for each kind of data service.

use gavel_core::config::HarnessConfig;
use gavel_core::{BackupKey, CoreError, CoreResult, DataServiceInstance, RelationalEngine, ServiceRole};
use gavel_remote::{RemoteExecutor, RemoteResult, StageLog, run_logged};
use tracing::{debug, warn};

/// Owner of NoSQL data and config-server directories.
const NOSQL_OWNER: &str = "mongod:mongod";

/// A live directory and where its backup copy lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirPair {
    pub live: String,
    pub backup: String,
}

/// Where one instance's data lives and where its scale-exact backup goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupLayout {
    /// Root of this instance's backup for the key.
    pub backup_root: String,
    pub pairs: Vec<DirPair>,
    /// `user:group` to restore on live directories, if any.
    pub owner: Option<&'static str>,
}

impl BackupLayout {
    /// Resolve the layout of `instance` for `key`.
    ///
    /// Fails for relational instances without a supported engine.
    pub fn for_instance(
        config: &HarnessConfig,
        instance: &DataServiceInstance,
        key: &BackupKey,
    ) -> CoreResult<Self> {
        let storage = &config.storage;
        match instance.role {
            ServiceRole::Relational => {
                let engine = relational_engine(instance)?;
                let root = format!("{}/{}", storage.relational_backup_root, key.relational_segment());
                Ok(Self {
                    pairs: vec![
                        DirPair {
                            live: config.relational_data_dir(engine),
                            backup: format!("{root}/data"),
                        },
                        DirPair {
                            live: config.relational_log_dir(engine),
                            backup: format!("{root}/log"),
                        },
                    ],
                    backup_root: root,
                    owner: Some(engine.owner()),
                })
            }
            ServiceRole::Nosql => {
                let root = format!("{}/{}", storage.nosql_backup_root, key.nosql_segment());
                let mut pairs = vec![DirPair {
                    live: config.nosql.data_dir.clone(),
                    backup: format!("{root}/data"),
                }];
                for (i, dir) in config.nosql.config_server_dirs.iter().enumerate() {
                    pairs.push(DirPair {
                        live: dir.clone(),
                        backup: format!("{root}/configdb{}", i + 1),
                    });
                }
                Ok(Self {
                    backup_root: root,
                    pairs,
                    owner: Some(NOSQL_OWNER),
                })
            }
            ServiceRole::File => {
                let root = format!("{}/{}", storage.file_backup_root, key.file_segment());
                Ok(Self {
                    pairs: vec![DirPair {
                        live: storage.blob_dir.clone(),
                        backup: format!("{root}/images"),
                    }],
                    backup_root: root,
                    owner: None,
                })
            }
        }
    }

    /// Shell test that succeeds iff every backup directory exists and is
    /// non-empty.
    pub fn probe_command(&self) -> String {
        self.pairs
            .iter()
            .map(|p| non_empty_dir_test(&p.backup))
            .collect::<Vec<_>>()
            .join(" && ")
    }

    /// Command restoring ownership of the live directories.
    pub fn ownership_command(&self) -> Option<String> {
        let owner = self.owner?;
        let dirs: Vec<&str> = self.pairs.iter().map(|p| p.live.as_str()).collect();
        Some(format!("chown -R {owner} {}", dirs.join(" ")))
    }
}

fn relational_engine(instance: &DataServiceInstance) -> CoreResult<RelationalEngine> {
    instance
        .engine
        .ok_or_else(|| CoreError::UnknownEngine(format!("<none> on {}", instance.name)))
}

fn non_empty_dir_test(dir: &str) -> String {
    format!("test -d {dir} && [ -n \"$(ls -A {dir} 2>/dev/null)\" ]")
}

/// Compaction command for a relational instance, if its engine needs one.
pub fn compaction_command(instance: &DataServiceInstance) -> CoreResult<Option<String>> {
    let engine = relational_engine(instance)?;
    if !engine.requires_compaction() {
        return Ok(None);
    }
    let port = instance.port_for(engine.as_str())?;
    Ok(Some(format!(
        "psql -U auction -h localhost -p {port} -d auction -c 'VACUUM ANALYZE;'"
    )))
}

/// Run the engine's compaction pass on `instance`.
///
/// Best effort: a failing pass is logged and reported as `false`.
pub async fn run_compaction(
    executor: &dyn RemoteExecutor,
    log: &StageLog,
    instance: &DataServiceInstance,
) -> RemoteResult<bool> {
    let command = match compaction_command(instance) {
        Ok(Some(command)) => command,
        Ok(None) => {
            debug!(service = %instance.name, "engine needs no compaction");
            return Ok(true);
        }
        Err(e) => {
            warn!(service = %instance.name, error = %e, "cannot compact instance");
            log.line(format!("skipping compaction on {}: {e}", instance.name));
            return Ok(false);
        }
    };
    let output = run_logged(executor, log, &instance.host, &command).await?;
    if !output.success() {
        warn!(service = %instance.name, exit = output.exit_code, "compaction failed");
    }
    Ok(output.success())
}

/// Whether `instance` holds a usable backup for `key`.
pub async fn backup_available(
    executor: &dyn RemoteExecutor,
    log: &StageLog,
    config: &HarnessConfig,
    instance: &DataServiceInstance,
    key: &BackupKey,
) -> anyhow::Result<bool> {
    let layout = BackupLayout::for_instance(config, instance, key)?;
    let output = run_logged(executor, log, &instance.host, &layout.probe_command()).await?;
    let available = output.success();
    log.line(format!(
        "{} backup at {}: {}",
        instance.name,
        layout.backup_root,
        if available { "available" } else { "missing" }
    ));
    Ok(available)
}
