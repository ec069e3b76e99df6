//! Data lifecycle orchestration.

use std::sync::Arc;

use gavel_backup::BackupManager;
use gavel_core::{AppInstance, HarnessConfig, RunRequest, ScaleTarget, ServiceRole, TopologyView};
use gavel_loader::{AuctionPreparer, BulkLoader, ReadinessChecker};
use gavel_nosql::{ClusterConfigurator, ReplicaSyncBarrier, SyncOutcome, WarmUpRunner, WarmUpSummary};
use gavel_remote::{CancelSignal, RemoteExecutor, StageLog};
use tracing::{info, warn};

use crate::error::{LifecycleError, LifecycleResult};

/// Stage log names, one file per operation.
pub mod stages {
    pub const CONFIGURE_NOSQL: &str = "configureNosql";
    pub const LOAD: &str = "loadData";
    pub const IS_LOADED: &str = "isDataLoaded";
    pub const PREPARE: &str = "prepareData";
    pub const CLEAN: &str = "cleanData";
    pub const COMPACT: &str = "compactData";
    pub const BACKUP: &str = "backupData";
    pub const RESTORE: &str = "restoreData";
    pub const IS_BACKUP_AVAILABLE: &str = "isBackupAvailable";
    pub const REPLICA_SYNC: &str = "replicaSync";
    pub const WARM_UP: &str = "warmUp";
}

/// How the data for a run got into place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    /// Forced reload.
    Reloaded,
    /// Already loaded; cleaned of earlier runs' additions.
    AlreadyLoaded,
    Restored,
    Loaded,
}

impl DataSource {
    pub fn freshly_loaded(&self) -> bool {
        matches!(self, Self::Reloaded | Self::Loaded)
    }
}

/// What [`Orchestrator::prepare_data`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub target: ScaleTarget,
    pub source: DataSource,
    pub backed_up: bool,
    pub auctions: u32,
    pub warm_up: Option<WarmUpSummary>,
    /// Request to persist for the next run in a series.
    pub next_request: RunRequest,
}

/// Drives one application instance's data services through a run's
/// data lifecycle.
///
/// Assumes it is the only orchestrator acting on `app`.
pub struct Orchestrator<'a> {
    app: &'a dyn AppInstance,
    executor: Arc<dyn RemoteExecutor>,
    config: &'a HarnessConfig,
    cancel: Option<CancelSignal>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(app: &'a dyn AppInstance, executor: Arc<dyn RemoteExecutor>, config: &'a HarnessConfig) -> Self {
        Self {
            app,
            executor,
            config,
            cancel: None,
        }
    }

    /// Stop long waits (replica sync, loader follow) when `cancel` flips.
    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// The dataset target for `request`.
    pub fn target(&self, request: &RunRequest) -> ScaleTarget {
        self.config.workload.target(request.scale, request.users)
    }

    fn view(&self) -> TopologyView {
        TopologyView::of(self.app)
    }

    fn stage(&self, name: &str) -> LifecycleResult<StageLog> {
        Ok(StageLog::create(&self.config.logging.dir, name)?)
    }

    fn executor(&self) -> &dyn RemoteExecutor {
        self.executor.as_ref()
    }

    /// Users the data services are sized for when started for `target`.
    fn target_users(&self, target: ScaleTarget) -> u32 {
        match target {
            ScaleTarget::Users(users) => users,
            ScaleTarget::Scale(scale) => scale.saturating_mul(self.config.workload.users_per_scale_unit),
        }
    }

    // ── Top-level decision procedure ─────────────────────────────────

    /// Make sure the data for `request` is in place and prepared, then stop
    /// the data services for the caller's timed run.
    pub async fn prepare_data(&self, request: &RunRequest) -> LifecycleResult<RunReport> {
        let target = self.target(request);
        let flags = request.flags;
        // Unsupported topologies fail before anything touches a host.
        let view = self.view();
        view.nosql_topology()?;
        info!(%target, users = request.users, ?flags, "preparing data");

        let source = if flags.reload_db {
            self.load_fresh(target, request.users, "reload").await?;
            DataSource::Reloaded
        } else {
            self.start_fresh(target, "start").await?;
            if self.is_data_loaded(target, request.users).await? {
                if !self.clean_data(target).await? {
                    warn!(%target, "cleanup of earlier runs' data failed");
                }
                DataSource::AlreadyLoaded
            } else if self.is_backup_available(target).await? {
                self.restore_data(target).await?;
                DataSource::Restored
            } else if flags.load_db {
                self.load_fresh(target, request.users, "load").await?;
                DataSource::Loaded
            } else {
                return Err(LifecycleError::DataMissing { target });
            }
        };

        let backed_up = flags.rebackup || (flags.backup && source.freshly_loaded());
        if backed_up {
            self.backup_data(target).await?;
        }

        let auctions = self.prepare_auctions(target, request.users).await?;
        self.compact().await?;
        if view.replication_active() {
            self.wait_for_replica_sync().await?;
        }
        let warm_up = if self.config.nosql.warm_up {
            match self.warm_up().await {
                Ok(summary) => Some(summary),
                Err(e) => {
                    warn!(error = %e, "warm-up failed");
                    None
                }
            }
        } else {
            None
        };

        self.shut_down().await?;
        info!(%target, ?source, backed_up, auctions, "data prepared");
        Ok(RunReport {
            target,
            source,
            backed_up,
            auctions,
            warm_up,
            next_request: request.after_run(),
        })
    }

    // ── Service lifecycle ────────────────────────────────────────────

    /// Stop, clean up and remove the data services and drop their ports.
    pub async fn tear_down(&self) -> LifecycleResult<()> {
        self.app.stop_data_services().await?;
        self.app.cleanup_data_services().await?;
        self.app.remove_data_services().await?;
        self.app.unregister_port_numbers().await?;
        Ok(())
    }

    /// Start the data services sized for `target` and confirm they are up.
    pub async fn start_fresh(&self, target: ScaleTarget, stage: &'static str) -> LifecycleResult<()> {
        self.app
            .configure_and_start_data_services(Some(self.target_users(target)))
            .await?;
        self.app.set_external_port_numbers().await?;
        self.ensure_up(stage).await
    }

    /// Stop the data services and drop their ports.
    pub async fn shut_down(&self) -> LifecycleResult<()> {
        self.app.stop_data_services().await?;
        self.app.unregister_port_numbers().await?;
        Ok(())
    }

    /// Wipe the data services, start them empty for `target`, configure the
    /// NoSQL cluster and bulk load. Services are left running.
    pub async fn load_fresh(&self, target: ScaleTarget, users: u32, stage: &'static str) -> LifecycleResult<()> {
        self.view().nosql_topology()?;
        self.tear_down().await?;
        self.app.clear_data_services_before_start().await?;
        self.start_fresh(target, stage).await?;
        self.app.clear_data_services_after_start().await?;
        self.configure_cluster().await?;
        self.load_or_fail(target, users).await?;
        self.ensure_up(stage).await
    }

    async fn ensure_up(&self, stage: &'static str) -> LifecycleResult<()> {
        if self.app.is_up_data_services().await? {
            Ok(())
        } else {
            Err(LifecycleError::ServicesDown { stage })
        }
    }

    // ── Individual operations ────────────────────────────────────────

    pub async fn configure_cluster(&self) -> LifecycleResult<()> {
        let log = self.stage(stages::CONFIGURE_NOSQL)?;
        ClusterConfigurator::new(self.executor(), &self.config.nosql)
            .configure(&self.view(), &log)
            .await?;
        Ok(())
    }

    pub async fn is_data_loaded(&self, target: ScaleTarget, users: u32) -> LifecycleResult<bool> {
        let log = self.stage(stages::IS_LOADED)?;
        Ok(ReadinessChecker::new(self.executor(), self.config)
            .is_loaded(target, users, &self.view(), &log)
            .await?)
    }

    /// Run the bulk loader; `true` iff the data verifies afterwards.
    pub async fn load_data(&self, target: ScaleTarget, users: u32) -> LifecycleResult<bool> {
        let log = self.stage(stages::LOAD)?;
        let loader = BulkLoader::new(self.executor(), self.config);
        let loader = match self.cancel.clone() {
            Some(cancel) => loader.with_cancel(cancel),
            None => loader,
        };
        Ok(loader.load(target, users, &self.view(), &log).await?)
    }

    async fn load_or_fail(&self, target: ScaleTarget, users: u32) -> LifecycleResult<()> {
        if self.load_data(target, users).await? {
            Ok(())
        } else {
            Err(LifecycleError::LoadFailed { target })
        }
    }

    /// Drop data added by earlier runs.
    pub async fn clean_data(&self, target: ScaleTarget) -> LifecycleResult<bool> {
        let log = self.stage(stages::CLEAN)?;
        Ok(AuctionPreparer::new(self.executor(), self.config)
            .clean_data(target, &self.view(), &log)
            .await?)
    }

    /// Prepare auctions for the run; returns how many.
    pub async fn prepare_auctions(&self, target: ScaleTarget, users: u32) -> LifecycleResult<u32> {
        let log = self.stage(stages::PREPARE)?;
        let view = self.view();
        let preparer = AuctionPreparer::new(self.executor(), self.config);
        let auctions = preparer.args(target, users, &view).auctions;
        if !preparer.prepare(target, users, &view, &log).await? {
            return Err(LifecycleError::PrepareFailed { target });
        }
        Ok(auctions)
    }

    /// Tear down, snapshot storage for `target`, and bring services back.
    pub async fn backup_data(&self, target: ScaleTarget) -> LifecycleResult<()> {
        let log = self.stage(stages::BACKUP)?;
        self.tear_down().await?;
        BackupManager::new(self.executor(), self.config)
            .create_backup(target, &self.view(), &log)
            .await?;
        self.start_fresh(target, "backup").await
    }

    /// Restore the backup for `target` and confirm services are up.
    pub async fn restore_data(&self, target: ScaleTarget) -> LifecycleResult<()> {
        let log = self.stage(stages::RESTORE)?;
        BackupManager::new(self.executor(), self.config)
            .restore_backup(self.app, target, Some(self.target_users(target)), &self.view(), &log)
            .await?;
        self.ensure_up("restore").await
    }

    pub async fn is_backup_available(&self, target: ScaleTarget) -> LifecycleResult<bool> {
        let log = self.stage(stages::IS_BACKUP_AVAILABLE)?;
        Ok(BackupManager::new(self.executor(), self.config)
            .is_available(target, &self.view(), &log)
            .await?)
    }

    /// Compact every relational instance. Failures are logged only.
    pub async fn compact(&self) -> LifecycleResult<()> {
        let log = self.stage(stages::COMPACT)?;
        for instance in self.view().instances(ServiceRole::Relational) {
            let requires = instance.engine_kind().is_some_and(|e| e.requires_compaction());
            if requires && !gavel_services::run_compaction(self.executor(), &log, instance).await? {
                warn!(service = %instance.name, "compaction failed, continuing");
            }
        }
        Ok(())
    }

    /// Block until the replica set on the first NoSQL instance converges.
    pub async fn wait_for_replica_sync(&self) -> LifecycleResult<SyncOutcome> {
        let log = self.stage(stages::REPLICA_SYNC)?;
        let nosql = &self.config.nosql;
        let entry = self.view().nosql_entry(nosql.router.as_deref(), &nosql.protocol)?;
        let barrier = ReplicaSyncBarrier::new(self.executor(), nosql);
        let barrier = match self.cancel.clone() {
            Some(cancel) => barrier.with_cancel(cancel),
            None => barrier,
        };
        let outcome = barrier.wait_for_sync(&entry, &log).await?;
        if !outcome.is_ready() {
            warn!(attempts = outcome.attempts(), "replica set not confirmed in sync, continuing");
        }
        Ok(outcome)
    }

    pub async fn warm_up(&self) -> LifecycleResult<WarmUpSummary> {
        let log = self.stage(stages::WARM_UP)?;
        Ok(WarmUpRunner::new(Arc::clone(&self.executor), self.config.nosql.clone())
            .warm_up(&self.view(), &log)
            .await?)
    }
}
