//! Backup creation, restore and availability.

use gavel_core::{
    AppInstance, BackupKey, CoreError, DataServiceInstance, HarnessConfig, ScaleTarget, ServiceRole,
    TopologyView,
};
use gavel_remote::{RemoteExecutor, StageLog, run_logged};
use gavel_services::{BackupLayout, backup_available};
use tracing::{info, warn};

use crate::error::{BackupError, BackupResult};

pub struct BackupManager<'a> {
    executor: &'a dyn RemoteExecutor,
    config: &'a HarnessConfig,
}

impl<'a> BackupManager<'a> {
    pub fn new(executor: &'a dyn RemoteExecutor, config: &'a HarnessConfig) -> Self {
        Self { executor, config }
    }

    /// Key identifying the backup that matches `target` on `view`.
    pub fn key(&self, target: ScaleTarget, view: &TopologyView) -> BackupResult<BackupKey> {
        let relational = view.first(ServiceRole::Relational)?;
        let engine = relational
            .engine_kind()
            .ok_or_else(|| CoreError::UnknownEngine(format!("<none> on {}", relational.name)))?;
        Ok(BackupKey {
            scale_key: target.scale_key(),
            shards: view.shards(),
            replicas: view.replicas(),
            image_store: self.config.workload.image_store_type,
            engine,
        })
    }

    /// Instances whose storage is backed up, in copy order.
    fn backed_up<'v>(&self, view: &'v TopologyView) -> Vec<&'v DataServiceInstance> {
        let mut instances: Vec<&DataServiceInstance> = view
            .instances(ServiceRole::Relational)
            .iter()
            .chain(view.instances(ServiceRole::Nosql))
            .collect();
        if self.config.workload.image_store_type.is_filesystem() {
            instances.extend(view.instances(ServiceRole::File));
        }
        instances
    }

    fn layouts<'v>(
        &self,
        view: &'v TopologyView,
        key: &BackupKey,
    ) -> BackupResult<Vec<(&'v DataServiceInstance, BackupLayout)>> {
        self.backed_up(view)
            .into_iter()
            .map(|instance| Ok((instance, BackupLayout::for_instance(self.config, instance, key)?)))
            .collect()
    }

    /// Copy live storage of every backed-up instance into the backup for
    /// `target`, replacing whatever was there. Services must be stopped.
    pub async fn create_backup(&self, target: ScaleTarget, view: &TopologyView, log: &StageLog) -> BackupResult<BackupKey> {
        let key = self.key(target, view)?;
        let layouts = self.layouts(view, &key)?;
        log.line(format!("creating backup for {target}"));

        for (instance, layout) in &layouts {
            for pair in &layout.pairs {
                let command = format!(
                    "rm -rf {backup} && mkdir -p {backup} && cp -a {live}/. {backup}/",
                    backup = pair.backup,
                    live = pair.live
                );
                self.run(instance, &command, log).await?;
            }
        }
        info!(%target, instances = layouts.len(), "backup created");
        Ok(key)
    }

    /// Replace live storage with the backup for `target` and bring the
    /// services back.
    ///
    /// Nothing is touched if any instance lacks a supported engine.
    pub async fn restore_backup(
        &self,
        app: &dyn AppInstance,
        target: ScaleTarget,
        target_users: Option<u32>,
        view: &TopologyView,
        log: &StageLog,
    ) -> BackupResult<()> {
        let key = self.key(target, view)?;
        let layouts = self.layouts(view, &key)?;
        log.line(format!("restoring backup for {target}"));

        app.stop_data_services().await?;
        app.cleanup_data_services().await?;
        app.remove_data_services().await?;
        app.unregister_port_numbers().await?;

        for (instance, layout) in &layouts {
            for pair in &layout.pairs {
                let command = format!(
                    "rm -rf {live} && mkdir -p {live} && cp -a {backup}/. {live}/",
                    backup = pair.backup,
                    live = pair.live
                );
                self.run(instance, &command, log).await?;
            }
            if let Some(chown) = layout.ownership_command() {
                self.run(instance, &chown, log).await?;
            }
        }

        app.configure_and_start_data_services(target_users).await?;
        app.set_external_port_numbers().await?;
        info!(%target, "backup restored");
        Ok(())
    }

    /// `true` iff every backed-up instance has a backup for `target`.
    pub async fn is_available(&self, target: ScaleTarget, view: &TopologyView, log: &StageLog) -> BackupResult<bool> {
        let key = self.key(target, view)?;
        let mut available = true;
        for instance in self.backed_up(view) {
            if !backup_available(self.executor, log, self.config, instance, &key).await? {
                available = false;
            }
        }
        info!(%target, available, "backup availability");
        Ok(available)
    }

    async fn run(&self, instance: &DataServiceInstance, command: &str, log: &StageLog) -> BackupResult<()> {
        let output = run_logged(self.executor, log, instance.host_identity(), command).await?;
        if !output.success() {
            warn!(service = %instance.name, exit = output.exit_code, "backup command failed");
            return Err(BackupError::CommandFailed {
                host: instance.host.clone(),
                command: command.to_string(),
                exit_code: output.exit_code,
            });
        }
        Ok(())
    }
}
