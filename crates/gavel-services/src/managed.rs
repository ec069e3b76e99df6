//! Config-driven application instance.
//!
//! Every lifecycle operation on a data service is a shell command from its
//! `[[services]]` table, run on the service's host through a
//! [`RemoteExecutor`]. Services start in declaration order and stop in
//! reverse.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use anyhow::bail;
use async_trait::async_trait;
use gavel_core::config::{HarnessConfig, ServiceCommands};
use gavel_core::{AppInstance, CoreResult, DataServiceInstance, ServiceRole};
use gavel_remote::{CommandOutput, RemoteExecutor};
use tracing::{debug, info, warn};

/// Placeholder in start commands replaced by the target user count.
const USERS_PLACEHOLDER: &str = "{users}";

#[derive(Debug, Clone)]
struct ManagedService {
    instance: DataServiceInstance,
    commands: ServiceCommands,
}

/// What to do when a step's command exits non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OnFailure {
    Fail,
    Warn,
}

/// Service name → protocol → external port.
pub type PortRegistry = BTreeMap<String, BTreeMap<String, u16>>;

/// An [`AppInstance`] whose data services are described in the harness
/// config.
pub struct ManagedAppInstance {
    executor: Arc<dyn RemoteExecutor>,
    services: Vec<ManagedService>,
    shards: u32,
    replicas: u32,
    profiles: String,
    ports: RwLock<PortRegistry>,
}

impl ManagedAppInstance {
    pub fn from_config(config: &HarnessConfig, executor: Arc<dyn RemoteExecutor>) -> CoreResult<Self> {
        let services = config
            .services
            .iter()
            .map(|s| {
                Ok(ManagedService {
                    instance: s.to_instance()?,
                    commands: s.commands.clone(),
                })
            })
            .collect::<CoreResult<Vec<_>>>()?;
        Ok(Self {
            executor,
            services,
            shards: config.app.num_nosql_shards,
            replicas: config.app.num_nosql_replicas,
            profiles: config.workload.active_profiles.clone(),
            ports: RwLock::new(PortRegistry::new()),
        })
    }

    /// External ports currently registered for each service.
    pub fn registered_ports(&self) -> PortRegistry {
        self.ports.read().map(|p| p.clone()).unwrap_or_default()
    }

    async fn run_step<F>(&self, step: &str, reverse: bool, on_failure: OnFailure, pick: F) -> anyhow::Result<()>
    where
        F: Fn(&ServiceCommands) -> Option<String>,
    {
        let mut order: Vec<&ManagedService> = self.services.iter().collect();
        if reverse {
            order.reverse();
        }
        for service in order {
            let Some(command) = pick(&service.commands) else {
                continue;
            };
            let output = self.run_on(service, step, &command).await?;
            if output.success() {
                continue;
            }
            match on_failure {
                OnFailure::Fail => bail!(
                    "{step} failed on {} (exit {}): {}",
                    service.instance.name,
                    output.exit_code,
                    output.stderr.trim()
                ),
                OnFailure::Warn => warn!(
                    service = %service.instance.name,
                    step,
                    exit = output.exit_code,
                    "step failed, continuing"
                ),
            }
        }
        Ok(())
    }

    async fn run_on(&self, service: &ManagedService, step: &str, command: &str) -> anyhow::Result<CommandOutput> {
        debug!(service = %service.instance.name, host = %service.instance.host, step, command, "running");
        Ok(self.executor.run(&service.instance.host, command).await?)
    }
}

#[async_trait]
impl AppInstance for ManagedAppInstance {
    fn active_instances(&self, role: ServiceRole) -> Vec<DataServiceInstance> {
        self.services
            .iter()
            .filter(|s| s.instance.role == role)
            .map(|s| s.instance.clone())
            .collect()
    }

    fn num_shards(&self) -> u32 {
        self.shards
    }

    fn num_replicas(&self) -> u32 {
        self.replicas
    }

    fn active_profiles(&self) -> String {
        self.profiles.clone()
    }

    async fn stop_data_services(&self) -> anyhow::Result<()> {
        // Stopping an already-stopped service is fine.
        self.run_step("stop", true, OnFailure::Warn, |c| Some(c.stop.clone()))
            .await
    }

    async fn clear_data_services_before_start(&self) -> anyhow::Result<()> {
        self.run_step("clear before start", false, OnFailure::Fail, |c| {
            c.clear_before_start.clone()
        })
        .await
    }

    async fn clear_data_services_after_start(&self) -> anyhow::Result<()> {
        self.run_step("clear after start", false, OnFailure::Fail, |c| {
            c.clear_after_start.clone()
        })
        .await
    }

    async fn cleanup_data_services(&self) -> anyhow::Result<()> {
        self.run_step("cleanup", true, OnFailure::Warn, |c| c.cleanup.clone())
            .await
    }

    async fn remove_data_services(&self) -> anyhow::Result<()> {
        self.run_step("remove", true, OnFailure::Warn, |c| c.remove.clone())
            .await
    }

    async fn configure_and_start_data_services(&self, target_users: Option<u32>) -> anyhow::Result<()> {
        let users = target_users.map(|u| u.to_string()).unwrap_or_default();
        info!(services = self.services.len(), target_users = ?target_users, "starting data services");
        self.run_step("start", false, OnFailure::Fail, |c| {
            Some(c.start.replace(USERS_PLACEHOLDER, &users))
        })
        .await
    }

    async fn is_up_data_services(&self) -> anyhow::Result<bool> {
        for service in &self.services {
            let output = self.run_on(service, "is up", &service.commands.is_up).await?;
            if !output.success() {
                info!(service = %service.instance.name, "data service is not up");
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn set_external_port_numbers(&self) -> anyhow::Result<()> {
        let mut registry = PortRegistry::new();
        for service in &self.services {
            let instance = &service.instance;
            let mut ports = BTreeMap::new();
            for protocol in instance.ports.keys() {
                ports.insert(protocol.clone(), instance.external_port_for(protocol)?);
            }
            registry.insert(instance.name.clone(), ports);
        }
        debug!(?registry, "external ports registered");
        match self.ports.write() {
            Ok(mut ports) => *ports = registry,
            Err(_) => bail!("port registry lock poisoned"),
        }
        Ok(())
    }

    async fn unregister_port_numbers(&self) -> anyhow::Result<()> {
        match self.ports.write() {
            Ok(mut ports) => ports.clear(),
            Err(_) => bail!("port registry lock poisoned"),
        }
        Ok(())
    }
}
