//! Everything a subcommand needs: configuration, executor, application
//! instance and the shutdown signal.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use gavel_core::{HarnessConfig, RunRequest, ScaleTarget};
use gavel_orchestrator::Orchestrator;
use gavel_remote::{CancelSignal, CommandOutput, RecordingExecutor, RemoteExecutor, SshExecutor};
use gavel_services::ManagedAppInstance;
use tracing::info;

use crate::TargetArgs;

/// Replica status served during dry runs: one member, trivially in sync.
const DRY_RUN_REPLICA_STATUS: &str = r#"{ "members" : [ { "optime" : Timestamp(0, 0) } ] }"#;

pub struct Context {
    pub config: HarnessConfig,
    pub app: ManagedAppInstance,
    executor: Arc<dyn RemoteExecutor>,
    recorder: Option<Arc<RecordingExecutor>>,
    cancel: CancelSignal,
}

impl Context {
    pub fn load(path: &Path, dry_run: bool, ssh_user: Option<String>, cancel: CancelSignal) -> anyhow::Result<Self> {
        let config = HarnessConfig::from_file(path)
            .with_context(|| format!("loading harness config {}", path.display()))?;

        let recorder = dry_run.then(|| {
            let recorder = RecordingExecutor::new();
            recorder.respond("rs.status()", CommandOutput::ok(DRY_RUN_REPLICA_STATUS));
            Arc::new(recorder)
        });
        let executor: Arc<dyn RemoteExecutor> = match &recorder {
            Some(recorder) => recorder.clone(),
            None => Arc::new(SshExecutor::new(ssh_user).with_local_host(config.nosql.shell_host.clone())),
        };

        let app = ManagedAppInstance::from_config(&config, Arc::clone(&executor))?;
        info!(
            config = %path.display(),
            services = config.services.len(),
            dry_run,
            "harness ready"
        );
        Ok(Self {
            config,
            app,
            executor,
            recorder,
            cancel,
        })
    }

    pub fn orchestrator(&self) -> Orchestrator<'_> {
        Orchestrator::new(&self.app, Arc::clone(&self.executor), &self.config).with_cancel(self.cancel.clone())
    }

    /// The request a bare target selects, before any flags.
    pub fn request(&self, target: &TargetArgs) -> RunRequest {
        request_for(target, &self.config)
    }

    pub fn target(&self, target: &TargetArgs) -> ScaleTarget {
        let request = self.request(target);
        self.config.workload.target(request.scale, request.users)
    }

    /// In a dry run, list the commands that would have run.
    pub fn print_dry_run(&self) {
        let Some(recorder) = &self.recorder else {
            return;
        };
        for call in recorder.calls() {
            println!("[{}] $ {}", call.host, call.command);
        }
    }
}

/// Command-line target over `[workload]` defaults.
pub fn request_for(target: &TargetArgs, config: &HarnessConfig) -> RunRequest {
    let users = target.users.unwrap_or(config.workload.users);
    let scale = match (target.scale, target.users) {
        (Some(scale), _) => i64::from(scale),
        (None, Some(_)) => -1,
        (None, None) => config.workload.scale,
    };
    RunRequest {
        users,
        scale,
        flags: Default::default(),
    }
}
