//! Readiness check: is the data for a target already loaded?

use gavel_core::scale::SizingPath;
use gavel_core::{HarnessConfig, ScaleTarget, TopologyView};
use gavel_remote::{RemoteExecutor, StageLog, run_logged};
use tracing::info;

use crate::args::{ToolArgs, ToolMode};
use crate::error::LoaderResult;

/// Runs the verifier in check-only mode. Idempotent and side-effect free.
pub struct ReadinessChecker<'a> {
    executor: &'a dyn RemoteExecutor,
    config: &'a HarnessConfig,
}

impl<'a> ReadinessChecker<'a> {
    pub fn new(executor: &'a dyn RemoteExecutor, config: &'a HarnessConfig) -> Self {
        Self { executor, config }
    }

    /// Flags the check runs with for `target` and a run of `users`.
    ///
    /// The auction count is not floored here, unlike load and prepare.
    pub fn args(&self, target: ScaleTarget, users: u32, view: &TopologyView) -> ToolArgs {
        let workload = &self.config.workload;
        let auctions = workload.sizing().auctions(target, users, SizingPath::Check);
        ToolArgs::for_view(ToolMode::Check, target, view, workload.duration_floor()).with_auctions(auctions)
    }

    /// `true` iff the verifier exits 0.
    pub async fn is_loaded(
        &self,
        target: ScaleTarget,
        users: u32,
        view: &TopologyView,
        log: &StageLog,
    ) -> LoaderResult<bool> {
        let command = self.args(target, users, view).command(&self.config.loader);
        let output = run_logged(self.executor, log, &self.config.loader.host, &command).await?;
        let loaded = output.success();
        log.line(format!(
            "data for {target} {}",
            if loaded { "is loaded" } else { "is not loaded" }
        ));
        info!(%target, loaded, "readiness check");
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use gavel_remote::{CommandOutput, RecordingExecutor};

    use super::*;

    pub(crate) fn config() -> HarnessConfig {
        HarnessConfig::from_toml_str(
            r#"
[workload]
ramp_up_secs = 60
steady_state_secs = 300
ramp_down_secs = 60

[loader]
host = "driver"
working_dir = "/opt/loader"
loader_command = "dbLoader"
prep_command = "dbPrep"
process_marker = "dbLoader"
item_catalog = "items.json"
"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn exit_status_decides() {
        let dir = tempfile::tempdir().unwrap();
        let log = StageLog::create(dir.path(), "isDataLoaded").unwrap();
        let config = config();
        let view = TopologyView::from_instances(Vec::new(), 0, 0);

        let exec = RecordingExecutor::new();
        let checker = ReadinessChecker::new(&exec, &config);
        assert!(checker.is_loaded(ScaleTarget::Users(60), 60, &view, &log).await.unwrap());
        assert_eq!(exec.calls()[0].host, "driver");
        assert_eq!(
            exec.calls()[0].command,
            "cd /opt/loader && dbPrep -a 4 -m 0 -p 0 -f 420 -u 60 -c"
        );

        exec.respond("-c", CommandOutput::failed(1, "missing auctions"));
        assert!(!checker.is_loaded(ScaleTarget::Users(60), 60, &view, &log).await.unwrap());
    }

    #[test]
    fn check_path_does_not_floor_auctions() {
        let config = config();
        let exec = RecordingExecutor::new();
        let view = TopologyView::from_instances(Vec::new(), 0, 0);
        let args = ReadinessChecker::new(&exec, &config).args(ScaleTarget::Users(16), 16, &view);
        assert_eq!(args.auctions, 2);
    }

    #[test]
    fn scale_target_ignores_users() {
        let config = config();
        let exec = RecordingExecutor::new();
        let view = TopologyView::from_instances(Vec::new(), 0, 0);
        let checker = ReadinessChecker::new(&exec, &config);
        let a = checker.args(ScaleTarget::Scale(1), 16, &view);
        let b = checker.args(ScaleTarget::Scale(1), 9000, &view);
        assert_eq!(a, b);
        assert_eq!(a.auctions, 67);
    }
}
