//! Bulk data loading.
//!
//! The loader runs detached on the loader host. It may finish before we
//! look for it, so discovery is: wait the grace period, search the process
//! listing, and on a miss ask the verifier whether the data is already
//! there before searching once more. A found process has its log followed
//! until it exits. Afterwards relational instances are compacted, replicas
//! are synced, and the verifier has the final word. A loader given up on
//! (deadline or cancellation) is killed before the error is returned.

use std::time::Duration;

use gavel_core::{HarnessConfig, ScaleTarget, ServiceRole, TopologyView};
use gavel_nosql::ReplicaSyncBarrier;
use gavel_remote::{CancelSignal, RemoteExecutor, StageLog, run_logged};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::args::{ToolArgs, ToolMode};
use crate::error::{LoaderError, LoaderResult};
use crate::readiness::ReadinessChecker;

/// Progress ticks start with a wall-clock `HH:MM` prefix.
const PROGRESS_TICK: &str = r"^\d{2}:\d{2}";

/// Where discovery found the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Discovery {
    Running(u32),
    /// Not running, but the verifier says the data is loaded.
    AlreadyFinished,
}

pub struct BulkLoader<'a> {
    executor: &'a dyn RemoteExecutor,
    config: &'a HarnessConfig,
    grace: Duration,
    sync_barrier: Option<ReplicaSyncBarrier<'a>>,
    cancel: Option<CancelSignal>,
}

impl<'a> BulkLoader<'a> {
    pub fn new(executor: &'a dyn RemoteExecutor, config: &'a HarnessConfig) -> Self {
        Self {
            executor,
            config,
            grace: Duration::from_secs(config.loader.discovery_grace_secs),
            sync_barrier: None,
            cancel: None,
        }
    }

    /// Override the wait before looking for the loader process.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Use `barrier` instead of one built from the NoSQL config.
    pub fn with_sync_barrier(mut self, barrier: ReplicaSyncBarrier<'a>) -> Self {
        self.sync_barrier = Some(barrier);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn args(&self, target: ScaleTarget, view: &TopologyView) -> ToolArgs {
        ToolArgs::for_view(ToolMode::Load, target, view, self.config.workload.duration_floor())
    }

    /// Load data for `target`; `true` iff the verifier confirms it afterwards.
    pub async fn load(
        &self,
        target: ScaleTarget,
        users: u32,
        view: &TopologyView,
        log: &StageLog,
    ) -> LoaderResult<bool> {
        let loader = &self.config.loader;
        let checker = ReadinessChecker::new(self.executor, self.config);
        info!(%target, host = %loader.host, "loading data");

        let launch = self.args(target, view).background_command(loader);
        let output = run_logged(self.executor, log, &loader.host, &launch).await?;
        if !output.success() {
            return Err(LoaderError::LaunchFailed {
                host: loader.host.clone(),
                exit_code: output.exit_code,
                output: output.combined(),
            });
        }

        tokio::time::sleep(self.grace).await;
        match self.discover(&checker, target, users, view, log).await? {
            Discovery::Running(pid) => self.follow(pid, log).await?,
            Discovery::AlreadyFinished => {
                log.line("loader already finished, data verified");
            }
        }

        self.after_load(view, log).await?;

        let loaded = checker.is_loaded(target, users, view, log).await?;
        if loaded {
            info!(%target, "data loaded");
        } else {
            warn!(%target, "loader finished but data does not verify");
        }
        Ok(loaded)
    }

    async fn discover(
        &self,
        checker: &ReadinessChecker<'_>,
        target: ScaleTarget,
        users: u32,
        view: &TopologyView,
        log: &StageLog,
    ) -> LoaderResult<Discovery> {
        if let Some(pid) = self.find_process(log).await? {
            return Ok(Discovery::Running(pid));
        }
        log.line("loader process not found, checking whether data is already loaded");
        if checker.is_loaded(target, users, view, log).await? {
            return Ok(Discovery::AlreadyFinished);
        }
        match self.find_process(log).await? {
            Some(pid) => Ok(Discovery::Running(pid)),
            None => Err(LoaderError::ProcessNotFound {
                host: self.config.loader.host.clone(),
                marker: self.config.loader.process_marker.clone(),
            }),
        }
    }

    async fn find_process(&self, log: &StageLog) -> LoaderResult<Option<u32>> {
        let loader = &self.config.loader;
        let command = format!(
            "ps -eo pid,args | grep -F '{}' | grep -v grep",
            loader.process_marker
        );
        let output = run_logged(self.executor, log, &loader.host, &command).await?;
        let pid = parse_pid(&output.stdout);
        debug!(?pid, "loader process lookup");
        Ok(pid)
    }

    /// Stream the loader log until `pid` exits, dropping progress ticks.
    async fn follow(&self, pid: u32, log: &StageLog) -> LoaderResult<()> {
        let loader = &self.config.loader;
        let tick = Regex::new(PROGRESS_TICK)?;
        let command = format!("tail -n +1 -f --pid={pid} {}", loader.log_file);
        log.command(&loader.host, &command);
        info!(pid, "following loader log");

        let mut forwarded = 0usize;
        let mut on_line = |line: &str| {
            if !tick.is_match(line) {
                log.line(line);
                forwarded += 1;
            }
        };
        let stream = self.executor.stream(&loader.host, &command, &mut on_line);

        let deadline = loader.max_load_secs;
        let bounded = async {
            match deadline {
                Some(secs) => tokio::time::timeout(Duration::from_secs(secs), stream)
                    .await
                    .map_err(|_| LoaderError::TimedOut { secs, pid }),
                None => Ok(stream.await),
            }
        };
        let waited = match self.cancel.clone() {
            Some(mut cancel) => tokio::select! {
                result = bounded => result,
                Ok(_) = cancel.wait_for(|stop| *stop) => Err(LoaderError::Cancelled { pid }),
            },
            None => bounded.await,
        };
        let exit = match waited {
            Ok(exit) => exit?,
            Err(e) => {
                warn!(pid, error = %e, "giving up on loader");
                self.stop_loader(pid, log).await;
                return Err(e);
            }
        };

        log.line(format!("loader log closed (exit status {exit}), {forwarded} lines"));
        Ok(())
    }

    /// Best-effort kill of a loader nobody waits for any more.
    async fn stop_loader(&self, pid: u32, log: &StageLog) {
        let host = &self.config.loader.host;
        match run_logged(self.executor, log, host, &format!("kill {pid}")).await {
            Ok(output) if output.success() => log.line(format!("stopped loader pid {pid}")),
            Ok(output) => {
                log.line(format!("could not stop loader pid {pid}: {}", output.combined()));
                warn!(pid, exit_code = output.exit_code, "loader kill failed");
            }
            Err(e) => warn!(pid, error = %e, "loader kill failed"),
        }
    }

    async fn after_load(&self, view: &TopologyView, log: &StageLog) -> LoaderResult<()> {
        for instance in view.instances(ServiceRole::Relational) {
            gavel_services::run_compaction(self.executor, log, instance).await?;
        }

        if view.replication_active() {
            let nosql = &self.config.nosql;
            let entry = view.nosql_entry(nosql.router.as_deref(), &nosql.protocol)?;
            let outcome = match &self.sync_barrier {
                Some(barrier) => barrier.wait_for_sync(&entry, log).await,
                None => {
                    let barrier = ReplicaSyncBarrier::new(self.executor, nosql);
                    let barrier = match self.cancel.clone() {
                        Some(cancel) => barrier.with_cancel(cancel),
                        None => barrier,
                    };
                    barrier.wait_for_sync(&entry, log).await
                }
            };
            match outcome {
                Ok(outcome) if outcome.is_ready() => {}
                Ok(outcome) => warn!(attempts = outcome.attempts(), "continuing without replica sync"),
                Err(e) => warn!(error = %e, "continuing without replica sync"),
            }
        }
        Ok(())
    }
}

/// First PID in a `ps -eo pid,args` listing.
fn parse_pid(listing: &str) -> Option<u32> {
    listing
        .lines()
        .find_map(|line| line.split_whitespace().next()?.parse().ok())
}
