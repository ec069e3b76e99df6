//! Auction preparation and data cleanup.
//!
//! Preparation runs before every timed run, whatever branch got the data
//! in place, so auction start times line up with the run's ramp-up,
//! steady-state and ramp-down windows. Cleanup is the same tool with an
//! auction count of zero, followed by compaction.

use gavel_core::scale::SizingPath;
use gavel_core::{HarnessConfig, ScaleTarget, ServiceRole, TopologyView};
use gavel_remote::{RemoteExecutor, StageLog, run_logged};
use tracing::{info, warn};

use crate::args::{ToolArgs, ToolMode};
use crate::error::LoaderResult;

pub struct AuctionPreparer<'a> {
    executor: &'a dyn RemoteExecutor,
    config: &'a HarnessConfig,
}

impl<'a> AuctionPreparer<'a> {
    pub fn new(executor: &'a dyn RemoteExecutor, config: &'a HarnessConfig) -> Self {
        Self { executor, config }
    }

    /// Flags for preparing a run of `users` against `target`.
    pub fn args(&self, target: ScaleTarget, users: u32, view: &TopologyView) -> ToolArgs {
        let workload = &self.config.workload;
        ToolArgs::for_view(ToolMode::Prepare, target, view, workload.duration_floor())
            .with_auctions(workload.sizing().auctions(target, users, SizingPath::Load))
    }

    /// Prepare auctions for the run. `true` iff the tool exits 0.
    pub async fn prepare(
        &self,
        target: ScaleTarget,
        users: u32,
        view: &TopologyView,
        log: &StageLog,
    ) -> LoaderResult<bool> {
        let args = self.args(target, users, view);
        let auctions = args.auctions;
        let output = run_logged(
            self.executor,
            log,
            &self.config.loader.host,
            &args.command(&self.config.loader),
        )
        .await?;
        if output.success() {
            info!(%target, auctions, "auctions prepared");
        } else {
            warn!(%target, exit = output.exit_code, "auction preparation failed");
        }
        Ok(output.success())
    }

    /// Drop data added by earlier runs, then compact relational storage.
    pub async fn clean_data(&self, target: ScaleTarget, view: &TopologyView, log: &StageLog) -> LoaderResult<bool> {
        let args = ToolArgs::for_view(ToolMode::Prepare, target, view, self.config.workload.duration_floor())
            .with_auctions(0);
        let output = run_logged(
            self.executor,
            log,
            &self.config.loader.host,
            &args.command(&self.config.loader),
        )
        .await?;
        if !output.success() {
            warn!(%target, exit = output.exit_code, "data cleanup failed");
            return Ok(false);
        }

        for instance in view.instances(ServiceRole::Relational) {
            gavel_services::run_compaction(self.executor, log, instance).await?;
        }
        info!(%target, "data cleaned");
        Ok(true)
    }
}
