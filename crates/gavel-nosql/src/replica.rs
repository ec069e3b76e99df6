//! Replica sync barrier.
//!
//! Polls the replica-set status on the primary until every member reports
//! the same operation-log timestamp. The poll interval, deadline and
//! cancellation come from [`PollSchedule`] and [`CancelSignal`]; without a
//! deadline the barrier waits as long as replication takes, but gives up
//! with an error once [`MAX_SILENT_POLLS`] replies in a row carry no
//! member optimes.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use gavel_core::config::NosqlConfig;
use gavel_remote::{CancelSignal, PollOutcome, PollSchedule, RemoteExecutor, StageLog, poll_until, run_logged};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::{NosqlError, NosqlResult};
use crate::shell::eval;

/// How a sync wait ended; `Ready` carries no value.
pub type SyncOutcome = PollOutcome<()>;

/// Consecutive status polls without any member optime before giving up.
pub const MAX_SILENT_POLLS: u32 = 5;

/// Every member's `(seconds, increment)` optime, in status order.
///
/// Matches both `"optime" : Timestamp(a, b)` and the nested
/// `"optime" : { "ts" : Timestamp(a, b), ... }` form; `optimeDate` and
/// `optimeDurable` are ignored.
pub fn parse_optimes(status: &str) -> NosqlResult<Vec<(u64, u64)>> {
    let optime_re = Regex::new(r#""optime"\s*:\s*(?:\{\s*"ts"\s*:\s*)?Timestamp\((\d+),\s*(\d+)\)"#)?;
    Ok(optime_re
        .captures_iter(status)
        .filter_map(|c| Some((c[1].parse().ok()?, c[2].parse().ok()?)))
        .collect())
}

/// In sync iff at least one member reported and all match the first.
pub fn members_in_sync(optimes: &[(u64, u64)]) -> bool {
    match optimes.split_first() {
        Some((first, rest)) => rest.iter().all(|t| t == first),
        None => false,
    }
}

/// Waits for a replica set to converge.
pub struct ReplicaSyncBarrier<'a> {
    executor: &'a dyn RemoteExecutor,
    config: &'a NosqlConfig,
    schedule: PollSchedule,
    cancel: Option<CancelSignal>,
}

impl<'a> ReplicaSyncBarrier<'a> {
    pub fn new(executor: &'a dyn RemoteExecutor, config: &'a NosqlConfig) -> Self {
        let schedule = PollSchedule::every(Duration::from_secs(config.sync_interval_secs))
            .with_deadline(config.sync_deadline_secs.map(Duration::from_secs));
        Self {
            executor,
            config,
            schedule,
            cancel: None,
        }
    }

    pub fn with_schedule(mut self, schedule: PollSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Poll `rs.status()` on `target` (`host:port` of the primary) until in
    /// sync.
    pub async fn wait_for_sync(&self, target: &str, log: &StageLog) -> NosqlResult<SyncOutcome> {
        let command = eval(self.config, target, "rs.status()");
        log.line(format!("waiting for replica set on {target} to sync"));

        let silent = AtomicU32::new(0);
        let outcome = poll_until(self.schedule, self.cancel.clone(), |attempt| {
            let command = command.as_str();
            let silent = &silent;
            async move {
                let optimes = self.read_optimes(attempt, command, log).await;
                if optimes.is_empty() {
                    let streak = silent.fetch_add(1, Ordering::Relaxed) + 1;
                    return (streak >= MAX_SILENT_POLLS).then_some(false);
                }
                silent.store(0, Ordering::Relaxed);
                debug!(attempt, members = optimes.len(), ?optimes, "replica optimes");
                members_in_sync(&optimes).then_some(true)
            }
        })
        .await;

        match outcome {
            PollOutcome::Ready { value: true, attempts } => {
                log.line(format!("replica set in sync after {attempts} polls"));
                info!(%target, attempts, "replica set in sync");
                Ok(PollOutcome::Ready { value: (), attempts })
            }
            PollOutcome::Ready { value: false, attempts } => {
                log.line(format!("no member optimes in {MAX_SILENT_POLLS} status replies, giving up"));
                warn!(%target, attempts, "replica status unreadable");
                Err(NosqlError::NoReplicaStatus {
                    target: target.to_string(),
                    polls: MAX_SILENT_POLLS,
                })
            }
            PollOutcome::TimedOut { attempts } => {
                log.line(format!("replica set not in sync after {attempts} polls, giving up"));
                warn!(%target, attempts, "replica sync timed out");
                Ok(PollOutcome::TimedOut { attempts })
            }
            PollOutcome::Cancelled { attempts } => {
                log.line(format!("replica sync cancelled after {attempts} polls"));
                warn!(%target, attempts, "replica sync cancelled");
                Ok(PollOutcome::Cancelled { attempts })
            }
        }
    }

    /// Member optimes from one status poll; empty if none could be read.
    async fn read_optimes(&self, attempt: u32, command: &str, log: &StageLog) -> Vec<(u64, u64)> {
        let output = match run_logged(self.executor, log, &self.config.shell_host, command).await {
            Ok(output) => output,
            Err(e) => {
                warn!(attempt, error = %e, "replica status probe failed");
                return Vec::new();
            }
        };
        parse_optimes(&output.stdout).unwrap_or_else(|e| {
            warn!(attempt, error = %e, "cannot parse replica status");
            Vec::new()
        })
    }
}
