//! Parallel warm-up of the NoSQL store.
//!
//! One read-only query per NoSQL instance and logical probe, at most
//! `warm_up_concurrency` in flight. Individual failures are logged and
//! counted, never fatal.

use std::sync::Arc;

use gavel_core::config::NosqlConfig;
use gavel_core::{ServiceRole, TopologyView};
use gavel_remote::{RemoteExecutor, RemoteResult, StageLog};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::{NosqlError, NosqlResult};
use crate::shell::{eval, sibling_db};

/// `(database, collection)` pairs touched by warm-up.
pub const WARM_UP_PROBES: &[(&str, &str)] = &[
    ("auction", "auction"),
    ("bid", "bid"),
    ("attendanceRecord", "attendanceRecord"),
    ("imageInfo", "imageInfo"),
];

/// Counts of warm-up queries by outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WarmUpSummary {
    pub issued: usize,
    pub succeeded: usize,
    pub failed: usize,
}

struct Probe {
    target: String,
    command: String,
}

pub struct WarmUpRunner {
    executor: Arc<dyn RemoteExecutor>,
    config: NosqlConfig,
}

impl WarmUpRunner {
    pub fn new(executor: Arc<dyn RemoteExecutor>, config: NosqlConfig) -> Self {
        Self { executor, config }
    }

    /// Run every probe against every NoSQL instance in `view` and wait for
    /// all of them.
    pub async fn warm_up(&self, view: &TopologyView, log: &StageLog) -> NosqlResult<WarmUpSummary> {
        let probes = self.probes(view)?;
        let semaphore = Arc::new(Semaphore::new(self.config.warm_up_concurrency.max(1)));
        let mut tasks: JoinSet<(Probe, RemoteResult<i32>)> = JoinSet::new();
        let mut summary = WarmUpSummary::default();

        for probe in probes {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| NosqlError::Worker(e.to_string()))?;
            let executor = Arc::clone(&self.executor);
            let host = self.config.shell_host.clone();
            summary.issued += 1;
            tasks.spawn(async move {
                let result = executor.run(&host, &probe.command).await.map(|o| o.exit_code);
                drop(permit);
                (probe, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (probe, result) = match joined {
                Ok(done) => done,
                Err(e) => {
                    warn!(error = %e, "warm-up task panicked");
                    summary.failed += 1;
                    continue;
                }
            };
            log.command(&self.config.shell_host, &probe.command);
            match result {
                Ok(0) => {
                    summary.succeeded += 1;
                    debug!(target = %probe.target, "warm-up query finished");
                }
                Ok(code) => {
                    summary.failed += 1;
                    log.line(format!("(exit status {code})"));
                    warn!(target = %probe.target, exit = code, "warm-up query failed");
                }
                Err(e) => {
                    summary.failed += 1;
                    log.line(format!("error: {e}"));
                    warn!(target = %probe.target, error = %e, "warm-up query failed");
                }
            }
        }

        log.line(format!(
            "warm-up: {} issued, {} succeeded, {} failed",
            summary.issued, summary.succeeded, summary.failed
        ));
        info!(issued = summary.issued, failed = summary.failed, "NoSQL warm-up complete");
        Ok(summary)
    }

    fn probes(&self, view: &TopologyView) -> NosqlResult<Vec<Probe>> {
        let mut probes = Vec::new();
        for instance in view.require(ServiceRole::Nosql)? {
            let target = instance.endpoint(&self.config.protocol)?;
            for (database, collection) in WARM_UP_PROBES {
                let script = format!("{}.{collection}.find().itcount()", sibling_db(database));
                probes.push(Probe {
                    command: eval(&self.config, &target, &script),
                    target: target.clone(),
                });
            }
        }
        Ok(probes)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use gavel_core::{DataServiceInstance, PortBinding, ReplicaRole};
    use gavel_remote::{CommandOutput, RecordingExecutor};

    use super::*;

    fn view() -> TopologyView {
        let instances = ["m1", "m2"]
            .iter()
            .map(|name| {
                let mut ports = BTreeMap::new();
                ports.insert("mongod".to_string(), PortBinding::same(27017));
                DataServiceInstance {
                    name: name.to_string(),
                    role: ServiceRole::Nosql,
                    host: name.to_string(),
                    ports,
                    engine: None,
                    shard_index: 0,
                    replica_role: ReplicaRole::Primary,
                }
            })
            .collect();
        TopologyView::from_instances(instances, 0, 0)
    }

    #[tokio::test]
    async fn one_query_per_instance_and_probe() {
        let dir = tempfile::tempdir().unwrap();
        let log = StageLog::create(dir.path(), "warmUp").unwrap();
        let exec = Arc::new(RecordingExecutor::new());
        let runner = WarmUpRunner::new(exec.clone(), NosqlConfig::default());
        let summary = runner.warm_up(&view(), &log).await.unwrap();
        assert_eq!(summary.issued, 2 * WARM_UP_PROBES.len());
        assert_eq!(summary.succeeded, summary.issued);
        assert_eq!(exec.count("--host m2:27017"), WARM_UP_PROBES.len());
    }

    #[tokio::test]
    async fn failures_are_counted_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let log = StageLog::create(dir.path(), "warmUp").unwrap();
        let exec = Arc::new(RecordingExecutor::new());
        exec.respond("getSiblingDB(\"bid\")", CommandOutput::failed(1, "timeout"));
        let config = NosqlConfig {
            warm_up_concurrency: 2,
            ..NosqlConfig::default()
        };
        let summary = WarmUpRunner::new(exec.clone(), config)
            .warm_up(&view(), &log)
            .await
            .unwrap();
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.succeeded, summary.issued - 2);
    }

    #[tokio::test]
    async fn no_nosql_instances_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let log = StageLog::create(dir.path(), "warmUp").unwrap();
        let runner = WarmUpRunner::new(Arc::new(RecordingExecutor::new()), NosqlConfig::default());
        let empty = TopologyView::from_instances(Vec::new(), 0, 0);
        assert!(runner.warm_up(&empty, &log).await.is_err());
    }
}
