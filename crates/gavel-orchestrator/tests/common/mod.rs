//! A fake benchmark fleet for orchestrator scenarios.
//!
//! Commands are interpreted just enough to model two facts about the
//! remote hosts: whether the dataset is loaded and whether a backup of it
//! exists. Everything is recorded in order.

#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use gavel_core::HarnessConfig;
use gavel_orchestrator::Orchestrator;
use gavel_remote::{CommandOutput, RecordedCommand, RemoteExecutor, RemoteResult};
use gavel_services::ManagedAppInstance;
use tempfile::TempDir;

#[derive(Debug, Default)]
struct FleetState {
    data_loaded: bool,
    backup_present: bool,
    loader_launched: bool,
    failing: Vec<String>,
    calls: Vec<RecordedCommand>,
}

#[derive(Debug, Default)]
pub struct FakeFleet {
    state: Mutex<FleetState>,
}

const IN_SYNC_STATUS: &str = r#"{ "set" : "auction0", "members" : [
  { "_id" : 0, "optime" : { "ts" : Timestamp(1700000000, 4), "t" : NumberLong(1) } },
  { "_id" : 1, "optime" : { "ts" : Timestamp(1700000000, 4), "t" : NumberLong(1) } } ] }"#;

impl FakeFleet {
    pub fn with_data(self, loaded: bool) -> Self {
        self.lock().data_loaded = loaded;
        self
    }

    pub fn with_backup(self, present: bool) -> Self {
        self.lock().backup_present = present;
        self
    }

    pub fn set_data_loaded(&self, loaded: bool) {
        self.lock().data_loaded = loaded;
    }

    /// Commands ending with `suffix` exit 1.
    pub fn fail_on(&self, suffix: &str) {
        self.lock().failing.push(suffix.to_string());
    }

    pub fn commands(&self) -> Vec<String> {
        self.lock().calls.iter().map(|c| c.command.clone()).collect()
    }

    pub fn calls(&self) -> Vec<RecordedCommand> {
        self.lock().calls.clone()
    }

    pub fn count(&self, pattern: &str) -> usize {
        self.commands().iter().filter(|c| c.contains(pattern)).count()
    }

    pub fn first(&self, pattern: &str) -> Option<usize> {
        self.commands().iter().position(|c| c.contains(pattern))
    }

    pub fn last(&self, pattern: &str) -> Option<usize> {
        self.commands().iter().rposition(|c| c.contains(pattern))
    }

    pub fn find(&self, pattern: &str) -> Vec<String> {
        self.commands().into_iter().filter(|c| c.contains(pattern)).collect()
    }

    /// Readiness checks (`… -c`) issued, in order.
    pub fn checks(&self) -> Vec<usize> {
        self.commands()
            .iter()
            .enumerate()
            .filter(|(_, c)| c.ends_with(" -c"))
            .map(|(i, _)| i)
            .collect()
    }

    /// Every command containing `pattern` ran while the relational service
    /// was stopped.
    pub fn ran_while_stopped(&self, pattern: &str) -> bool {
        let commands = self.commands();
        commands.iter().enumerate().filter(|(_, c)| c.contains(pattern)).all(|(i, _)| {
            let before = &commands[..i];
            let stop = before.iter().rposition(|c| c == "pg-stop");
            let start = before.iter().rposition(|c| c.starts_with("pg-start"));
            match (stop, start) {
                (Some(stop), Some(start)) => stop > start,
                (Some(_), None) => true,
                _ => false,
            }
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FleetState> {
        self.state.lock().unwrap()
    }

    fn interpret(&self, host: &str, command: &str) -> CommandOutput {
        let mut state = self.lock();
        state.calls.push(RecordedCommand {
            host: host.to_string(),
            command: command.to_string(),
        });
        if state.failing.iter().any(|s| command.ends_with(s.as_str())) {
            return CommandOutput::failed(1, "scripted failure");
        }

        if command.contains("nohup") {
            state.loader_launched = true;
            state.data_loaded = true;
            return CommandOutput::ok("");
        }
        if command.starts_with("ps -eo") {
            return if state.loader_launched {
                CommandOutput::ok("4242 dbLoader -u 125\n")
            } else {
                CommandOutput::failed(1, "")
            };
        }
        if command.ends_with(" -c") {
            return if state.data_loaded {
                CommandOutput::ok("all data present")
            } else {
                CommandOutput::failed(1, "not loaded")
            };
        }
        if command.starts_with("test -d") {
            return if state.backup_present {
                CommandOutput::ok("")
            } else {
                CommandOutput::failed(1, "")
            };
        }
        if command.starts_with("clear-data") {
            state.data_loaded = false;
            return CommandOutput::ok("");
        }
        if let Some(copy) = command.split("cp -a ").nth(1) {
            let source = copy.split_whitespace().next().unwrap_or_default();
            if source.contains("Backup") {
                if state.backup_present {
                    state.data_loaded = true;
                }
            } else if state.data_loaded {
                state.backup_present = true;
            }
            return CommandOutput::ok("");
        }
        if command.contains("rs.status()") {
            return CommandOutput::ok(IN_SYNC_STATUS);
        }
        CommandOutput::ok("")
    }
}

#[async_trait]
impl RemoteExecutor for FakeFleet {
    async fn run(&self, host: &str, command: &str) -> RemoteResult<CommandOutput> {
        Ok(self.interpret(host, command))
    }

    async fn stream(
        &self,
        host: &str,
        command: &str,
        on_line: &mut (dyn for<'l> FnMut(&'l str) + Send),
    ) -> RemoteResult<i32> {
        let output = self.interpret(host, command);
        for line in output.stdout.lines() {
            on_line(line);
        }
        Ok(output.exit_code)
    }
}

pub fn config_toml(log_dir: &Path, shards: u32, replicas: u32) -> String {
    format!(
        r#"
[workload]
ramp_up_secs = 60
steady_state_secs = 300
ramp_down_secs = 60
image_store_type = "filesystem"

[loader]
host = "driver"
working_dir = "/opt/loader"
loader_command = "dbLoader"
prep_command = "dbPrep"
process_marker = "dbLoader"
item_catalog = "items.json"
discovery_grace_secs = 0

[nosql]
router = "router:27017"
settle_secs = 0
sync_interval_secs = 0

[logging]
dir = "{dir}"

[app]
num_nosql_shards = {shards}
num_nosql_replicas = {replicas}

[[services]]
name = "pg"
role = "relational"
engine = "postgresql"
host = "db1"
ports = {{ postgresql = {{ internal = 5432, external = 5432 }} }}
[services.commands]
start = "pg-start --users={{users}}"
stop = "pg-stop"
is_up = "pg-isup"
clear_before_start = "clear-data pg"
cleanup = "pg-cleanup"
remove = "pg-remove"

[[services]]
name = "mongo1"
role = "nosql"
host = "m1"
ports = {{ mongod = {{ internal = 27017, external = 27017 }} }}
[services.commands]
start = "mongo-start"
stop = "mongo-stop"
is_up = "mongo-isup"
clear_before_start = "clear-data mongo"

[[services]]
name = "mongo2"
role = "nosql"
host = "m2"
shard_index = 1
replica_role = "secondary"
ports = {{ mongod = {{ internal = 27017, external = 27017 }} }}
[services.commands]
start = "mongo-start"
stop = "mongo-stop"
is_up = "mongo-isup"

[[services]]
name = "images"
role = "file"
host = "fs1"
[services.commands]
start = "fs-start"
stop = "fs-stop"
is_up = "fs-isup"
"#,
        dir = log_dir.display()
    )
}

/// A configured fleet, its application instance and a log directory.
pub struct Harness {
    pub config: HarnessConfig,
    pub fleet: Arc<FakeFleet>,
    pub app: ManagedAppInstance,
    pub logs: TempDir,
}

impl Harness {
    pub fn new(fleet: FakeFleet, shards: u32, replicas: u32) -> Self {
        let logs = tempfile::tempdir().unwrap();
        let config = HarnessConfig::from_toml_str(&config_toml(logs.path(), shards, replicas)).unwrap();
        Self::from_config(fleet, config, logs)
    }

    pub fn from_config(fleet: FakeFleet, config: HarnessConfig, logs: TempDir) -> Self {
        let fleet = Arc::new(fleet);
        let app = ManagedAppInstance::from_config(&config, fleet.clone()).unwrap();
        Self {
            config,
            fleet,
            app,
            logs,
        }
    }

    pub fn orchestrator(&self) -> Orchestrator<'_> {
        Orchestrator::new(&self.app, self.fleet.clone(), &self.config)
    }

    pub fn stage_log(&self, stage: &str) -> String {
        std::fs::read_to_string(self.logs.path().join(format!("{stage}.log"))).unwrap()
    }
}
