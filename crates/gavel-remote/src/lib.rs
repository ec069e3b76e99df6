//! gavel-remote — running commands on the benchmark fleet.
//!
//! Every cluster-configuration, backup, and loader step is a shell command
//! on some named host. This crate provides the [`RemoteExecutor`] seam and
//! its implementations, plus the two pieces of plumbing every stage shares:
//! a per-stage log file and a fixed-delay poll loop that can be bounded and
//! cancelled.
//!
//! # Architecture
//!
//! ```text
//! RemoteExecutor (trait)
//!   ├── SshExecutor        multiplexed ssh sessions, local hosts via sh -c
//!   ├── LocalExecutor      sh -c on this machine
//!   └── RecordingExecutor  records commands, serves scripted output
//!
//! StageLog                 <log_dir>/<stage>.log, command lines + output
//! poll_until               sleep → probe → Ready | TimedOut | Cancelled
//! ```

pub mod error;
pub mod exec;
pub mod poll;
pub mod recording;
pub mod stage_log;

pub use error::{RemoteError, RemoteResult};
pub use exec::{CommandOutput, LocalExecutor, RemoteExecutor, SshExecutor, run_logged};
pub use poll::{CancelSignal, PollOutcome, PollSchedule, poll_until};
pub use recording::{RecordedCommand, RecordingExecutor};
pub use stage_log::StageLog;
