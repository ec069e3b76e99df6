//! gavel-nosql — bringing the NoSQL cluster into shape for a run.
//!
//! - **`configurator`**: adds shards or builds a replica set, depending on
//!   the `(shards, replicas)` counts of the application
//! - **`replica`**: blocks until every replica-set member reports the same
//!   operation-log timestamp
//! - **`warmup`**: concurrent read-only queries that pull hot collections
//!   into memory before a timed run
//!
//! All commands go through the NoSQL shell on `nosql.shell_host`.

pub mod configurator;
pub mod error;
pub mod replica;
pub mod shell;
pub mod warmup;

pub use configurator::ClusterConfigurator;
pub use error::{NosqlError, NosqlResult};
pub use replica::{MAX_SILENT_POLLS, ReplicaSyncBarrier, SyncOutcome, members_in_sync, parse_optimes};
pub use warmup::{WarmUpRunner, WarmUpSummary};
