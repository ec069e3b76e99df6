//! gavel-services — what each data engine needs, and how services are
//! started and stopped.
//!
//! - **`engine`**: per-engine storage layout, ownership, compaction and
//!   backup probes, keyed by [`ServiceRole`](gavel_core::ServiceRole) and
//!   [`RelationalEngine`](gavel_core::RelationalEngine)
//! - **`managed`**: [`ManagedAppInstance`], an
//!   [`AppInstance`](gavel_core::AppInstance) whose lifecycle operations
//!   are shell commands from the harness config

pub mod engine;
pub mod managed;

pub use engine::{BackupLayout, DirPair, backup_available, run_compaction};
pub use managed::ManagedAppInstance;
