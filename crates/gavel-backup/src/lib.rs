//! gavel-backup — scale-exact snapshots of data-service storage.
//!
//! A backup is keyed by the scale target, NoSQL shard and replica counts,
//! image store type and relational engine. Destinations never merge
//! across keys: creating a backup purges the destination first.
//!
//! Services must be stopped while their directories are copied in either
//! direction. [`BackupManager::restore_backup`] stops them itself;
//! [`BackupManager::create_backup`] expects the caller to have done so.

pub mod error;
pub mod manager;

pub use error::{BackupError, BackupResult};
pub use manager::BackupManager;
