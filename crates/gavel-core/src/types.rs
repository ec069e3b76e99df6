//! Domain types for the gavel harness.
//!
//! These describe the data services backing one auction application
//! instance, the backup key that decides whether a saved copy of the data
//! is usable, and the per-run request handed to the orchestrator.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

// ── Roles and engines ─────────────────────────────────────────────

/// The role a data service plays for the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceRole {
    /// Relational database (PostgreSQL or MySQL).
    Relational,
    /// Document store (MongoDB), possibly sharded or replicated.
    Nosql,
    /// Blob/file store holding auction images.
    File,
}

impl fmt::Display for ServiceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Relational => write!(f, "relational"),
            Self::Nosql => write!(f, "nosql"),
            Self::File => write!(f, "file"),
        }
    }
}

/// Supported relational engines.
///
/// Engine-specific behavior (directories, ownership, compaction, backup
/// probes) hangs off this enum rather than string comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationalEngine {
    #[serde(rename = "postgresql")]
    Postgres,
    #[serde(rename = "mysql")]
    MySql,
}

impl RelationalEngine {
    /// Short name used in paths and log lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgresql",
            Self::MySql => "mysql",
        }
    }

    /// Whether bulk writes leave dead tuples that must be vacuumed.
    pub fn requires_compaction(&self) -> bool {
        matches!(self, Self::Postgres)
    }

    /// OS user that must own the engine's data and log directories.
    pub fn owner(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres:postgres",
            Self::MySql => "mysql:mysql",
        }
    }
}

impl fmt::Display for RelationalEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationalEngine {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgresql" | "postgres" => Ok(Self::Postgres),
            "mysql" => Ok(Self::MySql),
            other => Err(CoreError::UnknownEngine(other.to_string())),
        }
    }
}

/// Where auction images are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageStoreType {
    /// Images live on a file-store service's local disk.
    Filesystem,
    /// Images live in the NoSQL image collections.
    #[default]
    Mongodb,
    /// Images are generated in memory and never persisted.
    Memory,
}

impl ImageStoreType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Filesystem => "filesystem",
            Self::Mongodb => "mongodb",
            Self::Memory => "memory",
        }
    }

    /// Whether backups must also cover the blob directory.
    pub fn is_filesystem(&self) -> bool {
        matches!(self, Self::Filesystem)
    }
}

impl fmt::Display for ImageStoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Replica-set membership of a NoSQL instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplicaRole {
    #[default]
    Primary,
    Secondary,
}

// ── Data service instances ─────────────────────────────────────────

/// Internal (container-side) and external (host-side) port for a protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortBinding {
    pub internal: u16,
    pub external: u16,
}

impl PortBinding {
    /// A binding whose internal and external ports are identical.
    pub fn same(port: u16) -> Self {
        Self {
            internal: port,
            external: port,
        }
    }
}

/// One running instance of a data engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataServiceInstance {
    pub name: String,
    pub role: ServiceRole,
    /// Host the instance runs on (ssh destination).
    pub host: String,
    /// Protocol name → bound ports.
    pub ports: BTreeMap<String, PortBinding>,
    /// Set for relational instances only.
    pub engine: Option<RelationalEngine>,
    /// Shard index for NoSQL instances; also names replica sets.
    pub shard_index: u32,
    pub replica_role: ReplicaRole,
}

impl DataServiceInstance {
    pub fn host_identity(&self) -> &str {
        &self.host
    }

    /// Internal port bound for `protocol`.
    pub fn port_for(&self, protocol: &str) -> CoreResult<u16> {
        self.binding(protocol).map(|b| b.internal)
    }

    /// Externally visible port bound for `protocol`.
    pub fn external_port_for(&self, protocol: &str) -> CoreResult<u16> {
        self.binding(protocol).map(|b| b.external)
    }

    /// `host:port` for the internal port of `protocol`.
    pub fn endpoint(&self, protocol: &str) -> CoreResult<String> {
        Ok(format!("{}:{}", self.host, self.port_for(protocol)?))
    }

    pub fn engine_kind(&self) -> Option<RelationalEngine> {
        self.engine
    }

    pub fn shard_index(&self) -> u32 {
        self.shard_index
    }

    fn binding(&self, protocol: &str) -> CoreResult<PortBinding> {
        self.ports
            .get(protocol)
            .copied()
            .ok_or_else(|| CoreError::MissingPort {
                service: self.name.clone(),
                protocol: protocol.to_string(),
            })
    }
}

// ── Backups ────────────────────────────────────────────────────────

/// Identifies which saved dataset a backup directory holds.
///
/// A backup is only usable when every field matches the current target;
/// mismatched shapes are never substituted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BackupKey {
    /// The explicit scale, or the effective max users when no scale is set.
    pub scale_key: u32,
    pub shards: u32,
    pub replicas: u32,
    pub image_store: ImageStoreType,
    pub engine: RelationalEngine,
}

impl BackupKey {
    /// Directory segment for relational backups.
    pub fn relational_segment(&self) -> String {
        format!("{}-{}-{}", self.engine, self.image_store, self.scale_key)
    }

    /// Directory segment for NoSQL backups (shape-qualified).
    pub fn nosql_segment(&self) -> String {
        format!(
            "{}-{}-{}s-{}r",
            self.image_store, self.scale_key, self.shards, self.replicas
        )
    }

    /// Directory segment for file-store backups.
    pub fn file_segment(&self) -> String {
        self.scale_key.to_string()
    }
}

// ── Run requests ───────────────────────────────────────────────────

/// Operator flags controlling how data is prepared for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RunFlags {
    /// Drop everything and reload, even if data is present.
    pub reload_db: bool,
    /// Load data when it is missing and no backup matches.
    pub load_db: bool,
    /// Back up freshly loaded data.
    pub backup: bool,
    /// Back up unconditionally, replacing any existing backup.
    pub rebackup: bool,
}

/// The caller's request for one run.
///
/// The orchestrator never mutates shared configuration; it returns the
/// request to persist for the next run in a series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    pub users: u32,
    /// Explicit scale; negative means "derive from users".
    pub scale: i64,
    pub flags: RunFlags,
}

impl RunRequest {
    pub fn for_users(users: u32) -> Self {
        Self {
            users,
            scale: -1,
            flags: RunFlags::default(),
        }
    }

    pub fn for_scale(scale: u32) -> Self {
        Self {
            users: 0,
            scale: i64::from(scale),
            flags: RunFlags::default(),
        }
    }

    pub fn with_flags(mut self, flags: RunFlags) -> Self {
        self.flags = flags;
        self
    }

    /// The request to use for the next run: one-shot flags cleared.
    pub fn after_run(&self) -> Self {
        Self {
            flags: RunFlags {
                reload_db: false,
                rebackup: false,
                ..self.flags
            },
            ..self.clone()
        }
    }
}
