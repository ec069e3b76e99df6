//! gavel-core — shared vocabulary for the gavel data lifecycle harness.
//!
//! Everything the other crates agree on lives here: the data-service
//! records that make up an application instance, dataset sizing, backup
//! keys, the per-run request, and the TOML harness configuration.
//!
//! # Architecture
//!
//! ```text
//! HarnessConfig (gavel.toml)
//!   ├── WorkloadConfig ──► ScaleTarget / auctions_for / duration_floor
//!   ├── [[services]]   ──► DataServiceInstance (validated)
//!   └── [app]          ──► shard / replica counts
//!
//! AppInstance (trait, implemented elsewhere)
//!   └── TopologyView   ──► role lookups, NoSQL entry point, NosqlTopology
//! ```

pub mod config;
pub mod error;
pub mod scale;
pub mod topology;
pub mod types;

pub use config::HarnessConfig;
pub use error::{CoreError, CoreResult};
pub use scale::{ScaleTarget, auctions_for, duration_floor, effective_max_users};
pub use topology::{AppInstance, NosqlTopology, TopologyView};
pub use types::*;
