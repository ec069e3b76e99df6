//! gavel-loader — driving the external loader/verifier tool.
//!
//! The tool has three modes sharing one flag grammar (see [`args`]):
//! bulk load, auction preparation, and a check-only verification. The
//! verification is the single source of truth for "is the data there";
//! every other component asks [`ReadinessChecker`] rather than trusting
//! exit codes of earlier steps.
//!
//! ```text
//! ReadinessChecker  prep_command … -c           → bool
//! BulkLoader        nohup loader_command … &    → find pid → follow log
//!                   → compaction → replica sync → ReadinessChecker
//! AuctionPreparer   prep_command …              → prepared auctions
//!                   prep_command -a 0 …         → clean_data + compaction
//! ```

pub mod args;
pub mod bulk;
pub mod error;
pub mod prep;
pub mod readiness;

pub use args::{ToolArgs, ToolMode};
pub use bulk::BulkLoader;
pub use error::{LoaderError, LoaderResult};
pub use prep::AuctionPreparer;
pub use readiness::ReadinessChecker;
