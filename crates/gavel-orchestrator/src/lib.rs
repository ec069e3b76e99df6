//! gavel-orchestrator — the data lifecycle of one benchmark run.
//!
//! [`Orchestrator::prepare_data`] gets the data services into a state
//! where a timed run can start:
//!
//! ```text
//! reload_db ─► tear down ─► clear ─► start ─► clear ─► configure cluster ─► load
//! otherwise ─► start ─► loaded?  ─► clean
//!                       backup?  ─► restore
//!                       load_db? ─► tear down ─► clear ─► start ─► clear ─► configure ─► load
//!                       else     ─► DataMissing
//! then      ─► (re)backup? ─► prepare auctions ─► compact ─► replica sync ─► warm up ─► shut down
//! ```
//!
//! The returned [`RunReport`] carries the request to use for the next run
//! in a series, with one-shot flags cleared.

pub mod error;
pub mod lifecycle;

pub use error::{LifecycleError, LifecycleResult};
pub use lifecycle::{DataSource, Orchestrator, RunReport, stages};
