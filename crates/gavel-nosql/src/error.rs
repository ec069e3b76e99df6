use gavel_core::CoreError;
use gavel_remote::RemoteError;
use thiserror::Error;

pub type NosqlResult<T> = Result<T, NosqlError>;

#[derive(Debug, Error)]
pub enum NosqlError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("replica status on {target} showed no members in {polls} polls")]
    NoReplicaStatus { target: String, polls: u32 },

    #[error("warm-up worker failed: {0}")]
    Worker(String),
}
