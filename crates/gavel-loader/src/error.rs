use gavel_core::CoreError;
use gavel_remote::RemoteError;
use thiserror::Error;

pub type LoaderResult<T> = Result<T, LoaderError>;

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("failed to launch loader on {host} (exit {exit_code}): {output}")]
    LaunchFailed {
        host: String,
        exit_code: i32,
        output: String,
    },

    #[error("loader process matching '{marker}' not found on {host} and data is not loaded")]
    ProcessNotFound { host: String, marker: String },

    #[error("loader (pid {pid}) still running after {secs}s; sent it a kill")]
    TimedOut { secs: u64, pid: u32 },

    #[error("load cancelled; sent loader pid {pid} a kill")]
    Cancelled { pid: u32 },
}
