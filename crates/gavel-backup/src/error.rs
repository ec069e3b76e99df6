use gavel_core::CoreError;
use gavel_remote::RemoteError;
use thiserror::Error;

pub type BackupResult<T> = Result<T, BackupError>;

#[derive(Debug, Error)]
pub enum BackupError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("backup command failed on {host} (exit {exit_code}): {command}")]
    CommandFailed {
        host: String,
        command: String,
        exit_code: i32,
    },

    #[error(transparent)]
    Services(#[from] anyhow::Error),
}
