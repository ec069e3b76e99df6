//! Remote execution error types.

use thiserror::Error;

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Failures to run a command at all.
///
/// A command that runs and exits non-zero is not an error; callers inspect
/// [`CommandOutput`](crate::CommandOutput) for that.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("failed to open ssh session to {host}: {message}")]
    Connect { host: String, message: String },

    #[error("failed to run command on {host}: {message} (command: {command})")]
    Spawn {
        host: String,
        command: String,
        message: String,
    },

    #[error("failed to read output of command on {host}: {source}")]
    Output {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open stage log {path}: {source}")]
    StageLog {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
