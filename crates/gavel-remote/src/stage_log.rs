//! Per-stage log files.
//!
//! Each operation writes one human-readable file in the configured log
//! directory. Command lines and their complete output go here; the
//! console only gets a one-line summary per stage.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::warn;

use crate::error::{RemoteError, RemoteResult};
use crate::exec::CommandOutput;

/// An open log file for one stage of the lifecycle.
#[derive(Debug)]
pub struct StageLog {
    stage: String,
    path: PathBuf,
    file: Mutex<File>,
}

impl StageLog {
    /// Create (truncating) `<dir>/<stage>.log`.
    pub fn create(dir: &Path, stage: &str) -> RemoteResult<Self> {
        let path = dir.join(format!("{stage}.log"));
        let open = || -> std::io::Result<File> {
            fs::create_dir_all(dir)?;
            File::create(&path)
        };
        let file = open().map_err(|source| RemoteError::StageLog {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self {
            stage: stage.to_string(),
            path,
            file: Mutex::new(file),
        })
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one line.
    pub fn line(&self, text: impl AsRef<str>) {
        let Ok(mut file) = self.file.lock() else {
            return;
        };
        if let Err(e) = writeln!(file, "{}", text.as_ref()) {
            warn!(stage = %self.stage, error = %e, "failed to write stage log");
        }
    }

    /// Record a command about to run on `host`.
    pub fn command(&self, host: &str, command: &str) {
        self.line(format!("[{host}] $ {command}"));
    }

    /// Record the output and exit status of a command.
    pub fn output(&self, output: &CommandOutput) {
        let text = output.combined();
        if !text.trim().is_empty() {
            self.line(text.trim_end());
        }
        if !output.success() {
            self.line(format!("(exit status {})", output.exit_code));
        }
    }

    /// Read back everything written so far.
    pub fn contents(&self) -> std::io::Result<String> {
        fs::read_to_string(&self.path)
    }
}
