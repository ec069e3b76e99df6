//! The run request persisted between runs of a series.

use std::path::Path;

use anyhow::Context;
use gavel_core::RunRequest;

/// The stored request, or `None` when `path` does not exist yet.
pub fn load(path: &Path) -> anyhow::Result<Option<RunRequest>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let request = serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
    Ok(Some(request))
}

/// Replace the stored request. Written beside `path` then renamed.
pub fn save(path: &Path, request: &RunRequest) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(request)?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, json).with_context(|| format!("writing {}", tmp.display()))?;
    std::fs::rename(&tmp, path).with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}
