//! Building NoSQL shell invocations.

use gavel_core::config::NosqlConfig;

/// Command evaluating `script` against the server at `target` (`host:port`).
///
/// Scripts use double quotes only; the whole script is single-quoted for
/// the remote shell.
pub fn eval(config: &NosqlConfig, target: &str, script: &str) -> String {
    format!("{} --quiet --host {target} --eval '{script}'", config.shell)
}

/// `db.getSiblingDB("<db>")` prefix.
pub fn sibling_db(database: &str) -> String {
    format!("db.getSiblingDB(\"{database}\")")
}
