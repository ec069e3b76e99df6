use std::path::Path;

use gavel_core::{RunFlags, RunRequest};
use gavel_orchestrator::DataSource;

use crate::TargetArgs;
use crate::context::Context;
use crate::state;

pub async fn prepare(
    ctx: &Context,
    target: &TargetArgs,
    flags: RunFlags,
    state_path: Option<&Path>,
) -> anyhow::Result<()> {
    let stored = match state_path {
        Some(path) => state::load(path)?,
        None => None,
    };
    let request = merge(stored, ctx.request(target), target, flags);

    let report = ctx.orchestrator().prepare_data(&request).await?;
    println!(
        "✓ Data ready for {} ({}, {} auctions)",
        report.target,
        describe(report.source),
        report.auctions
    );
    if report.backed_up {
        println!("  Backup: refreshed");
    }
    if let Some(summary) = report.warm_up {
        println!("  Warm-up: {}/{} queries succeeded", summary.succeeded, summary.issued);
    }

    if let Some(path) = state_path {
        state::save(path, &report.next_request)?;
        println!("  State: {}", path.display());
    }
    Ok(())
}

fn describe(source: DataSource) -> &'static str {
    match source {
        DataSource::Reloaded => "reloaded",
        DataSource::AlreadyLoaded => "reused",
        DataSource::Restored => "restored from backup",
        DataSource::Loaded => "loaded",
    }
}

/// The request for this run: a stored request keeps its target unless one
/// is given on the command line, and flags accumulate.
fn merge(stored: Option<RunRequest>, from_args: RunRequest, target: &TargetArgs, flags: RunFlags) -> RunRequest {
    let Some(stored) = stored else {
        return from_args.with_flags(flags);
    };
    let explicit_target = target.users.is_some() || target.scale.is_some();
    let base = if explicit_target { from_args } else { stored.clone() };
    base.with_flags(RunFlags {
        reload_db: stored.flags.reload_db || flags.reload_db,
        load_db: stored.flags.load_db || flags.load_db,
        backup: stored.flags.backup || flags.backup,
        rebackup: stored.flags.rebackup || flags.rebackup,
    })
}
