//! gavel — data lifecycle harness for auction benchmark runs.
//!
//! # Usage
//!
//! ```text
//! gavel --config gavel.toml prepare --users 125 --load-db --backup --state run.json
//! gavel backup-status --scale 2
//! gavel --dry-run prepare --scale 2 --load-db
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tokio::sync::watch;
use tracing::warn;

mod commands;
mod context;
mod state;

use context::Context;

#[derive(Parser)]
#[command(
    name = "gavel",
    about = "gavel — get benchmark data in place before a timed run",
    version,
    propagate_version = true
)]
struct Cli {
    /// Harness configuration file.
    #[arg(short, long, global = true, default_value = "gavel.toml")]
    config: PathBuf,

    /// Print every command instead of running it. Each command is assumed
    /// to succeed.
    #[arg(long, global = true)]
    dry_run: bool,

    /// User for ssh connections (default: the ssh config's).
    #[arg(long, global = true)]
    ssh_user: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Dataset target; falls back to `[workload]` when neither is given.
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// Simulated users for the run.
    #[arg(short, long)]
    pub users: Option<u32>,
    /// Explicit scale level; overrides users for sizing.
    #[arg(short, long)]
    pub scale: Option<u32>,
}

#[derive(Subcommand)]
enum Commands {
    /// Reuse, restore or load the data for a run, prepare auctions, then
    /// stop the data services.
    Prepare {
        #[command(flatten)]
        target: TargetArgs,
        /// Discard existing data and load from scratch.
        #[arg(long)]
        reload_db: bool,
        /// Load when neither data nor a backup is present.
        #[arg(long)]
        load_db: bool,
        /// Back up freshly loaded data.
        #[arg(long)]
        backup: bool,
        /// Back up even when the data was reused or restored.
        #[arg(long)]
        rebackup: bool,
        /// JSON file carrying the request across a series of runs.
        #[arg(long)]
        state: Option<PathBuf>,
    },
    /// Report whether the data for a target is loaded.
    Check {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Wipe, start, configure the cluster and bulk load.
    Load {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Apply the sharding or replication layout to running services.
    ConfigureCluster,
    /// Snapshot the data services' storage for a target.
    Backup {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Restore a target's snapshot and start the data services.
    Restore {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Report whether a complete backup exists for a target.
    BackupStatus {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Wait until the NoSQL replica set is in sync.
    WaitSync,
    /// Run read-only warm-up queries against every NoSQL instance.
    WarmUp,
    /// Drop data added by earlier runs and compact.
    Clean {
        #[command(flatten)]
        target: TargetArgs,
    },
}

fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info,gavel=debug"))?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs)?;

    // Ctrl-C stops long waits (loader follow, replica sync) cleanly.
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping");
            let _ = cancel_tx.send(true);
        }
    });

    let ctx = Context::load(&cli.config, cli.dry_run, cli.ssh_user, cancel_rx)?;

    let result = match cli.command {
        Commands::Prepare {
            target,
            reload_db,
            load_db,
            backup,
            rebackup,
            state,
        } => {
            let flags = gavel_core::RunFlags {
                reload_db,
                load_db,
                backup,
                rebackup,
            };
            commands::prepare::prepare(&ctx, &target, flags, state.as_deref()).await
        }
        Commands::Check { target } => commands::data::check(&ctx, &target).await,
        Commands::Load { target } => commands::data::load(&ctx, &target).await,
        Commands::ConfigureCluster => commands::data::configure_cluster(&ctx).await,
        Commands::Backup { target } => commands::backup::backup(&ctx, &target).await,
        Commands::Restore { target } => commands::backup::restore(&ctx, &target).await,
        Commands::BackupStatus { target } => commands::backup::status(&ctx, &target).await,
        Commands::WaitSync => commands::data::wait_sync(&ctx).await,
        Commands::WarmUp => commands::data::warm_up(&ctx).await,
        Commands::Clean { target } => commands::data::clean(&ctx, &target).await,
    };

    ctx.print_dry_run();
    result
}
