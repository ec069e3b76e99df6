use gavel_remote::PollOutcome;

use crate::TargetArgs;
use crate::context::Context;

pub async fn check(ctx: &Context, target: &TargetArgs) -> anyhow::Result<()> {
    let request = ctx.request(target);
    let target = ctx.target(target);
    if ctx.orchestrator().is_data_loaded(target, request.users).await? {
        println!("✓ Data for {target} is loaded");
        Ok(())
    } else {
        anyhow::bail!("data for {target} is not loaded; see isDataLoaded.log")
    }
}

pub async fn load(ctx: &Context, target: &TargetArgs) -> anyhow::Result<()> {
    let request = ctx.request(target);
    let target = ctx.target(target);
    ctx.orchestrator().load_fresh(target, request.users, "load").await?;
    println!("✓ Loaded data for {target}; data services are up");
    Ok(())
}

pub async fn configure_cluster(ctx: &Context) -> anyhow::Result<()> {
    ctx.orchestrator().configure_cluster().await?;
    println!("✓ NoSQL cluster configured");
    Ok(())
}

pub async fn wait_sync(ctx: &Context) -> anyhow::Result<()> {
    match ctx.orchestrator().wait_for_replica_sync().await? {
        PollOutcome::Ready { attempts, .. } => {
            println!("✓ Replica set in sync after {attempts} polls");
            Ok(())
        }
        PollOutcome::TimedOut { attempts } => {
            anyhow::bail!("replica set not in sync after {attempts} polls")
        }
        PollOutcome::Cancelled { attempts } => {
            anyhow::bail!("replica sync wait cancelled after {attempts} polls")
        }
    }
}

pub async fn warm_up(ctx: &Context) -> anyhow::Result<()> {
    let summary = ctx.orchestrator().warm_up().await?;
    println!(
        "✓ Warm-up issued {} queries ({} succeeded, {} failed)",
        summary.issued, summary.succeeded, summary.failed
    );
    Ok(())
}

pub async fn clean(ctx: &Context, target: &TargetArgs) -> anyhow::Result<()> {
    let target = ctx.target(target);
    if ctx.orchestrator().clean_data(target).await? {
        println!("✓ Cleaned data for {target}");
        Ok(())
    } else {
        anyhow::bail!("cleanup for {target} failed; see cleanData.log")
    }
}
