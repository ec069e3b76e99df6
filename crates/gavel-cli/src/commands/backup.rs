use crate::TargetArgs;
use crate::context::Context;

pub async fn backup(ctx: &Context, target: &TargetArgs) -> anyhow::Result<()> {
    let target = ctx.target(target);
    ctx.orchestrator().backup_data(target).await?;
    println!("✓ Backed up data for {target}");
    Ok(())
}

pub async fn restore(ctx: &Context, target: &TargetArgs) -> anyhow::Result<()> {
    let target = ctx.target(target);
    ctx.orchestrator().restore_data(target).await?;
    println!("✓ Restored data for {target}; data services are up");
    Ok(())
}

pub async fn status(ctx: &Context, target: &TargetArgs) -> anyhow::Result<()> {
    let target = ctx.target(target);
    if ctx.orchestrator().is_backup_available(target).await? {
        println!("✓ Backup available for {target}");
        Ok(())
    } else {
        anyhow::bail!("no complete backup for {target}; see isBackupAvailable.log")
    }
}
