use anyhow::{bail, Context as _, Result};
use colored::Colorize;
use scsync_config::ConsumerConfig;
use scsync_core::{Materializer, SyncReport};
use scsync_state::SqliteMirror;
use tracing::info;

use crate::context::{Checkpoints, Context};
use crate::lock::ConsumerLock;

pub fn cmd_sync(ctx: &Context, consumer: Option<&str>) -> Result<()> {
    let selected = ctx.select(consumer)?;
    if selected.is_empty() {
        println!("No consumers configured. Add a [[consumer]] section to scsync.toml.");
        return Ok(());
    }

    let mut checkpoints = ctx.checkpoints()?;
    let mut mirror = ctx.mirror()?;
    let mut failed = Vec::new();

    for cfg in selected {
        match sync_consumer(ctx, cfg, &mut checkpoints, &mut mirror) {
            Ok(report) => print_report(&report),
            Err(e) => {
                println!("{:<24} {} {:#}", cfg.name, "failed".red(), e);
                failed.push(cfg.name.as_str());
            }
        }
    }

    if !failed.is_empty() {
        bail!("Sync failed for: {}", failed.join(", "));
    }
    Ok(())
}

/// Sync one consumer while holding its lock.
pub fn sync_consumer(
    ctx: &Context,
    cfg: &ConsumerConfig,
    checkpoints: &mut Checkpoints,
    mirror: &mut SqliteMirror,
) -> Result<SyncReport> {
    let consumer = ctx.resolve(cfg)?;
    let _lock = ConsumerLock::acquire(&ctx.config.locks_dir(), &consumer.name)?;
    let client = ctx.client(cfg)?;

    info!(
        consumer = %consumer.name,
        stream = %consumer.stream,
        checkpoints = %checkpoints.describe(),
        "Syncing"
    );

    let mut materializer =
        Materializer::new(&client, checkpoints, mirror, ctx.materializer_config());
    materializer
        .sync(&consumer)
        .with_context(|| format!("Failed to sync '{}'", consumer.name))
}

fn print_report(report: &SyncReport) {
    if report.is_noop() {
        println!(
            "{:<24} {} at {}",
            report.consumer,
            "up to date".green(),
            report.to
        );
        return;
    }

    let reset = if report.reset { " (rebuilt)" } else { "" };
    println!(
        "{:<24} {} {} -> {}{}: {} commits, {} mutations, {} ignored",
        report.consumer,
        "synced".green(),
        report.from,
        report.to,
        reset,
        report.commits,
        report.mutations,
        report.ignored
    );
}
