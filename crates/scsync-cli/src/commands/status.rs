use anyhow::Result;
use colored::Colorize;
use scsync_core::CheckpointStore;
use tracing::debug;

use crate::context::Context;

pub fn cmd_status(ctx: &Context) -> Result<()> {
    if ctx.config.consumers.is_empty() {
        println!("No consumers configured. Add a [[consumer]] section to scsync.toml.");
        return Ok(());
    }

    let checkpoints = ctx.checkpoints()?;

    println!("\nSync Status ({}, checkpoints: {}):", ctx.config.env, checkpoints.describe());
    println!(
        "{:<24} {:>12} {:>12} {:>10}  {}",
        "Consumer", "Checkpoint", "Remote", "Behind", "Updated"
    );
    println!("{:-<80}", "");

    for cfg in &ctx.config.consumers {
        let consumer = match ctx.resolve(cfg) {
            Ok(consumer) => consumer,
            Err(e) => {
                println!("{:<24} {}", cfg.name, format!("{:#}", e).red());
                continue;
            }
        };

        let checkpoint = checkpoints.get(&consumer.stream, &consumer.name)?;
        let updated = checkpoints
            .updated_at(&consumer.stream, &consumer.name)?
            .unwrap_or_else(|| "-".to_string());

        let remote = ctx
            .client(cfg)
            .and_then(|client| Ok(client.commit_count(&consumer.stream)?));

        let (remote, behind) = match remote {
            Ok(count) => {
                let behind = count.saturating_sub(checkpoint);
                let behind = if behind == 0 {
                    "0".green()
                } else {
                    behind.to_string().yellow()
                };
                (count.to_string().normal(), behind)
            }
            Err(e) => {
                debug!(consumer = %consumer.name, error = %e, "Commit count unavailable");
                ("unreachable".red(), "?".normal())
            }
        };

        println!(
            "{:<24} {:>12} {:>12} {:>10}  {}",
            consumer.name, checkpoint, remote, behind, updated
        );
    }

    println!();
    Ok(())
}
