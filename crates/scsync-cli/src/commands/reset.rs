use anyhow::Result;
use colored::Colorize;
use dialoguer::Confirm;
use scsync_core::CheckpointStore;
use tracing::info;

use crate::context::Context;
use crate::lock::ConsumerLock;

pub fn cmd_reset(ctx: &Context, name: &str, yes: bool) -> Result<()> {
    let consumer = ctx.resolve(ctx.consumer_config(name)?)?;

    if !yes {
        let tables: Vec<&str> = consumer
            .decomposer
            .tables()
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        println!(
            "Resetting '{}' clears {} on the next sync and replays the full commit log.",
            consumer.name,
            tables.join(", ")
        );

        let confirmed = Confirm::new()
            .with_prompt(format!("Reset checkpoint for '{}'?", consumer.name))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("Aborted.");
            return Ok(());
        }
    }

    let _lock = ConsumerLock::acquire(&ctx.config.locks_dir(), &consumer.name)?;
    let mut checkpoints = ctx.checkpoints()?;
    let previous = checkpoints.get(&consumer.stream, &consumer.name)?;
    checkpoints.reset(&consumer.stream, &consumer.name)?;

    info!(consumer = %consumer.name, previous, "Checkpoint reset");
    println!(
        "{} '{}' reset from {} to 0. Run 'scsync sync --consumer {}' to rebuild.",
        "Done:".green(),
        consumer.name,
        previous,
        consumer.name
    );
    Ok(())
}
