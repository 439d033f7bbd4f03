use anyhow::Result;
use colored::Colorize;

use crate::context::Context;

pub fn cmd_consumers(ctx: &Context) -> Result<()> {
    if ctx.config.consumers.is_empty() {
        println!("No consumers configured. Add a [[consumer]] section to scsync.toml.");
        return Ok(());
    }

    println!("\nConsumers ({}):", ctx.config.env);
    println!("{:<24} {:<22} {:<66}", "Name", "Definition", "Contract");
    println!("{:-<112}", "");

    for cfg in &ctx.config.consumers {
        let definition = match &cfg.preset {
            Some(preset) => preset.clone(),
            None => format!("custom ({} tables)", cfg.tables.len()),
        };
        let contract = match ctx.resolve(cfg) {
            Ok(consumer) => consumer.stream.normal(),
            Err(e) => format!("{:#}", e).red(),
        };
        println!("{:<24} {:<22} {}", cfg.name, definition, contract);
    }

    println!();
    Ok(())
}
