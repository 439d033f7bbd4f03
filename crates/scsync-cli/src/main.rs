use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;
mod context;
mod env;
mod lock;

use cli::{Cli, Commands};
use context::Context;

fn main() -> Result<()> {
    if let Err(e) = env::load_dotenv_from_ancestors() {
        eprintln!("warning: {:#}", e);
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("scsync=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { path } => commands::cmd_init(&path),
        Commands::Consumers => {
            let ctx = Context::load(&cli.config, cli.env.as_deref())?;
            commands::cmd_consumers(&ctx)
        }
        Commands::Sync { consumer } => {
            let ctx = Context::load(&cli.config, cli.env.as_deref())?;
            commands::cmd_sync(&ctx, consumer.as_deref())
        }
        Commands::Status => {
            let ctx = Context::load(&cli.config, cli.env.as_deref())?;
            commands::cmd_status(&ctx)
        }
        Commands::Reset { name, yes } => {
            let ctx = Context::load(&cli.config, cli.env.as_deref())?;
            commands::cmd_reset(&ctx, &name, yes)
        }
        Commands::Query {
            name,
            table,
            filter,
            sync,
            json,
        } => {
            let ctx = Context::load(&cli.config, cli.env.as_deref())?;
            commands::cmd_query(&ctx, &name, &table, filter.as_deref(), sync, json)
        }
    }
}
