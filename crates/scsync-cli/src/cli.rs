use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "scsync")]
#[command(about = "Mirror smart contract commit logs into local SQLite tables")]
#[command(version)]
pub struct Cli {
    /// Path to the scsync.toml config file
    #[arg(short, long, global = true, default_value = "scsync.toml")]
    pub config: PathBuf,

    /// Network environment (mainnet, testnet, simulator); overrides the config
    #[arg(short, long, global = true)]
    pub env: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a starter scsync.toml
    Init {
        /// Directory to initialize
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// List configured consumers and their contract ids
    Consumers,

    /// Replay new commits into the mirror tables
    Sync {
        /// Only sync this consumer
        #[arg(long)]
        consumer: Option<String>,
    },

    /// Show checkpoints and remote commit counts
    Status,

    /// Reset a consumer's checkpoint so the next sync rebuilds its tables
    Reset {
        /// Consumer name
        name: String,

        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Print rows of a mirror table
    Query {
        /// Consumer name
        name: String,

        /// Table name
        table: String,

        /// Row filter, e.g. "complete = true and bidCount > 0"
        #[arg(long = "where")]
        filter: Option<String>,

        /// Sync the consumer before querying
        #[arg(long)]
        sync: bool,

        /// Print rows as JSON
        #[arg(long)]
        json: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_query() {
        let cli = Cli::try_parse_from([
            "scsync",
            "--env",
            "testnet",
            "query",
            "auctions",
            "asset_trade_auctions",
            "--where",
            "complete = false",
            "--json",
        ])
        .unwrap();

        assert_eq!(cli.env.as_deref(), Some("testnet"));
        assert_eq!(cli.config, PathBuf::from("scsync.toml"));
        match cli.command {
            Commands::Query {
                name,
                table,
                filter,
                sync,
                json,
            } => {
                assert_eq!(name, "auctions");
                assert_eq!(table, "asset_trade_auctions");
                assert_eq!(filter.as_deref(), Some("complete = false"));
                assert!(!sync);
                assert!(json);
            }
            _ => panic!("expected query"),
        }
    }
}
