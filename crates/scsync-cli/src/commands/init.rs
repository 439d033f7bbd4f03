use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use scsync_config::STARTER_CONFIG;

const ENV_EXAMPLE: &str = r#"# scsync environment variables
# Copy this file to .env to override scsync.toml

# SCSYNC_ENV=simulator
# SCSYNC_DAEMON=127.0.0.1:20000
# SCSYNC_DATA_DIR=./data

# Log level, e.g. scsync=debug
# RUST_LOG=scsync=info
"#;

pub fn cmd_init(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("Failed to create {}", path.display()))?;

    let config_path = path.join("scsync.toml");
    if config_path.exists() {
        println!("{} already exists, skipping", config_path.display());
    } else {
        fs::write(&config_path, STARTER_CONFIG)
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
        println!("Created {}", config_path.display());
    }

    let env_example_path = path.join(".env.example");
    if !env_example_path.exists() {
        fs::write(&env_example_path, ENV_EXAMPLE)
            .with_context(|| format!("Failed to write {}", env_example_path.display()))?;
        println!("Created {}", env_example_path.display());
    }

    println!("\n{}\n", "scsync initialized!".green());
    println!("Next steps:");
    println!("  1. Edit scsync.toml: pick env, daemon endpoint and consumers");
    println!("  2. Run: scsync consumers");
    println!("  3. Run: scsync sync\n");

    Ok(())
}
