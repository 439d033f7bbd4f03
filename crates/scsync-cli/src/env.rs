use std::path::PathBuf;

use anyhow::{Context, Result};

/// Load the nearest `.env`, searching from the current directory up to the
/// filesystem root. Returns the loaded path, or `None` when there is none.
///
/// Variables already set in the process environment win.
pub fn load_dotenv_from_ancestors() -> Result<Option<PathBuf>> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;

    for dir in cwd.ancestors() {
        let env_path = dir.join(".env");
        if env_path.is_file() {
            dotenvy::from_path(&env_path)
                .with_context(|| format!("Failed to load .env from {}", env_path.display()))?;
            return Ok(Some(env_path));
        }
    }

    Ok(None)
}
