//! Config command handlers.

use anyhow::{Context, Result};
use bizdir_core::config;

pub fn path() {
    println!("{}", config::paths::config_path().display());
}

pub fn init() -> Result<()> {
    let config_path = config::paths::config_path();
    config::Config::init(&config_path)
        .with_context(|| format!("init config at {}", config_path.display()))?;
    println!("Created config at {}", config_path.display());
    Ok(())
}

pub fn set_backend(url: Option<&str>, anon_key: Option<&str>) -> Result<()> {
    if url.is_none() && anon_key.is_none() {
        anyhow::bail!("Nothing to set: pass --url and/or --anon-key");
    }
    let config_path = config::paths::config_path();
    config::Config::save_backend_to(&config_path, url, anon_key)
        .with_context(|| format!("update config at {}", config_path.display()))?;
    println!("Updated backend in {}", config_path.display());
    Ok(())
}
