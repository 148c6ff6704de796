mod check;
mod collect;
mod show;
mod watch;

use atlas_core::AtlasConfig;
use serde_json::Value;

use crate::cli::{Cli, Command};
use crate::error::CliError;

/// Environment config with command-line flags layered on top.
pub fn resolve_config(cli: &Cli) -> Result<AtlasConfig, CliError> {
    let mut config = AtlasConfig::from_env()?;

    if let Some(base_url) = &cli.base_url {
        config.base_url = base_url.clone();
    }
    if let Some(base_prefix) = &cli.base_prefix {
        config.base_prefix = base_prefix.clone();
    }
    if let Some(cache_path) = &cli.cache_path {
        config.cache_path = cache_path.clone();
    }
    if let Some(table_path) = &cli.table_path {
        config.table_path = table_path.clone();
    }
    if let Some(max_workers) = cli.max_workers {
        config.max_workers = max_workers;
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config.timeout_ms = timeout_ms;
    }

    config.validate()?;
    Ok(config)
}

pub async fn run(cli: &Cli) -> Result<Value, CliError> {
    let config = resolve_config(cli)?;

    match &cli.command {
        Command::Collect(args) => collect::run(args, config).await,
        Command::Check => check::run(&config).await,
        Command::Watch(args) => watch::run(args, &config).await,
        Command::Show(args) => show::run(args, &config),
    }
}
