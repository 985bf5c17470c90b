//! Configuration management commands.

use dircrawl::config::Config;

use crate::cli::icons::dim_arrow;

/// Print the effective configuration.
pub fn cmd_config_show(config: &Config) -> anyhow::Result<()> {
    let source = config
        .source_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "defaults (no config file found)".to_string());
    eprintln!("{} Source: {}", dim_arrow(), source);

    let rendered = config.to_toml().map_err(|e| anyhow::anyhow!(e))?;
    println!("{}", rendered);
    Ok(())
}
