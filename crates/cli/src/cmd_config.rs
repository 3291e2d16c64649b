//! `matchpulse config` - show where MatchPulse reads from and what it resolved.

use std::path::Path;

use matchpulse_live::ClientConfig;

use crate::cli::ConfigArgs;
use crate::paths;
use crate::VERSION;

pub fn run(args: &ConfigArgs, data_dir: &Path) -> anyhow::Result<()> {
    let config_path = paths::config_path();

    if args.init {
        if config_path.exists() {
            println!("  {} already exists, leaving it alone", config_path.display());
        } else {
            paths::ensure_dirs()?;
            std::fs::write(&config_path, default_config_toml()?)?;
            println!("  Wrote defaults to {}", config_path.display());
        }
    }

    let config = ClientConfig::load(&config_path)?;
    let token_file = config
        .token_file
        .clone()
        .unwrap_or_else(paths::token_file_path);

    println!();
    println!("  MatchPulse v{}", VERSION);
    println!("  Data dir: {}", data_dir.display());
    println!(
        "  Config: {} ({})",
        config_path.display(),
        if config_path.exists() { "found" } else { "defaults" }
    );
    println!(
        "  Token file: {} ({})",
        token_file.display(),
        if token_file.exists() { "found" } else { "not found" }
    );
    match config.transport_config() {
        Ok(transport) => println!(
            "  Realtime: {}",
            transport.namespace_url("ws")
        ),
        Err(e) => println!("  Invalid: {}", e),
    }
    println!();
    print!("{}", toml::to_string_pretty(&config)?);
    println!();
    Ok(())
}

fn default_config_toml() -> anyhow::Result<String> {
    Ok(toml::to_string_pretty(&ClientConfig::default())?)
}
