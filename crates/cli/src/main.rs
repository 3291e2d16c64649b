//! MatchPulse CLI
//!
//! Follow a server-side match analysis live from the terminal.

mod cli;
mod cmd_config;
mod cmd_watch;
mod logging;
mod paths;
mod render;

use clap::{CommandFactory, Parser};
use tracing::Instrument;

use crate::cli::{Cli, Commands};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let data_dir = paths::init_data_dir(cli.data_dir.as_deref())?;

    match cli.command {
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "matchpulse", &mut std::io::stdout());
            Ok(())
        }
        Commands::Config(args) => cmd_config::run(&args, &data_dir),
        Commands::Watch(args) => {
            paths::ensure_dirs()?;
            let logging = logging::init_logging()?;
            tracing::info!(
                component = "cli",
                event = "cli.start",
                version = VERSION,
                run_id = %logging.run_id,
                data_dir = %data_dir.display(),
            );
            let result = cmd_watch::run(args)
                .instrument(logging.span.clone())
                .await;
            if let Err(e) = &result {
                tracing::error!(
                    component = "cli",
                    event = "cli.failed",
                    error = %e,
                    "Watch ended with an error"
                );
            }
            drop(logging);
            result
        }
    }
}
