//! Subtle - find and download subtitles from OpenSubtitles
//!
//! # Usage
//!
//! ```bash
//! # Browse the current directory for videos
//! subtle
//!
//! # CLI mode
//! subtle search ~/Movies/heat.1995.mkv
//! subtle download ~/Movies/heat.1995.mkv --lang eng --json
//! ```

use clap::Parser;
use log::debug;

use subtle::cli::{BrowseCmd, Cli, Command, ExitCode, Output};
use subtle::commands;
use subtle::config::Config;

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    run_cli(cli).await.into()
}

/// RUST_LOG wins; otherwise info, or debug with --verbose
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .init();
}

/// Run CLI command and return exit code
async fn run_cli(cli: Cli) -> ExitCode {
    let output = Output::new(&cli);

    let config = match cli.config.as_deref() {
        Some(path) => match Config::load_from(path) {
            Ok(mut config) => {
                config.apply_env(|key| std::env::var(key).ok());
                config
            }
            Err(e) => return output.error(format!("{:#}", e), ExitCode::InvalidArgs),
        },
        None => Config::load(),
    };
    debug!("Using server {}", config.to_session_config().server_url);

    match cli.command {
        Some(Command::Hash(cmd)) => commands::hash_cmd(cmd, &output).await,

        Some(Command::Browse(cmd)) => commands::browse_cmd(cmd, &output).await,

        Some(Command::Info(cmd)) => commands::info_cmd(cmd, &config, &output).await,

        Some(Command::Search(cmd)) => commands::search_cmd(cmd, &config, &output).await,

        Some(Command::Download(cmd)) => commands::download_cmd(cmd, &config, &output).await,

        None => commands::browse_cmd(BrowseCmd::default(), &output).await,
    }
}
