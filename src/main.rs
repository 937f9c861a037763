mod cli;
mod config;
mod daemon;
mod gesture;
mod host;
mod ipc;
mod sync;
mod unload;

use clap::Parser;
use cli::{Cli, Command};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // stdout carries the native messaging channel.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if !cli.browser_args.is_empty() {
        tracing::debug!(args = ?cli.browser_args, "ignoring browser launch arguments");
    }

    let settings = match config::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!(error = %e, "config failed");
            eprintln!("unloadd: {e}");
            std::process::exit(1);
        }
    };

    match cli.command() {
        Command::Check => match toml::to_string_pretty(&settings) {
            Ok(text) => print!("{text}"),
            Err(e) => {
                eprintln!("unloadd check: {e}");
                std::process::exit(1);
            }
        },
        Command::Run => {
            if let Err(e) = daemon::run(settings).await {
                tracing::error!(error = %e, "daemon failed");
                eprintln!("unloadd: {e}");
                std::process::exit(1);
            }
        }
    }
}
