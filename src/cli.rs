use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "unloadd",
    about = "Native messaging host that unloads browser tabs on mouse gestures",
    args_conflicts_with_subcommands = true
)]
/// Command line of the native-messaging host.
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Settings file (default: $XDG_CONFIG_HOME/unloadd/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Arguments the browser passes to native hosts (manifest path,
    /// extension id); ignored
    #[arg(hide = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub browser_args: Vec<String>,
}

/// Subcommands; the browser launches the host with none.
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Serve the extension over stdin/stdout (default)
    Run,

    /// Validate the settings file and print the effective settings
    Check,
}

impl Cli {
    /// The subcommand to run, `run` when none was given.
    pub fn command(&self) -> Command {
        match &self.command {
            Some(Command::Check) => Command::Check,
            _ => Command::Run,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_invocation_runs() {
        let cli = Cli::try_parse_from(["unloadd"]).unwrap();
        assert_eq!(cli.command(), Command::Run);
        assert!(cli.config.is_none());
    }

    #[test]
    fn browser_launch_arguments_are_ignored() {
        let cli = Cli::try_parse_from([
            "unloadd",
            "/usr/lib/mozilla/native-messaging-hosts/unloadd.json",
            "unload@example.org",
        ])
        .unwrap();
        assert_eq!(cli.command(), Command::Run);
        assert_eq!(cli.browser_args.len(), 2);

        let cli = Cli::try_parse_from(["unloadd", "chrome-extension://abc/", "--parent-window=0"])
            .unwrap();
        assert_eq!(cli.command(), Command::Run);
    }

    #[test]
    fn check_with_config() {
        let cli = Cli::try_parse_from(["unloadd", "check", "--config", "/tmp/u.toml"]).unwrap();
        assert_eq!(cli.command(), Command::Check);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/u.toml")));
    }
}
