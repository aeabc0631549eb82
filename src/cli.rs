use clap::{Args, Parser, Subcommand};

use crate::types::LogLevel;

#[derive(Parser, Debug)]
#[command(
    name = "youai-immich",
    version,
    about = "Migrate a youai photo library into an Immich server"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to the JSON config file
    #[arg(short = 'c', long, global = true, default_value = "config.json")]
    pub config: String,

    /// Directory holding the ledger and transient downloads
    #[arg(short = 'o', long, global = true, default_value = "./out")]
    pub out_dir: String,

    /// Log level
    #[arg(long, global = true, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Disable progress bar
    #[arg(long, global = true)]
    pub no_progress_bar: bool,

    /// Immich API key, overriding `immich_key` from the config file.
    /// Prefer the IMMICH_API_KEY environment variable: flags are visible
    /// in process listings.
    #[arg(long, global = true, env = "IMMICH_API_KEY", hide_env_values = true)]
    pub immich_key: Option<String>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Enumerate the source library and migrate every pending file (default)
    Sync,
    /// Summarise the ledger without touching the network
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct StatusArgs {
    /// List every recorded failure event
    #[arg(long)]
    pub failures: bool,
}

impl Cli {
    /// The subcommand to run; `sync` when none was given.
    pub fn effective_command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Sync)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("youai-immich").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults_to_sync() {
        let cli = parse(&[]);
        assert_eq!(cli.effective_command(), Command::Sync);
        assert_eq!(cli.config, "config.json");
        assert_eq!(cli.out_dir, "./out");
        assert_eq!(cli.log_level, LogLevel::Info);
        assert!(!cli.no_progress_bar);
    }

    #[test]
    fn test_status_with_failures() {
        let cli = parse(&["status", "--failures"]);
        assert_eq!(
            cli.effective_command(),
            Command::Status(StatusArgs { failures: true })
        );
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = parse(&["sync", "--out-dir", "/tmp/o", "--log-level", "warn"]);
        assert_eq!(cli.out_dir, "/tmp/o");
        assert_eq!(cli.log_level, LogLevel::Warn);
    }

    #[test]
    fn test_immich_key_flag() {
        let cli = parse(&["--immich-key", "k"]);
        assert_eq!(cli.immich_key.as_deref(), Some("k"));
    }

    #[test]
    fn test_rejects_unknown_log_level() {
        assert!(Cli::try_parse_from(["youai-immich", "--log-level", "trace"]).is_err());
    }
}
