use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "countries",
    version,
    about = "Country catalog refresh service",
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Used when no subcommand is given.
    #[command(flatten)]
    pub serve: ServeArgs,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start the HTTP server (default if no subcommand given).
    Serve(ServeArgs),

    /// Create the SQLite schema if it does not exist.
    Migrate(StorageArgs),

    /// Run one refresh cycle and print the outcome as JSON.
    Refresh(StorageArgs),

    /// Print the effective configuration.
    Config(StorageArgs),
}

#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    #[arg(long, env = "COUNTRIES_HOST", default_value = "0.0.0.0")]
    pub host: String,
    #[arg(long, env = "PORT", default_value = "3000")]
    pub port: u16,

    #[command(flatten)]
    pub storage: StorageArgs,
}

#[derive(Debug, Clone, Args)]
pub struct StorageArgs {
    /// SQLite database file.
    #[arg(long, env = "COUNTRIES_DATABASE", default_value = "countries.db")]
    pub database: PathBuf,

    /// Directory for the summary image (overrides `CACHE_DIR`).
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_invocation_serves_with_defaults() {
        let cli = Cli::try_parse_from(["countries"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.serve.port, 3000);
    }

    #[test]
    fn refresh_takes_storage_flags() {
        let cli = Cli::try_parse_from([
            "countries",
            "refresh",
            "--database",
            "/tmp/c.db",
            "--cache-dir",
            "/tmp/cache",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Refresh(args)) => {
                assert_eq!(args.database, PathBuf::from("/tmp/c.db"));
                assert_eq!(args.cache_dir, Some(PathBuf::from("/tmp/cache")));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
