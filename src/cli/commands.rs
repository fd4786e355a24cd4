
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// pingd - a background TCP control server
#[derive(Parser, Debug)]
#[command(name = "pingd")]
#[command(about = "Daemon with a tiny TCP control protocol")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct CliArgs {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Host to listen on or connect to [default: localhost]
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Port to listen on or connect to [default: 9876]
    #[arg(short, long, global = true)]
    pub port: Option<u16>,

    /// Read configuration from this file instead of ~/.pingd/config.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the server
    Start {
        /// Serve in this process instead of detaching
        #[arg(short = 'n', long = "no-daemon", alias = "nodaemon")]
        no_daemon: bool,
    },

    /// Stop the server
    Stop,

    /// Check that the server answers
    Ping,
}

impl Commands {
    /// Whether this invocation may end up running the server
    pub fn is_server(&self) -> bool {
        matches!(self, Commands::Start { .. })
    }
}

/// Result of a CLI command
#[derive(Debug)]
pub enum CliResult {
    Success(String),
    Error(String),
}

impl std::fmt::Display for CliResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliResult::Success(msg) => write!(f, "{msg}"),
            CliResult::Error(msg) => write!(f, "Error: {msg}"),
        }
    }
}
