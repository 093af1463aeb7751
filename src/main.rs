//! Netbase CLI Application
//!
//! A command-line interface for inspecting, resolving and dialing peer
//! addresses.

use clap::{Parser, Subcommand};
use peer_netbase::cli;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "netbase")]
#[command(author = "Darshan")]
#[command(version = "0.1.0")]
#[command(about = "Peer address classification, resolution and bounded connect", long_about = None)]
struct Cli {
    /// Network config file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Allow DNS lookups (otherwise only numeric addresses resolve); `--lookup=false` to force off
    #[arg(
        long,
        global = true,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    lookup: Option<bool>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show classification, group and hash for a host
    Inspect {
        /// Host name or address literal
        host: String,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Resolve a host to its addresses
    Resolve {
        /// Host name or address literal
        host: String,

        /// Maximum number of addresses (0 = unlimited)
        #[arg(short, long)]
        max: Option<usize>,
    },

    /// Group several hosts by network segment
    Group {
        /// Host names or address literals
        #[arg(required = true)]
        hosts: Vec<String>,
    },

    /// Open a bounded TCP connection
    Connect {
        /// Target as host, host:port, [host] or [host]:port
        target: String,

        /// Port (overrides any port in the target)
        #[arg(short, long)]
        port: Option<u16>,

        /// Connect timeout in milliseconds
        #[arg(short, long)]
        timeout: Option<u64>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut config = cli::load_config(cli.config.as_deref())?;
    if let Some(lookup) = cli.lookup {
        config.allow_lookup = lookup;
    }

    match cli.command {
        Commands::Inspect { host, json } => {
            cli::cmd_inspect(&config, &host, json)?;
        }

        Commands::Resolve { host, max } => {
            if let Some(max) = max {
                config.max_results = max;
            }
            cli::cmd_resolve(&config, &host)?;
        }

        Commands::Group { hosts } => {
            cli::cmd_group(&config, &hosts)?;
        }

        Commands::Connect {
            target,
            port,
            timeout,
        } => {
            let config = cli::with_timeout(config, timeout.map(Duration::from_millis));
            run_connect(&config, &target, port)?;
        }
    }

    Ok(())
}

#[cfg(unix)]
fn run_connect(
    config: &peer_netbase::NetConfig,
    target: &str,
    port: Option<u16>,
) -> cli::CliResult<()> {
    cli::cmd_connect(config, target, port)
}

#[cfg(not(unix))]
fn run_connect(
    _config: &peer_netbase::NetConfig,
    _target: &str,
    _port: Option<u16>,
) -> cli::CliResult<()> {
    Err("connect is only supported on unix platforms".into())
}
