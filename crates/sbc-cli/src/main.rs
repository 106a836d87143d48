//! sbc — provision and manage SBC instances on a container host.
//!
//! # Usage
//!
//! ```text
//! sbc run --sbc-fqdn sbc.example.com --kamailio-pbx-ip 192.168.1.1 \
//!     --rtp-public-ip 203.0.113.7 --host-ip 192.168.10.1
//! sbc list
//! sbc destroy --sbc-fqdn sbc.example.com
//! ```

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(
    name = "sbc",
    about = "Session border controller instances on a single container host",
    version,
    propagate_version = true,
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every subcommand.
#[derive(clap::Args, Debug, Default)]
pub struct GlobalArgs {
    /// TOML configuration file. Flags override its values.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// SQLite state database (default: ~/.sbc/sbc.db).
    #[arg(long, global = true)]
    pub db_file: Option<PathBuf>,

    /// Append logs to this file instead of the console.
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Container engine pull log (default: /var/log/sbc/engine.log).
    #[arg(long, global = true)]
    pub engine_log: Option<PathBuf>,

    /// Log level or filter directive. RUST_LOG takes precedence.
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy a new SBC instance.
    Run(commands::run::RunArgs),
    /// Remove an SBC instance, or the shared TLS certificate node.
    Destroy {
        /// Fqdn of the instance to remove.
        #[arg(long, required_unless_present = "tls_node", conflicts_with = "tls_node")]
        sbc_fqdn: Option<String>,
        /// Remove the certificate node and the shared certificate volume.
        #[arg(long)]
        tls_node: bool,
    },
    /// Restart the proxy and relay of an instance.
    Restart {
        #[arg(long)]
        sbc_fqdn: String,
    },
    /// Replace the proxy and relay containers of an instance, keeping
    /// its configuration and volumes.
    Recreate {
        #[arg(long)]
        sbc_fqdn: String,
    },
    /// List deployed SBC instances.
    List {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

fn init_tracing(level: &str, log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = commands::load_config(&cli.global)?;
    commands::prepare_directories(&config)?;
    init_tracing(&cli.global.log_level, config.paths.log_file.as_deref())?;

    let result = match cli.command {
        Commands::Run(args) => commands::run::run(config, &args).await,
        Commands::Destroy { sbc_fqdn, tls_node } => {
            commands::destroy::destroy(config, sbc_fqdn.as_deref(), tls_node).await
        }
        Commands::Restart { sbc_fqdn } => commands::restart::restart(config, &sbc_fqdn).await,
        Commands::Recreate { sbc_fqdn } => commands::recreate::recreate(config, &sbc_fqdn).await,
        Commands::List { format } => commands::list::list(config, &format),
    };

    if let Err(e) = &result {
        error!(error = %e, "Command failed");
    }
    result
}
