//! nodepind — the nodepin daemon.
//!
//! Single binary that assembles:
//! - Cluster handle (Kubernetes client)
//! - Placement reconciler
//! - Cluster observer (background task)
//! - HTTP gateway
//!
//! # Usage
//!
//! ```text
//! nodepind serve --config /etc/nodepin/nodepin.toml --port 8000
//! ```

mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,nodepind=debug,nodepin=debug";

#[derive(Parser)]
#[command(name = "nodepind", about = "nodepin daemon — pins applications to nodes")]
struct Cli {
    /// Log output format.
    #[arg(long, global = true, value_enum, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the placement gateway and run the cluster observer.
    Serve {
        /// Path to nodepin.toml. Built-in defaults are used when omitted.
        #[arg(long, env = "NODEPIN_CONFIG")]
        config: Option<PathBuf>,

        /// Port to listen on.
        #[arg(long, env = "NODEPIN_PORT", default_value = "8000")]
        port: u16,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Serve { config, port } => serve::run_serve(config, port).await,
    }
}
