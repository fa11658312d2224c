//! `mcprs` binary: parses CLI arguments and runs the chosen transport
//! against a freshly built [`mcprs_server::McpServer`] (spec §6.4).

use std::sync::Arc;

use clap::{Parser, ValueEnum};
use mcprs_server::ServerBuilder;
use mcprs_transport::{HttpTransport, ServerConfig};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TransportKind {
    Stdio,
    Http,
}

/// mcprs: a dual-transport Model Context Protocol server.
#[derive(Debug, Parser)]
#[command(name = "mcprs", version, about)]
struct Cli {
    /// Which transport to run.
    #[arg(long, value_enum, default_value = "http")]
    transport: TransportKind,

    /// Port to bind the HTTP transport to (ignored for stdio).
    #[arg(short = 'p', long, default_value_t = 3000)]
    port: u16,

    /// Bare positional port, equivalent to `--port`.
    #[arg(value_name = "PORT")]
    port_positional: Option<u16>,

    /// Suppress the startup banner; intended for running under a process
    /// supervisor rather than an interactive terminal.
    #[arg(short = 'd', long)]
    daemon: bool,
}

impl Cli {
    fn effective_port(&self) -> u16 {
        self.port_positional.unwrap_or(self.port)
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging();

    if let Err(err) = run(cli).await {
        tracing::error!("fatal: {err:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let server = Arc::new(ServerBuilder::new("mcprs", env!("CARGO_PKG_VERSION")).with_builtins().build());

    match cli.transport {
        TransportKind::Stdio => {
            if !cli.daemon {
                tracing::info!("mcprs running on stdio transport");
            }
            let shutdown = Arc::new(mcprs_transport::ShutdownState::default());
            mcprs_transport::stdio::run(server, shutdown).await?;
        }
        TransportKind::Http => {
            let mut config = ServerConfig::default();
            config.bind_addr = format!("0.0.0.0:{}", cli.effective_port());
            if !cli.daemon {
                tracing::info!("mcprs listening on {}", config.bind_addr);
            }
            let transport = HttpTransport::new(server, config);
            transport.run().await?;
        }
    }

    Ok(())
}
