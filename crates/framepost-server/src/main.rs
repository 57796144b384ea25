//! Framepost server binary.
//!
//! # Usage
//!
//! ```bash
//! framepost-server --port 8080 --connections 100
//! framepost-server -v   # show DEBUG messages on the console
//! ```
//!
//! The operator console runs on stdin; type `/help` once the server is up.

use std::sync::Arc;

use clap::Parser;
use framepost_server::{Server, ServerRuntimeConfig};
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

/// Framepost messaging server
#[derive(Parser, Debug)]
#[command(name = "framepost-server")]
#[command(about = "Store-and-forward TCP messaging server")]
#[command(version)]
struct Args {
    /// Server port
    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Maximum concurrent connections
    #[arg(short, long, default_value_t = 100)]
    connections: usize,

    /// Enable verbose logging (show DEBUG messages)
    #[arg(short, long)]
    verbose: bool,

    /// Server log file (append-only; served by GET_LOG)
    #[arg(long, default_value = "server.log")]
    log_file: String,

    /// Ban list file (one username per line)
    #[arg(long, default_value = "banlist")]
    banlist: String,
}

/// Two fmt layers: ANSI console output honoring `-v`, and a plain append-only
/// file that GET_LOG serves back to clients.
fn init_logging(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let stdout_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if args.verbose { "debug" } else { "info" }));

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&args.log_file)
        .map_err(|err| format!("cannot open log file {}: {err}", args.log_file))?;

    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(Arc::new(log_file))
        .with_filter(EnvFilter::new("info"));

    let stdout_layer = fmt::layer().with_filter(stdout_filter);

    tracing_subscriber::registry().with(file_layer).with(stdout_layer).init();

    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(err) = init_logging(&args) {
        eprintln!("{err}");
        std::process::exit(1);
    }

    let config = ServerRuntimeConfig {
        port: args.port,
        max_connections: args.connections,
        log_path: args.log_file.clone().into(),
        banlist_path: args.banlist.clone().into(),
        console: true,
        ..Default::default()
    };

    let server = match Server::bind(config).await {
        Ok(server) => server,
        Err(err) => {
            tracing::error!("Server startup failed: {err}");
            std::process::exit(1);
        },
    };

    let handle = server.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            handle.stop();
        }
    });

    if let Err(err) = server.run().await {
        tracing::error!("Server error: {err}");
        std::process::exit(1);
    }
}
