use clap::Parser;
use log::{error, info};
use server::config::{ServerConfig, Timings};
use server::content::StaticContent;
use server::network::Server;
use server::persistence::{JsonLinesStore, MemoryStore, ResultStore};
use server::registry::Registry;
use std::sync::Arc;
use std::time::Duration;

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "8080")]
    port: u16,
    /// JSON catalog of sessions, keyed by session ID
    #[clap(short, long)]
    content: String,
    /// Append results to this JSON-lines file instead of keeping them in memory
    #[clap(short, long)]
    results: Option<String>,
    /// Delay between start and the first question
    #[clap(long, default_value = "3000")]
    start_delay_ms: u64,
    /// Delay before an automatic advance
    #[clap(long, default_value = "3000")]
    settle_delay_ms: u64,
    /// How long a completed session stays available
    #[clap(long, default_value = "300")]
    cleanup_secs: u64,
}

/// Parses command-line arguments, loads the session catalog and runs the WebSocket server.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let content = StaticContent::from_json_file(&args.content)?;
    info!("Loaded {} sessions from {}", content.len(), args.content);

    let store: Arc<dyn ResultStore> = match &args.results {
        Some(path) => {
            info!("Writing results to {}", path);
            Arc::new(JsonLinesStore::new(path))
        }
        None => Arc::new(MemoryStore::new()),
    };

    let config = ServerConfig::new(&args.host, args.port).with_timings(Timings {
        start_delay: Duration::from_millis(args.start_delay_ms),
        settle_delay: Duration::from_millis(args.settle_delay_ms),
        cleanup_delay: Duration::from_secs(args.cleanup_secs),
        ..Timings::default()
    });

    let registry = Registry::new(Arc::new(content), store, config.timings);
    let mut server = Server::new(&config.bind_addr, registry).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
