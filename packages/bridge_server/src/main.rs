use anyhow::{Context, Result};
use axum::{Router, routing::get};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use socket_bridge::{BridgeMetrics, SessionRegistry};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::MakeSpan;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::prelude::*;
use uuid::Uuid;

mod backend;
mod client;
mod config;
mod handlers;


use backend::WsBackendFactory;
use config::{BackendConfig, FileConfig, ServerConfig};

/// Custom span maker that adds a unique request ID to each incoming request
#[derive(Clone)]
struct RequestIdMakeSpan;

impl<B> MakeSpan<B> for RequestIdMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> tracing::Span {
        let request_id = Uuid::new_v4().to_string();
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    }
}

#[derive(Parser)]
#[command(name = "bridge")]
#[command(about = "WebSocket bridge between clients and a processing backend")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bridge server (default)
    Serve(ServeArgs),
    /// Send one request through a running bridge and print the replies
    Send(SendArgs),
}

#[derive(Args, Default)]
struct ServeArgs {
    /// Config file (defaults to ./bridge.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host to bind to
    #[arg(short = 'b', long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Backend WebSocket url
    #[arg(long)]
    backend_url: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

impl ServeArgs {
    fn apply_overrides(&self, fc: &mut FileConfig) {
        if let Some(host) = &self.host {
            fc.server.host = host.clone();
        }
        if let Some(port) = self.port {
            fc.server.port = port;
        }
        if let Some(url) = &self.backend_url {
            fc.backend.url = url.clone();
        }
    }
}

#[derive(Args)]
struct SendArgs {
    /// Text to submit
    text: String,

    /// Bridge url
    #[arg(long, env = "NODE_WS_URL", default_value = "ws://127.0.0.1:3000/ws")]
    url: String,
}

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub metrics: Arc<BridgeMetrics>,
    pub outbox_capacity: usize,
    pub started_at: DateTime<Utc>,
}

pub fn build_router(state: AppState, ws_path: &str) -> Router {
    Router::new()
        .route(ws_path, get(handlers::websocket_handler))
        .route("/health", get(handlers::health_handler))
        .route("/health/live", get(handlers::health_live_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(TraceLayer::new_for_http().make_span_with(RequestIdMakeSpan))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None => run_server(ServeArgs::default()).await,
        Some(Commands::Serve(args)) => run_server(args).await,
        Some(Commands::Send(args)) => client::send_command(&args.url, &args.text).await,
    }
}

async fn run_server(args: ServeArgs) -> Result<()> {
    // Setup logging
    let default_directive = if args.debug {
        "bridge=debug,socket_bridge=debug,tower_http=debug,info"
    } else {
        "bridge=info,socket_bridge=info,tower_http=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    let mut file_config: FileConfig = config::load_config(args.config.as_deref())
        .extract()
        .context("Failed to load configuration")?;
    args.apply_overrides(&mut file_config);

    let server_config = ServerConfig::from_file(&file_config.server)?;
    let backend_config = BackendConfig::from_file(&file_config.backend)?;
    let settings = config::session_settings(&file_config, &backend_config);

    let metrics = Arc::new(BridgeMetrics::new());
    let registry = Arc::new(SessionRegistry::new(
        Arc::new(WsBackendFactory::new(backend_config.url.clone())),
        settings,
        metrics.clone(),
    ));

    let state = AppState {
        registry: registry.clone(),
        metrics,
        outbox_capacity: file_config.session.outbox_capacity,
        started_at: Utc::now(),
    };
    let app = build_router(state, &server_config.ws_path);

    let listener = TcpListener::bind(server_config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", server_config.bind_addr))?;
    let actual_addr = listener.local_addr()?;

    info!("Bridge listening on ws://{}{}", actual_addr, server_config.ws_path);
    info!("Forwarding to backend {}", backend_config.url);
    info!("  GET /health       - Health status");
    info!("  GET /health/live  - Liveness probe");
    info!("  GET /metrics      - Bridge metrics");

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal, cleaning up...");
    };

    let server_result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error");

    let closed = registry.shutdown_all().await;
    info!("Closed {} client sessions", closed);

    server_result
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn send_url_reads_node_ws_url() {
        let cli = Cli::command();
        let send = cli
            .get_subcommands()
            .find(|c| c.get_name() == "send")
            .unwrap();
        let url = send
            .get_arguments()
            .find(|a| a.get_id() == "url")
            .unwrap();
        assert_eq!(url.get_env().and_then(|v| v.to_str()), Some("NODE_WS_URL"));
    }

    #[test]
    fn send_url_defaults_to_local_bridge() {
        let cli = Cli::try_parse_from(["bridge", "send", "hello"]).unwrap();
        let Some(Commands::Send(args)) = cli.command else {
            panic!("expected send");
        };
        assert_eq!(args.text, "hello");
        if std::env::var_os("NODE_WS_URL").is_none() {
            assert_eq!(args.url, "ws://127.0.0.1:3000/ws");
        }
    }
}
