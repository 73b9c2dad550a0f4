use anyhow::{Context, Result};
use axum::{Router, routing::get};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::MakeSpan;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use uuid::Uuid;

mod config;
mod handlers;
mod metrics;
mod nlu;
mod router;
mod ws;


use crate::config::{CONFIG_FILE_NAME, FileConfig, Profile, RouterConfig, load_config};
use crate::metrics::ServerMetrics;
use crate::nlu::{NluGateway, RasaGateway};
use crate::router::{RouterHandle, RouterServices};

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
#[command(name = "clinic-router")]
#[command(about = "Real-time notifications and chatbot handoff for the clinic")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to the configuration file (defaults to ./clinic.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Configuration profile
    #[arg(long, global = true, value_enum)]
    profile: Option<Profile>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the router in the foreground (default)
    Serve(ServeArgs),

    /// Print the resolved configuration as TOML
    Config,
}

#[derive(Parser, Default)]
struct ServeArgs {
    /// Host to bind to (overrides server.host)
    #[arg(short = 'b', long)]
    host: Option<String>,

    /// Port for the web server (overrides server.port)
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub router: RouterHandle,
    /// Server metrics for observability
    pub metrics: Arc<ServerMetrics>,
    pub config: Arc<RouterConfig>,
}

impl AppState {
    /// Start the router actor with the given NLU backend.
    pub fn new(config: RouterConfig, nlu: Arc<dyn NluGateway>) -> Self {
        let metrics = Arc::new(ServerMetrics::new());
        let services = RouterServices::from_config(&config, nlu, metrics.clone());
        let router = RouterHandle::spawn(services, config.server.router_mailbox_capacity);
        Self {
            router,
            metrics,
            config: Arc::new(config),
        }
    }
}

/// All HTTP and WebSocket routes.
pub(crate) fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root_handler))
        .route("/ws", get(handlers::websocket_handler))
        // Health endpoints
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

    let config_file = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
    let file_config: FileConfig = load_config(&config_file, cli.profile.as_ref())
        .extract()
        .with_context(|| format!("failed to load configuration from {}", config_file.display()))?;

    match cli.command {
        Some(Commands::Config) => print_config(&file_config),
        Some(Commands::Serve(args)) => run_server(args, file_config).await,
        None => run_server(ServeArgs::default(), file_config).await,
    }
}

fn print_config(file_config: &FileConfig) -> Result<()> {
    // Validate before printing so a broken file is reported, not echoed.
    RouterConfig::from_file(file_config)?;
    let rendered = toml::to_string_pretty(file_config).context("failed to render configuration")?;
    print!("{rendered}");
    Ok(())
}

async fn run_server(args: ServeArgs, mut file_config: FileConfig) -> Result<()> {
    // Setup logging
    let default_directive = if args.debug {
        "clinic_router=debug,tower_http=debug,info"
    } else {
        "clinic_router=info,tower_http=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    if let Some(host) = args.host {
        file_config.server.host = Some(host);
    }
    if let Some(port) = args.port {
        file_config.server.port = Some(port);
    }
    let config = RouterConfig::from_file(&file_config).context("invalid configuration")?;

    info!("Starting clinic router");
    info!(
        nlu_url = %config.chatbot.nlu_url,
        timeout_ms = config.chatbot.nlu_timeout.as_millis() as u64,
        keywords = config.chatbot.restricted_keywords.len(),
        "Chatbot gateway configured"
    );
    if config.chatbot.has_reserved_retry_settings() {
        warn!(
            max_retries = config.chatbot.max_retries,
            retry_delay_ms = config.chatbot.retry_delay.as_millis() as u64,
            "chatbot retry settings are reserved and not applied; each message gets one NLU attempt"
        );
    }

    let nlu: Arc<dyn NluGateway> = Arc::new(RasaGateway::from_config(&config.chatbot));
    let addr = config.server.bind_addr;
    let state = AppState::new(config, nlu);
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    let actual_addr = listener.local_addr()?;

    info!("Clinic router listening on http://{}", actual_addr);
    info!("  GET /ws          - participant WebSocket");
    info!("  GET /health      - router status");
    info!("  GET /metrics     - server metrics");

    // Create shutdown signal handler
    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal, closing connections...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error")?;

    info!("Shutdown complete");
    Ok(())
}
