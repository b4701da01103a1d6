use clap::Parser;
use gemini_openai_proxy::config::config_search_paths;
use gemini_openai_proxy::gateway::gemini::GeminiConnector;
use gemini_openai_proxy::{build_router, AppState, ProxyConfig, SharedLogger};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "gemini-openai-proxy",
    about = "OpenAI-compatible API in front of Google's Gemini models",
    version
)]
struct Cli {
    /// Path to config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Generative Language API base URL (overrides config)
    #[arg(long)]
    base_url: Option<String>,

    /// Exchange journal path (overrides config)
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Print config search paths and exit
    #[arg(long)]
    show_config_paths: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gemini_openai_proxy=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if cli.show_config_paths {
        println!("Config search paths:");
        for (i, path) in config_search_paths().iter().enumerate() {
            println!("  {}. {}", i + 1, path.display());
        }
        return Ok(());
    }

    let mut config = ProxyConfig::find_and_load(cli.config.as_deref())?;

    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(base_url) = cli.base_url {
        config.gateway.base_url = base_url;
    }
    if let Some(log_file) = cli.log_file {
        config.log.file = log_file;
    }

    let logger = SharedLogger::new(&config.log.file, config.log.bodies)?;
    logger.compact()?;

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(config.gateway.timeout_secs))
        .build()?;
    let connector = GeminiConnector::new(client, config.gateway.base_url.clone());

    info!(version = env!("CARGO_PKG_VERSION"), "gemini-openai-proxy starting");
    info!("  Gateway:   {}", config.gateway.base_url);
    info!("  Timeout:   {}s", config.gateway.timeout_secs);
    info!("  Journal:   {} (bodies: {})", config.log.file.display(), config.log.bodies);

    let bind_addr = config.bind_address();
    let state = Arc::new(AppState {
        connector: Arc::new(connector),
        logger,
    });

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Listening on http://{}", bind_addr);
    info!("  Point an OpenAI client at http://{}/v1", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
