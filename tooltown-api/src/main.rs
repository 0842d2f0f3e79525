use anyhow::Context;
use clap::Parser;
use tooltown_api::{app, AppConfig, Args};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    let registry = tracing_subscriber::registry().with(filter);

    if config.logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config =
        AppConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    config.apply(&args);

    init_tracing(&config);

    let scratch_dir = &config.storage.scratch_dir;
    tokio::fs::create_dir_all(scratch_dir)
        .await
        .with_context(|| format!("Failed to create scratch directory {}", scratch_dir.display()))?;

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;

    info!(
        app = %config.app_name,
        version = %config.version,
        scratch_dir = %config.storage.scratch_dir.display(),
        "Tooltown API listening on http://{address}"
    );

    axum::serve(listener, app(config)).await.context("Server error")?;
    Ok(())
}
