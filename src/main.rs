use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ridehail::config::Config;
use ridehail::services::accounts;
use ridehail::AppState;

#[derive(Parser, Debug)]
#[command(name = "ridehail")]
#[command(author, version, about = "Ride-hailing backend with realtime driver and rider updates", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "ridehail.toml")]
    config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    log_level: Option<String>,

    /// Override the database connection string
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Override the token signing secret
    #[arg(long, env = "RIDEHAIL_JWT_SECRET", hide_env_values = true)]
    jwt_secret: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)?;
    if let Some(url) = cli.database_url {
        config.database.url = Some(url);
    }
    if let Some(secret) = cli.jwt_secret {
        config.auth.jwt_secret = secret;
    }

    let log_level = cli
        .log_level
        .as_ref()
        .unwrap_or(&config.logging.level)
        .clone();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting ridehail v{}", env!("CARGO_PKG_VERSION"));

    std::fs::create_dir_all(&config.server.data_dir).with_context(|| {
        format!(
            "Failed to create data directory: {}",
            config.server.data_dir.display()
        )
    })?;
    std::fs::create_dir_all(config.uploads_dir())
        .context("Failed to create uploads directory")?;

    let db = ridehail::db::init(&config).await?;

    match (&config.auth.admin_email, &config.auth.admin_password) {
        (Some(email), Some(password)) => {
            accounts::ensure_admin_user(&db, email, password).await?;
        }
        _ => tracing::info!("No admin account configured"),
    }

    let metrics_handle =
        ridehail::api::metrics::init_metrics().context("Failed to install metrics recorder")?;

    let state = Arc::new(AppState::new(config.clone(), db).with_metrics(metrics_handle));
    let app = ridehail::api::create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("API server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
