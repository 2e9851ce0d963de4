use std::sync::Arc;

use anyhow::Context;
use server::config::Config;
use server::db;
use server::db::profiles::PgProfileStore;
use server::routes::{self, RemoteProfiles};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env();

    let remote = match &config.database_url {
        Some(url) => {
            tracing::info!("Connecting to database...");
            let pool = db::pool::create_pool(url)
                .await
                .context("Failed to connect to database")?;
            tracing::info!("Running migrations...");
            db::pool::run_migrations(&pool)
                .await
                .context("Failed to run migrations")?;
            RemoteProfiles(Some(Arc::new(PgProfileStore::new(pool))))
        }
        None => {
            tracing::info!("DATABASE_URL not set - remote rating sync disabled");
            RemoteProfiles::default()
        }
    };

    tracing::info!(engine = %config.stockfish_path, ratings = %config.ratings_dir.display(), "configuration loaded");

    let addr = format!("{}:{}", config.host, config.port);
    let app = routes::app(config, remote);

    tracing::info!("Starting server on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
