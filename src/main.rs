use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use edx_store::{AppState, app, config, db, edx};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "edx_store=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::from_env()?;
    tracing::info!(
        "Starting storefront on port {} with OpenEdX at {}",
        config.port,
        config.openedx_url
    );

    // Initialize database
    // Parse the database URL to extract the file path and ensure parent directory exists
    let db_path = config
        .database_url
        .strip_prefix("sqlite:")
        .unwrap_or(&config.database_url);
    if let Some(parent) = std::path::Path::new(db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&format!("{}?mode=rwc", config.database_url))
        .await?;

    db::init_db(&pool).await?;
    tracing::info!("Database initialized at {}", config.database_url);

    // One HTTP client serves both the LMS and Stripe
    let http = edx::create_client();
    let edx = edx::EdxClient::new(&config, http.clone());

    let state = Arc::new(AppState {
        config: config.clone(),
        db: pool,
        edx,
        http,
    });

    let router = app(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    tracing::info!("Storefront listening on 0.0.0.0:{}", config.port);

    axum::serve(listener, router).await?;

    Ok(())
}
