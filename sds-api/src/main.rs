use sds_api::{build_router, AppState};
use sds_core::Config;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env before anything reads the environment.
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env()?;
    let pool = sds_data::connect(&config.server.database_url).await?;
    let state = AppState::from_config(&config, pool)?;
    let router = build_router(state);

    let bind = std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:5430".into());
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!(%bind, "sd-submit listening");
    axum::serve(listener, router).await?;
    Ok(())
}
