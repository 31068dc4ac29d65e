use tracing_subscriber::EnvFilter;

use product_page_api::config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn")),
        )
        .init();

    let config = config::config();
    tracing::info!("Starting product page API in {:?} mode", config.environment);

    product_page_api::serve(config, config.api.port).await
}
