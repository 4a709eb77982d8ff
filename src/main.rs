use std::sync::Arc;

use receipt_scanner::config::Config;
use receipt_scanner::extract::ReceiptExtractor;
use receipt_scanner::server::{AppState, run_server};
use receipt_scanner::store::SupabaseStore;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // .env is optional; hosted deployments set real environment variables
    let _ = dotenvy::dotenv();

    // init tracing
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let store = Arc::new(SupabaseStore::new(config.store));
    let extractor = ReceiptExtractor::new(config.vision);
    let state = AppState::new(extractor, store);

    run_server(&config.server, state).await
}
