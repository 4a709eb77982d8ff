use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api;
use crate::config::ServerConfig;
use crate::extract::ReceiptExtractor;
use crate::store::ReceiptStore;

/// Shared handler state. Cheap to clone; both collaborators are internally
/// immutable behind their Arcs.
#[derive(Clone)]
pub struct AppState {
    pub extractor: Arc<ReceiptExtractor>,
    pub store: Arc<dyn ReceiptStore>,
}

impl AppState {
    pub fn new(extractor: ReceiptExtractor, store: Arc<dyn ReceiptStore>) -> Self {
        AppState {
            extractor: Arc::new(extractor),
            store,
        }
    }
}

// Phone camera output does not fit axum's 2 MB default body limit.
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/extract", post(api::extract_receipt))
        .route(
            "/api/receipts",
            post(api::create_receipt).get(api::list_receipts),
        )
        .route("/health", get(api::health))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        // The browser front end is served from a different origin
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

pub async fn run_server(
    config: &ServerConfig,
    state: AppState,
) -> Result<(), Box<dyn std::error::Error>> {
    let router = create_router(state);

    info!(addr = %config.bind, "Receipt scanner API listening");

    let listener = TcpListener::bind(config.bind).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
