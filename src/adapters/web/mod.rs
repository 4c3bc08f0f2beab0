//! HTTP query surface over a running stream.
//!
//! JSON endpoints for the journal, trend state, per-bar diagnostics and
//! overrides, plus a bar intake for live feeds.

mod error;
mod handlers;

pub use error::WebError;
pub use handlers::*;

use axum::{
    Router,
    routing::get,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::domain::query::EngineHandle;
use crate::ports::trade_store::TradeStore;

pub struct AppState {
    pub handle: EngineHandle,
    pub trade_store: Option<Arc<dyn TradeStore>>,
    pub stream: String,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/logs", get(handlers::logs))
        .route("/api/trend", get(handlers::trend))
        .route("/api/diagnostics", get(handlers::diagnostics))
        .route(
            "/api/overrides",
            get(handlers::get_overrides).patch(handlers::patch_overrides),
        )
        .route("/api/trades", get(handlers::trades))
        .route("/api/journal/quality", get(handlers::journal_quality))
        .route("/api/bars", axum::routing::post(handlers::ingest_bars))
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}
