use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post};
use tower_http::timeout::TimeoutLayer;

use clypr_bridge_telegram::TelegramClient;

use crate::handlers;
use crate::redact::Redactor;
use crate::registry::TokenRegistry;
use crate::source::JobSource;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub registry: TokenRegistry,
    pub source: Arc<dyn JobSource>,
    /// `None` when no bot token is configured; replies are then skipped.
    pub telegram: Option<TelegramClient>,
    pub redactor: Redactor,
}

pub fn build_app(state: AppState, webhook_path: &str, request_timeout_secs: u64) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/livez", get(handlers::livez))
        .route(webhook_path, post(handlers::telegram_webhook))
        .with_state(state)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(request_timeout_secs),
        ))
}
