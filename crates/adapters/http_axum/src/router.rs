//! Axum router assembly.

use axum::Json;
use axum::Router;
use axum::routing::get;
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;

use greenhouse_app::ports::{EventPublisher, SignalBackend};

use crate::state::AppState;

/// Build the top-level axum [`Router`].
///
/// Nests the device API under `/api/iot`. Includes a [`TraceLayer`] that logs
/// each HTTP request/response at the `DEBUG` level using the `tracing`
/// ecosystem.
pub fn build<B, P>(state: AppState<B, P>) -> Router
where
    B: SignalBackend + Send + Sync + 'static,
    P: EventPublisher + Send + Sync + 'static,
{
    Router::new()
        .route("/", get(alive))
        .route("/health", get(health_check))
        .nest("/api/iot", crate::api::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn alive() -> Json<Value> {
    Json(json!({"msg": "greenhouse API alive"}))
}

async fn health_check() -> &'static str {
    "OK"
}
