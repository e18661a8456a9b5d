//! JSON API handler modules, mounted under `/api/iot`.

#[allow(clippy::missing_errors_doc)]
pub mod control;
#[allow(clippy::missing_errors_doc)]
pub mod diagnose;
#[allow(clippy::missing_errors_doc)]
pub mod polarity;
pub mod sse;
#[allow(clippy::missing_errors_doc)]
pub mod status;

use axum::Router;
use axum::routing::{get, post};
use serde::de::DeserializeOwned;

use greenhouse_app::ports::{EventPublisher, SignalBackend};
use greenhouse_domain::error::ValidationError;

use crate::error::ApiError;
use crate::state::AppState;

/// Build the `/api/iot` sub-router.
pub fn routes<B, P>() -> Router<AppState<B, P>>
where
    B: SignalBackend + Send + Sync + 'static,
    P: EventPublisher + Send + Sync + 'static,
{
    Router::new()
        .route("/control", post(control::control::<B, P>))
        .route("/status", get(status::status::<B, P>))
        .route("/polarity", post(polarity::polarity::<B, P>))
        .route("/diagnose", post(diagnose::diagnose::<B, P>))
        .route("/events", get(sse::stream::<B, P>))
}

/// Decode a JSON body, reporting any failure as a 400 with an `error` field.
///
/// Handlers take raw bytes rather than axum's `Json` extractor so that every
/// rejection shares the API's error body.
fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|err| {
        tracing::debug!(error = %err, "rejected request body");
        ApiError::from(ValidationError::MalformedBody)
    })
}
