//! Device control endpoint.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use greenhouse_app::ports::{EventPublisher, SignalBackend};
use greenhouse_app::services::dispatcher::DispatchOutcome;
use greenhouse_domain::control::ControlResult;
use greenhouse_domain::id::DeviceId;
use greenhouse_domain::signal::SwitchState;

use crate::error::ApiError;
use crate::state::AppState;

/// Response body of the control endpoint.
#[derive(Serialize)]
pub struct ControlBody {
    status: &'static str,
    #[serde(rename = "deviceId", skip_serializing_if = "Option::is_none")]
    device_id: Option<String>,
    results: Vec<ControlResult>,
    current_states: CurrentStates,
}

/// `{"fan1": "on", ...}` in registry order.
struct CurrentStates(Vec<(DeviceId, bool)>);

impl Serialize for CurrentStates {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (id, on) in &self.0 {
            map.serialize_entry(id, &SwitchState::from(*on))?;
        }
        map.end()
    }
}

impl From<DispatchOutcome> for ControlBody {
    fn from(outcome: DispatchOutcome) -> Self {
        Self {
            status: "OK",
            device_id: outcome.label,
            results: outcome.results,
            current_states: CurrentStates(outcome.current_states),
        }
    }
}

/// Possible responses from the control endpoint.
pub enum ControlResponse {
    Ok(Json<ControlBody>),
}

impl IntoResponse for ControlResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Ok(json) => json.into_response(),
        }
    }
}

/// `POST /api/iot/control`
///
/// Accepts every supported request shape. Per-device failures are reported
/// inside a 200 response; only unusable bodies (400) and an unavailable
/// backend (503) fail the request as a whole.
pub async fn control<B, P>(
    State(state): State<AppState<B, P>>,
    body: Bytes,
) -> Result<ControlResponse, ApiError>
where
    B: SignalBackend + Send + Sync + 'static,
    P: EventPublisher + Send + Sync + 'static,
{
    let body: serde_json::Value = super::parse_body(&body)?;
    let outcome = state.dispatcher.dispatch(&body).await?;
    Ok(ControlResponse::Ok(Json(outcome.into())))
}
