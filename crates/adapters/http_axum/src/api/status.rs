//! Device status endpoint.

use axum::Json;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use greenhouse_app::ports::{EventPublisher, SignalBackend};
use greenhouse_domain::status::DeviceStatus;

use crate::error::ApiError;
use crate::state::AppState;

/// One row of the status listing.
#[derive(Serialize)]
pub struct DeviceRow {
    pub name: String,
    /// `"ON"` or `"OFF"`.
    pub state: &'static str,
    pub pin: u32,
    pub active_low: bool,
}

impl From<DeviceStatus> for DeviceRow {
    fn from(status: DeviceStatus) -> Self {
        Self {
            name: status.id.to_string(),
            state: status.state.label(),
            pin: status.pin.number(),
            active_low: status.polarity.is_active_low(),
        }
    }
}

#[derive(Serialize)]
pub struct StatusBody {
    pub status: &'static str,
    pub backend: &'static str,
    pub devices: Vec<DeviceRow>,
}

/// Possible responses from the status endpoint.
pub enum StatusResponse {
    Ok(Json<StatusBody>),
}

impl IntoResponse for StatusResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Ok(json) => json.into_response(),
        }
    }
}

/// `GET /api/iot/status`
pub async fn status<B, P>(
    State(state): State<AppState<B, P>>,
) -> Result<StatusResponse, ApiError>
where
    B: SignalBackend + Send + Sync + 'static,
    P: EventPublisher + Send + Sync + 'static,
{
    let devices = state.store.status().await?;
    Ok(StatusResponse::Ok(Json(StatusBody {
        status: "OK",
        backend: state.store.backend_name(),
        devices: devices.into_iter().map(DeviceRow::from).collect(),
    })))
}
