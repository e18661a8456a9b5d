//! Pin diagnostics: drive a device's pin through a fixed pattern and read it back.

use std::time::Duration;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use greenhouse_app::ports::{EventPublisher, SignalBackend};
use greenhouse_domain::error::GreenhouseError;
use greenhouse_domain::status::DiagnosticReport;

use crate::error::ApiError;
use crate::state::AppState;

const DEFAULT_CYCLES: u32 = 2;
const MAX_CYCLES: u32 = 3;
const DEFAULT_DELAY_MS: u64 = 500;
const MAX_DELAY_MS: u64 = 1_000;

#[derive(Debug, Deserialize)]
pub struct DiagnoseRequest {
    pub device: String,
    pub cycles: Option<u32>,
    pub delay_ms: Option<u64>,
}

#[derive(Serialize)]
pub struct DiagnoseBody {
    pub status: &'static str,
    pub levels_follow_writes: bool,
    #[serde(flatten)]
    pub report: DiagnosticReport,
}

/// Possible responses from the diagnose endpoint.
pub enum DiagnoseResponse {
    Ok(Json<DiagnoseBody>),
}

impl IntoResponse for DiagnoseResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Ok(json) => json.into_response(),
        }
    }
}

/// `POST /api/iot/diagnose`
///
/// Cycles and delay are clamped, so a run lasts at most 12 s. Other requests
/// only wait for one pin access at a time. The device is left OFF.
pub async fn diagnose<B, P>(
    State(state): State<AppState<B, P>>,
    body: Bytes,
) -> Result<DiagnoseResponse, ApiError>
where
    B: SignalBackend + Send + Sync + 'static,
    P: EventPublisher + Send + Sync + 'static,
{
    let req: DiagnoseRequest = super::parse_body(&body)?;
    state.store.availability().await?;
    let id = state
        .store
        .registry()
        .resolver()
        .resolve_or_err(&req.device)
        .map_err(GreenhouseError::from)?;

    let cycles = req.cycles.unwrap_or(DEFAULT_CYCLES).clamp(1, MAX_CYCLES);
    let delay = Duration::from_millis(req.delay_ms.unwrap_or(DEFAULT_DELAY_MS).min(MAX_DELAY_MS));
    let report = state.store.diagnose(&id, cycles, delay).await?;

    Ok(DiagnoseResponse::Ok(Json(DiagnoseBody {
        status: "OK",
        levels_follow_writes: report.levels_follow_writes(),
        report,
    })))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use greenhouse_adapter_virtual::VirtualGpio;
    use serde_json::json;
    use tower::ServiceExt;

    use crate::router;
    use crate::state::testing::{body_json, ready};

    fn post(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/iot/diagnose")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn should_report_every_step_when_diagnosed() {
        let gpio = Arc::new(VirtualGpio::with_readback());
        let app = router::build(ready(Arc::clone(&gpio)).await);

        let response = app
            .oneshot(post(json!({"device": "fan2", "cycles": 1, "delay_ms": 0})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["device_id"], "fan2");
        assert_eq!(body["pin"], 6);
        assert_eq!(body["backend"], "virtual");
        assert_eq!(body["levels_follow_writes"], true);
        let steps: Vec<_> = body["samples"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["step"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(
            steps,
            vec!["direct_high", "direct_low", "logical_on", "logical_off"]
        );
    }

    #[tokio::test]
    async fn should_clamp_cycles_to_maximum() {
        let app = router::build(ready(Arc::new(VirtualGpio::new())).await);
        let response = app
            .oneshot(post(json!({"device": "pump", "cycles": 50, "delay_ms": 0})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["samples"].as_array().unwrap().len(), 12);
    }

    #[tokio::test]
    async fn should_return_not_found_when_device_unknown() {
        let app = router::build(ready(Arc::new(VirtualGpio::new())).await);
        let response = app
            .oneshot(post(json!({"device": "heater", "delay_ms": 0})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
