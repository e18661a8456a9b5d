//! Runtime polarity changes, for relay boards that were rewired.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use greenhouse_app::ports::{EventPublisher, SignalBackend};
use greenhouse_domain::error::GreenhouseError;

use super::status::DeviceRow;
use crate::error::ApiError;
use crate::state::AppState;

/// Request body; omitting `active_low` toggles the current polarity.
#[derive(Debug, Deserialize)]
pub struct PolarityRequest {
    pub device: String,
    pub active_low: Option<bool>,
}

/// Possible responses from the polarity endpoint.
pub enum PolarityResponse {
    Ok(Json<DeviceRow>),
}

impl IntoResponse for PolarityResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Ok(json) => json.into_response(),
        }
    }
}

/// `POST /api/iot/polarity`
///
/// The device keeps its logical state: its pin is re-driven at once under
/// the new polarity.
pub async fn polarity<B, P>(
    State(state): State<AppState<B, P>>,
    body: Bytes,
) -> Result<PolarityResponse, ApiError>
where
    B: SignalBackend + Send + Sync + 'static,
    P: EventPublisher + Send + Sync + 'static,
{
    let req: PolarityRequest = super::parse_body(&body)?;
    state.store.availability().await?;
    let id = state
        .store
        .registry()
        .resolver()
        .resolve_or_err(&req.device)
        .map_err(GreenhouseError::from)?;

    let status = match req.active_low {
        Some(active_low) => state.store.set_polarity(&id, active_low).await?,
        None => state.store.toggle_polarity(&id).await?,
    };
    Ok(PolarityResponse::Ok(Json(status.into())))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use greenhouse_adapter_virtual::VirtualGpio;
    use greenhouse_domain::device::Pin;
    use greenhouse_domain::id::DeviceId;
    use greenhouse_domain::signal::Level;
    use serde_json::json;
    use tower::ServiceExt;

    use crate::router;
    use crate::state::testing::{body_json, ready};

    fn post(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/iot/polarity")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn should_redrive_pin_when_polarity_set() {
        let gpio = Arc::new(VirtualGpio::new());
        let state = ready(Arc::clone(&gpio)).await;
        state
            .store
            .set_device(&DeviceId::new("pump"), true)
            .await
            .unwrap();
        let app = router::build(state);

        let response = app
            .oneshot(post(json!({"device": "pump", "active_low": false})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({"name": "pump", "state": "ON", "pin": 13, "active_low": false})
        );
        assert_eq!(gpio.level(Pin::new(13)), Some(Level::High));
    }

    #[tokio::test]
    async fn should_toggle_polarity_when_active_low_omitted() {
        let app = router::build(ready(Arc::new(VirtualGpio::new())).await);

        let response = app.oneshot(post(json!({"device": "Đèn"}))).await.unwrap();

        let body = body_json(response).await;
        assert_eq!(body["name"], "light");
        assert_eq!(body["active_low"], false);
    }

    #[tokio::test]
    async fn should_return_not_found_listing_devices_when_unknown() {
        let app = router::build(ready(Arc::new(VirtualGpio::new())).await);

        let response = app.oneshot(post(json!({"device": "heater"}))).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            body_json(response).await["error"],
            "unknown device 'heater'; valid devices: fan1, fan2, pump, light"
        );
    }

    #[tokio::test]
    async fn should_return_bad_request_when_device_missing() {
        let app = router::build(ready(Arc::new(VirtualGpio::new())).await);
        let response = app.oneshot(post(json!({"active_low": true}))).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
