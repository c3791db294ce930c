//! Ingress bridge (C10): accepts a message from the non-native producer over
//! plain HTTP and classifies/dispatches it through the same C6 handlers the
//! bus consumer (C7) uses. Ported from `bridge_endpoint.py::receive_message`.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use fleet_protocol::{GpsEvent, LoadEvent, MessageKind, SensorEvent};
use serde::Deserialize;
use serde_json::json;

use crate::handlers::{self, HandlerContext};
use crate::http::response::{bad_request, internal_error};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct BridgeRequest {
    pub message: String,
}

/// `POST /api/messages`. Unlike the bus path, a GPS message carrying a
/// `trailerLicensePlateNumber` is dispatched only once here — preserved as
/// specified (spec §9 Open Questions).
pub async fn receive_message(
    State(state): State<AppState>,
    Json(payload): Json<BridgeRequest>,
) -> impl IntoResponse {
    let raw: serde_json::Value = match serde_json::from_str(&payload.message) {
        Ok(raw) => raw,
        Err(_) => return bad_request("invalid JSON format in message payload"),
    };

    let Some(kind) = fleet_protocol::classify(&raw) else {
        tracing::warn!(message = %payload.message, "unknown message type for bridge payload");
        return bad_request("unknown message type");
    };

    let ctx = HandlerContext {
        catalog: &state.catalog,
        tire_api: state.tire_api.as_ref(),
        cache: state.cache.as_ref(),
        store: &state.store,
        hub: state.hub.as_ref(),
    };

    let dispatched = match kind {
        MessageKind::Gps => match serde_json::from_value::<GpsEvent>(raw) {
            Ok(event) => {
                handlers::handle_gps(&ctx, event).await;
                true
            }
            Err(_) => false,
        },
        MessageKind::Sensor => match serde_json::from_value::<SensorEvent>(raw) {
            Ok(event) => {
                handlers::handle_sensor(&ctx, event).await;
                true
            }
            Err(_) => false,
        },
        MessageKind::Load => match serde_json::from_value::<LoadEvent>(raw) {
            Ok(event) => {
                handlers::handle_load(&ctx, event).await;
                true
            }
            Err(_) => false,
        },
    };

    if !dispatched {
        return internal_error(format!("failed to deserialize {} payload", kind.as_str()));
    }

    Json(json!({ "status": "success", "message_type": kind.as_str() })).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_gps_payload() {
        let raw = json!({"latitude": 1.0, "longitude": 2.0});
        assert_eq!(fleet_protocol::classify(&raw), Some(MessageKind::Gps));
    }

    #[test]
    fn classifies_sensor_payload() {
        let raw = json!({"pressure": 600, "temperature": 40});
        assert_eq!(fleet_protocol::classify(&raw), Some(MessageKind::Sensor));
    }

    #[test]
    fn rejects_unknown_payload() {
        let raw = json!({"foo": "bar"});
        assert_eq!(fleet_protocol::classify(&raw), None);
    }
}
