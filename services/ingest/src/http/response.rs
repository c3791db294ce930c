//! Shared HTTP response helpers, ported in spirit from
//! `server::http::response` — a small typed envelope rather than ad hoc
//! `Json`/`StatusCode` tuples scattered across handlers.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub type HttpResponse = Response;

/// Matches the upstream service's `{"error": "<message>"}` error body
/// (`init_endpoints.py`/`bridge_endpoint.py` both return this shape).
pub fn json_error(status: StatusCode, message: impl Into<String>) -> HttpResponse {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

pub fn bad_request(message: impl Into<String>) -> HttpResponse {
    json_error(StatusCode::BAD_REQUEST, message)
}

pub fn internal_error(message: impl std::fmt::Display) -> HttpResponse {
    json_error(StatusCode::INTERNAL_SERVER_ERROR, message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn bad_request_carries_the_message_under_error() {
        let response = bad_request("invalid JSON format in message payload");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["error"], "invalid JSON format in message payload");
    }

    #[tokio::test]
    async fn internal_error_uses_500() {
        let response = internal_error("boom");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
