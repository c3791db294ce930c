//! Signed HTTP client for the external tire-data API (C2).
//!
//! Ported from `smarttyre_api.py::SmartTyreAPI`. The core pipeline calls
//! exactly one operation, [`TireApiClient::tires_info_by_vehicle`]; the rest
//! of the upstream client's surface (vehicle/tyre/sensor/tbox CRUD,
//! reference-data lookups) is outside the ingest pipeline's call graph per
//! spec §4.2 and is not reproduced here.

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fleet_protocol::TireApiFields;
use rand::RngCore;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum TireApiError {
    #[error("tire API request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("tire API response was not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
}

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

pub struct TireApiClient {
    http: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: String,
    sign_key: String,
    /// Access token acquired lazily on first use and cached across requests.
    token: RwLock<Option<String>>,
}

impl TireApiClient {
    pub fn new(
        base_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        sign_key: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .expect("reqwest client builder should never fail with default settings"),
            base_url: base_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            sign_key: sign_key.into(),
            token: RwLock::new(None),
        }
    }

    fn new_headers(&self, access_token: Option<&str>) -> BTreeMap<String, String> {
        let mut headers = BTreeMap::new();
        headers.insert("clientId".to_owned(), self.client_id.clone());
        headers.insert("timestamp".to_owned(), epoch_millis_string());
        headers.insert("nonce".to_owned(), random_nonce_hex());
        if let Some(token) = access_token {
            headers.insert("accessToken".to_owned(), token.to_owned());
        }
        headers
    }

    /// POSTs `body` to `endpoint`, signing the request per C2's algorithm.
    /// Returns the response's `data` field, or `None` on any non-200
    /// response or transport failure — enrichment proceeds without tire-API
    /// data rather than propagating the error (spec §4.2).
    async fn post(&self, endpoint: &str, body: &str, access_token: Option<&str>) -> Option<serde_json::Value> {
        let url = format!("{}{endpoint}", self.base_url);
        let headers = self.new_headers(access_token);
        let sign = fleet_core::sign(&headers, Some(body), &BTreeMap::new(), &[], &self.sign_key);

        let mut request = self.http.post(&url).body(body.to_owned());
        for (key, value) in &headers {
            request = request.header(key.as_str(), value.as_str());
        }
        request = request
            .header("sign", sign)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json");

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, endpoint, "tire API request failed");
                return None;
            }
        };
        if response.status().as_u16() != 200 {
            debug!(status = %response.status(), endpoint, "tire API returned non-200");
            return None;
        }
        match response.json::<serde_json::Value>().await {
            Ok(mut body) => body.get_mut("data").map(serde_json::Value::take),
            Err(err) => {
                warn!(error = %err, endpoint, "tire API response was not valid JSON");
                None
            }
        }
    }

    async fn ensure_access_token(&self) -> Option<String> {
        if let Some(token) = self.token.read().await.clone() {
            return Some(token);
        }

        let body = json!({
            "clientId": self.client_id,
            "clientSecret": self.client_secret,
            "grantType": "client_credentials",
        })
        .to_string();

        let data = self
            .post("/smartyre/openapi/auth/oauth20/authorize", &body, None)
            .await?;

        #[derive(Deserialize)]
        struct TokenResponse {
            #[serde(rename = "accessToken")]
            access_token: String,
        }
        let token: TokenResponse = serde_json::from_value(data).ok()?;

        *self.token.write().await = Some(token.access_token.clone());
        Some(token.access_token)
    }

    /// Returns the enrichment fields contributed by the tire API (C2) for
    /// `vehicle_id`, or `None` on any failure — the caller merges this with
    /// catalog data and proceeds regardless (spec §4.2/§4.4).
    pub async fn tires_info_by_vehicle(&self, vehicle_id: &str) -> Option<TireApiFields> {
        if vehicle_id.is_empty() {
            return None;
        }
        let token = self.ensure_access_token().await?;
        let body = json!({ "vehicleId": vehicle_id }).to_string();
        let data = self
            .post("/smartyre/openapi/vehicle/tyre/data", &body, Some(&token))
            .await?;
        serde_json::from_value(data).ok()
    }
}

fn epoch_millis_string() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO);
    now.as_millis().to_string()
}

fn random_nonce_hex() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_carry_client_id_timestamp_and_nonce() {
        let client = TireApiClient::new("https://example.com", "cid", "secret", "key");
        let headers = client.new_headers(None);
        assert_eq!(headers.get("clientId"), Some(&"cid".to_owned()));
        assert!(headers.contains_key("timestamp"));
        assert_eq!(headers.get("nonce").map(String::len), Some(32));
        assert!(!headers.contains_key("accessToken"));
    }

    #[test]
    fn headers_include_access_token_when_provided() {
        let client = TireApiClient::new("https://example.com", "cid", "secret", "key");
        let headers = client.new_headers(Some("tok-123"));
        assert_eq!(headers.get("accessToken"), Some(&"tok-123".to_owned()));
    }

    #[tokio::test]
    async fn tires_info_by_vehicle_returns_none_for_empty_vehicle_id() {
        let client = TireApiClient::new("https://example.invalid", "cid", "secret", "key");
        assert!(client.tires_info_by_vehicle("").await.is_none());
    }

    #[test]
    fn nonce_is_128_bits_of_hex() {
        let nonce = random_nonce_hex();
        assert_eq!(nonce.len(), 32);
        assert!(nonce.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
