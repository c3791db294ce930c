//! WebSocket subscriber endpoints (C8 transport): `/ws/gps`, `/ws/sensor`,
//! `/ws/load`, `/ws/alerts`. Ported from `websocket_routes.py`.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::state::AppState;

/// `cid` is a required query parameter in the upstream route signatures
/// (`websocket_routes.py`'s `cid: int` has no default); `pn` is optional.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamQuery {
    pub cid: i64,
    #[serde(default)]
    pub pn: Option<String>,
}

async fn subscribe(state: AppState, streams: &'static [&'static str], query: StreamQuery, socket: WebSocket) {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let cid = query.cid;
    let id = state.hub.register(streams, cid, query.pn.clone(), tx).await;
    tracing::info!(cid, pn = ?query.pn, streams = ?streams, "subscriber connected");

    let (mut sender, mut receiver) = socket.split();

    let forward = async {
        while let Some(message) = rx.recv().await {
            if sender.send(Message::Text(message.into())).await.is_err() {
                break;
            }
        }
    };

    let drain_inbound = async {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    };

    tokio::select! {
        _ = forward => {}
        _ = drain_inbound => {}
    }

    state.hub.unregister(id).await;
    tracing::info!(cid, "subscriber disconnected");
}

pub async fn gps_stream(ws: WebSocketUpgrade, State(state): State<AppState>, Query(query): Query<StreamQuery>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| subscribe(state, &["topic-gps-218"], query, socket))
}

pub async fn sensor_stream(ws: WebSocketUpgrade, State(state): State<AppState>, Query(query): Query<StreamQuery>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| subscribe(state, &["topic-sensor-218"], query, socket))
}

pub async fn load_stream(ws: WebSocketUpgrade, State(state): State<AppState>, Query(query): Query<StreamQuery>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| subscribe(state, &["topic-load-218"], query, socket))
}

pub async fn alerts_stream(ws: WebSocketUpgrade, State(state): State<AppState>, Query(query): Query<StreamQuery>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| subscribe(state, &["alerts"], query, socket))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_query_requires_cid_and_defaults_pn_to_none() {
        let parsed: StreamQuery = serde_urlencoded::from_str("cid=7").unwrap();
        assert_eq!(parsed.cid, 7);
        assert_eq!(parsed.pn, None);
    }
}
