//! Bus consumer (C7): polls the three telemetry topics and dispatches each
//! message to its C6 handler. Ported from `kafka_consumer.py::consume_kafka`.

use std::time::Duration;

use fleet_protocol::{GpsEvent, LoadEvent, MessageKind, SensorEvent};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::Message;

use crate::config::KafkaConfig;
use crate::handlers::{self, HandlerContext};

const POLL_TIMEOUT: Duration = Duration::from_secs(1);

pub fn build_consumer(config: &KafkaConfig) -> anyhow::Result<StreamConsumer> {
    let mut client_config = ClientConfig::new();
    client_config
        .set("bootstrap.servers", &config.servers)
        .set("group.id", &config.group_id)
        .set("security.protocol", &config.security_protocol)
        .set("auto.offset.reset", &config.auto_offset_reset)
        .set("enable.auto.commit", config.enable_auto_commit.to_string())
        .set(
            "auto.commit.interval.ms",
            config.auto_commit_interval_ms.to_string(),
        )
        .set("session.timeout.ms", config.session_timeout_ms.to_string())
        .set("request.timeout.ms", config.request_timeout_ms.to_string());

    if let Some(mechanism) = &config.sasl_mechanism {
        client_config.set("sasl.mechanism", mechanism);
    }
    if let Some(username) = &config.sasl_username {
        client_config.set("sasl.username", username);
    }
    if let Some(password) = &config.sasl_password {
        client_config.set("sasl.password", password);
    }

    Ok(client_config.create()?)
}

/// Runs the poll loop until `shutdown` resolves. A null poll returns to
/// polling; a handler error (there are none — handlers log and suppress)
/// would otherwise skip the commit, preserving at-least-once delivery.
pub async fn run(consumer: StreamConsumer, ctx_parts: HandlerContext<'_>, shutdown: impl std::future::Future<Output = ()>) {
    tokio::pin!(shutdown);
    if let Err(err) = consumer.subscribe(&[
        MessageKind::Gps.topic(),
        MessageKind::Load.topic(),
        MessageKind::Sensor.topic(),
    ]) {
        tracing::error!(error = %err, "failed to subscribe to bus topics");
        return;
    }
    tracing::info!("bus subscription started");

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("bus consumer shutting down");
                return;
            }
            poll_result = poll_once(&consumer) => {
                let Some(message) = poll_result else { continue };
                handle_message(&consumer, &ctx_parts, message).await;
            }
        }
    }
}

async fn poll_once(consumer: &StreamConsumer) -> Option<rdkafka::error::KafkaResult<rdkafka::message::OwnedMessage>> {
    tokio::time::timeout(POLL_TIMEOUT, consumer.recv())
        .await
        .ok()
        .map(|result| result.map(|borrowed| borrowed.detach()))
}

async fn handle_message(
    consumer: &StreamConsumer,
    ctx: &HandlerContext<'_>,
    message: rdkafka::error::KafkaResult<rdkafka::message::OwnedMessage>,
) {
    let message = match message {
        Ok(message) => message,
        Err(err) => {
            tracing::error!(error = %err, "bus poll error");
            return;
        }
    };

    let topic = message.topic().to_owned();
    let Some(payload) = message.payload() else {
        tracing::warn!(topic, "bus message had no payload");
        return;
    };

    let handled = match topic.as_str() {
        t if t == MessageKind::Gps.topic() => dispatch_gps(ctx, payload).await,
        t if t == MessageKind::Sensor.topic() => dispatch_sensor(ctx, payload).await,
        t if t == MessageKind::Load.topic() => dispatch_load(ctx, payload).await,
        _ => {
            tracing::warn!(topic, "message on unrecognized topic");
            false
        }
    };

    if handled {
        if let Err(err) = consumer.commit_message(&message, CommitMode::Sync) {
            tracing::error!(error = %err, "failed to commit offset");
        }
    }
}

/// GPS messages carrying a `trailerLicensePlateNumber` are dispatched twice
/// — once under the tractor's plate, once (via a deep copy) under the
/// trailer's — per §4.6 point 1. Both dispatches persist and broadcast
/// before the offset commits.
async fn dispatch_gps(ctx: &HandlerContext<'_>, payload: &[u8]) -> bool {
    let Ok(event) = serde_json::from_slice::<GpsEvent>(payload) else {
        tracing::error!("failed to parse GPS message");
        return false;
    };

    if let Some(trailer_plate) = event.trailer_license_plate_number.clone() {
        let mut trailer_event = event.clone();
        trailer_event.license_plate_number = trailer_plate;
        handlers::handle_gps(ctx, event).await;
        handlers::handle_gps(ctx, trailer_event).await;
    } else {
        handlers::handle_gps(ctx, event).await;
    }
    true
}

async fn dispatch_sensor(ctx: &HandlerContext<'_>, payload: &[u8]) -> bool {
    let Ok(event) = serde_json::from_slice::<SensorEvent>(payload) else {
        tracing::error!("failed to parse sensor message");
        return false;
    };
    handlers::handle_sensor(ctx, event).await;
    true
}

async fn dispatch_load(ctx: &HandlerContext<'_>, payload: &[u8]) -> bool {
    let Ok(event) = serde_json::from_slice::<LoadEvent>(payload) else {
        tracing::error!("failed to parse load message");
        return false;
    };
    handlers::handle_load(ctx, event).await;
    true
}
