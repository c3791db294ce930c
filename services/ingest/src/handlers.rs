//! Message handlers (C6): one per event kind, sharing the reassignment →
//! position → enrichment → threshold → persist → broadcast skeleton of
//! spec §4.6. Ported from `kafka_consumer.py::handle_{gps,sensor,load}_message`.

use fleet_protocol::{Alert, AlertStatus, EmbeddedAlert, EnrichmentFields, GpsEvent, LoadEvent, MessageKind, OpenAlertFilter, SensorEvent};
use sqlx::MySqlPool;
use tire_api_client::TireApiClient;
use tracing::Instrument;
use uuid::Uuid;

use crate::cache::EnrichmentCache;
use crate::hub::SubscriptionHub;

pub struct HandlerContext<'a> {
    pub catalog: &'a MySqlPool,
    pub tire_api: &'a TireApiClient,
    pub cache: &'a EnrichmentCache,
    pub store: &'a doc_store::DocStore,
    pub hub: &'a SubscriptionHub,
}

fn short_folio() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_owned()
}

/// Persists and broadcasts one embedded alert, skipping creation (with a
/// warning) if either identifier required by §4.6 point 6 is missing.
async fn persist_and_broadcast_alert(
    ctx: &HandlerContext<'_>,
    vehicle_id: &str,
    license_plate: &str,
    enrichment: &EnrichmentFields,
    real_position: Option<u32>,
    receive_time: Option<&str>,
    alert: &EmbeddedAlert,
) {
    let Some(unit_identifier) = enrichment.unit_identifier.clone() else {
        tracing::warn!(license_plate, "alert not created: missing unitIdentifier");
        return;
    };
    if license_plate.is_empty() {
        tracing::warn!("alert not created: missing licensePlateNumber");
        return;
    }

    let doc = Alert {
        folio: short_folio(),
        status: AlertStatus::Open,
        r#type: alert.r#type,
        name: alert.name,
        value: alert.value,
        tire_id: alert.tire_id.clone(),
        license_plate_number: Some(license_plate.to_owned()),
        vehicle_id: Some(vehicle_id.to_owned()),
        real_position,
        receive_time: receive_time.map(str::to_owned),
        unit_identifier: Some(unit_identifier),
        unit_type: enrichment.unit_type.clone(),
        company_id: None,
    };
    let filter = OpenAlertFilter {
        vehicle_id: vehicle_id.to_owned(),
        tire_id: alert.tire_id.clone(),
        r#type: alert.r#type,
        name: alert.name,
    };

    if let Err(err) = ctx.store.upsert_open_alert(&filter, &doc).await {
        tracing::error!(error = %err, "failed to upsert alert");
        return;
    }
    if let Ok(payload) = serde_json::to_string(&doc) {
        ctx.hub.broadcast("alerts", &payload, ctx.catalog).await;
    }
}

/// Resolves a tire/wheel position via C5, fetching the unit's axle layout
/// only when needed (axle 0 is the spare-tire marker and needs no layout).
async fn resolve_real_position(
    ctx: &HandlerContext<'_>,
    license_plate: &str,
    axle_index: Option<u32>,
    wheel_index: Option<u32>,
) -> (Option<u32>, Option<String>) {
    let (Some(axle), Some(wheel)) = (axle_index, wheel_index) else {
        return (None, None);
    };
    let layout = if axle != 0 {
        catalog_client::truck_layout(ctx.catalog, license_plate)
            .await
            .unwrap_or(None)
    } else {
        None
    };
    match fleet_core::resolve_position(axle, wheel, layout.as_ref()) {
        Some(resolved) => (Some(resolved.real_position), resolved.spare_tire_note),
        None => (None, None),
    }
}

pub async fn handle_gps(ctx: &HandlerContext<'_>, event: GpsEvent) -> GpsEvent {
    let span = fleet_core::vehicle_span(&event.license_plate_number);
    handle_gps_inner(ctx, event).instrument(span).await
}

async fn handle_gps_inner(ctx: &HandlerContext<'_>, mut event: GpsEvent) -> GpsEvent {
    let fetched = ctx
        .cache
        .get_or_fetch(&event.license_plate_number, &event.vehicle_id, ctx.catalog, ctx.tire_api)
        .await;
    event.enrichment.apply(&fetched);

    if let Err(err) = ctx.store.upsert_gps(&event).await {
        tracing::error!(error = %err, "failed to upsert GPS document");
    }

    match ctx.store.close_gps_timeout_alert(&event.vehicle_id).await {
        Ok(true) => tracing::info!("closed open gps_timeout alert"),
        Ok(false) => {}
        Err(err) => tracing::error!(error = %err, "failed to close gps_timeout alert"),
    }

    if let Ok(payload) = serde_json::to_string(&event) {
        ctx.hub.broadcast(MessageKind::Gps.topic(), &payload, ctx.catalog).await;
    }
    event
}

pub async fn handle_sensor(ctx: &HandlerContext<'_>, event: SensorEvent) -> SensorEvent {
    let span = fleet_core::vehicle_span(&event.license_plate_number);
    handle_sensor_inner(ctx, event).instrument(span).await
}

async fn handle_sensor_inner(ctx: &HandlerContext<'_>, mut event: SensorEvent) -> SensorEvent {
    if let (Some(trailer), Some(tyre_code)) = (
        event.trailer_license_plate_number.clone(),
        event.tyre_code.clone(),
    ) {
        if let Ok(Some(unit)) = catalog_client::unit_id_for_tire(ctx.catalog, &tyre_code).await {
            if unit == trailer {
                event.enrichment.tractor_name = Some(event.license_plate_number.clone());
                event.license_plate_number = unit;
                event.trailer_license_plate_number = None;
            }
        }
    }

    let (real_position, spare_tire_note) =
        resolve_real_position(ctx, &event.license_plate_number, event.axle_index, event.wheel_index).await;
    event.real_position = real_position;
    event.spare_tire_note = spare_tire_note;

    let fetched = ctx
        .cache
        .get_or_fetch(&event.license_plate_number, &event.vehicle_id, ctx.catalog, ctx.tire_api)
        .await;
    event.enrichment.apply(&fetched);

    if let Some(psi) = event.pressure {
        event.pressure = Some(fleet_core::psi_to_bar(psi));
    }

    let alerts = fleet_core::evaluate_sensor_alerts(event.pressure, event.temperature, event.tyre_id.as_deref());
    event.alerts = alerts.clone();

    for alert in &alerts {
        persist_and_broadcast_alert(
            ctx,
            &event.vehicle_id,
            &event.license_plate_number,
            &event.enrichment,
            event.real_position,
            Some(&event.receive_time),
            alert,
        )
        .await;
    }

    let tyre_id = event.tyre_id.clone().unwrap_or_default();
    if let Err(err) = ctx.store.upsert_sensor(&event, &tyre_id).await {
        tracing::error!(error = %err, "failed to upsert sensor document");
    }

    if let Ok(payload) = serde_json::to_string(&event) {
        ctx.hub
            .broadcast(MessageKind::Sensor.topic(), &payload, ctx.catalog)
            .await;
    }
    event
}

pub async fn handle_load(ctx: &HandlerContext<'_>, event: LoadEvent) -> LoadEvent {
    let span = fleet_core::vehicle_span(&event.license_plate_number);
    handle_load_inner(ctx, event).instrument(span).await
}

async fn handle_load_inner(ctx: &HandlerContext<'_>, mut event: LoadEvent) -> LoadEvent {
    if let Some(tyre_code) = event.tyre_code.clone() {
        if let Ok(Some(unit)) = catalog_client::unit_id_for_tire(ctx.catalog, &tyre_code).await {
            if unit != event.license_plate_number {
                event.enrichment.tractor_name = Some(event.license_plate_number.clone());
                event.license_plate_number = unit;
            }
        }
    }

    let (real_position, spare_tire_note) =
        resolve_real_position(ctx, &event.license_plate_number, event.axle_index, event.wheel_index).await;
    event.real_position = real_position;
    event.spare_tire_note = spare_tire_note;

    let fetched = ctx
        .cache
        .get_or_fetch(&event.license_plate_number, &event.vehicle_id, ctx.catalog, ctx.tire_api)
        .await;
    event.enrichment.apply(&fetched);

    let alerts = fleet_core::evaluate_load_alerts(event.now_thread_depth, event.tyre_id.as_deref());
    event.alerts = alerts.clone();

    for alert in &alerts {
        persist_and_broadcast_alert(
            ctx,
            &event.vehicle_id,
            &event.license_plate_number,
            &event.enrichment,
            event.real_position,
            None,
            alert,
        )
        .await;
    }

    let tyre_id = event.tyre_id.clone().unwrap_or_default();
    if let Err(err) = ctx.store.upsert_load(&event, &tyre_id).await {
        tracing::error!(error = %err, "failed to upsert load document");
    }

    if let Ok(payload) = serde_json::to_string(&event) {
        ctx.hub
            .broadcast(MessageKind::Load.topic(), &payload, ctx.catalog)
            .await;
    }
    event
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_folio_is_8_lowercase_hex_chars() {
        let folio = short_folio();
        assert_eq!(folio.len(), 8);
        assert!(folio.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
