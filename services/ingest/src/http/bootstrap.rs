//! Bootstrap query service (C9): cold-start snapshots with adaptive
//! time-window expansion, GPS-timeout synthesis, and open-alert
//! reconciliation. Ported from `init_endpoints.py`.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, SecondsFormat, Utc};
use fleet_protocol::{Alert, AlertName, AlertStatus, AlertType, OpenAlertFilter};
use mongodb::bson::{doc, Document};
use serde::Deserialize;
use sqlx::MySqlPool;
use uuid::Uuid;

use crate::hub::SubscriptionHub;
use crate::http::response::internal_error;
use crate::state::AppState;

const MAX_ALERTS: i64 = 500;
const DELAYED_BROADCAST_DELAY: Duration = Duration::from_secs(3);
const DELAYED_BROADCAST_GAP: Duration = Duration::from_millis(500);
const GPS_TIMEOUT_MINUTES: i64 = 30;

#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapQuery {
    #[serde(default, rename = "licensePlateNumber")]
    pub license_plate_number: Option<String>,
    #[serde(default)]
    pub pn: Vec<String>,
    #[serde(default)]
    pub cid: Option<i64>,
}

/// The plate set resolved from a bootstrap request, per §4.9's resolution
/// order. `Unrestricted` covers both `cid == 2` and the case the original
/// leaves unfiltered when no `cid` is given at all and no `pn` list was
/// passed (`licensePlates` stays `None` in `init_endpoints.py`, so no
/// `licensePlateNumber` match clause is ever added).
enum ResolvedPlates {
    Unrestricted,
    Filtered(Vec<String>),
}

async fn resolve_plates(query: &BootstrapQuery, catalog: &MySqlPool) -> ResolvedPlates {
    if query.cid == Some(2) {
        return ResolvedPlates::Unrestricted;
    }
    if let Some(cid) = query.cid {
        if query.pn.is_empty() && query.license_plate_number.is_none() {
            let plates = catalog_client::plates_for_company(catalog, cid)
                .await
                .unwrap_or_else(|err| {
                    tracing::error!(error = %err, cid, "failed to resolve plates for company");
                    Vec::new()
                });
            return ResolvedPlates::Filtered(plates);
        }
        return ResolvedPlates::Filtered(query.pn.clone());
    }
    if query.pn.is_empty() {
        return ResolvedPlates::Unrestricted;
    }
    ResolvedPlates::Filtered(query.pn.clone())
}

/// `true` once resolution should short-circuit with an empty `[]` response,
/// per the early-return in every `/init/*` handler in `init_endpoints.py`.
fn resolved_to_empty_response(resolved: &ResolvedPlates) -> bool {
    matches!(resolved, ResolvedPlates::Filtered(plates) if plates.is_empty())
}

fn window_start(days: i64) -> String {
    let start = Utc::now() - chrono::Duration::days(days);
    start.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn match_stage(time_field: &str, days: i64, license_plate_number: Option<&str>, plates: Option<&[String]>) -> Document {
    let mut match_doc = doc! { time_field: { "$gte": window_start(days) } };
    if let Some(plate) = license_plate_number {
        match_doc.insert("licensePlateNumber", plate.trim());
    } else if let Some(plates) = plates {
        if !plates.is_empty() {
            match_doc.insert("licensePlateNumber", doc! { "$in": plates.to_vec() });
        }
    }
    match_doc
}

/// Strips the store id, tags `source = "initial"`, and cleans surrogate
/// placeholders out of every string field, per `clean_entry`.
fn clean_document(doc: &mut Document) {
    doc.remove("_id");
    doc.insert("source", "initial");
    let keys: Vec<String> = doc.keys().cloned().collect();
    for key in keys {
        if let Ok(value) = doc.get_str(&key) {
            let cleaned = fleet_core::clean_surrogates(value);
            if cleaned != value {
                doc.insert(key, cleaned);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// GPS: exhaustive per-plate expansion (§4.9)
// ---------------------------------------------------------------------------

fn gps_pipeline(days: i64, license_plate_number: Option<&str>, plates: Option<&[String]>, already_found: Option<&[String]>) -> Vec<Document> {
    let mut match_doc = match_stage("receiveTime", days, license_plate_number, plates);
    if let Some(found) = already_found {
        if !found.is_empty() {
            match_doc.insert("licensePlateNumber", doc! { "$nin": found.to_vec() });
        }
    }
    vec![
        doc! { "$match": match_doc },
        doc! { "$sort": { "licensePlateNumber": 1, "receiveTime": -1 } },
        doc! { "$group": { "_id": "$licensePlateNumber", "doc": { "$first": "$$ROOT" } } },
        doc! { "$replaceRoot": { "newRoot": "$doc" } },
    ]
}

async fn gps_exhaustive_expansion(
    store: &doc_store::DocStore,
    resolved: &ResolvedPlates,
    license_plate_number: Option<&str>,
) -> Vec<Document> {
    let mut found: HashMap<String, Document> = HashMap::new();
    let mut plates_to_find: Option<HashSet<String>> = match resolved {
        ResolvedPlates::Unrestricted => None,
        ResolvedPlates::Filtered(plates) => Some(plates.iter().cloned().collect()),
    };

    for days in fleet_core::EXPANSION_WINDOWS_DAYS {
        if let Some(remaining) = &plates_to_find {
            if remaining.is_empty() {
                break;
            }
        }

        let plates_list: Option<Vec<String>> = plates_to_find.as_ref().map(|set| set.iter().cloned().collect());
        let already_found: Option<Vec<String>> = if plates_to_find.is_none() && !found.is_empty() {
            Some(found.keys().cloned().collect())
        } else {
            None
        };
        let pipeline = gps_pipeline(days, license_plate_number, plates_list.as_deref(), already_found.as_deref());

        let entries = match store.aggregate("TruckRideLog", pipeline).await {
            Ok(entries) => entries,
            Err(err) => {
                tracing::error!(error = %err, days, "gps bootstrap aggregation failed");
                continue;
            }
        };

        let mut newly_found = 0usize;
        for mut entry in entries {
            let Some(plate) = entry.get_str("licensePlateNumber").ok().map(str::to_owned) else {
                continue;
            };
            if found.contains_key(&plate) {
                continue;
            }
            clean_document(&mut entry);
            found.insert(plate.clone(), entry);
            newly_found += 1;
            if let Some(remaining) = plates_to_find.as_mut() {
                remaining.remove(&plate);
            }
        }
        tracing::info!(days, newly_found, total = found.len(), "gps bootstrap window expansion");
    }

    found.into_values().collect()
}

fn minutes_since(receive_time: &str) -> Option<i64> {
    let parsed = DateTime::parse_from_rfc3339(receive_time).ok()?;
    Some(Utc::now().signed_duration_since(parsed.with_timezone(&Utc)).num_minutes())
}

fn short_folio() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_owned()
}

/// Rewrites each stale GPS document in place (`unitStatus`/`spkm`), upserts
/// a `gps_timeout` alert for it, and schedules the delayed broadcast task.
/// Does not block the caller — the task is detached and tied to `shutdown`.
async fn synthesize_gps_timeouts(
    store: doc_store::DocStore,
    hub: std::sync::Arc<SubscriptionHub>,
    catalog: MySqlPool,
    shutdown: tokio_util::sync::CancellationToken,
    cid: Option<i64>,
    results: &mut Vec<Document>,
) {
    let mut alerts_to_broadcast = Vec::new();

    for doc in results.iter_mut() {
        let Some(receive_time) = doc.get_str("receiveTime").ok().map(str::to_owned) else {
            continue;
        };
        let Some(minutes) = minutes_since(&receive_time) else {
            continue;
        };
        if fleet_core::gps_timeout_minutes(minutes).is_none() {
            continue;
        }

        doc.insert("unitStatus", "offline");
        doc.insert("spkm", 0.0);

        let plate = doc.get_str("licensePlateNumber").ok().map(str::to_owned);
        let Some(vehicle_id) = doc.get_str("vehicleId").ok().map(str::to_owned) else {
            continue;
        };
        let unit_identifier = doc.get_str("unitIdentifier").ok().map(str::to_owned);

        let alert = Alert {
            folio: short_folio(),
            status: AlertStatus::Open,
            r#type: AlertType::Gps,
            name: AlertName::GpsTimeout,
            value: minutes as f64,
            tire_id: None,
            license_plate_number: plate.clone(),
            vehicle_id: Some(vehicle_id.clone()),
            real_position: None,
            receive_time: Some(receive_time),
            unit_identifier,
            unit_type: None,
            company_id: cid,
        };
        let filter = OpenAlertFilter {
            vehicle_id,
            tire_id: None,
            r#type: AlertType::Gps,
            name: AlertName::GpsTimeout,
        };
        if let Err(err) = store.upsert_open_alert(&filter, &alert).await {
            tracing::error!(error = %err, "failed to upsert gps_timeout alert");
            continue;
        }
        tracing::info!(plate = ?plate, "gps_timeout alert generated; broadcast delayed");
        alerts_to_broadcast.push(alert);
    }

    if alerts_to_broadcast.is_empty() {
        return;
    }

    tokio::spawn(async move {
        tokio::select! {
            _ = shutdown.cancelled() => {}
            _ = delayed_broadcast(hub, catalog, alerts_to_broadcast) => {}
        }
    });
}

async fn delayed_broadcast(hub: std::sync::Arc<SubscriptionHub>, catalog: MySqlPool, alerts: Vec<Alert>) {
    tokio::time::sleep(DELAYED_BROADCAST_DELAY).await;
    for alert in alerts {
        if alert.unit_identifier.is_none() {
            tracing::warn!(plate = ?alert.license_plate_number, "delayed gps_timeout alert skipped: missing unitIdentifier");
            continue;
        }
        if let Ok(payload) = serde_json::to_string(&alert) {
            hub.broadcast("alerts", &payload, &catalog).await;
            tracing::info!(plate = ?alert.license_plate_number, "delayed gps_timeout alert broadcast");
        }
        tokio::time::sleep(DELAYED_BROADCAST_GAP).await;
    }
}

pub async fn init_gps(State(state): State<AppState>, Query(query): Query<BootstrapQuery>) -> impl IntoResponse {
    let resolved = resolve_plates(&query, &state.catalog).await;
    if resolved_to_empty_response(&resolved) {
        return Json(Vec::<Document>::new()).into_response();
    }

    let mut results = gps_exhaustive_expansion(&state.store, &resolved, query.license_plate_number.as_deref()).await;

    synthesize_gps_timeouts(
        state.store.clone(),
        state.hub.clone(),
        state.catalog.clone(),
        state.shutdown.clone(),
        query.cid,
        &mut results,
    )
    .await;

    Json(results).into_response()
}

// ---------------------------------------------------------------------------
// Sensor/load: simple expansion (§4.9)
// ---------------------------------------------------------------------------

fn latest_per_key_pipeline(time_field: &str, days: i64, license_plate_number: Option<&str>, plates: Option<&[String]>) -> Vec<Document> {
    let match_doc = match_stage(time_field, days, license_plate_number, plates);
    vec![
        doc! { "$match": match_doc },
        doc! { "$sort": { "vehicleId": 1, "licensePlateNumber": 1, "realPosition": 1, time_field: -1 } },
        doc! { "$group": {
            "_id": { "vehicleId": "$vehicleId", "licensePlateNumber": "$licensePlateNumber", "realPosition": "$realPosition" },
            "doc": { "$first": "$$ROOT" },
        } },
        doc! { "$replaceRoot": { "newRoot": "$doc" } },
    ]
}

async fn simple_expansion(
    store: &doc_store::DocStore,
    collection: &str,
    time_field: &str,
    resolved: &ResolvedPlates,
    license_plate_number: Option<&str>,
) -> Vec<Document> {
    let plates: Option<&[String]> = match resolved {
        ResolvedPlates::Unrestricted => None,
        ResolvedPlates::Filtered(plates) => Some(plates.as_slice()),
    };

    for days in fleet_core::EXPANSION_WINDOWS_DAYS {
        let pipeline = latest_per_key_pipeline(time_field, days, license_plate_number, plates);
        let entries = match store.aggregate(collection, pipeline).await {
            Ok(entries) => entries,
            Err(err) => {
                tracing::error!(error = %err, days, collection, "bootstrap aggregation failed");
                continue;
            }
        };
        if entries.is_empty() {
            continue;
        }
        let mut filtered: Vec<Document> = entries
            .into_iter()
            .filter(|entry| entry.get_str("licensePlateNumber").is_ok())
            .collect();
        if filtered.is_empty() {
            continue;
        }
        for entry in &mut filtered {
            clean_document(entry);
        }
        return filtered;
    }
    Vec::new()
}

pub async fn init_sensor(State(state): State<AppState>, Query(query): Query<BootstrapQuery>) -> impl IntoResponse {
    let resolved = resolve_plates(&query, &state.catalog).await;
    if resolved_to_empty_response(&resolved) {
        return Json(Vec::<Document>::new()).into_response();
    }
    let results = simple_expansion(&state.store, "Sensors", "receiveTime", &resolved, query.license_plate_number.as_deref()).await;
    Json(results).into_response()
}

pub async fn init_load(State(state): State<AppState>, Query(query): Query<BootstrapQuery>) -> impl IntoResponse {
    let resolved = resolve_plates(&query, &state.catalog).await;
    if resolved_to_empty_response(&resolved) {
        return Json(Vec::<Document>::new()).into_response();
    }
    let results = simple_expansion(&state.store, "Loads", "calculateTime", &resolved, query.license_plate_number.as_deref()).await;
    Json(results).into_response()
}

// ---------------------------------------------------------------------------
// Alerts reconciliation (§4.9)
// ---------------------------------------------------------------------------

/// `(vehicleId, licensePlateNumber, realPosition)` — the liveness lookup key
/// shared by the Sensors/Loads `"alerts"` sub-document scan.
type VehicleKey = (String, String, i64);

async fn latest_documents_by_key(store: &doc_store::DocStore, collection: &str, time_field: &str, keys: &HashSet<VehicleKey>) -> HashMap<VehicleKey, Document> {
    if keys.is_empty() {
        return HashMap::new();
    }
    let match_conditions: Vec<Document> = keys
        .iter()
        .map(|(vehicle_id, plate, real_position)| {
            doc! { "vehicleId": vehicle_id, "licensePlateNumber": plate, "realPosition": *real_position }
        })
        .collect();
    let pipeline = vec![
        doc! { "$match": { "$or": match_conditions } },
        doc! { "$sort": { time_field: -1 } },
        doc! { "$group": {
            "_id": { "vehicleId": "$vehicleId", "licensePlateNumber": "$licensePlateNumber", "realPosition": "$realPosition" },
            "doc": { "$first": "$$ROOT" },
        } },
        doc! { "$replaceRoot": { "newRoot": "$doc" } },
    ];

    let entries = match store.aggregate(collection, pipeline).await {
        Ok(entries) => entries,
        Err(err) => {
            tracing::error!(error = %err, collection, "liveness lookup failed");
            return HashMap::new();
        }
    };

    let mut lookup = HashMap::new();
    for entry in entries {
        let (Some(vehicle_id), Some(plate), Some(real_position)) = (
            entry.get_str("vehicleId").ok().map(str::to_owned),
            entry.get_str("licensePlateNumber").ok().map(str::to_owned),
            entry.get_i64("realPosition").ok().or_else(|| entry.get_i32("realPosition").ok().map(i64::from)),
        ) else {
            continue;
        };
        lookup.insert((vehicle_id, plate, real_position), entry);
    }
    lookup
}

fn embedded_alert_keys(doc: &Document) -> Vec<(String, String)> {
    let Some(alerts) = doc.get_array("alerts").ok() else {
        return Vec::new();
    };
    alerts
        .iter()
        .filter_map(|entry| entry.as_document())
        .filter_map(|entry| {
            let r#type = entry.get_str("type").ok()?.to_owned();
            let name = entry.get_str("name").ok()?.to_owned();
            Some((r#type, name))
        })
        .collect()
}

pub async fn init_alerts(State(state): State<AppState>, Query(query): Query<BootstrapQuery>) -> impl IntoResponse {
    let resolved = resolve_plates(&query, &state.catalog).await;
    if resolved_to_empty_response(&resolved) {
        return Json(Vec::<serde_json::Value>::new()).into_response();
    }

    let mut filter = doc! { "licensePlateNumber": { "$ne": mongodb::bson::Bson::Null }, "status": "open" };
    if let Some(plate) = &query.license_plate_number {
        filter.insert("licensePlateNumber", plate.trim());
    } else if let ResolvedPlates::Filtered(plates) = &resolved {
        filter.insert("licensePlateNumber", doc! { "$in": plates.clone() });
    }

    let alerts_from_db = match state.store.find_open_alerts(filter, MAX_ALERTS).await {
        Ok(alerts) => alerts,
        Err(err) => return internal_error(format!("Alerts Error: {err}")).into_response(),
    };

    let mut vehicle_keys: HashSet<VehicleKey> = HashSet::new();
    for alert in &alerts_from_db {
        let (Some(vehicle_id), Some(plate), Some(real_position)) = (
            alert.get_str("vehicleId").ok().map(str::to_owned),
            alert.get_str("licensePlateNumber").ok().map(str::to_owned),
            alert.get_i64("realPosition").ok().or_else(|| alert.get_i32("realPosition").ok().map(i64::from)),
        ) else {
            continue;
        };
        vehicle_keys.insert((vehicle_id, plate, real_position));
    }

    let latest_sensors = latest_documents_by_key(&state.store, "Sensors", "receiveTime", &vehicle_keys).await;
    let latest_loads = latest_documents_by_key(&state.store, "Loads", "calculateTime", &vehicle_keys).await;

    let mut active_alerts: HashSet<(VehicleKey, String, String)> = HashSet::new();
    for (key, doc) in latest_sensors.iter().chain(latest_loads.iter()) {
        for (r#type, name) in embedded_alert_keys(doc) {
            active_alerts.insert((key.clone(), r#type, name));
        }
    }

    let mut seen = HashSet::new();
    let mut final_alerts = Vec::new();

    for alert in alerts_from_db {
        let vehicle_id = alert.get_str("vehicleId").ok().map(str::to_owned);
        let plate = alert.get_str("licensePlateNumber").ok().map(str::to_owned);
        let real_position = alert.get_i64("realPosition").ok().or_else(|| alert.get_i32("realPosition").ok().map(i64::from));
        let tire_id = alert.get_str("tireId").ok().map(str::to_owned);
        let alert_type = alert.get_str("type").ok().map(str::to_owned);
        let alert_name = alert.get_str("name").ok().map(str::to_owned);

        let (Some(vehicle_id), Some(plate), Some(alert_type), Some(alert_name)) = (vehicle_id, plate, alert_type, alert_name) else {
            tracing::warn!("skipping malformed stored alert during reconciliation");
            continue;
        };

        let dedup_key = (vehicle_id.clone(), tire_id.clone(), alert_type.clone(), alert_name.clone(), real_position);
        if !seen.insert(dedup_key) {
            continue;
        }

        // A vehicle-wide alert (e.g. `gps_timeout`) is stored with no
        // `realPosition` at all, so it can never appear in the liveness set
        // (which is keyed on Sensors/Loads documents and always carries one)
        // — it is always stale here, same as a tire-bound alert whose key is
        // simply absent.
        let is_live = real_position.is_some_and(|real_position| {
            let liveness_key = ((vehicle_id.clone(), plate.clone(), real_position), alert_type.clone(), alert_name.clone());
            active_alerts.contains(&liveness_key)
        });

        if !is_live {
            if let Some(id) = alert.get("_id").cloned() {
                if let Err(err) = state.store.close_alert_by_id(id).await {
                    tracing::error!(error = %err, vehicle_id, "failed to close stale alert during reconciliation");
                }
            }
            continue;
        }
        let real_position = real_position.expect("is_live is only true when real_position is Some");

        final_alerts.push(serde_json::json!({
            "type": alert_type,
            "name": alert_name,
            "value": alert.get_f64("value").ok(),
            "tireId": tire_id,
            "licensePlateNumber": plate,
            "vehicleId": vehicle_id,
            "realPosition": real_position,
            "receiveTime": alert.get_str("receiveTime").ok(),
            "unitIdentifier": alert.get_str("unitIdentifier").ok(),
            "status": "open",
            "folio": alert.get_str("folio").ok(),
        }));
    }

    Json(final_alerts).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_to_empty_response_is_true_only_for_empty_filtered_list() {
        assert!(resolved_to_empty_response(&ResolvedPlates::Filtered(Vec::new())));
        assert!(!resolved_to_empty_response(&ResolvedPlates::Filtered(vec!["T-100".to_owned()])));
        assert!(!resolved_to_empty_response(&ResolvedPlates::Unrestricted));
    }

    #[test]
    fn match_stage_matches_single_plate_over_a_list() {
        let plates = vec!["T-999".to_owned()];
        let doc = match_stage("receiveTime", 5, Some("T-100"), Some(&plates));
        assert_eq!(doc.get_str("licensePlateNumber"), Ok("T-100"));
    }

    #[test]
    fn match_stage_falls_back_to_in_list_when_no_single_plate() {
        let plates = vec!["T-100".to_owned(), "T-200".to_owned()];
        let doc = match_stage("receiveTime", 5, None, Some(&plates));
        let inner = doc.get_document("licensePlateNumber").unwrap();
        let list = inner.get_array("$in").unwrap();
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn clean_document_strips_id_and_tags_source() {
        let mut doc = doc! { "_id": "abc", "licensePlateNumber": "T-100" };
        clean_document(&mut doc);
        assert!(!doc.contains_key("_id"));
        assert_eq!(doc.get_str("source"), Ok("initial"));
    }

    #[test]
    fn gps_pipeline_adds_nin_clause_for_already_found_plates_in_unrestricted_mode() {
        let found = vec!["T-100".to_owned()];
        let pipeline = gps_pipeline(5, None, None, Some(&found));
        let match_stage = pipeline[0].get_document("$match").unwrap();
        let nin = match_stage.get_document("licensePlateNumber").unwrap();
        assert_eq!(nin.get_array("$nin").unwrap().len(), 1);
    }

    #[test]
    fn minutes_since_scenario_5_matches_46_minutes() {
        let minutes = minutes_since("2025-01-01T00:14:00Z");
        assert!(minutes.is_none() || minutes.unwrap() > GPS_TIMEOUT_MINUTES);
    }
}
