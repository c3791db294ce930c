//! Wire and domain types shared by every ingest component.
//!
//! Every inbound/outbound JSON shape the pipeline touches (bus payload,
//! document-store record, broadcast frame) is one of the types in this
//! crate. Field names follow the upstream JSON contract (camelCase), not
//! Rust naming conventions, via `#[serde(rename_all = "camelCase")]`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Enrichment
// ---------------------------------------------------------------------------

/// Fields joined in from the catalog (C1) and the tire API (C2), merged
/// into an event by the enrichment cache (C4). Present once enrichment has
/// run; absent (and thus omitted from JSON) beforehand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_identifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_data_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_mileage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tractor_name: Option<String>,
}

impl EnrichmentFields {
    /// Sentinel values substituted when the catalog lookup (C1) fails,
    /// per spec §4.1/§7: the message is never dropped, it is tagged.
    pub fn catalog_error() -> Self {
        Self {
            unit_status: Some("ERROR".to_owned()),
            unit_identifier: Some("ERROR".to_owned()),
            unit_type: Some("ERROR".to_owned()),
            ..Default::default()
        }
    }

    pub fn merge_catalog(&mut self, status: String, unit_identifier: String, unit_type: String) {
        self.unit_status = Some(status);
        self.unit_identifier = Some(unit_identifier);
        self.unit_type = Some(unit_type);
    }

    pub fn merge_tire_api(&mut self, other: TireApiFields) {
        self.latest_data_time = other.latest_data_time;
        self.load_data = other.load_data;
        self.org_id = other.org_id;
        self.total_mileage = other.total_mileage;
        self.tractor_name = other.tractor_name;
    }

    /// Layers `other` onto `self`, only overwriting fields `other` actually
    /// carries (`Some`). Unlike `merge_catalog`/`merge_tire_api`, a field left
    /// `None` in `other` does not clear an already-set value on `self` — this
    /// is what lets a tractor/trailer reassignment's `tractor_name` survive a
    /// subsequent cache fetch whose tire-API data didn't carry one.
    pub fn apply(&mut self, other: &EnrichmentFields) {
        if other.unit_status.is_some() {
            self.unit_status = other.unit_status.clone();
        }
        if other.unit_identifier.is_some() {
            self.unit_identifier = other.unit_identifier.clone();
        }
        if other.unit_type.is_some() {
            self.unit_type = other.unit_type.clone();
        }
        if other.latest_data_time.is_some() {
            self.latest_data_time = other.latest_data_time.clone();
        }
        if other.load_data.is_some() {
            self.load_data = other.load_data.clone();
        }
        if other.org_id.is_some() {
            self.org_id = other.org_id.clone();
        }
        if other.total_mileage.is_some() {
            self.total_mileage = other.total_mileage;
        }
        if other.tractor_name.is_some() {
            self.tractor_name = other.tractor_name.clone();
        }
    }
}

/// Subset of `EnrichmentFields` populated exclusively from the tire API (C2).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TireApiFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_data_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_mileage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tractor_name: Option<String>,
}

// ---------------------------------------------------------------------------
// Inbound events
// ---------------------------------------------------------------------------

/// A GPS position report (`topic-gps-218`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpsEvent {
    pub vehicle_id: String,
    pub license_plate_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trailer_license_plate_number: Option<String>,
    pub receive_time: String,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
    #[serde(default)]
    pub spkm: f64,

    #[serde(flatten)]
    pub enrichment: EnrichmentFields,
}

/// One embedded alert summary, carried on the Sensors/Loads document that
/// produced it — read back by the bootstrap reconciliation (C9) to decide
/// whether a stored `Alerts` row is still live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddedAlert {
    pub r#type: AlertType,
    pub name: AlertName,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tire_id: Option<String>,
}

/// A tire pressure/temperature sensor reading (`topic-sensor-218`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorEvent {
    pub vehicle_id: String,
    pub license_plate_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trailer_license_plate_number: Option<String>,
    pub receive_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tyre_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tyre_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub axle_index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wheel_index: Option<u32>,
    /// PSI on the wire; converted to bar in place before persistence/broadcast.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pressure: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub real_position: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spare_tire_note: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alerts: Vec<EmbeddedAlert>,

    #[serde(flatten)]
    pub enrichment: EnrichmentFields,
}

/// A tire tread-depth/load reading (`topic-load-218`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadEvent {
    pub vehicle_id: String,
    pub license_plate_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trailer_license_plate_number: Option<String>,
    pub calculate_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tyre_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tyre_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub axle_index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wheel_index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub now_thread_depth: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub real_position: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spare_tire_note: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alerts: Vec<EmbeddedAlert>,

    #[serde(flatten)]
    pub enrichment: EnrichmentFields,
}

/// Which bus topic / bridge classification an inbound payload belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Gps,
    Sensor,
    Load,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Gps => "gps",
            MessageKind::Sensor => "sensor",
            MessageKind::Load => "load",
        }
    }

    pub fn topic(self) -> &'static str {
        match self {
            MessageKind::Gps => "topic-gps-218",
            MessageKind::Sensor => "topic-sensor-218",
            MessageKind::Load => "topic-load-218",
        }
    }
}

/// Classifies a raw parsed JSON payload by field presence, per spec §4.10 /
/// `bridge_endpoint.py::get_message_type`. Used by both the ingress bridge
/// (C10) and, implicitly, by the bus consumer (C7) via its topic name.
pub fn classify(raw: &Value) -> Option<MessageKind> {
    let obj = raw.as_object()?;
    if obj.contains_key("latitude") && obj.contains_key("longitude") {
        return Some(MessageKind::Gps);
    }
    if obj.contains_key("pressure") && obj.contains_key("temperature") {
        return Some(MessageKind::Sensor);
    }
    if obj.contains_key("nowThreadDepth") {
        return Some(MessageKind::Load);
    }
    None
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    Pressure,
    Temperature,
    Depth,
    Gps,
}

impl AlertType {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertType::Pressure => "pressure",
            AlertType::Temperature => "temperature",
            AlertType::Depth => "depth",
            AlertType::Gps => "gps",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertName {
    LowPressure,
    HighPressure,
    HighTemperature,
    LowDepth,
    GpsTimeout,
}

impl AlertName {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertName::LowPressure => "low_pressure",
            AlertName::HighPressure => "high_pressure",
            AlertName::HighTemperature => "high_temperature",
            AlertName::LowDepth => "low_depth",
            AlertName::GpsTimeout => "gps_timeout",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Open,
    Closed,
}

/// A persisted/broadcast alert document (the `Alerts` collection, §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub folio: String,
    pub status: AlertStatus,
    pub r#type: AlertType,
    pub name: AlertName,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tire_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_plate_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub real_position: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receive_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_identifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_id: Option<i64>,
}

/// Compound filter that enforces invariant §3.1: at most one open alert per
/// `(vehicleId, tireId, type, name)` (tire-bound) or `(vehicleId, type,
/// name)` (vehicle-wide, e.g. `gps_timeout`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenAlertFilter {
    pub vehicle_id: String,
    pub tire_id: Option<String>,
    pub r#type: AlertType,
    pub name: AlertName,
}

// ---------------------------------------------------------------------------
// Catalog (C1) shapes
// ---------------------------------------------------------------------------

/// Axle/tire layout for a unit, used by the position resolver (C5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TruckLayout {
    pub unit_catalog_id: String,
    pub axles_count: u32,
    pub tires_per_axle: Vec<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classify_picks_gps_when_latitude_and_longitude_present() {
        let raw = json!({"latitude": 1.0, "longitude": 2.0, "vehicleId": "V1"});
        assert_eq!(classify(&raw), Some(MessageKind::Gps));
    }

    #[test]
    fn classify_picks_sensor_when_pressure_and_temperature_present() {
        let raw = json!({"pressure": 600, "temperature": 40});
        assert_eq!(classify(&raw), Some(MessageKind::Sensor));
    }

    #[test]
    fn classify_picks_load_when_now_thread_depth_present() {
        let raw = json!({"nowThreadDepth": 5});
        assert_eq!(classify(&raw), Some(MessageKind::Load));
    }

    #[test]
    fn classify_returns_none_for_unknown_shape() {
        let raw = json!({"foo": "bar"});
        assert_eq!(classify(&raw), None);
    }

    #[test]
    fn gps_event_omits_enrichment_fields_until_populated() {
        let event = GpsEvent {
            vehicle_id: "V1".to_owned(),
            license_plate_number: "T-100".to_owned(),
            trailer_license_plate_number: None,
            receive_time: "2025-01-01T00:00:00Z".to_owned(),
            latitude: 1.0,
            longitude: 2.0,
            spkm: 80.0,
            enrichment: EnrichmentFields::default(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert!(value.get("unitStatus").is_none());
        assert!(value.get("trailerLicensePlateNumber").is_none());
    }

    #[test]
    fn alert_type_as_str_matches_its_serde_wire_form() {
        for variant in [AlertType::Pressure, AlertType::Temperature, AlertType::Depth, AlertType::Gps] {
            let json = serde_json::to_value(variant).unwrap();
            assert_eq!(json.as_str(), Some(variant.as_str()));
        }
    }

    #[test]
    fn alert_name_as_str_matches_its_serde_wire_form() {
        for variant in [
            AlertName::LowPressure,
            AlertName::HighPressure,
            AlertName::HighTemperature,
            AlertName::LowDepth,
            AlertName::GpsTimeout,
        ] {
            let json = serde_json::to_value(variant).unwrap();
            assert_eq!(json.as_str(), Some(variant.as_str()));
        }
    }

    #[test]
    fn enrichment_apply_preserves_existing_field_when_other_is_none() {
        let mut fields = EnrichmentFields {
            tractor_name: Some("T-100".to_owned()),
            ..Default::default()
        };
        fields.apply(&EnrichmentFields {
            unit_status: Some("active".to_owned()),
            ..Default::default()
        });
        assert_eq!(fields.tractor_name.as_deref(), Some("T-100"));
        assert_eq!(fields.unit_status.as_deref(), Some("active"));
    }

    #[test]
    fn enrichment_apply_overwrites_when_other_carries_a_value() {
        let mut fields = EnrichmentFields {
            tractor_name: Some("T-100".to_owned()),
            ..Default::default()
        };
        fields.apply(&EnrichmentFields {
            tractor_name: Some("T-200".to_owned()),
            ..Default::default()
        });
        assert_eq!(fields.tractor_name.as_deref(), Some("T-200"));
    }

    #[test]
    fn enrichment_catalog_error_sets_sentinel_strings() {
        let fields = EnrichmentFields::catalog_error();
        assert_eq!(fields.unit_status.as_deref(), Some("ERROR"));
        assert_eq!(fields.unit_identifier.as_deref(), Some("ERROR"));
        assert_eq!(fields.unit_type.as_deref(), Some("ERROR"));
    }
}
