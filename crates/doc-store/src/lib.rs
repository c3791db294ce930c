//! Typed upsert/query client for the document store (C3): four collections
//! — `TruckRideLog`, `Sensors`, `Loads`, `Alerts` — keyed by the compound
//! filters in data-model invariant §3.2/§3.1.
//!
//! Ported from `mongo.py`. The filter-builder functions are kept free of
//! I/O and exported so both this crate's tests and the bootstrap query
//! service (C9, which composes them into aggregation pipelines) can exercise
//! them without a live Mongo instance.

use fleet_protocol::{Alert, GpsEvent, LoadEvent, OpenAlertFilter, SensorEvent};
use futures::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::options::{FindOptions, IndexOptions, UpdateOptions};
use mongodb::{Client, Collection, Database, IndexModel};

#[derive(Debug, thiserror::Error)]
pub enum DocStoreError {
    #[error("document store operation failed: {0}")]
    Mongo(#[from] mongodb::error::Error),
    #[error("failed to serialize document: {0}")]
    Serialize(#[from] mongodb::bson::ser::Error),
}

const DATABASE_NAME: &str = "Quinta";
const TRUCK_RIDE_LOG: &str = "TruckRideLog";
const SENSORS: &str = "Sensors";
const LOADS: &str = "Loads";
const ALERTS: &str = "Alerts";

// ---------------------------------------------------------------------------
// Filter builders (pure, unit-tested directly)
// ---------------------------------------------------------------------------

/// Idempotence key for GPS documents, invariant §3.2.
pub fn gps_key_filter(vehicle_id: &str, receive_time: &str) -> Document {
    doc! { "vehicleId": vehicle_id, "receiveTime": receive_time }
}

/// Idempotence key for sensor documents, invariant §3.2.
pub fn sensor_key_filter(vehicle_id: &str, tyre_id: &str, receive_time: &str) -> Document {
    doc! { "vehicleId": vehicle_id, "tyreId": tyre_id, "receiveTime": receive_time }
}

/// Idempotence key for load documents, invariant §3.2.
pub fn load_key_filter(vehicle_id: &str, tyre_id: &str, calculate_time: &str) -> Document {
    doc! { "vehicleId": vehicle_id, "tyreId": tyre_id, "calculateTime": calculate_time }
}

/// At-most-one-open-alert filter, invariant §3.1. Vehicle-wide alerts
/// (`tire_id: None`, e.g. `gps_timeout`) omit the `tireId` field from the
/// filter entirely rather than matching it against `null`.
pub fn open_alert_filter(filter: &OpenAlertFilter) -> Document {
    let mut query = doc! {
        "vehicleId": &filter.vehicle_id,
        "type": filter.r#type.as_str(),
        "name": filter.name.as_str(),
        "status": "open",
    };
    if let Some(tire_id) = &filter.tire_id {
        query.insert("tireId", tire_id);
    }
    query
}

/// Filter used to close an open `gps_timeout` alert when a live GPS message
/// arrives for the vehicle (spec §4.6 point 7 / invariant §8.7).
pub fn gps_timeout_close_filter(vehicle_id: &str) -> Document {
    doc! { "vehicleId": vehicle_id, "type": "gps", "name": "gps_timeout", "status": "open" }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct DocStore {
    database: Database,
}

impl DocStore {
    pub async fn connect(uri: &str) -> Result<Self, DocStoreError> {
        let client = Client::with_uri_str(uri).await?;
        Ok(Self {
            database: client.database(DATABASE_NAME),
        })
    }

    fn truck_ride_log(&self) -> Collection<Document> {
        self.database.collection(TRUCK_RIDE_LOG)
    }

    fn sensors(&self) -> Collection<Document> {
        self.database.collection(SENSORS)
    }

    fn loads(&self) -> Collection<Document> {
        self.database.collection(LOADS)
    }

    fn alerts(&self) -> Collection<Document> {
        self.database.collection(ALERTS)
    }

    /// Creates the indexes required by §4.3. Safe to call on every startup;
    /// Mongo no-ops on an index that already exists with the same keys.
    pub async fn create_indexes(&self) -> Result<(), DocStoreError> {
        self.truck_ride_log()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "licensePlateNumber": 1, "receiveTime": -1 })
                    .build(),
                None,
            )
            .await?;
        self.sensors()
            .create_index(
                IndexModel::builder()
                    .keys(doc! {
                        "vehicleId": 1, "receiveTime": -1, "licensePlateNumber": 1, "realPosition": 1
                    })
                    .build(),
                None,
            )
            .await?;
        self.loads()
            .create_index(
                IndexModel::builder()
                    .keys(doc! {
                        "vehicleId": 1, "licensePlateNumber": 1, "realPosition": 1, "receiveTime": -1
                    })
                    .build(),
                None,
            )
            .await?;
        self.alerts()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "vehicleId": 1, "status": 1 })
                    .options(IndexOptions::builder().build())
                    .build(),
                None,
            )
            .await?;
        Ok(())
    }

    pub async fn upsert_gps(&self, event: &GpsEvent) -> Result<(), DocStoreError> {
        let filter = gps_key_filter(&event.vehicle_id, &event.receive_time);
        let set_doc = mongodb::bson::to_document(event)?;
        self.truck_ride_log()
            .update_one(filter, doc! { "$set": set_doc }, UpdateOptions::builder().upsert(true).build())
            .await?;
        Ok(())
    }

    pub async fn upsert_sensor(&self, event: &SensorEvent, tyre_id: &str) -> Result<(), DocStoreError> {
        let filter = sensor_key_filter(&event.vehicle_id, tyre_id, &event.receive_time);
        let set_doc = mongodb::bson::to_document(event)?;
        self.sensors()
            .update_one(filter, doc! { "$set": set_doc }, UpdateOptions::builder().upsert(true).build())
            .await?;
        Ok(())
    }

    pub async fn upsert_load(&self, event: &LoadEvent, tyre_id: &str) -> Result<(), DocStoreError> {
        let filter = load_key_filter(&event.vehicle_id, tyre_id, &event.calculate_time);
        let set_doc = mongodb::bson::to_document(event)?;
        self.loads()
            .update_one(filter, doc! { "$set": set_doc }, UpdateOptions::builder().upsert(true).build())
            .await?;
        Ok(())
    }

    /// Upserts an alert under the at-most-one-open filter, invariant §3.1.
    pub async fn upsert_open_alert(&self, filter: &OpenAlertFilter, alert: &Alert) -> Result<(), DocStoreError> {
        let query = open_alert_filter(filter);
        let set_doc = mongodb::bson::to_document(alert)?;
        self.alerts()
            .update_one(query, doc! { "$set": set_doc }, UpdateOptions::builder().upsert(true).build())
            .await?;
        Ok(())
    }

    /// Closes any open `gps_timeout` alert for `vehicle_id`; returns whether
    /// one was found and closed (spec §4.6 point 7).
    pub async fn close_gps_timeout_alert(&self, vehicle_id: &str) -> Result<bool, DocStoreError> {
        let filter = gps_timeout_close_filter(vehicle_id);
        let result = self
            .alerts()
            .update_one(filter, doc! { "$set": { "status": "closed" } }, None)
            .await?;
        Ok(result.modified_count > 0)
    }

    /// Closes a stored alert by its document id (bootstrap reconciliation, C9).
    pub async fn close_alert_by_id(&self, id: mongodb::bson::Bson) -> Result<(), DocStoreError> {
        self.alerts()
            .update_one(doc! { "_id": id }, doc! { "$set": { "status": "closed" } }, None)
            .await?;
        Ok(())
    }

    /// Runs an arbitrary aggregation pipeline against a named collection,
    /// returning raw documents. Used by the bootstrap query service (C9) for
    /// the latest-per-key pipelines, which vary per caller and are not
    /// generic enough to hardcode here.
    pub async fn aggregate(&self, collection_name: &str, pipeline: Vec<Document>) -> Result<Vec<Document>, DocStoreError> {
        let collection: Collection<Document> = self.database.collection(collection_name);
        let mut cursor = collection.aggregate(pipeline, None).await?;
        let mut out = Vec::new();
        while let Some(doc) = cursor.try_next().await? {
            out.push(doc);
        }
        Ok(out)
    }

    /// Finds up to `limit` documents matching `filter`, sorted by `receiveTime`
    /// descending — used by the alerts bootstrap endpoint (C9).
    pub async fn find_open_alerts(&self, filter: Document, limit: i64) -> Result<Vec<Document>, DocStoreError> {
        let options = FindOptions::builder()
            .sort(doc! { "receiveTime": -1 })
            .limit(limit)
            .build();
        let mut cursor = self.alerts().find(filter, options).await?;
        let mut out = Vec::new();
        while let Some(doc) = cursor.try_next().await? {
            out.push(doc);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_protocol::{AlertName, AlertType};

    #[test]
    fn gps_key_filter_matches_vehicle_and_receive_time() {
        let filter = gps_key_filter("V1", "2025-01-01T00:00:00Z");
        assert_eq!(filter.get_str("vehicleId"), Ok("V1"));
        assert_eq!(filter.get_str("receiveTime"), Ok("2025-01-01T00:00:00Z"));
        assert_eq!(filter.len(), 2);
    }

    #[test]
    fn sensor_key_filter_includes_tyre_id() {
        let filter = sensor_key_filter("V1", "TIRE1", "2025-01-01T00:00:00Z");
        assert_eq!(filter.get_str("tyreId"), Ok("TIRE1"));
        assert_eq!(filter.len(), 3);
    }

    #[test]
    fn open_alert_filter_omits_tire_id_for_vehicle_wide_alerts() {
        let filter = open_alert_filter(&OpenAlertFilter {
            vehicle_id: "V1".to_owned(),
            tire_id: None,
            r#type: AlertType::Gps,
            name: AlertName::GpsTimeout,
        });
        assert!(!filter.contains_key("tireId"));
        assert_eq!(filter.get_str("status"), Ok("open"));
        assert_eq!(filter.get_str("type"), Ok("gps"));
        assert_eq!(filter.get_str("name"), Ok("gps_timeout"));
    }

    #[test]
    fn open_alert_filter_includes_tire_id_for_tire_bound_alerts() {
        let filter = open_alert_filter(&OpenAlertFilter {
            vehicle_id: "V1".to_owned(),
            tire_id: Some("TIRE1".to_owned()),
            r#type: AlertType::Pressure,
            name: AlertName::LowPressure,
        });
        assert_eq!(filter.get_str("tireId"), Ok("TIRE1"));
    }

    #[test]
    fn gps_timeout_close_filter_matches_gps_type_and_name() {
        let filter = gps_timeout_close_filter("V1");
        assert_eq!(filter.get_str("type"), Ok("gps"));
        assert_eq!(filter.get_str("name"), Ok("gps_timeout"));
        assert_eq!(filter.get_str("status"), Ok("open"));
    }

    #[tokio::test]
    async fn client_construction_succeeds_without_a_live_server() {
        let client = Client::with_uri_str("mongodb://localhost:27017")
            .await
            .expect("client construction is lazy and never touches the network");
        let _db = client.database(DATABASE_NAME);
    }
}
