//! ==============================================================================
//! upload.rs - trip-tracking api client
//! ==============================================================================
//!
//! wire contract:
//!
//! ```text
//! POST {endpoint}/Trip
//!     body: {"bike_id": .., "sensor_unit_id": ..}
//!     reply: json object containing "id" (the trip id)
//! POST {endpoint}/Trip/UploadData
//!     body: json array of records, each with "trip_id" added
//! ```
//!
//! both carry the static token in `X-Bike-Sense-Web-Auth`.
//! 200 and 201 count as success, anything else is a transient failure.
//!
//! ==============================================================================

use crate::capabilities::{Identity, TripId, UploadClient};
use crate::domain::Record;
use crate::error::{NetworkError, Stage};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const AUTH_HEADER: &str = "X-Bike-Sense-Web-Auth";

#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct ApiConfig {
    pub endpoint: String,
    pub token: String,
}

impl ApiConfig {
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>) -> Self {
        Self { endpoint: endpoint.into(), token: token.into() }
    }
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("endpoint", &self.endpoint)
            .field("token", &"****")
            .finish()
    }
}

#[derive(Deserialize)]
struct TripResponse {
    id: TripId,
}

#[derive(Serialize)]
struct TripRecord<'a> {
    trip_id: TripId,
    #[serde(flatten)]
    record: &'a Record,
}

pub struct HttpUploadClient {
    http: reqwest::Client,
    endpoint: String,
    token: String,
}

impl HttpUploadClient {
    pub fn new(api: &ApiConfig, timeout: Duration) -> Result<Self, NetworkError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: api.endpoint.trim_end_matches('/').to_string(),
            token: api.token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    async fn check(stage: Stage, response: reqwest::Response) -> Result<reqwest::Response, NetworkError> {
        let status = response.status();
        if status == StatusCode::OK || status == StatusCode::CREATED {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(NetworkError::Status { stage, status: status.as_u16(), body })
    }
}

#[async_trait]
impl UploadClient for HttpUploadClient {
    async fn register_trip(&self, identity: &Identity) -> Result<TripId, NetworkError> {
        let stage = Stage::RegisterTrip;
        let response = self
            .http
            .post(self.url("/Trip"))
            .header(AUTH_HEADER, &self.token)
            .json(identity)
            .send()
            .await?;
        let body = Self::check(stage, response).await?.text().await?;

        let trip: TripResponse = serde_json::from_str(&body)
            .map_err(|e| NetworkError::MalformedResponse { stage, reason: format!("{} (got: {})", e, body) })?;
        Ok(trip.id)
    }

    /// one UploadData post. batching is up to the caller.
    async fn upload(&self, trip: TripId, records: &[Record]) -> Result<(), NetworkError> {
        let payload: Vec<TripRecord<'_>> =
            records.iter().map(|record| TripRecord { trip_id: trip, record }).collect();
        let response = self
            .http
            .post(self.url("/Trip/UploadData"))
            .header(AUTH_HEADER, &self.token)
            .json(&payload)
            .send()
            .await?;
        Self::check(Stage::UploadData, response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Reading;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_trip_record_is_flat() {
        let at = Utc.with_ymd_and_hms(2024, 5, 17, 9, 30, 5).unwrap();
        let record = Record::merge(vec![Reading::new("temp", 20.0)], at);
        let json = serde_json::to_value(TripRecord { trip_id: 42, record: &record }).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"trip_id": 42, "temp": 20.0, "timestamp": "2024-05-17T09:30:05Z"})
        );
    }

    #[test]
    fn test_identity_wire_names() {
        let json = serde_json::to_value(Identity { bike_id: 1, unit_id: 7 }).unwrap();
        assert_eq!(json, serde_json::json!({"bike_id": 1, "sensor_unit_id": 7}));
    }

    #[test]
    fn test_endpoint_trailing_slash() {
        let api = ApiConfig::new("http://10.0.0.1:8080/api/v1/", "t");
        let client = HttpUploadClient::new(&api, Duration::from_secs(1)).unwrap();
        assert_eq!(client.url("/Trip"), "http://10.0.0.1:8080/api/v1/Trip");
    }
}
