//! ==============================================================================
//! capabilities.rs - contracts the runtime composes
//! ==============================================================================
//!
//! purpose:
//!     the runtime never talks to hardware or the network directly. it holds
//!     boxed implementations of these traits, handed over by the builder.
//!
//! relationships:
//!     - implemented by: gps.rs, sensors.rs, storage.rs, network.rs, upload.rs
//!     - consumed by: runtime.rs
//!     - test doubles: tests/ (shared-state fakes)
//!
//! ==============================================================================

use crate::domain::{Reading, Record};
use crate::error::NetworkError;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// an environmental sensor (temperature, noise, light, ...)
pub trait SensorSource: Send {
    fn init(&mut self) -> Result<()>;
    fn read(&mut self) -> Reading;
}

/// the gps receiver. exactly one per unit.
pub trait GpsSource: Send {
    fn init(&mut self) -> Result<()>;
    fn read(&mut self) -> Reading;
}

/// local record store. the retention policy belongs to the implementation.
pub trait Storage: Send {
    fn init(&mut self) -> Result<()>;
    fn append(&mut self, record: Record);
    fn retrieve_all(&self) -> Vec<Record>;

    fn len(&self) -> usize {
        self.retrieve_all().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// network link status, as seen by the upload branch
pub trait ConnectivityGate: Send {
    /// polls the link. implementations drive the status indicator on
    /// transitions, never on repeated identical polls.
    fn is_connected(&mut self) -> bool;
}

/// trip id assigned by the remote service
pub type TripId = i64;

/// who this unit is, as far as the trip api is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub bike_id: u32,
    #[serde(rename = "sensor_unit_id")]
    pub unit_id: u32,
}

/// the trip-tracking api
#[async_trait]
pub trait UploadClient: Send + Sync {
    async fn register_trip(&self, identity: &Identity) -> Result<TripId, NetworkError>;
    async fn upload(&self, trip: TripId, records: &[Record]) -> Result<(), NetworkError>;
}
