//! bikesense - data-collection runtime for a bicycle-mounted sensor unit.
//!
//! polls a gps receiver and a set of environmental sensors on a fixed
//! cadence, keeps the most recent records in memory, and uploads them as a
//! trip to the remote trip-tracking api once the wifi link is up.
//!
//! ```no_run
//! use bikesense::{gps::MockGps, sensors::MockSensor, storage::MemoryStorage, RuntimeBuilder};
//!
//! # async fn boot() -> Result<(), bikesense::BikeSenseError> {
//! let runtime = RuntimeBuilder::new(MockGps::default(), MemoryStorage::default())
//!     .sensor(MockSensor::new("noise", 40.0))
//!     .wifi("bikenet", "Bike123!")
//!     .api("http://10.227.103.175:8080/api/v1", "NotARealToken")
//!     .identity(1, 3)
//!     .build()?;
//! runtime.run().await;
//! # Ok(())
//! # }
//! ```

pub mod capabilities;
pub mod config;
pub mod domain;
pub mod error;
pub mod gps;
pub mod hal;
pub mod network;
pub mod runtime;
pub mod sensors;
pub mod storage;
pub mod upload;

pub use capabilities::{ConnectivityGate, GpsSource, Identity, SensorSource, Storage, TripId, UploadClient};
pub use domain::{Reading, ReadingValue, Record, Scalar};
pub use error::{BikeSenseError, NetworkError};
pub use runtime::{Runtime, RuntimeBuilder, TripState};
