//! ==============================================================================
//! runtime.rs - builder, acquisition loop and upload state machine
//! ==============================================================================
//!
//! purpose:
//!     composes one gps, one storage backend and any number of sensors into a
//!     `Runtime`, then drives the fixed-cadence acquisition loop.
//!
//! per cycle:
//!
//! ```text
//! gate.is_connected() ──yes──> (not uploaded && retained > threshold)
//!        │                           │ register trip, upload records
//!        │                           ▼
//!        └──────────────> gps.read() -> sensor.read() ... -> merge
//!                                    -> storage.append -> sleep
//! ```
//!
//! trip states:
//!
//! ```text
//! Disconnected ──link up──> ConnectedNotUploaded ──upload ok──> Uploaded
//!      ▲                          │                                │
//!      └────────link down─────────┴────────────────────────────────┘
//! ```
//!
//! the uploaded flag is one-shot: a runtime uploads at most one trip.
//! a failed registration or upload leaves storage as it was and is retried
//! on the next qualifying cycle. every network call (the registration and
//! each upload batch) gets its own timeout.
//!
//! relationships:
//!     - uses: capabilities.rs (all component contracts)
//!     - uses: network.rs (WifiGate / OfflineGate), hal.rs (Board)
//!     - uses: upload.rs (HttpUploadClient, unless one is injected)
//!     - used by: main.rs
//!
//! ==============================================================================

use crate::capabilities::{
    ConnectivityGate, GpsSource, Identity, SensorSource, Storage, TripId, UploadClient,
};
use crate::domain::Record;
use crate::error::{BikeSenseError, NetworkError, Stage};
use crate::hal::Board;
use crate::network::{OfflineGate, WifiCredentials, WifiGate};
use crate::upload::{ApiConfig, HttpUploadClient};

use chrono::Utc;
use std::time::Duration;
use tokio::time::{timeout, Instant};

pub const DEFAULT_PERIOD: Duration = Duration::from_millis(1000);
pub const DEFAULT_UPLOAD_THRESHOLD: usize = 5;
pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_LED_PIN: u8 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TripState {
    Disconnected,
    ConnectedNotUploaded,
    Uploaded,
}

// ==============================================================================
// builder
// ==============================================================================

pub struct RuntimeBuilder {
    gps: Box<dyn GpsSource>,
    storage: Box<dyn Storage>,
    sensors: Vec<Box<dyn SensorSource>>,
    wifi: Vec<WifiCredentials>,
    api: Option<ApiConfig>,
    identity: Option<Identity>,
    board: Option<Board>,
    uploader: Option<Box<dyn UploadClient>>,
    period: Duration,
    upload_threshold: usize,
    upload_timeout: Duration,
    upload_batch_size: Option<usize>,
    led_pin: u8,
    show_records: bool,
}

impl RuntimeBuilder {
    pub fn new(gps: impl GpsSource + 'static, storage: impl Storage + 'static) -> Self {
        Self::from_boxed(Box::new(gps), Box::new(storage))
    }

    pub fn from_boxed(gps: Box<dyn GpsSource>, storage: Box<dyn Storage>) -> Self {
        Self {
            gps,
            storage,
            sensors: Vec::new(),
            wifi: Vec::new(),
            api: None,
            identity: None,
            board: None,
            uploader: None,
            period: DEFAULT_PERIOD,
            upload_threshold: DEFAULT_UPLOAD_THRESHOLD,
            upload_timeout: DEFAULT_UPLOAD_TIMEOUT,
            upload_batch_size: None,
            led_pin: DEFAULT_LED_PIN,
            show_records: false,
        }
    }

    /// sensors are read in registration order. duplicates are kept.
    pub fn sensor(self, sensor: impl SensorSource + 'static) -> Self {
        self.boxed_sensor(Box::new(sensor))
    }

    pub fn boxed_sensor(mut self, sensor: Box<dyn SensorSource>) -> Self {
        self.sensors.push(sensor);
        self
    }

    /// add a known network. networks are tried in the order they were added.
    pub fn wifi(mut self, ssid: impl Into<String>, password: impl Into<String>) -> Self {
        self.wifi.push(WifiCredentials::new(ssid, password));
        self
    }

    pub fn api(mut self, endpoint: impl Into<String>, token: impl Into<String>) -> Self {
        self.api = Some(ApiConfig::new(endpoint, token));
        self
    }

    pub fn identity(mut self, bike_id: u32, unit_id: u32) -> Self {
        self.identity = Some(Identity { bike_id, unit_id });
        self
    }

    /// radio + led to use instead of claiming this machine's board
    pub fn board(mut self, board: Board) -> Self {
        self.board = Some(board);
        self
    }

    /// upload client to use instead of the http one built from `api()`
    pub fn uploader(mut self, client: impl UploadClient + 'static) -> Self {
        self.uploader = Some(Box::new(client));
        self
    }

    pub fn period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// upload once more than `n` records are retained
    pub fn upload_threshold(mut self, n: usize) -> Self {
        self.upload_threshold = n;
        self
    }

    pub fn upload_timeout(mut self, limit: Duration) -> Self {
        self.upload_timeout = limit;
        self
    }

    /// post at most `n` records per UploadData call. `None` sends all at once.
    pub fn upload_batch_size(mut self, n: Option<usize>) -> Self {
        self.upload_batch_size = n.filter(|&n| n > 0);
        self
    }

    pub fn led_pin(mut self, pin: u8) -> Self {
        self.led_pin = pin;
        self
    }

    /// log every stored record at info instead of debug
    pub fn show_records(mut self, show: bool) -> Self {
        self.show_records = show;
        self
    }

    /// bring every component up: gps, storage, sensors (in order), then the
    /// radio. the first failure aborts the build.
    pub fn build(mut self) -> Result<Runtime, BikeSenseError> {
        self.gps.init().map_err(|e| BikeSenseError::init("gps", e))?;
        self.storage.init().map_err(|e| BikeSenseError::init("storage", e))?;
        for (i, sensor) in self.sensors.iter_mut().enumerate() {
            sensor.init().map_err(|e| BikeSenseError::init(format!("sensor #{}", i), e))?;
        }

        let networks = std::mem::take(&mut self.wifi);
        let gate: Box<dyn ConnectivityGate> = match (networks.is_empty(), self.board.take()) {
            (false, board) => {
                let board = match board {
                    Some(board) => board,
                    None => Board::take(self.led_pin)?,
                };
                let gate = WifiGate::join(board, networks)
                    .map_err(|e| BikeSenseError::init("radio", e))?;
                Box::new(gate)
            }
            (true, Some(board)) => Box::new(WifiGate::new(board)),
            (true, None) => {
                tracing::info!("[RUNTIME] No wifi configured, running offline");
                Box::new(OfflineGate)
            }
        };

        let uplink = match (self.identity, self.uploader, &self.api) {
            (Some(identity), Some(client), _) => Some(Uplink { client, identity }),
            (Some(identity), None, Some(api)) => {
                let client = HttpUploadClient::new(api, self.upload_timeout)
                    .map_err(|e| BikeSenseError::init("upload client", e.into()))?;
                Some(Uplink { client: Box::new(client), identity })
            }
            (None, Some(_), _) | (None, None, Some(_)) => {
                tracing::warn!("[RUNTIME] ⚠ Upload disabled: bike/unit identity not set");
                None
            }
            (Some(_), None, None) => {
                tracing::warn!("[RUNTIME] ⚠ Upload disabled: api endpoint not set");
                None
            }
            (None, None, None) => None,
        };

        tracing::info!(
            "[RUNTIME] ✓ Built with {} sensor(s), period {:?}, upload {}",
            self.sensors.len(),
            self.period,
            if uplink.is_some() { "enabled" } else { "disabled" }
        );

        Ok(Runtime {
            gps: self.gps,
            storage: self.storage,
            sensors: self.sensors,
            gate,
            uplink,
            period: self.period,
            upload_threshold: self.upload_threshold,
            upload_timeout: self.upload_timeout,
            upload_batch_size: self.upload_batch_size,
            show_records: self.show_records,
            linked: false,
            uploaded: false,
        })
    }
}

// ==============================================================================
// runtime
// ==============================================================================

struct Uplink {
    client: Box<dyn UploadClient>,
    identity: Identity,
}

pub struct Runtime {
    gps: Box<dyn GpsSource>,
    storage: Box<dyn Storage>,
    sensors: Vec<Box<dyn SensorSource>>,
    gate: Box<dyn ConnectivityGate>,
    uplink: Option<Uplink>,
    period: Duration,
    upload_threshold: usize,
    upload_timeout: Duration,
    upload_batch_size: Option<usize>,
    show_records: bool,
    linked: bool,
    uploaded: bool,
}

impl Runtime {
    pub fn state(&self) -> TripState {
        match (self.linked, self.uploaded) {
            (false, _) => TripState::Disconnected,
            (true, false) => TripState::ConnectedNotUploaded,
            (true, true) => TripState::Uploaded,
        }
    }

    pub fn is_uploaded(&self) -> bool {
        self.uploaded
    }

    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// one iteration: connectivity, maybe upload, read everything, store.
    /// returns the record that was stored.
    pub async fn cycle(&mut self) -> Record {
        self.linked = self.gate.is_connected();
        if self.linked && !self.uploaded {
            self.try_upload().await;
        }

        let mut readings = Vec::with_capacity(self.sensors.len() + 1);
        readings.push(self.gps.read());
        for sensor in self.sensors.iter_mut() {
            readings.push(sensor.read());
        }
        let record = Record::merge(readings, Utc::now());

        let line = serde_json::to_string(&record).unwrap_or_default();
        if self.show_records {
            tracing::info!("[DATA] {}", line);
        } else {
            tracing::debug!("[DATA] {}", line);
        }

        self.storage.append(record.clone());
        record
    }

    async fn try_upload(&mut self) {
        let Some(uplink) = self.uplink.as_ref() else { return };
        let retained = self.storage.len();
        if retained <= self.upload_threshold {
            return;
        }

        tracing::info!("[UPLOAD] {} records retained, registering trip", retained);
        let records = self.storage.retrieve_all();
        match upload_trip(uplink, &records, self.upload_batch_size, self.upload_timeout).await {
            Ok(trip) => {
                self.uploaded = true;
                tracing::info!("[UPLOAD] ✓ Trip {} uploaded ({} records)", trip, records.len());
            }
            Err(e) => {
                let e = BikeSenseError::from(e);
                tracing::warn!("[UPLOAD] ⚠ {}, retrying next cycle", e);
            }
        }
    }

    /// the unit's main loop. never returns.
    pub async fn run(mut self) {
        tracing::info!("[RUNTIME] Starting acquisition loop ({:?} period)", self.period);
        loop {
            let started = Instant::now();
            self.cycle().await;
            let elapsed = started.elapsed();
            if elapsed > self.period {
                tracing::debug!("[RUNTIME] Cycle overran the period by {:?}", elapsed - self.period);
            }
            tokio::time::sleep(sleep_budget(self.period, elapsed)).await;
        }
    }
}

/// time left in the period after a cycle took `elapsed`. overruns are not
/// carried into the next cycle.
pub fn sleep_budget(period: Duration, elapsed: Duration) -> Duration {
    period.saturating_sub(elapsed)
}

/// register a trip, then push `records` in batches. `limit` bounds each call
/// on its own, so a long batched upload is never cut short as a whole.
async fn upload_trip(
    uplink: &Uplink,
    records: &[Record],
    batch_size: Option<usize>,
    limit: Duration,
) -> Result<TripId, NetworkError> {
    let trip = timeout(limit, uplink.client.register_trip(&uplink.identity))
        .await
        .map_err(|_| NetworkError::Timeout { stage: Stage::RegisterTrip, after: limit })??;
    tracing::info!("[UPLOAD] Registered trip {}", trip);

    let chunk = batch_size.unwrap_or(records.len()).max(1);
    for (i, batch) in records.chunks(chunk).enumerate() {
        timeout(limit, uplink.client.upload(trip, batch))
            .await
            .map_err(|_| NetworkError::Timeout { stage: Stage::UploadData, after: limit })??;
        tracing::debug!("[UPLOAD] Sent batch {} ({} records)", i + 1, batch.len());
    }
    Ok(trip)
}
