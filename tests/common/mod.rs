//! shared fakes for the runtime tests. every fake reports into an
//! Arc<Mutex<..>> so the test can keep watching after the builder takes it.
#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use bikesense::hal::{Board, Indicator, Radio};
use bikesense::{
    GpsSource, Identity, NetworkError, Reading, ReadingValue, Record, SensorSource, TripId,
    UploadClient,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub struct StubGps {
    pub fail_init: bool,
}

impl StubGps {
    pub fn new() -> Self {
        Self { fail_init: false }
    }
}

impl GpsSource for StubGps {
    fn init(&mut self) -> Result<()> {
        if self.fail_init {
            bail!("no uart");
        }
        Ok(())
    }

    fn read(&mut self) -> Reading {
        Reading::fields("gps", [("lat", 0.0), ("lon", 0.0)])
    }
}

pub struct StubSensor {
    name: String,
    value: f64,
    fail_init: bool,
    reads: Arc<Mutex<Vec<String>>>,
}

impl StubSensor {
    pub fn new(name: &str, value: f64) -> Self {
        Self { name: name.into(), value, fail_init: false, reads: Arc::default() }
    }

    pub fn failing(name: &str) -> Self {
        Self { fail_init: true, ..Self::new(name, 0.0) }
    }

    /// log every read into `reads`, to check ordering across sensors
    pub fn tracked(name: &str, value: f64, reads: Arc<Mutex<Vec<String>>>) -> Self {
        Self { reads, ..Self::new(name, value) }
    }
}

impl SensorSource for StubSensor {
    fn init(&mut self) -> Result<()> {
        if self.fail_init {
            bail!("{} did not answer on i2c", self.name);
        }
        Ok(())
    }

    fn read(&mut self) -> Reading {
        self.reads.lock().unwrap().push(self.name.clone());
        Reading::new(self.name.clone(), self.value)
    }
}

// ==============================================================================
// board: a radio whose link the test flips, and a led that records events
// ==============================================================================

#[derive(Default)]
pub struct BoardLog {
    pub link: bool,
    pub led_events: Vec<bool>,
    pub joins: Vec<String>,
}

pub struct FakeRadio(pub Arc<Mutex<BoardLog>>);
pub struct FakeLed(pub Arc<Mutex<BoardLog>>);

impl Radio for FakeRadio {
    fn activate(&mut self) -> Result<()> {
        Ok(())
    }

    fn connect(&mut self, ssid: &str, _password: &str) -> Result<()> {
        self.0.lock().unwrap().joins.push(ssid.to_string());
        Ok(())
    }

    fn is_connected(&mut self) -> bool {
        self.0.lock().unwrap().link
    }

    fn address(&self) -> Option<String> {
        Some("192.168.4.2".to_string())
    }

    fn status(&self) -> String {
        "idle".to_string()
    }
}

impl Indicator for FakeLed {
    fn set(&mut self, on: bool) {
        self.0.lock().unwrap().led_events.push(on);
    }
}

pub fn fake_board() -> (Board, Arc<Mutex<BoardLog>>) {
    let log = Arc::new(Mutex::new(BoardLog::default()));
    let board = Board::new(Box::new(FakeRadio(log.clone())), Box::new(FakeLed(log.clone())));
    (board, log)
}

// ==============================================================================
// trip api
// ==============================================================================

#[derive(Default)]
pub struct ApiLog {
    pub registrations: Vec<Identity>,
    pub uploads: Vec<(TripId, Vec<Record>)>,
    pub fail_register: bool,
    pub fail_upload: bool,
    pub hang: bool,
    /// how long each UploadData call takes
    pub upload_delay: Option<Duration>,
}

#[derive(Clone, Default)]
pub struct FakeApi(pub Arc<Mutex<ApiLog>>);

impl FakeApi {
    pub fn log(&self) -> std::sync::MutexGuard<'_, ApiLog> {
        self.0.lock().unwrap()
    }
}

#[async_trait]
impl UploadClient for FakeApi {
    async fn register_trip(&self, identity: &Identity) -> Result<TripId, NetworkError> {
        let hang = self.log().hang;
        if hang {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        let mut log = self.log();
        log.registrations.push(*identity);
        if log.fail_register {
            return Err(NetworkError::Status {
                stage: bikesense::error::Stage::RegisterTrip,
                status: 503,
                body: "maintenance".into(),
            });
        }
        Ok(100 + log.registrations.len() as TripId)
    }

    async fn upload(&self, trip: TripId, records: &[Record]) -> Result<(), NetworkError> {
        let delay = self.log().upload_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut log = self.log();
        log.uploads.push((trip, records.to_vec()));
        if log.fail_upload {
            return Err(NetworkError::MalformedResponse {
                stage: bikesense::error::Stage::UploadData,
                reason: "connection reset".into(),
            });
        }
        Ok(())
    }
}

pub fn number(record: &Record, key: &str) -> Option<f64> {
    match record.get(key) {
        Some(ReadingValue::Number(n)) => Some(*n),
        _ => None,
    }
}
