//! ==============================================================================
//! main.rs - bikesense unit entry point
//! ==============================================================================
//!
//! purpose:
//!     boots the sensor unit: reads config/bikesense.toml, composes the gps,
//!     storage and sensors into a runtime, and hands control to its loop.
//!
//! boot sequence:
//!     1. load configuration (file or defaults)
//!     2. install the log subscriber
//!     3. compose + initialize components (any init failure halts boot)
//!     4. run the acquisition loop until power-off
//!
//! ==============================================================================

use bikesense::config::{BikeSenseConfig, GpsKind};
use bikesense::gps::{MockGps, NmeaGps};
use bikesense::sensors::{CpuTemperatureSensor, MockSensor};
use bikesense::storage::MemoryStorage;
use bikesense::{hal, GpsSource, Runtime, RuntimeBuilder};

use anyhow::Result;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    println!("===========================================================");
    println!("  BikeSense - sensor unit");
    println!("===========================================================");

    // step 1: load configuration
    let config = BikeSenseConfig::load_or_default();

    // step 2: logging
    tracing_subscriber::fmt()
        .with_max_level(config.logging.max_level())
        .init();
    config.print_summary();

    // step 3: compose the runtime
    tracing::info!("[STARTUP] Initializing components...");
    let runtime = match compose(&config) {
        Ok(r) => {
            tracing::info!("[STARTUP] ✓ Runtime ready");
            r
        }
        Err(e) => {
            tracing::error!("[ERROR] Fatal: {:#}", e);
            return Err(e);
        }
    };

    // step 4: main loop
    runtime.run().await;
    Ok(())
}

fn compose(config: &BikeSenseConfig) -> Result<Runtime> {
    let gps: Box<dyn GpsSource> = match config.gps.source {
        GpsKind::Mock => Box::new(MockGps::default()),
        GpsKind::Nmea => {
            let port = hal::open_nmea_port(
                &config.gps.device,
                config.gps.baud,
                config.gps.replay_file.as_deref(),
            )?;
            Box::new(NmeaGps::new(port))
        }
    };

    let mut builder = RuntimeBuilder::from_boxed(gps, Box::new(MemoryStorage::new(config.storage.capacity)))
        .period(config.polling.period())
        .upload_threshold(config.upload.threshold)
        .upload_timeout(config.upload.timeout())
        .upload_batch_size(config.upload.batch_size)
        .led_pin(config.led.gpio_pin)
        .show_records(config.logging.show_sensor_data);

    if config.sensors.mock {
        builder = builder.sensor(MockSensor::environment());
    }
    if config.sensors.cpu_temperature {
        builder = builder.sensor(CpuTemperatureSensor::new());
    }
    for wifi in &config.wifi {
        builder = builder.wifi(wifi.ssid.clone(), wifi.password.clone());
    }
    if let Some(api) = &config.api {
        builder = builder.api(api.endpoint.clone(), api.token.clone());
    }
    if let Some(id) = config.identity {
        builder = builder.identity(id.bike_id, id.unit_id);
    }

    Ok(builder.build()?)
}
