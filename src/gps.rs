//! ==============================================================================
//! gps.rs - nmea 0183 gps source
//! ==============================================================================
//!
//! purpose:
//!     turns the receiver's nmea stream into one structured `gps` reading per
//!     cycle. the unit's receivers speak plain nmea at 9600 baud.
//!
//! sentences used:
//!     - RMC: position, speed over ground (knots -> km/h), course
//!     - GGA: fix quality, satellites in use, hdop, altitude (and the fix
//!       type, 3D with altitude else 2D, for receivers that never send GSA)
//!     - GSA: fix type (none / 2D / 3D), pdop, hdop, vdop
//!
//! sentences with a missing or wrong `*hh` checksum are dropped.
//!
//! relationships:
//!     - implements: capabilities.rs (GpsSource)
//!     - reads from: hal.rs (NmeaPort - uart or replay file)
//!
//! ==============================================================================

use crate::capabilities::GpsSource;
use crate::domain::{Reading, Scalar};
use crate::hal::NmeaPort;

use anyhow::{Context, Result};
use std::collections::BTreeMap;

pub const READING_NAME: &str = "gps";

const KNOTS_TO_KMH: f64 = 1.852;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FixType {
    #[default]
    NoFix,
    Fix2D,
    Fix3D,
}

impl FixType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FixType::NoFix => "no-fix",
            FixType::Fix2D => "2D",
            FixType::Fix3D => "3D",
        }
    }
}

/// latest known receiver state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GpsFix {
    /// degrees, positive = north
    pub latitude: f64,
    /// degrees, positive = east
    pub longitude: f64,
    /// meters above mean sea level
    pub altitude: f64,
    /// km/h
    pub speed: f64,
    /// degrees from true north
    pub course: f64,
    pub satellites: u32,
    pub fix_type: FixType,
    pub hdop: f64,
    pub vdop: f64,
    pub pdop: f64,
}

impl GpsFix {
    pub fn to_reading(&self) -> Reading {
        let mut fields: BTreeMap<String, Scalar> = BTreeMap::new();
        fields.insert("latitude".into(), self.latitude.into());
        fields.insert("longitude".into(), self.longitude.into());
        fields.insert("altitude".into(), self.altitude.into());
        fields.insert("speed".into(), self.speed.into());
        fields.insert("course".into(), self.course.into());
        fields.insert("satellites_in_use".into(), self.satellites.into());
        fields.insert("fix_type".into(), self.fix_type.as_str().into());
        fields.insert("hdop".into(), self.hdop.into());
        fields.insert("vdop".into(), self.vdop.into());
        fields.insert("pdop".into(), self.pdop.into());
        Reading::new(READING_NAME, fields)
    }
}

// ==============================================================================
// parser
// ==============================================================================

#[derive(Debug, Default)]
pub struct NmeaParser {
    fix: GpsFix,
    // once GSA shows up it owns fix_type; before that GGA approximates it
    gsa_seen: bool,
}

impl NmeaParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fix(&self) -> &GpsFix {
        &self.fix
    }

    /// feed one complete sentence. returns true if it updated the fix.
    pub fn feed_line(&mut self, line: &str) -> bool {
        let Some(body) = verify_checksum(line.trim()) else {
            tracing::debug!("[GPS] Dropping sentence with bad checksum: {}", line.trim());
            return false;
        };

        let fields: Vec<&str> = body.split(',').collect();
        let kind = fields.first().and_then(|h| h.get(2..)).unwrap_or("");
        match kind {
            "RMC" => self.parse_rmc(&fields),
            "GGA" => self.parse_gga(&fields),
            "GSA" => self.parse_gsa(&fields),
            _ => false,
        }
    }

    fn parse_rmc(&mut self, f: &[&str]) -> bool {
        if f.len() < 9 {
            return false;
        }
        if f[2] != "A" {
            self.fix.fix_type = FixType::NoFix;
            return true;
        }
        if let (Some(lat), Some(lon)) = (parse_coordinate(f[3], f[4]), parse_coordinate(f[5], f[6])) {
            self.fix.latitude = lat;
            self.fix.longitude = lon;
        }
        if let Ok(knots) = f[7].parse::<f64>() {
            self.fix.speed = knots * KNOTS_TO_KMH;
        }
        if let Ok(course) = f[8].parse::<f64>() {
            self.fix.course = course;
        }
        true
    }

    fn parse_gga(&mut self, f: &[&str]) -> bool {
        if f.len() < 10 {
            return false;
        }
        if f[6] == "0" || f[6].is_empty() {
            self.fix.fix_type = FixType::NoFix;
            return true;
        }
        if let (Some(lat), Some(lon)) = (parse_coordinate(f[2], f[3]), parse_coordinate(f[4], f[5])) {
            self.fix.latitude = lat;
            self.fix.longitude = lon;
        }
        if let Ok(n) = f[7].parse::<u32>() {
            self.fix.satellites = n;
        }
        if let Ok(hdop) = f[8].parse::<f64>() {
            self.fix.hdop = hdop;
        }
        let altitude = f[9].parse::<f64>().ok();
        if let Some(alt) = altitude {
            self.fix.altitude = alt;
        }
        if !self.gsa_seen {
            self.fix.fix_type = if altitude.is_some() { FixType::Fix3D } else { FixType::Fix2D };
        }
        true
    }

    fn parse_gsa(&mut self, f: &[&str]) -> bool {
        if f.len() < 18 {
            return false;
        }
        self.gsa_seen = true;
        self.fix.fix_type = match f[2] {
            "2" => FixType::Fix2D,
            "3" => FixType::Fix3D,
            _ => FixType::NoFix,
        };
        if let Ok(pdop) = f[15].parse::<f64>() {
            self.fix.pdop = pdop;
        }
        if let Ok(hdop) = f[16].parse::<f64>() {
            self.fix.hdop = hdop;
        }
        if let Ok(vdop) = f[17].parse::<f64>() {
            self.fix.vdop = vdop;
        }
        true
    }
}

/// "$BODY*hh" -> Some("BODY") when the xor of BODY matches hh
fn verify_checksum(line: &str) -> Option<&str> {
    let line = line.strip_prefix('$')?;
    let (body, sum) = line.split_once('*')?;
    let expected = u8::from_str_radix(sum.get(..2)?, 16).ok()?;
    (checksum(body) == expected).then_some(body)
}

fn checksum(body: &str) -> u8 {
    body.bytes().fold(0u8, |acc, b| acc ^ b)
}

/// nmea coordinate (ddmm.mmmm / dddmm.mmmm) to signed decimal degrees
fn parse_coordinate(value: &str, hemisphere: &str) -> Option<f64> {
    if value.is_empty() || hemisphere.is_empty() {
        return None;
    }
    let raw = value.parse::<f64>().ok()?;
    let degrees = (raw / 100.0).floor();
    let minutes = raw - degrees * 100.0;
    let decimal = degrees + minutes / 60.0;
    match hemisphere {
        "S" | "W" => Some(-decimal),
        _ => Some(decimal),
    }
}

// ==============================================================================
// gps sources
// ==============================================================================

pub struct NmeaGps {
    port: Box<dyn NmeaPort>,
    parser: NmeaParser,
}

impl NmeaGps {
    pub fn new(port: Box<dyn NmeaPort>) -> Self {
        Self { port, parser: NmeaParser::new() }
    }

    pub fn fix(&self) -> &GpsFix {
        self.parser.fix()
    }
}

impl GpsSource for NmeaGps {
    fn init(&mut self) -> Result<()> {
        let lines = self.port.poll_lines().context("gps port is not readable")?;
        for line in &lines {
            self.parser.feed_line(line);
        }
        tracing::info!("[GPS] NMEA receiver ready");
        Ok(())
    }

    fn read(&mut self) -> Reading {
        match self.port.poll_lines() {
            Ok(lines) => {
                for line in &lines {
                    self.parser.feed_line(line);
                }
            }
            Err(e) => tracing::warn!("[GPS] ⚠ Read error, reporting last fix: {:#}", e),
        }
        self.parser.fix().to_reading()
    }
}

/// fixed position for bench runs without a receiver
pub struct MockGps {
    fix: GpsFix,
}

impl MockGps {
    pub fn new(fix: GpsFix) -> Self {
        Self { fix }
    }
}

impl Default for MockGps {
    fn default() -> Self {
        Self::new(GpsFix {
            latitude: 41.1780,
            longitude: -8.5980,
            altitude: 110.0,
            speed: 18.5,
            course: 270.0,
            satellites: 8,
            fix_type: FixType::Fix3D,
            hdop: 0.9,
            vdop: 1.2,
            pdop: 1.5,
        })
    }
}

impl GpsSource for MockGps {
    fn init(&mut self) -> Result<()> {
        tracing::info!("[GPS] Mock GPS is setting up...");
        Ok(())
    }

    fn read(&mut self) -> Reading {
        self.fix.to_reading()
    }
}
