//! ==============================================================================
//! hal.rs - Hardware Abstraction Layer
//! ==============================================================================
//!
//! purpose:
//!     the unit's process-wide peripherals: the wifi radio, the status led and
//!     the gps uart. abstracts away the difference between a real board
//!     (`rppal` + `nmcli`) and a development machine (mocks).
//!
//! design philosophy:
//!     - "Compile Anywhere": without the `hardware` feature everything is mocked.
//!     - "Claim Once": the radio and led are handed out exactly once per
//!       process through `Board::take()`, and stay owned by the runtime until
//!       the process goes away.
//!
//! relationships:
//!     - used by: runtime.rs (claims the board at build time)
//!     - used by: network.rs (WifiGate drives Radio + Indicator)
//!     - used by: gps.rs (reads nmea lines from an NmeaPort)
//!     - uses: rppal (on feature="hardware")
//!     - uses: std::process::Command (nmcli for the radio)
//!
//! ==============================================================================

use crate::error::BikeSenseError;

use anyhow::{anyhow, bail, Context, Result};
use std::io::Write;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};

/// a single on/off status light
pub trait Indicator: Send {
    fn set(&mut self, on: bool);
}

/// the network interface the unit uploads through
pub trait Radio: Send {
    /// power the interface up
    fn activate(&mut self) -> Result<()>;
    /// start joining a network. must not wait for the link to come up.
    fn connect(&mut self, ssid: &str, password: &str) -> Result<()>;
    fn is_connected(&mut self) -> bool;
    fn address(&self) -> Option<String>;
    fn status(&self) -> String;
}

/// a byte stream of nmea sentences (usually the gps uart)
pub trait NmeaPort: Send {
    /// complete lines received since the last poll. never blocks.
    fn poll_lines(&mut self) -> Result<Vec<String>>;
}

// ==============================================================================
// board - the claim-once bundle of radio + led
// ==============================================================================

static BOARD_TAKEN: AtomicBool = AtomicBool::new(false);

pub struct Board {
    pub radio: Box<dyn Radio>,
    pub indicator: Box<dyn Indicator>,
}

impl Board {
    /// wrap caller-provided peripherals. does not touch the process-wide claim.
    pub fn new(radio: Box<dyn Radio>, indicator: Box<dyn Indicator>) -> Self {
        Self { radio, indicator }
    }

    /// claim this machine's radio and status led. the second call in a
    /// process fails with `BikeSenseError::Reuse`.
    pub fn take(led_pin: u8) -> Result<Self, BikeSenseError> {
        Self::claim_with(|| {
            let indicator = Led::new(led_pin).map_err(|e| BikeSenseError::init("status led", e))?;
            Ok(Self { radio: platform_radio(), indicator: Box::new(indicator) })
        })
    }

    // a failed bring-up releases the claim so the next attempt sees the real error
    fn claim_with<F>(open: F) -> Result<Self, BikeSenseError>
    where
        F: FnOnce() -> Result<Self, BikeSenseError>,
    {
        if BOARD_TAKEN
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(BikeSenseError::Reuse);
        }

        let board = open();
        if board.is_err() {
            BOARD_TAKEN.store(false, Ordering::SeqCst);
        }
        board
    }
}

// ==============================================================================================
// MOCK IMPLEMENTATION (For Non-Hardware Build)
// ==============================================================================================

#[cfg(not(feature = "hardware"))]
pub struct Led {
    pin: u8,
    on: bool,
}

#[cfg(not(feature = "hardware"))]
impl Led {
    pub fn new(pin: u8) -> Result<Self> {
        tracing::info!("Using MOCK HAL (No hardware access)");
        Ok(Self { pin, on: false })
    }

    pub fn is_on(&self) -> bool {
        self.on
    }
}

#[cfg(not(feature = "hardware"))]
impl Indicator for Led {
    fn set(&mut self, on: bool) {
        self.on = on;
        tracing::debug!("[MOCK LED] Pin {} {}", self.pin, if on { "ON" } else { "OFF" });
    }
}

/// pretends the link comes up as soon as a connection is requested.
/// lets a dev machine exercise the upload path against a local api.
#[cfg(not(feature = "hardware"))]
#[derive(Default)]
pub struct LoopbackRadio {
    active: bool,
    ssid: Option<String>,
}

#[cfg(not(feature = "hardware"))]
impl Radio for LoopbackRadio {
    fn activate(&mut self) -> Result<()> {
        tracing::debug!("[MOCK RADIO] Interface up");
        self.active = true;
        Ok(())
    }

    fn connect(&mut self, ssid: &str, _password: &str) -> Result<()> {
        if !self.active {
            bail!("radio is not active");
        }
        tracing::debug!("[MOCK RADIO] Joining '{}'", ssid);
        self.ssid = Some(ssid.to_string());
        Ok(())
    }

    fn is_connected(&mut self) -> bool {
        self.active && self.ssid.is_some()
    }

    fn address(&self) -> Option<String> {
        self.ssid.as_ref().map(|_| "127.0.0.1".to_string())
    }

    fn status(&self) -> String {
        match (self.active, &self.ssid) {
            (false, _) => "inactive".to_string(),
            (true, None) => "idle".to_string(),
            (true, Some(_)) => "connected".to_string(),
        }
    }
}

#[cfg(not(feature = "hardware"))]
fn platform_radio() -> Box<dyn Radio> {
    Box::new(LoopbackRadio::default())
}

/// replays a recorded nmea log, one fix epoch per poll, looping at the end
#[cfg(not(feature = "hardware"))]
pub struct ReplayPort {
    lines: Vec<String>,
    cursor: usize,
}

#[cfg(not(feature = "hardware"))]
impl ReplayPort {
    pub fn open(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read nmea replay {}", path.display()))?;
        Ok(Self::from_lines(content.lines().map(str::to_string).collect()))
    }

    pub fn from_lines(lines: Vec<String>) -> Self {
        let lines = lines.into_iter().map(|l| l.trim().to_string()).filter(|l| !l.is_empty()).collect();
        Self { lines, cursor: 0 }
    }
}

#[cfg(not(feature = "hardware"))]
impl NmeaPort for ReplayPort {
    fn poll_lines(&mut self) -> Result<Vec<String>> {
        if self.lines.is_empty() {
            return Ok(Vec::new());
        }
        if self.cursor >= self.lines.len() {
            self.cursor = 0;
        }

        // an epoch runs until the next RMC sentence
        let mut out = vec![self.lines[self.cursor].clone()];
        self.cursor += 1;
        while let Some(line) = self.lines.get(self.cursor) {
            if is_rmc(line) {
                break;
            }
            out.push(line.clone());
            self.cursor += 1;
        }
        Ok(out)
    }
}

#[cfg(not(feature = "hardware"))]
fn is_rmc(line: &str) -> bool {
    line.get(3..6) == Some("RMC")
}

/// open the gps port. on a dev machine this is an nmea replay file.
#[cfg(not(feature = "hardware"))]
pub fn open_nmea_port(
    _device: &str,
    _baud: u32,
    replay_file: Option<&std::path::Path>,
) -> Result<Box<dyn NmeaPort>> {
    let path = replay_file.ok_or_else(|| anyhow!("no gps.replay_file configured for the mock uart"))?;
    Ok(Box::new(ReplayPort::open(path)?))
}

// ==============================================================================================
// REAL IMPLEMENTATION (For Raspberry Pi)
// ==============================================================================================

#[cfg(feature = "hardware")]
pub struct Led {
    pin: rppal::gpio::OutputPin,
}

#[cfg(feature = "hardware")]
impl Led {
    pub fn new(pin: u8) -> Result<Self> {
        tracing::info!("Using REAL HARDWARE HAL (rppal)");
        let gpio = rppal::gpio::Gpio::new()?;
        let mut pin = gpio.get(pin)?.into_output_low();
        // keep the last state visible if the process exits
        pin.set_reset_on_drop(false);
        Ok(Self { pin })
    }

    pub fn is_on(&self) -> bool {
        self.pin.is_set_high()
    }
}

#[cfg(feature = "hardware")]
impl Indicator for Led {
    fn set(&mut self, on: bool) {
        if on {
            self.pin.set_high();
        } else {
            self.pin.set_low();
        }
    }
}

#[cfg(feature = "hardware")]
fn platform_radio() -> Box<dyn Radio> {
    Box::new(NmcliRadio::new("wlan0"))
}

#[cfg(feature = "hardware")]
pub struct UartPort {
    uart: rppal::uart::Uart,
    pending: Vec<u8>,
}

#[cfg(feature = "hardware")]
impl UartPort {
    pub fn open(device: &str, baud: u32) -> Result<Self> {
        use rppal::uart::{Parity, Uart};
        let mut uart = Uart::with_path(device, baud, Parity::None, 8, 1)
            .with_context(|| format!("failed to open gps uart {}", device))?;
        // non-blocking: return whatever is buffered
        uart.set_read_mode(0, std::time::Duration::ZERO)?;
        Ok(Self { uart, pending: Vec::with_capacity(256) })
    }
}

#[cfg(feature = "hardware")]
impl NmeaPort for UartPort {
    fn poll_lines(&mut self) -> Result<Vec<String>> {
        let mut buf = [0u8; 256];
        loop {
            let n = self.uart.read(&mut buf)?;
            if n == 0 {
                break;
            }
            self.pending.extend_from_slice(&buf[..n]);
        }

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw).trim().to_string();
            if !line.is_empty() {
                lines.push(line);
            }
        }
        // a line that never terminates is noise
        if self.pending.len() > 1024 {
            self.pending.clear();
        }
        Ok(lines)
    }
}

#[cfg(feature = "hardware")]
pub fn open_nmea_port(
    device: &str,
    baud: u32,
    _replay_file: Option<&std::path::Path>,
) -> Result<Box<dyn NmeaPort>> {
    Ok(Box::new(UartPort::open(device, baud)?))
}

// ==============================================================================
// nmcli radio - networkmanager-driven wifi on linux boards
// ==============================================================================

pub struct NmcliRadio {
    interface: String,
    join: Option<Child>,
    last_state: String,
}

impl NmcliRadio {
    pub fn new(interface: impl Into<String>) -> Self {
        Self { interface: interface.into(), join: None, last_state: "unknown".to_string() }
    }

    fn nmcli(args: &[&str]) -> Result<String> {
        let output = Command::new("nmcli")
            .args(args)
            .output()
            .map_err(|e| anyhow!("Failed to run nmcli: {}", e))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("nmcli error: {}", stderr.trim());
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn reap_join(&mut self) {
        let Some(child) = self.join.as_mut() else { return };
        match child.try_wait() {
            Ok(Some(status)) if status.success() => {
                self.join = None;
            }
            Ok(Some(status)) => {
                tracing::warn!("[WIFI] nmcli connect exited with {}", status);
                self.join = None;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("[WIFI] Lost track of nmcli connect: {}", e);
                self.join = None;
            }
        }
    }
}

impl Radio for NmcliRadio {
    fn activate(&mut self) -> Result<()> {
        Self::nmcli(&["radio", "wifi", "on"])?;
        Ok(())
    }

    fn connect(&mut self, ssid: &str, password: &str) -> Result<()> {
        if let Some(mut previous) = self.join.take() {
            // only one join in flight
            let _ = previous.kill();
            let _ = previous.wait();
        }

        let mut child = Command::new("nmcli")
            .args(join_args(ssid, &self.interface))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| anyhow!("Failed to run nmcli: {}", e))?;

        // the password goes in on stdin, never on the command line
        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = writeln!(stdin, "{}", password) {
                let _ = child.kill();
                bail!("failed to hand the password to nmcli: {}", e);
            }
        }
        self.join = Some(child);
        Ok(())
    }

    fn is_connected(&mut self) -> bool {
        self.reap_join();
        match Self::nmcli(&["-t", "-f", "GENERAL.STATE", "device", "show", &self.interface]) {
            Ok(out) => {
                self.last_state = parse_device_state(&out).unwrap_or("unknown").to_string();
                self.last_state.starts_with("100")
            }
            Err(e) => {
                self.last_state = format!("error: {}", e);
                false
            }
        }
    }

    fn address(&self) -> Option<String> {
        let out = Self::nmcli(&["-t", "-f", "IP4.ADDRESS", "device", "show", &self.interface]).ok()?;
        parse_ip4_address(&out)
    }

    fn status(&self) -> String {
        self.last_state.clone()
    }
}

/// `nmcli --ask` prompts for the secret on stdin
fn join_args<'a>(ssid: &'a str, interface: &'a str) -> [&'a str; 7] {
    ["--ask", "device", "wifi", "connect", ssid, "ifname", interface]
}

/// "GENERAL.STATE:100 (connected)" -> "100 (connected)"
fn parse_device_state(out: &str) -> Option<&str> {
    out.lines()
        .find_map(|l| l.strip_prefix("GENERAL.STATE:"))
        .map(str::trim)
}

/// "IP4.ADDRESS[1]:192.168.1.20/24" -> "192.168.1.20"
fn parse_ip4_address(out: &str) -> Option<String> {
    out.lines()
        .filter(|l| l.starts_with("IP4.ADDRESS"))
        .find_map(|l| l.split_once(':'))
        .map(|(_, addr)| addr.split('/').next().unwrap_or(addr).trim().to_string())
        .filter(|a| !a.is_empty())
}
