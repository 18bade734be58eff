//! ==============================================================================
//! network.rs - connectivity gate
//! ==============================================================================
//!
//! purpose:
//!     tells the runtime whether the upload branch may run, and mirrors the
//!     link on the status led.
//!
//! transitions:
//!     - down -> up: led on, log the address
//!     - up -> down: led off, log the radio status
//!     repeated identical polls have no side effects.
//!
//! known networks:
//!     tried in order. if a join cannot start, or the link stays down for
//!     `JOIN_PATIENCE` polls, the gate moves on to the next one (wrapping).
//!
//! relationships:
//!     - implements: capabilities.rs (ConnectivityGate)
//!     - uses: hal.rs (Board: Radio + Indicator)
//!     - used by: runtime.rs
//!
//! ==============================================================================

use crate::capabilities::ConnectivityGate;
use crate::hal::Board;

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct WifiCredentials {
    pub ssid: String,
    pub password: String,
}

impl WifiCredentials {
    pub fn new(ssid: impl Into<String>, password: impl Into<String>) -> Self {
        Self { ssid: ssid.into(), password: password.into() }
    }
}

impl std::fmt::Debug for WifiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WifiCredentials")
            .field("ssid", &self.ssid)
            .field("password", &"****")
            .finish()
    }
}

/// polls without a link before the gate moves on to the next known network
pub const JOIN_PATIENCE: u32 = 10;

pub struct WifiGate {
    board: Board,
    linked: bool,
    networks: Vec<WifiCredentials>,
    current: usize,
    down_polls: u32,
    patience: u32,
}

impl WifiGate {
    /// gate over a board whose radio is managed elsewhere
    pub fn new(board: Board) -> Self {
        Self {
            board,
            linked: false,
            networks: Vec::new(),
            current: 0,
            down_polls: 0,
            patience: JOIN_PATIENCE,
        }
    }

    /// power the radio up and start joining the first of `networks`. returns
    /// as soon as the attempt is underway; the link is picked up by later polls.
    pub fn join(mut board: Board, networks: Vec<WifiCredentials>) -> Result<Self> {
        board.radio.activate().context("failed to enable the radio")?;
        let mut gate = Self { networks, ..Self::new(board) };
        gate.start_join(0);
        Ok(gate)
    }

    pub fn with_patience(mut self, polls: u32) -> Self {
        self.patience = polls.max(1);
        self
    }

    /// ssid of the network currently being joined (or held)
    pub fn current_network(&self) -> Option<&str> {
        self.networks.get(self.current).map(|n| n.ssid.as_str())
    }

    // walks the list from `from`, skipping networks whose join cannot start
    fn start_join(&mut self, from: usize) {
        let count = self.networks.len();
        for step in 0..count {
            let i = (from + step) % count;
            let network = &self.networks[i];
            match self.board.radio.connect(&network.ssid, &network.password) {
                Ok(()) => {
                    tracing::info!("[WIFI] Joining '{}' in the background", network.ssid);
                    self.current = i;
                    return;
                }
                Err(e) => tracing::warn!("[WIFI] ⚠ Could not start joining '{}': {:#}", network.ssid, e),
            }
        }
        if count > 0 {
            self.current = from % count;
        }
    }
}

impl ConnectivityGate for WifiGate {
    fn is_connected(&mut self) -> bool {
        let now = self.board.radio.is_connected();
        if now != self.linked {
            self.board.indicator.set(now);
            if now {
                let ip = self.board.radio.address().unwrap_or_else(|| "unknown".to_string());
                tracing::info!("[WIFI] ✓ Connected, ip = {}", ip);
            } else {
                tracing::warn!("[WIFI] Link down, status: {}", self.board.radio.status());
            }
            self.linked = now;
        }

        if now {
            self.down_polls = 0;
        } else if !self.networks.is_empty() {
            self.down_polls += 1;
            if self.down_polls >= self.patience {
                self.down_polls = 0;
                tracing::info!("[WIFI] No link after {} polls, moving on", self.patience);
                self.start_join((self.current + 1) % self.networks.len());
            }
        }
        now
    }
}

/// used when the unit has no way to upload: never connected
#[derive(Debug, Default)]
pub struct OfflineGate;

impl ConnectivityGate for OfflineGate {
    fn is_connected(&mut self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::{Indicator, Radio};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Shared {
        link: bool,
        led_events: Vec<bool>,
        activated: bool,
        joins: Vec<String>,
        refuse: Vec<String>,
    }

    struct FakeRadio(Arc<Mutex<Shared>>);
    struct FakeLed(Arc<Mutex<Shared>>);

    impl Radio for FakeRadio {
        fn activate(&mut self) -> Result<()> {
            self.0.lock().unwrap().activated = true;
            Ok(())
        }
        fn connect(&mut self, ssid: &str, _password: &str) -> Result<()> {
            let mut s = self.0.lock().unwrap();
            s.joins.push(ssid.to_string());
            if s.refuse.iter().any(|r| r == ssid) {
                anyhow::bail!("unknown network");
            }
            Ok(())
        }
        fn is_connected(&mut self) -> bool {
            self.0.lock().unwrap().link
        }
        fn address(&self) -> Option<String> {
            Some("10.0.0.7".into())
        }
        fn status(&self) -> String {
            "idle".into()
        }
    }

    impl Indicator for FakeLed {
        fn set(&mut self, on: bool) {
            self.0.lock().unwrap().led_events.push(on);
        }
    }

    fn board(shared: &Arc<Mutex<Shared>>) -> Board {
        Board::new(Box::new(FakeRadio(shared.clone())), Box::new(FakeLed(shared.clone())))
    }

    fn networks(ssids: &[&str]) -> Vec<WifiCredentials> {
        ssids.iter().map(|s| WifiCredentials::new(*s, "pw")).collect()
    }

    #[test]
    fn test_indicator_follows_transitions_only() {
        let shared = Arc::new(Mutex::new(Shared::default()));
        let mut gate = WifiGate::new(board(&shared));

        assert!(!gate.is_connected());
        assert!(!gate.is_connected());
        assert!(shared.lock().unwrap().led_events.is_empty());

        shared.lock().unwrap().link = true;
        assert!(gate.is_connected());
        assert!(gate.is_connected());
        assert!(gate.is_connected());
        assert_eq!(shared.lock().unwrap().led_events, vec![true]);

        shared.lock().unwrap().link = false;
        assert!(!gate.is_connected());
        assert!(!gate.is_connected());
        assert_eq!(shared.lock().unwrap().led_events, vec![true, false]);
    }

    #[test]
    fn test_join_activates_and_connects() {
        let shared = Arc::new(Mutex::new(Shared::default()));
        let gate = WifiGate::join(board(&shared), networks(&["bikenet"])).unwrap();

        let s = shared.lock().unwrap();
        assert!(s.activated);
        assert_eq!(s.joins, vec!["bikenet"]);
        assert_eq!(gate.current_network(), Some("bikenet"));
    }

    #[test]
    fn test_join_skips_network_that_cannot_start() {
        let shared = Arc::new(Mutex::new(Shared::default()));
        shared.lock().unwrap().refuse.push("home".into());

        let gate = WifiGate::join(board(&shared), networks(&["home", "office"])).unwrap();
        assert_eq!(shared.lock().unwrap().joins, vec!["home", "office"]);
        assert_eq!(gate.current_network(), Some("office"));
    }

    #[test]
    fn test_moves_to_next_network_when_link_stays_down() {
        let shared = Arc::new(Mutex::new(Shared::default()));
        let mut gate = WifiGate::join(board(&shared), networks(&["home", "office"]))
            .unwrap()
            .with_patience(2);

        gate.is_connected();
        assert_eq!(shared.lock().unwrap().joins, vec!["home"]);
        gate.is_connected();
        assert_eq!(gate.current_network(), Some("office"));

        gate.is_connected();
        gate.is_connected();
        assert_eq!(shared.lock().unwrap().joins, vec!["home", "office", "home"]);
    }

    #[test]
    fn test_link_up_holds_current_network() {
        let shared = Arc::new(Mutex::new(Shared::default()));
        let mut gate = WifiGate::join(board(&shared), networks(&["home", "office"]))
            .unwrap()
            .with_patience(2);

        gate.is_connected();
        shared.lock().unwrap().link = true;
        for _ in 0..5 {
            assert!(gate.is_connected());
        }
        assert_eq!(shared.lock().unwrap().joins, vec!["home"]);
        assert_eq!(gate.current_network(), Some("home"));
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let creds = WifiCredentials::new("bikenet", "Bike123!");
        assert!(!format!("{:?}", creds).contains("Bike123!"));
    }
}
