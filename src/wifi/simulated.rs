//! In-memory radio for host runs and tests.
//!
//! Behaves like the real interfaces closely enough to exercise the
//! controller: scanning needs the station interface, association needs a
//! matching passphrase, and every call is recorded as a [`RadioEvent`].

use super::radio::{RadioDriver, RadioError};
use crate::config::AccessPointConfig;
use std::cell::Cell;
use std::net::Ipv4Addr;

/// Address the simulated access point reports.
pub const SIMULATED_AP_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 4, 1);

/// Address handed to the simulated station on association.
pub const SIMULATED_STATION_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 50);

/// One recorded driver call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    StationEnabled,
    StationDisabled,
    StationConnect(String),
    StationDisconnected,
    Scan,
    ApConfigured { ssid: String, open: bool },
    ApEnabled,
    ApDisabled,
}

#[derive(Debug, Clone)]
struct SimulatedNetwork {
    ssid: Vec<u8>,
    passphrase: String,
}

/// Simulated radio driver.
#[derive(Debug)]
pub struct SimulatedRadio {
    networks: Vec<SimulatedNetwork>,
    station_active: bool,
    associated: Option<String>,
    association_delay: u32,
    // Polls left before a pending association completes
    pending_polls: Cell<u32>,
    ap_active: bool,
    ap_ssid: Option<String>,
    ap_ip: Ipv4Addr,
    station_ip: Ipv4Addr,
    reject_secured_ap: bool,
    stalled_ap: bool,
    failing_scan: bool,
    refuse_station_switch: bool,
    events: Vec<RadioEvent>,
}

impl Default for SimulatedRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedRadio {
    /// An idle radio with no visible networks.
    pub fn new() -> Self {
        Self {
            networks: Vec::new(),
            station_active: false,
            associated: None,
            association_delay: 0,
            pending_polls: Cell::new(0),
            ap_active: false,
            ap_ssid: None,
            ap_ip: SIMULATED_AP_IP,
            station_ip: SIMULATED_STATION_IP,
            reject_secured_ap: false,
            stalled_ap: false,
            failing_scan: false,
            refuse_station_switch: false,
            events: Vec::new(),
        }
    }

    /// Add a visible network joinable with `passphrase`.
    pub fn with_network(mut self, ssid: &str, passphrase: &str) -> Self {
        self.networks.push(SimulatedNetwork {
            ssid: ssid.as_bytes().to_vec(),
            passphrase: passphrase.to_string(),
        });
        self
    }

    /// Add a scan record with arbitrary SSID bytes.
    pub fn with_raw_ssid(mut self, ssid: Vec<u8>) -> Self {
        self.networks.push(SimulatedNetwork {
            ssid,
            passphrase: String::new(),
        });
        self
    }

    /// Association completes only after this many status polls.
    pub fn with_association_delay(mut self, polls: u32) -> Self {
        self.association_delay = polls;
        self
    }

    /// Override the access point address.
    pub fn with_ap_ip(mut self, ip: Ipv4Addr) -> Self {
        self.ap_ip = ip;
        self
    }

    /// Refuse secured access point configurations.
    pub fn rejecting_secured_ap(mut self) -> Self {
        self.reject_secured_ap = true;
        self
    }

    /// Accept access point activation but never report it active.
    pub fn with_stalled_ap(mut self) -> Self {
        self.stalled_ap = true;
        self
    }

    /// Make every scan fail.
    pub fn failing_scan(mut self) -> Self {
        self.failing_scan = true;
        self
    }

    /// Reject every station interface switch, leaving the interface as it
    /// was.
    pub fn refusing_station_switch(mut self) -> Self {
        self.refuse_station_switch = true;
        self
    }

    /// Recorded driver calls, oldest first.
    pub fn events(&self) -> &[RadioEvent] {
        &self.events
    }

    /// SSID of the network the station is associated with.
    pub fn associated_ssid(&self) -> Option<&str> {
        self.associated.as_deref()
    }

    fn association_complete(&self) -> bool {
        self.associated.is_some() && self.pending_polls.get() == 0
    }
}

impl RadioDriver for SimulatedRadio {
    fn station_active(&self) -> bool {
        self.station_active
    }

    fn set_station_active(&mut self, active: bool) -> Result<(), RadioError> {
        if self.refuse_station_switch {
            return Err(RadioError::Driver("station switch rejected".into()));
        }
        self.station_active = active;
        if active {
            self.events.push(RadioEvent::StationEnabled);
        } else {
            self.associated = None;
            self.events.push(RadioEvent::StationDisabled);
        }
        Ok(())
    }

    fn station_connected(&self) -> bool {
        if self.associated.is_none() {
            return false;
        }
        let pending = self.pending_polls.get();
        if pending > 0 {
            self.pending_polls.set(pending - 1);
            return false;
        }
        true
    }

    fn station_connect(&mut self, ssid: &str, passphrase: &str) -> Result<(), RadioError> {
        if !self.station_active {
            return Err(RadioError::Driver("station interface is not active".into()));
        }
        self.events.push(RadioEvent::StationConnect(ssid.to_string()));
        let matches = self
            .networks
            .iter()
            .any(|n| n.ssid == ssid.as_bytes() && n.passphrase == passphrase);
        if matches {
            self.associated = Some(ssid.to_string());
            self.pending_polls.set(self.association_delay);
        } else {
            self.associated = None;
        }
        Ok(())
    }

    fn station_disconnect(&mut self) -> Result<(), RadioError> {
        self.associated = None;
        self.events.push(RadioEvent::StationDisconnected);
        Ok(())
    }

    fn station_ip(&self) -> Option<Ipv4Addr> {
        self.association_complete().then_some(self.station_ip)
    }

    fn scan(&mut self) -> Result<Vec<Vec<u8>>, RadioError> {
        if !self.station_active {
            return Err(RadioError::Driver("scan requires the station interface".into()));
        }
        self.events.push(RadioEvent::Scan);
        if self.failing_scan {
            return Err(RadioError::Driver("scan aborted".into()));
        }
        Ok(self.networks.iter().map(|n| n.ssid.clone()).collect())
    }

    fn ap_active(&self) -> bool {
        self.ap_active && !self.stalled_ap
    }

    fn configure_ap(&mut self, config: &AccessPointConfig) -> Result<(), RadioError> {
        if self.reject_secured_ap && !config.is_open() {
            return Err(RadioError::Driver("secured access point rejected".into()));
        }
        self.ap_ssid = Some(config.ssid().to_string());
        self.events.push(RadioEvent::ApConfigured {
            ssid: config.ssid().to_string(),
            open: config.is_open(),
        });
        Ok(())
    }

    fn set_ap_active(&mut self, active: bool) -> Result<(), RadioError> {
        if active && self.ap_ssid.is_none() {
            return Err(RadioError::Driver("access point not configured".into()));
        }
        self.ap_active = active;
        self.events.push(if active {
            RadioEvent::ApEnabled
        } else {
            RadioEvent::ApDisabled
        });
        Ok(())
    }

    fn ap_ip(&self) -> Option<Ipv4Addr> {
        self.ap_active().then_some(self.ap_ip)
    }
}
