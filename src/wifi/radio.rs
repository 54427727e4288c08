//! Radio mode arbitration.
//!
//! The chip has one radio shared by the access point and station
//! interfaces. [`RadioController`] owns the driver and is the only code that
//! switches between them, so the "one mode at a time" rule lives here rather
//! than in callers.
//!
//! ```text
//! Off ──activate_access_point──► AccessPoint ──connect_station──► Station
//!  ▲                                  ▲                              │
//!  └──────────── shutdown ────────────┴──── activate_access_point ───┘
//! ```
//!
//! Two overlaps are allowed, both bounded. A scan enables the station
//! interface for its own duration. A station join leaves the access point up
//! because the client that asked for it is connected through that access
//! point and still waits for the outcome. After a successful join the access
//! point stays up until [`RadioController::retire_access_point`]; after a
//! failed one the station interface is switched back off.

use crate::config::{AccessPointConfig, ConnectionAttempt};
use log::{debug, error, info, warn};
use std::collections::BTreeSet;
use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Which role the radio is currently serving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioMode {
    /// Both interfaces down.
    Off,
    /// Broadcasting the setup access point.
    AccessPoint,
    /// Station interface up (associated or cleanly disassociated). After a
    /// successful join the access point stays up until it is retired.
    Station,
}

/// Low-level interface control.
///
/// Implemented by the ESP-IDF driver on device and by
/// [`SimulatedRadio`](super::SimulatedRadio) on host. Methods map one-to-one
/// onto interface operations; sequencing is the controller's job.
pub trait RadioDriver {
    /// Whether the station interface is enabled.
    fn station_active(&self) -> bool;

    /// Enable or disable the station interface.
    fn set_station_active(&mut self, active: bool) -> Result<(), RadioError>;

    /// Whether the station is associated and has an address.
    fn station_connected(&self) -> bool;

    /// Start associating with a network. Does not wait for the result.
    fn station_connect(&mut self, ssid: &str, passphrase: &str) -> Result<(), RadioError>;

    /// Drop the current association, if any.
    fn station_disconnect(&mut self) -> Result<(), RadioError>;

    /// Address assigned to the station interface.
    fn station_ip(&self) -> Option<Ipv4Addr>;

    /// Raw SSIDs of visible networks. Requires the station interface.
    fn scan(&mut self) -> Result<Vec<Vec<u8>>, RadioError>;

    /// Whether the access point interface reports active.
    fn ap_active(&self) -> bool;

    /// Apply access point settings.
    fn configure_ap(&mut self, config: &AccessPointConfig) -> Result<(), RadioError>;

    /// Enable or disable the access point interface.
    fn set_ap_active(&mut self, active: bool) -> Result<(), RadioError>;

    /// Address of the access point interface.
    fn ap_ip(&self) -> Option<Ipv4Addr>;
}

/// Delays used while reconfiguring the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadioTiming {
    /// Settle time after toggling the station interface.
    pub settle: Duration,
    /// Settle time after taking a stale access point down.
    pub ap_restart: Duration,
    /// Interval between access point activation polls.
    pub ap_poll_interval: Duration,
    /// Number of access point activation polls.
    pub ap_poll_attempts: u32,
    /// Interval between association polls (one per second of deadline).
    pub connect_poll_interval: Duration,
}

impl Default for RadioTiming {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(1),
            ap_restart: Duration::from_millis(500),
            ap_poll_interval: Duration::from_millis(500),
            ap_poll_attempts: 10,
            connect_poll_interval: Duration::from_secs(1),
        }
    }
}

impl RadioTiming {
    /// No delays at all, for simulated radios.
    pub fn immediate() -> Self {
        Self {
            settle: Duration::ZERO,
            ap_restart: Duration::ZERO,
            ap_poll_interval: Duration::ZERO,
            ap_poll_attempts: 10,
            connect_poll_interval: Duration::ZERO,
        }
    }
}

fn pause(duration: Duration) {
    if !duration.is_zero() {
        std::thread::sleep(duration);
    }
}

/// Enables the station interface for the lifetime of the guard.
///
/// If the interface was off on entry it is switched off again on drop,
/// including on early return and unwinding.
struct StationScope<'a, D: RadioDriver> {
    driver: &'a mut D,
    restore: bool,
}

impl<'a, D: RadioDriver> StationScope<'a, D> {
    fn enter(driver: &'a mut D, settle: Duration) -> Result<Self, RadioError> {
        let restore = !driver.station_active();
        if restore {
            driver.set_station_active(true)?;
            pause(settle);
        }
        Ok(Self { driver, restore })
    }
}

impl<D: RadioDriver> Drop for StationScope<'_, D> {
    fn drop(&mut self) {
        if self.restore {
            if let Err(e) = self.driver.set_station_active(false) {
                warn!("Failed to switch station interface back off: {}", e);
            }
        }
    }
}

/// Owner of the radio and its mode.
pub struct RadioController<D: RadioDriver> {
    driver: D,
    mode: RadioMode,
    timing: RadioTiming,
}

impl<D: RadioDriver> RadioController<D> {
    /// Take ownership of a driver. The mode starts as [`RadioMode::Off`].
    pub fn new(driver: D, timing: RadioTiming) -> Self {
        Self {
            driver,
            mode: RadioMode::Off,
            timing,
        }
    }

    /// Current mode.
    pub fn mode(&self) -> RadioMode {
        self.mode
    }

    /// Borrow the driver (status queries only).
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Force both interfaces down.
    pub fn shutdown(&mut self) -> Result<(), RadioError> {
        info!("Disabling WiFi interfaces");
        if self.driver.station_active() {
            self.stop_station()?;
        }
        if self.driver.ap_active() {
            self.driver.set_ap_active(false)?;
        }
        pause(self.timing.settle);
        self.mode = RadioMode::Off;
        Ok(())
    }

    fn stop_station(&mut self) -> Result<(), RadioError> {
        if let Err(e) = self.driver.station_disconnect() {
            debug!("Station disconnect before deactivation failed: {}", e);
        }
        self.driver.set_station_active(false)
    }

    /// Bring up the setup access point and return its address.
    ///
    /// Idempotent: an active station is torn down first and an existing
    /// access point is restarted with `config`. If the secured configuration
    /// cannot be applied, an open one with the same SSID is tried once.
    pub fn activate_access_point(
        &mut self,
        config: &AccessPointConfig,
    ) -> Result<Ipv4Addr, RadioError> {
        info!("Starting access point '{}'", config.ssid());

        if self.driver.station_active() {
            info!("Deactivating station interface before starting access point");
            self.stop_station()?;
            pause(self.timing.settle);
        }

        if self.driver.ap_active() {
            debug!("Stopping existing access point");
            self.driver.set_ap_active(false)?;
            pause(self.timing.ap_restart);
        }
        self.mode = RadioMode::Off;

        if let Err(e) = self.enable_ap(config) {
            warn!("Failed to start access point: {}", e);
            if config.is_open() {
                return Err(RadioError::ApStartFailed);
            }
            warn!("Falling back to an open access point");
            if let Err(e) = self.enable_ap(&config.to_open()) {
                error!("Open access point fallback failed: {}", e);
                return Err(RadioError::ApStartFailed);
            }
        }

        let mut polls = 0;
        while !self.driver.ap_active() && polls < self.timing.ap_poll_attempts {
            pause(self.timing.ap_poll_interval);
            polls += 1;
        }

        if !self.driver.ap_active() {
            error!(
                "Access point '{}' not active after {} polls",
                config.ssid(),
                polls
            );
            return Err(RadioError::ApStartFailed);
        }

        let ip = self.driver.ap_ip().ok_or(RadioError::ApStartFailed)?;
        self.mode = RadioMode::AccessPoint;
        info!("Access point '{}' active, IP: {}", config.ssid(), ip);
        Ok(ip)
    }

    fn enable_ap(&mut self, config: &AccessPointConfig) -> Result<(), RadioError> {
        self.driver.configure_ap(config)?;
        self.driver.set_ap_active(true)
    }

    /// Scan for networks.
    ///
    /// Returns SSIDs that decode as UTF-8, deduplicated and sorted. Failures
    /// are logged and yield an empty set.
    pub fn scan(&mut self) -> BTreeSet<String> {
        info!("Scanning for WiFi networks");
        let result = StationScope::enter(&mut self.driver, self.timing.settle)
            .and_then(|mut scope| scope.driver.scan());

        match result {
            Ok(records) => {
                let ssids = collect_ssids(records);
                info!("Scan complete, {} unique networks", ssids.len());
                ssids
            }
            Err(e) => {
                error!("WiFi scan failed: {}", e);
                BTreeSet::new()
            }
        }
    }

    /// Join a network as a station and return the assigned address.
    ///
    /// An active access point keeps serving during the join. Polls once per
    /// second of the attempt's deadline. On failure the station is left
    /// disassociated, and switched off again if the access point is up, so
    /// the mode is unchanged.
    pub fn connect_station(&mut self, attempt: &ConnectionAttempt) -> Result<Ipv4Addr, RadioError> {
        info!("Connecting to WiFi '{}'", attempt.ssid());

        if !self.driver.station_active() {
            self.driver.set_station_active(true)?;
            pause(self.timing.settle);
        }

        if self.driver.station_connected() {
            info!("Disconnecting from previous network");
            self.driver.station_disconnect()?;
            pause(self.timing.settle);
        }

        if let Err(e) = self
            .driver
            .station_connect(attempt.ssid(), attempt.passphrase())
        {
            self.abandon_station();
            return Err(e);
        }

        let polls = attempt.deadline().as_secs();
        let mut waited = 0;
        while !self.associated() && waited < polls {
            pause(self.timing.connect_poll_interval);
            waited += 1;
        }

        match self.associated_ip() {
            Some(ip) => {
                info!("Connected to '{}', IP: {}", attempt.ssid(), ip);
                self.mode = RadioMode::Station;
                Ok(ip)
            }
            None => {
                warn!(
                    "Could not join '{}' within {} seconds",
                    attempt.ssid(),
                    polls
                );
                self.abandon_station();
                Err(RadioError::ConnectTimeout {
                    ssid: attempt.ssid().to_string(),
                    secs: polls,
                })
            }
        }
    }

    fn associated(&self) -> bool {
        self.associated_ip().is_some()
    }

    fn associated_ip(&self) -> Option<Ipv4Addr> {
        if self.driver.station_connected() {
            self.driver.station_ip()
        } else {
            None
        }
    }

    fn abandon_station(&mut self) {
        if let Err(e) = self.driver.station_disconnect() {
            warn!("Failed to disconnect after unsuccessful join: {}", e);
        }
        if self.driver.ap_active() {
            if let Err(e) = self.driver.set_station_active(false) {
                warn!("Failed to switch station interface off: {}", e);
            }
            self.mode = RadioMode::AccessPoint;
        } else {
            self.mode = RadioMode::Station;
        }
    }

    /// Take the access point down once the station has taken over.
    ///
    /// Does nothing unless the radio is in [`RadioMode::Station`].
    pub fn retire_access_point(&mut self) -> Result<(), RadioError> {
        if self.mode != RadioMode::Station || !self.driver.ap_active() {
            return Ok(());
        }
        info!("Deactivating access point, station has taken over");
        self.driver.set_ap_active(false)?;
        pause(self.timing.settle);
        Ok(())
    }
}

fn collect_ssids(records: Vec<Vec<u8>>) -> BTreeSet<String> {
    records
        .into_iter()
        .filter_map(|raw| match String::from_utf8(raw) {
            Ok(ssid) if !ssid.is_empty() => Some(ssid),
            Ok(_) => None,
            Err(e) => {
                debug!("Skipping network with non-UTF-8 SSID: {:?}", e.as_bytes());
                None
            }
        })
        .collect()
}

/// Errors that can occur during radio operations.
#[derive(Debug)]
pub enum RadioError {
    /// The access point did not come up, even with the open fallback.
    ApStartFailed,
    /// The station did not associate before the deadline.
    ConnectTimeout { ssid: String, secs: u64 },
    /// The driver rejected a configuration value.
    InvalidConfig(&'static str),
    /// Driver-level failure (simulated or otherwise untyped).
    Driver(String),
    /// ESP-IDF error.
    #[cfg(feature = "esp32")]
    Esp(esp_idf_sys::EspError),
}

impl fmt::Display for RadioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApStartFailed => write!(f, "access point failed to start"),
            Self::ConnectTimeout { ssid, secs } => {
                write!(f, "timed out joining '{}' after {} s", ssid, secs)
            }
            Self::InvalidConfig(what) => write!(f, "invalid configuration: {}", what),
            Self::Driver(msg) => write!(f, "radio driver error: {}", msg),
            #[cfg(feature = "esp32")]
            Self::Esp(e) => write!(f, "ESP error: {:?}", e),
        }
    }
}

impl std::error::Error for RadioError {}

#[cfg(feature = "esp32")]
impl From<esp_idf_sys::EspError> for RadioError {
    fn from(e: esp_idf_sys::EspError) -> Self {
        Self::Esp(e)
    }
}
