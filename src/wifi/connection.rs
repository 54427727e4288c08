//! ESP-IDF WiFi driver.
//!
//! ESP-IDF models the radio as one driver with a single configuration
//! (client, access point, or both). This wrapper keeps a per-interface
//! enabled flag and re-applies the matching configuration whenever a flag or
//! a setting changes, which gives the controller independent interface
//! switches. A change the driver rejects is rolled back, so the flags always
//! describe the last configuration that was applied.
//!
//! Scan records come back from esp-idf-svc with the SSID already converted to
//! a string, so [`RadioDriver::scan`] here never yields undecodable bytes;
//! the controller's UTF-8 filtering only has work to do on other drivers.

use super::radio::{RadioDriver, RadioError};
use crate::config::{AccessPointConfig, ApAuth};
use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::wifi::{
    AccessPointConfiguration, AuthMethod, ClientConfiguration, Configuration, EspWifi,
};
use log::{debug, info};
use std::net::Ipv4Addr;

/// Channel used by the setup access point.
const AP_CHANNEL: u8 = 1;

/// Maximum clients on the setup access point.
const AP_MAX_CONNECTIONS: u16 = 4;

/// ESP-IDF backed radio driver.
pub struct EspRadio<'a> {
    /// ESP-IDF WiFi driver.
    wifi: EspWifi<'a>,
    station_enabled: bool,
    ap_enabled: bool,
    client: ClientConfiguration,
    access_point: AccessPointConfiguration,
}

impl<'a> EspRadio<'a> {
    /// Create the driver. Both interfaces start disabled.
    pub fn new(modem: Modem, sysloop: EspSystemEventLoop) -> Result<Self, RadioError> {
        let wifi = EspWifi::new(modem, sysloop, None)?;

        Ok(Self {
            wifi,
            station_enabled: false,
            ap_enabled: false,
            client: ClientConfiguration::default(),
            access_point: AccessPointConfiguration::default(),
        })
    }

    fn apply(&mut self) -> Result<(), RadioError> {
        let configuration = match (self.station_enabled, self.ap_enabled) {
            (false, false) => {
                if self.wifi.is_started()? {
                    debug!("Stopping WiFi driver");
                    self.wifi.stop()?;
                }
                return Ok(());
            }
            (true, false) => Configuration::Client(self.client.clone()),
            (false, true) => Configuration::AccessPoint(self.access_point.clone()),
            (true, true) => Configuration::Mixed(self.client.clone(), self.access_point.clone()),
        };

        self.wifi.set_configuration(&configuration)?;
        if !self.wifi.is_started()? {
            debug!("Starting WiFi driver");
            self.wifi.start()?;
        }
        Ok(())
    }
}

impl RadioDriver for EspRadio<'_> {
    fn station_active(&self) -> bool {
        self.station_enabled
    }

    fn set_station_active(&mut self, active: bool) -> Result<(), RadioError> {
        if self.station_enabled == active {
            return Ok(());
        }
        let previous_client = self.client.clone();
        self.station_enabled = active;
        if !active {
            self.client = ClientConfiguration::default();
        }
        if let Err(e) = self.apply() {
            self.station_enabled = !active;
            self.client = previous_client;
            return Err(e);
        }
        Ok(())
    }

    fn station_connected(&self) -> bool {
        self.wifi.is_connected().unwrap_or(false) && self.wifi.sta_netif().is_up().unwrap_or(false)
    }

    fn station_connect(&mut self, ssid: &str, passphrase: &str) -> Result<(), RadioError> {
        // Determine auth method
        let auth_method = if passphrase.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };

        let client = ClientConfiguration {
            ssid: ssid
                .try_into()
                .map_err(|_| RadioError::InvalidConfig("SSID too long"))?,
            password: passphrase
                .try_into()
                .map_err(|_| RadioError::InvalidConfig("passphrase too long"))?,
            auth_method,
            ..Default::default()
        };
        let previous_client = std::mem::replace(&mut self.client, client);
        if let Err(e) = self.apply() {
            self.client = previous_client;
            return Err(e);
        }

        // Non-blocking: association is polled by the controller
        self.wifi.connect()?;
        Ok(())
    }

    fn station_disconnect(&mut self) -> Result<(), RadioError> {
        if self.wifi.is_connected()? {
            info!("Disconnecting from WiFi");
            self.wifi.disconnect()?;
        }
        Ok(())
    }

    fn station_ip(&self) -> Option<Ipv4Addr> {
        self.wifi
            .sta_netif()
            .get_ip_info()
            .ok()
            .map(|info| info.ip)
            .filter(|ip| !ip.is_unspecified())
    }

    fn scan(&mut self) -> Result<Vec<Vec<u8>>, RadioError> {
        let records = self.wifi.scan()?;
        Ok(records
            .into_iter()
            .map(|ap| ap.ssid.as_bytes().to_vec())
            .collect())
    }

    fn ap_active(&self) -> bool {
        self.ap_enabled
            && self.wifi.is_started().unwrap_or(false)
            && self.wifi.ap_netif().is_up().unwrap_or(false)
    }

    fn configure_ap(&mut self, config: &AccessPointConfig) -> Result<(), RadioError> {
        let auth_method = match config.auth() {
            ApAuth::Open => AuthMethod::None,
            ApAuth::WpaWpa2Psk => AuthMethod::WPAWPA2Personal,
        };

        let access_point = AccessPointConfiguration {
            ssid: config
                .ssid()
                .try_into()
                .map_err(|_| RadioError::InvalidConfig("SSID too long"))?,
            password: config
                .password()
                .try_into()
                .map_err(|_| RadioError::InvalidConfig("password too long"))?,
            auth_method,
            channel: AP_CHANNEL,
            max_connections: AP_MAX_CONNECTIONS,
            ..Default::default()
        };

        let previous = std::mem::replace(&mut self.access_point, access_point);
        if self.ap_enabled {
            if let Err(e) = self.apply() {
                self.access_point = previous;
                return Err(e);
            }
        }
        Ok(())
    }

    fn set_ap_active(&mut self, active: bool) -> Result<(), RadioError> {
        if self.ap_enabled == active {
            return Ok(());
        }
        self.ap_enabled = active;
        if let Err(e) = self.apply() {
            self.ap_enabled = !active;
            return Err(e);
        }
        Ok(())
    }

    fn ap_ip(&self) -> Option<Ipv4Addr> {
        self.wifi.ap_netif().get_ip_info().ok().map(|info| info.ip)
    }
}
