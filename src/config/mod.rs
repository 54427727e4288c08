//! Portal configuration.
//!
//! # Components
//!
//! - [`PortalConfig`] - every tunable of the portal, with device defaults
//! - `wifi` - WiFi credential types (host-testable)
//!
//! On host builds the defaults can be overridden from the environment with
//! `PORTAL_AP_SSID`, `PORTAL_AP_PASSWORD` and `PORTAL_PORT`.

mod wifi;

use std::time::Duration;

// Re-export WiFi configuration types (platform-independent)
pub use wifi::{
    AccessPointConfig, ApAuth, ConfigError, ConnectionAttempt, MAX_PASSWORD_LEN, MAX_SSID_LEN,
    MIN_PASSWORD_LEN,
};

/// SSID broadcast by the setup access point.
pub const AP_SSID: &str = "ESP32_Setup";

/// Passphrase of the setup access point.
pub const AP_PASSWORD: &str = "12345678";

/// HTTP port the portal listens on.
pub const WEB_PORT: u16 = 80;

/// How long a station connect may take before it is abandoned.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// NTP servers, in the order they are tried.
pub const NTP_SERVERS: &[&str] = &["pool.ntp.org", "ntp.aliyun.com", "cn.pool.ntp.org"];

/// Per-server NTP request timeout.
pub const NTP_TIMEOUT: Duration = Duration::from_secs(5);

/// Fixed local offset from UTC (UTC+8, no DST).
pub const UTC_OFFSET_SECS: i64 = 8 * 3600;

/// Runtime configuration of the portal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalConfig {
    /// SSID of the setup access point.
    pub ap_ssid: String,
    /// Passphrase of the setup access point.
    pub ap_password: String,
    /// HTTP listen port.
    pub port: u16,
    /// Station connect timeout.
    pub connect_timeout: Duration,
    /// NTP servers, tried in order.
    pub ntp_servers: Vec<String>,
    /// Per-server NTP timeout.
    pub ntp_timeout: Duration,
    /// Offset added to UTC for every local time shown or computed.
    pub utc_offset_secs: i64,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            ap_ssid: AP_SSID.to_string(),
            ap_password: AP_PASSWORD.to_string(),
            port: WEB_PORT,
            connect_timeout: CONNECT_TIMEOUT,
            ntp_servers: NTP_SERVERS.iter().map(|s| s.to_string()).collect(),
            ntp_timeout: NTP_TIMEOUT,
            utc_offset_secs: UTC_OFFSET_SECS,
        }
    }
}

impl PortalConfig {
    /// Build the access point configuration.
    ///
    /// An empty password yields an open access point.
    pub fn access_point(&self) -> Result<AccessPointConfig, ConfigError> {
        if self.ap_password.is_empty() {
            AccessPointConfig::open(self.ap_ssid.as_str())
        } else {
            AccessPointConfig::secured(self.ap_ssid.as_str(), self.ap_password.as_str())
        }
    }

    /// Apply `PORTAL_*` overrides from the process environment.
    pub fn with_env(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ssid) = lookup("PORTAL_AP_SSID") {
            self.ap_ssid = ssid;
        }
        if let Some(password) = lookup("PORTAL_AP_PASSWORD") {
            self.ap_password = password;
        }
        if let Some(port) = lookup("PORTAL_PORT") {
            self.port = port.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "PORTAL_PORT".into(),
                value: port.clone(),
            })?;
        }

        // Fail early rather than at access point activation
        self.access_point()?;
        Ok(self)
    }
}
