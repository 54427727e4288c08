//! WiFi credential types.
//!
//! Platform-independent, so validation is tested on the host machine.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use wifi_portal_esp32::config::{AccessPointConfig, ConnectionAttempt};
//!
//! let attempt = ConnectionAttempt::new("MyNetwork", "MyPassword", Duration::from_secs(30)).unwrap();
//! assert_eq!(attempt.ssid(), "MyNetwork");
//!
//! let ap = AccessPointConfig::secured("ESP32_Setup", "12345678").unwrap();
//! assert!(!ap.is_open());
//! assert!(ap.to_open().is_open());
//! ```

use std::fmt;
use std::time::Duration;
use zeroize::Zeroize;

/// Maximum SSID length per IEEE 802.11 standard.
pub const MAX_SSID_LEN: usize = 32;

/// Maximum WPA2 passphrase length.
pub const MAX_PASSWORD_LEN: usize = 63;

/// Minimum WPA2 passphrase length.
pub const MIN_PASSWORD_LEN: usize = 8;

fn validate_ssid(ssid: &str) -> Result<(), ConfigError> {
    if ssid.is_empty() {
        return Err(ConfigError::SsidEmpty);
    }
    if ssid.len() > MAX_SSID_LEN {
        return Err(ConfigError::SsidTooLong {
            len: ssid.len(),
            max: MAX_SSID_LEN,
        });
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), ConfigError> {
    // Empty is OK for open networks
    if !password.is_empty() && password.len() < MIN_PASSWORD_LEN {
        return Err(ConfigError::PasswordTooShort {
            len: password.len(),
            min: MIN_PASSWORD_LEN,
        });
    }
    if password.len() > MAX_PASSWORD_LEN {
        return Err(ConfigError::PasswordTooLong {
            len: password.len(),
            max: MAX_PASSWORD_LEN,
        });
    }
    Ok(())
}

/// A single request to join a network as a station.
///
/// Created per configure request and dropped once the outcome is known.
/// The passphrase is zeroed on drop.
pub struct ConnectionAttempt {
    ssid: String,
    passphrase: String,
    deadline: Duration,
}

impl ConnectionAttempt {
    /// Create a validated connection attempt.
    pub fn new(
        ssid: impl Into<String>,
        passphrase: impl Into<String>,
        deadline: Duration,
    ) -> Result<Self, ConfigError> {
        let attempt = Self {
            ssid: ssid.into(),
            passphrase: passphrase.into(),
            deadline,
        };
        validate_ssid(&attempt.ssid)?;
        validate_password(&attempt.passphrase)?;
        Ok(attempt)
    }

    /// Network SSID.
    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    /// Network passphrase (empty for open networks).
    pub fn passphrase(&self) -> &str {
        &self.passphrase
    }

    /// How long to wait for association.
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Check if this targets an open network (no passphrase).
    pub fn is_open(&self) -> bool {
        self.passphrase.is_empty()
    }
}

impl fmt::Debug for ConnectionAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionAttempt")
            .field("ssid", &self.ssid)
            .field("passphrase", &"<redacted>")
            .field("deadline", &self.deadline)
            .finish()
    }
}

impl Drop for ConnectionAttempt {
    fn drop(&mut self) {
        self.passphrase.zeroize();
    }
}

/// Authentication mode of the local access point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApAuth {
    /// No authentication.
    Open,
    /// WPA/WPA2 mixed mode with a pre-shared key.
    WpaWpa2Psk,
}

/// Configuration of the access point the portal is served from.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessPointConfig {
    ssid: String,
    password: String,
    auth: ApAuth,
}

impl AccessPointConfig {
    /// A WPA/WPA2 secured access point.
    pub fn secured(ssid: impl Into<String>, password: impl Into<String>) -> Result<Self, ConfigError> {
        let ssid = ssid.into();
        let password = password.into();
        validate_ssid(&ssid)?;
        if password.is_empty() {
            return Err(ConfigError::PasswordTooShort {
                len: 0,
                min: MIN_PASSWORD_LEN,
            });
        }
        validate_password(&password)?;
        Ok(Self {
            ssid,
            password,
            auth: ApAuth::WpaWpa2Psk,
        })
    }

    /// An open (unsecured) access point.
    pub fn open(ssid: impl Into<String>) -> Result<Self, ConfigError> {
        let ssid = ssid.into();
        validate_ssid(&ssid)?;
        Ok(Self {
            ssid,
            password: String::new(),
            auth: ApAuth::Open,
        })
    }

    /// Same SSID without security, used as the activation fallback.
    pub fn to_open(&self) -> Self {
        Self {
            ssid: self.ssid.clone(),
            password: String::new(),
            auth: ApAuth::Open,
        }
    }

    /// Access point SSID.
    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    /// Access point password (empty when open).
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Authentication mode.
    pub fn auth(&self) -> ApAuth {
        self.auth
    }

    /// Check if the access point is open.
    pub fn is_open(&self) -> bool {
        self.auth == ApAuth::Open
    }
}

impl fmt::Debug for AccessPointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessPointConfig")
            .field("ssid", &self.ssid)
            .field("auth", &self.auth)
            .finish_non_exhaustive()
    }
}

impl Drop for AccessPointConfig {
    fn drop(&mut self) {
        self.password.zeroize();
    }
}

/// Errors that can occur during configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// SSID is empty.
    SsidEmpty,
    /// SSID exceeds maximum length.
    SsidTooLong { len: usize, max: usize },
    /// Password is too short for WPA2.
    PasswordTooShort { len: usize, min: usize },
    /// Password exceeds maximum length.
    PasswordTooLong { len: usize, max: usize },
    /// An override value could not be parsed.
    InvalidValue { key: String, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SsidEmpty => write!(f, "SSID cannot be empty"),
            Self::SsidTooLong { len, max } => {
                write!(f, "SSID too long: {} bytes (max {})", len, max)
            }
            Self::PasswordTooShort { len, min } => {
                write!(f, "password too short: {} bytes (min {})", len, min)
            }
            Self::PasswordTooLong { len, max } => {
                write!(f, "password too long: {} bytes (max {})", len, max)
            }
            Self::InvalidValue { key, value } => write!(f, "invalid value for {}: {:?}", key, value),
        }
    }
}

impl std::error::Error for ConfigError {}
