//! WiFi radio control.
//!
//! # Components
//!
//! - [`radio`] - mode state machine and the [`RadioDriver`] seam (host-testable)
//! - [`simulated`] - in-memory driver for host runs and tests
//! - [`connection`] - ESP-IDF WiFi driver (ESP32 only)
//!
//! Credential types live in [`crate::config`].

mod radio;
mod simulated;

#[cfg(feature = "esp32")]
mod connection;

pub use radio::{RadioController, RadioDriver, RadioError, RadioMode, RadioTiming};
pub use simulated::{RadioEvent, SimulatedRadio, SIMULATED_AP_IP, SIMULATED_STATION_IP};

#[cfg(feature = "esp32")]
pub use connection::EspRadio;
