//! WiFi provisioning portal firmware library.
//!
//! The device raises its own access point, serves a setup page over a small
//! hand-rolled HTTP handler, joins the network the user picks and then pulls
//! wall-clock time from NTP into the RTC.
//!
//! Everything here except the ESP-IDF drivers (behind the `esp32` feature)
//! builds and tests on the host machine.

pub mod config;
pub mod http;
pub mod portal;
pub mod time;
pub mod wifi;

// Re-export commonly used items
pub use config::{AccessPointConfig, ConfigError, ConnectionAttempt, PortalConfig};
pub use http::{HttpRequest, HttpResponse, HttpServer, StatusCode};
pub use portal::ProvisioningController;
pub use time::{CalendarTime, MemoryRtc, RtcClock, RtcDateTime, SntpClient, TimeSource, TimeSync};
pub use wifi::{RadioController, RadioDriver, RadioError, RadioMode, RadioTiming, SimulatedRadio};
