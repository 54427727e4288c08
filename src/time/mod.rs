//! Wall-clock time: calendar math, the RTC, and SNTP sync.
//!
//! # Components
//!
//! - [`calendar`] - epoch/calendar conversion, leap years, weekdays
//! - [`rtc`] - RTC tuple, the [`RtcClock`] seam, local time with a fixed offset
//! - [`sntp`] - SNTP query over UDP
//! - [`sync`] - server fallback list feeding the RTC
//! - `system_rtc` - ESP-IDF system clock (ESP32 only)

pub mod calendar;
pub mod rtc;
pub mod sntp;
pub mod sync;

#[cfg(feature = "esp32")]
mod system_rtc;

pub use calendar::{
    days_in_month, days_since_epoch, is_leap_year, local_timestamp, CalendarTime, SECONDS_PER_DAY,
};
pub use rtc::{
    local_time, read_calendar, write_calendar, MemoryRtc, RtcClock, RtcDateTime, RtcError,
    RTC_EPOCH_YEAR, RTC_MAX_YEAR,
};
pub use sntp::{parse_response, SntpClient, SntpError, TimeSource, SNTP_PORT};
pub use sync::{SyncReport, TimeSync, TimeSyncError};

#[cfg(feature = "esp32")]
pub use system_rtc::SystemRtc;
