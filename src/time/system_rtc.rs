//! ESP-IDF system clock as the RTC.
//!
//! ESP-IDF keeps wall time in the RTC timer; `settimeofday` writes it and
//! `SystemTime` reads it back.

use super::calendar::CalendarTime;
use super::rtc::{RtcClock, RtcDateTime, RtcError};
use log::debug;
use std::time::{SystemTime, UNIX_EPOCH};

/// RTC backed by the ESP-IDF system clock.
#[derive(Debug, Default)]
pub struct SystemRtc;

impl SystemRtc {
    pub fn new() -> Self {
        Self
    }
}

impl RtcClock for SystemRtc {
    fn datetime(&self) -> Result<RtcDateTime, RtcError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| RtcError::Hardware(e.to_string()))?;

        let mut value = RtcDateTime::from_calendar(&CalendarTime::from_epoch(now.as_secs() as i64))?;
        value.subsecond = now.subsec_micros();
        Ok(value)
    }

    fn set_datetime(&mut self, value: &RtcDateTime) -> Result<(), RtcError> {
        let time = value.to_calendar();
        if !time.is_valid() {
            return Err(RtcError::InvalidDate(time));
        }

        let tv = esp_idf_sys::timeval {
            tv_sec: time.to_epoch() as _,
            tv_usec: value.subsecond as _,
        };
        // SAFETY: `tv` outlives the call and a null timezone is accepted
        let ret = unsafe { esp_idf_sys::settimeofday(&tv, core::ptr::null()) };
        if ret != 0 {
            return Err(RtcError::Hardware(format!("settimeofday returned {}", ret)));
        }

        debug!("System clock set to {}", time);
        Ok(())
    }
}
