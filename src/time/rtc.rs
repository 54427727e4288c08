//! Real-time clock access.
//!
//! The platform RTC stores an 8-field tuple whose year is counted from 2000
//! and must fit in a byte. [`RtcDateTime`] is that tuple; conversion from a
//! [`CalendarTime`] rejects out-of-range years before any clock is touched.

use super::calendar::{self, CalendarTime};
use std::fmt;
use std::time::Instant;

/// First year representable by the RTC.
pub const RTC_EPOCH_YEAR: i32 = 2000;

/// Last year representable by the RTC (offset 255).
pub const RTC_MAX_YEAR: i32 = RTC_EPOCH_YEAR + 255;

/// Platform RTC tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtcDateTime {
    /// Years since 2000.
    pub year: u8,
    pub month: u8,
    pub day: u8,
    /// Monday = 0
    pub weekday: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    /// Sub-second counter (microseconds on ESP32).
    pub subsecond: u32,
}

impl RtcDateTime {
    /// Translate a full calendar time into RTC fields.
    pub fn from_calendar(time: &CalendarTime) -> Result<Self, RtcError> {
        if !(RTC_EPOCH_YEAR..=RTC_MAX_YEAR).contains(&time.year) {
            return Err(RtcError::YearOutOfRange(time.year));
        }
        if !time.is_valid() {
            return Err(RtcError::InvalidDate(*time));
        }

        Ok(Self {
            year: (time.year - RTC_EPOCH_YEAR) as u8,
            month: time.month,
            day: time.day,
            weekday: time.weekday,
            hour: time.hour,
            minute: time.minute,
            second: time.second,
            subsecond: 0,
        })
    }

    /// Translate back to a full calendar time.
    pub fn to_calendar(&self) -> CalendarTime {
        CalendarTime {
            year: i32::from(self.year) + RTC_EPOCH_YEAR,
            month: self.month,
            day: self.day,
            hour: self.hour,
            minute: self.minute,
            second: self.second,
            weekday: self.weekday,
        }
    }

    /// Local timestamp: the RTC's UTC fields as epoch seconds plus a fixed
    /// offset.
    ///
    /// Works without a network time source; the only timezone knowledge is
    /// `utc_offset_secs`.
    pub fn local_timestamp(&self, utc_offset_secs: i64) -> i64 {
        calendar::local_timestamp(&self.to_calendar(), utc_offset_secs)
    }
}

/// Access to a real-time clock.
pub trait RtcClock {
    /// Read the current RTC tuple.
    fn datetime(&self) -> Result<RtcDateTime, RtcError>;

    /// Overwrite the RTC.
    fn set_datetime(&mut self, value: &RtcDateTime) -> Result<(), RtcError>;
}

/// Validate and write a UTC calendar time to the clock.
pub fn write_calendar<C: RtcClock + ?Sized>(
    clock: &mut C,
    time: &CalendarTime,
) -> Result<(), RtcError> {
    let value = RtcDateTime::from_calendar(time)?;
    clock.set_datetime(&value)
}

/// Read the clock as a UTC calendar time.
pub fn read_calendar<C: RtcClock + ?Sized>(clock: &C) -> Result<CalendarTime, RtcError> {
    Ok(clock.datetime()?.to_calendar())
}

/// Read the clock as local calendar time (UTC plus a fixed offset).
pub fn local_time<C: RtcClock + ?Sized>(
    clock: &C,
    utc_offset_secs: i64,
) -> Result<CalendarTime, RtcError> {
    let local = clock.datetime()?.local_timestamp(utc_offset_secs);
    Ok(CalendarTime::from_epoch(local))
}

/// RTC kept in memory, advancing with the monotonic clock.
///
/// Stands in for the hardware clock on host builds. Starts at
/// 2000-01-01T00:00:00, like a freshly reset RTC.
#[derive(Debug)]
pub struct MemoryRtc {
    base: i64,
    set_at: Instant,
    frozen: bool,
    writes: usize,
}

impl Default for MemoryRtc {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRtc {
    /// A running clock at the RTC epoch.
    pub fn new() -> Self {
        Self {
            base: CalendarTime::new(RTC_EPOCH_YEAR, 1, 1, 0, 0, 0).to_epoch(),
            set_at: Instant::now(),
            frozen: false,
            writes: 0,
        }
    }

    /// A clock that stays at `timestamp` until written.
    pub fn frozen_at(timestamp: i64) -> Self {
        Self {
            base: timestamp,
            set_at: Instant::now(),
            frozen: true,
            writes: 0,
        }
    }

    /// Number of successful writes.
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Current time as epoch seconds.
    pub fn timestamp(&self) -> i64 {
        if self.frozen {
            self.base
        } else {
            self.base + self.set_at.elapsed().as_secs() as i64
        }
    }
}

impl RtcClock for MemoryRtc {
    fn datetime(&self) -> Result<RtcDateTime, RtcError> {
        RtcDateTime::from_calendar(&CalendarTime::from_epoch(self.timestamp()))
    }

    fn set_datetime(&mut self, value: &RtcDateTime) -> Result<(), RtcError> {
        let time = value.to_calendar();
        if !time.is_valid() {
            return Err(RtcError::InvalidDate(time));
        }
        self.base = time.to_epoch();
        self.set_at = Instant::now();
        self.writes += 1;
        Ok(())
    }
}

/// Errors that can occur while accessing the RTC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RtcError {
    /// Year outside [2000, 2255].
    YearOutOfRange(i32),
    /// A field is out of range for the date.
    InvalidDate(CalendarTime),
    /// The clock rejected the operation.
    Hardware(String),
}

impl fmt::Display for RtcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::YearOutOfRange(year) => write!(
                f,
                "year {} outside RTC range {}-{}",
                year, RTC_EPOCH_YEAR, RTC_MAX_YEAR
            ),
            Self::InvalidDate(time) => write!(f, "invalid date {:?}", time),
            Self::Hardware(msg) => write!(f, "RTC hardware error: {}", msg),
        }
    }
}

impl std::error::Error for RtcError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UTC_OFFSET_SECS;
    use crate::time::calendar::days_in_month;

    #[test]
    fn test_rtc_round_trip_all_years() {
        for year in RTC_EPOCH_YEAR..=RTC_MAX_YEAR {
            let month = (year % 12) as u8 + 1;
            let day = days_in_month(year, month);
            let time = CalendarTime::new(year, month, day, 23, 59, 58);

            let rtc = RtcDateTime::from_calendar(&time).unwrap();
            assert_eq!(i32::from(rtc.year), year - 2000);
            assert_eq!(rtc.to_calendar(), time);
        }
    }

    #[test]
    fn test_years_outside_range_rejected() {
        for year in [1970, 1999, 2256, 3000] {
            let time = CalendarTime::new(year, 6, 1, 0, 0, 0);
            assert_eq!(
                RtcDateTime::from_calendar(&time),
                Err(RtcError::YearOutOfRange(year))
            );
        }
    }

    #[test]
    fn test_write_rejects_before_touching_clock() {
        let mut clock = MemoryRtc::frozen_at(1_700_000_000);
        for year in [1999, 2256] {
            let time = CalendarTime::new(year, 1, 1, 0, 0, 0);
            assert!(write_calendar(&mut clock, &time).is_err());
        }
        assert_eq!(clock.writes(), 0);
        assert_eq!(clock.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_write_then_read() {
        let mut clock = MemoryRtc::frozen_at(0);
        let time = CalendarTime::from_epoch(1_718_000_000);
        write_calendar(&mut clock, &time).unwrap();

        assert_eq!(clock.writes(), 1);
        assert_eq!(read_calendar(&clock).unwrap(), time);
    }

    #[test]
    fn test_local_timestamp_at_rtc_epoch() {
        let rtc = RtcDateTime {
            year: 0,
            month: 1,
            day: 1,
            weekday: 5,
            hour: 0,
            minute: 0,
            second: 0,
            subsecond: 0,
        };
        assert_eq!(rtc.local_timestamp(0), 946_684_800);
        assert_eq!(rtc.local_timestamp(UTC_OFFSET_SECS), 946_684_800 + 28_800);
    }

    #[test]
    fn test_local_timestamp_matches_epoch_conversion() {
        for timestamp in [946_684_800, 1_709_164_800, 1_718_035_199, 4_102_444_799] {
            let rtc = RtcDateTime::from_calendar(&CalendarTime::from_epoch(timestamp)).unwrap();
            assert_eq!(rtc.local_timestamp(0), timestamp);
            assert_eq!(rtc.local_timestamp(UTC_OFFSET_SECS), timestamp + 28_800);
        }
    }

    #[test]
    fn test_local_time_rolls_over_day() {
        // 2024-03-31 20:30:00 UTC is 2024-04-01 04:30:00 at UTC+8
        let utc = CalendarTime::new(2024, 3, 31, 20, 30, 0);
        let clock = MemoryRtc::frozen_at(utc.to_epoch());

        let local = local_time(&clock, UTC_OFFSET_SECS).unwrap();
        assert_eq!(local, CalendarTime::new(2024, 4, 1, 4, 30, 0));
    }

    #[test]
    fn test_memory_rtc_starts_at_rtc_epoch() {
        let clock = MemoryRtc::new();
        let time = read_calendar(&clock).unwrap();
        assert_eq!(time.year, 2000);
        assert_eq!(time.month, 1);
    }

    #[test]
    fn test_set_datetime_rejects_invalid_fields() {
        let mut clock = MemoryRtc::new();
        let bad = RtcDateTime {
            year: 23,
            month: 2,
            day: 30,
            weekday: 0,
            hour: 0,
            minute: 0,
            second: 0,
            subsecond: 0,
        };
        assert!(matches!(clock.set_datetime(&bad), Err(RtcError::InvalidDate(_))));
        assert_eq!(clock.writes(), 0);
    }
}
