//! Calendar arithmetic.
//!
//! Epoch → calendar uses Howard Hinnant's `civil_from_days` (O(1)).
//! Calendar → epoch counts whole years and months explicitly, the same way
//! the RTC epoch conversion does, so the two agree to the second.
//!
//! Weekdays are numbered from Monday = 0.

use serde::Serialize;
use std::fmt;

/// Seconds in one day.
pub const SECONDS_PER_DAY: i64 = 86_400;

/// Days per month in a non-leap year.
const DAYS_IN_MONTH: [u8; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// 1970-01-01 was a Thursday.
const EPOCH_WEEKDAY: i64 = 3;

/// Check if year is a leap year (Gregorian calendar).
///
/// - 2000: leap (divisible by 400)
/// - 1900: not leap (divisible by 100 but not 400)
/// - 2024: leap
/// - 2023: not leap
pub fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// Number of days in `month` (1-12) of `year`.
pub fn days_in_month(year: i32, month: u8) -> u8 {
    let base = DAYS_IN_MONTH[usize::from(month.clamp(1, 12) - 1)];
    if month == 2 && is_leap_year(year) {
        base + 1
    } else {
        base
    }
}

/// Days from 1970-01-01 to the given date, by explicit day counting.
///
/// Negative for dates before the epoch. `month` must be 1-12.
pub fn days_since_epoch(year: i32, month: u8, day: u8) -> i64 {
    let mut days: i64 = 0;

    if year >= 1970 {
        for y in 1970..year {
            days += if is_leap_year(y) { 366 } else { 365 };
        }
    } else {
        for y in year..1970 {
            days -= if is_leap_year(y) { 366 } else { 365 };
        }
    }

    for m in 1..month.clamp(1, 12) {
        days += i64::from(DAYS_IN_MONTH[usize::from(m - 1)]);
        if m == 2 && is_leap_year(year) {
            days += 1;
        }
    }

    days + i64::from(day) - 1
}

/// Seconds since 1970-01-01T00:00:00 of `time`, shifted by a fixed UTC
/// offset.
///
/// The date part is counted day by day from the epoch, so the epoch itself
/// at UTC+8 gives 28800.
pub fn local_timestamp(time: &CalendarTime, utc_offset_secs: i64) -> i64 {
    days_since_epoch(time.year, time.month, time.day) * SECONDS_PER_DAY
        + utc_offset_secs
        + i64::from(time.hour) * 3600
        + i64::from(time.minute) * 60
        + i64::from(time.second)
}

/// Weekday (Monday = 0) of a day count from the epoch.
pub fn weekday_from_days(days: i64) -> u8 {
    (days + EPOCH_WEEKDAY).rem_euclid(7) as u8
}

/// Broken-down calendar time with a full year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CalendarTime {
    pub year: i32,
    /// 1-12
    pub month: u8,
    /// 1-31
    pub day: u8,
    /// 0-23
    pub hour: u8,
    /// 0-59
    pub minute: u8,
    /// 0-59
    pub second: u8,
    /// 0-6, Monday = 0
    pub weekday: u8,
}

impl CalendarTime {
    /// Build a calendar time, deriving the weekday from the date.
    pub fn new(year: i32, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        let weekday = weekday_from_days(days_since_epoch(year, month.clamp(1, 12), day));
        Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
            weekday,
        }
    }

    /// Break an epoch timestamp down into calendar fields.
    pub fn from_epoch(timestamp: i64) -> Self {
        let days = timestamp.div_euclid(SECONDS_PER_DAY);
        let secs_today = timestamp.rem_euclid(SECONDS_PER_DAY);
        let (year, month, day) = civil_from_days(days);

        Self {
            year,
            month,
            day,
            hour: (secs_today / 3600) as u8,
            minute: ((secs_today % 3600) / 60) as u8,
            second: (secs_today % 60) as u8,
            weekday: weekday_from_days(days),
        }
    }

    /// Seconds since 1970-01-01T00:00:00, treating the fields as UTC.
    pub fn to_epoch(&self) -> i64 {
        days_since_epoch(self.year, self.month, self.day) * SECONDS_PER_DAY
            + i64::from(self.hour) * 3600
            + i64::from(self.minute) * 60
            + i64::from(self.second)
    }

    /// Check every field is in range for its month and year.
    pub fn is_valid(&self) -> bool {
        (1..=12).contains(&self.month)
            && self.day >= 1
            && self.day <= days_in_month(self.year, self.month)
            && self.hour < 24
            && self.minute < 60
            && self.second < 60
            && self.weekday < 7
    }
}

impl fmt::Display for CalendarTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

/// Convert days since the Unix epoch to (year, month, day).
///
/// Reference: http://howardhinnant.github.io/date_algorithms.html
fn civil_from_days(days: i64) -> (i32, u8, u8) {
    // Shift epoch to 0000-03-01 so the leap day ends the year
    let z = days + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = z - era * 146_097; // [0, 146096]
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365; // [0, 399]
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100); // [0, 365]
    let mp = (5 * doy + 2) / 153; // March = 0
    let day = (doy - (153 * mp + 2) / 5 + 1) as u8;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u8;
    let year = yoe + era * 400 + i64::from(month <= 2);

    (year as i32, month, day)
}
