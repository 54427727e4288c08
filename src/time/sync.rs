//! Network time synchronization into the RTC.

use super::calendar::CalendarTime;
use super::rtc::{self, RtcClock, RtcError};
use super::sntp::{SntpError, TimeSource};
use log::{debug, info, warn};
use std::fmt;
use std::time::Duration;

/// Outcome of a successful sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Server that answered.
    pub server: String,
    /// UTC seconds written to the RTC.
    pub timestamp: i64,
}

/// Sets the RTC from the first server in a fallback list that answers.
pub struct TimeSync<C, S> {
    clock: C,
    source: S,
    servers: Vec<String>,
    timeout: Duration,
}

impl<C: RtcClock, S: TimeSource> TimeSync<C, S> {
    pub fn new(clock: C, source: S, servers: Vec<String>, timeout: Duration) -> Self {
        Self {
            clock,
            source,
            servers,
            timeout,
        }
    }

    /// The clock being synchronized.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Try each server in order until one sets the clock.
    ///
    /// Per-server failures are logged and the next server is tried. Returns
    /// `None` when every server failed; the RTC is left as it was.
    pub fn sync(&mut self) -> Option<SyncReport> {
        for server in &self.servers {
            info!("Syncing time from {}", server);
            match sync_from(&mut self.clock, &mut self.source, server, self.timeout) {
                Ok(timestamp) => {
                    info!("RTC set from {}", server);
                    return Some(SyncReport {
                        server: server.clone(),
                        timestamp,
                    });
                }
                Err(e) => warn!("Time sync via {} failed: {}", server, e),
            }
        }

        warn!(
            "{}",
            TimeSyncError::AllServersFailed {
                attempted: self.servers.len()
            }
        );
        None
    }

    /// Current local time from the RTC.
    pub fn local_time(&self, utc_offset_secs: i64) -> Result<CalendarTime, RtcError> {
        rtc::local_time(&self.clock, utc_offset_secs)
    }
}

fn sync_from<C: RtcClock, S: TimeSource>(
    clock: &mut C,
    source: &mut S,
    server: &str,
    timeout: Duration,
) -> Result<i64, TimeSyncError> {
    let timestamp = source.query(server, timeout)?;
    let utc = CalendarTime::from_epoch(timestamp);
    rtc::write_calendar(clock, &utc)?;

    match rtc::read_calendar(clock) {
        Ok(readback) => debug!(
            "RTC readback {} (drift {}s)",
            readback,
            readback.to_epoch() - timestamp
        ),
        Err(e) => debug!("RTC readback failed: {}", e),
    }

    Ok(timestamp)
}

/// Time synchronization errors.
#[derive(Debug)]
pub enum TimeSyncError {
    /// The time server query failed.
    Source(SntpError),
    /// The RTC rejected the time.
    Rtc(RtcError),
    /// No server produced a usable time.
    AllServersFailed { attempted: usize },
}

impl fmt::Display for TimeSyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source(e) => write!(f, "{}", e),
            Self::Rtc(e) => write!(f, "{}", e),
            Self::AllServersFailed { attempted } => {
                write!(f, "time sync failed on all {} servers", attempted)
            }
        }
    }
}

impl std::error::Error for TimeSyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Source(e) => Some(e),
            Self::Rtc(e) => Some(e),
            Self::AllServersFailed { .. } => None,
        }
    }
}

impl From<SntpError> for TimeSyncError {
    fn from(e: SntpError) -> Self {
        Self::Source(e)
    }
}

impl From<RtcError> for TimeSyncError {
    fn from(e: RtcError) -> Self {
        Self::Rtc(e)
    }
}
