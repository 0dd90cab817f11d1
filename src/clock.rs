//! Clock abstraction for testable time-dependent logic
//!
//! The calculator and state machine never read wall-clock time directly;
//! everything flows through a `Clock` so tests can pin the current moment
//! and the zone offsets.

use chrono::{DateTime, Local, Offset, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

/// Snapshot of the device's UTC offset, split into the base timezone
/// component and the daylight-savings component, both in milliseconds.
///
/// The sum of the two is the total offset applied to UTC to obtain local
/// wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ZoneOffsets {
    pub timezone_offset_ms: i64,
    pub daylight_savings_offset_ms: i64,
}

impl ZoneOffsets {
    pub fn new(timezone_offset_ms: i64, daylight_savings_offset_ms: i64) -> Self {
        Self {
            timezone_offset_ms,
            daylight_savings_offset_ms,
        }
    }

    /// Total offset from UTC in milliseconds.
    pub fn total_ms(&self) -> i64 {
        self.timezone_offset_ms + self.daylight_savings_offset_ms
    }
}

/// Supplies the current moment and the device zone offsets.
pub trait Clock: Send + Sync {
    /// Current UTC time.
    fn now_utc(&self) -> DateTime<Utc>;

    /// Current zone offsets.
    fn zone_offsets(&self) -> ZoneOffsets;
}

/// System clock using actual wall time and the local timezone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn zone_offsets(&self) -> ZoneOffsets {
        // chrono reports the total offset only; hosts that can split out the
        // DST component should supply their own Clock implementation.
        let total = Local::now().offset().fix().local_minus_utc() as i64 * 1000;
        ZoneOffsets::new(total, 0)
    }
}

/// Deterministic clock pinned at a configurable instant, for tests and
/// scenario verification.
#[derive(Debug, Default)]
pub struct FixedClock {
    now_ms: AtomicI64,
    timezone_offset_ms: AtomicI64,
    daylight_savings_offset_ms: AtomicI64,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>, offsets: ZoneOffsets) -> Self {
        Self {
            now_ms: AtomicI64::new(now.timestamp_millis()),
            timezone_offset_ms: AtomicI64::new(offsets.timezone_offset_ms),
            daylight_savings_offset_ms: AtomicI64::new(offsets.daylight_savings_offset_ms),
        }
    }

    /// Pin the clock at an RFC 3339 instant with the given offsets.
    pub fn at(rfc3339: &str, offsets: ZoneOffsets) -> Self {
        let now = DateTime::parse_from_rfc3339(rfc3339)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_default();
        Self::new(now, offsets)
    }

    pub fn set_now(&self, now: DateTime<Utc>) {
        self.now_ms.store(now.timestamp_millis(), Ordering::SeqCst);
    }

    pub fn advance_ms(&self, ms: i64) {
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set_offsets(&self, offsets: ZoneOffsets) {
        self.timezone_offset_ms
            .store(offsets.timezone_offset_ms, Ordering::SeqCst);
        self.daylight_savings_offset_ms
            .store(offsets.daylight_savings_offset_ms, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.now_ms.load(Ordering::SeqCst)).unwrap_or_default()
    }

    fn zone_offsets(&self) -> ZoneOffsets {
        ZoneOffsets::new(
            self.timezone_offset_ms.load(Ordering::SeqCst),
            self.daylight_savings_offset_ms.load(Ordering::SeqCst),
        )
    }
}
