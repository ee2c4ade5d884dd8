//! Time source port and ISO-8601 helpers.
//!
//! # Invariants
//! - Document timestamps are UTC with millisecond precision:
//!   `YYYY-MM-DDTHH:MM:SS.mmmZ`.
//! - Backup stamps are the same text with `:` and `.` replaced by `-`, so they
//!   are valid inside storage keys and sort chronologically.

use std::cell::Cell;
use std::rc::Rc;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{Duration, OffsetDateTime, PrimitiveDateTime, UtcOffset};

const ISO_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z");
const BACKUP_STAMP_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]-[minute]-[second]-[subsecond digits:3]Z");

pub trait Clock {
    fn now(&self) -> OffsetDateTime;
}

impl<T: Clock + ?Sized> Clock for &T {
    fn now(&self) -> OffsetDateTime {
        (**self).now()
    }
}

impl<T: Clock + ?Sized> Clock for Rc<T> {
    fn now(&self) -> OffsetDateTime {
        (**self).now()
    }
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Deterministic clock for tests and replays.
///
/// Every `now()` call returns the current instant, then advances it by `step`.
#[derive(Debug)]
pub struct ManualClock {
    current: Cell<OffsetDateTime>,
    step: Duration,
}

impl ManualClock {
    /// A clock frozen at `start`.
    pub fn fixed(start: OffsetDateTime) -> Self {
        Self::ticking(start, Duration::ZERO)
    }

    /// A clock that moves forward by `step` on every read.
    pub fn ticking(start: OffsetDateTime, step: Duration) -> Self {
        Self {
            current: Cell::new(start),
            step,
        }
    }

    pub fn advance(&self, by: Duration) {
        self.current.set(self.current.get() + by);
    }

    pub fn set(&self, instant: OffsetDateTime) {
        self.current.set(instant);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        let now = self.current.get();
        self.current.set(now + self.step);
        now
    }
}

/// Formats an instant as a document timestamp.
pub fn format_iso(instant: OffsetDateTime) -> String {
    instant
        .to_offset(UtcOffset::UTC)
        .format(ISO_FORMAT)
        .unwrap_or_else(|_| instant.unix_timestamp().to_string())
}

/// Parses a document timestamp. Accepts only the canonical format.
pub fn parse_iso(value: &str) -> Option<OffsetDateTime> {
    PrimitiveDateTime::parse(value, ISO_FORMAT)
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}

/// Formats an instant as a backup key suffix.
pub fn format_backup_stamp(instant: OffsetDateTime) -> String {
    format_iso(instant).replace([':', '.'], "-")
}

/// Parses a backup key suffix back into an instant.
pub fn parse_backup_stamp(value: &str) -> Option<OffsetDateTime> {
    PrimitiveDateTime::parse(value, BACKUP_STAMP_FORMAT)
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}

/// Milliseconds since the Unix epoch, as carried by same-context notices.
pub fn epoch_millis(instant: OffsetDateTime) -> i64 {
    i64::try_from(instant.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
}
