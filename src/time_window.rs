//! Day and week boundary arithmetic in the caller's local calendar.
//!
//! Weeks always start on Monday. Bounds are expressed in epoch milliseconds with
//! an inclusive `end` (the last millisecond of the day or week); range queries
//! against the store use [`DayBounds::end_exclusive`] so that every query is
//! half-open `[start, next_start)`.

use chrono::{DateTime, Datelike, Days, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use serde::{Deserialize, Serialize};

pub const DAY_MILLIS: i64 = 86_400_000;
pub const DAYS_PER_WEEK: u64 = 7;

/// `[start, end]` of one local calendar day, `end` being its last millisecond.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DayBounds {
    pub start: i64,
    pub end: i64,
}

/// Monday 00:00:00.000 through Sunday 23:59:59.999 of one local calendar week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WeekBounds {
    pub start: i64,
    pub end: i64,
}

impl DayBounds {
    pub fn contains(&self, timestamp: i64) -> bool {
        self.start <= timestamp && timestamp <= self.end
    }

    /// First millisecond of the following day.
    pub fn end_exclusive(&self) -> i64 {
        self.end + 1
    }
}

impl WeekBounds {
    pub fn contains(&self, timestamp: i64) -> bool {
        self.start <= timestamp && timestamp <= self.end
    }

    /// First millisecond of the following week.
    pub fn end_exclusive(&self) -> i64 {
        self.end + 1
    }
}

/// Maps a local wall-clock time to an instant, picking the earlier reading of an
/// ambiguous time and the first valid instant after a skipped one.
pub(crate) fn resolve_local<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(t) => t,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => {
            let mut probe = naive;
            for _ in 0..12 {
                probe += chrono::Duration::minutes(15);
                if let Some(t) = tz.from_local_datetime(&probe).earliest() {
                    return t;
                }
            }
            tz.from_utc_datetime(&naive)
        }
    }
}

/// Start of `date` in `tz`.
pub fn local_midnight<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> DateTime<Tz> {
    resolve_local(tz, date.and_time(NaiveTime::MIN))
}

/// Local calendar date an epoch-millisecond timestamp falls on.
pub fn local_date<Tz: TimeZone>(timestamp: i64, tz: &Tz) -> Option<NaiveDate> {
    tz.timestamp_millis_opt(timestamp)
        .single()
        .map(|t| t.date_naive())
}

pub fn day_bounds_for_date<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> DayBounds {
    let start = local_midnight(date, tz).timestamp_millis();
    let next = local_midnight(date + Days::new(1), tz).timestamp_millis();

    DayBounds {
        start,
        end: next - 1,
    }
}

/// Bounds of the calendar day containing `instant`, in the instant's own zone.
pub fn day_bounds<Tz: TimeZone>(instant: &DateTime<Tz>) -> DayBounds {
    day_bounds_for_date(instant.date_naive(), &instant.timezone())
}

/// Monday of the week containing `date`. Sunday belongs to the week that
/// started six days earlier.
pub fn week_start_date(date: NaiveDate) -> NaiveDate {
    date - Days::new(u64::from(date.weekday().num_days_from_monday()))
}

pub fn start_of_week<Tz: TimeZone>(instant: &DateTime<Tz>) -> DateTime<Tz> {
    local_midnight(week_start_date(instant.date_naive()), &instant.timezone())
}

pub fn week_bounds_for_date<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> WeekBounds {
    let monday = week_start_date(date);
    let start = local_midnight(monday, tz).timestamp_millis();
    let next = local_midnight(monday + Days::new(DAYS_PER_WEEK), tz).timestamp_millis();

    WeekBounds {
        start,
        end: next - 1,
    }
}

pub fn week_bounds<Tz: TimeZone>(instant: &DateTime<Tz>) -> WeekBounds {
    week_bounds_for_date(instant.date_naive(), &instant.timezone())
}
