//! Fixed-cardinality hour-of-day and day-of-week accumulators.
//!
//! Tables always carry every slot; hours or days without drinks hold zero.

use chrono::{Datelike, Days, NaiveDate, TimeZone, Timelike};
use serde::{Deserialize, Serialize};

use crate::{
    structs::intake_event::IntakeEvent,
    time_window::{local_date, DAYS_PER_WEEK},
};

pub const HOURS_PER_DAY: usize = 24;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct HourlyBucket {
    /// 0..=23
    pub hour: u32,
    pub total: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DailyBucket {
    pub date: NaiveDate,
    /// `D/M`, e.g. `5/3` for the fifth of March
    pub date_label: String,
    pub total: i64,
}

pub type HourlyTable = [HourlyBucket; HOURS_PER_DAY];
pub type WeeklyTable = [DailyBucket; DAYS_PER_WEEK as usize];

pub fn date_label(date: NaiveDate) -> String {
    format!("{}/{}", date.day(), date.month())
}

pub fn empty_hourly() -> HourlyTable {
    std::array::from_fn(|hour| HourlyBucket {
        hour: hour as u32,
        total: 0,
    })
}

pub fn empty_weekly(week_start: NaiveDate) -> WeeklyTable {
    std::array::from_fn(|offset| {
        let date = week_start + Days::new(offset as u64);
        DailyBucket {
            date,
            date_label: date_label(date),
            total: 0,
        }
    })
}

/// Sums event volumes per local hour of day.
pub fn hourly<Tz: TimeZone>(events: &[IntakeEvent], tz: &Tz) -> HourlyTable {
    let mut table = empty_hourly();

    for event in events {
        let Some(local) = tz.timestamp_millis_opt(event.timestamp).single() else {
            continue;
        };
        table[local.hour() as usize].total += i64::from(event.volume);
    }

    table
}

/// Sums event volumes per local calendar day of the week starting at
/// `week_start`. Events falling outside those seven days are ignored.
pub fn weekly<Tz: TimeZone>(events: &[IntakeEvent], week_start: NaiveDate, tz: &Tz) -> WeeklyTable {
    let mut table = empty_weekly(week_start);

    for event in events {
        let Some(date) = local_date(event.timestamp, tz) else {
            continue;
        };
        let offset = (date - week_start).num_days();
        if !(0..DAYS_PER_WEEK as i64).contains(&offset) {
            continue;
        }
        table[offset as usize].total += i64::from(event.volume);
    }

    table
}

pub fn sum(events: &[IntakeEvent]) -> i64 {
    events.iter().map(|e| i64::from(e.volume)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, FixedOffset};

    fn tz() -> FixedOffset {
        FixedOffset::east_opt(2 * 3600).unwrap()
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<FixedOffset> {
        tz().with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn event(id: u64, volume: i32, when: DateTime<FixedOffset>) -> IntakeEvent {
        IntakeEvent {
            id,
            volume,
            timestamp: when.timestamp_millis(),
            label: "Glass".to_string(),
        }
    }

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 11).unwrap()
    }

    #[test]
    fn empty_input_gives_zero_filled_tables() {
        let hours = hourly(&[], &tz());
        assert_eq!(hours.len(), 24);
        assert!(hours.iter().all(|b| b.total == 0));
        assert!(hours.iter().enumerate().all(|(i, b)| b.hour as usize == i));

        let days = weekly(&[], monday(), &tz());
        assert_eq!(days.len(), 7);
        assert!(days.iter().all(|b| b.total == 0));
    }

    #[test]
    fn weekly_table_matches_the_calendar_week() {
        let days = empty_weekly(monday());
        assert_eq!(days.len() as u64, DAYS_PER_WEEK);
        assert_eq!(days[days.len() - 1].date - days[0].date, chrono::Duration::days(6));
    }

    #[test]
    fn same_hour_events_accumulate() {
        let events = [
            event(1, 200, at(2024, 3, 12, 9, 5)),
            event(2, 300, at(2024, 3, 12, 9, 55)),
        ];
        let hours = hourly(&events, &tz());

        assert_eq!(hours[9].total, 500);
        assert_eq!(hours.iter().map(|b| b.total).sum::<i64>(), 500);
    }

    #[test]
    fn hourly_distribution_scenario() {
        let events = [
            event(1, 200, at(2024, 3, 12, 8, 0)),
            event(2, 150, at(2024, 3, 12, 8, 30)),
            event(3, 300, at(2024, 3, 12, 14, 10)),
        ];
        let hours = hourly(&events, &tz());

        for bucket in &hours {
            let expected = match bucket.hour {
                8 => 350,
                14 => 300,
                _ => 0,
            };
            assert_eq!(bucket.total, expected, "hour {}", bucket.hour);
        }
        assert_eq!(sum(&events), 650);
    }

    #[test]
    fn corrections_can_take_an_hour_negative() {
        let events = [
            event(1, 250, at(2024, 3, 12, 10, 0)),
            event(2, -400, at(2024, 3, 12, 10, 30)),
        ];
        assert_eq!(hourly(&events, &tz())[10].total, -150);
    }

    #[test]
    fn hour_is_taken_from_the_callers_zone() {
        // 23:30 UTC is 01:30 the next day at +02:00
        let when = chrono::Utc.with_ymd_and_hms(2024, 3, 12, 23, 30, 0).unwrap();
        let events = [IntakeEvent {
            id: 1,
            volume: 100,
            timestamp: when.timestamp_millis(),
            label: "Glass".to_string(),
        }];

        assert_eq!(hourly(&events, &tz())[1].total, 100);
        assert_eq!(hourly(&events, &chrono::Utc)[23].total, 100);
    }

    #[test]
    fn weekly_orders_days_from_week_start() {
        let days = weekly(&[], monday(), &tz());
        let labels: Vec<_> = days.iter().map(|d| d.date_label.as_str()).collect();
        assert_eq!(labels, ["11/3", "12/3", "13/3", "14/3", "15/3", "16/3", "17/3"]);
    }

    #[test]
    fn weekly_labels_cross_month_end() {
        let start = NaiveDate::from_ymd_opt(2024, 12, 30).unwrap();
        let labels: Vec<_> = weekly(&[], start, &tz())
            .iter()
            .map(|d| d.date_label.clone())
            .collect();
        assert_eq!(labels, ["30/12", "31/12", "1/1", "2/1", "3/1", "4/1", "5/1"]);
    }

    #[test]
    fn weekly_sums_per_day_and_drops_outsiders() {
        let events = [
            event(1, 500, at(2024, 3, 11, 0, 0)),
            event(2, 250, at(2024, 3, 13, 12, 0)),
            event(3, 250, at(2024, 3, 13, 18, 0)),
            event(4, 700, at(2024, 3, 17, 23, 59)),
            // previous Sunday and next Monday
            event(5, 900, at(2024, 3, 10, 23, 59)),
            event(6, 900, at(2024, 3, 18, 0, 0)),
            // same day-of-month a year earlier
            event(7, 900, at(2023, 3, 13, 12, 0)),
        ];
        let days = weekly(&events, monday(), &tz());
        let totals: Vec<_> = days.iter().map(|d| d.total).collect();

        assert_eq!(totals, [500, 0, 500, 0, 0, 0, 700]);
    }

    #[test]
    fn recompute_is_order_independent_and_idempotent() {
        let mut events = vec![
            event(1, 120, at(2024, 3, 12, 7, 0)),
            event(2, 330, at(2024, 3, 14, 21, 0)),
            event(3, -50, at(2024, 3, 12, 7, 45)),
            event(4, 600, at(2024, 3, 16, 13, 0)),
        ];

        let first_hours = hourly(&events, &tz());
        let first_days = weekly(&events, monday(), &tz());
        assert_eq!(hourly(&events, &tz()), first_hours);
        assert_eq!(weekly(&events, monday(), &tz()), first_days);

        events.reverse();
        assert_eq!(hourly(&events, &tz()), first_hours);
        assert_eq!(weekly(&events, monday(), &tz()), first_days);
    }
}
