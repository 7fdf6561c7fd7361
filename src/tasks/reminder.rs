use std::sync::Arc;

use chrono::{DateTime, Days, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    error::{Error, Result},
    time_window::{resolve_local, DAY_MILLIS},
};

/// Alarm slots are keyed by hour of day, so there are exactly this many.
pub const SLOT_COUNT: u8 = 24;

pub type ReminderCallback = Arc<dyn Fn() + Send + Sync>;

/// Whatever actually wakes the user up at a wall-clock time.
pub trait Alarm: Send + Sync {
    /// Fire `callback` at `first_trigger` (epoch ms) and every
    /// `repeat_interval_ms` after that, replacing anything already in `slot`.
    fn arm(&self, slot: u8, first_trigger: i64, repeat_interval_ms: i64, callback: ReminderCallback);

    fn cancel(&self, slot: u8);
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderConfig {
    pub start_hour: u32,
    pub end_hour: u32,
    pub interval_hours: u32,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            start_hour: 9,
            end_hour: 21,
            interval_hours: 1,
        }
    }
}

impl ReminderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.start_hour >= u32::from(SLOT_COUNT) || self.end_hour >= u32::from(SLOT_COUNT) {
            return Err(Error::invalid(format!(
                "reminder hours must be within 0..=23, got {}..={}",
                self.start_hour, self.end_hour
            )));
        }
        if self.interval_hours == 0 {
            return Err(Error::invalid("reminder interval must be at least one hour"));
        }
        Ok(())
    }

    /// Hours in `[start_hour, end_hour]` stepping by `interval_hours`. Empty
    /// when the start comes after the end.
    pub fn trigger_hours(&self) -> Vec<u32> {
        (self.start_hour..=self.end_hour)
            .step_by(self.interval_hours.max(1) as usize)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trigger {
    pub hour: u32,
    /// Epoch milliseconds of the first firing
    pub first_fire: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ReminderState {
    #[default]
    Disarmed,
    Armed {
        config: ReminderConfig,
        triggers: Vec<Trigger>,
    },
}

/// Today's `hour:00:00` in `now`'s zone, or tomorrow's if that has already passed.
pub fn first_trigger<Tz: TimeZone>(now: &DateTime<Tz>, hour: u32) -> Result<DateTime<Tz>> {
    let time = NaiveTime::from_hms_opt(hour, 0, 0)
        .ok_or_else(|| Error::invalid(format!("no such hour: {hour}")))?;
    let tz = now.timezone();

    let today = resolve_local(&tz, now.date_naive().and_time(time));
    if today > *now {
        return Ok(today);
    }

    let tomorrow = now.date_naive() + Days::new(1);
    Ok(resolve_local(&tz, tomorrow.and_time(time)))
}

/// Turns a reminder config into daily repeating alarms. Every change is a full
/// cancel of all slots followed by re-arming, never a diff.
pub struct ReminderScheduler<A: Alarm, Tz: TimeZone> {
    alarm: A,
    tz: Tz,
    callback: ReminderCallback,
    state: ReminderState,
}

impl<A: Alarm, Tz: TimeZone> ReminderScheduler<A, Tz> {
    pub fn new(alarm: A, tz: Tz, callback: ReminderCallback) -> Self {
        Self {
            alarm,
            tz,
            callback,
            state: ReminderState::Disarmed,
        }
    }

    pub fn state(&self) -> &ReminderState {
        &self.state
    }

    pub fn alarm(&self) -> &A {
        &self.alarm
    }

    pub fn arm(&mut self, config: ReminderConfig, now: DateTime<Utc>) -> Result<()> {
        config.validate()?;
        let local_now = now.with_timezone(&self.tz);

        let triggers = config
            .trigger_hours()
            .into_iter()
            .map(|hour| {
                first_trigger(&local_now, hour).map(|t| Trigger {
                    hour,
                    first_fire: t.timestamp_millis(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        self.cancel_all();
        for trigger in &triggers {
            debug!(
                hour = trigger.hour,
                first_fire = trigger.first_fire,
                "Arming reminder"
            );
            self.alarm.arm(
                trigger.hour as u8,
                trigger.first_fire,
                DAY_MILLIS,
                self.callback.clone(),
            );
        }

        info!(
            start = config.start_hour,
            end = config.end_hour,
            interval = config.interval_hours,
            count = triggers.len(),
            "Reminders armed"
        );
        self.state = ReminderState::Armed { config, triggers };
        Ok(())
    }

    pub fn disarm(&mut self) {
        self.cancel_all();
        self.state = ReminderState::Disarmed;
        info!("Reminders disarmed");
    }

    fn cancel_all(&self) {
        for slot in 0..SLOT_COUNT {
            self.alarm.cancel(slot);
        }
    }
}
