use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::TimeZone;
use tracing::info;

use crate::{
    clock::Clock,
    error::Result,
    goal::{daily_goal, ActivityLevel},
    settings::{check_goal, check_hour, check_weight, Preferences, SettingsProvider},
    tasks::reminder::{Alarm, ReminderScheduler, ReminderState},
};

/// Applies settings changes and keeps the things derived from them in step:
/// the daily goal follows weight and activity level, and the reminder
/// schedule follows the notification settings.
pub struct SettingsController<S, A, Tz>
where
    S: SettingsProvider,
    A: Alarm,
    Tz: TimeZone,
{
    settings: Arc<S>,
    scheduler: Mutex<ReminderScheduler<A, Tz>>,
    clock: Arc<dyn Clock>,
}

impl<S, A, Tz> SettingsController<S, A, Tz>
where
    S: SettingsProvider,
    A: Alarm,
    Tz: TimeZone,
{
    pub fn new(settings: Arc<S>, scheduler: ReminderScheduler<A, Tz>, clock: Arc<dyn Clock>) -> Self {
        Self {
            settings,
            scheduler: Mutex::new(scheduler),
            clock,
        }
    }

    pub fn settings(&self) -> &Arc<S> {
        &self.settings
    }

    /// Arms reminders if they were left enabled.
    pub fn start(&self) -> Result<()> {
        if self.settings.notifications_enabled() {
            self.reschedule()?;
        }
        Ok(())
    }

    pub fn reminder_state(&self) -> ReminderState {
        self.scheduler().state().clone()
    }

    pub fn set_weight(&self, weight_kg: f64) -> Result<i32> {
        let level = self.settings.activity_level();
        self.apply_profile(weight_kg, level, false)
    }

    pub fn set_activity_level(&self, level: ActivityLevel) -> Result<i32> {
        let weight_kg = self.settings.weight_kg();
        self.apply_profile(weight_kg, level, false)
    }

    pub fn set_daily_goal(&self, goal: i32) -> Result<()> {
        self.settings.set_daily_goal(goal)
    }

    /// Stores the profile gathered on first launch and the goal derived from it.
    pub fn complete_onboarding(&self, weight_kg: f64, level: ActivityLevel) -> Result<i32> {
        let goal = self.apply_profile(weight_kg, level, true)?;

        info!(weight_kg, %level, goal, "Onboarding completed");
        Ok(goal)
    }

    pub fn set_notifications_enabled(&self, enabled: bool) -> Result<()> {
        self.settings.set_notifications_enabled(enabled)?;
        if enabled {
            self.reschedule()
        } else {
            self.scheduler().disarm();
            Ok(())
        }
    }

    pub fn set_start_hour(&self, hour: u32) -> Result<()> {
        self.settings.set_start_hour(hour)?;
        self.reschedule_if_enabled()
    }

    pub fn set_end_hour(&self, hour: u32) -> Result<()> {
        self.settings.set_end_hour(hour)?;
        self.reschedule_if_enabled()
    }

    /// Sets both reminder hours in one write, re-arming once.
    pub fn set_hours(&self, start_hour: u32, end_hour: u32) -> Result<()> {
        check_hour(start_hour)?;
        check_hour(end_hour)?;
        self.settings.update(&mut |p: &mut Preferences| {
            p.start_hour = start_hour;
            p.end_hour = end_hour;
        })?;
        self.reschedule_if_enabled()
    }

    pub fn set_interval(&self, hours: u32) -> Result<()> {
        self.settings.set_interval_hours(hours)?;
        self.reschedule_if_enabled()
    }

    /// Stores weight, activity level and the goal derived from them together,
    /// or nothing if any of them is invalid.
    fn apply_profile(&self, weight_kg: f64, level: ActivityLevel, onboarded: bool) -> Result<i32> {
        check_weight(weight_kg)?;
        let goal = daily_goal(weight_kg, level);
        check_goal(goal)?;

        self.settings.update(&mut |p: &mut Preferences| {
            p.weight_kg = weight_kg;
            p.activity_level = level;
            p.daily_goal = goal;
            p.onboarding_completed |= onboarded;
        })?;
        Ok(goal)
    }

    fn reschedule_if_enabled(&self) -> Result<()> {
        if self.settings.notifications_enabled() {
            self.reschedule()?;
        }
        Ok(())
    }

    fn reschedule(&self) -> Result<()> {
        let config = self.settings.preferences().reminder_config();
        self.scheduler().arm(config, self.clock.now())
    }

    fn scheduler(&self) -> MutexGuard<'_, ReminderScheduler<A, Tz>> {
        self.scheduler.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
