//! User preferences, injected wherever they are needed instead of living in a
//! global.

pub mod controller;
pub mod file;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::{
    error::{Error, Result},
    goal::ActivityLevel,
    tasks::reminder::ReminderConfig,
};

pub use controller::SettingsController;
pub use file::FileSettings;

pub const DEFAULT_DAILY_GOAL: i32 = 2000;
pub const DEFAULT_WEIGHT_KG: f64 = 70.0;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Preferences {
    /// Milliliters per day
    pub daily_goal: i32,
    pub weight_kg: f64,
    pub activity_level: ActivityLevel,
    pub notifications_enabled: bool,
    pub start_hour: u32,
    pub end_hour: u32,
    pub interval_hours: u32,
    pub onboarding_completed: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        let reminders = ReminderConfig::default();
        Self {
            daily_goal: DEFAULT_DAILY_GOAL,
            weight_kg: DEFAULT_WEIGHT_KG,
            activity_level: ActivityLevel::Moderate,
            notifications_enabled: true,
            start_hour: reminders.start_hour,
            end_hour: reminders.end_hour,
            interval_hours: reminders.interval_hours,
            onboarding_completed: false,
        }
    }
}

impl Preferences {
    pub fn reminder_config(&self) -> ReminderConfig {
        ReminderConfig {
            start_hour: self.start_hour,
            end_hour: self.end_hour,
            interval_hours: self.interval_hours,
        }
    }
}

pub(crate) fn check_hour(hour: u32) -> Result<()> {
    if hour > 23 {
        return Err(Error::invalid(format!("hour must be within 0..=23, got {hour}")));
    }
    Ok(())
}

pub(crate) fn check_goal(goal: i32) -> Result<()> {
    if goal <= 0 {
        return Err(Error::invalid(format!("daily goal must be positive, got {goal}")));
    }
    Ok(())
}

pub(crate) fn check_weight(weight_kg: f64) -> Result<()> {
    if !weight_kg.is_finite() || weight_kg <= 0.0 {
        return Err(Error::invalid(format!("weight must be positive, got {weight_kg}")));
    }
    Ok(())
}

/// Typed key-value access to [`Preferences`]. Implementors provide a snapshot,
/// an atomic edit and the two live streams; the typed pairs come for free.
pub trait SettingsProvider: Send + Sync {
    fn preferences(&self) -> Preferences;

    /// Applies `edit` and persists the result. On failure nothing changes.
    fn update(&self, edit: &mut dyn FnMut(&mut Preferences)) -> Result<()>;

    fn watch_daily_goal(&self) -> watch::Receiver<i32>;

    fn watch_notifications_enabled(&self) -> watch::Receiver<bool>;

    fn daily_goal(&self) -> i32 {
        self.preferences().daily_goal
    }

    fn set_daily_goal(&self, goal: i32) -> Result<()> {
        check_goal(goal)?;
        self.update(&mut |p: &mut Preferences| p.daily_goal = goal)
    }

    fn weight_kg(&self) -> f64 {
        self.preferences().weight_kg
    }

    fn set_weight_kg(&self, weight_kg: f64) -> Result<()> {
        check_weight(weight_kg)?;
        self.update(&mut |p: &mut Preferences| p.weight_kg = weight_kg)
    }

    fn activity_level(&self) -> ActivityLevel {
        self.preferences().activity_level
    }

    fn set_activity_level(&self, level: ActivityLevel) -> Result<()> {
        self.update(&mut |p: &mut Preferences| p.activity_level = level)
    }

    fn notifications_enabled(&self) -> bool {
        self.preferences().notifications_enabled
    }

    fn set_notifications_enabled(&self, enabled: bool) -> Result<()> {
        self.update(&mut |p: &mut Preferences| p.notifications_enabled = enabled)
    }

    fn start_hour(&self) -> u32 {
        self.preferences().start_hour
    }

    fn set_start_hour(&self, hour: u32) -> Result<()> {
        check_hour(hour)?;
        self.update(&mut |p: &mut Preferences| p.start_hour = hour)
    }

    fn end_hour(&self) -> u32 {
        self.preferences().end_hour
    }

    fn set_end_hour(&self, hour: u32) -> Result<()> {
        check_hour(hour)?;
        self.update(&mut |p: &mut Preferences| p.end_hour = hour)
    }

    fn interval_hours(&self) -> u32 {
        self.preferences().interval_hours
    }

    fn set_interval_hours(&self, hours: u32) -> Result<()> {
        if hours == 0 {
            return Err(Error::invalid("reminder interval must be at least one hour"));
        }
        self.update(&mut |p: &mut Preferences| p.interval_hours = hours)
    }

    fn onboarding_completed(&self) -> bool {
        self.preferences().onboarding_completed
    }

    fn set_onboarding_completed(&self, completed: bool) -> Result<()> {
        self.update(&mut |p: &mut Preferences| p.onboarding_completed = completed)
    }
}
