use std::sync::Arc;

use chrono::{TimeZone, Utc};
use tracing::{instrument, trace, warn};

use crate::{
    bucketer,
    settings::SettingsProvider,
    store::EventStore,
    tasks::reminder::ReminderCallback,
    time_window::day_bounds,
};

pub const NOTIFICATION_TITLE: &str = "Time to drink!";

pub fn reminder_message(total: i64, goal: i32) -> String {
    let remaining = i64::from(goal) - total;
    if remaining > 0 {
        format!("You've had {total} ml of your {goal} ml today, {remaining} ml to go!")
    } else {
        format!("You've hit your {goal} ml goal today, keep sipping!")
    }
}

#[instrument]
pub fn create_drink_notification(body: &str) {
    trace!("Showing drink notification");

    if let Err(e) = notify_rust::Notification::new()
        .appname("hydrate-tracker")
        .summary(NOTIFICATION_TITLE)
        .body(body)
        .show()
    {
        warn!("Unable to create drink notification: {e}");
    }
}

/// Callback handed to the reminder scheduler: looks up today's total at
/// firing time and pops a desktop notification off the async threads.
pub fn drink_reminder<E, S, Tz>(store: Arc<E>, settings: Arc<S>, tz: Tz) -> ReminderCallback
where
    E: EventStore + 'static,
    S: SettingsProvider + 'static,
    Tz: TimeZone + Send + Sync + 'static,
{
    Arc::new(move || {
        let today = day_bounds(&Utc::now().with_timezone(&tz));
        let total = bucketer::sum(&store.query_range(today.start, today.end_exclusive()));
        let body = reminder_message(total, settings.daily_goal());

        println!("{NOTIFICATION_TITLE} {body}");
        tokio::task::spawn_blocking(move || create_drink_notification(&body));
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_counts_down_to_the_goal() {
        assert_eq!(
            reminder_message(800, 2000),
            "You've had 800 ml of your 2000 ml today, 1200 ml to go!"
        );
    }

    #[test]
    fn message_congratulates_once_goal_is_met() {
        assert!(reminder_message(2450, 2450).contains("hit your 2450 ml goal"));
    }
}
