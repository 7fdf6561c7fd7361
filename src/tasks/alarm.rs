use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

use chrono::Utc;
use tokio::{runtime::Handle, task::JoinHandle};
use tracing::{instrument, trace};

use crate::tasks::reminder::{Alarm, ReminderCallback};

/// Alarm collaborator backed by tokio timers. Slots live only as long as the
/// process does.
pub struct TokioAlarm {
    runtime: Handle,
    slots: Mutex<HashMap<u8, JoinHandle<()>>>,
}

impl TokioAlarm {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Uses the runtime of the calling task. Panics outside a tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    pub fn armed_slots(&self) -> Vec<u8> {
        let mut slots: Vec<u8> = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, task)| !task.is_finished())
            .map(|(slot, _)| *slot)
            .collect();
        slots.sort_unstable();
        slots
    }
}

impl Alarm for TokioAlarm {
    fn arm(&self, slot: u8, first_trigger: i64, repeat_interval_ms: i64, callback: ReminderCallback) {
        let task = self.runtime.spawn(fire_repeatedly(
            slot,
            first_trigger,
            repeat_interval_ms,
            callback,
        ));

        let previous = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(slot, task);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    fn cancel(&self, slot: u8) {
        let task = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&slot);
        if let Some(task) = task {
            trace!(slot, "Cancelling reminder slot");
            task.abort();
        }
    }
}

impl Drop for TokioAlarm {
    fn drop(&mut self) {
        let slots = self.slots.get_mut().unwrap_or_else(PoisonError::into_inner);
        for (_, task) in slots.drain() {
            task.abort();
        }
    }
}

#[instrument(skip(callback))]
async fn fire_repeatedly(slot: u8, first_trigger: i64, repeat_interval_ms: i64, callback: ReminderCallback) {
    let repeat = repeat_interval_ms.max(1);
    let mut next = first_trigger;

    loop {
        let wait = next - Utc::now().timestamp_millis();
        trace!("Milliseconds until slot {slot} fires: {wait}");
        if wait > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(wait as u64)).await;
        }

        trace!("Reminder slot {slot} firing");
        callback();

        // Skip whole periods missed while the machine was asleep
        let now = Utc::now().timestamp_millis();
        next += repeat;
        if next <= now {
            next += ((now - next) / repeat + 1) * repeat;
        }
    }
}
