use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::{
    bucketer,
    error::{Error, Result},
    storage::{History, HistoryFile},
    store::{CupStore, EventStore},
    structs::{
        custom_cup::{CustomCup, NewCup},
        intake_event::{IntakeEvent, NewIntake},
    },
};

struct RangeWatch<T> {
    start: i64,
    end: i64,
    tx: watch::Sender<T>,
}

impl<T> RangeWatch<T> {
    fn covers(&self, timestamp: i64) -> bool {
        self.start <= timestamp && timestamp < self.end
    }
}

#[derive(Default)]
struct StoreState {
    history: History,
    ranges: Vec<RangeWatch<Vec<IntakeEvent>>>,
    sums: Vec<RangeWatch<Option<i64>>>,
    cups: Vec<watch::Sender<Vec<CustomCup>>>,
}

impl StoreState {
    fn range(&self, start: i64, end: i64) -> &[IntakeEvent] {
        let intakes = &self.history.intakes;
        let lo = intakes.partition_point(|e| e.timestamp < start);
        let hi = intakes.partition_point(|e| e.timestamp < end).max(lo);
        &intakes[lo..hi]
    }

    fn sum(&self, start: i64, end: i64) -> Option<i64> {
        let events = self.range(start, end);
        (!events.is_empty()).then(|| bucketer::sum(events))
    }

    fn sorted_cups(&self) -> Vec<CustomCup> {
        let mut cups = self.history.cups.clone();
        cups.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        cups
    }

    fn prune(&mut self) {
        self.ranges.retain(|w| !w.tx.is_closed());
        self.sums.retain(|w| !w.tx.is_closed());
        self.cups.retain(|tx| !tx.is_closed());
    }

    /// Re-emits every live query whose range covers `timestamp`.
    fn publish_intakes(&mut self, timestamp: i64) {
        self.prune();

        for w in self.ranges.iter().filter(|w| w.covers(timestamp)) {
            w.tx.send_replace(self.range(w.start, w.end).to_vec());
        }
        for w in self.sums.iter().filter(|w| w.covers(timestamp)) {
            w.tx.send_replace(self.sum(w.start, w.end));
        }
    }

    fn publish_cups(&mut self) {
        self.prune();

        let cups = self.sorted_cups();
        for tx in &self.cups {
            tx.send_replace(cups.clone());
        }
    }
}

/// In-process event and cup store with live queries, optionally persisted to
/// a [`HistoryFile`] after every write.
///
/// Writes and notifications happen under one write lock, so each successful
/// append is visible in the next snapshot of every covering query.
pub struct LiveStore {
    state: RwLock<StoreState>,
    file: Option<HistoryFile>,
}

impl LiveStore {
    pub fn in_memory() -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            file: None,
        }
    }

    pub fn open(file: HistoryFile) -> Result<Self> {
        let history = file.load()?;
        Ok(Self {
            state: RwLock::new(StoreState {
                history,
                ..Default::default()
            }),
            file: Some(file),
        })
    }

    /// Number of live queries whose receivers are still alive.
    pub fn subscription_count(&self) -> usize {
        let mut state = self.write();
        state.prune();
        state.ranges.len() + state.sums.len() + state.cups.len()
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, history: &History) -> Result<()> {
        let Some(file) = &self.file else {
            return Ok(());
        };

        file.save(history).map_err(|e| {
            warn!("Unable to save history, rolling back: {e}");
            e
        })
    }
}

impl EventStore for LiveStore {
    fn append(&self, intake: NewIntake) -> Result<IntakeEvent> {
        let mut state = self.write();

        let id = state.history.last_intake_id + 1;
        let event = intake.with_id(id);
        let index = state
            .history
            .intakes
            .partition_point(|e| e.timestamp <= event.timestamp);
        state.history.intakes.insert(index, event.clone());
        state.history.last_intake_id = id;

        if let Err(e) = self.persist(&state.history) {
            state.history.intakes.remove(index);
            state.history.last_intake_id = id - 1;
            return Err(e);
        }

        debug!(id, volume = event.volume, label = %event.label, "Recorded intake");
        state.publish_intakes(event.timestamp);
        Ok(event)
    }

    fn delete(&self, id: u64) -> Result<IntakeEvent> {
        let mut state = self.write();

        let index = state
            .history
            .intakes
            .iter()
            .position(|e| e.id == id)
            .ok_or(Error::NotFound(id))?;
        let removed = state.history.intakes.remove(index);

        if let Err(e) = self.persist(&state.history) {
            state.history.intakes.insert(index, removed);
            return Err(e);
        }

        debug!(id, "Deleted intake");
        state.publish_intakes(removed.timestamp);
        Ok(removed)
    }

    fn query_range(&self, start: i64, end: i64) -> Vec<IntakeEvent> {
        self.read().range(start, end).to_vec()
    }

    fn watch_range(&self, start: i64, end: i64) -> watch::Receiver<Vec<IntakeEvent>> {
        let mut state = self.write();
        state.prune();
        let (tx, rx) = watch::channel(state.range(start, end).to_vec());
        state.ranges.push(RangeWatch { start, end, tx });

        trace!(start, end, "Subscribed to intake range");
        rx
    }

    fn watch_sum(&self, start: i64, end: i64) -> watch::Receiver<Option<i64>> {
        let mut state = self.write();
        state.prune();
        let (tx, rx) = watch::channel(state.sum(start, end));
        state.sums.push(RangeWatch { start, end, tx });
        rx
    }
}

impl CupStore for LiveStore {
    fn add_cup(&self, cup: NewCup) -> Result<CustomCup> {
        let mut state = self.write();

        let id = state.history.last_cup_id + 1;
        let cup = cup.with_id(id);
        state.history.cups.push(cup.clone());
        state.history.last_cup_id = id;

        if let Err(e) = self.persist(&state.history) {
            state.history.cups.pop();
            state.history.last_cup_id = id - 1;
            return Err(e);
        }

        debug!(id, name = %cup.name, volume = cup.volume, "Added cup");
        state.publish_cups();
        Ok(cup)
    }

    fn update_cup(&self, cup: CustomCup) -> Result<()> {
        cup.validate()?;
        let mut state = self.write();

        let slot = state
            .history
            .cups
            .iter_mut()
            .find(|c| c.id == cup.id)
            .ok_or(Error::NotFound(cup.id))?;
        let previous = std::mem::replace(slot, cup);

        if let Err(e) = self.persist(&state.history) {
            if let Some(slot) = state.history.cups.iter_mut().find(|c| c.id == previous.id) {
                *slot = previous;
            }
            return Err(e);
        }

        state.publish_cups();
        Ok(())
    }

    fn delete_cup(&self, id: u64) -> Result<CustomCup> {
        let mut state = self.write();

        let index = state
            .history
            .cups
            .iter()
            .position(|c| c.id == id)
            .ok_or(Error::NotFound(id))?;
        let removed = state.history.cups.remove(index);

        if let Err(e) = self.persist(&state.history) {
            state.history.cups.insert(index, removed);
            return Err(e);
        }

        debug!(id, name = %removed.name, "Deleted cup");
        state.publish_cups();
        Ok(removed)
    }

    fn watch_cups(&self) -> watch::Receiver<Vec<CustomCup>> {
        let mut state = self.write();
        state.prune();
        let (tx, rx) = watch::channel(state.sorted_cups());
        state.cups.push(tx);
        rx
    }
}
