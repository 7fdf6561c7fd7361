//! Storage seams for intake events and custom cups.
//!
//! Range arguments are half-open: `[start, end)` in epoch milliseconds. Live
//! queries are `watch` receivers that hold the current result immediately and
//! re-emit whenever a write touches their range. Dropping the receiver ends
//! the subscription.

pub mod live;

use tokio::sync::watch;

use crate::{
    error::Result,
    structs::{
        custom_cup::{CustomCup, NewCup},
        intake_event::{IntakeEvent, NewIntake},
    },
};

pub use live::LiveStore;

pub trait EventStore: Send + Sync {
    /// Durable once this returns `Ok`; the next snapshot of every live query
    /// covering the event's timestamp includes it.
    fn append(&self, intake: NewIntake) -> Result<IntakeEvent>;

    fn delete(&self, id: u64) -> Result<IntakeEvent>;

    /// Snapshot of events in `[start, end)` sorted by timestamp.
    fn query_range(&self, start: i64, end: i64) -> Vec<IntakeEvent>;

    /// Live version of [`EventStore::query_range`].
    fn watch_range(&self, start: i64, end: i64) -> watch::Receiver<Vec<IntakeEvent>>;

    /// Live sum of volumes in `[start, end)`; `None` when the range is empty.
    fn watch_sum(&self, start: i64, end: i64) -> watch::Receiver<Option<i64>>;
}

pub trait CupStore: Send + Sync {
    fn add_cup(&self, cup: NewCup) -> Result<CustomCup>;

    fn update_cup(&self, cup: CustomCup) -> Result<()>;

    fn delete_cup(&self, id: u64) -> Result<CustomCup>;

    /// Live list of all cups sorted by name.
    fn watch_cups(&self) -> watch::Receiver<Vec<CustomCup>>;
}
