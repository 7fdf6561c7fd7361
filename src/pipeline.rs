//! Live daily and weekly aggregates over the event store.
//!
//! The selected window is a `watch` channel. Two tasks follow it: one for the
//! selected day (total and intake list) and one for the selected week (daily
//! and hourly tables). Each task subscribes to the store's live query for the
//! current bounds, recomputes from scratch on every snapshot, and on a window
//! change drops that subscription before subscribing to the new bounds. A
//! snapshot is only published while its window is still the selected one.

use std::sync::Arc;

use chrono::{Days, NaiveDate, TimeZone};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, instrument, trace};

use crate::{
    bucketer::{self, HourlyTable, WeeklyTable},
    clock::Clock,
    error::{Error, Result},
    store::EventStore,
    structs::{
        custom_cup::CustomCup,
        intake_event::{IntakeEvent, NewIntake, MANUAL_ADJUSTMENT_LABEL},
    },
    time_window::{day_bounds_for_date, week_bounds_for_date, week_start_date, DAYS_PER_WEEK},
};

/// The window the aggregates are computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Selection {
    pub day: NaiveDate,
    /// Always a Monday
    pub week_start: NaiveDate,
}

impl Selection {
    pub fn around(day: NaiveDate) -> Self {
        Self {
            day,
            week_start: week_start_date(day),
        }
    }
}

/// Aggregates for one week, tagged with the week they describe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeekReport {
    pub week_start: NaiveDate,
    pub daily: WeeklyTable,
    pub hourly: HourlyTable,
}

impl WeekReport {
    fn compute<Tz: TimeZone>(week_start: NaiveDate, events: &[IntakeEvent], tz: &Tz) -> Self {
        Self {
            week_start,
            daily: bucketer::weekly(events, week_start, tz),
            hourly: bucketer::hourly(events, tz),
        }
    }

    pub fn total(&self) -> i64 {
        self.daily.iter().map(|d| d.total).sum()
    }
}

/// Totals for one day, tagged with the day they describe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayReport {
    pub day: NaiveDate,
    pub total: i64,
    /// Newest first
    pub intakes: Vec<IntakeEvent>,
}

pub struct AggregationPipeline<E, Tz>
where
    E: EventStore + 'static,
    Tz: TimeZone + Send + Sync + 'static,
{
    store: Arc<E>,
    tz: Tz,
    clock: Arc<dyn Clock>,
    selection: watch::Sender<Selection>,
    day: watch::Receiver<DayReport>,
    week: watch::Receiver<WeekReport>,
    tasks: Vec<JoinHandle<()>>,
}

impl<E, Tz> AggregationPipeline<E, Tz>
where
    E: EventStore + 'static,
    Tz: TimeZone + Send + Sync + 'static,
{
    /// Starts following today. Must be called from within a tokio runtime.
    pub fn new(store: Arc<E>, tz: Tz, clock: Arc<dyn Clock>) -> Self {
        let today = clock.now().with_timezone(&tz).date_naive();
        Self::with_selection(store, tz, clock, Selection::around(today))
    }

    pub fn with_selection(store: Arc<E>, tz: Tz, clock: Arc<dyn Clock>, selection: Selection) -> Self {
        let selection = Selection {
            day: selection.day,
            week_start: week_start_date(selection.week_start),
        };
        let (selection_tx, selection_rx) = watch::channel(selection);

        // Seed outputs synchronously so the first read is already current
        let (day_tx, day_rx) = watch::channel(day_report(store.as_ref(), &tz, selection.day));
        let (week_tx, week_rx) = watch::channel(week_report(store.as_ref(), &tz, selection.week_start));

        let tasks = vec![
            tokio::spawn(follow_day(
                store.clone(),
                tz.clone(),
                selection_rx.clone(),
                day_tx,
            )),
            tokio::spawn(follow_week(store.clone(), tz.clone(), selection_rx, week_tx)),
        ];

        Self {
            store,
            tz,
            clock,
            selection: selection_tx,
            day: day_rx,
            week: week_rx,
            tasks,
        }
    }

    pub fn store(&self) -> &Arc<E> {
        &self.store
    }

    pub fn timezone(&self) -> &Tz {
        &self.tz
    }

    pub fn selection(&self) -> Selection {
        *self.selection.borrow()
    }

    /// Live total and intake list of the selected day.
    pub fn subscribe_day(&self) -> watch::Receiver<DayReport> {
        self.day.clone()
    }

    /// Live daily and hourly tables of the selected week.
    pub fn subscribe_week(&self) -> watch::Receiver<WeekReport> {
        self.week.clone()
    }

    /// Computed straight from the store for the current selection, so it
    /// reflects a selection change made just before the call.
    pub fn selected_day_report(&self) -> DayReport {
        day_report(self.store.as_ref(), &self.tz, self.selection().day)
    }

    /// Like [`Self::selected_day_report`], for the selected week.
    pub fn selected_week_report(&self) -> WeekReport {
        week_report(self.store.as_ref(), &self.tz, self.selection().week_start)
    }

    pub fn total_for_selected_day(&self) -> i64 {
        self.day.borrow().total
    }

    pub fn intakes_for_selected_day(&self) -> Vec<IntakeEvent> {
        self.day.borrow().intakes.clone()
    }

    pub fn weekly_table(&self) -> WeeklyTable {
        self.week.borrow().daily.clone()
    }

    pub fn hourly_table(&self) -> HourlyTable {
        self.week.borrow().hourly
    }

    pub fn select_day(&self, day: NaiveDate) {
        self.selection.send_if_modified(|s| replace(&mut s.day, day));
    }

    /// Accepts any date; the week containing it is selected.
    pub fn select_week(&self, any_day: NaiveDate) {
        let week_start = week_start_date(any_day);
        self.selection
            .send_if_modified(|s| replace(&mut s.week_start, week_start));
    }

    pub fn previous_week(&self) {
        self.selection.send_modify(|s| {
            s.week_start = s.week_start - Days::new(DAYS_PER_WEEK);
        });
    }

    pub fn next_week(&self) {
        self.selection.send_modify(|s| {
            s.week_start = s.week_start + Days::new(DAYS_PER_WEEK);
        });
    }

    /// Records a drink now. The aggregates catch up through the live query.
    pub fn add_intake(&self, volume: i32, label: &str) -> Result<IntakeEvent> {
        let intake = NewIntake::new(volume, self.clock.now_millis(), label)?;
        self.store.append(intake)
    }

    /// Records a drink of the cup's volume, labelled with its name.
    pub fn drink_from(&self, cup: &CustomCup) -> Result<IntakeEvent> {
        self.add_intake(cup.volume, &cup.name)
    }

    /// Makes the selected day's total read `target` by recording the
    /// difference as a correction. Returns `None` when nothing had to change.
    ///
    /// The correction is stamped now when the selected day is today and at the
    /// day's last millisecond otherwise, so it always counts toward that day.
    pub fn set_absolute_level(&self, target: i64) -> Result<Option<IntakeEvent>> {
        let bounds = day_bounds_for_date(self.selection().day, &self.tz);
        let current = bucketer::sum(&self.store.query_range(bounds.start, bounds.end_exclusive()));

        let delta = target - current;
        if delta == 0 {
            trace!(target, "Level already matches, nothing to record");
            return Ok(None);
        }

        let volume = i32::try_from(delta)
            .map_err(|_| Error::invalid(format!("adjustment of {delta} ml is out of range")))?;
        debug!(current, target, volume, "Recording manual adjustment");

        let now = self.clock.now_millis();
        let timestamp = if bounds.contains(now) { now } else { bounds.end };
        let intake = NewIntake::new(volume, timestamp, MANUAL_ADJUSTMENT_LABEL)?;
        self.store.append(intake).map(Some)
    }

    pub fn delete_intake(&self, id: u64) -> Result<IntakeEvent> {
        self.store.delete(id)
    }
}

impl<E, Tz> Drop for AggregationPipeline<E, Tz>
where
    E: EventStore + 'static,
    Tz: TimeZone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

fn day_report<E: EventStore, Tz: TimeZone>(store: &E, tz: &Tz, day: NaiveDate) -> DayReport {
    let bounds = day_bounds_for_date(day, tz);
    let mut intakes = store.query_range(bounds.start, bounds.end_exclusive());
    intakes.reverse();

    DayReport {
        day,
        total: bucketer::sum(&intakes),
        intakes,
    }
}

fn week_report<E: EventStore, Tz: TimeZone>(store: &E, tz: &Tz, week_start: NaiveDate) -> WeekReport {
    let bounds = week_bounds_for_date(week_start, tz);
    let events = store.query_range(bounds.start, bounds.end_exclusive());
    WeekReport::compute(week_start, &events, tz)
}

/// Marks the current selection as seen and reports whether `matches` still
/// holds for it.
fn still_selected(
    selection: &mut watch::Receiver<Selection>,
    matches: impl Fn(&Selection) -> bool,
) -> bool {
    matches(&selection.borrow_and_update())
}

#[instrument(skip_all)]
async fn follow_day<E, Tz>(
    store: Arc<E>,
    tz: Tz,
    mut selection: watch::Receiver<Selection>,
    out: watch::Sender<DayReport>,
) where
    E: EventStore + 'static,
    Tz: TimeZone + Send + Sync + 'static,
{
    loop {
        let day = selection.borrow_and_update().day;
        let bounds = day_bounds_for_date(day, &tz);
        let mut events = store.watch_range(bounds.start, bounds.end_exclusive());
        trace!(%day, "Following day");

        loop {
            let mut intakes = events.borrow_and_update().clone();
            intakes.reverse();
            let total = bucketer::sum(&intakes);

            match selection.has_changed() {
                Err(_) => return,
                Ok(true) if !still_selected(&mut selection, |s| s.day == day) => break,
                Ok(_) => {
                    out.send_replace(DayReport { day, total, intakes });
                }
            }

            tokio::select! {
                biased;
                changed = selection.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    if !still_selected(&mut selection, |s| s.day == day) {
                        break;
                    }
                }
                Ok(()) = events.changed() => {}
            }
        }

        debug!(from = %day, "Selected day changed");
    }
}

#[instrument(skip_all)]
async fn follow_week<E, Tz>(
    store: Arc<E>,
    tz: Tz,
    mut selection: watch::Receiver<Selection>,
    out: watch::Sender<WeekReport>,
) where
    E: EventStore + 'static,
    Tz: TimeZone + Send + Sync + 'static,
{
    loop {
        let week_start = selection.borrow_and_update().week_start;
        let bounds = week_bounds_for_date(week_start, &tz);
        let mut events = store.watch_range(bounds.start, bounds.end_exclusive());
        trace!(%week_start, "Following week");

        loop {
            let snapshot = events.borrow_and_update().clone();
            let report = WeekReport::compute(week_start, &snapshot, &tz);

            match selection.has_changed() {
                Err(_) => return,
                Ok(true) if !still_selected(&mut selection, |s| s.week_start == week_start) => {
                    break
                }
                Ok(_) => {
                    out.send_replace(report);
                }
            }

            tokio::select! {
                biased;
                changed = selection.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    if !still_selected(&mut selection, |s| s.week_start == week_start) {
                        break;
                    }
                }
                Ok(()) = events.changed() => {}
            }
        }

        debug!(from = %week_start, "Selected week changed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{clock::FixedClock, error::Error, store::LiveStore};
    use chrono::Utc;
    use std::time::Duration;

    type Pipeline = AggregationPipeline<LiveStore, Utc>;

    fn at(day: u32, hour: u32) -> i64 {
        Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0)
            .unwrap()
            .timestamp_millis()
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    /// Thursday 2024-03-14, 10:00 UTC.
    fn pipeline() -> (Arc<LiveStore>, Pipeline) {
        let store = Arc::new(LiveStore::in_memory());
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 3, 14, 10, 0, 0).unwrap()));
        let pipeline = AggregationPipeline::new(store.clone(), Utc, clock);
        (store, pipeline)
    }

    fn record(store: &LiveStore, volume: i32, timestamp: i64) -> IntakeEvent {
        store
            .append(NewIntake::new(volume, timestamp, "Water").unwrap())
            .unwrap()
    }

    async fn until<T: Clone>(rx: &mut watch::Receiver<T>, pred: impl FnMut(&T) -> bool) -> T {
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(pred))
            .await
            .expect("timed out waiting for a matching report")
            .expect("pipeline stopped")
            .clone()
    }

    async fn eventually(mut check: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition never held");
    }

    #[tokio::test]
    async fn starts_on_today_with_empty_tables() {
        let (_store, pipeline) = pipeline();

        assert_eq!(pipeline.selection(), Selection::around(date(14)));
        assert_eq!(pipeline.selection().week_start, date(11));
        assert_eq!(pipeline.total_for_selected_day(), 0);
        assert!(pipeline.intakes_for_selected_day().is_empty());

        let weekly = pipeline.weekly_table();
        assert_eq!(weekly[0].date, date(11));
        assert_eq!(weekly[6].date, date(17));
        assert_eq!(weekly[0].date_label, "11/3");
        assert!(weekly.iter().all(|d| d.total == 0));
        assert!(pipeline.hourly_table().iter().all(|h| h.total == 0));
    }

    #[tokio::test]
    async fn existing_history_is_in_the_first_report() {
        let store = Arc::new(LiveStore::in_memory());
        record(&store, 300, at(14, 8));
        record(&store, 200, at(12, 8));
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 3, 14, 10, 0, 0).unwrap()));

        let pipeline = AggregationPipeline::new(store, Utc, clock);
        assert_eq!(pipeline.total_for_selected_day(), 300);
        assert_eq!(pipeline.subscribe_week().borrow().total(), 500);
        assert_eq!(pipeline.hourly_table()[8].total, 500);
    }

    #[tokio::test]
    async fn drinks_flow_into_every_aggregate() {
        let (_store, pipeline) = pipeline();
        let mut day = pipeline.subscribe_day();
        let mut week = pipeline.subscribe_week();

        let first = pipeline.add_intake(250, "Water").unwrap();
        assert_eq!(first.timestamp, at(14, 10));
        until(&mut day, |d| d.total == 250).await;

        let second = pipeline.add_intake(150, "Tea").unwrap();
        let report = until(&mut day, |d| d.total == 400).await;
        assert_eq!(report.intakes, vec![second, first]);

        let report = until(&mut week, |w| w.total() == 400).await;
        assert_eq!(report.daily[3].total, 400);
        assert_eq!(report.hourly[10].total, 400);
        assert_eq!(pipeline.weekly_table()[3].total, 400);
    }

    #[tokio::test]
    async fn drinking_from_a_cup_uses_its_volume_and_name() {
        let (_store, pipeline) = pipeline();
        let cup = CustomCup {
            id: 3,
            name: "Bottle".into(),
            volume: 600,
        };

        let intake = pipeline.drink_from(&cup).unwrap();
        assert_eq!(intake.volume, 600);
        assert_eq!(intake.label, "Bottle");
    }

    #[tokio::test]
    async fn absolute_level_records_the_difference() {
        let (_store, pipeline) = pipeline();
        let mut day = pipeline.subscribe_day();

        pipeline.add_intake(500, "Water").unwrap();
        until(&mut day, |d| d.total == 500).await;

        let correction = pipeline.set_absolute_level(800).unwrap().unwrap();
        assert_eq!(correction.volume, 300);
        assert_eq!(correction.label, MANUAL_ADJUSTMENT_LABEL);
        until(&mut day, |d| d.total == 800).await;

        assert!(pipeline.set_absolute_level(800).unwrap().is_none());

        let correction = pipeline.set_absolute_level(600).unwrap().unwrap();
        assert_eq!(correction.volume, -200);
        assert!(correction.is_correction());
        until(&mut day, |d| d.total == 600).await;
    }

    #[tokio::test]
    async fn absolute_level_applies_to_the_selected_day() {
        let (store, pipeline) = pipeline();
        record(&store, 700, at(12, 9));
        pipeline.select_day(date(12));

        let correction = pipeline.set_absolute_level(1000).unwrap().unwrap();
        assert_eq!(correction.volume, 300);
        assert_eq!(correction.timestamp, day_bounds_for_date(date(12), &Utc).end);

        // the first correction already counts, so a repeat has nothing to do
        assert!(pipeline.set_absolute_level(1000).unwrap().is_none());
        assert_eq!(pipeline.selected_day_report().total, 1000);
    }

    #[tokio::test]
    async fn todays_correction_is_stamped_now() {
        let (_store, pipeline) = pipeline();

        let correction = pipeline.set_absolute_level(400).unwrap().unwrap();
        assert_eq!(correction.timestamp, at(14, 10));
    }

    #[tokio::test]
    async fn selecting_a_day_follows_that_day() {
        let (store, pipeline) = pipeline();
        let mut day = pipeline.subscribe_day();
        record(&store, 400, at(13, 18));

        pipeline.select_day(date(13));
        let report = until(&mut day, |d| d.day == date(13)).await;
        assert_eq!(report.total, 400);

        record(&store, 100, at(13, 20));
        until(&mut day, |d| d.day == date(13) && d.total == 500).await;
    }

    #[tokio::test]
    async fn selected_reports_follow_a_selection_made_just_before() {
        let (store, pipeline) = pipeline();
        record(&store, 300, at(5, 9));
        record(&store, 120, at(13, 9));

        pipeline.select_week(date(5));
        let week = pipeline.selected_week_report();
        assert_eq!(week.week_start, date(4));
        assert_eq!(week.total(), 300);

        pipeline.select_day(date(13));
        let day = pipeline.selected_day_report();
        assert_eq!(day.day, date(13));
        assert_eq!(day.total, 120);
    }

    #[tokio::test]
    async fn day_total_always_matches_its_intakes() {
        let (store, pipeline) = pipeline();
        let mut day = pipeline.subscribe_day();

        for volume in [100, 250, -50, 400] {
            record(&store, volume, at(14, 9));
            let report = until(&mut day, |_| true).await;
            assert_eq!(report.total, bucketer::sum(&report.intakes));
        }
        let report = until(&mut day, |d| d.total == 700).await;
        assert_eq!(report.intakes.len(), 4);
    }

    #[tokio::test]
    async fn week_navigation_is_reversible() {
        let (_store, pipeline) = pipeline();
        let start = pipeline.selection();

        pipeline.previous_week();
        assert_eq!(pipeline.selection().week_start, date(4));
        pipeline.next_week();
        pipeline.next_week();
        assert_eq!(pipeline.selection().week_start, date(18));
        pipeline.previous_week();

        assert_eq!(pipeline.selection(), start);
    }

    #[tokio::test]
    async fn any_date_selects_its_week() {
        let (_store, pipeline) = pipeline();

        pipeline.select_week(date(24));
        assert_eq!(pipeline.selection().week_start, date(18));
        assert_eq!(pipeline.selection().day, date(14));

        pipeline.select_week(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert_eq!(
            pipeline.selection().week_start,
            NaiveDate::from_ymd_opt(2024, 2, 26).unwrap()
        );
    }

    #[tokio::test]
    async fn stale_week_is_never_published_after_a_switch() {
        let (store, pipeline) = pipeline();
        let mut week = pipeline.subscribe_week();
        record(&store, 500, at(12, 9));
        record(&store, 300, at(5, 9));
        until(&mut week, |w| w.week_start == date(11) && w.total() == 500).await;

        pipeline.previous_week();
        let report = until(&mut week, |w| w.week_start == date(4)).await;
        assert_eq!(report.total(), 300);
        assert_eq!(report.daily[1].total, 300);

        // a write to the week that is no longer selected
        record(&store, 999, at(13, 9));
        tokio::time::sleep(Duration::from_millis(50)).await;
        let report = week.borrow_and_update().clone();
        assert_eq!(report.week_start, date(4));
        assert_eq!(report.total(), 300);

        pipeline.next_week();
        let report = until(&mut week, |w| w.week_start == date(11)).await;
        assert_eq!(report.total(), 1499);
    }

    #[tokio::test]
    async fn switching_windows_replaces_subscriptions() {
        let (store, pipeline) = pipeline();
        // day list and week list
        eventually(|| store.subscription_count() == 2).await;

        for _ in 0..5 {
            pipeline.previous_week();
        }
        pipeline.select_day(date(1));
        let mut week = pipeline.subscribe_week();
        until(&mut week, |w| w.week_start == NaiveDate::from_ymd_opt(2024, 2, 5).unwrap()).await;

        eventually(|| store.subscription_count() == 2).await;
    }

    #[tokio::test]
    async fn dropping_the_pipeline_releases_the_store() {
        let (store, pipeline) = pipeline();
        eventually(|| store.subscription_count() == 2).await;

        drop(pipeline);
        eventually(|| store.subscription_count() == 0).await;
    }

    #[tokio::test]
    async fn deleted_intakes_leave_the_aggregates() {
        let (_store, pipeline) = pipeline();
        let mut day = pipeline.subscribe_day();

        let intake = pipeline.add_intake(250, "Water").unwrap();
        until(&mut day, |d| d.total == 250).await;

        assert_eq!(pipeline.delete_intake(intake.id).unwrap(), intake);
        let report = until(&mut day, |d| d.total == 0).await;
        assert!(report.intakes.is_empty());

        assert!(matches!(pipeline.delete_intake(intake.id), Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn invalid_drinks_are_rejected() {
        let (_store, pipeline) = pipeline();

        assert!(pipeline.add_intake(0, "Water").is_err());
        assert!(pipeline.add_intake(200, "  ").is_err());
        assert_eq!(pipeline.total_for_selected_day(), 0);
    }
}
