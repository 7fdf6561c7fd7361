//! The terminal front end: one command per line, parsed and validated before
//! anything touches the store or the settings.

use std::{fmt::Write as _, str::FromStr};

use chrono::{NaiveDate, TimeZone};
use tracing::debug;

use crate::{
    error::{Error, Result},
    goal::{progress, ActivityLevel},
    pipeline::{AggregationPipeline, DayReport, WeekReport},
    settings::{SettingsController, SettingsProvider},
    store::{CupStore, EventStore},
    structs::custom_cup::{CustomCup, NewCup},
    tasks::reminder::{Alarm, ReminderState},
};

pub const DEFAULT_DRINK_LABEL: &str = "Water";

pub const HELP: &str = "\
drink <ml> [label]          record a drink
cup <name>                  drink from a saved cup
cups                        list saved cups
add-cup <ml> <name>         save a cup
edit-cup <id> <ml> <name>   change a saved cup
remove-cup <id>             forget a saved cup
set <ml>                    make today's total read <ml>
delete <id>                 remove a recorded drink
today                       selected day's total and drinks
day <yyyy-mm-dd>            select a day
week [yyyy-mm-dd]           show the selected week, or the week of a date
prev / next                 move the week selection
goal <ml>                   set the daily goal
weight <kg>                 set weight, recomputing the goal
activity <low|moderate|high>
reminders <on|off>
hours <start> <end>         reminder hours, 0-23
interval <hours>
onboard <kg> <activity>     first-run profile
status                      settings and reminder state
help
quit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Drink { volume: i32, label: String },
    Cup(String),
    Cups,
    AddCup { volume: i32, name: String },
    EditCup { id: u64, volume: i32, name: String },
    RemoveCup(u64),
    SetLevel(i64),
    Delete(u64),
    Today,
    Day(NaiveDate),
    Week(Option<NaiveDate>),
    PreviousWeek,
    NextWeek,
    Goal(i32),
    Weight(f64),
    Activity(ActivityLevel),
    Reminders(bool),
    Hours { start: u32, end: u32 },
    Interval(u32),
    Onboard { weight_kg: f64, level: ActivityLevel },
    Status,
    Help,
    Quit,
}

fn arg<T: FromStr>(args: &[&str], index: usize, what: &str) -> Result<T> {
    let raw = args
        .get(index)
        .ok_or_else(|| Error::invalid(format!("missing {what}")))?;
    raw.parse()
        .map_err(|_| Error::invalid(format!("{raw:?} is not a valid {what}")))
}

fn rest(args: &[&str], from: usize) -> Option<String> {
    let text = args.get(from..)?.join(" ");
    (!text.trim().is_empty()).then_some(text)
}

fn date_arg(args: &[&str], index: usize) -> Result<NaiveDate> {
    arg(args, index, "date (yyyy-mm-dd)")
}

impl FromStr for Command {
    type Err = Error;

    fn from_str(line: &str) -> Result<Self> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((name, args)) = words.split_first() else {
            return Err(Error::invalid("empty command"));
        };

        let command = match name.to_lowercase().as_str() {
            "drink" | "d" => Self::Drink {
                volume: arg(args, 0, "volume in ml")?,
                label: rest(args, 1).unwrap_or_else(|| DEFAULT_DRINK_LABEL.to_string()),
            },
            "cup" => Self::Cup(rest(args, 0).ok_or_else(|| Error::invalid("missing cup name"))?),
            "cups" => Self::Cups,
            "add-cup" => Self::AddCup {
                volume: arg(args, 0, "volume in ml")?,
                name: rest(args, 1).ok_or_else(|| Error::invalid("missing cup name"))?,
            },
            "edit-cup" => Self::EditCup {
                id: arg(args, 0, "cup id")?,
                volume: arg(args, 1, "volume in ml")?,
                name: rest(args, 2).ok_or_else(|| Error::invalid("missing cup name"))?,
            },
            "remove-cup" => Self::RemoveCup(arg(args, 0, "cup id")?),
            "set" => Self::SetLevel(arg(args, 0, "level in ml")?),
            "delete" | "rm" => Self::Delete(arg(args, 0, "drink id")?),
            "today" => Self::Today,
            "day" => Self::Day(date_arg(args, 0)?),
            "week" => Self::Week(match args.first() {
                Some(_) => Some(date_arg(args, 0)?),
                None => None,
            }),
            "prev" => Self::PreviousWeek,
            "next" => Self::NextWeek,
            "goal" => Self::Goal(arg(args, 0, "goal in ml")?),
            "weight" => Self::Weight(arg(args, 0, "weight in kg")?),
            "activity" => Self::Activity(ActivityLevel::from_name(
                args.first().copied().unwrap_or_default(),
            )),
            "reminders" => Self::Reminders(match args.first().copied() {
                Some("on") => true,
                Some("off") => false,
                _ => return Err(Error::invalid("expected `reminders on` or `reminders off`")),
            }),
            "hours" => Self::Hours {
                start: arg(args, 0, "start hour")?,
                end: arg(args, 1, "end hour")?,
            },
            "interval" => Self::Interval(arg(args, 0, "interval in hours")?),
            "onboard" => Self::Onboard {
                weight_kg: arg(args, 0, "weight in kg")?,
                level: ActivityLevel::from_name(args.get(1).copied().unwrap_or_default()),
            },
            "status" => Self::Status,
            "help" | "?" => Self::Help,
            "quit" | "exit" | "q" => Self::Quit,
            other => return Err(Error::invalid(format!("unknown command {other:?}, try `help`"))),
        };

        Ok(command)
    }
}

/// Everything a command can act on.
pub struct Session<E, S, A, Tz>
where
    E: EventStore + CupStore + 'static,
    S: SettingsProvider,
    A: Alarm,
    Tz: TimeZone + Send + Sync + 'static,
{
    pipeline: AggregationPipeline<E, Tz>,
    controller: SettingsController<S, A, Tz>,
}

impl<E, S, A, Tz> Session<E, S, A, Tz>
where
    E: EventStore + CupStore + 'static,
    S: SettingsProvider,
    A: Alarm,
    Tz: TimeZone + Send + Sync + 'static,
{
    pub fn new(pipeline: AggregationPipeline<E, Tz>, controller: SettingsController<S, A, Tz>) -> Self {
        Self {
            pipeline,
            controller,
        }
    }

    pub fn pipeline(&self) -> &AggregationPipeline<E, Tz> {
        &self.pipeline
    }

    pub fn controller(&self) -> &SettingsController<S, A, Tz> {
        &self.controller
    }

    /// Runs `command` and returns the text to show for it.
    pub fn execute(&self, command: Command) -> Result<String> {
        debug!(?command, "Executing command");
        let store = self.pipeline.store();

        let output = match command {
            Command::Drink { volume, label } => {
                let intake = self.pipeline.add_intake(volume, &label)?;
                format!("#{} {} ml of {}", intake.id, intake.volume, intake.label)
            }
            Command::Cup(name) => {
                let cup = self.find_cup(&name)?;
                let intake = self.pipeline.drink_from(&cup)?;
                format!("#{} {} ml from {}", intake.id, intake.volume, intake.label)
            }
            Command::Cups => render_cups(&store.watch_cups().borrow()),
            Command::AddCup { volume, name } => {
                let cup = store.add_cup(NewCup::new(name, volume)?)?;
                format!("Saved cup #{} {} ({} ml)", cup.id, cup.name, cup.volume)
            }
            Command::EditCup { id, volume, name } => {
                let name = name.trim().to_string();
                store.update_cup(CustomCup { id, name, volume })?;
                format!("Updated cup #{id}")
            }
            Command::RemoveCup(id) => {
                let cup = store.delete_cup(id)?;
                format!("Removed cup {}", cup.name)
            }
            Command::SetLevel(target) => match self.pipeline.set_absolute_level(target)? {
                Some(adjustment) => format!("Adjusted by {:+} ml", adjustment.volume),
                None => format!("Already at {target} ml"),
            },
            Command::Delete(id) => {
                let intake = self.pipeline.delete_intake(id)?;
                format!("Removed {} ml of {}", intake.volume, intake.label)
            }
            Command::Today => self.render_day(&self.pipeline.selected_day_report()),
            Command::Day(day) => {
                self.pipeline.select_day(day);
                format!("Selected {day}")
            }
            Command::Week(date) => {
                if let Some(date) = date {
                    self.pipeline.select_week(date);
                }
                render_week(&self.pipeline.selected_week_report())
            }
            Command::PreviousWeek => {
                self.pipeline.previous_week();
                format!("Week of {}", self.pipeline.selection().week_start)
            }
            Command::NextWeek => {
                self.pipeline.next_week();
                format!("Week of {}", self.pipeline.selection().week_start)
            }
            Command::Goal(goal) => {
                self.controller.set_daily_goal(goal)?;
                format!("Daily goal set to {goal} ml")
            }
            Command::Weight(weight_kg) => {
                let goal = self.controller.set_weight(weight_kg)?;
                format!("Weight set to {weight_kg} kg, daily goal is now {goal} ml")
            }
            Command::Activity(level) => {
                let goal = self.controller.set_activity_level(level)?;
                format!("Activity set to {level}, daily goal is now {goal} ml")
            }
            Command::Reminders(enabled) => {
                self.controller.set_notifications_enabled(enabled)?;
                self.render_reminders()
            }
            Command::Hours { start, end } => {
                self.controller.set_hours(start, end)?;
                self.render_reminders()
            }
            Command::Interval(hours) => {
                self.controller.set_interval(hours)?;
                self.render_reminders()
            }
            Command::Onboard { weight_kg, level } => {
                let goal = self.controller.complete_onboarding(weight_kg, level)?;
                format!("All set! Your daily goal is {goal} ml")
            }
            Command::Status => self.render_status(),
            Command::Help => HELP.to_string(),
            Command::Quit => "Bye!".to_string(),
        };

        Ok(output)
    }

    fn find_cup(&self, name: &str) -> Result<CustomCup> {
        let name = name.trim();
        self.pipeline
            .store()
            .watch_cups()
            .borrow()
            .iter()
            .find(|cup| cup.name.eq_ignore_ascii_case(name))
            .cloned()
            .ok_or_else(|| Error::invalid(format!("no cup named {name:?}")))
    }

    fn render_day(&self, report: &DayReport) -> String {
        let goal = self.controller.settings().daily_goal();
        let percent = progress(report.total, goal) * 100.0;

        let mut out = format!("{}: {} / {} ml ({percent:.0}%)", report.day, report.total, goal);
        for intake in &report.intakes {
            let time = self
                .pipeline
                .timezone()
                .timestamp_millis_opt(intake.timestamp)
                .single()
                .map(|t| t.naive_local().format("%H:%M").to_string())
                .unwrap_or_else(|| "--:--".to_string());
            let _ = write!(out, "\n  #{:<4} {time}  {:>6} ml  {}", intake.id, intake.volume, intake.label);
        }
        out
    }

    fn render_reminders(&self) -> String {
        match self.controller.reminder_state() {
            ReminderState::Disarmed => "Reminders off".to_string(),
            ReminderState::Armed { triggers, .. } if triggers.is_empty() => {
                "Reminders on, but no hour falls in the configured range".to_string()
            }
            ReminderState::Armed { triggers, .. } => {
                let hours: Vec<String> = triggers.iter().map(|t| format!("{:02}:00", t.hour)).collect();
                format!("Reminders at {}", hours.join(", "))
            }
        }
    }

    fn render_status(&self) -> String {
        let prefs = self.controller.settings().preferences();
        format!(
            "goal {} ml, weight {} kg, activity {}, onboarding {}\n{}",
            prefs.daily_goal,
            prefs.weight_kg,
            prefs.activity_level,
            if prefs.onboarding_completed { "done" } else { "pending" },
            self.render_reminders()
        )
    }
}

fn render_cups(cups: &[CustomCup]) -> String {
    if cups.is_empty() {
        return "No cups yet, add one with `add-cup <ml> <name>`".to_string();
    }

    cups.iter()
        .map(|cup| format!("#{:<4} {:<16} {:>6} ml", cup.id, cup.name, cup.volume))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_week(report: &WeekReport) -> String {
    let mut out = format!("Week of {}: {} ml", report.week_start, report.total());
    for day in &report.daily {
        let _ = write!(
            out,
            "\n  {} {:<6} {:>6} ml",
            day.date.format("%a"),
            day.date_label,
            day.total
        );
    }

    let busy: Vec<String> = report
        .hourly
        .iter()
        .filter(|h| h.total != 0)
        .map(|h| format!("{:02}h {} ml", h.hour, h.total))
        .collect();
    if !busy.is_empty() {
        let _ = write!(out, "\n  by hour: {}", busy.join(", "));
    }

    out
}
