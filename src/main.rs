use std::{io::Write as _, sync::Arc};

use chrono::Local;
use hydrate_tracker::{
    clock::{Clock, SystemClock},
    commands::{Command, Session},
    config::AppPaths,
    logging,
    pipeline::AggregationPipeline,
    settings::{FileSettings, SettingsController, SettingsProvider},
    store::LiveStore,
    tasks::{alarm::TokioAlarm, notification::drink_reminder, reminder::ReminderScheduler},
    Result,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

#[tokio::main]
async fn main() -> Result<()> {
    let paths = AppPaths::resolve()?;
    paths.create()?;
    let _log_guard = logging::init(&paths.log_dir());
    info!(data_dir = ?paths.data_dir(), "Starting hydrate-tracker");

    let store = Arc::new(LiveStore::open(paths.history_file())?);
    let settings = Arc::new(FileSettings::open(paths.data_dir())?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let reminder = drink_reminder(store.clone(), settings.clone(), Local);
    let scheduler = ReminderScheduler::new(TokioAlarm::current(), Local, reminder);
    let controller = SettingsController::new(settings.clone(), scheduler, clock.clone());
    controller.start()?;

    let pipeline = AggregationPipeline::new(store, Local, clock);
    let session = Session::new(pipeline, controller);

    if !settings.onboarding_completed() {
        println!("Welcome! Tell me about yourself with `onboard <kg> <low|moderate|high>`.");
    }
    println!("{}", session.execute(Command::Today)?);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt();

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        match line.parse::<Command>() {
            Ok(Command::Quit) => break,
            Ok(command) => match session.execute(command) {
                Ok(output) => println!("{output}"),
                Err(e) => {
                    if e.is_storage() {
                        warn!("Command failed: {e}");
                    }
                    println!("{e}");
                }
            },
            Err(e) => println!("{e}"),
        }
    }

    info!("Shutting down");
    Ok(())
}
