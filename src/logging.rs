use std::{env, path::Path};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_FILE_PREFIX: &str = "hydrate-tracker.log";
pub const SENTRY_DSN_ENV: &str = "SENTRY_DSN";

/// Keeps the log file writer and Sentry client alive. Dropping it flushes both.
pub struct LogGuard {
    _file: WorkerGuard,
    _sentry: Option<sentry::ClientInitGuard>,
}

/// Logs to stderr and to a daily file in `log_dir`, filtered by `RUST_LOG`
/// (default `info`). Errors also go to Sentry when `SENTRY_DSN` is set.
pub fn init(log_dir: &Path) -> LogGuard {
    let sentry = env::var(SENTRY_DSN_ENV)
        .ok()
        .filter(|dsn| !dsn.trim().is_empty())
        .map(|dsn| {
            sentry::init((
                dsn,
                sentry::ClientOptions {
                    release: sentry::release_name!(),
                    ..Default::default()
                },
            ))
        });

    let (file_writer, file_guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX));

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let sentry_layer = sentry
        .is_some()
        .then(|| sentry::integrations::tracing::layer());

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .with(sentry_layer)
        .init();

    LogGuard {
        _file: file_guard,
        _sentry: sentry,
    }
}
