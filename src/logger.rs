use std::any::Any;
use std::panic::{self, PanicHookInfo};
use std::thread;

use tracing::{Level, error};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::Targets;

use crate::{AppConfig, CargoEnv};

/// dropping either guard loses buffered events, keep them alive for the whole of main
pub struct LoggerGuards {
    pub _tracing_guard: WorkerGuard,
    pub _sentry_guard: Option<sentry::ClientInitGuard>,
}

pub struct Logger {}

impl Logger {
    pub fn init(config: &AppConfig) -> LoggerGuards {
        let (writer, guard) = match config.cargo_env {
            CargoEnv::Development => tracing_appender::non_blocking(std::io::stdout()),
            CargoEnv::Production => tracing_appender::non_blocking(
                tracing_appender::rolling::daily(&config.log_dir, "rerng-api.log"),
            ),
        };

        let sentry_guard = config.sentry_dsn.clone().map(|dsn| {
            sentry::init((
                dsn,
                sentry::ClientOptions {
                    release: sentry::release_name!(),
                    environment: Some(environment_name(config.cargo_env).into()),
                    attach_stacktrace: true,
                    ..Default::default()
                },
            ))
        });

        use tracing_subscriber::layer::SubscriberExt;
        use tracing_subscriber::util::SubscriberInitExt;

        let registry = tracing_subscriber::registry()
            .with(log_targets(config.cargo_env))
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(writer),
            );

        match sentry_guard {
            Some(_) => registry.with(sentry_tracing::layer()).init(),
            None => registry.init(),
        }

        panic::set_hook(Box::new(log_panic));

        LoggerGuards {
            _tracing_guard: guard,
            _sentry_guard: sentry_guard,
        }
    }
}

pub fn environment_name(cargo_env: CargoEnv) -> &'static str {
    match cargo_env {
        CargoEnv::Development => "development",
        CargoEnv::Production => "production",
    }
}

/// Our own crate at info in development and debug in production. Chromium's cdp chatter and
/// the http stack stay at warn either way, at debug they drown the resolver logs.
pub fn log_targets(cargo_env: CargoEnv) -> Targets {
    let level = match cargo_env {
        CargoEnv::Development => Level::INFO,
        CargoEnv::Production => Level::DEBUG,
    };

    Targets::new()
        .with_default(level)
        .with_target("chromiumoxide", Level::WARN)
        .with_target("tungstenite", Level::WARN)
        .with_target("hyper", Level::WARN)
        .with_target("hyper_util", Level::WARN)
        .with_target("reqwest", Level::WARN)
}

pub fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "Box<Any>"
    }
}

// scraper and download workers catch their panics, this still gets the message and trace into
// the log file instead of stderr
fn log_panic(info: &PanicHookInfo<'_>) {
    let current = thread::current();
    let thread = current.name().unwrap_or("unknown");
    let msg = panic_message(info.payload());
    let backtrace = backtrace::Backtrace::new();

    match info.location() {
        Some(location) => error!(
            target: "panic", "thread '{}' panicked at '{}': {}:{}\n{:?}",
            thread,
            msg,
            location.file(),
            location.line(),
            backtrace
        ),
        None => error!(target: "panic", "thread '{}' panicked at '{}'\n{:?}", thread, msg, backtrace),
    }
}
