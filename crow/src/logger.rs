use colored::Colorize;
use std::sync::atomic::{AtomicBool, Ordering};

/// The log filter levels exposed on the app builder. These map onto the
/// `log` facade's filter; any `log`-compatible logger the application
/// installs is respected, and a small built-in logger is installed by
/// `run()` when none is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// everything, including per-connection tracing
    Debug,
    /// startup and lifecycle messages
    Info,
    /// unexpected but recoverable conditions
    Warning,
    /// failed requests and I/O errors
    Error,
    /// unrecoverable failures
    Critical,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warning => log::LevelFilter::Warn,
            LogLevel::Error | LogLevel::Critical => log::LevelFilter::Error,
        }
    }
}

struct DefaultLogger;

impl log::Log for DefaultLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let timestamp = time::OffsetDateTime::now_utc()
            .format(&time::macros::format_description!(
                "[year]-[month]-[day] [hour]:[minute]:[second]"
            ))
            .unwrap_or_default();

        let level = match record.level() {
            log::Level::Error => "ERROR   ".red(),
            log::Level::Warn => "WARNING ".yellow(),
            log::Level::Info => "INFO    ".normal(),
            log::Level::Debug => "DEBUG   ".green(),
            log::Level::Trace => "TRACE   ".magenta(),
        };

        eprintln!("({timestamp}) [{level}] {}", record.args());
    }

    fn flush(&self) {}
}

static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Install the built-in logger unless some logger is already registered.
/// Called from `run()`; keeps whatever filter level `loglevel` selected.
pub(crate) fn ensure_logger() {
    if INSTALLED.swap(true, Ordering::SeqCst) {
        return;
    }
    let level = log::max_level();
    if log::set_boxed_logger(Box::new(DefaultLogger)).is_ok() {
        if level == log::LevelFilter::Off {
            log::set_max_level(log::LevelFilter::Info);
        } else {
            log::set_max_level(level);
        }
    }
}
