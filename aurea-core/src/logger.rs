//! Bridge from the `log` facade to a host-provided sink.
//!
//! The core library only emits through `log`. Hosts that want the records
//! (a mobile shell, a web view bridge, the CLI) install a [`Logger`] once at
//! startup with [`set_logger`]. Token values are never part of a message.

use std::sync::{Arc, OnceLock};

/// Receives every record the session core emits.
///
/// Implement it once in the host and register it with [`set_logger`] before
/// the first [`crate::session::Session`] is built. Implementations must be
/// cheap and must not block: records are delivered on the thread that
/// emitted them, which may be an async executor worker.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
///
/// use aurea_core::logger::{set_logger, LogLevel, Logger};
///
/// struct Stderr;
///
/// impl Logger for Stderr {
///     fn log(&self, level: LogLevel, message: String) {
///         eprintln!("[{level}] {message}");
///     }
/// }
///
/// set_logger(Arc::new(Stderr));
/// ```
pub trait Logger: Sync + Send {
    /// Records a message.
    ///
    /// # Arguments
    ///
    /// * `level` - The severity of the record.
    /// * `message` - The formatted record, never containing token values.
    fn log(&self, level: LogLevel, message: String);
}

/// Severity of a forwarded record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum LogLevel {
    /// Very detailed tracing.
    Trace,
    /// Debugging information, e.g. a caller joining an in-flight refresh.
    Debug,
    /// Session milestones: sign-in, refresh, accepted transfers.
    Info,
    /// Degraded operation: storage failures, rejected refreshes.
    Warn,
    /// Failures the host should surface.
    Error,
}

/// Maps the `log` crate's levels one to one.
impl From<log::Level> for LogLevel {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => Self::Error,
            log::Level::Warn => Self::Warn,
            log::Level::Info => Self::Info,
            log::Level::Debug => Self::Debug,
            log::Level::Trace => Self::Trace,
        }
    }
}

/// The `log::Log` implementation installed by [`set_logger`]. Forwards each
/// record to the registered [`Logger`].
struct ForeignLogger;

impl log::Log for ForeignLogger {
    /// Accepts every record; filtering happens when forwarding.
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    /// Forwards `record` unless it is debug or trace output from a
    /// dependency. Falls back to stderr when no sink is registered.
    fn log(&self, record: &log::Record) {
        // Debug and trace from dependencies (reqwest, hyper) are noise for hosts.
        let is_record_from_aurea = record
            .module_path()
            .is_some_and(|module_path| module_path.starts_with("aurea"));
        let is_debug_or_trace_level =
            record.level() == log::Level::Debug || record.level() == log::Level::Trace;
        if is_debug_or_trace_level && !is_record_from_aurea {
            return;
        }

        if let Some(logger) = LOGGER_INSTANCE.get() {
            logger.log(record.level().into(), record.args().to_string());
        } else {
            eprintln!("Logger not set: {}", record.args());
        }
    }

    /// Nothing is buffered.
    fn flush(&self) {}
}

/// The sink registered by [`set_logger`].
static LOGGER_INSTANCE: OnceLock<Arc<dyn Logger>> = OnceLock::new();

/// Installs the process-wide sink.
///
/// Only the first call takes effect; later calls print a notice to stderr and
/// keep the original sink. Also registers the forwarding logger with the `log`
/// facade and raises its maximum level to `Trace`.
pub fn set_logger(logger: Arc<dyn Logger>) {
    if LOGGER_INSTANCE.set(logger).is_err() {
        eprintln!("Logger already set");
    }

    if let Err(e) = init_logger() {
        eprintln!("Failed to set logger: {e}");
    }
}

/// Registers [`ForeignLogger`] with the `log` facade.
///
/// # Errors
///
/// Returns `log::SetLoggerError` if another `log` implementation was already
/// installed, e.g. by a host that set up its own logger first.
fn init_logger() -> Result<(), log::SetLoggerError> {
    static LOGGER: ForeignLogger = ForeignLogger;
    log::set_logger(&LOGGER)?;
    log::set_max_level(log::LevelFilter::Trace);
    Ok(())
}
