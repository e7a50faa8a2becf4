//! Process-wide logger that can be replaced after installation.

use log::{LevelFilter, Log, Metadata, Record};
use std::sync::RwLock;

pub static LOGGER_SWITCHER: LoggerSwitcher = LoggerSwitcher::new();

/// Forwards every record to the currently installed logger.
///
/// The `log` facade accepts a single logger per process, the switcher is that logger and the
/// real one behind it may change at any moment (plain `env_logger` at startup, client console
/// logger once a session asks for it).
pub struct LoggerSwitcher {
    inner: RwLock<Option<Box<dyn Log>>>,
}

impl LoggerSwitcher {
    const fn new() -> Self {
        Self {
            inner: RwLock::new(None),
        }
    }

    /// Install `logger` as a current logger with `filter` as a max level.
    pub fn switch<L: Log + 'static>(&'static self, logger: L, filter: LevelFilter) {
        if let Ok(mut inner) = self.inner.write() {
            *inner = Some(Box::new(logger));
        }
        // already set by a previous switch
        let _ = log::set_logger(self);
        log::set_max_level(filter);
    }
}

impl Log for LoggerSwitcher {
    fn enabled(&self, metadata: &Metadata) -> bool {
        match self.inner.read() {
            Ok(inner) => inner.as_ref().is_some_and(|l| l.enabled(metadata)),
            Err(_) => false,
        }
    }

    fn log(&self, record: &Record) {
        if let Ok(inner) = self.inner.read() {
            if let Some(logger) = inner.as_ref() {
                logger.log(record);
            }
        }
    }

    fn flush(&self) {
        if let Ok(inner) = self.inner.read() {
            if let Some(logger) = inner.as_ref() {
                logger.flush();
            }
        }
    }
}
