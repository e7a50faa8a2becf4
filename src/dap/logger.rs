use crate::dap::protocol::Inbound;
use log::LevelFilter;
use std::fmt::Write as _;
use std::sync::mpsc::Sender;
use std::sync::Mutex;

/// Logger that mirrors log records into the client debug console.
///
/// Records are queued to the session like any other inbound message, the session turns them
/// into `output` events.
pub struct DapLogger {
    inner: env_logger::Logger,
    queue: Mutex<Sender<Inbound>>,
}

impl DapLogger {
    pub fn new(queue: Sender<Inbound>) -> Self {
        Self {
            inner: env_logger::Logger::from_default_env(),
            queue: Mutex::new(queue),
        }
    }

    pub fn filter(&self) -> LevelFilter {
        self.inner.filter()
    }
}

impl log::Log for DapLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        if !self.inner.matches(record) {
            return;
        }

        let mut output = String::new();
        let _ = write!(output, "[{}] ", record.level());
        if let Some(module) = record.module_path() {
            let _ = write!(output, "{module} ");
        }
        let _ = writeln!(output, "{}", record.args());

        if let Ok(queue) = self.queue.lock() {
            let _ = queue.send(Inbound::Log(output));
        }
    }

    fn flush(&self) {}
}
