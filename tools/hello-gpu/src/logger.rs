use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::io::Write;
use std::sync::OnceLock;

pub struct StderrLogger {
    max_level: LevelFilter,
}

impl StderrLogger {
    #[must_use]
    pub const fn new(max_level: LevelFilter) -> Self {
        Self { max_level }
    }

    /// Level from `var` (`error`, `warn`, `info`, `debug`, `trace`), `info` if unset or unknown.
    #[must_use]
    pub fn from_env(var: &str) -> Self {
        let level = std::env::var(var)
            .ok()
            .and_then(|level| level.parse().ok())
            .unwrap_or(LevelFilter::Info);
        Self::new(level)
    }

    /// Install as the global logger. Call once.
    ///
    /// # Errors
    /// Fails if a logger is already installed.
    pub fn init(self) -> Result<(), SetLoggerError> {
        static LOGGER: OnceLock<StderrLogger> = OnceLock::new();

        let max_level = self.max_level;
        let logger = LOGGER.get_or_init(|| self);
        log::set_logger(logger)?;
        log::set_max_level(max_level);
        Ok(())
    }
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        // "[LEVEL] target: message"
        let _ = writeln!(
            std::io::stderr().lock(),
            "[{}] {}: {}",
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}
