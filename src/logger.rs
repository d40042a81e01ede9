use log::{Record, Metadata, Level, LevelFilter, SetLoggerError};
use sentry_log::SentryLogger;


pub struct Logger {
    level: Level,
}

impl log::Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            println!("[{}] {} - {}", record.target(), record.level(), record.args());
        }
    }

    fn flush(&self) {}
}


/// Installs the console logger behind the Sentry bridge so warnings and
/// errors also end up as breadcrumbs and events.
pub fn init_logger(level: Level) -> Result<(), SetLoggerError> {
    let logger = SentryLogger::with_dest(Logger { level });

    log::set_boxed_logger(Box::new(logger))
        .map(|()| log::set_max_level(LevelFilter::Trace))
}


#[cfg(test)]
mod tests {
    use super::*;
    use log::Log;

    #[test]
    fn filters_below_level() {
        let logger = Logger { level: Level::Info };

        let debug = Metadata::builder().level(Level::Debug).build();
        let warn = Metadata::builder().level(Level::Warn).build();

        assert!(!logger.enabled(&debug));
        assert!(logger.enabled(&warn));
    }
}
