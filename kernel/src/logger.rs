//! Console-backed implementation of the `log` facade.
//!
//! Diagnostic output from the subsystems goes through `log::info!` and
//! friends; user-visible kernel messages (syscall results, capacity line)
//! use `println!` directly so their text stays unprefixed.

use log::{LevelFilter, Metadata, Record};

struct ConsoleLogger;

static CONSOLE_LOGGER: ConsoleLogger = ConsoleLogger;

impl log::Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            println!("[{:>5}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

/// Install the console logger. Calling it twice is harmless.
pub fn init() {
    if log::set_logger(&CONSOLE_LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Info);
    }
}
