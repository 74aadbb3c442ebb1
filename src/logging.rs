//! Console logging for the build pipeline.
//!
//! A small `log::Log` implementation that timestamps records and writes them
//! to stderr. Pipeline components tag their messages (`[Sync]`, `[Patcher]`,
//! `[Build]`, ...) so a long compile log stays scannable. `--quiet` raises
//! the filter so only warnings and errors reach the console.

use log::{Level, LevelFilter, Log, Metadata, Record};

struct ConsoleLogger {
    level: LevelFilter,
}

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let ts = chrono::Local::now().format("%H:%M:%S");
        match record.level() {
            Level::Error => eprintln!("{} ERROR {}", ts, record.args()),
            Level::Warn => eprintln!("{} WARN  {}", ts, record.args()),
            _ => eprintln!("{} {}", ts, record.args()),
        }
    }

    fn flush(&self) {}
}

/// Register the console logger as the global `log` sink.
///
/// Safe to call more than once; later calls are no-ops (the `log` crate
/// rejects a second logger and we ignore that rejection, which also keeps
/// parallel test binaries happy).
pub fn initialize_logging(quiet: bool) {
    let level = if quiet {
        LevelFilter::Warn
    } else {
        LevelFilter::Info
    };
    if log::set_boxed_logger(Box::new(ConsoleLogger { level })).is_ok() {
        log::set_max_level(level);
    }
}
