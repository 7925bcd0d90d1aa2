//! Console logging for hosted tile builds.
//!
//! A `log` backend that writes one coloured line per record to stderr,
//! tagged with the emitting thread. Simulator worker threads are named
//! `<tile>/w<n>`, so each line shows which context logged it:
//!
//! ```text
//! [ WARN] tile3/w0: tile3: PBRK0 raised on worker 0
//! ```

use std::fmt;
use std::io::{self, Write};

use log::{Level, LevelFilter, Log, Metadata, Record};
use spin::Once;

/// Environment variable holding the level filter (`error` .. `trace`, `off`).
pub const ENV_VAR: &str = "TILE_LOG";

/// Filter used when `TILE_LOG` is unset or unparsable.
pub const DEFAULT_LEVEL: LevelFilter = LevelFilter::Info;

fn label(level: Level) -> &'static str {
    match level {
        Level::Trace => "TRACE",
        Level::Debug => "DEBUG",
        Level::Info => " INFO",
        Level::Warn => " WARN",
        Level::Error => "ERROR",
    }
}

fn color(level: Level) -> &'static str {
    match level {
        Level::Trace => "\x1b[90m", // Gray
        Level::Debug => "\x1b[36m", // Cyan
        Level::Info => "\x1b[32m",  // Green
        Level::Warn => "\x1b[33m",  // Yellow
        Level::Error => "\x1b[31m", // Red
    }
}

fn write_line(
    out: &mut impl Write,
    level: Level,
    thread: &str,
    args: &fmt::Arguments<'_>,
) -> io::Result<()> {
    writeln!(out, "{}[{}]\x1b[0m {}: {}", color(level), label(level), thread, args)
}

struct TileLogger {
    level: LevelFilter,
}

impl Log for TileLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let thread = std::thread::current();
        let name = thread.name().unwrap_or("host");
        let mut stderr = io::stderr().lock();
        let _ = write_line(&mut stderr, record.level(), name, record.args());
    }

    fn flush(&self) {
        let _ = io::stderr().flush();
    }
}

static LOGGER: Once<TileLogger> = Once::new();

/// Parse a level filter as accepted in `TILE_LOG`.
pub fn parse_level(value: &str) -> Option<LevelFilter> {
    value.trim().parse().ok()
}

/// Install the logger with the level from `TILE_LOG`. Safe to call more
/// than once; only the first call has any effect.
pub fn init() {
    let level = std::env::var(ENV_VAR)
        .ok()
        .and_then(|value| parse_level(&value))
        .unwrap_or(DEFAULT_LEVEL);
    init_with_level(level);
}

/// Install the logger with an explicit level filter.
pub fn init_with_level(level: LevelFilter) {
    let logger = LOGGER.call_once(|| TileLogger { level });
    if log::set_logger(logger).is_ok() {
        log::set_max_level(logger.level);
    }
}
