//! `log` facade wiring (spec.md §7/§10).
//!
//! Every log record is prefixed with a `[SUBSYSTEM]` bracket tag (taken from
//! the record's `target()`) and broadcast to every registered
//! [`crate::console::ConsoleSink`] through [`crate::console::write_all`].
//! This replaces a bespoke ring-buffer logger with the ecosystem-standard
//! `log` crate, which the teacher already depends on for this purpose.

use crate::console;
use core::fmt::Write;
use log::{Level, Log, Metadata, Record};

struct KernelLogger;

static LOGGER: KernelLogger = KernelLogger;

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut line: LineBuf = LineBuf::new();
        let _ = write!(
            line,
            "[{}] {} - {}\n",
            record.target(),
            level_tag(record.level()),
            record.args()
        );
        console::write_all(line.as_bytes());
    }

    fn flush(&self) {}
}

fn level_tag(level: Level) -> &'static str {
    match level {
        Level::Error => "ERROR",
        Level::Warn => "WARN",
        Level::Info => "INFO",
        Level::Debug => "DEBUG",
        Level::Trace => "TRACE",
    }
}

const LINE_CAP: usize = 256;

struct LineBuf {
    data: [u8; LINE_CAP],
    len: usize,
}

impl LineBuf {
    const fn new() -> Self {
        Self {
            data: [0; LINE_CAP],
            len: 0,
        }
    }

    fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }
}

impl Write for LineBuf {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let bytes = s.as_bytes();
        let remaining = LINE_CAP - self.len;
        let n = bytes.len().min(remaining);
        self.data[self.len..self.len + n].copy_from_slice(&bytes[..n]);
        self.len += n;
        Ok(())
    }
}

/// Install the kernel logger as the global `log` sink. Idempotent beyond the
/// first call per `log::set_logger`'s own contract (subsequent calls return
/// `Err`, which this function discards since re-init is not an error here).
pub fn init(level: log::LevelFilter) {
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(level);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_buf_truncates_at_capacity() {
        let mut buf = LineBuf::new();
        for _ in 0..(LINE_CAP + 10) {
            let _ = buf.write_str("x");
        }
        assert_eq!(buf.len, LINE_CAP);
    }

    #[test]
    fn level_tag_covers_all_levels() {
        assert_eq!(level_tag(Level::Error), "ERROR");
        assert_eq!(level_tag(Level::Trace), "TRACE");
    }
}
