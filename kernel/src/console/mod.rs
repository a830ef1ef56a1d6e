//! Console sink registry (spec.md §6).
//!
//! The display driver, UART driver, and console multiplexer are named in the
//! spec as external collaborators this crate depends on but does not
//! implement; [`ConsoleSink`] is the trait boundary between them and the
//! kernel. Up to [`MAX_SINKS`] sinks can be registered; every write is
//! broadcast to all of them. No `Vec` is used here — a heap allocator is an
//! explicit non-goal — so the registry is a fixed-size array.

use crate::error::KernelError;
use spin::Mutex;

/// Upper bound on simultaneously registered sinks (e.g. VGA text mode +
/// serial + a future remote-debug sink).
pub const MAX_SINKS: usize = 4;

/// A destination for kernel console output.
///
/// Implementors are the actual drivers (VGA text buffer, 16550 UART, ...);
/// none are provided in production here, matching spec.md §6's framing of
/// the display/UART drivers as out-of-scope collaborators.
pub trait ConsoleSink: Sync {
    /// One-time hardware setup. Called at most once, from [`register`].
    fn init(&self) {}
    /// Write a single byte.
    fn putchar(&self, byte: u8);
    /// Write a byte slice. Default implementation calls [`ConsoleSink::putchar`]
    /// per byte; sinks with a faster bulk path should override this.
    fn write(&self, bytes: &[u8]) {
        for &b in bytes {
            self.putchar(b);
        }
    }
    /// Set foreground/background color, if the sink supports it.
    fn set_color(&self, _fg: u8, _bg: u8) {}
    /// Clear the sink's display surface, if it has one.
    fn clear(&self) {}
}

/// A sink that discards everything. Used as the pre-init placeholder and in
/// tests that don't care about console output.
pub struct NullSink;

impl ConsoleSink for NullSink {
    fn putchar(&self, _byte: u8) {}
}

struct Registry {
    sinks: [Option<&'static dyn ConsoleSink>; MAX_SINKS],
    count: usize,
}

impl Registry {
    const fn new() -> Self {
        Self {
            sinks: [None; MAX_SINKS],
            count: 0,
        }
    }
}

static REGISTRY: Mutex<Registry> = Mutex::new(Registry::new());

/// Register a sink for broadcast writes. Calls `sink.init()` before adding
/// it to the registry.
///
/// # Errors
/// Returns [`KernelError::OutOfMemory`] if [`MAX_SINKS`] sinks are already
/// registered (there is no dynamic growth; this is a fixed-capacity array).
pub fn register(sink: &'static dyn ConsoleSink) -> Result<(), KernelError> {
    let mut reg = REGISTRY.lock();
    if reg.count >= MAX_SINKS {
        return Err(KernelError::OutOfMemory {
            requested: 1,
            available: 0,
        });
    }
    sink.init();
    let slot = reg
        .sinks
        .iter_mut()
        .find(|s| s.is_none())
        .expect("count tracks free slots");
    *slot = Some(sink);
    reg.count += 1;
    Ok(())
}

/// Write bytes to every registered sink.
pub fn write_all(bytes: &[u8]) {
    let reg = REGISTRY.lock();
    for sink in reg.sinks.iter().flatten() {
        sink.write(bytes);
    }
}

/// Write a single byte to every registered sink.
pub fn putchar_all(byte: u8) {
    let reg = REGISTRY.lock();
    for sink in reg.sinks.iter().flatten() {
        sink.putchar(byte);
    }
}

/// Clear every registered sink's display surface.
pub fn clear_all() {
    let reg = REGISTRY.lock();
    for sink in reg.sinks.iter().flatten() {
        sink.clear();
    }
}

/// Set foreground/background color on every registered sink. Used by the
/// panic banner (spec.md §7: "the screen is coloured and the message is
/// pinned before the halt loop").
pub fn set_color_all(fg: u8, bg: u8) {
    let reg = REGISTRY.lock();
    for sink in reg.sinks.iter().flatten() {
        sink.set_color(fg, bg);
    }
}

/// Number of sinks currently registered.
pub fn sink_count() -> usize {
    REGISTRY.lock().count
}

/// Bounded copy of a `&str` into a fixed buffer, truncating at a UTF-8
/// character boundary rather than splitting a multi-byte codepoint.
/// Grounds the spec's "safe string utilities" external interface (§6),
/// which Rust's `&str`/`core::fmt` otherwise already satisfy.
pub fn copy_str_bounded(src: &str, dst: &mut [u8]) -> usize {
    let max = dst.len();
    let mut end = src.len().min(max);
    while end > 0 && !src.is_char_boundary(end) {
        end -= 1;
    }
    dst[..end].copy_from_slice(&src.as_bytes()[..end]);
    end
}

#[cfg(any(test, feature = "test-hooks"))]
pub mod test_hooks {
    //! Test-only sink that records everything written to it, so unit and
    //! integration tests can assert on console output without real hardware.

    use super::ConsoleSink;
    use spin::Mutex;

    const BUF_CAP: usize = 1024;

    pub struct RecordingSink {
        buf: Mutex<([u8; BUF_CAP], usize)>,
    }

    impl RecordingSink {
        pub const fn new() -> Self {
            Self {
                buf: Mutex::new(([0; BUF_CAP], 0)),
            }
        }

        /// Copy recorded bytes into `out`, returning how many were copied.
        pub fn recorded(&self, out: &mut [u8]) -> usize {
            let guard = self.buf.lock();
            let n = guard.1.min(out.len());
            out[..n].copy_from_slice(&guard.0[..n]);
            n
        }

        pub fn reset(&self) {
            let mut guard = self.buf.lock();
            guard.1 = 0;
        }
    }

    impl Default for RecordingSink {
        fn default() -> Self {
            Self::new()
        }
    }

    impl ConsoleSink for RecordingSink {
        fn putchar(&self, byte: u8) {
            let mut guard = self.buf.lock();
            if guard.1 < BUF_CAP {
                let idx = guard.1;
                guard.0[idx] = byte;
                guard.1 += 1;
            }
        }
    }
}
