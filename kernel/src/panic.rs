//! Fatal-error banner and halt loop (spec.md §7).
//!
//! Two entry points land here: Rust's own [`core::panic::PanicInfo`] path
//! (assertion failures, `unwrap`/`expect`, an invariant check in a debug
//! build) and [`fatal_exception`], reached from
//! [`crate::arch::x86::interrupt`]'s exception trampolines when the CPU
//! raises a vector with no registered handler. Both converge on
//! [`halt_with_banner`]: disable interrupts, colour the screen, print the
//! message to every sink with a `[PANIC]` tag, and spin forever.

use core::fmt::Write;

const LINE_CAP: usize = 256;
/// VGA-style colour attribute: white text on red background.
const PANIC_FG: u8 = 0x0F;
const PANIC_BG: u8 = 0x04;

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

/// Disable interrupts, colour every sink, print `message`, and halt forever.
/// Never returns.
#[cfg(target_os = "none")]
fn halt_with_banner(message: core::fmt::Arguments) -> ! {
    crate::arch::x86::disable_interrupts();
    crate::console::set_color_all(PANIC_FG, PANIC_BG);
    crate::console::clear_all();

    let mut line = LineBuf::new();
    let _ = write!(line, "[PANIC] {}\n", message);
    crate::console::write_all(line.as_bytes());

    crate::arch::x86::halt();
}

/// Reached from an exception trampoline for a vector with no registered
/// handler (spec.md §7 fatal class). Never returns.
#[cfg(target_os = "none")]
pub extern "C" fn fatal_exception(vector: u32) -> ! {
    halt_with_banner(format_args!("unhandled exception, vector {vector:#04x}"))
}

/// Rust-level panic handler. Required once per `no_std` binary; gated to
/// the bare-metal target only — the host test build links `std`, whose own
/// handler unwinds/aborts per the ordinary test harness instead.
#[cfg(target_os = "none")]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    halt_with_banner(format_args!("{info}"))
}
