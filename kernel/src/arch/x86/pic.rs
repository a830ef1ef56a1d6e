//! 8259 PIC remap and end-of-interrupt (spec.md §4.C).
//!
//! Grounded on the teacher's manual PIC remap sequence; ported to use the
//! `pic8259` crate's `ChainedPics` directly rather than hand-rolling the ICW
//! sequence, since that crate already encodes the exact protocol spec.md
//! §4.C names (cascade on IRQ2, 8086 mode, mask all at init).

use super::idt::{PIC_MASTER_BASE, PIC_SLAVE_BASE};
use pic8259::ChainedPics;
use spin::Mutex;

/// The two chained 8259 controllers, remapped to vectors 32 and 40.
static PICS: Mutex<ChainedPics> =
    Mutex::new(unsafe { ChainedPics::new(PIC_MASTER_BASE, PIC_SLAVE_BASE) });

/// Remap both PICs and mask every line. Lines are unmasked explicitly as
/// drivers attach (only the timer, in this crate's scope).
///
/// # Safety
/// Must run before interrupts are enabled (step 2 of spec.md §4.H), and
/// must not run concurrently with [`end_of_interrupt`].
#[cfg(target_os = "none")]
pub unsafe fn init() {
    // SAFETY: single-threaded bring-up; `ChainedPics::initialize` performs
    // the documented ICW1-ICW4 sequence over port I/O.
    unsafe {
        PICS.lock().initialize();
    }
}

/// Master PIC's interrupt mask register (data port).
const MASTER_DATA_PORT: u16 = 0x21;
/// IRQ0 (timer)'s bit in the master mask.
const IRQ0_MASK_BIT: u8 = 1 << 0;

/// Unmask the timer's IRQ line (IRQ0). Goes around `pic8259`'s higher-level
/// API directly at the master data port, since masking individual lines
/// past init is this spec's only post-bring-up PIC operation.
///
/// # Safety
/// Must run after [`init`] (step 2 of spec.md §4.H), before interrupts are
/// enabled.
#[cfg(target_os = "none")]
pub unsafe fn unmask_timer() {
    // SAFETY: PICs are initialized by `init`, a precondition of this
    // function; the data port holds an 8-bit mask register.
    unsafe {
        let current = super::inb(MASTER_DATA_PORT);
        super::outb(MASTER_DATA_PORT, current & !IRQ0_MASK_BIT);
    }
}

/// Send end-of-interrupt for `vector`: the slave PIC first if the vector
/// came from it (≥ 40), then the master unconditionally.
///
/// # Safety
/// Must be called from within the interrupt handler for `vector`, after any
/// handler-specific work, per spec.md §4.C's dispatcher rules.
#[cfg(target_os = "none")]
pub unsafe fn end_of_interrupt(vector: u8) {
    // SAFETY: forwarded from this function's own safety contract.
    unsafe {
        PICS.lock().notify_end_of_interrupt(vector);
    }
}
