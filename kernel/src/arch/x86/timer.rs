//! PIT programming and TSC read: the hardware side of calibration
//! (spec.md §4.D). The calibration arithmetic itself lives in
//! [`crate::time`], against the [`crate::time::HardwareClock`] trait this
//! module implements, so the math is host-testable independent of real
//! hardware.

use crate::time::HardwareClock;

/// PIT input clock frequency.
const PIT_FREQUENCY_HZ: u32 = 1_193_182;
const PIT_CHANNEL0_DATA: u16 = 0x40;
const PIT_COMMAND: u16 = 0x43;

/// Down-counter reload value for a given tick frequency. Pure; exposed so
/// bring-up can pass the same value to [`crate::time::calibrate`] that
/// [`program`] loads into the PIT.
pub fn reload_value(frequency_hz: u32) -> u16 {
    (PIT_FREQUENCY_HZ / frequency_hz).clamp(1, 0xFFFF) as u16
}

/// Program channel 0 for rate-generator mode at the given tick frequency.
///
/// # Safety
/// Must run during bring-up before interrupts are enabled (step 5 of
/// spec.md §4.H).
#[cfg(target_os = "none")]
pub unsafe fn program(frequency_hz: u32) {
    let divisor = reload_value(frequency_hz);
    // SAFETY: bring-up precondition documented above; channel 0, mode 2
    // (rate generator), lobyte/hibyte access is the PIT's documented ICW.
    unsafe {
        super::outb(PIT_COMMAND, 0b0011_0100);
        super::outb(PIT_CHANNEL0_DATA, (divisor & 0xFF) as u8);
        super::outb(PIT_CHANNEL0_DATA, (divisor >> 8) as u8);
    }
}

/// Read the PIT's current down-counter value (channel 0, latch command).
#[cfg(target_os = "none")]
fn read_pit_counter() -> u16 {
    // SAFETY: latch command 0x00 for channel 0 is always valid; the two
    // subsequent reads return the latched low/high bytes.
    unsafe {
        super::outb(PIT_COMMAND, 0x00);
        let lo = super::inb(PIT_CHANNEL0_DATA) as u16;
        let hi = super::inb(PIT_CHANNEL0_DATA) as u16;
        (hi << 8) | lo
    }
}

/// Production [`HardwareClock`]: TSC for cycles, PIT down-counter for the
/// calibration busy-wait.
#[cfg(target_os = "none")]
pub struct PitTscClock;

#[cfg(target_os = "none")]
impl HardwareClock for PitTscClock {
    fn read_cycles(&self) -> u64 {
        super::rdtsc()
    }

    fn read_pit_remaining(&self) -> u16 {
        read_pit_counter()
    }
}

/// Handler for the timer IRQ vector. Per spec.md §4.D: increment tick
/// accounting, call the scheduler's tick, send EOI, return — no blocking,
/// no console I/O, no direct scheduler invocation.
///
/// # Safety
/// Must run only from the timer interrupt's trampoline, with the saved
/// interrupt frame already on the stack.
#[cfg(target_os = "none")]
pub unsafe fn on_tick() {
    crate::sched::tick();
    // SAFETY: called from the timer ISR per this function's contract.
    unsafe {
        super::pic::end_of_interrupt(super::idt::TIMER_VECTOR);
    }
}
