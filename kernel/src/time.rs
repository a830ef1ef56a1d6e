//! Tick and cycle-counter calibration (spec.md §4.D, §3 "Tick and time").
//!
//! Calibration math is expressed against [`HardwareClock`] so it is
//! host-testable without a real PIT/TSC; [`crate::arch::x86::timer`]
//! supplies the production implementation.

use crate::error::KernelError;
use crate::sync::GlobalState;

/// Lower bound of the sanity band a calibrated frequency must fall in.
pub const MIN_SANE_HZ: u64 = 100_000_000;
/// Upper bound of the sanity band a calibrated frequency must fall in.
pub const MAX_SANE_HZ: u64 = 10_000_000_000;

/// PIT input clock frequency, used to convert down-counter ticks to µs.
const PIT_FREQUENCY_HZ: u64 = 1_193_182;

/// Abstraction over the two hardware reads calibration needs: a
/// monotonically non-decreasing cycle counter, and the PIT's current
/// down-counter value.
pub trait HardwareClock {
    /// Read the free-running cycle counter.
    fn read_cycles(&self) -> u64;
    /// Read the PIT channel-0 down-counter's current remaining count.
    fn read_pit_remaining(&self) -> u16;
}

/// Busy-wait `wait_ticks` full down-counter periods of a PIT programmed
/// with reload value `pit_reload`, sampling `clock` before and after, and
/// derive a cycles-per-second frequency.
///
/// Accumulates elapsed down-counter ticks across wraps (the counter resets
/// to `pit_reload` after reaching zero) rather than assuming a single
/// non-wrapping read, matching spec.md §4.D's calibration protocol.
pub fn calibrate(
    clock: &dyn HardwareClock,
    pit_reload: u16,
    wait_ticks: u32,
) -> Result<u64, KernelError> {
    let target_counts = wait_ticks as u64 * pit_reload as u64;

    let start_cycles = clock.read_cycles();
    let mut prev = clock.read_pit_remaining();
    let mut elapsed_counts: u64 = 0;

    while elapsed_counts < target_counts {
        let cur = clock.read_pit_remaining();
        if cur > prev {
            // Wrapped: counted down through zero and reloaded.
            elapsed_counts += prev as u64 + (pit_reload as u64 - cur as u64);
        } else {
            elapsed_counts += (prev - cur) as u64;
        }
        prev = cur;
    }
    let end_cycles = clock.read_cycles();

    let elapsed_us = elapsed_counts.saturating_mul(1_000_000) / PIT_FREQUENCY_HZ;
    if elapsed_us == 0 {
        return Err(KernelError::CalibrationOutOfRange { measured_hz: 0 });
    }

    let cycles = end_cycles.saturating_sub(start_cycles);
    let measured_hz = cycles.saturating_mul(1_000_000) / elapsed_us;

    if !(MIN_SANE_HZ..=MAX_SANE_HZ).contains(&measured_hz) {
        return Err(KernelError::CalibrationOutOfRange { measured_hz });
    }
    Ok(measured_hz)
}

struct TimeState {
    freq_hz: u64,
    ticks: u64,
}

static STATE: GlobalState<TimeState> = GlobalState::new();

/// Record the calibrated frequency. Called once, at bring-up step 5.
pub fn set_calibrated_frequency(freq_hz: u64) {
    let _ = STATE.init(TimeState { freq_hz, ticks: 0 });
}

/// Convert a cycle count to microseconds. Division order (`cycles /
/// (freq/1_000_000)`) avoids overflow for any sane calibrated frequency and
/// multi-hour cycle counts, per spec.md §4.D.
pub fn cycles_to_us(cycles: u64, freq_hz: u64) -> u64 {
    let freq_mhz = (freq_hz / 1_000_000).max(1);
    cycles / freq_mhz
}

/// Read the current cycle counter converted to microseconds, using the
/// calibrated frequency. Returns `None` before calibration has run.
pub fn read_us(read_cycles: impl FnOnce() -> u64) -> Option<u64> {
    STATE.with(|s| cycles_to_us(read_cycles(), s.freq_hz))
}

/// Increment the monotonic tick counter. Called once per timer interrupt.
pub fn tick() {
    STATE.with_mut(|s| s.ticks += 1);
}

/// Current tick count since [`set_calibrated_frequency`], or 0 before then.
pub fn ticks() -> u64 {
    STATE.with(|s| s.ticks).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    /// Scripted clock: cycles advance by a fixed step each read; the PIT
    /// counter counts down from `reload` by `step_counts` each read,
    /// wrapping when it would go below zero.
    struct FakeClock {
        reload: u16,
        cycles: Cell<u64>,
        counter: Cell<u16>,
        cycles_per_read: u64,
        counts_per_read: u16,
    }

    impl HardwareClock for FakeClock {
        fn read_cycles(&self) -> u64 {
            let c = self.cycles.get();
            self.cycles.set(c + self.cycles_per_read);
            c
        }

        fn read_pit_remaining(&self) -> u16 {
            let cur = self.counter.get();
            let next = if cur >= self.counts_per_read {
                cur - self.counts_per_read
            } else {
                self.reload - (self.counts_per_read - cur)
            };
            self.counter.set(next);
            cur
        }
    }

    #[test]
    fn calibrate_computes_expected_frequency() {
        // PIT reload for ~1000 Hz ticks; 1193182/1000 ~= 1193.
        let reload = 1193u16;
        // Simulate a ~1 GHz TSC: 1_000_000 cycles per 1193 PIT counts read.
        let clock = FakeClock {
            reload,
            cycles: Cell::new(0),
            counter: Cell::new(reload),
            cycles_per_read: 1_000_000,
            counts_per_read: 1193,
        };
        let freq = calibrate(&clock, reload, 5).unwrap();
        assert!((MIN_SANE_HZ..=MAX_SANE_HZ).contains(&freq));
    }

    #[test]
    fn calibrate_rejects_out_of_band_frequency() {
        let reload = 1193u16;
        let clock = FakeClock {
            reload,
            cycles: Cell::new(0),
            counter: Cell::new(reload),
            cycles_per_read: 1, // absurdly slow: way below MIN_SANE_HZ
            counts_per_read: 1193,
        };
        assert!(calibrate(&clock, reload, 5).is_err());
    }

    #[test]
    fn cycles_to_us_matches_known_ratio() {
        // 2 GHz clock, 2_000_000_000 cycles ⇒ 1_000_000 us (1 second).
        assert_eq!(cycles_to_us(2_000_000_000, 2_000_000_000), 1_000_000);
    }

    #[test]
    fn tick_is_monotonic() {
        set_calibrated_frequency(1_000_000_000);
        let before = ticks();
        tick();
        tick();
        assert_eq!(ticks(), before + 2);
    }
}
