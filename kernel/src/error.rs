//! Kernel error types (spec.md §7).
//!
//! One variant per failure class this crate's components actually raise.
//! Fatal classes are promoted to [`crate::panic::kernel_panic`] by their
//! callers; non-fatal classes surface through a sentinel at the ABI boundary
//! the spec already defines for that operation (`Option::None`, a negative
//! errno). Silent-recovery conditions (e.g. a spurious IRQ) are handled in
//! place and never constructed as a `KernelError` at all.

use core::fmt;

/// Kernel-wide error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "kernel errors must be handled, not silently discarded"]
pub enum KernelError {
    /// Frame allocator exhausted (§4.A).
    OutOfMemory { requested: usize, available: usize },
    /// Address was not frame/page-aligned, or outside the physical range
    /// described by the multiboot memory map.
    InvalidAddress { addr: u32 },
    /// `vmm::unmap`/`translate` targeted an address with no mapping.
    UnmappedMemory { addr: u32 },
    /// A subsystem was used before its `init()` ran (§9 lifecycle).
    NotInitialized { subsystem: &'static str },
    /// A structural invariant (bitmap/ready-queue/free-list consistency)
    /// was violated. Only ever raised in debug builds; release builds treat
    /// the condition as `unreachable!` per spec.md §7.
    InvariantViolated { what: &'static str },
    /// TSC calibration produced a frequency outside [100 MHz, 10 GHz]
    /// (§4.D).
    CalibrationOutOfRange { measured_hz: u64 },
    /// A CPU exception reached the dispatcher with no registered handler
    /// for its vector.
    UnhandledException { vector: u8 },
    /// Generic invalid-argument case for operations with no more specific
    /// variant above.
    InvalidArgument { name: &'static str },
}

/// Result alias for kernel operations that can fail.
pub type KernelResult<T> = Result<T, KernelError>;

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory {
                requested,
                available,
            } => write!(
                f,
                "out of memory: requested {requested} frame(s), {available} available"
            ),
            Self::InvalidAddress { addr } => write!(f, "invalid address: {addr:#x}"),
            Self::UnmappedMemory { addr } => write!(f, "unmapped memory at {addr:#x}"),
            Self::NotInitialized { subsystem } => {
                write!(f, "subsystem not initialized: {subsystem}")
            }
            Self::InvariantViolated { what } => write!(f, "invariant violated: {what}"),
            Self::CalibrationOutOfRange { measured_hz } => {
                write!(f, "timer calibration out of range: {measured_hz} Hz")
            }
            Self::UnhandledException { vector } => {
                write!(f, "unhandled exception: vector {vector}")
            }
            Self::InvalidArgument { name } => write!(f, "invalid argument: {name}"),
        }
    }
}

/// Syscall errno constants (§4.G/§6). Kept here rather than in `syscall` so
/// this module stays the crate's single source of error vocabulary.
pub mod errno {
    /// No such syscall number.
    pub const ENOSYS: isize = -38;
}

/// Helper macro for constructing a [`KernelError`] with named fields,
/// mirroring ordinary struct-variant construction but usable with `?` call
/// sites that want a one-line error.
#[macro_export]
macro_rules! kernel_error {
    (OutOfMemory { requested: $req:expr, available: $avail:expr }) => {
        $crate::error::KernelError::OutOfMemory {
            requested: $req,
            available: $avail,
        }
    };
    (InvalidAddress { addr: $addr:expr }) => {
        $crate::error::KernelError::InvalidAddress { addr: $addr }
    };
    ($variant:ident) => {
        $crate::error::KernelError::$variant
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_enosys_is_minus_38() {
        assert_eq!(errno::ENOSYS, -38);
    }

    #[test]
    fn display_formats_out_of_memory() {
        use core::fmt::Write;

        struct Buf {
            data: [u8; 64],
            len: usize,
        }
        impl Write for Buf {
            fn write_str(&mut self, s: &str) -> fmt::Result {
                let bytes = s.as_bytes();
                self.data[self.len..self.len + bytes.len()].copy_from_slice(bytes);
                self.len += bytes.len();
                Ok(())
            }
        }

        let mut buf = Buf {
            data: [0; 64],
            len: 0,
        };
        let err = KernelError::OutOfMemory {
            requested: 4,
            available: 0,
        };
        write!(buf, "{err}").unwrap();
        let s = core::str::from_utf8(&buf.data[..buf.len]).unwrap();
        assert_eq!(s, "out of memory: requested 4 frame(s), 0 available");
    }

    #[test]
    fn macro_builds_variant() {
        let e = kernel_error!(InvalidAddress { addr: 0x1000 });
        assert_eq!(e, KernelError::InvalidAddress { addr: 0x1000 });
    }
}
