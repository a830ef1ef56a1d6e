//! QEMU `isa-debug-exit` device support, used by the `tests/` integration
//! binaries to report a pass/fail result back to the host instead of
//! spinning forever. Not part of the kernel's own boot path, but not
//! feature-gated either — the `ia32-kernel` binary simply never calls
//! [`exit`].

/// Exit code written to the `isa-debug-exit` port. QEMU reports
/// `(code << 1) | 1` as its process exit status, so these values don't need
/// to mean anything beyond "zero vs. nonzero" to the test harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum QemuExitCode {
    Success = 0x10,
    Failed = 0x11,
}

const ISA_DEBUG_EXIT_PORT: u16 = 0xf4;

/// Write `code` to the `isa-debug-exit` port, which halts the QEMU process.
/// Never returns.
#[cfg(target_os = "none")]
pub fn exit(code: QemuExitCode) -> ! {
    // SAFETY: 0xf4 is the `isa-debug-exit` port configured on the QEMU
    // machine these tests boot under (`-device isa-debug-exit,iobase=0xf4`);
    // writing to it is this device's documented exit mechanism and does not
    // return.
    unsafe {
        crate::arch::x86::outl(ISA_DEBUG_EXIT_PORT, code as u32);
    }
    // QEMU has already terminated the process by the time this would run.
    crate::arch::x86::halt();
}
