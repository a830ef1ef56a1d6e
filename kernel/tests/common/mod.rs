//! Shared bring-up and pass/fail reporting for the `harness = false`
//! integration tests in this directory. Each test binary supplies its own
//! multiboot header/`_start` stub (it must live in that binary's own
//! `.text`) and its own initial task bodies, then hands both to [`run`].
#![cfg(target_os = "none")]

use ia32_kernel::bootstrap::InitialTask;
use ia32_kernel::qemu::{self, QemuExitCode};

/// Run bring-up with `tasks` as the initial workload. Never returns.
pub fn run(
    name: &'static str,
    multiboot_magic: u32,
    multiboot_info_addr: u32,
    kernel_start: u32,
    kernel_end: u32,
    tasks: &[InitialTask],
) -> ! {
    ia32_kernel::logging::init(log::LevelFilter::Info);
    log::info!(target: "test", "{name}: booting");

    // SAFETY: called once, from this binary's own `_start`, before any
    // other kernel code — the same contract the `ia32-kernel` binary's
    // `main.rs` satisfies.
    unsafe {
        ia32_kernel::bootstrap::bring_up(
            multiboot_magic,
            multiboot_info_addr,
            kernel_start,
            kernel_end,
            tasks,
        );
    }
}

pub fn pass() -> ! {
    log::info!(target: "test", "PASS");
    qemu::exit(QemuExitCode::Success)
}

pub fn fail(reason: &str) -> ! {
    log::error!(target: "test", "FAIL: {reason}");
    qemu::exit(QemuExitCode::Failed)
}
