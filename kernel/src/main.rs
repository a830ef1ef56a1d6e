//! Binary entry point: multiboot v1 header, `_start` stub, and the initial
//! workload handed to [`ia32_kernel::bootstrap::bring_up`].
#![no_std]
#![no_main]

use core::arch::global_asm;

use ia32_kernel::bootstrap::{self, InitialTask};
use ia32_kernel::{logging, sched};

// Multiboot v1 header (spec.md §4.A "boot descriptor"), a fixed 64 KiB
// bring-up stack, and the real-mode-free entry stub: GRUB leaves EAX =
// magic and EBX = info pointer with no valid stack, so the stub must set
// one up before calling into Rust. Inline rather than a separate `.S` file
// assembled at build time, matching this crate's other raw entry points
// (`arch::x86::syscall::syscall_entry`, `arch::x86::interrupt::timer_entry`).
global_asm!(
    r#"
.section .multiboot_header, "a"
.align 4
    .long 0x1BADB002
    .long 0x00000003
    .long -(0x1BADB002 + 0x00000003)

.section .bss
.align 16
boot_stack_bottom:
    .skip 65536
boot_stack_top:

.section .text
.global _start
.type _start, @function
_start:
    mov esp, offset boot_stack_top
    push ebx
    push eax
    call kernel_main
.Lhang:
    hlt
    jmp .Lhang
"#
);

extern "C" {
    /// Start of the kernel image, from `link.ld`.
    static __kernel_start: u8;
    /// End of the kernel image's `.bss`, from `link.ld`.
    static __kernel_end: u8;
}

/// Demo initial task: proves the scheduler and `yield` path work by
/// cooperatively yielding in a loop. The spec names no embedded workload of
/// its own; a real deployment replaces this with whatever user/kernel tasks
/// it needs.
extern "C" fn heartbeat_task(_arg: u32) {
    loop {
        log::info!(target: "heartbeat", "tick {}", sched::ticks());
        sched::yield_now();
    }
}

#[no_mangle]
extern "C" fn kernel_main(multiboot_magic: u32, multiboot_info_addr: u32) -> ! {
    logging::init(log::LevelFilter::Info);
    log::info!(target: "boot", "ia32-kernel starting");

    // SAFETY: `__kernel_start`/`__kernel_end` are linker-provided symbols;
    // taking their address (never dereferencing them) is always sound.
    let kernel_start = unsafe { core::ptr::addr_of!(__kernel_start) as u32 };
    let kernel_end = unsafe { core::ptr::addr_of!(__kernel_end) as u32 };

    let initial_tasks = [InitialTask {
        entry: heartbeat_task,
        arg: 0,
        priority: 128,
        name: "heartbeat",
    }];

    // SAFETY: called exactly once, from `_start`, before any other kernel
    // code; `multiboot_magic`/`multiboot_info_addr` are the values GRUB left
    // in EAX/EBX, forwarded unmodified by the entry stub above.
    unsafe {
        bootstrap::bring_up(
            multiboot_magic,
            multiboot_info_addr,
            kernel_start,
            kernel_end,
            &initial_tasks,
        );
    }
}
