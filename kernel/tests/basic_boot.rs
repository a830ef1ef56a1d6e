//! Boots the kernel through the full bring-up sequence (spec.md §4.H) and
//! checks that the baseline subsystems it leaves behind look sane: the
//! frame allocator found usable memory, the scheduler is ticking, and the
//! task it was asked to run actually got scheduled.
#![no_std]
#![no_main]

use core::arch::global_asm;

use ia32_kernel::bootstrap::InitialTask;
use ia32_kernel::{mm::frame_allocator, sched};

#[path = "common/mod.rs"]
mod common;

// Multiboot v1 header, a 64 KiB bring-up stack, and the real-mode-free
// entry stub, same as `ia32-kernel`'s own `main.rs` — this binary boots
// exactly the way production does.
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
    static __kernel_start: u8;
    static __kernel_end: u8;
}

extern "C" fn check_alive(_arg: u32) {
    let stats = frame_allocator::stats();
    if stats.total == 0 {
        common::fail("frame allocator reports zero total frames");
    }
    if stats.free == 0 {
        common::fail("frame allocator reports zero free frames");
    }
    if sched::current().is_none() {
        common::fail("no current task after bring-up");
    }
    common::pass();
}

#[no_mangle]
extern "C" fn kernel_main(multiboot_magic: u32, multiboot_info_addr: u32) -> ! {
    // SAFETY: linker-provided bounds symbols; only their address is taken.
    let kernel_start = unsafe { core::ptr::addr_of!(__kernel_start) as u32 };
    let kernel_end = unsafe { core::ptr::addr_of!(__kernel_end) as u32 };

    let tasks = [InitialTask {
        entry: check_alive,
        arg: 0,
        priority: 128,
        name: "check_alive",
    }];

    common::run(
        "basic_boot",
        multiboot_magic,
        multiboot_info_addr,
        kernel_start,
        kernel_end,
        &tasks,
    );
}
