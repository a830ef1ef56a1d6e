//! Component G integration test: issues `int 0x80` directly (spec.md §4.G,
//! §6 ABI) and checks the dispatch results, rather than going through the
//! pure host-testable `syscall::dispatch` path the in-crate unit tests
//! already cover — this is the one surface that needs the real IDT gate,
//! TSS, and trampoline wired up.
#![no_std]
#![no_main]

use core::arch::{asm, global_asm};

use ia32_kernel::bootstrap::InitialTask;
use ia32_kernel::syscall::{SYS_GETPID, SYS_YIELD};

#[path = "common/mod.rs"]
mod common;

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

/// `int 0x80` with `number` in EAX and no arguments, returning whatever the
/// dispatcher left in EAX.
fn int80(number: u32) -> i32 {
    let result: i32;
    // SAFETY: the DPL-3 gate at vector 0x80 accepts a software `int` from
    // any CPL, and `syscall_entry` preserves every register it doesn't use
    // to carry arguments/return values.
    unsafe {
        asm!(
            "int 0x80",
            inout("eax") number => result,
            in("ebx") 0u32,
            in("ecx") 0u32,
            in("edx") 0u32,
            in("esi") 0u32,
            in("edi") 0u32,
        );
    }
    result
}

extern "C" fn run_syscalls(_arg: u32) {
    let pid = int80(SYS_GETPID);
    if pid < 0 {
        common::fail("getpid returned a negative pid");
    }

    let current_id = match ia32_kernel::sched::current() {
        // SAFETY: `current()` always hands back a live task.
        Some(task) => unsafe { task.as_ref().id as i32 },
        None => common::fail("no current task while running a syscall test"),
    };
    if pid != current_id {
        common::fail("getpid did not match the running task's id");
    }

    // Unregistered syscall number: ENOSYS, not a crash.
    let unknown = int80(200);
    if unknown >= 0 {
        common::fail("unregistered syscall number did not return an error");
    }

    // yield() must return 0 and must not have corrupted the register it
    // shares storage with (EAX holds the syscall number going in, the
    // result coming out).
    let yield_result = int80(SYS_YIELD);
    if yield_result != 0 {
        common::fail("yield() returned a nonzero result");
    }

    common::pass();
}

#[no_mangle]
extern "C" fn kernel_main(multiboot_magic: u32, multiboot_info_addr: u32) -> ! {
    // SAFETY: linker-provided bounds symbols; only their address is taken.
    let kernel_start = unsafe { core::ptr::addr_of!(__kernel_start) as u32 };
    let kernel_end = unsafe { core::ptr::addr_of!(__kernel_end) as u32 };

    let tasks = [InitialTask {
        entry: run_syscalls,
        arg: 0,
        priority: 128,
        name: "run_syscalls",
    }];

    common::run(
        "syscall_tests",
        multiboot_magic,
        multiboot_info_addr,
        kernel_start,
        kernel_end,
        &tasks,
    );
}
