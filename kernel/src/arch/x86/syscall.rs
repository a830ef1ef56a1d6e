//! `int 0x80` trampoline (spec.md §4.G, §6).
//!
//! Entry is exclusively via the DPL-3 interrupt gate [`super::idt::SYSCALL_VECTOR`]
//! installed by [`super::idt::init`]. The CPU has already switched to the
//! incoming task's ring-0 stack (via the TSS `esp0` the scheduler keeps
//! current) and pushed the five-word privilege-change frame
//! (`SS, ESP, EFLAGS, CS, EIP`, low-to-high) before this code runs.
//!
//! [`syscall_entry`] is a naked function: no Rust prologue runs, so it is
//! solely responsible for saving every register it touches and restoring
//! them before `iretd`. It hands off to [`syscall_trampoline`], an ordinary
//! `extern "C"` function, for the actual dispatch call.
#![cfg(target_os = "none")]

use core::arch::naked_asm;

/// Read the five argument/number words `syscall_entry` saved and invoke
/// [`crate::syscall::dispatch`], writing the result back through the same
/// pointer so the naked trampoline can pop it straight into EAX.
///
/// `regs` points at fifteen contiguous `u32` words: the six ABI words in
/// order (`eax` syscall number, `ebx`, `ecx`, `edx`, `esi`, `edi`), the four
/// saved segment registers (`gs`, `fs`, `es`, `ds`), and the five-word
/// hardware privilege-change frame (`eip`, `cs`, `eflags`, `user_esp`, `ss`)
/// the CPU pushed on entry, all at the fixed offsets `syscall_entry` lays
/// them out at.
///
/// # Safety
/// `regs` must point at fifteen live, contiguous `u32` slots; only
/// [`syscall_entry`] calls this.
unsafe extern "C" fn syscall_trampoline(regs: *mut u32) {
    // SAFETY: forwarded from this function's contract.
    let (num, a0, a1, a2, a3, a4) = unsafe {
        (
            *regs,
            *regs.add(1),
            *regs.add(2),
            *regs.add(3),
            *regs.add(4),
            *regs.add(5),
        )
    };
    // SAFETY: offsets 10/12/13 are `eip`/`eflags`/`user_esp` in the layout
    // documented above.
    let (eip, eflags, user_esp) = unsafe { (*regs.add(10), *regs.add(12), *regs.add(13)) };
    crate::sched::capture_user_trap(eip, user_esp, eflags);

    let result = crate::syscall::dispatch(num, a0, a1, a2, a3, a4);
    // SAFETY: forwarded from this function's contract.
    unsafe {
        *regs = result as u32;
    }

    // Safe point: "on syscall return" (spec.md §5).
    crate::sched::reschedule_if_needed();
}

/// The `int 0x80` gate target. Saves segment and general-purpose registers,
/// reloads the kernel data selector, calls [`syscall_trampoline`], restores
/// everything, and returns to ring 3 via `iretd`.
///
/// # Safety
/// Must only be reached via the DPL-3 interrupt gate at
/// [`super::idt::SYSCALL_VECTOR`]; never call this directly.
#[naked]
unsafe extern "C" fn syscall_entry() {
    naked_asm!(
        "push ds",
        "push es",
        "push fs",
        "push gs",
        "mov ax, {kernel_data}",
        "mov ds, ax",
        "mov es, ax",
        "mov fs, ax",
        "mov gs, ax",
        "push edi",
        "push esi",
        "push edx",
        "push ecx",
        "push ebx",
        "push eax",
        "mov eax, esp",
        "push eax",
        "call {trampoline}",
        "add esp, 4",
        "pop eax",
        "pop ebx",
        "pop ecx",
        "pop edx",
        "pop esi",
        "pop edi",
        "pop gs",
        "pop fs",
        "pop es",
        "pop ds",
        "iretd",
        kernel_data = const super::gdt::KERNEL_DATA_SELECTOR,
        trampoline = sym syscall_trampoline,
    );
}

/// Address to install at [`super::idt::SYSCALL_VECTOR`] during bring-up
/// step 2 (spec.md §4.H).
pub fn entry_address() -> u32 {
    syscall_entry as usize as u32
}
