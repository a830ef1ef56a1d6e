//! Raw interrupt entry stubs: the timer IRQ, the 32 CPU exception vectors,
//! and the shared default for everything else (spec.md §4.C, §4.D, §7).
//!
//! Each stub is a naked function reached directly from the IDT; none of them
//! assume a Rust calling convention on entry, so each is responsible for
//! saving what it touches. The CPU exception stubs never return (spec.md §7:
//! an unhandled exception is always fatal), which sidesteps the awkward
//! question of how many words the hardware pushed for a given vector (some
//! push an error code, most don't) — nothing here needs to pop back past
//! that frame.
#![cfg(target_os = "none")]

use core::arch::naked_asm;

/// Saves segment + general-purpose registers, reloads the kernel data
/// selector, calls [`timer_isr_trampoline`], restores everything, and
/// returns via `iretd`. Mirrors [`super::syscall::syscall_entry`]'s layout
/// exactly, since both need the same fifteen-word save area to locate the
/// hardware frame underneath it.
///
/// # Safety
/// Must only be reached via the IDT's [`super::idt::TIMER_VECTOR`] gate.
#[naked]
unsafe extern "C" fn timer_entry() {
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
        trampoline = sym timer_isr_trampoline,
    );
}

/// Normal-ABI half of the timer handler: refresh the trapped task's resume
/// point (meaningful only if it was running in user mode — see
/// [`crate::sched::capture_user_trap`]), run the tick accounting and send
/// EOI, then reschedule if flagged. The "just before interrupt return" safe
/// point spec.md §5 names.
///
/// # Safety
/// `regs` must point at the same fifteen-word layout
/// [`super::syscall::syscall_trampoline`] documents; only [`timer_entry`]
/// calls this.
unsafe extern "C" fn timer_isr_trampoline(regs: *mut u32) {
    // SAFETY: offsets 10/12/13 are `eip`/`eflags`/`user_esp`, matching
    // `timer_entry`'s push order.
    let (eip, eflags, user_esp) = unsafe { (*regs.add(10), *regs.add(12), *regs.add(13)) };
    crate::sched::capture_user_trap(eip, user_esp, eflags);

    // SAFETY: called from the timer IRQ trampoline, as this function's
    // contract requires.
    unsafe {
        super::timer::on_tick();
    }

    crate::sched::reschedule_if_needed();
}

/// One of the 32 CPU exception vectors: pushes its own vector number and
/// jumps to the shared fatal path. Never returns.
macro_rules! exception_stub {
    ($name:ident, $vector:expr) => {
        #[naked]
        unsafe extern "C" fn $name() {
            naked_asm!(
                "push {vector}",
                "call {handler}",
                "2:",
                "hlt",
                "jmp 2b",
                vector = const $vector,
                handler = sym common_exception_entry,
            );
        }
    };
}

exception_stub!(exc_00, 0u32);
exception_stub!(exc_01, 1u32);
exception_stub!(exc_02, 2u32);
exception_stub!(exc_03, 3u32);
exception_stub!(exc_04, 4u32);
exception_stub!(exc_05, 5u32);
exception_stub!(exc_06, 6u32);
exception_stub!(exc_07, 7u32);
exception_stub!(exc_08, 8u32);
exception_stub!(exc_09, 9u32);
exception_stub!(exc_10, 10u32);
exception_stub!(exc_11, 11u32);
exception_stub!(exc_12, 12u32);
exception_stub!(exc_13, 13u32);
exception_stub!(exc_14, 14u32);
exception_stub!(exc_15, 15u32);
exception_stub!(exc_16, 16u32);
exception_stub!(exc_17, 17u32);
exception_stub!(exc_18, 18u32);
exception_stub!(exc_19, 19u32);
exception_stub!(exc_20, 20u32);
exception_stub!(exc_21, 21u32);
exception_stub!(exc_22, 22u32);
exception_stub!(exc_23, 23u32);
exception_stub!(exc_24, 24u32);
exception_stub!(exc_25, 25u32);
exception_stub!(exc_26, 26u32);
exception_stub!(exc_27, 27u32);
exception_stub!(exc_28, 28u32);
exception_stub!(exc_29, 29u32);
exception_stub!(exc_30, 30u32);
exception_stub!(exc_31, 31u32);

const EXCEPTION_STUBS: [unsafe extern "C" fn(); 32] = [
    exc_00, exc_01, exc_02, exc_03, exc_04, exc_05, exc_06, exc_07, exc_08, exc_09, exc_10, exc_11,
    exc_12, exc_13, exc_14, exc_15, exc_16, exc_17, exc_18, exc_19, exc_20, exc_21, exc_22, exc_23,
    exc_24, exc_25, exc_26, exc_27, exc_28, exc_29, exc_30, exc_31,
];

/// Used as the default handler for every vector not otherwise installed:
/// the 32 CPU exceptions get their own numbered stub above (installed over
/// this default during bring-up), and any of the remaining software/IRQ
/// vectors that fires unexpectedly falls back to this, reported as vector
/// `0xFF` since no stub pushed a real one for it.
#[naked]
unsafe extern "C" fn spurious_entry() {
    naked_asm!(
        "push {vector}",
        "call {handler}",
        "2:",
        "hlt",
        "jmp 2b",
        vector = const 0xFFu32,
        handler = sym common_exception_entry,
    );
}

/// Shared fatal path for every exception stub: `vector` arrives as a plain
/// cdecl argument (the stub pushed it immediately before `call`). Never
/// returns.
extern "C" fn common_exception_entry(vector: u32) -> ! {
    crate::panic::fatal_exception(vector)
}

/// Address of the shared default handler, installed at every vector by
/// [`super::idt::init`] before exception-specific and the timer/syscall
/// vectors overwrite their own slots (bring-up step 2, spec.md §4.H).
pub fn default_handler_address() -> u32 {
    spurious_entry as usize as u32
}

/// Address of the timer IRQ handler, installed at
/// [`super::idt::TIMER_VECTOR`] during bring-up step 2.
pub fn timer_handler_address() -> u32 {
    timer_entry as usize as u32
}

/// Overwrite the 32 CPU exception vectors with their numbered stubs.
/// Must run after [`super::idt::init`] (bring-up step 2, spec.md §4.H).
///
/// # Safety
/// Same as [`super::idt::install`]: must not run concurrently with another
/// IDT mutator.
pub unsafe fn install_exception_vectors() {
    for (vector, stub) in EXCEPTION_STUBS.iter().enumerate() {
        // SAFETY: forwarded from this function's contract.
        unsafe {
            super::idt::install(vector as u8, *stub as usize as u32);
        }
    }
}
