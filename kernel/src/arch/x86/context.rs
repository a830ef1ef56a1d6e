//! Dual-mode context switch (spec.md §4.E).
//!
//! Two paths, selected by matching on the incoming task's [`Context`] tag
//! rather than inspecting CS privilege bits at the call site: a hot
//! kernel→kernel register/stack swap, and a kernel→user path that builds a
//! hardware interrupt-return frame and executes a privilege-return
//! instruction.
//!
//! Nothing here is pure, host-testable logic — every item touches real
//! registers — so the whole module is gated to the bare-metal target.
#![cfg(target_os = "none")]

use crate::task::{Context, Task, UserContext};
use core::arch::asm;
use core::ptr::NonNull;

/// Save `outgoing`'s callee-saved registers and stack pointer, restore
/// `incoming`'s, and jump to it. `outgoing`/`incoming` point at the four
/// `u32` fields `(ebx, esi, edi, ebp)` followed by `esp`, matching
/// [`crate::task::KernelContext`]'s layout.
///
/// The "instruction pointer" for the incoming side is not a field here: it
/// is whatever value sits at the top of its saved stack, placed there
/// either by [`crate::task::create_kernel_task`]'s synthetic frame (first
/// run) or by this very function's save half on a prior switch (the
/// return address of the call that led here). The final `ret` pops and
/// jumps to it.
///
/// # Safety
/// Both pointers must reference five contiguous, live `u32` slots; this
/// must run with interrupts disabled and on the outgoing task's own stack.
#[no_mangle]
unsafe extern "C" fn raw_kernel_switch(outgoing: *mut u32, incoming: *const u32) {
    // SAFETY: forwarded from this function's contract. Saves ebx/esi/edi/
    // ebp/esp into `outgoing`'s five-word slot; `esp` here is captured
    // before this block performs any stack-affecting instruction
    // (`options(nostack)`), so it equals the value the caller's `ret` will
    // restore to on the next switch back into this task.
    unsafe {
        asm!(
            "mov [eax + 0x00], ebx",
            "mov [eax + 0x04], esi",
            "mov [eax + 0x08], edi",
            "mov [eax + 0x0C], ebp",
            "mov [eax + 0x10], esp",
            in("eax") outgoing,
            options(nostack, preserves_flags),
        );
    }
    // SAFETY: forwarded from this function's contract. Restores the
    // incoming registers and stack pointer, then `ret`s into whatever
    // instruction pointer sits at the top of that stack.
    unsafe {
        asm!(
            "mov ebx, [eax + 0x00]",
            "mov esi, [eax + 0x04]",
            "mov edi, [eax + 0x08]",
            "mov ebp, [eax + 0x0C]",
            "mov esp, [eax + 0x10]",
            "ret",
            in("eax") incoming,
            options(noreturn),
        );
    }
}

/// Build an `iret` frame from `uc` on `uc.kernel_esp` and transfer control
/// to ring 3. Never returns to its caller; control resumes at `uc.eip` in
/// user mode.
///
/// # Safety
/// `uc.kernel_esp` must be the top of a valid, currently-unused kernel
/// stack for the target task; the target address space must already be
/// loaded into CR3.
unsafe fn enter_user(uc: &UserContext) -> ! {
    // SAFETY: forwarded from this function's contract. Switches onto the
    // incoming task's kernel stack, reloads data-segment registers to the
    // user selector (permitted: DPL 3 loaded while CPL is still 0), builds
    // the five-word hardware interrupt-return frame in the hardware's
    // required order (SS, ESP, EFLAGS, CS, EIP pushed high-to-low so EIP
    // is popped first), and executes `iret`.
    unsafe {
        asm!(
            "mov esp, {kernel_esp}",
            "mov ax, {user_ds:x}",
            "mov ds, ax",
            "mov es, ax",
            "mov fs, ax",
            "mov gs, ax",
            "push {user_ss:e}",
            "push {user_esp}",
            "push {eflags}",
            "push {user_cs:e}",
            "push {eip}",
            "iretd",
            kernel_esp = in(reg) uc.kernel_esp,
            user_ds = in(reg) uc.ds,
            user_ss = in(reg) uc.ss as u32,
            user_esp = in(reg) uc.user_esp,
            eflags = in(reg) uc.eflags,
            user_cs = in(reg) uc.cs as u32,
            eip = in(reg) uc.eip,
            options(noreturn),
        );
    }
}

/// Switch from `outgoing` to `incoming`. Must run with interrupts
/// disabled, from `outgoing`'s own stack (spec.md §4.E invariants).
///
/// Loads the incoming task's address space (if any) and updates the TSS
/// ring-0 stack pointer before touching any register, satisfying spec.md
/// §4.E's ordering invariants: the target's address space is never
/// unloaded, and `esp0` is set before a switch that may later return to
/// user mode.
///
/// # Safety
/// Both pointers must reference live tasks; `incoming` must differ from
/// `outgoing`.
pub unsafe fn switch(mut outgoing: NonNull<Task>, incoming: NonNull<Task>) {
    // SAFETY: `incoming` is a live task per this function's contract.
    let incoming_context = unsafe { incoming.as_ref().context };
    // SAFETY: `incoming` is a live task.
    let incoming_space = unsafe { incoming.as_ref().address_space };
    // SAFETY: `incoming` is a live task.
    let incoming_stack_top = unsafe { incoming.as_ref().kernel_stack_top() };

    if let Some(space) = incoming_space {
        crate::mm::vmm::switch_to(space);
    }
    let esp0 = match incoming_context {
        Context::User(ref uc) => uc.kernel_esp,
        Context::Kernel(_) => incoming_stack_top,
    };
    super::gdt::set_kernel_stack(esp0);

    match incoming_context {
        Context::Kernel(ref kc) => {
            // SAFETY: `outgoing` is a live task; only its own
            // `KernelContext` slot is written, and only when that is how
            // it expects to be resumed. A task currently tagged `User` was
            // already saved by the trap path that brought us here.
            unsafe {
                if let Context::Kernel(ref mut out_kc) = outgoing.as_mut().context {
                    raw_kernel_switch(
                        out_kc as *mut _ as *mut u32,
                        kc as *const _ as *const u32,
                    );
                } else {
                    // Outgoing has no kernel-resumable slot to save into;
                    // still must load the incoming registers and jump.
                    let mut scratch = [0u32; 5];
                    raw_kernel_switch(scratch.as_mut_ptr(), kc as *const _ as *const u32);
                }
            }
        }
        Context::User(ref uc) => {
            // SAFETY: `outgoing` is a live task; same reasoning as above.
            unsafe {
                if let Context::Kernel(ref mut out_kc) = outgoing.as_mut().context {
                    // Saving-only half: capture outgoing's registers, then
                    // fall through to the user entry below instead of
                    // `ret`-ing back into kernel code.
                    save_kernel_regs_only(out_kc as *mut _ as *mut u32);
                }
                enter_user(uc);
            }
        }
    }
}

/// Save-only half of [`raw_kernel_switch`], used when the incoming side
/// takes the `iret` path instead of `ret`.
///
/// # Safety
/// `outgoing` must reference five contiguous, live `u32` slots.
#[no_mangle]
unsafe extern "C" fn save_kernel_regs_only(outgoing: *mut u32) {
    // SAFETY: forwarded from this function's contract.
    unsafe {
        asm!(
            "mov [eax + 0x00], ebx",
            "mov [eax + 0x04], esi",
            "mov [eax + 0x08], edi",
            "mov [eax + 0x0C], ebp",
            "mov [eax + 0x10], esp",
            in("eax") outgoing,
            options(nostack, preserves_flags),
        );
    }
}
