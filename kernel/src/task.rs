//! Component E: task control block, lifecycle, and synthetic activation
//! frames (spec.md §4.E).
//!
//! Tasks are linked intrusively: [`Task::prev`]/[`Task::next`] are raw
//! `NonNull<Task>` fields rather than a fixed-capacity array slot, per
//! spec.md §9's design note. Only [`crate::sched`] walks those links;
//! everything else reaches a task through the `NonNull<Task>` handle
//! creation hands back.

use crate::console::copy_str_bounded;
use crate::error::KernelError;
use crate::mm::{frame_allocator, vmm, FRAME_SIZE};
use core::ptr::NonNull;

/// Fixed kernel stack size. One frame, no guard page below it — an
/// explicit open-question decision (spec.md §9): deep call chains may
/// silently corrupt adjacent memory.
pub const KERNEL_STACK_SIZE: usize = FRAME_SIZE;

/// Fixed address user code is mapped at (spec.md §4.E, §6).
pub const USER_CODE_BASE: u32 = 0x0040_0000;
/// Top of the user stack, which grows down from here (spec.md §6).
pub const USER_STACK_TOP: u32 = 0xC000_0000;

const EFLAGS_IF: u32 = 1 << 9;

/// Lifecycle state (spec.md §3): `allocated → ready (enqueued) → running →
/// (blocked | ready | zombie) → destroyed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Ready,
    Running,
    Blocked,
    Zombie,
}

const NAME_CAP: usize = 16;

/// Saved CPU context, tagged by privilege level rather than inspected via
/// bit tests at every switch site (spec.md §9 design note).
#[derive(Debug, Clone, Copy)]
pub enum Context {
    /// Target runs at ring 0: a hot jump-based restore, no privilege
    /// transition.
    Kernel(KernelContext),
    /// Target runs at ring 3: the switch builds a hardware interrupt-return
    /// frame from these fields and executes `iret`.
    User(UserContext),
}

/// Saved kernel-mode registers. `esp` points at the top of a synthetic or
/// previously-saved stack frame; `ebx`/`esi`/`edi`/`ebp` are the
/// callee-saved GPRs the cdecl ABI requires a switch to preserve.
#[derive(Debug, Clone, Copy, Default)]
pub struct KernelContext {
    pub esp: u32,
    pub ebx: u32,
    pub esi: u32,
    pub edi: u32,
    pub ebp: u32,
}

/// Saved user-mode registers, built into an `iret` frame at switch time.
#[derive(Debug, Clone, Copy)]
pub struct UserContext {
    pub eip: u32,
    pub user_esp: u32,
    pub eflags: u32,
    pub cs: u16,
    pub ds: u16,
    pub ss: u16,
    /// Kernel stack pointer to load into ESP before building the `iret`
    /// frame; also the value installed into the TSS's `esp0` before this
    /// task may next take an interrupt in user mode.
    pub kernel_esp: u32,
}

/// Task control block (spec.md §3).
pub struct Task {
    pub id: u32,
    pub(crate) name: [u8; NAME_CAP],
    pub(crate) name_len: u8,
    pub state: TaskState,
    pub priority: u8,
    pub context: Context,
    pub address_space: Option<vmm::AddressSpace>,
    pub(crate) kernel_stack_addr: u32,
    pub cpu_ticks: u64,
    pub last_run_tick: u64,
    pub exit_code: i32,
    pub prev: Option<NonNull<Task>>,
    pub next: Option<NonNull<Task>>,
}

impl Task {
    pub fn name(&self) -> &str {
        core::str::from_utf8(&self.name[..self.name_len as usize]).unwrap_or("")
    }

    pub fn kernel_stack_top(&self) -> u32 {
        self.kernel_stack_addr + KERNEL_STACK_SIZE as u32
    }
}

/// Build the synthetic kernel-stack frame spec.md §4.E step 3 describes: a
/// trampoline call as if `trampoline(entry, arg)` had just been invoked via
/// `call` — argument slots above a return-address slot, cdecl order.
/// Returns the resulting stack pointer.
fn build_kernel_entry_frame(stack_top: u32, trampoline: u32, entry: u32, arg: u32) -> u32 {
    let mut sp = stack_top;
    // SAFETY: writes land within the caller-provided stack region; callers
    // of this function (task creation) allocate exactly one frame for it
    // and pass its top.
    unsafe fn push(sp: &mut u32, value: u32) {
        *sp -= 4;
        core::ptr::write(*sp as *mut u32, value);
    }
    // SAFETY: see push's doc; `stack_top` is frame-aligned, 16 bytes fit.
    unsafe {
        push(&mut sp, arg);
        push(&mut sp, entry);
        push(&mut sp, 0); // trampoline's own unused return-address slot
        push(&mut sp, trampoline);
    }
    sp
}

static NEXT_ID: crate::sync::GlobalState<u32> = crate::sync::GlobalState::new();

fn allocate_id() -> u32 {
    let _ = NEXT_ID.init(1);
    NEXT_ID.with_mut(|n| {
        let id = *n;
        *n += 1;
        id
    })
    .unwrap_or(0)
}

/// Entry point for a freshly created kernel task, invoked by the context
/// switch's "return" into the synthetic frame built by
/// [`create_kernel_task`]. Calls `entry(arg)`, then `task_exit(0)` if it
/// returns, per spec.md §4.E step 3.
#[cfg(target_os = "none")]
#[no_mangle]
pub extern "C" fn task_trampoline(entry: extern "C" fn(u32), arg: u32) -> ! {
    entry(arg);
    crate::sched::task_exit(0);
}

/// Create a kernel thread: one frame for the TCB, one for the kernel
/// stack, a synthetic trampoline frame, kernel selectors, interrupts
/// enabled (spec.md §4.E).
#[cfg(target_os = "none")]
pub fn create_kernel_task(
    entry: extern "C" fn(u32),
    arg: u32,
    priority: u8,
    name: &str,
) -> Result<NonNull<Task>, KernelError> {
    let tcb_frame = frame_allocator::alloc().ok_or(KernelError::OutOfMemory {
        requested: 1,
        available: 0,
    })?;
    let stack_frame = frame_allocator::alloc().ok_or_else(|| {
        let _ = frame_allocator::free(tcb_frame);
        KernelError::OutOfMemory {
            requested: 1,
            available: 0,
        }
    })?;

    let stack_top = stack_frame + KERNEL_STACK_SIZE as u32;
    let trampoline_addr = task_trampoline as usize as u32;
    let esp = build_kernel_entry_frame(stack_top, trampoline_addr, entry as usize as u32, arg);

    let mut name_buf = [0u8; NAME_CAP];
    let name_len = copy_str_bounded(name, &mut name_buf) as u8;

    let task = Task {
        id: allocate_id(),
        name: name_buf,
        name_len,
        state: TaskState::Ready,
        priority,
        context: Context::Kernel(KernelContext {
            esp,
            ebx: 0,
            esi: 0,
            edi: 0,
            ebp: 0,
        }),
        address_space: None,
        kernel_stack_addr: stack_frame,
        cpu_ticks: 0,
        last_run_tick: 0,
        exit_code: 0,
        prev: None,
        next: None,
    };

    // SAFETY: `tcb_frame` was just allocated, is frame-aligned, and is
    // identity-mapped kernel memory large enough (4 KiB) for one `Task`.
    unsafe {
        core::ptr::write(tcb_frame as *mut Task, task);
        Ok(NonNull::new_unchecked(tcb_frame as *mut Task))
    }
}

/// Create a user task: separate code/stack frames mapped into a fresh
/// address space at the fixed layout spec.md §4.E/§6 binds (spec.md §4.E).
#[cfg(target_os = "none")]
pub fn create_user_task(
    program: &[u8],
    priority: u8,
    name: &str,
) -> Result<NonNull<Task>, KernelError> {
    use crate::arch::x86::gdt;
    use vmm::PageFlags;

    let tcb_frame = frame_allocator::alloc().ok_or(KernelError::OutOfMemory {
        requested: 1,
        available: 0,
    })?;
    let kernel_stack_frame = frame_allocator::alloc().ok_or(KernelError::OutOfMemory {
        requested: 1,
        available: 0,
    })?;
    let code_frame = frame_allocator::alloc().ok_or(KernelError::OutOfMemory {
        requested: 1,
        available: 0,
    })?;
    let user_stack_frame = frame_allocator::alloc().ok_or(KernelError::OutOfMemory {
        requested: 1,
        available: 0,
    })?;

    let space = vmm::create_address_space().ok_or(KernelError::OutOfMemory {
        requested: 1,
        available: 0,
    })?;

    let user_flags = PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::USER;
    vmm::map(space, code_frame, USER_CODE_BASE, user_flags)?;
    vmm::map(
        space,
        user_stack_frame,
        USER_STACK_TOP - FRAME_SIZE as u32,
        user_flags,
    )?;

    // SAFETY: `code_frame` was just mapped and is identity-accessible from
    // kernel space at the same physical address (bring-up's identity map
    // covers all frame-allocator-owned memory); `program.len()` is checked
    // against one frame's capacity before the copy.
    unsafe {
        let len = program.len().min(FRAME_SIZE);
        core::ptr::copy_nonoverlapping(program.as_ptr(), code_frame as *mut u8, len);
    }

    let mut name_buf = [0u8; NAME_CAP];
    let name_len = copy_str_bounded(name, &mut name_buf) as u8;

    let task = Task {
        id: allocate_id(),
        name: name_buf,
        name_len,
        state: TaskState::Ready,
        priority,
        context: Context::User(UserContext {
            eip: USER_CODE_BASE,
            user_esp: USER_STACK_TOP,
            eflags: EFLAGS_IF,
            cs: gdt::USER_CODE_SELECTOR,
            ds: gdt::USER_DATA_SELECTOR,
            ss: gdt::USER_DATA_SELECTOR,
            kernel_esp: kernel_stack_frame + KERNEL_STACK_SIZE as u32,
        }),
        address_space: Some(space),
        kernel_stack_addr: kernel_stack_frame,
        cpu_ticks: 0,
        last_run_tick: 0,
        exit_code: 0,
        prev: None,
        next: None,
    };

    // SAFETY: see `create_kernel_task`.
    unsafe {
        core::ptr::write(tcb_frame as *mut Task, task);
        Ok(NonNull::new_unchecked(tcb_frame as *mut Task))
    }
}
