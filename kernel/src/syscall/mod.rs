//! Component G: syscall dispatch table and baseline handlers
//! (spec.md §4.G, §6).
//!
//! The dispatch table and lookup are pure and host-testable; only the
//! trampoline that lands here from ring 3 ([`crate::arch::x86::syscall`])
//! is hardware-specific.

use crate::error::errno;

/// One more than the highest syscall number the ABI permits (spec.md §6).
pub const MAX_SYSCALLS: usize = 256;

pub const SYS_EXIT: u32 = 1;
pub const SYS_YIELD: u32 = 2;
pub const SYS_GETPID: u32 = 3;
pub const SYS_SLEEP_US: u32 = 4;

/// A registered syscall body: five raw argument words in, one raw return
/// word out, matching the EBX/ECX/EDX/ESI/EDI → EAX ABI directly so the
/// trampoline never has to know each handler's real signature.
pub type SyscallHandler = fn(u32, u32, u32, u32, u32) -> i32;

struct Table {
    handlers: [Option<SyscallHandler>; MAX_SYSCALLS],
}

impl Table {
    const fn new() -> Self {
        Self {
            handlers: [None; MAX_SYSCALLS],
        }
    }
}

static mut TABLE: Table = Table::new();

/// Register `handler` at `number`. Bring-up step 10 (spec.md §4.H) calls
/// this once per baseline handler before enabling interrupts; no
/// synchronization is needed at that point.
///
/// # Safety
/// Must not run concurrently with [`dispatch`] (true by construction
/// during bring-up, and afterward because nothing re-registers handlers).
pub unsafe fn register(number: u32, handler: SyscallHandler) {
    if (number as usize) < MAX_SYSCALLS {
        // SAFETY: forwarded from this function's contract.
        unsafe {
            TABLE.handlers[number as usize] = Some(handler);
        }
    }
}

/// Look up and invoke the handler for `number`. Out-of-range or
/// unregistered numbers return `-ENOSYS` with no side effect (spec.md
/// §4.G). Performs no logging on the hot path.
pub fn dispatch(number: u32, arg0: u32, arg1: u32, arg2: u32, arg3: u32, arg4: u32) -> i32 {
    if number as usize >= MAX_SYSCALLS {
        return errno::ENOSYS as i32;
    }
    // SAFETY: read-only lookup; `TABLE` is only ever mutated during
    // single-threaded bring-up, strictly before any `dispatch` call.
    let handler = unsafe { TABLE.handlers[number as usize] };
    match handler {
        Some(h) => h(arg0, arg1, arg2, arg3, arg4),
        None => errno::ENOSYS as i32,
    }
}

/// `exit(code)`: mark current zombie, yield. Never returns, but the ABI
/// forces an `i32` return type — unreachable in practice.
#[cfg(target_os = "none")]
fn sys_exit(code: u32, _b: u32, _c: u32, _d: u32, _e: u32) -> i32 {
    crate::sched::task_exit(code as i32);
}

/// `yield()`: call `schedule()`, return 0.
#[cfg(target_os = "none")]
fn sys_yield(_a: u32, _b: u32, _c: u32, _d: u32, _e: u32) -> i32 {
    crate::sched::schedule();
    0
}

/// `getpid()`: current task's id, or -1 if there is none.
#[cfg(target_os = "none")]
fn sys_getpid(_a: u32, _b: u32, _c: u32, _d: u32, _e: u32) -> i32 {
    match crate::sched::current() {
        // SAFETY: a task handed back by `sched::current` is always live.
        Some(task) => unsafe { task.as_ref().id as i32 },
        None => -1,
    }
}

/// `sleep_us(us)`: documented as unimplemented (spec.md §4.G).
fn sys_sleep_us(_us: u32, _b: u32, _c: u32, _d: u32, _e: u32) -> i32 {
    errno::ENOSYS as i32
}

/// Install the baseline handlers. Bring-up step 10 (spec.md §4.H).
///
/// # Safety
/// Must run before interrupts are enabled (no concurrent `dispatch`).
#[cfg(target_os = "none")]
pub unsafe fn init() {
    // SAFETY: forwarded from this function's contract.
    unsafe {
        register(SYS_EXIT, sys_exit);
        register(SYS_YIELD, sys_yield);
        register(SYS_GETPID, sys_getpid);
        register(SYS_SLEEP_US, sys_sleep_us);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_arg0(a: u32, _b: u32, _c: u32, _d: u32, _e: u32) -> i32 {
        a as i32
    }

    #[test]
    fn dispatch_rejects_out_of_range_number() {
        assert_eq!(dispatch(MAX_SYSCALLS as u32, 0, 0, 0, 0, 0), errno::ENOSYS as i32);
    }

    #[test]
    fn dispatch_rejects_unregistered_number() {
        // 250 is never registered by any baseline handler.
        assert_eq!(dispatch(250, 0, 0, 0, 0, 0), errno::ENOSYS as i32);
    }

    #[test]
    fn register_then_dispatch_invokes_handler() {
        // SAFETY: single-threaded test, no concurrent dispatch.
        unsafe { register(200, echo_arg0) };
        assert_eq!(dispatch(200, 42, 0, 0, 0, 0), 42);
    }

    #[test]
    fn sleep_us_is_unimplemented() {
        assert_eq!(sys_sleep_us(1000, 0, 0, 0, 0), errno::ENOSYS as i32);
    }
}
