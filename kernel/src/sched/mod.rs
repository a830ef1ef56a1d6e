//! Component F: process-wide scheduler singleton and the safe points that
//! drive it (spec.md §4.F, §5).
//!
//! [`scheduler::Scheduler`] is pure bookkeeping; this module adds the
//! single global instance, the idle task, the bootstrap sentinel, and the
//! interrupt-masking discipline spec.md §4.F's `schedule()` and §5's
//! shared-resource policy both require.

pub mod queue;
pub mod scheduler;

use crate::sync::GlobalState;
use crate::task::{Context, Task, TaskState};
use core::ptr::NonNull;

static SCHEDULER: GlobalState<scheduler::Scheduler> = GlobalState::new();
static IDLE: GlobalState<IdleHandle> = GlobalState::new();

/// A `NonNull<Task>` is not `Send`/`Sync` on its own; this crate's single-CPU,
/// interrupts-disabled discipline (spec.md §5) makes sharing it behind
/// [`GlobalState`]'s mutex sound.
struct IdleHandle(NonNull<Task>);

// SAFETY: see `IdleHandle`'s doc comment.
unsafe impl Send for IdleHandle {}

/// Idle task body: halts the CPU forever. Priority 0, always ready
/// (spec.md §4.F).
#[cfg(target_os = "none")]
extern "C" fn idle_loop(_arg: u32) {
    crate::arch::x86::halt();
}

/// Install the idle task and an empty scheduler. Bring-up step 9
/// (spec.md §4.H), run immediately after task-subsystem init (step 8).
#[cfg(target_os = "none")]
pub fn init() {
    let idle = crate::task::create_kernel_task(idle_loop, 0, 0, "idle")
        .expect("idle task creation must not fail during bring-up");
    let _ = IDLE.init(IdleHandle(idle));
    let _ = SCHEDULER.init(scheduler::Scheduler::new());
}

/// Install the bootstrap sentinel as `current_task`: a zombie, never
/// enqueued, that represents the code path from reset to the first real
/// `schedule()` call (spec.md §4.F). Bring-up step 9, after [`init`].
///
/// # Safety
/// `sentinel` must point to a `Task` that outlives every future call to
/// [`schedule`]; it is replaced, never freed, on the first switch.
pub unsafe fn install_bootstrap_sentinel(sentinel: NonNull<Task>) {
    // SAFETY: forwarded from this function's contract.
    unsafe {
        (*sentinel.as_ptr()).state = TaskState::Zombie;
    }
    SCHEDULER.with_mut(|s| s.set_current(sentinel));
}

/// Enqueue a ready task (spec.md §4.F). Precondition: `task.state ==
/// Ready`.
///
/// # Safety
/// `task` must point to a live `Task` not already linked into any queue.
pub unsafe fn enqueue(task: NonNull<Task>) {
    // SAFETY: forwarded from this function's contract.
    SCHEDULER.with_mut(|s| unsafe { s.enqueue(task) });
}

/// Unlink a task from its queue; a no-op if it is not linked into one
/// (spec.md §4.F).
///
/// # Safety
/// `task` must point to a live `Task`.
pub unsafe fn dequeue(task: NonNull<Task>) {
    // SAFETY: forwarded from this function's contract.
    SCHEDULER.with_mut(|s| unsafe { s.dequeue(task) });
}

/// Timer-tick accounting, called from interrupt context (spec.md §4.D):
/// bump counters and flag `need_resched` if warranted. Never invokes
/// `schedule()` itself.
pub fn tick() {
    SCHEDULER.with_mut(|s| {
        s.tick();
    });
}

pub fn need_resched() -> bool {
    SCHEDULER.with(|s| s.need_resched()).unwrap_or(false)
}

pub fn current() -> Option<NonNull<Task>> {
    SCHEDULER.with(|s| s.current()).flatten()
}

pub fn ticks() -> u64 {
    SCHEDULER.with(|s| s.ticks()).unwrap_or(0)
}

pub fn switches() -> u64 {
    SCHEDULER.with(|s| s.switches()).unwrap_or(0)
}

/// Refresh the current task's resume point from a just-trapped hardware
/// frame. A no-op unless the current task is user-mode tagged: a kernel-mode
/// trap resumes through the ordinary call/ret chain instead, which
/// [`crate::arch::x86::context::switch`]'s `Kernel` path already handles, and
/// a user-mode trap is the only case where this crate's `UserContext` is the
/// sole surviving record of where to resume once the trapping task's kernel
/// call stack is abandoned by a switch away from it.
#[cfg(target_os = "none")]
pub fn capture_user_trap(eip: u32, user_esp: u32, eflags: u32) {
    SCHEDULER.with_mut(|s| {
        if let Some(mut current) = s.current() {
            // SAFETY: `current` always points at a live task.
            unsafe {
                if let Context::User(ref mut uc) = current.as_mut().context {
                    uc.eip = eip;
                    uc.user_esp = user_esp;
                    uc.eflags = eflags;
                }
            }
        }
    });
}

/// Reschedule if the timer flagged it, and only if it did. The "safe point"
/// spec.md §5 describes for the timer/syscall-return cases, kept as one
/// function so both trampolines invoke the same check.
#[cfg(target_os = "none")]
pub fn reschedule_if_needed() {
    if need_resched() {
        schedule();
    }
}

/// The only path that clears `need_resched` (spec.md §4.F). Disables
/// interrupts, picks the next task, and — if it differs from `current` —
/// performs the actual context switch before restoring interrupts.
#[cfg(target_os = "none")]
pub fn schedule() {
    crate::arch::x86::without_interrupts(|| {
        let idle = IDLE
            .with(|i| i.0)
            .expect("schedule() called before sched::init()");
        let switch = SCHEDULER.with_mut(|s| s.prepare_switch(idle)).flatten();
        if let Some((outgoing, incoming)) = switch {
            // SAFETY: both pointers come from `Scheduler::prepare_switch`,
            // which only ever hands back live, properly-stated tasks.
            unsafe {
                crate::arch::x86::context::switch(outgoing, incoming);
            }
        }
    });
}

/// `yield()` baseline syscall body and the cooperative-preemption safe
/// point: just calls `schedule()`.
#[cfg(target_os = "none")]
pub fn yield_now() {
    schedule();
}

/// `task_exit(code)` (spec.md §4.E): mark the current task zombie, record
/// its exit code, and reschedule. Never returns.
#[cfg(target_os = "none")]
pub fn task_exit(code: i32) -> ! {
    SCHEDULER.with_mut(|s| {
        if let Some(mut current) = s.current() {
            // SAFETY: `current` is always a live task.
            unsafe {
                current.as_mut().state = TaskState::Zombie;
                current.as_mut().exit_code = code;
            }
        }
    });
    schedule();
    unreachable!("task_exit's task was reselected after being marked zombie");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn need_resched_defaults_false_before_init() {
        // A fresh `GlobalState` (not the process-wide static, a local one)
        // starts uninitialized; `with` returns `None`, and the public
        // wrapper folds that to `false`.
        let fresh: GlobalState<scheduler::Scheduler> = GlobalState::new();
        assert_eq!(fresh.with(|s| s.need_resched()), None);
    }
}
