//! Component F: the O(1) priority scheduler proper (spec.md §4.F).
//!
//! `Scheduler` itself is pure pointer/bitmap bookkeeping and is fully
//! host-testable; only the context switch it drives at the end of
//! `schedule()` is hardware-specific and gated to the bare-metal target.

use super::queue::{Bitmap256, Queue};
use crate::task::{Task, TaskState};
use core::ptr::NonNull;

const PRIORITIES: usize = 256;

pub struct Scheduler {
    queues: [Queue; PRIORITIES],
    bitmap: Bitmap256,
    current: Option<NonNull<Task>>,
    need_resched: bool,
    ticks: u64,
    switches: u64,
}

// SAFETY: a `Scheduler` is only ever touched with interrupts disabled on a
// single CPU (spec.md §5); there is no concurrent access to race against.
unsafe impl Send for Scheduler {}

impl Scheduler {
    pub fn new() -> Self {
        const EMPTY: Queue = Queue::new();
        Self {
            queues: [EMPTY; PRIORITIES],
            bitmap: Bitmap256::new(),
            current: None,
            need_resched: false,
            ticks: 0,
            switches: 0,
        }
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn switches(&self) -> u64 {
        self.switches
    }

    pub fn need_resched(&self) -> bool {
        self.need_resched
    }

    pub fn current(&self) -> Option<NonNull<Task>> {
        self.current
    }

    /// Set the current task directly. Used once, at bring-up, to install
    /// the bootstrap sentinel before any real `schedule()` call.
    pub fn set_current(&mut self, task: NonNull<Task>) {
        self.current = Some(task);
    }

    /// Append `task` to its priority's ready queue and set the bitmap bit.
    /// Precondition: `task.state == Ready` (spec.md §4.F).
    ///
    /// # Safety
    /// `task` must point to a live `Task` not already linked into any
    /// queue.
    pub unsafe fn enqueue(&mut self, task: NonNull<Task>) {
        // SAFETY: forwarded from this function's contract.
        let priority = unsafe { task.as_ref().priority };
        // SAFETY: `task` is unlinked per this function's contract.
        unsafe { self.queues[priority as usize].push_tail(task) };
        self.bitmap.set(priority);
    }

    /// Unlink `task` from its queue, clearing the bitmap bit if the queue
    /// becomes empty. Safe to call on a task not in any queue.
    ///
    /// # Safety
    /// `task` must point to a live `Task`.
    pub unsafe fn dequeue(&mut self, task: NonNull<Task>) {
        // SAFETY: forwarded from this function's contract.
        let priority = unsafe { task.as_ref().priority };
        // SAFETY: forwarded from this function's contract.
        unsafe { self.queues[priority as usize].remove(task) };
        if self.queues[priority as usize].is_empty() {
            self.bitmap.clear(priority);
        }
    }

    /// Head of the highest-priority non-empty queue, or `idle` if every
    /// queue is empty. `idle` must always be ready (spec.md §4.F).
    pub fn pick_next(&mut self, idle: NonNull<Task>) -> NonNull<Task> {
        match self.bitmap.highest_set() {
            Some(priority) => {
                let task = self.queues[priority as usize]
                    .pop_head()
                    .expect("bitmap bit set implies a non-empty queue");
                if self.queues[priority as usize].is_empty() {
                    self.bitmap.clear(priority);
                }
                task
            }
            None => idle,
        }
    }

    /// Per-tick accounting: bump the global counter and the current task's,
    /// and flag a reschedule if a peer at the same priority is ready
    /// (spec.md §4.F). Called from interrupt context; never touches the
    /// scheduler queues beyond this read.
    pub fn tick(&mut self) -> bool {
        self.ticks += 1;
        if let Some(mut current) = self.current {
            // SAFETY: `current` is always a live task once bring-up has
            // run (spec.md §3: "current_task is never null").
            unsafe {
                current.as_mut().cpu_ticks += 1;
                let priority = current.as_ref().priority;
                if self.queues[priority as usize].count() > 0 {
                    self.need_resched = true;
                }
            }
        }
        self.need_resched
    }

    /// Decide the next task and update bookkeeping; returns the outgoing
    /// and incoming task so the caller can drive the actual context
    /// switch. Returns `None` for "no switch needed" when `pick_next`
    /// returns the already-current task.
    ///
    /// This is the hardware-independent half of spec.md §4.F's
    /// `schedule()`: it owns queue/bitmap/current-task bookkeeping; the
    /// caller (`crate::sched::schedule`) owns interrupt masking and the
    /// actual register/stack switch.
    pub fn prepare_switch(&mut self, idle: NonNull<Task>) -> Option<(NonNull<Task>, NonNull<Task>)> {
        let next = self.pick_next(idle);
        let current = self.current.expect("current_task must never be null");
        if next == current {
            self.need_resched = false;
            return None;
        }

        // SAFETY: `current` is a live task.
        unsafe {
            match current.as_ref().state {
                TaskState::Running => {
                    let mut c = current;
                    c.as_mut().state = TaskState::Ready;
                    self.enqueue(c);
                }
                TaskState::Zombie => {} // left dequeued for reclamation
                _ => {}
            }
        }

        let mut next_mut = next;
        // SAFETY: `next` came from `pick_next`, which only returns live,
        // already-dequeued tasks (or the always-ready idle task).
        unsafe {
            next_mut.as_mut().state = TaskState::Running;
        }
        self.current = Some(next);
        self.switches += 1;
        self.need_resched = false;
        Some((current, next))
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Context, KernelContext};

    fn fresh_task(id: u32, priority: u8, state: TaskState) -> Task {
        Task {
            id,
            name: [0; 16],
            name_len: 0,
            state,
            priority,
            context: Context::Kernel(KernelContext::default()),
            address_space: None,
            kernel_stack_addr: 0,
            cpu_ticks: 0,
            last_run_tick: 0,
            exit_code: 0,
            prev: None,
            next: None,
        }
    }

    #[test]
    fn bitmap_highest_priority_wins() {
        let mut t10 = fresh_task(1, 10, TaskState::Ready);
        let mut t50 = fresh_task(2, 50, TaskState::Ready);
        let mut t200 = fresh_task(3, 200, TaskState::Ready);
        let mut t100 = fresh_task(4, 100, TaskState::Ready);
        let mut idle = fresh_task(0, 0, TaskState::Ready);

        let mut sched = Scheduler::new();
        // SAFETY: each task is a distinct, unlinked local.
        unsafe {
            sched.enqueue(NonNull::from(&mut t10));
            sched.enqueue(NonNull::from(&mut t50));
            sched.enqueue(NonNull::from(&mut t200));
            sched.enqueue(NonNull::from(&mut t100));
        }
        let picked = sched.pick_next(NonNull::from(&mut idle));
        assert_eq!(unsafe { picked.as_ref().id }, 3);
    }

    #[test]
    fn round_robin_within_a_priority() {
        let mut a = fresh_task(1, 128, TaskState::Ready);
        let mut b = fresh_task(2, 128, TaskState::Ready);
        let mut c = fresh_task(3, 128, TaskState::Ready);
        let mut idle = fresh_task(0, 0, TaskState::Ready);
        let idle_ptr = NonNull::from(&mut idle);

        let mut sched = Scheduler::new();
        // SAFETY: each task is a distinct, unlinked local.
        unsafe {
            sched.enqueue(NonNull::from(&mut a));
            sched.enqueue(NonNull::from(&mut b));
            sched.enqueue(NonNull::from(&mut c));
        }

        let p1 = sched.pick_next(idle_ptr);
        assert_eq!(unsafe { p1.as_ref().id }, 1);
        unsafe { sched.enqueue(p1) };

        let p2 = sched.pick_next(idle_ptr);
        assert_eq!(unsafe { p2.as_ref().id }, 2);
        unsafe { sched.enqueue(p2) };

        let p3 = sched.pick_next(idle_ptr);
        assert_eq!(unsafe { p3.as_ref().id }, 3);
        unsafe { sched.enqueue(p3) };

        let back_to_a = sched.pick_next(idle_ptr);
        assert_eq!(unsafe { back_to_a.as_ref().id }, 1);
    }

    #[test]
    fn pick_next_returns_idle_when_bitmap_empty() {
        let mut idle = fresh_task(0, 0, TaskState::Ready);
        let mut sched = Scheduler::new();
        let picked = sched.pick_next(NonNull::from(&mut idle));
        assert_eq!(unsafe { picked.as_ref().id }, 0);
    }

    #[test]
    fn tick_flags_resched_when_peer_ready() {
        let mut current = fresh_task(1, 50, TaskState::Running);
        let mut peer = fresh_task(2, 50, TaskState::Ready);
        let mut sched = Scheduler::new();
        sched.set_current(NonNull::from(&mut current));
        // SAFETY: `peer` is a distinct, unlinked local.
        unsafe { sched.enqueue(NonNull::from(&mut peer)) };

        assert!(sched.tick());
        assert_eq!(sched.ticks(), 1);
    }

    #[test]
    fn tick_does_not_flag_resched_when_alone() {
        let mut current = fresh_task(1, 50, TaskState::Running);
        let mut sched = Scheduler::new();
        sched.set_current(NonNull::from(&mut current));
        assert!(!sched.tick());
    }

    #[test]
    fn prepare_switch_is_noop_when_next_is_current() {
        let mut current = fresh_task(1, 0, TaskState::Running);
        let mut sched = Scheduler::new();
        let cur_ptr = NonNull::from(&mut current);
        sched.set_current(cur_ptr);
        assert!(sched.prepare_switch(cur_ptr).is_none());
        assert!(!sched.need_resched());
    }

    #[test]
    fn prepare_switch_requeues_outgoing_running_task() {
        let mut current = fresh_task(1, 50, TaskState::Running);
        let mut next = fresh_task(2, 50, TaskState::Ready);
        let mut idle = fresh_task(0, 0, TaskState::Ready);
        let cur_ptr = NonNull::from(&mut current);

        let mut sched = Scheduler::new();
        sched.set_current(cur_ptr);
        // SAFETY: `next` is a distinct, unlinked local.
        unsafe { sched.enqueue(NonNull::from(&mut next)) };

        let (outgoing, incoming) = sched.prepare_switch(NonNull::from(&mut idle)).unwrap();
        assert_eq!(unsafe { outgoing.as_ref().id }, 1);
        assert_eq!(unsafe { incoming.as_ref().id }, 2);
        assert_eq!(unsafe { outgoing.as_ref().state }, TaskState::Ready);
        assert_eq!(unsafe { incoming.as_ref().state }, TaskState::Running);
        assert_eq!(sched.switches(), 1);
    }
}
