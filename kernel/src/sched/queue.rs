//! 256-bit priority bitmap and intrusive per-priority FIFO rings
//! (spec.md §4.F).
//!
//! The bitmap is the sole O(1) lookup structure: bit p set iff
//! `queue[p].count > 0`. Rings are doubly linked through
//! [`crate::task::Task::prev`]/[`next`] so enqueue/dequeue never touch a
//! heap allocator.

use crate::task::Task;
use core::ptr::NonNull;

const WORDS: usize = 8;

/// 256-bit bitmap, one bit per priority level. Bit 255 (highest priority)
/// lives in the top bit of the last word so `pick_highest` can scan from
/// the last word down.
#[derive(Default)]
pub struct Bitmap256 {
    words: [u32; WORDS],
}

impl Bitmap256 {
    pub const fn new() -> Self {
        Self { words: [0; WORDS] }
    }

    pub fn set(&mut self, p: u8) {
        let (w, b) = Self::split(p);
        self.words[w] |= 1 << b;
    }

    pub fn clear(&mut self, p: u8) {
        let (w, b) = Self::split(p);
        self.words[w] &= !(1 << b);
    }

    pub fn get(&self, p: u8) -> bool {
        let (w, b) = Self::split(p);
        self.words[w] & (1 << b) != 0
    }

    /// Highest set bit, scanning from the highest word down and using
    /// `leading_zeros` on the first non-zero word — strictly O(1) for a
    /// fixed-width bitmap.
    pub fn highest_set(&self) -> Option<u8> {
        for w in (0..WORDS).rev() {
            let word = self.words[w];
            if word != 0 {
                let bit_in_word = 31 - word.leading_zeros();
                return Some((w as u32 * 32 + bit_in_word) as u8);
            }
        }
        None
    }

    fn split(p: u8) -> (usize, u32) {
        ((p as usize) / 32, (p as u32) % 32)
    }
}

/// One priority level's ready queue: a doubly linked intrusive FIFO ring.
#[derive(Default)]
pub struct Queue {
    head: Option<NonNull<Task>>,
    tail: Option<NonNull<Task>>,
    count: u32,
}

impl Queue {
    pub const fn new() -> Self {
        Self {
            head: None,
            tail: None,
            count: 0,
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Append `task` at the tail.
    ///
    /// # Safety
    /// `task` must point to a live `Task` not currently linked into any
    /// queue.
    pub unsafe fn push_tail(&mut self, mut task: NonNull<Task>) {
        // SAFETY: forwarded from this function's contract.
        unsafe {
            task.as_mut().prev = self.tail;
            task.as_mut().next = None;
        }
        match self.tail {
            // SAFETY: `tail` is always a live, linked node when `Some`.
            Some(mut old_tail) => unsafe { old_tail.as_mut().next = Some(task) },
            None => self.head = Some(task),
        }
        self.tail = Some(task);
        self.count += 1;
    }

    /// Remove and return the head of the ring, if any.
    pub fn pop_head(&mut self) -> Option<NonNull<Task>> {
        let mut head = self.head?;
        // SAFETY: `head` is a live, linked node.
        let next = unsafe { head.as_mut().next };
        self.head = next;
        match next {
            // SAFETY: `next` is a live, linked node when `Some`.
            Some(mut n) => unsafe { n.as_mut().prev = None },
            None => self.tail = None,
        }
        // SAFETY: `head` is a live node being unlinked.
        unsafe {
            head.as_mut().prev = None;
            head.as_mut().next = None;
        }
        self.count -= 1;
        Some(head)
    }

    /// Unlink an arbitrary task from the ring. No-op if `task` is not the
    /// head, tail, or linked between two nodes of this ring (spec.md §4.F:
    /// "safe to call on a task that is not in any queue").
    ///
    /// # Safety
    /// `task` must point to a live `Task`.
    pub unsafe fn remove(&mut self, mut task: NonNull<Task>) {
        // SAFETY: forwarded from this function's contract.
        let (prev, next) = unsafe { (task.as_ref().prev, task.as_ref().next) };
        let is_linked = self.head == Some(task) || prev.is_some() || next.is_some();
        if !is_linked {
            return;
        }
        match prev {
            // SAFETY: `prev`, when linked, is a live node.
            Some(mut p) => unsafe { p.as_mut().next = next },
            None => self.head = next,
        }
        match next {
            // SAFETY: `next`, when linked, is a live node.
            Some(mut n) => unsafe { n.as_mut().prev = prev },
            None => self.tail = prev,
        }
        // SAFETY: `task` is a live node.
        unsafe {
            task.as_mut().prev = None;
            task.as_mut().next = None;
        }
        self.count -= 1;
    }
}
