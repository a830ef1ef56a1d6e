//! Component A: physical frame allocator (spec.md §4.A).
//!
//! The baseline allocator scans a bitmap per spec.md §4.A's documented
//! non-RT cost rather than keeping a per-CPU free list; O(1) amortized
//! behavior is left as a documented future optimization. Two bitmaps track
//! disjoint frame states: `free_bitmap` (bit set ⇔ the frame is currently
//! free) and `reserved_bitmap` (bit set ⇔ the frame was pulled out of the
//! free pool once, at init, and is never returned to it).

use super::{align_down, align_up, FrameNumber, FRAME_SIZE};
use crate::arch::x86::multiboot::{self, RegionKind};
use crate::error::KernelError;
use crate::sync::GlobalState;

/// Upper bound on tracked physical memory. 512 MiB comfortably covers the
/// baseline's target systems and keeps the bitmap (and thus `FrameAllocator`
/// itself, which embeds it inline rather than behind a heap pointer — no
/// allocator is available) a few tens of KiB instead of the 256 KiB a full
/// 4 GiB bitmap would need. Memory map regions beyond this bound are
/// truncated at init time.
const MAX_PHYS_MEMORY: usize = 512 * 1024 * 1024;
const MAX_FRAMES: usize = MAX_PHYS_MEMORY / FRAME_SIZE;
const BITMAP_WORDS: usize = MAX_FRAMES / 32;

/// Fallback assumption when the bootloader doesn't supply a usable memory
/// map (spec.md §4.A): 128 MiB of RAM starting at address 0.
const FALLBACK_MEMORY_BYTES: u32 = 128 * 1024 * 1024;

/// Null-page guard: frame 0 is always reserved.
const NULL_GUARD_START: u32 = 0;
const NULL_GUARD_END: u32 = FRAME_SIZE as u32;

/// Text-mode VGA MMIO window.
const VGA_MMIO_START: u32 = 0xB8000;
const VGA_MMIO_END: u32 = VGA_MMIO_START + 32 * 1024;

/// Usage statistics (spec.md §4.A `stats()`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub total: usize,
    pub free: usize,
    pub reserved: usize,
    pub kernel: usize,
}

impl core::fmt::Display for Stats {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "frames: total={} free={} reserved={} kernel={}",
            self.total, self.free, self.reserved, self.kernel
        )
    }
}

struct Bitmap {
    words: [u32; BITMAP_WORDS],
}

impl Bitmap {
    const fn new() -> Self {
        Self {
            words: [0; BITMAP_WORDS],
        }
    }

    fn get(&self, frame: usize) -> bool {
        self.words[frame / 32] & (1 << (frame % 32)) != 0
    }

    fn set(&mut self, frame: usize) {
        self.words[frame / 32] |= 1 << (frame % 32);
    }

    fn clear(&mut self, frame: usize) {
        self.words[frame / 32] &= !(1 << (frame % 32));
    }

    /// First set bit at index `<= limit`, scanning word by word.
    fn first_set(&self, limit: usize) -> Option<usize> {
        let limit_word = (limit / 32).min(BITMAP_WORDS - 1);
        for (i, &word) in self.words[..=limit_word].iter().enumerate() {
            if word != 0 {
                let bit = word.trailing_zeros() as usize;
                let frame = i * 32 + bit;
                if frame <= limit {
                    return Some(frame);
                }
            }
        }
        None
    }
}

pub struct FrameAllocator {
    free_bitmap: Bitmap,
    reserved_bitmap: Bitmap,
    total: usize,
    free: usize,
    reserved: usize,
    kernel: usize,
    highest_frame: usize,
}

impl FrameAllocator {
    const fn new() -> Self {
        Self {
            free_bitmap: Bitmap::new(),
            reserved_bitmap: Bitmap::new(),
            total: 0,
            free: 0,
            reserved: 0,
            kernel: 0,
            highest_frame: 0,
        }
    }

    fn mark_region_free(&mut self, base: u32, length: u32) {
        let start = align_up(base);
        let end = align_down(base.saturating_add(length));
        if end <= start {
            return;
        }
        let start_frame = FrameNumber::from_addr(start).0 as usize;
        let end_frame = FrameNumber::from_addr(end).0 as usize;
        for frame in start_frame..end_frame.min(MAX_FRAMES) {
            if !self.free_bitmap.get(frame) && !self.reserved_bitmap.get(frame) {
                self.free_bitmap.set(frame);
                self.total += 1;
                self.free += 1;
                self.highest_frame = self.highest_frame.max(frame);
            }
        }
    }

    fn reserve_range(&mut self, start: u32, end: u32, kernel: bool) {
        let start = align_down(start);
        let end = align_up(end);
        let start_frame = FrameNumber::from_addr(start).0 as usize;
        let end_frame = FrameNumber::from_addr(end).0 as usize;
        for frame in start_frame..end_frame.min(MAX_FRAMES) {
            if self.free_bitmap.get(frame) {
                self.free_bitmap.clear(frame);
                self.free -= 1;
                self.reserved_bitmap.set(frame);
                self.reserved += 1;
                if kernel {
                    self.kernel += 1;
                }
            }
        }
    }

    fn alloc(&mut self) -> Option<u32> {
        let frame = self.free_bitmap.first_set(self.highest_frame)?;
        self.free_bitmap.clear(frame);
        self.free -= 1;
        Some(FrameNumber(frame as u32).addr())
    }

    fn free(&mut self, addr: u32) -> Result<(), KernelError> {
        if !super::is_aligned(addr) {
            return Err(KernelError::InvalidAddress { addr });
        }
        let frame = FrameNumber::from_addr(addr).0 as usize;
        if frame > self.highest_frame || self.reserved_bitmap.get(frame) {
            return Err(KernelError::InvalidAddress { addr });
        }
        if self.free_bitmap.get(frame) {
            // Double free: logged by the caller, state unchanged.
            return Err(KernelError::InvalidAddress { addr });
        }
        self.free_bitmap.set(frame);
        self.free += 1;
        Ok(())
    }

    fn stats(&self) -> Stats {
        Stats {
            total: self.total,
            free: self.free,
            reserved: self.reserved,
            kernel: self.kernel,
        }
    }
}

static ALLOCATOR: GlobalState<FrameAllocator> = GlobalState::new();

/// Build an allocator directly from a region list, bypassing the multiboot
/// parse — used by production init after parsing, and directly by tests.
fn init_from_regions(
    regions: impl Iterator<Item = multiboot::MemoryRegion>,
    kernel_start: u32,
    kernel_end: u32,
) -> FrameAllocator {
    let mut fa = FrameAllocator::new();
    for region in regions {
        if region.kind == RegionKind::Available {
            let base = region.base.min(u32::MAX as u64) as u32;
            let length = region.length.min(u32::MAX as u64) as u32;
            fa.mark_region_free(base, length);
        }
    }
    fa.reserve_range(NULL_GUARD_START, NULL_GUARD_END, false);
    fa.reserve_range(VGA_MMIO_START, VGA_MMIO_END, false);
    fa.reserve_range(kernel_start, kernel_end, true);
    fa
}

/// Initialize the global frame allocator from the boot contract. Falls back
/// to assuming 128 MiB at address 0 if `magic` doesn't match or no memory
/// map was supplied, logging prominently either way.
///
/// # Safety
/// `info_addr` must be a valid multiboot v1 info pointer per the boot
/// contract, or garbage the fallback path will simply ignore.
#[cfg(target_os = "none")]
pub unsafe fn init(magic: u32, info_addr: u32, kernel_start: u32, kernel_end: u32) {
    // SAFETY: forwarded from this function's own contract.
    let info = unsafe { multiboot::parse(magic, info_addr) };
    let fa = match info {
        Some(info) => {
            log::info!(target: "mm", "multiboot memory map present, building frame allocator");
            // SAFETY: `info.has_memory_map()` was checked inside `parse`.
            let regions = unsafe {
                multiboot::MemoryMapIter::new(info.mmap_addr, info.mmap_length)
            };
            init_from_regions(regions, kernel_start, kernel_end)
        }
        None => {
            log::warn!(
                target: "mm",
                "no multiboot memory map; assuming {} MiB at address 0",
                FALLBACK_MEMORY_BYTES / (1024 * 1024)
            );
            let region = core::iter::once(multiboot::MemoryRegion {
                base: 0,
                length: FALLBACK_MEMORY_BYTES as u64,
                kind: RegionKind::Available,
            });
            init_from_regions(region, kernel_start, kernel_end)
        }
    };
    let stats = fa.stats();
    let _ = ALLOCATOR.init(fa);
    log::info!(target: "mm", "{stats}");
}

/// Allocate one frame. Returns `None` when the free pool is exhausted.
pub fn alloc() -> Option<u32> {
    ALLOCATOR.with_mut(FrameAllocator::alloc).flatten()
}

/// Free a previously allocated frame.
pub fn free(addr: u32) -> Result<(), KernelError> {
    ALLOCATOR
        .with_mut(|fa| fa.free(addr))
        .unwrap_or(Err(KernelError::NotInitialized {
            subsystem: "mm::frame_allocator",
        }))
}

/// Reserve an arbitrary byte range outside of `init`'s fixed reservations
/// (e.g. a driver claiming an MMIO window discovered at runtime).
pub fn reserve(start: u32, size: u32) {
    ALLOCATOR.with_mut(|fa| fa.reserve_range(start, start.saturating_add(size), false));
}

/// Current usage statistics.
pub fn stats() -> Stats {
    ALLOCATOR
        .with(FrameAllocator::stats)
        .unwrap_or(Stats {
            total: 0,
            free: 0,
            reserved: 0,
            kernel: 0,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_region_map() -> [multiboot::MemoryRegion; 2] {
        [
            multiboot::MemoryRegion {
                base: 0x0000_0000,
                length: 0xA0000,
                kind: RegionKind::Available,
            },
            multiboot::MemoryRegion {
                base: 0x0010_0000,
                length: 0x7F0_0000,
                kind: RegionKind::Available,
            },
        ]
    }

    #[test]
    fn scenario_two_region_map_has_at_least_32896_frames() {
        let fa = init_from_regions(two_region_map().into_iter(), 0x0010_0000, 0x0011_0000);
        assert!(fa.stats().total >= 32_896, "total = {}", fa.stats().total);
    }

    #[test]
    fn alloc_returns_aligned_address_above_low_reservations() {
        let mut fa = init_from_regions(two_region_map().into_iter(), 0x0010_0000, 0x0011_0000);
        // The first region (below 1 MiB) is small; after null-guard/VGA
        // reservations, repeatedly draining it should eventually surface
        // frames from the second region, at or above 1 MiB.
        let mut last = None;
        while let Some(addr) = fa.alloc() {
            assert_eq!(addr & 0xFFF, 0);
            last = Some(addr);
        }
        assert!(last.unwrap() >= 0x0010_0000 || last.unwrap() < 0xA0000);
    }

    #[test]
    fn alloc_then_free_restores_free_count() {
        let mut fa = init_from_regions(two_region_map().into_iter(), 0x0010_0000, 0x0011_0000);
        let before = fa.stats().free;
        let mut addrs = alloc::vec_like(&mut fa, 16);
        for addr in addrs.drain() {
            fa.free(addr).unwrap();
        }
        assert_eq!(fa.stats().free, before);
    }

    #[test]
    fn double_free_is_rejected_without_state_change() {
        let mut fa = init_from_regions(two_region_map().into_iter(), 0x0010_0000, 0x0011_0000);
        let addr = fa.alloc().unwrap();
        fa.free(addr).unwrap();
        let free_before = fa.stats().free;
        assert!(fa.free(addr).is_err());
        assert_eq!(fa.stats().free, free_before);
    }

    #[test]
    fn free_rejects_unaligned_address() {
        let mut fa = init_from_regions(two_region_map().into_iter(), 0x0010_0000, 0x0011_0000);
        assert!(fa.free(1).is_err());
    }

    #[test]
    fn free_plus_reserved_plus_allocated_covers_total() {
        let mut fa = init_from_regions(two_region_map().into_iter(), 0x0010_0000, 0x0011_0000);
        let stats0 = fa.stats();
        assert!(stats0.free + stats0.reserved <= stats0.total);
        let _ = fa.alloc();
        let stats1 = fa.stats();
        assert_eq!(stats1.total, stats0.total);
    }

    // Minimal fixed-capacity stand-in for a handful of allocated addresses,
    // avoiding a dependency on `alloc::Vec` in this test module.
    mod alloc {
        use super::FrameAllocator;

        pub struct Small {
            buf: [u32; 32],
            len: usize,
        }

        impl Small {
            pub fn drain(&mut self) -> impl Iterator<Item = u32> + '_ {
                let len = self.len;
                self.len = 0;
                self.buf[..len].iter().copied()
            }
        }

        pub fn vec_like(fa: &mut FrameAllocator, n: usize) -> Small {
            let mut small = Small {
                buf: [0; 32],
                len: 0,
            };
            for _ in 0..n.min(32) {
                if let Some(addr) = fa.alloc() {
                    small.buf[small.len] = addr;
                    small.len += 1;
                }
            }
            small
        }
    }
}
