//! Component B: two-level IA-32 virtual memory manager (spec.md §4.B).
//!
//! Index computation and leaf-entry encode/decode are pure and
//! host-testable; the page-table read/write/switch operations dereference
//! physical addresses directly (identity-mapped in kernel space per
//! bring-up step 7) and so are gated to the bare-metal target, same as the
//! rest of this crate's hardware glue.

use super::{frame_allocator, is_aligned, FRAME_SIZE};
use crate::error::KernelError;
use crate::sync::GlobalState;

bitflags::bitflags! {
    /// Architecture-neutral → IA-32 leaf bit mapping (spec.md §4.B):
    /// `present→P`, `writable→W`, `user→U`, `nocache→PCD`. `EXECUTABLE` is
    /// carried for API symmetry but is a no-op on 32-bit paging without PAE
    /// (NX requires it), as the spec notes.
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct PageFlags: u32 {
        const PRESENT   = 1 << 0;
        const WRITABLE  = 1 << 1;
        const USER      = 1 << 2;
        const NOCACHE   = 1 << 4;
        const EXECUTABLE = 1 << 31;
    }
}

const ENTRY_PRESENT: u32 = 1 << 0;
const ENTRY_WRITABLE: u32 = 1 << 1;
const ENTRY_USER: u32 = 1 << 2;
const ENTRY_NOCACHE: u32 = 1 << 4;
const ADDR_MASK: u32 = !0xFFF;

/// Opaque handle over a page-directory hierarchy. The inner physical
/// address is architecture-private; callers never dereference it
/// (spec.md §9).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct AddressSpace {
    directory: u32,
}

/// Top-level (page directory) index for `virt`: bits [31:22].
pub const fn pde_index(virt: u32) -> usize {
    (virt >> 22) as usize
}

/// Second-level (page table) index for `virt`: bits [21:12].
pub const fn pte_index(virt: u32) -> usize {
    ((virt >> 12) & 0x3FF) as usize
}

/// Encode a leaf/directory entry from a frame-aligned physical address and
/// flags that should already include `PRESENT` where applicable.
fn encode_entry(phys: u32, flags: PageFlags) -> u32 {
    let mut bits = phys & ADDR_MASK;
    if flags.contains(PageFlags::PRESENT) {
        bits |= ENTRY_PRESENT;
    }
    if flags.contains(PageFlags::WRITABLE) {
        bits |= ENTRY_WRITABLE;
    }
    if flags.contains(PageFlags::USER) {
        bits |= ENTRY_USER;
    }
    if flags.contains(PageFlags::NOCACHE) {
        bits |= ENTRY_NOCACHE;
    }
    bits
}

fn decode_entry(entry: u32) -> (u32, PageFlags) {
    let mut flags = PageFlags::empty();
    if entry & ENTRY_PRESENT != 0 {
        flags |= PageFlags::PRESENT;
    }
    if entry & ENTRY_WRITABLE != 0 {
        flags |= PageFlags::WRITABLE;
    }
    if entry & ENTRY_USER != 0 {
        flags |= PageFlags::USER;
    }
    if entry & ENTRY_NOCACHE != 0 {
        flags |= PageFlags::NOCACHE;
    }
    (entry & ADDR_MASK, flags)
}

fn is_present(entry: u32) -> bool {
    entry & ENTRY_PRESENT != 0
}

#[cfg(target_os = "none")]
mod hw {
    use super::*;

    static KERNEL_SPACE: GlobalState<AddressSpace> = GlobalState::new();

    /// Identity-mapped access to a page-table-sized region at `phys`.
    ///
    /// # Safety
    /// `phys` must be a frame-aligned physical address that is
    /// identity-mapped (true of every page-directory/page-table frame this
    /// module allocates, since they are always installed below the kernel
    /// identity-mapped region established at bring-up step 7).
    unsafe fn table_ptr(phys: u32) -> *mut u32 {
        phys as *mut u32
    }

    /// Allocate and zero one frame's worth of page-directory or page-table.
    fn new_table() -> Result<u32, KernelError> {
        let addr = frame_allocator::alloc().ok_or(KernelError::OutOfMemory {
            requested: 1,
            available: 0,
        })?;
        // SAFETY: `addr` was just allocated, is frame-aligned, and its
        // 4 KiB is identity-mapped kernel memory.
        unsafe {
            core::ptr::write_bytes(table_ptr(addr), 0, FRAME_SIZE / 4);
        }
        Ok(addr)
    }

    pub fn create_address_space() -> Option<AddressSpace> {
        new_table().ok().map(|directory| AddressSpace { directory })
    }

    pub fn destroy(handle: AddressSpace) {
        // SAFETY: `handle.directory` is a valid, previously allocated
        // directory frame; only present entries' table frames are freed,
        // never the pages they map (spec.md §4.B).
        unsafe {
            let dir = table_ptr(handle.directory);
            for i in 0..1024usize {
                let entry = *dir.add(i);
                if is_present(entry) {
                    let (table_frame, _) = decode_entry(entry);
                    let _ = frame_allocator::free(table_frame);
                }
            }
        }
        let _ = frame_allocator::free(handle.directory);
    }

    pub fn map(
        handle: AddressSpace,
        phys: u32,
        virt: u32,
        flags: PageFlags,
    ) -> Result<(), KernelError> {
        if !is_aligned(phys) {
            return Err(KernelError::InvalidAddress { addr: phys });
        }
        if !is_aligned(virt) {
            return Err(KernelError::InvalidAddress { addr: virt });
        }
        // SAFETY: `handle.directory` is a valid directory frame; indices
        // are masked to the 10-bit ranges `pde_index`/`pte_index` return.
        unsafe {
            let dir = table_ptr(handle.directory);
            let pdi = pde_index(virt);
            let mut pde = *dir.add(pdi);
            if !is_present(pde) {
                let table_frame = new_table()?;
                pde = encode_entry(
                    table_frame,
                    PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::USER,
                );
                *dir.add(pdi) = pde;
            }
            let (table_frame, _) = decode_entry(pde);
            let table = table_ptr(table_frame);
            let pti = pte_index(virt);
            *table.add(pti) = encode_entry(phys, flags | PageFlags::PRESENT);
            invalidate(virt);
        }
        Ok(())
    }

    pub fn unmap(handle: AddressSpace, virt: u32) {
        // SAFETY: see `map`.
        unsafe {
            let dir = table_ptr(handle.directory);
            let pde = *dir.add(pde_index(virt));
            if !is_present(pde) {
                return; // no second-level table: no-op per spec.md §4.B.
            }
            let (table_frame, _) = decode_entry(pde);
            let table = table_ptr(table_frame);
            *table.add(pte_index(virt)) = 0;
            invalidate(virt);
        }
    }

    /// Walk `handle` at `virt`, returning the mapped physical address and
    /// flags if present.
    pub fn translate(handle: AddressSpace, virt: u32) -> Option<(u32, PageFlags)> {
        // SAFETY: see `map`.
        unsafe {
            let dir = table_ptr(handle.directory);
            let pde = *dir.add(pde_index(virt));
            if !is_present(pde) {
                return None;
            }
            let (table_frame, _) = decode_entry(pde);
            let table = table_ptr(table_frame);
            let pte = *table.add(pte_index(virt));
            if !is_present(pte) {
                return None;
            }
            Some(decode_entry(pte))
        }
    }

    fn invalidate(virt: u32) {
        // SAFETY: `virt` may be any address; `invlpg` on an unmapped
        // address is harmless.
        unsafe {
            crate::arch::x86::invalidate_page(virt);
        }
    }

    /// Write `handle`'s directory into the MMU base register (CR3),
    /// implicitly flushing the entire TLB.
    pub fn switch_to(handle: AddressSpace) {
        // SAFETY: `handle.directory` is a valid, fully built directory
        // frame; writing CR3 is always safe given that.
        unsafe {
            core::arch::asm!("mov cr3, {}", in(reg) handle.directory, options(nostack, preserves_flags));
        }
    }

    /// Identity-map `[0, bytes)` into `handle` and install it as the
    /// process-wide kernel address space, then enable paging. Bring-up
    /// step 7 (spec.md §4.H); order matters: CR3 must hold a valid
    /// directory before `PG` is set in CR0.
    pub fn init_kernel_space(identity_map_bytes: u32) -> Result<(), KernelError> {
        let handle = create_address_space().ok_or(KernelError::OutOfMemory {
            requested: 1,
            available: 0,
        })?;
        let mut addr = FRAME_SIZE as u32; // skip the null page
        while addr < identity_map_bytes {
            map(
                handle,
                addr,
                addr,
                PageFlags::PRESENT | PageFlags::WRITABLE,
            )?;
            addr += FRAME_SIZE as u32;
        }
        switch_to(handle);
        // SAFETY: `handle` is fully populated and loaded into CR3 above;
        // setting CR0.PG is safe exactly because of that ordering.
        unsafe {
            let mut cr0: u32;
            core::arch::asm!("mov {}, cr0", out(reg) cr0, options(nostack, preserves_flags));
            cr0 |= 1 << 31;
            core::arch::asm!("mov cr0, {}", in(reg) cr0, options(nostack, preserves_flags));
        }
        let _ = KERNEL_SPACE.init(handle);
        Ok(())
    }

    pub fn kernel_space() -> AddressSpace {
        KERNEL_SPACE
            .with(|h| *h)
            .expect("kernel_space() called before init_kernel_space()")
    }
}

#[cfg(target_os = "none")]
pub use hw::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pde_and_pte_index_split_32bit_address() {
        // 0x40000000 = 0b01_0000000000_0000000000_000000000000 (2 high bits set)
        assert_eq!(pde_index(0x4000_0000), 0x100);
        assert_eq!(pte_index(0x4000_0000), 0);
        assert_eq!(pde_index(0x0020_1000), 0);
        assert_eq!(pte_index(0x0020_1000), 0x201);
    }

    #[test]
    fn encode_decode_round_trip() {
        let flags = PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::USER;
        let entry = encode_entry(0x0020_0000, flags);
        let (phys, decoded) = decode_entry(entry);
        assert_eq!(phys, 0x0020_0000);
        assert_eq!(decoded, flags);
    }

    #[test]
    fn absent_entry_has_no_flags_set() {
        let (_, flags) = decode_entry(0);
        assert!(flags.is_empty());
    }

    #[test]
    fn nocache_bit_is_preserved() {
        let entry = encode_entry(0x1000, PageFlags::PRESENT | PageFlags::NOCACHE);
        let (_, flags) = decode_entry(entry);
        assert!(flags.contains(PageFlags::NOCACHE));
        assert!(!flags.contains(PageFlags::WRITABLE));
    }
}
