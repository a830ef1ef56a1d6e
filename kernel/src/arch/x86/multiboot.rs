//! Multiboot v1 boot contract (spec.md §6).
//!
//! Parsing here is pure — it only reads bytes through raw pointers supplied
//! by the boot contract — so it is exercised by ordinary host `cargo test`
//! against synthetic in-memory descriptors, no real hardware required.

/// The multiboot v1 magic value the bootloader must pass in EAX.
pub const MULTIBOOT_MAGIC: u32 = 0x2BADB002;

/// Bit of `flags` indicating the memory map fields are valid.
const FLAG_MEM_MAP: u32 = 1 << 6;

/// Fields of the multiboot information structure this kernel consumes.
/// Field order and offsets match the multiboot v1 specification; unused
/// fields (boot device, command line, module list, ...) are omitted since
/// nothing here reads them.
#[repr(C)]
pub struct BootInfo {
    pub flags: u32,
    _unused0: [u32; 10],
    pub mmap_length: u32,
    pub mmap_addr: u32,
}

impl BootInfo {
    /// True if the bootloader populated the memory-map fields.
    pub fn has_memory_map(&self) -> bool {
        self.flags & FLAG_MEM_MAP != 0
    }
}

/// Region classification from a memory-map entry's `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    Available,
    Reserved,
    AcpiReclaimable,
    Nvs,
    BadRam,
    Unknown(u32),
}

impl RegionKind {
    fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::Available,
            2 => Self::Reserved,
            3 => Self::AcpiReclaimable,
            4 => Self::Nvs,
            5 => Self::BadRam,
            other => Self::Unknown(other),
        }
    }
}

/// One decoded memory-map entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRegion {
    pub base: u64,
    pub length: u64,
    pub kind: RegionKind,
}

/// Raw on-the-wire layout of a single multiboot v1 memory-map entry:
/// 4-byte `size` (not counting itself), 8-byte `addr`, 8-byte `len`, 4-byte
/// `type`. Iteration steps `current + current.size + 4`.
#[repr(C, packed)]
struct RawEntry {
    size: u32,
    addr: u64,
    len: u64,
    kind: u32,
}

/// Iterator over the memory map embedded at `mmap_addr`/`mmap_length`.
///
/// # Safety
/// The caller must ensure `addr` points at `length` bytes of validly
/// formatted multiboot v1 memory-map entries — true of the pointer the
/// bootloader hands the kernel at boot, and of any synthetic buffer a test
/// constructs with the same layout.
pub struct MemoryMapIter {
    cursor: *const u8,
    end: *const u8,
}

impl MemoryMapIter {
    /// # Safety
    /// See the struct documentation.
    pub unsafe fn new(addr: u32, length: u32) -> Self {
        let cursor = addr as *const u8;
        Self {
            cursor,
            // SAFETY: forwarded from the caller's contract.
            end: unsafe { cursor.add(length as usize) },
        }
    }
}

impl Iterator for MemoryMapIter {
    type Item = MemoryRegion;

    fn next(&mut self) -> Option<MemoryRegion> {
        if self.cursor >= self.end {
            return None;
        }
        // SAFETY: `cursor < end` was just checked, and the iterator's
        // construction contract guarantees every entry up to `end` is a
        // validly formatted `RawEntry` followed by its own `size` field.
        let entry = unsafe { core::ptr::read_unaligned(self.cursor as *const RawEntry) };
        let region = MemoryRegion {
            base: entry.addr,
            length: entry.len,
            kind: RegionKind::from_raw(entry.kind),
        };
        // The `size` field does not count itself; step over it plus the
        // record it describes.
        // SAFETY: staying within `end` is the caller's construction
        // contract; a malformed `size` could walk past it, which matches
        // the spec's documented iteration rule rather than a bug here.
        self.cursor = unsafe { self.cursor.add(entry.size as usize + 4) };
        Some(region)
    }
}

/// Parse the boot info structure, returning `None` if `magic` doesn't match
/// or no memory map was supplied — both trigger the frame allocator's
/// documented 128 MiB fallback (spec.md §4.A).
///
/// # Safety
/// `info_addr` must point at a valid [`BootInfo`] for the lifetime of the
/// returned reference, as guaranteed by the boot contract.
pub unsafe fn parse(magic: u32, info_addr: u32) -> Option<&'static BootInfo> {
    if magic != MULTIBOOT_MAGIC {
        return None;
    }
    // SAFETY: forwarded from the caller's contract.
    let info = unsafe { &*(info_addr as *const BootInfo) };
    if !info.has_memory_map() {
        return None;
    }
    Some(info)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENTRY_BYTES: usize = 24; // size(4) + addr(8) + len(8) + type(4)

    fn encode_entry(buf: &mut [u8], offset: usize, addr: u64, len: u64, kind: u32) {
        let size: u32 = 20; // addr(8) + len(8) + type(4)
        buf[offset..offset + 4].copy_from_slice(&size.to_ne_bytes());
        buf[offset + 4..offset + 12].copy_from_slice(&addr.to_ne_bytes());
        buf[offset + 12..offset + 20].copy_from_slice(&len.to_ne_bytes());
        buf[offset + 20..offset + 24].copy_from_slice(&kind.to_ne_bytes());
    }

    #[test]
    fn iterates_two_region_map() {
        let mut buf = [0u8; ENTRY_BYTES * 2];
        encode_entry(&mut buf, 0, 0x0000_0000, 0xA0000, 1);
        encode_entry(&mut buf, ENTRY_BYTES, 0x0010_0000, 0x7F0_0000, 1);

        // SAFETY: `buf` is a valid, fully initialized buffer of the exact
        // length passed, alive for the duration of the iterator below.
        let regions: [Option<MemoryRegion>; 2] = {
            let mut it = unsafe { MemoryMapIter::new(buf.as_ptr() as u32, buf.len() as u32) };
            [it.next(), it.next()]
        };

        let regions = [regions[0].unwrap(), regions[1].unwrap()];
        assert_eq!(regions[0].base, 0);
        assert_eq!(regions[0].length, 0xA0000);
        assert_eq!(regions[0].kind, RegionKind::Available);
        assert_eq!(regions[1].base, 0x0010_0000);
        assert_eq!(regions[1].kind, RegionKind::Available);
    }

    #[test]
    fn unknown_kind_is_preserved() {
        let mut buf = [0u8; ENTRY_BYTES];
        encode_entry(&mut buf, 0, 0, 0x1000, 9);
        // SAFETY: see above.
        let region = unsafe { MemoryMapIter::new(buf.as_ptr() as u32, buf.len() as u32) }
            .next()
            .unwrap();
        assert_eq!(region.kind, RegionKind::Unknown(9));
    }

    #[test]
    fn region_kind_from_raw_covers_all_documented_types() {
        assert_eq!(RegionKind::from_raw(1), RegionKind::Available);
        assert_eq!(RegionKind::from_raw(2), RegionKind::Reserved);
        assert_eq!(RegionKind::from_raw(3), RegionKind::AcpiReclaimable);
        assert_eq!(RegionKind::from_raw(4), RegionKind::Nvs);
        assert_eq!(RegionKind::from_raw(5), RegionKind::BadRam);
    }
}
