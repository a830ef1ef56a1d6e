//! Segment descriptor table, TSS, and selectors (spec.md §4.C).
//!
//! Descriptor encode/decode is pure and host-testable, separate from the
//! `lgdt`/segment-reload hardware glue — mirroring the teacher's split of
//! `gdt::Selectors` (pure data) from `gdt::init()` (hardware side effect),
//! generalized here from the teacher's dynamically appended 64-bit
//! descriptor table to this spec's fixed 6-entry 32-bit layout.

use core::mem::size_of;

/// Kernel code selector, index 1, RPL 0.
pub const KERNEL_CODE_SELECTOR: u16 = 0x08;
/// Kernel data selector, index 2, RPL 0.
pub const KERNEL_DATA_SELECTOR: u16 = 0x10;
/// User code selector, index 3, RPL 3.
pub const USER_CODE_SELECTOR: u16 = 0x1B;
/// User data selector, index 4, RPL 3.
pub const USER_DATA_SELECTOR: u16 = 0x23;
/// TSS selector, index 5, RPL 0.
pub const TSS_SELECTOR: u16 = 0x28;

const GDT_ENTRIES: usize = 6;

/// One 8-byte GDT descriptor, in its packed hardware layout.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
#[repr(C)]
pub struct Descriptor {
    limit_low: u16,
    base_low: u16,
    base_mid: u8,
    access: u8,
    granularity: u8,
    base_high: u8,
}

bitflags::bitflags! {
    /// Access byte bits relevant to this spec's segment/TSS descriptors.
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct Access: u8 {
        const ACCESSED   = 1 << 0;
        const RW         = 1 << 1; // readable (code) / writable (data)
        const DIRECTION  = 1 << 2;
        const EXECUTABLE = 1 << 3;
        const NOT_SYSTEM = 1 << 4; // 1 = code/data, 0 = system (TSS, gates)
        const DPL_3      = 3 << 5;
        const PRESENT    = 1 << 7;
    }
}

impl Descriptor {
    const fn null() -> Self {
        Self {
            limit_low: 0,
            base_low: 0,
            base_mid: 0,
            access: 0,
            granularity: 0,
            base_high: 0,
        }
    }

    /// Encode a descriptor from a 32-bit base, 20-bit limit, access byte,
    /// and granularity/size flags (top nibble of the granularity byte).
    fn encode(base: u32, limit: u32, access: u8, flags: u8) -> Self {
        debug_assert!(limit <= 0xF_FFFF, "limit must fit 20 bits");
        Self {
            limit_low: (limit & 0xFFFF) as u16,
            base_low: (base & 0xFFFF) as u16,
            base_mid: ((base >> 16) & 0xFF) as u8,
            access,
            granularity: ((flags & 0x0F) << 4) | ((limit >> 16) & 0x0F) as u8,
            base_high: ((base >> 24) & 0xFF) as u8,
        }
    }

    /// Decode back to `(base, limit)` for testing the encode path.
    fn decode(&self) -> (u32, u32) {
        let base = (self.base_low as u32)
            | ((self.base_mid as u32) << 16)
            | ((self.base_high as u32) << 24);
        let limit = (self.limit_low as u32) | (((self.granularity & 0x0F) as u32) << 16);
        (base, limit)
    }

    fn code_segment(dpl: u8) -> Self {
        let access = Access::PRESENT.bits()
            | ((dpl & 0b11) << 5)
            | Access::NOT_SYSTEM.bits()
            | Access::EXECUTABLE.bits()
            | Access::RW.bits();
        // 4 KiB granularity, 32-bit operand size: limit 0xFFFFF * 4 KiB = 4 GiB.
        Self::encode(0, 0xFFFFF, access, 0b1100)
    }

    fn data_segment(dpl: u8) -> Self {
        let access = Access::PRESENT.bits() | ((dpl & 0b11) << 5) | Access::NOT_SYSTEM.bits() | Access::RW.bits();
        Self::encode(0, 0xFFFFF, access, 0b1100)
    }

    fn tss_segment(base: u32, limit: u32) -> Self {
        // Type 0x9: 32-bit TSS (available, not busy).
        let access = Access::PRESENT.bits() | 0x09;
        Self::encode(base, limit, access, 0b0000)
    }
}

/// 32-bit task-state segment. Only the fields ring-3→ring-0 transitions
/// actually read are populated; the I/O permission bitmap is disabled by
/// pointing `iomap_base` past the segment limit.
#[derive(Clone, Copy, Default)]
#[repr(C, packed)]
pub struct Tss {
    prev_task_link: u16,
    _reserved0: u16,
    pub esp0: u32,
    pub ss0: u16,
    _reserved1: u16,
    esp1: u32,
    ss1: u16,
    _reserved2: u16,
    esp2: u32,
    ss2: u16,
    _reserved3: u16,
    cr3: u32,
    eip: u32,
    eflags: u32,
    eax: u32,
    ecx: u32,
    edx: u32,
    ebx: u32,
    esp: u32,
    ebp: u32,
    esi: u32,
    edi: u32,
    es: u16,
    _reserved4: u16,
    cs: u16,
    _reserved5: u16,
    ss: u16,
    _reserved6: u16,
    ds: u16,
    _reserved7: u16,
    fs: u16,
    _reserved8: u16,
    gs: u16,
    _reserved9: u16,
    ldtr: u16,
    _reserved10: u16,
    _reserved11: u16,
    iomap_base: u16,
}

static mut TSS: Tss = Tss {
    prev_task_link: 0,
    _reserved0: 0,
    esp0: 0,
    ss0: KERNEL_DATA_SELECTOR,
    _reserved1: 0,
    esp1: 0,
    ss1: 0,
    _reserved2: 0,
    esp2: 0,
    ss2: 0,
    _reserved3: 0,
    cr3: 0,
    eip: 0,
    eflags: 0,
    eax: 0,
    ecx: 0,
    edx: 0,
    ebx: 0,
    esp: 0,
    ebp: 0,
    esi: 0,
    edi: 0,
    es: 0,
    _reserved4: 0,
    cs: 0,
    _reserved5: 0,
    ss: 0,
    _reserved6: 0,
    ds: 0,
    _reserved7: 0,
    fs: 0,
    _reserved8: 0,
    gs: 0,
    _reserved9: 0,
    ldtr: 0,
    _reserved10: 0,
    _reserved11: 0,
    iomap_base: size_of::<Tss>() as u16,
};

static mut GDT: [Descriptor; GDT_ENTRIES] = [Descriptor::null(); GDT_ENTRIES];

/// Build the fixed 6-entry GDT described in spec.md §4.C. Pure; does not
/// touch hardware.
fn build_gdt(tss_base: u32) -> [Descriptor; GDT_ENTRIES] {
    let mut table = [Descriptor::null(); GDT_ENTRIES];
    table[1] = Descriptor::code_segment(0);
    table[2] = Descriptor::data_segment(0);
    table[3] = Descriptor::code_segment(3);
    table[4] = Descriptor::data_segment(3);
    table[5] = Descriptor::tss_segment(tss_base, (size_of::<Tss>() - 1) as u32);
    table
}

#[repr(C, packed)]
struct DescriptorTablePointer {
    limit: u16,
    base: u32,
}

/// Build the GDT and TSS, load them, and reload segment registers.
///
/// # Safety
/// Must be called exactly once, early in bring-up, before any code relies
/// on the new selectors (step 1 of spec.md §4.H).
#[cfg(target_os = "none")]
pub unsafe fn init() {
    // SAFETY: single-threaded bring-up; no concurrent access to the statics.
    unsafe {
        let tss_base = core::ptr::addr_of!(TSS) as u32;
        GDT = build_gdt(tss_base);

        let pointer = DescriptorTablePointer {
            limit: (size_of::<[Descriptor; GDT_ENTRIES]>() - 1) as u16,
            base: core::ptr::addr_of!(GDT) as u32,
        };
        core::arch::asm!("lgdt [{}]", in(reg) &pointer, options(readonly, nostack, preserves_flags));

        // Reload CS via a far return trampoline, then the data/stack
        // segment registers directly.
        core::arch::asm!(
            "push {code_sel}",
            "lea {tmp}, [1f]",
            "push {tmp}",
            "retf",
            "1:",
            code_sel = in(reg) KERNEL_CODE_SELECTOR as u32,
            tmp = out(reg) _,
        );
        core::arch::asm!(
            "mov ds, {sel:x}",
            "mov es, {sel:x}",
            "mov fs, {sel:x}",
            "mov gs, {sel:x}",
            "mov ss, {sel:x}",
            sel = in(reg) KERNEL_DATA_SELECTOR,
        );
        core::arch::asm!("ltr {0:x}", in(reg) TSS_SELECTOR, options(nostack, preserves_flags));
    }
}

/// Update the TSS's ring-0 stack pointer, used by the scheduler before any
/// switch whose target may later take an interrupt in user mode.
#[cfg(target_os = "none")]
pub fn set_kernel_stack(esp0: u32) {
    // SAFETY: single-CPU baseline; called with interrupts disabled by the
    // scheduler per spec.md §4.E's invariant.
    unsafe {
        core::ptr::addr_of_mut!(TSS).as_mut().unwrap().esp0 = esp0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selectors_match_spec_values() {
        assert_eq!(KERNEL_CODE_SELECTOR, 0x08);
        assert_eq!(KERNEL_DATA_SELECTOR, 0x10);
        assert_eq!(USER_CODE_SELECTOR, 0x1B);
        assert_eq!(USER_DATA_SELECTOR, 0x23);
        assert_eq!(TSS_SELECTOR, 0x28);
    }

    #[test]
    fn null_descriptor_is_all_zero() {
        let d = Descriptor::null();
        assert_eq!(d, Descriptor::default());
        let bytes: [u8; 8] = unsafe { core::mem::transmute(d) };
        assert_eq!(bytes, [0u8; 8]);
    }

    #[test]
    fn base_limit_round_trip() {
        for &(base, limit) in &[(0u32, 0u32), (0xDEAD_BEEF, 0xFFFFF), (0x1234, 0xABCDE)] {
            let d = Descriptor::encode(base, limit, 0, 0);
            assert_eq!(d.decode(), (base, limit));
        }
    }

    #[test]
    fn build_gdt_has_six_entries_with_expected_shapes() {
        let table = build_gdt(0xC000_0000);
        assert_eq!(table.len(), GDT_ENTRIES);
        assert_eq!(table[0], Descriptor::null());
        assert_eq!(table[1].decode(), (0, 0xFFFFF));
        assert_eq!(table[5].decode().0, 0xC000_0000);
    }
}
