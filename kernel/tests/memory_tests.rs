//! Component A/B integration tests: frame allocation/free and virtual
//! memory mapping against the live post-bring-up state (spec.md §4.A/§4.B).
#![no_std]
#![no_main]

use core::arch::global_asm;

use ia32_kernel::bootstrap::InitialTask;
use ia32_kernel::mm::vmm::{self, PageFlags};
use ia32_kernel::mm::{frame_allocator, FRAME_SIZE};

#[path = "common/mod.rs"]
mod common;

global_asm!(
    r#"
.section .multiboot_header, "a"
.align 4
    .long 0x1BADB002
    .long 0x00000003
    .long -(0x1BADB002 + 0x00000003)

.section .bss
.align 16
boot_stack_bottom:
    .skip 65536
boot_stack_top:

.section .text
.global _start
.type _start, @function
_start:
    mov esp, offset boot_stack_top
    push ebx
    push eax
    call kernel_main
.Lhang:
    hlt
    jmp .Lhang
"#
);

extern "C" {
    static __kernel_start: u8;
    static __kernel_end: u8;
}

/// A virtual address well above the kernel's own identity map, used as the
/// mapping target so this test can't collide with bring-up's own mappings.
const TEST_VIRT: u32 = 0x3000_0000;

extern "C" fn frame_alloc_roundtrip(_arg: u32) {
    let a = match frame_allocator::alloc() {
        Some(a) => a,
        None => common::fail("frame allocator returned None with frames available"),
    };
    let b = match frame_allocator::alloc() {
        Some(b) => b,
        None => common::fail("second alloc returned None"),
    };
    if a == b {
        common::fail("two successive allocs returned the same frame");
    }
    if a % FRAME_SIZE as u32 != 0 || b % FRAME_SIZE as u32 != 0 {
        common::fail("allocated frame address is not frame-aligned");
    }

    let free_before = frame_allocator::stats().free;
    if frame_allocator::free(a).is_err() {
        common::fail("freeing a just-allocated frame was rejected");
    }
    if frame_allocator::stats().free != free_before + 1 {
        common::fail("free count did not increase after free()");
    }
    if frame_allocator::free(a).is_ok() {
        common::fail("double free was not rejected");
    }
    let _ = frame_allocator::free(b);

    let space = vmm::kernel_space();
    let phys = match frame_allocator::alloc() {
        Some(p) => p,
        None => common::fail("no frame left to map"),
    };
    if vmm::map(space, phys, TEST_VIRT, PageFlags::PRESENT | PageFlags::WRITABLE).is_err() {
        common::fail("map() failed for a fresh frame");
    }
    match vmm::translate(space, TEST_VIRT) {
        Some((mapped_phys, flags)) if mapped_phys == phys && flags.contains(PageFlags::WRITABLE) => {}
        Some(_) => common::fail("translate() returned a mismatched mapping"),
        None => common::fail("translate() found no mapping after map()"),
    }
    vmm::unmap(space, TEST_VIRT);
    if vmm::translate(space, TEST_VIRT).is_some() {
        common::fail("translate() still sees a mapping after unmap()");
    }
    let _ = frame_allocator::free(phys);

    common::pass();
}

#[no_mangle]
extern "C" fn kernel_main(multiboot_magic: u32, multiboot_info_addr: u32) -> ! {
    // SAFETY: linker-provided bounds symbols; only their address is taken.
    let kernel_start = unsafe { core::ptr::addr_of!(__kernel_start) as u32 };
    let kernel_end = unsafe { core::ptr::addr_of!(__kernel_end) as u32 };

    let tasks = [InitialTask {
        entry: frame_alloc_roundtrip,
        arg: 0,
        priority: 128,
        name: "frame_alloc_roundtrip",
    }];

    common::run(
        "memory_tests",
        multiboot_magic,
        multiboot_info_addr,
        kernel_start,
        kernel_end,
        &tasks,
    );
}
