//! Strict bring-up sequence (spec.md §4.H): thirteen steps, each a
//! precondition for the next. [`bring_up`] never returns — a clean run ends
//! in `sched::schedule()`'s first real context switch; a failed one ends in
//! [`crate::panic`].
#![cfg(target_os = "none")]

use crate::arch::x86::{gdt, idt, interrupt, pic, syscall as arch_syscall, timer};
use crate::mm::{frame_allocator, vmm};
use crate::task;
use crate::{sched, time};

/// Scheduler tick frequency. spec.md §4.D leaves the "caller-chosen
/// frequency" unspecified; 1 kHz is the conventional quantum for this class
/// of system (see DESIGN.md's open-question log).
const TICK_HZ: u32 = 1000;

/// Down-counter periods to busy-wait during calibration. spec.md §4.D fixes
/// the protocol, not the count; larger values average out PIT read jitter
/// at the cost of a longer bring-up pause.
const CALIBRATION_WAIT_TICKS: u32 = 50;

/// Low memory identity-mapped before paging is enabled (step 7). Must cover
/// the kernel image, the stack bring-up runs on, and the page
/// directory/table frames the frame allocator hands out while building the
/// rest of the mapping.
const KERNEL_IDENTITY_MAP_BYTES: u32 = 16 * 1024 * 1024;

/// One task for bring-up step 11 to create and enqueue. This crate has no
/// embedded workload of its own; the binary entry point supplies whatever
/// initial tasks it wants running once the scheduler takes over.
pub struct InitialTask {
    pub entry: extern "C" fn(u32),
    pub arg: u32,
    pub priority: u8,
    pub name: &'static str,
}

/// Throwaway body for the bootstrap sentinel (spec.md §4.F): the sentinel
/// stands in for the reset-to-first-`schedule()` code path and is replaced
/// before it would ever actually run.
extern "C" fn sentinel_entry(_arg: u32) {
    unreachable!("bootstrap sentinel is never scheduled to run")
}

/// Run the full bring-up sequence and yield into the scheduler. Never
/// returns.
///
/// # Safety
/// Must run exactly once, from `_start`, before any other kernel code.
/// `multiboot_magic`/`multiboot_info_addr` must be the values the
/// bootloader left in EAX/EBX; `kernel_start`/`kernel_end` must bound the
/// kernel image's own physical footprint so the frame allocator never hands
/// out a frame the image itself occupies.
pub unsafe fn bring_up(
    multiboot_magic: u32,
    multiboot_info_addr: u32,
    kernel_start: u32,
    kernel_end: u32,
    initial_tasks: &[InitialTask],
) -> ! {
    // Step 1: segment descriptors and TSS.
    unsafe {
        gdt::init();
    }
    log::info!(target: "bootstrap", "step 1: gdt/tss installed");

    // Step 2: interrupt dispatch table, exception stubs, PIC remap. The
    // syscall gate is installed here, as part of the table build, rather
    // than as a separate later step — `idt::init` needs the handler address
    // up front to write the single DPL-3 gate correctly.
    unsafe {
        idt::init(
            interrupt::default_handler_address(),
            arch_syscall::entry_address(),
        );
        interrupt::install_exception_vectors();
        idt::install(idt::TIMER_VECTOR, interrupt::timer_handler_address());
        pic::init();
    }
    log::info!(target: "bootstrap", "step 2: idt/pic installed");

    // Step 3: per-CPU structures. This baseline targets one CPU; the
    // `smp-ready` feature reserves the duplication points spec.md §5/§9
    // name without implementing them, so there is nothing to allocate here.

    // Step 4: console sinks are external collaborators (spec.md §6); a
    // caller that has a VGA/UART driver registers it via
    // `crate::console::register` before or after calling this function.

    // Step 5: timer + calibration.
    unsafe {
        timer::program(TICK_HZ);
    }
    let pit_reload = timer::reload_value(TICK_HZ);
    let measured_hz = time::calibrate(&timer::PitTscClock, pit_reload, CALIBRATION_WAIT_TICKS)
        .unwrap_or_else(|e| panic!("timer calibration failed: {e}"));
    time::set_calibrated_frequency(measured_hz);
    log::info!(target: "bootstrap", "step 5: timer calibrated at {measured_hz} Hz");

    // Step 6: frame allocator, from the multiboot memory map.
    unsafe {
        frame_allocator::init(multiboot_magic, multiboot_info_addr, kernel_start, kernel_end);
    }
    log::info!(target: "bootstrap", "step 6: frame allocator initialized");

    // Step 7: virtual memory, identity-mapped, then paging enabled.
    vmm::init_kernel_space(KERNEL_IDENTITY_MAP_BYTES)
        .unwrap_or_else(|e| panic!("kernel address space init failed: {e}"));
    log::info!(target: "bootstrap", "step 7: paging enabled");

    // Steps 8 and 9: task subsystem (idle task) and scheduler are a single
    // call here — `sched::init` creates the idle task and the empty
    // scheduler together, since neither is useful without the other.
    sched::init();
    log::info!(target: "bootstrap", "step 8/9: idle task and scheduler ready");

    // The bootstrap sentinel stands in as `current_task` for the code path
    // from reset to the first real `schedule()` call (spec.md §4.F); it is
    // a zombie, never enqueued, leaked for the life of the kernel like the
    // idle task itself.
    let sentinel = task::create_kernel_task(sentinel_entry, 0, 0, "bootstrap")
        .expect("sentinel task creation must not fail during bring-up");
    unsafe {
        sched::install_bootstrap_sentinel(sentinel);
    }

    // Step 10: the syscall gate itself was installed as part of step 2's IDT
    // build (see above); what remains is registering the baseline handlers
    // into the dispatch table that gate lands in.
    unsafe {
        crate::syscall::init();
    }
    log::info!(target: "bootstrap", "step 10: baseline syscalls registered");

    // Step 11: initial tasks.
    for initial in initial_tasks {
        let handle = task::create_kernel_task(
            initial.entry,
            initial.arg,
            initial.priority,
            initial.name,
        )
        .unwrap_or_else(|e| panic!("initial task '{}' creation failed: {e}", initial.name));
        unsafe {
            sched::enqueue(handle);
        }
    }
    log::info!(target: "bootstrap", "step 11: {} initial task(s) enqueued", initial_tasks.len());

    // Step 12: enable interrupts.
    unsafe {
        pic::unmask_timer();
    }
    crate::arch::x86::enable_interrupts();
    log::info!(target: "bootstrap", "step 12: interrupts enabled");

    // Step 13: explicit yield into the scheduler. Never returns — the
    // switch away from the sentinel's synthetic stack frame is one-way.
    log::info!(target: "bootstrap", "step 13: yielding to scheduler");
    sched::schedule();
    unreachable!("schedule() must have switched away from the bootstrap sentinel")
}
