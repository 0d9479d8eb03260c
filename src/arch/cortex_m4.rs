//! # Cortex-M4 Port Layer
//!
//! Hardware-specific code for the ARM Cortex-M4F (Thumb-2) processor.
//! Implements context switching via PendSV, SysTick timer configuration,
//! and interrupt management.
//!
//! ## Context Switch Mechanism
//!
//! The Cortex-M4 uses a split-stack model:
//! - **MSP** (Main Stack Pointer): Used by the kernel and interrupt handlers
//! - **PSP** (Process Stack Pointer): Used by tasks in Thread mode
//!
//! On exception entry, the hardware automatically stacks R0–R3, R12, LR, PC,
//! and xPSR onto the process stack, plus S0–S15 and FPSCR when the task has
//! used the FPU. The PendSV handler saves the rest: R4–R11, the EXC_RETURN
//! value and, for FPU users, S16–S31.
//!
//! ## Interrupt Priorities
//!
//! - SysTick: Priority 0xFF (lowest)
//! - PendSV: Priority 0xFF (lowest), runs only when no other ISR is active
//! - GPIOF: left at the reset priority (highest)

use core::arch::{asm, naked_asm};

use cortex_m::peripheral::scb::SystemHandler;
use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::{SCB, SYST};

use crate::config::{SYSTEM_CLOCK_HZ, TICK_HZ};

// ---------------------------------------------------------------------------
// SysTick configuration
// ---------------------------------------------------------------------------

/// Configure the SysTick timer to fire at `TICK_HZ` from the core clock.
pub fn configure_systick(syst: &mut SYST) {
    let reload = SYSTEM_CLOCK_HZ / TICK_HZ - 1;
    syst.set_reload(reload);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
}

// ---------------------------------------------------------------------------
// PendSV trigger
// ---------------------------------------------------------------------------

/// Request a context switch. PendSV fires as soon as no other exception is
/// active and interrupts are enabled.
#[inline]
pub fn trigger_pendsv() {
    SCB::set_pendsv();
}

// ---------------------------------------------------------------------------
// Interrupt priority configuration
// ---------------------------------------------------------------------------

/// Set PendSV and SysTick to the lowest interrupt priority so a context
/// switch never preempts another handler.
pub fn set_interrupt_priorities(scb: &mut SCB) {
    // SAFETY: called before the scheduler starts, with interrupts disabled;
    // no priority-based critical section is in use.
    unsafe {
        scb.set_priority(SystemHandler::PendSV, 0xFF);
        scb.set_priority(SystemHandler::SysTick, 0xFF);
    }
}

// ---------------------------------------------------------------------------
// First task launch
// ---------------------------------------------------------------------------

/// Start the first task by switching Thread mode to PSP and jumping to the
/// task's entry point. Interrupts are enabled on the way.
///
/// # Safety
/// Must only be called once, with interrupts disabled, with a stack pointer
/// produced by [`init_stack_frame`](super::init_stack_frame).
pub unsafe fn start_first_task(psp: *const u32) -> ! {
    asm!(
        // Skip the software-saved context (R4-R11, EXC_RETURN)
        "adds r0, #36",
        "msr psp, r0",

        // Thread mode uses PSP from here on (CONTROL.SPSEL = 1)
        "movs r0, #2",
        "msr control, r0",
        "isb",

        // Unwind the hardware frame by hand; this is not an exception return
        "pop {{r0-r3, r12}}",
        "pop {{r4}}",          // LR (task_exit)
        "pop {{r5}}",          // PC (task entry point)
        "pop {{r6}}",          // xPSR (discarded)
        "mov lr, r4",
        "orr r5, r5, #1",      // Branch in Thumb state

        "cpsie i",
        "bx r5",

        in("r0") psp,
        options(noreturn)
    );
}

// ---------------------------------------------------------------------------
// PendSV handler (context switch)
// ---------------------------------------------------------------------------

/// PendSV exception handler. Performs the actual context switch.
///
/// ## Sequence
/// 1. Save S16–S31 if the outgoing task has an FPU frame (EXC_RETURN bit 4
///    clear), then R4–R11 and EXC_RETURN, onto its process stack
/// 2. Hand the new PSP to the kernel, which records it, reschedules and
///    returns the incoming task's PSP
/// 3. Restore R4–R11, EXC_RETURN and, if needed, S16–S31
/// 4. Return from exception; hardware restores the rest
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn PendSV() {
    naked_asm!(
        // --- Save current context ---
        "mrs r0, psp",
        "tst lr, #0x10",
        "it eq",
        "vstmdbeq r0!, {{s16-s31}}",
        "stmdb r0!, {{r4-r11, lr}}",

        // --- Record it and select the next task ---
        "bl {switch_context}",     // r0: saved PSP in, next PSP out

        // --- Restore new context ---
        "ldmia r0!, {{r4-r11, lr}}",
        "tst lr, #0x10",
        "it eq",
        "vldmiaeq r0!, {{s16-s31}}",
        "msr psp, r0",
        "bx lr",

        switch_context = sym crate::kernel::switch_context,
    );
}

// ---------------------------------------------------------------------------
// SysTick handler
// ---------------------------------------------------------------------------

/// SysTick exception handler. Advances the scheduler by one tick and pends
/// a context switch when needed.
#[no_mangle]
pub extern "C" fn SysTick() {
    crate::kernel::on_tick();
}
