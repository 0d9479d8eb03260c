//! # Architecture Abstraction Layer
//!
//! The initial stack frame layout is shared by every build so the scheduler
//! can be exercised on a host; everything that touches the core registers
//! lives in [`cortex_m4`] and is compiled for the bare-metal target only.

#[cfg(firmware)]
pub mod cortex_m4;

use crate::task::{Stack, TaskEntry};

/// Words saved by hardware on exception entry (R0–R3, R12, LR, PC, xPSR).
pub const HW_FRAME_WORDS: usize = 8;

/// Words saved by PendSV (R4–R11 and the EXC_RETURN value).
pub const SW_FRAME_WORDS: usize = 9;

/// Return to Thread mode on the process stack, basic (non-FPU) frame.
pub const EXC_RETURN_THREAD_PSP: u32 = 0xFFFF_FFFD;

const XPSR_THUMB: u32 = 0x0100_0000;

/// Build the frame a task is first "returned" into and return the initial
/// stack pointer.
///
/// ## Stack Layout (top = high address, growing down)
///
/// ```text
/// [Hardware stacked frame]
///   xPSR  (Thumb bit set)
///   PC    (task entry point, bit 0 clear)
///   LR    (task_exit)
///   R12, R3, R2, R1, R0  (0)
/// [Software saved context]
///   EXC_RETURN (thread mode, PSP, no FPU state)
///   R11 .. R4  (0)       <- returned stack pointer
/// ```
pub fn init_stack_frame(stack: &mut Stack, entry: TaskEntry) -> *mut u32 {
    let words = HW_FRAME_WORDS + SW_FRAME_WORDS;
    let top = stack.0.as_mut_ptr() as usize + stack.0.len();
    // Align to 8 bytes (AAPCS requirement)
    let aligned_top = top & !0x07;
    let frame = (aligned_top - words * 4) as *mut u32;

    let values: [u32; HW_FRAME_WORDS + SW_FRAME_WORDS] = [
        // R4–R11
        0,
        0,
        0,
        0,
        0,
        0,
        0,
        0,
        EXC_RETURN_THREAD_PSP,
        // R0–R3, R12
        0,
        0,
        0,
        0,
        0,
        task_exit as usize as u32,
        // The stacked PC carries no Thumb bit; xPSR.T holds it
        entry as usize as u32 & !1,
        XPSR_THUMB,
    ];

    // SAFETY: `frame .. aligned_top` lies inside `stack`, which is at least
    // `words * 4 + 8` bytes long, and is 4-byte aligned.
    unsafe {
        for (i, value) in values.iter().enumerate() {
            frame.add(i).write(*value);
        }
    }
    frame
}

/// Return address of every task. Unreachable while entries are `fn() -> !`.
extern "C" fn task_exit() -> ! {
    loop {
        wait_for_interrupt();
    }
}

/// Park the core until the next interrupt.
#[inline]
pub fn wait_for_interrupt() {
    #[cfg(firmware)]
    cortex_m::asm::wfi();
    #[cfg(not(firmware))]
    core::hint::spin_loop();
}
