// SPDX-FileCopyrightText: 2026 Craplab <hello@craplab.fi>
// SPDX-License-Identifier: MIT

//! Handoff from the bootloader into the application image.

use crate::flash::{APP_FLASH_OFFSET, XIP_BASE};

/// XIP address of the application's vector table.
const APP_VECTOR_TABLE: u32 = XIP_BASE + APP_FLASH_OFFSET;

const RAM_START: u32 = 0x2000_0000;
const RAM_END: u32 = 0x2004_2000;

fn read_vector(offset: u32) -> u32 {
    unsafe { ((APP_VECTOR_TABLE + offset) as *const u32).read_volatile() }
}

/// Whether something bootable sits at the application base. An erased or
/// half-written image fails the check and keeps the device in update
/// mode.
pub fn application_present() -> bool {
    let initial_sp = read_vector(0);
    (RAM_START..=RAM_END).contains(&initial_sp)
}

/// Boots the application.
///
/// # Safety
///
/// This modifies the stack pointer and reset vector and runs whatever is
/// programmed at the application base. Call only after
/// [`application_present`] and only before interrupts are in use.
pub unsafe fn start_application() -> ! {
    let msp = read_vector(0);
    let reset = read_vector(4);

    defmt::info!("msp = {=u32:x}, reset = {=u32:x}", msp, reset);

    cortex_m::interrupt::disable();

    const SCB_VTOR: *mut u32 = 0xE000_ED08 as *mut u32;
    SCB_VTOR.write_volatile(APP_VECTOR_TABLE);
    cortex_m::asm::dsb();
    cortex_m::asm::isb();

    core::arch::asm!(
        "msr msp, {sp}",
        "bx {reset}",
        sp = in(reg) msp,
        reset = in(reg) reset,
        options(noreturn)
    );
}
