// SPDX-FileCopyrightText: 2026 Craplab <hello@craplab.fi>
// SPDX-License-Identifier: MIT

//! Page memory backed by the RP2040 boot ROM flash routines.
//!
//! The protocol's 128-byte pages are much smaller than the 4K erase unit
//! of the XIP flash, so writes are staged: the sector being rewritten is
//! held in RAM, incoming pages land in it, and the whole sector goes to
//! flash when a different sector is touched or the host asks to read
//! back. Neighbouring pages of a sector survive because the stage starts
//! from the sector's current flash contents.

use boot_protocol::PAGE_SIZE;
use bootloader_core::PageMemory;

/// Flash as the XIP window maps it.
pub const XIP_BASE: u32 = 0x1000_0000;
/// Flash offset where the application image starts. Everything below it
/// belongs to the bootloader itself.
pub const APP_FLASH_OFFSET: u32 = 0x0001_0000;

const SECTOR_SIZE: u32 = 4096;
/// SECTOR_ERASE serial flash command.
const SECTOR_ERASE_CMD: u8 = 0x20;
const NO_SECTOR: u32 = u32::MAX;

pub struct RomFlash {
    /// RAM copy of the sector currently being rewritten.
    sector: [u8; SECTOR_SIZE as usize],
    /// Flash offset of the staged sector, or [`NO_SECTOR`].
    sector_offset: u32,
    /// Word-fill buffer for the page being assembled.
    page: [u8; PAGE_SIZE],
    dirty: bool,
}

impl RomFlash {
    pub fn new() -> Self {
        RomFlash {
            sector: [0xFF; SECTOR_SIZE as usize],
            sector_offset: NO_SECTOR,
            page: [0xFF; PAGE_SIZE],
            dirty: false,
        }
    }

    /// Bring the sector containing `flash_offset` into the stage,
    /// flushing whatever was staged before.
    fn stage_sector(&mut self, flash_offset: u32) {
        let target = flash_offset & !(SECTOR_SIZE - 1);
        if self.sector_offset == target {
            return;
        }
        self.flush();

        let src = (XIP_BASE + target) as *const u8;
        for (i, slot) in self.sector.iter_mut().enumerate() {
            *slot = unsafe { src.add(i).read_volatile() };
        }
        self.sector_offset = target;
    }

    /// Erase and reprogram the staged sector. XIP is unusable while the
    /// ROM routines run, so interrupts stay masked for the whole window.
    /// `interrupt::free` restores the previous PRIMASK state; `flush` can
    /// be entered from within an already held critical section.
    fn flush(&mut self) {
        if self.sector_offset == NO_SECTOR || !self.dirty {
            return;
        }
        defmt::debug!("flushing sector at flash offset {=u32:x}", self.sector_offset);

        cortex_m::interrupt::free(|_| unsafe {
            rp2040_hal::rom_data::connect_internal_flash();
            rp2040_hal::rom_data::flash_exit_xip();
            rp2040_hal::rom_data::flash_range_erase(
                self.sector_offset,
                SECTOR_SIZE as usize,
                SECTOR_SIZE,
                SECTOR_ERASE_CMD,
            );
            rp2040_hal::rom_data::flash_flush_cache();
            rp2040_hal::rom_data::flash_enter_cmd_xip();

            rp2040_hal::rom_data::connect_internal_flash();
            rp2040_hal::rom_data::flash_exit_xip();
            rp2040_hal::rom_data::flash_range_program(
                self.sector_offset,
                self.sector.as_ptr(),
                SECTOR_SIZE as usize,
            );
            rp2040_hal::rom_data::flash_flush_cache();
            rp2040_hal::rom_data::flash_enter_cmd_xip();
        });

        self.dirty = false;
    }

    /// Offset of `address` inside the staged sector.
    fn window(&self, address: u32) -> usize {
        (APP_FLASH_OFFSET + address - self.sector_offset) as usize
    }
}

impl Default for RomFlash {
    fn default() -> Self {
        Self::new()
    }
}

impl PageMemory for RomFlash {
    fn erase_page(&mut self, address: u32) {
        self.stage_sector(APP_FLASH_OFFSET + address);
        let window = self.window(address);
        self.sector[window..window + PAGE_SIZE].fill(0xFF);
        self.page.fill(0xFF);
        self.dirty = true;
    }

    fn fill_word(&mut self, address: u32, word: u16) {
        let offset = address as usize % PAGE_SIZE;
        self.page[offset..offset + 2].copy_from_slice(&word.to_le_bytes());
    }

    fn write_page(&mut self, address: u32) {
        self.stage_sector(APP_FLASH_OFFSET + address);
        let window = self.window(address);
        self.sector[window..window + PAGE_SIZE].copy_from_slice(&self.page);
        self.dirty = true;
    }

    fn busy_wait(&mut self) {
        // The ROM routines only return once the part is idle again.
    }

    fn enable_read(&mut self) {
        self.flush();
    }

    fn read_byte(&self, address: u32) -> u8 {
        let ptr = (XIP_BASE + APP_FLASH_OFFSET + address) as *const u8;
        unsafe { ptr.read_volatile() }
    }
}
