// SPDX-FileCopyrightText: 2026 Craplab <hello@craplab.fi>
// SPDX-License-Identifier: MIT

//! The hardware seam for self-programmable memory, and the page programmer
//! built on top of it.

use crate::session::PageChunk;

/// Access to the device's self-programmable memory, one physical page at a
/// time.
///
/// The programmer drives these in a fixed sequence: erase, fill words,
/// commit, with a busy-wait after erase and commit. Implementations map
/// them onto whatever the target's flash controller wants; on controllers
/// without a word-granular write buffer, `fill_word` stages into RAM and
/// `write_page` commits the staged page.
///
/// There is no error channel. A failure at this layer is a hardware fault
/// the software cannot recover from, and the device is expected to end up
/// in its watchdog reset rather than continue in an unknown state.
pub trait PageMemory {
    /// Erase the physical page starting at `address`.
    fn erase_page(&mut self, address: u32);

    /// Stage one little-endian word at `address` for the next commit.
    fn fill_word(&mut self, address: u32, word: u16);

    /// Commit the staged words to the page starting at `address`.
    fn write_page(&mut self, address: u32);

    /// Block until the previous erase or commit has finished.
    fn busy_wait(&mut self);

    /// Make programmed memory visible to the read path again. A no-op on
    /// targets whose reads are never locked out during programming.
    fn enable_read(&mut self);

    /// Read one byte of programmed memory.
    fn read_byte(&self, address: u32) -> u8;
}

/// Program one assembled page record into memory.
///
/// Runs inside a critical section: any transport activity during the
/// erase/write window is unsafe on this class of hardware, so interrupts
/// stay off for the whole sequence and the caller's run loop simply blocks.
///
/// Only `payload_len` bytes are committed. An odd payload's final word is
/// padded with `0xFF`, the erased-flash value, so the host can never rely
/// on stale bytes beyond the payload.
pub fn program_page<M: PageMemory>(memory: &mut M, chunk: &PageChunk) {
    let address = chunk.start_address();

    critical_section::with(|_| {
        memory.erase_page(address);
        memory.busy_wait();

        let mut offset = 0u32;
        let mut words = chunk.payload().chunks_exact(2);
        for pair in words.by_ref() {
            memory.fill_word(address + offset, u16::from_le_bytes([pair[0], pair[1]]));
            offset += 2;
        }
        if let [last] = words.remainder() {
            memory.fill_word(address + offset, u16::from_le_bytes([*last, 0xFF]));
        }

        memory.write_page(address);
        memory.busy_wait();
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Bootloader, ControlHandler};
    use boot_protocol::{
        SetupPacket, CMD_FWUPDATE_INIT, CMD_FWUPDATE_MEMPAGE, CMD_HELLO, HELLO_INDEX, HELLO_VALUE,
        PAGE_SIZE,
    };

    /// Records the exact operation sequence the programmer performs.
    #[derive(Default)]
    struct TraceMemory {
        ops: Vec<Op>,
    }

    #[derive(Debug, PartialEq)]
    enum Op {
        Erase(u32),
        Fill(u32, u16),
        Write(u32),
        Wait,
    }

    impl PageMemory for TraceMemory {
        fn erase_page(&mut self, address: u32) {
            self.ops.push(Op::Erase(address));
        }
        fn fill_word(&mut self, address: u32, word: u16) {
            self.ops.push(Op::Fill(address, word));
        }
        fn write_page(&mut self, address: u32) {
            self.ops.push(Op::Write(address));
        }
        fn busy_wait(&mut self) {
            self.ops.push(Op::Wait);
        }
        fn enable_read(&mut self) {}
        fn read_byte(&self, _address: u32) -> u8 {
            0xFF
        }
    }

    /// Build a bootloader holding an assembled page record.
    fn assembled(page_index: u8, payload: &[u8]) -> Bootloader<TraceMemory> {
        let mut b = Bootloader::new(TraceMemory::default());
        b.on_setup(&SetupPacket {
            request: CMD_HELLO,
            value: HELLO_VALUE,
            index: HELLO_INDEX,
            length: 0,
        });
        b.on_setup(&SetupPacket {
            request: CMD_FWUPDATE_INIT,
            value: 1,
            index: 0,
            length: 0,
        });
        b.on_setup(&SetupPacket {
            request: CMD_FWUPDATE_MEMPAGE,
            value: 0,
            index: 0,
            length: (payload.len() + 2) as u16,
        });
        let mut record = vec![page_index, payload.len() as u8];
        record.extend_from_slice(payload);
        assert!(b.on_host_write(&record));
        b
    }

    #[test]
    fn programs_erase_fill_commit_in_order() {
        let mut b = assembled(2, &[0x01, 0x02, 0x03, 0x04]);
        let chunk_addr = b.page().start_address();
        assert_eq!(chunk_addr, PAGE_SIZE as u32);

        let mut memory = core::mem::take(&mut b.memory);
        program_page(&mut memory, b.page());

        assert_eq!(
            memory.ops,
            vec![
                Op::Erase(chunk_addr),
                Op::Wait,
                Op::Fill(chunk_addr, 0x0201),
                Op::Fill(chunk_addr + 2, 0x0403),
                Op::Write(chunk_addr),
                Op::Wait,
            ]
        );
    }

    #[test]
    fn odd_payload_pads_final_word_with_erased_value() {
        let mut b = assembled(1, &[0xAA, 0xBB, 0xCC]);
        let mut memory = core::mem::take(&mut b.memory);
        program_page(&mut memory, b.page());

        assert_eq!(
            memory.ops,
            vec![
                Op::Erase(0),
                Op::Wait,
                Op::Fill(0, 0xBBAA),
                Op::Fill(2, 0xFFCC),
                Op::Write(0),
                Op::Wait,
            ]
        );
    }

    #[test]
    fn empty_payload_still_erases_and_commits() {
        let mut b = assembled(1, &[]);
        let mut memory = core::mem::take(&mut b.memory);
        program_page(&mut memory, b.page());

        assert_eq!(
            memory.ops,
            vec![Op::Erase(0), Op::Wait, Op::Write(0), Op::Wait]
        );
    }
}
