// SPDX-FileCopyrightText: 2026 Craplab <hello@craplab.fi>
// SPDX-License-Identifier: MIT

//! Connection state machine, page assembler and verify responder.
//!
//! The whole protocol state lives in one [`Bootloader`] value owned by the
//! run loop; the transport calls back into it through [`ControlHandler`]
//! while being polled. Nothing here ever blocks waiting on the host.

use boot_protocol::{
    Command, SetupPacket, SetupReply, BANNER, HELLO_INDEX, HELLO_VALUE, PAGE_HEADER_SIZE,
    PAGE_RECORD_SIZE, PAGE_SIZE,
};
use log::{debug, info};

use crate::memory::PageMemory;

/// The device's protocol state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for a handshake.
    Idle,
    /// Handshake done, waiting for an update to be initialized.
    Greeted,
    /// Update initialized, page transfers and verifies are allowed.
    Updating,
    /// A reset was requested; the run loop is counting down to shutdown.
    ResettingPending,
}

/// One firmware page as it arrives on the wire: a page-index byte, a
/// payload-length byte, then up to [`PAGE_SIZE`] payload bytes.
///
/// The record is filled byte-for-byte by the assembler, consumed by the
/// programmer, then read by the verify responder; ownership passes through
/// those three strictly in sequence.
pub struct PageChunk {
    raw: [u8; PAGE_RECORD_SIZE],
}

impl PageChunk {
    const fn new() -> Self {
        PageChunk {
            raw: [0; PAGE_RECORD_SIZE],
        }
    }

    /// 1-based page number this record targets.
    pub fn page_index(&self) -> u8 {
        self.raw[0]
    }

    /// Number of meaningful payload bytes, clamped to the physical page
    /// size (the wire field could name more, but nothing past a page is
    /// ever programmed).
    pub fn payload_len(&self) -> usize {
        usize::from(self.raw[1]).min(PAGE_SIZE)
    }

    /// The meaningful payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.raw[PAGE_HEADER_SIZE..PAGE_HEADER_SIZE + self.payload_len()]
    }

    /// Physical byte address of the page: `(page_index - 1) * PAGE_SIZE`.
    /// Page indices start at 1; an out-of-contract index 0 saturates to
    /// page 1 rather than wrapping into arbitrary memory.
    pub fn start_address(&self) -> u32 {
        u32::from(self.page_index().saturating_sub(1)) * PAGE_SIZE as u32
    }
}

/// Reception cursor for an armed page transfer.
#[derive(Default)]
struct ReceiveCursor {
    /// Bytes the setup stage announced for this transfer.
    expected: usize,
    /// Bytes copied into the page record so far.
    received: usize,
    /// Page-ready signal: set by the assembler when the record is complete,
    /// cleared by the run loop once programming has been triggered.
    complete: bool,
}

/// Send cursor for an armed verify exchange.
#[derive(Default)]
struct VerifyCursor {
    /// Total bytes the host asked to read back.
    total: usize,
    /// Bytes already returned; monotonically increasing, capped at `total`.
    sent: usize,
}

/// The three transport-facing entry points of the bootloader. All are
/// invoked synchronously from the transport's poll call and must never
/// block.
pub trait ControlHandler {
    /// A control-transfer setup stage arrived.
    fn on_setup(&mut self, setup: &SetupPacket) -> SetupReply;

    /// A chunk of host-to-device data for an armed transfer. Returns true
    /// once the transfer is fully received, which tells the transport to
    /// stop expecting chunks.
    fn on_host_write(&mut self, data: &[u8]) -> bool;

    /// Fill `buf` with the next device-to-host bytes of an armed read.
    /// Returns how many bytes were produced, never more than fit in `buf`
    /// nor more than remain in the exchange.
    fn on_host_read(&mut self, buf: &mut [u8]) -> usize;
}

/// The bootloader session: protocol state, the shared page record, both
/// transfer cursors and the page memory it programs.
pub struct Bootloader<M: PageMemory> {
    state: SessionState,
    chunk: PageChunk,
    recv: ReceiveCursor,
    verify: VerifyCursor,
    /// Host-declared page total from InitUpdate. Informational only; page
    /// indices are deliberately not checked against it.
    page_count: u16,
    pub(crate) shutdown_counter: u8,
    pub(crate) memory: M,
}

impl<M: PageMemory> Bootloader<M> {
    pub fn new(memory: M) -> Self {
        Bootloader {
            state: SessionState::Idle,
            chunk: PageChunk::new(),
            recv: ReceiveCursor::default(),
            verify: VerifyCursor::default(),
            page_count: 0,
            shutdown_counter: 0,
            memory,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The page record in its current state. Meaningful to callers only
    /// between a completed transfer and the next SendPage.
    pub fn page(&self) -> &PageChunk {
        &self.chunk
    }

    /// Host-declared number of pages for the running update.
    pub fn expected_page_count(&self) -> u16 {
        self.page_count
    }

    /// The page memory this session programs.
    pub fn memory(&self) -> &M {
        &self.memory
    }

    /// Whether a fully assembled page is waiting to be programmed.
    pub(crate) fn page_ready(&self) -> bool {
        self.recv.complete
    }

    /// Program the assembled page and clear the page-ready signal. Called
    /// from the run loop only; blocks for the whole erase/write window.
    pub(crate) fn program_pending(&mut self) {
        debug!(
            "page {} addr {} with {} bytes",
            self.chunk.page_index(),
            self.chunk.start_address(),
            self.chunk.payload_len()
        );
        crate::memory::program_page(&mut self.memory, &self.chunk);
        self.recv.complete = false;
    }
}

impl<M: PageMemory> ControlHandler for Bootloader<M> {
    fn on_setup(&mut self, setup: &SetupPacket) -> SetupReply {
        let Some(command) = Command::parse(setup) else {
            return SetupReply::Ignored;
        };

        match (command, self.state) {
            // The handshake requires idle state and both magic words, so a
            // stray request aimed at the device cannot start a flash write.
            (Command::Hello { value, index }, SessionState::Idle)
                if value == HELLO_VALUE && index == HELLO_INDEX =>
            {
                info!("HELLO");
                self.state = SessionState::Greeted;
                SetupReply::Respond(BANNER)
            }

            (Command::InitUpdate { page_count }, SessionState::Greeted) => {
                info!("FWUPDATE_INIT: {} pages to come", page_count);
                self.page_count = page_count;
                self.state = SessionState::Updating;
                SetupReply::Respond(&[])
            }

            (Command::SendPage { transfer_len }, SessionState::Updating) => {
                debug!("FWUPDATE_MEMPAGE: {} bytes", transfer_len);
                // An oversized announcement is cut at the record size so a
                // hostile length cannot run the assembler past the buffer.
                self.recv = ReceiveCursor {
                    expected: usize::from(transfer_len).min(PAGE_RECORD_SIZE),
                    received: 0,
                    complete: false,
                };
                SetupReply::ExpectData
            }

            (Command::VerifyPage { read_len }, SessionState::Updating) => {
                debug!(
                    "FWUPDATE_VERIFY: page {} len {}",
                    self.chunk.page_index(),
                    read_len
                );
                // The page just programmed must be visible to the read path
                // before any byte is served back.
                self.memory.enable_read();
                self.verify = VerifyCursor {
                    total: usize::from(read_len),
                    sent: 0,
                };
                SetupReply::ExpectData
            }

            (Command::FinalizeUpdate, SessionState::Updating) => {
                info!("FWUPDATE_FINALIZE");
                self.memory.enable_read();
                self.state = SessionState::Greeted;
                SetupReply::Respond(&[])
            }

            // Bye is valid from every state and abandons (does not roll
            // back) any transfer in progress.
            (Command::Bye, _) => {
                info!("BYE");
                self.state = SessionState::Idle;
                SetupReply::Respond(&[])
            }

            (Command::ResetDevice, SessionState::Idle) => {
                info!("RESET");
                self.state = SessionState::ResettingPending;
                SetupReply::Respond(&[])
            }

            // Every other command/state pair is a defined no-op.
            _ => SetupReply::Ignored,
        }
    }

    fn on_host_write(&mut self, data: &[u8]) -> bool {
        let mut offered = data.iter();
        while self.recv.received < self.recv.expected {
            let Some(byte) = offered.next() else {
                return false;
            };
            self.chunk.raw[self.recv.received] = *byte;
            self.recv.received += 1;
        }

        debug!(
            "page {} assembled, {} bytes",
            self.chunk.page_index(),
            self.chunk.payload_len()
        );
        self.recv.complete = true;
        true
    }

    fn on_host_read(&mut self, buf: &mut [u8]) -> usize {
        let remaining = self.verify.total - self.verify.sent;
        let len = buf.len().min(remaining);
        let address = self.chunk.start_address() + self.verify.sent as u32;

        for (offset, slot) in buf[..len].iter_mut().enumerate() {
            *slot = self.memory.read_byte(address + offset as u32);
        }
        self.verify.sent += len;
        len
    }
}
