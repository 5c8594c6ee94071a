// SPDX-FileCopyrightText: 2026 Craplab <hello@craplab.fi>
// SPDX-License-Identifier: MIT

//! The cooperative run loop and the seams it drives.
//!
//! One iteration is: poll the transport (which routes any pending exchange
//! into the [`ControlHandler`] hooks synchronously), then let the session
//! do its housekeeping. Programming a completed page happens here, between
//! polls, never inside a transport callback.

use log::info;

use crate::memory::PageMemory;
use crate::session::{Bootloader, ControlHandler, SessionState};

/// Number of polls to keep servicing the bus after a reset was accepted,
/// so the in-flight control exchange can finish cleanly and the host does
/// not see a pipe error.
pub const SHUTDOWN_GRACE: u8 = 10;

/// What the run loop should do after one housekeeping step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// Poll again immediately.
    Continue,
    /// Nothing is going on; idle briefly to yield bus bandwidth.
    IdleWait,
    /// Grace period over; disconnect and reset the device.
    Shutdown,
}

/// The bus transport as seen by the run loop. Polling must dispatch any
/// pending setup/data exchange into the handler before returning.
pub trait Transport {
    fn poll(&mut self, handler: &mut dyn ControlHandler);

    /// Detach from the bus; called once, right before the device resets.
    fn disconnect(&mut self);
}

/// Board-level services the run loop needs besides the transport.
pub trait Board {
    /// Idle briefly between polls when the session has nothing to do.
    fn idle_wait(&mut self);
}

impl<M: PageMemory> Bootloader<M> {
    /// One housekeeping step, to be called after every transport poll.
    ///
    /// Drains the page-ready signal by programming synchronously, counts
    /// down the shutdown grace period once a reset is pending, and asks
    /// for an idle wait when the session is quiet.
    pub fn service(&mut self) -> LoopAction {
        // Drained regardless of state: the transport may deliver the final
        // page chunk and a Bye in the same poll, and the completed page
        // must neither go unwritten nor stay armed into a later session.
        if self.page_ready() {
            self.program_pending();
        }
        match self.state() {
            SessionState::Updating => LoopAction::Continue,
            SessionState::ResettingPending => {
                self.shutdown_counter += 1;
                if self.shutdown_counter >= SHUTDOWN_GRACE {
                    LoopAction::Shutdown
                } else {
                    LoopAction::Continue
                }
            }
            SessionState::Idle | SessionState::Greeted => LoopAction::IdleWait,
        }
    }

    /// Run the protocol until a device reset is due, then disconnect from
    /// the bus and return so the caller can perform the actual reset
    /// (interrupts off, watchdog armed and never fed).
    pub fn run(&mut self, transport: &mut impl Transport, board: &mut impl Board) {
        loop {
            transport.poll(self);
            match self.service() {
                LoopAction::Continue => {}
                LoopAction::IdleWait => board.idle_wait(),
                LoopAction::Shutdown => break,
            }
        }
        info!("shutting down for reset");
        transport.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boot_protocol::{SetupPacket, SetupReply, CMD_RESET};

    struct NullMemory;

    impl PageMemory for NullMemory {
        fn erase_page(&mut self, _address: u32) {}
        fn fill_word(&mut self, _address: u32, _word: u16) {}
        fn write_page(&mut self, _address: u32) {}
        fn busy_wait(&mut self) {}
        fn enable_read(&mut self) {}
        fn read_byte(&self, _address: u32) -> u8 {
            0xFF
        }
    }

    /// Delivers a reset on the first poll, then only counts polls.
    struct ResettingTransport {
        polls: usize,
        disconnected: bool,
    }

    impl Transport for ResettingTransport {
        fn poll(&mut self, handler: &mut dyn ControlHandler) {
            self.polls += 1;
            if self.polls == 1 {
                let reply = handler.on_setup(&SetupPacket {
                    request: CMD_RESET,
                    value: 0,
                    index: 0,
                    length: 0,
                });
                assert_eq!(reply, SetupReply::Respond(&[]));
            }
        }

        fn disconnect(&mut self) {
            self.disconnected = true;
        }
    }

    struct CountingBoard {
        idles: usize,
    }

    impl Board for CountingBoard {
        fn idle_wait(&mut self) {
            self.idles += 1;
        }
    }

    #[test]
    fn reset_is_delayed_by_the_grace_period() {
        let mut boot = Bootloader::new(NullMemory);
        let mut transport = ResettingTransport {
            polls: 0,
            disconnected: false,
        };
        let mut board = CountingBoard { idles: 0 };

        boot.run(&mut transport, &mut board);

        // The reset lands on the first poll; the loop keeps polling for
        // the full grace period before disconnecting.
        assert_eq!(transport.polls, usize::from(SHUTDOWN_GRACE));
        assert!(transport.disconnected);
        assert_eq!(board.idles, 0);
    }

    #[test]
    fn quiet_session_idles_every_iteration() {
        let mut boot = Bootloader::new(NullMemory);
        assert_eq!(boot.service(), LoopAction::IdleWait);
        assert_eq!(boot.service(), LoopAction::IdleWait);
    }
}
