// SPDX-FileCopyrightText: 2026 Craplab <hello@craplab.fi>
// SPDX-License-Identifier: MIT

//! Core of the Glimmer bootloader: the connection state machine, the page
//! assembler, the read-back responder, the page programmer and the run loop.
//!
//! Everything in here is hardware-free. The bus transport drives the three
//! [`ControlHandler`] hooks, flash is reached through [`PageMemory`], and
//! the board's idle delay sits behind [`Board`]; the firmware binary and the
//! host-side tests wire those seams up in their own ways.
//!
//! There is no heap and no recursion; the working state is one page record
//! plus two small cursors inside [`Bootloader`].

#![cfg_attr(not(test), no_std)]

mod memory;
mod runner;
mod session;

pub use memory::{program_page, PageMemory};
pub use runner::{Board, LoopAction, Transport, SHUTDOWN_GRACE};
pub use session::{Bootloader, ControlHandler, PageChunk, SessionState};
