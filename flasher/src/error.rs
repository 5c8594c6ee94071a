// SPDX-FileCopyrightText: 2026 Craplab <hello@craplab.fi>
// SPDX-License-Identifier: MIT

use boot_protocol::{USB_PID, USB_VID};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlashError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("usb transfer: {0}")]
    Transfer(#[from] nusb::transfer::TransferError),

    #[error("no bootloader found at {USB_VID:04x}:{USB_PID:04x}; is the device in update mode?")]
    DeviceNotFound,

    #[error("device did not answer with a bootloader banner (got {0:?})")]
    UnexpectedBanner(String),

    #[error("firmware image is empty")]
    EmptyImage,

    #[error("firmware image needs {pages} pages, at most {max} fit the wire format")]
    ImageTooLarge { pages: usize, max: usize },

    #[error("transfer was cut short ({got} of {want} bytes)")]
    ShortTransfer { got: usize, want: usize },

    #[error("page {page} still mismatched after {attempts} attempts")]
    VerifyFailed { page: u8, attempts: u32 },
}
