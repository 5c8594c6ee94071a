// SPDX-FileCopyrightText: 2026 Craplab <hello@craplab.fi>
// SPDX-License-Identifier: MIT

//! Glimmer bootloader update protocol.
//! The host flasher is the USB host and the Glimmer device is the target.
//! Defines the control-transfer request codes, the handshake magic, the
//! page-record layout and the device identity shared by both sides.
//!
//! Every value in here is wire contract: the device and the flasher are
//! built from the same constants, and changing any of them breaks updates
//! for devices already in the field.

#![no_std]

/// Size of one self-programmable memory page in bytes.
/// Also the largest payload a single page record can carry; the record's
/// one-byte length field could name up to 255, but anything past the
/// physical page size is meaningless.
pub const PAGE_SIZE: usize = 128;

/// Size of the page-record header: one page-index byte, one length byte.
pub const PAGE_HEADER_SIZE: usize = 2;

/// Size of a complete page record on the wire (header plus a full page).
pub const PAGE_RECORD_SIZE: usize = PAGE_HEADER_SIZE + PAGE_SIZE;

/// Banner returned verbatim on a successful handshake, so the host can
/// confirm it is actually talking to this bootloader before it commits to
/// an update. Null-free ASCII, name plus version tag.
pub const BANNER: &[u8] = b"Glimmer Bootloader 1.0";

/// Leading part of [`BANNER`] the host matches against; the trailing
/// version tag is allowed to differ between device and flasher.
pub const BANNER_PREFIX: &str = "Glimmer Bootloader ";

/// Magic number expected as the value parameter of a [`CMD_HELLO`] request.
pub const HELLO_VALUE: u16 = 0x4D6F;

/// Magic number expected as the index parameter of a [`CMD_HELLO`] request.
/// Together with [`HELLO_VALUE`] the four bytes spell a greeting in ASCII;
/// an identification nonce, not a security mechanism.
pub const HELLO_INDEX: u16 = 0x6921;

/// USB vendor ID the device enumerates with (pid.codes).
pub const USB_VID: u16 = 0x1209;

/// USB product ID the device enumerates with (pid.codes test PID).
pub const USB_PID: u16 = 0x0001;

/// Request to establish a connection; replies with [`BANNER`].
pub const CMD_HELLO: u8 = 0x01;
/// Request to initialize a firmware update; value = number of pages to come.
pub const CMD_FWUPDATE_INIT: u8 = 0x10;
/// Request to send a single page record during a firmware update.
pub const CMD_FWUPDATE_MEMPAGE: u8 = 0x11;
/// Request to read the last written memory page back for verification.
pub const CMD_FWUPDATE_VERIFY: u8 = 0x12;
/// Request to finalize the firmware update.
pub const CMD_FWUPDATE_FINALIZE: u8 = 0x13;
/// Request to end an ongoing connection.
pub const CMD_BYE: u8 = 0xF0;
/// Request to reset the device.
pub const CMD_RESET: u8 = 0xFA;

/// The fixed fields of a control-transfer setup stage, as handed to the
/// device by its transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupPacket {
    /// Request code, one of the `CMD_*` values.
    pub request: u8,
    /// First parameter word; meaning depends on the request.
    pub value: u16,
    /// Second parameter word; meaning depends on the request.
    pub index: u16,
    /// Length of the data stage that follows (host to device) or is
    /// requested (device to host).
    pub length: u16,
}

/// A decoded protocol command. Each variant carries only the parameters
/// that command actually uses; validation of the parameters against the
/// session state is the state machine's job, not the parser's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Handshake request carrying the two magic words for checking.
    Hello { value: u16, index: u16 },
    /// Update initiation; `page_count` is the host's declared total.
    InitUpdate { page_count: u16 },
    /// A page record of `transfer_len` bytes follows in the data stage.
    SendPage { transfer_len: u16 },
    /// The host wants to read `read_len` bytes of the last page back.
    VerifyPage { read_len: u16 },
    /// The update is complete.
    FinalizeUpdate,
    /// Drop back to idle, abandoning any transfer in progress.
    Bye,
    /// Reset the device.
    ResetDevice,
}

impl Command {
    /// Decode a setup packet into a command, or `None` for request codes
    /// this protocol does not know (which the device silently ignores).
    pub fn parse(setup: &SetupPacket) -> Option<Self> {
        let cmd = match setup.request {
            CMD_HELLO => Command::Hello {
                value: setup.value,
                index: setup.index,
            },
            CMD_FWUPDATE_INIT => Command::InitUpdate {
                page_count: setup.value,
            },
            CMD_FWUPDATE_MEMPAGE => Command::SendPage {
                transfer_len: setup.length,
            },
            CMD_FWUPDATE_VERIFY => Command::VerifyPage {
                read_len: setup.length,
            },
            CMD_FWUPDATE_FINALIZE => Command::FinalizeUpdate,
            CMD_BYE => Command::Bye,
            CMD_RESET => Command::ResetDevice,
            _ => return None,
        };
        Some(cmd)
    }
}

/// The device's answer to a setup stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupReply {
    /// Answer immediately with these bytes (empty slice = bare ack).
    Respond(&'static [u8]),
    /// A multi-chunk data stage follows; route it to the write or read hook.
    ExpectData,
    /// Silently drop the request; no response of any kind.
    Ignored,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(request: u8, value: u16, index: u16, length: u16) -> SetupPacket {
        SetupPacket {
            request,
            value,
            index,
            length,
        }
    }

    #[test]
    fn parses_every_command_code() {
        assert_eq!(
            Command::parse(&setup(CMD_HELLO, HELLO_VALUE, HELLO_INDEX, 128)),
            Some(Command::Hello {
                value: HELLO_VALUE,
                index: HELLO_INDEX
            })
        );
        assert_eq!(
            Command::parse(&setup(CMD_FWUPDATE_INIT, 42, 0, 0)),
            Some(Command::InitUpdate { page_count: 42 })
        );
        assert_eq!(
            Command::parse(&setup(CMD_FWUPDATE_MEMPAGE, 0, 0, 130)),
            Some(Command::SendPage { transfer_len: 130 })
        );
        assert_eq!(
            Command::parse(&setup(CMD_FWUPDATE_VERIFY, 0, 0, 128)),
            Some(Command::VerifyPage { read_len: 128 })
        );
        assert_eq!(
            Command::parse(&setup(CMD_FWUPDATE_FINALIZE, 0, 0, 0)),
            Some(Command::FinalizeUpdate)
        );
        assert_eq!(Command::parse(&setup(CMD_BYE, 0, 0, 0)), Some(Command::Bye));
        assert_eq!(
            Command::parse(&setup(CMD_RESET, 0, 0, 0)),
            Some(Command::ResetDevice)
        );
    }

    #[test]
    fn unknown_codes_parse_to_none() {
        for request in [0x00, 0x02, 0x14, 0x80, 0xF1, 0xFF] {
            assert_eq!(Command::parse(&setup(request, 0, 0, 0)), None);
        }
    }

    #[test]
    fn hello_parser_does_not_check_magic() {
        // Magic validation belongs to the state machine; the parser only
        // carries the words through.
        assert_eq!(
            Command::parse(&setup(CMD_HELLO, 0, 0, 0)),
            Some(Command::Hello { value: 0, index: 0 })
        );
    }

    #[test]
    fn banner_is_null_free_ascii() {
        assert!(BANNER.iter().all(|b| b.is_ascii() && *b != 0));
        assert!(core::str::from_utf8(BANNER)
            .unwrap()
            .starts_with(BANNER_PREFIX));
    }

    #[test]
    fn page_record_fits_length_byte() {
        // The record length field is one byte; a full page must be
        // representable in it.
        assert!(PAGE_SIZE <= u8::MAX as usize);
        assert_eq!(PAGE_RECORD_SIZE, PAGE_HEADER_SIZE + PAGE_SIZE);
    }
}
