// SPDX-FileCopyrightText: 2026 Craplab <hello@craplab.fi>
// SPDX-License-Identifier: MIT

//! USB access to a device sitting in the bootloader.
//!
//! Everything goes over vendor control transfers on endpoint zero, so no
//! interface needs to be claimed. Each request maps 1:1 onto a bootloader
//! command.

use std::time::Duration;

use boot_protocol::{
    BANNER_PREFIX, CMD_BYE, CMD_FWUPDATE_FINALIZE, CMD_FWUPDATE_INIT, CMD_FWUPDATE_MEMPAGE,
    CMD_FWUPDATE_VERIFY, CMD_HELLO, CMD_RESET, HELLO_INDEX, HELLO_VALUE, PAGE_SIZE, USB_PID,
    USB_VID,
};
use log::debug;
use nusb::transfer::{Control, ControlType, Recipient};

use crate::error::FlashError;
use crate::image::PageRecord;

/// Matches the bootloader's idle-loop polling cadence with a wide margin.
const IO_TIMEOUT: Duration = Duration::from_millis(2000);

pub struct Glimmer {
    device: nusb::Device,
}

impl Glimmer {
    /// Open the first bootloader on the bus.
    pub fn open() -> Result<Self, FlashError> {
        let info = nusb::list_devices()?
            .find(|d| d.vendor_id() == USB_VID && d.product_id() == USB_PID)
            .ok_or(FlashError::DeviceNotFound)?;
        debug!(
            "bootloader on bus {} address {}",
            info.bus_number(),
            info.device_address()
        );
        Ok(Glimmer {
            device: info.open()?,
        })
    }

    fn control(request: u8, value: u16, index: u16) -> Control {
        Control {
            control_type: ControlType::Vendor,
            recipient: Recipient::Device,
            request,
            value,
            index,
        }
    }

    fn send(&self, request: u8, value: u16, data: &[u8]) -> Result<(), FlashError> {
        let sent =
            self.device
                .control_out_blocking(Self::control(request, value, 0), data, IO_TIMEOUT)?;
        if sent != data.len() {
            return Err(FlashError::ShortTransfer {
                got: sent,
                want: data.len(),
            });
        }
        Ok(())
    }

    fn recv(&self, request: u8, value: u16, index: u16, len: usize) -> Result<Vec<u8>, FlashError> {
        let mut buf = vec![0u8; len];
        let got = self.device.control_in_blocking(
            Self::control(request, value, index),
            &mut buf,
            IO_TIMEOUT,
        )?;
        buf.truncate(got);
        Ok(buf)
    }

    /// Handshake with the device and return its banner.
    pub fn hello(&self) -> Result<String, FlashError> {
        let banner = self.recv(CMD_HELLO, HELLO_VALUE, HELLO_INDEX, PAGE_SIZE)?;
        let text = String::from_utf8_lossy(&banner).into_owned();
        if !text.starts_with(BANNER_PREFIX) {
            return Err(FlashError::UnexpectedBanner(text));
        }
        Ok(text)
    }

    pub fn start_update(&self, pages: u16) -> Result<(), FlashError> {
        debug!("starting update, {pages} pages");
        self.send(CMD_FWUPDATE_INIT, pages, &[])
    }

    pub fn send_page(&self, record: &PageRecord) -> Result<(), FlashError> {
        debug!(
            "sending page {}, {} payload bytes",
            record.index(),
            record.payload().len()
        );
        self.send(CMD_FWUPDATE_MEMPAGE, 0, &record.wire_bytes())
    }

    /// Read back the page the device just programmed.
    pub fn read_back(&self, record: &PageRecord) -> Result<Vec<u8>, FlashError> {
        self.recv(CMD_FWUPDATE_VERIFY, 0, 0, record.payload().len())
    }

    pub fn finish_update(&self) -> Result<(), FlashError> {
        self.send(CMD_FWUPDATE_FINALIZE, 0, &[])
    }

    pub fn bye(&self) -> Result<(), FlashError> {
        self.send(CMD_BYE, 0, &[])
    }

    /// Ask the bootloader to reboot into the application. Only honored
    /// once the session is back in idle, so call [`Self::bye`] first.
    pub fn reset(&self) -> Result<(), FlashError> {
        self.send(CMD_RESET, 0, &[])
    }
}
