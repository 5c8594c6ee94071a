// SPDX-FileCopyrightText: 2026 Craplab <hello@craplab.fi>
// SPDX-License-Identifier: MIT

//! Bridges endpoint-zero vendor requests into the bootloader session.
//!
//! The device has no other USB function; one vendor interface exists so
//! hosts have something to enumerate, but all traffic runs over control
//! transfers.

use boot_protocol::{SetupPacket, SetupReply};
use bootloader_core::{Bootloader, ControlHandler};
use usb_device::class_prelude::*;
use usb_device::control;

use crate::flash::RomFlash;

pub struct ControlBridge {
    iface: InterfaceNumber,
    session: Bootloader<RomFlash>,
}

impl ControlBridge {
    pub fn new<B: UsbBus>(
        alloc: &UsbBusAllocator<B>,
        session: Bootloader<RomFlash>,
    ) -> Self {
        ControlBridge {
            iface: alloc.interface(),
            session,
        }
    }

    pub fn session_mut(&mut self) -> &mut Bootloader<RomFlash> {
        &mut self.session
    }

    fn wants(req: &control::Request) -> bool {
        req.request_type == control::RequestType::Vendor
            && req.recipient == control::Recipient::Device
    }

    fn setup_packet(req: &control::Request) -> SetupPacket {
        SetupPacket {
            request: req.request,
            value: req.value,
            index: req.index,
            length: req.length,
        }
    }
}

impl<B: UsbBus> UsbClass<B> for ControlBridge {
    fn get_configuration_descriptors(
        &self,
        writer: &mut DescriptorWriter,
    ) -> usb_device::Result<()> {
        writer.interface(self.iface, 0xFF, 0, 0)
    }

    fn control_in(&mut self, xfer: ControlIn<B>) {
        let req = *xfer.request();
        if !Self::wants(&req) {
            return;
        }
        match self.session.on_setup(&Self::setup_packet(&req)) {
            SetupReply::Respond(bytes) => {
                let _ = xfer.accept_with_static(bytes);
            }
            SetupReply::ExpectData => {
                let _ = xfer.accept(|buf| Ok(self.session.on_host_read(buf)));
            }
            SetupReply::Ignored => {
                let _ = xfer.reject();
            }
        }
    }

    fn control_out(&mut self, xfer: ControlOut<B>) {
        let req = *xfer.request();
        if !Self::wants(&req) {
            return;
        }
        match self.session.on_setup(&Self::setup_packet(&req)) {
            SetupReply::Respond(_) => {
                let _ = xfer.accept();
            }
            SetupReply::ExpectData => {
                // The stack hands over the data stage in one piece.
                self.session.on_host_write(xfer.data());
                let _ = xfer.accept();
            }
            SetupReply::Ignored => {
                let _ = xfer.reject();
            }
        }
    }
}
