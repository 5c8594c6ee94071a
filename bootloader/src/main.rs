// SPDX-FileCopyrightText: 2026 Craplab <hello@craplab.fi>
// SPDX-License-Identifier: MIT

//! Glimmer bootloader firmware.
//!
//! On power-up the activation pin decides what happens: left open, the
//! application boots immediately; held low, the device enumerates as a
//! vendor USB device and serves firmware updates until the host asks for
//! a reset.

#![no_std]
#![no_main]

mod flash;
mod jump;
mod usb;

use boot_protocol::{USB_PID, USB_VID};
use bootloader_core::{Bootloader, LoopAction};
use defmt::info;
use defmt_rtt as _;
use panic_probe as _;
use rp2040_hal as hal;

use cortex_m_rt::entry;
use embedded_hal::digital::InputPin;
use hal::fugit::ExtU32;
use usb_device::class_prelude::UsbBusAllocator;
use usb_device::prelude::*;

use crate::flash::RomFlash;
use crate::usb::ControlBridge;

#[link_section = ".boot2"]
#[used]
pub static BOOT2: [u8; 256] = rp2040_boot2::BOOT_LOADER_GENERIC_03H;

const XTAL_FREQ_HZ: u32 = 12_000_000;

#[entry]
fn main() -> ! {
    let mut pac = hal::pac::Peripherals::take().unwrap();

    let mut watchdog = hal::Watchdog::new(pac.WATCHDOG);
    let clocks = hal::clocks::init_clocks_and_plls(
        XTAL_FREQ_HZ,
        pac.XOSC,
        pac.CLOCKS,
        pac.PLL_SYS,
        pac.PLL_USB,
        &mut pac.RESETS,
        &mut watchdog,
    )
    .ok()
    .unwrap();

    let sio = hal::Sio::new(pac.SIO);
    let pins = hal::gpio::Pins::new(
        pac.IO_BANK0,
        pac.PADS_BANK0,
        sio.gpio_bank0,
        &mut pac.RESETS,
    );

    // Update mode is requested by strapping the activation pin low at
    // power-up. Give the pull-up a moment to settle before sampling.
    let mut activate = pins.gpio22.into_pull_up_input();
    cortex_m::asm::delay(10_000);
    let update_requested = activate.is_low().unwrap_or(false);

    if !update_requested && jump::application_present() {
        info!("starting application");
        unsafe { jump::start_application() }
    }

    info!("entering update mode");

    let usb_bus = UsbBusAllocator::new(hal::usb::UsbBus::new(
        pac.USBCTRL_REGS,
        pac.USBCTRL_DPRAM,
        clocks.usb_clock,
        true,
        &mut pac.RESETS,
    ));

    let mut bridge = ControlBridge::new(&usb_bus, Bootloader::new(RomFlash::new()));
    let mut usb_dev = UsbDeviceBuilder::new(&usb_bus, UsbVidPid(USB_VID, USB_PID))
        .strings(&[StringDescriptors::default()
            .manufacturer("Craplab")
            .product("Glimmer Bootloader")])
        .unwrap()
        .build();

    loop {
        usb_dev.poll(&mut [&mut bridge]);
        match bridge.session_mut().service() {
            LoopAction::Shutdown => break,
            LoopAction::IdleWait => cortex_m::asm::delay(10_000),
            LoopAction::Continue => {}
        }
    }

    info!("host requested reset, rebooting");
    // Let the final status stage drain off the bus before dropping it.
    cortex_m::asm::delay(1_000_000);

    // Arm the watchdog and never feed it; the part comes back up through
    // the normal power-on path and takes the application branch.
    cortex_m::interrupt::disable();
    watchdog.start(10_000u32.micros());
    loop {
        cortex_m::asm::wfi();
    }
}
