// SPDX-FileCopyrightText: 2026 Craplab <hello@craplab.fi>
// SPDX-License-Identifier: MIT

//! Command-line flasher for devices running the Glimmer bootloader.

mod device;
mod error;
mod image;

use std::error::Error;
use std::fs;
use std::path::PathBuf;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::warn;

use crate::device::Glimmer;
use crate::error::FlashError;
use crate::image::PageRecord;

/// Send-and-verify rounds before a page is declared unprogrammable.
const PAGE_ATTEMPTS: u32 = 3;

#[derive(Debug, Parser)]
#[command(about = "Flash firmware onto a device running the Glimmer bootloader")]
struct Args {
    /// Firmware image to flash; without it only the handshake runs
    image: Option<PathBuf>,
    /// Reboot into the application when done
    #[arg(short, long)]
    reset: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    pretty_env_logger::init();
    let args = Args::parse();

    let device = Glimmer::open()?;
    let banner = device.hello()?;
    println!("Connected to {banner}");

    if let Some(path) = &args.image {
        let records = image::paginate(&fs::read(path)?)?;
        device.start_update(records.len() as u16)?;

        let bar = ProgressBar::new(records.len() as u64);
        bar.set_style(ProgressStyle::with_template(
            "{bar:40.cyan/blue} {pos}/{len} pages",
        )?);
        for record in &records {
            flash_page(&device, record)?;
            bar.inc(1);
        }
        bar.finish();

        device.finish_update()?;
        println!("Flashed {} pages from {}", records.len(), path.display());
    }

    device.bye()?;
    if args.reset {
        device.reset()?;
        println!("Device is rebooting into the application");
    }
    Ok(())
}

fn flash_page(device: &Glimmer, record: &PageRecord) -> Result<(), FlashError> {
    for attempt in 1..=PAGE_ATTEMPTS {
        device.send_page(record)?;
        if device.read_back(record)? == record.payload() {
            return Ok(());
        }
        warn!("page {} mismatched on attempt {attempt}", record.index());
    }
    Err(FlashError::VerifyFailed {
        page: record.index(),
        attempts: PAGE_ATTEMPTS,
    })
}
