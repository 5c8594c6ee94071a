// SPDX-FileCopyrightText: 2026 Craplab <hello@craplab.fi>
// SPDX-License-Identifier: MIT

//! Splitting a firmware image into the page records the device expects.

use boot_protocol::{PAGE_HEADER_SIZE, PAGE_SIZE};

use crate::error::FlashError;

/// Highest page a one-byte 1-based index can name.
const MAX_PAGES: usize = u8::MAX as usize;

/// One page of the image, addressed by its 1-based wire index.
pub struct PageRecord {
    index: u8,
    payload: Vec<u8>,
}

impl PageRecord {
    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// The record as it goes on the wire: page index, payload length,
    /// payload bytes.
    pub fn wire_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(PAGE_HEADER_SIZE + self.payload.len());
        out.push(self.index);
        out.push(self.payload.len() as u8);
        out.extend_from_slice(&self.payload);
        out
    }
}

/// Split `image` into page records. Only the final record may be shorter
/// than a full page.
pub fn paginate(image: &[u8]) -> Result<Vec<PageRecord>, FlashError> {
    if image.is_empty() {
        return Err(FlashError::EmptyImage);
    }
    let pages = image.len().div_ceil(PAGE_SIZE);
    if pages > MAX_PAGES {
        return Err(FlashError::ImageTooLarge {
            pages,
            max: MAX_PAGES,
        });
    }

    Ok(image
        .chunks(PAGE_SIZE)
        .enumerate()
        .map(|(i, chunk)| PageRecord {
            index: (i + 1) as u8,
            payload: chunk.to_vec(),
        })
        .collect())
}
