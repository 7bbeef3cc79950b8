// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Memory-write command protocol spoken to the serial bridge.
//!
//! An image is split into chunks of at most [`CHUNK_SIZE`] bytes. Each chunk
//! becomes one text line of the form `s<addr> <b0> <b1> ...\n`, with every
//! number in minimal lowercase hex.

use core::fmt::{self, Write as _};

use crate::error::UploadError;

// --- Protocol constants ---

/// Maximum payload bytes carried by one command line.
pub const CHUNK_SIZE: usize = 16;

/// Size of the little-endian load address header at the start of an image.
pub const HEADER_SIZE: usize = 2;

/// Capacity of a rendered command line.
///
/// The longest line is `s` + 8 address digits + 16 * " xx" + `\n` = 58 bytes.
pub const MAX_LINE_LEN: usize = 64;

/// One rendered command line, newline included.
pub type CommandLine = heapless::String<MAX_LINE_LEN>;

// --- Load plan ---

/// Where the payload goes and how many header bytes precede it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadPlan {
    pub base_address: u32,
    /// Either 0 (explicit address) or [`HEADER_SIZE`] (address read from image).
    pub skip_bytes: usize,
}

impl LoadPlan {
    /// Number of payload bytes this plan uploads from `image`.
    pub fn payload_len(&self, image: &[u8]) -> usize {
        image.len().saturating_sub(self.skip_bytes)
    }

    /// Position of the first payload byte.
    pub fn start(&self) -> Position {
        Position {
            address: self.base_address,
            offset: self.skip_bytes,
        }
    }
}

/// Decide the load address for `image`.
///
/// An explicit address wins and nothing is skipped. Otherwise the first two
/// bytes of the image are a little-endian load address and are not uploaded.
pub fn resolve(image: &[u8], explicit_address: Option<u32>) -> Result<LoadPlan, UploadError> {
    let plan = match explicit_address {
        Some(base_address) => LoadPlan {
            base_address,
            skip_bytes: 0,
        },
        None => {
            let [lo, hi] = match image {
                [lo, hi, ..] => [*lo, *hi],
                _ => return Err(UploadError::InsufficientData { len: image.len() }),
            };
            LoadPlan {
                base_address: u32::from(u16::from_le_bytes([lo, hi])),
                skip_bytes: HEADER_SIZE,
            }
        }
    };

    // The last payload byte must still be addressable.
    let end = u64::from(plan.base_address) + plan.payload_len(image) as u64;
    if end > 1 << 32 {
        return Err(UploadError::ImageTooLarge { len: image.len() });
    }

    Ok(plan)
}

/// Parse a textual load address as base 16.
///
/// A leading `0x` or `$` is accepted.
pub fn parse_load_address(text: &str) -> Result<u32, String> {
    let digits = text.trim();
    let digits = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
        .or_else(|| digits.strip_prefix('$'))
        .unwrap_or(digits);
    u32::from_str_radix(digits, 16).map_err(|e| format!("invalid hex address '{}': {}", text, e))
}

// --- Chunks ---

/// Location of a chunk: target address and source offset within the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub address: u32,
    pub offset: usize,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "address 0x{:x} (offset {})", self.address, self.offset)
    }
}

/// A slice of the image bound for one target address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    /// Source offset within the image.
    pub offset: usize,
    /// Target address of the first payload byte.
    pub address: u32,
    pub payload: &'a [u8],
}

impl Chunk<'_> {
    pub fn position(&self) -> Position {
        Position {
            address: self.address,
            offset: self.offset,
        }
    }

    pub fn command(&self) -> CommandLine {
        render_command(self.address, self.payload)
    }
}

/// Lazy iterator over the chunks of an image, in address order.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    image: &'a [u8],
    plan: LoadPlan,
    offset: usize,
}

/// Split the payload of `image` into chunks according to `plan`.
pub fn chunks(image: &[u8], plan: LoadPlan) -> Chunks<'_> {
    Chunks {
        image,
        plan,
        offset: plan.skip_bytes.min(image.len()),
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let image: &'a [u8] = self.image;
        let rest = &image[self.offset..];
        if rest.is_empty() {
            return None;
        }

        let len = rest.len().min(CHUNK_SIZE);
        // resolve() guarantees the whole payload fits in the address space
        let address = self.plan.base_address + (self.offset - self.plan.skip_bytes) as u32;
        let chunk = Chunk {
            offset: self.offset,
            address,
            payload: &rest[..len],
        };
        self.offset += len;
        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = (self.image.len() - self.offset).div_ceil(CHUNK_SIZE);
        (n, Some(n))
    }
}

impl ExactSizeIterator for Chunks<'_> {}

impl core::iter::FusedIterator for Chunks<'_> {}

/// Render the write command for `payload` at `address`.
///
/// # Panics
/// Panics if `payload` is longer than [`CHUNK_SIZE`].
pub fn render_command(address: u32, payload: &[u8]) -> CommandLine {
    assert!(
        payload.len() <= CHUNK_SIZE,
        "chunk payload of {} bytes exceeds {}",
        payload.len(),
        CHUNK_SIZE
    );

    // Cannot overflow: MAX_LINE_LEN covers the longest possible line.
    let mut line = CommandLine::new();
    let _ = write!(line, "s{:x}", address);
    for byte in payload {
        let _ = write!(line, " {:x}", byte);
    }
    let _ = line.push('\n');
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_longest_line_fits() {
        let line = render_command(u32::MAX, &[0xff; CHUNK_SIZE]);
        assert_eq!(line.len(), 58);
        assert!(line.ends_with('\n'));
    }

    #[test]
    fn test_render_minimal_hex() {
        assert_eq!(render_command(0, &[0x00, 0x0f, 0x10]).as_str(), "s0 0 f 10\n");
    }

    #[test]
    #[should_panic]
    fn test_render_rejects_oversized_payload() {
        render_command(0, &[0; CHUNK_SIZE + 1]);
    }

    #[test]
    fn test_size_hint_tracks_progress() {
        let image = [0u8; 40];
        let plan = resolve(&image, Some(0)).unwrap();
        let mut it = chunks(&image, plan);
        assert_eq!(it.len(), 3);
        it.next();
        assert_eq!(it.len(), 2);
        it.next();
        it.next();
        assert_eq!(it.len(), 0);
        assert!(it.next().is_none());
    }

    #[test]
    fn test_parse_load_address_prefixes() {
        assert_eq!(parse_load_address("2000"), Ok(0x2000));
        assert_eq!(parse_load_address("0x2000"), Ok(0x2000));
        assert_eq!(parse_load_address("$C000"), Ok(0xc000));
        assert!(parse_load_address("zz").is_err());
        assert!(parse_load_address("").is_err());
    }

    #[test]
    fn test_resolve_rejects_payload_past_address_space() {
        let image = [0u8; 4];
        assert!(resolve(&image, Some(u32::MAX - 3)).is_ok());
        assert!(matches!(
            resolve(&image, Some(u32::MAX - 2)),
            Err(UploadError::ImageTooLarge { len: 4 })
        ));
    }
}
