// ============================================================================
// STEGANOGRAPHY — LSB text embedding across the R, G, B planes
// ============================================================================
//
// Layout: a 32-bit big-endian byte-length header followed by the UTF-8
// payload, every byte written MSB-first.  Bits fill the least significant bit
// of each pixel's R, then G, then B channel in row-major pixel order.  Alpha
// is never touched.

use crate::canvas::{BPP, CH_B, CH_G, CH_R, PixelBuffer};
use crate::error::{EngineError, Result};

const HEADER_BITS: usize = 32;
const SLOT_CHANNELS: [usize; 3] = [CH_R, CH_G, CH_B];

/// Maximum payload bytes a `width × height` image can carry.
pub fn capacity(width: u32, height: u32) -> usize {
    let slots = (width as usize)
        .saturating_mul(height as usize)
        .saturating_mul(SLOT_CHANNELS.len());
    slots.saturating_sub(HEADER_BITS) / 8
}

/// Byte offset of the `bit`-th carrier channel in a packed buffer.
#[inline]
fn slot_offset(bit: usize) -> usize {
    (bit / SLOT_CHANNELS.len()) * BPP + SLOT_CHANNELS[bit % SLOT_CHANNELS.len()]
}

/// Hide `message` in a copy of `src`.
pub fn embed(src: &PixelBuffer, message: &str) -> Result<PixelBuffer> {
    let payload = message.as_bytes();
    if payload.is_empty() {
        return Err(EngineError::invalid("message", "cannot embed an empty message"));
    }
    let cap = capacity(src.width(), src.height());
    if payload.len() > cap {
        return Err(EngineError::CapacityExceeded { needed: payload.len(), capacity: cap });
    }
    // The header is a signed 32-bit length.
    let len = i32::try_from(payload.len())
        .map_err(|_| EngineError::CapacityExceeded { needed: payload.len(), capacity: i32::MAX as usize })?;

    let bits = len
        .to_be_bytes()
        .into_iter()
        .chain(payload.iter().copied())
        .flat_map(|byte| (0..8).map(move |i| (byte >> (7 - i)) & 1));

    let mut data = src.clone().into_raw();
    for (bit_index, bit) in bits.enumerate() {
        let off = slot_offset(bit_index);
        data[off] = (data[off] & 0xFE) | bit;
    }

    crate::log_info!("Embedded {} byte message (capacity {} bytes)", payload.len(), cap);
    Ok(PixelBuffer::from_parts(src.width(), src.height(), data))
}

/// Recover the message hidden by [`embed`].
pub fn extract(src: &PixelBuffer) -> Result<String> {
    let cap = capacity(src.width(), src.height());
    if cap == 0 {
        return Err(EngineError::NoMessageFound);
    }
    let data = src.data();
    let read_byte = |first_bit: usize| -> u8 {
        (0..8).fold(0u8, |acc, i| (acc << 1) | (data[slot_offset(first_bit + i)] & 1))
    };

    let header = [read_byte(0), read_byte(8), read_byte(16), read_byte(24)];
    let len = i32::from_be_bytes(header);
    if len <= 0 || len as usize > cap {
        return Err(EngineError::NoMessageFound);
    }

    let payload: Vec<u8> = (0..len as usize)
        .map(|i| read_byte(HEADER_BITS + i * 8))
        .collect();
    let message = String::from_utf8(payload).map_err(|_| EngineError::NoMessageFound)?;
    crate::log_info!("Extracted {} byte message", message.len());
    Ok(message)
}
