//! Frame checksum
//!
//! Every frame ends with one checksum byte:
//! 1. Sum all preceding bytes (header, command, payload) into a 16-bit accumulator
//! 2. Keep the low 8 bits
//!
//! This catches line noise, not tampering. Corruptions that shift the byte sum
//! by a multiple of 256 (for example `+1` on one byte and `-1` on another) pass
//! unnoticed.

use tracing::trace;

/// Calculate the checksum over `bytes`
///
/// `bytes` must not include the checksum field itself.
///
/// # Examples
///
/// ```
/// use lockbridge_core::checksum;
///
/// let sum = checksum::calculate(&[0xAA, 0x55, 0x01, 0, 0, 0, 0, 0, 0]);
/// assert_eq!(sum, 0x00);
/// ```
pub fn calculate(bytes: &[u8]) -> u8 {
    let sum = bytes
        .iter()
        .fold(0u16, |acc, &b| acc.wrapping_add(b as u16));

    let checksum = (sum & 0xFF) as u8;

    trace!(
        len = bytes.len(),
        checksum = format!("0x{:02X}", checksum),
        "Calculated checksum"
    );

    checksum
}

/// Verify a complete frame whose last byte is the checksum
///
/// Returns `false` for an empty frame.
pub fn verify(frame: &[u8]) -> bool {
    match frame.split_last() {
        Some((&received, body)) => calculate(body) == received,
        None => false,
    }
}
