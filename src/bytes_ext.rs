//! Endian-aware integer access over byte slices.
//!
//! Reads are bounds-tolerant: a read that runs past the end of the slice
//! yields zero (or the unspecified address) instead of panicking, so field
//! accessors on truncated captures always produce some value. Writes are
//! used by layers on buffers the builder sized for them, and an out-of-range
//! write is a programming error that panics.

use std::net::{Ipv4Addr, Ipv6Addr};

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use crate::PacketError;

/// Byte order of a multi-byte field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Endianity {
    #[default]
    Big,
    Little,
}

#[inline]
fn window(buffer: &[u8], offset: usize, count: usize) -> Option<&[u8]> {
    let end = offset.checked_add(count)?;
    buffer.get(offset..end)
}

#[inline]
pub fn read_u8(buffer: &[u8], offset: usize) -> u8 {
    buffer.get(offset).copied().unwrap_or(0)
}

#[inline]
pub fn read_u16(buffer: &[u8], offset: usize, endianity: Endianity) -> u16 {
    match window(buffer, offset, 2) {
        Some(bytes) => match endianity {
            Endianity::Big => BigEndian::read_u16(bytes),
            Endianity::Little => LittleEndian::read_u16(bytes),
        },
        None => 0,
    }
}

#[inline]
pub fn read_u24(buffer: &[u8], offset: usize, endianity: Endianity) -> u32 {
    read_uint(buffer, offset, 3, endianity) as u32
}

#[inline]
pub fn read_u32(buffer: &[u8], offset: usize, endianity: Endianity) -> u32 {
    match window(buffer, offset, 4) {
        Some(bytes) => match endianity {
            Endianity::Big => BigEndian::read_u32(bytes),
            Endianity::Little => LittleEndian::read_u32(bytes),
        },
        None => 0,
    }
}

#[inline]
pub fn read_u48(buffer: &[u8], offset: usize, endianity: Endianity) -> u64 {
    read_uint(buffer, offset, 6, endianity)
}

#[inline]
pub fn read_u64(buffer: &[u8], offset: usize, endianity: Endianity) -> u64 {
    read_uint(buffer, offset, 8, endianity)
}

#[inline]
pub fn read_u128(buffer: &[u8], offset: usize, endianity: Endianity) -> u128 {
    match window(buffer, offset, 16) {
        Some(bytes) => match endianity {
            Endianity::Big => BigEndian::read_u128(bytes),
            Endianity::Little => LittleEndian::read_u128(bytes),
        },
        None => 0,
    }
}

/// Reads an unsigned integer of `count` bytes (1 to 8).
pub fn read_uint(buffer: &[u8], offset: usize, count: usize, endianity: Endianity) -> u64 {
    if count == 0 || count > 8 {
        return 0;
    }
    match window(buffer, offset, count) {
        Some(bytes) => match endianity {
            Endianity::Big => BigEndian::read_uint(bytes, count),
            Endianity::Little => LittleEndian::read_uint(bytes, count),
        },
        None => 0,
    }
}

#[inline]
pub fn read_ipv4(buffer: &[u8], offset: usize) -> Ipv4Addr {
    Ipv4Addr::from(read_u32(buffer, offset, Endianity::Big))
}

#[inline]
pub fn read_ipv6(buffer: &[u8], offset: usize) -> Ipv6Addr {
    Ipv6Addr::from(read_u128(buffer, offset, Endianity::Big))
}

/// Copies up to `count` bytes starting at `offset`, clamped to the slice.
pub fn read_bytes(buffer: &[u8], offset: usize, count: usize) -> Vec<u8> {
    let start = offset.min(buffer.len());
    let end = offset.saturating_add(count).min(buffer.len());
    buffer[start..end].to_vec()
}

/// Extracts a run of bits from `value`.
///
/// # Arguments
/// * `value` - The word holding the bit field
/// * `shift` - Position of the field's least significant bit
/// * `mask` - Mask applied after shifting
#[inline]
pub fn read_bits(value: u32, shift: u32, mask: u32) -> u32 {
    (value >> shift) & mask
}

#[inline]
pub fn write_u8(buffer: &mut [u8], offset: &mut usize, value: u8) {
    buffer[*offset] = value;
    *offset += 1;
}

#[inline]
pub fn write_u16(buffer: &mut [u8], offset: &mut usize, value: u16, endianity: Endianity) {
    set_u16(buffer, *offset, value, endianity);
    *offset += 2;
}

#[inline]
pub fn write_u24(buffer: &mut [u8], offset: &mut usize, value: u32, endianity: Endianity) {
    write_uint(buffer, offset, u64::from(value), 3, endianity);
}

#[inline]
pub fn write_u32(buffer: &mut [u8], offset: &mut usize, value: u32, endianity: Endianity) {
    set_u32(buffer, *offset, value, endianity);
    *offset += 4;
}

#[inline]
pub fn write_u48(buffer: &mut [u8], offset: &mut usize, value: u64, endianity: Endianity) {
    write_uint(buffer, offset, value, 6, endianity);
}

#[inline]
pub fn write_u64(buffer: &mut [u8], offset: &mut usize, value: u64, endianity: Endianity) {
    write_uint(buffer, offset, value, 8, endianity);
}

pub fn write_uint(
    buffer: &mut [u8],
    offset: &mut usize,
    value: u64,
    count: usize,
    endianity: Endianity,
) {
    let bytes = &mut buffer[*offset..*offset + count];
    match endianity {
        Endianity::Big => BigEndian::write_uint(bytes, value, count),
        Endianity::Little => LittleEndian::write_uint(bytes, value, count),
    }
    *offset += count;
}

#[inline]
pub fn write_bytes(buffer: &mut [u8], offset: &mut usize, value: &[u8]) {
    buffer[*offset..*offset + value.len()].copy_from_slice(value);
    *offset += value.len();
}

#[inline]
pub fn write_ipv4(buffer: &mut [u8], offset: &mut usize, value: Ipv4Addr) {
    write_bytes(buffer, offset, &value.octets());
}

#[inline]
pub fn write_ipv6(buffer: &mut [u8], offset: &mut usize, value: Ipv6Addr) {
    write_bytes(buffer, offset, &value.octets());
}

/// Writes a 16-bit value at a fixed position without advancing any cursor.
#[inline]
pub fn set_u16(buffer: &mut [u8], offset: usize, value: u16, endianity: Endianity) {
    let bytes = &mut buffer[offset..offset + 2];
    match endianity {
        Endianity::Big => BigEndian::write_u16(bytes, value),
        Endianity::Little => LittleEndian::write_u16(bytes, value),
    }
}

#[inline]
pub fn set_u32(buffer: &mut [u8], offset: usize, value: u32, endianity: Endianity) {
    let bytes = &mut buffer[offset..offset + 4];
    match endianity {
        Endianity::Big => BigEndian::write_u32(bytes, value),
        Endianity::Little => LittleEndian::write_u32(bytes, value),
    }
}

/// Formats bytes as a lowercase hex string.
pub fn to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Parses a hex string, ignoring ASCII whitespace between digits.
pub fn from_hex(text: &str) -> Result<Vec<u8>, PacketError> {
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    Ok(hex::decode(compact)?)
}
