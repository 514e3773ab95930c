//! Internet checksum (RFC 1071) and transport pseudo-headers.
//!
//! IPv4, ICMP, IGMP, GRE, TCP and UDP all use the same 16-bit one's-complement
//! sum. TCP and UDP additionally sum a pseudo-header made of the enclosing IP
//! addresses, protocol number and segment length.

use std::net::{Ipv4Addr, Ipv6Addr};

/// Sums `data` as big-endian 16-bit words.
///
/// An odd trailing byte is treated as the high-order byte of a zero-padded word.
pub fn sum16(data: &[u8]) -> u32 {
    let mut sum: u32 = 0;
    let mut chunks = data.chunks_exact(2);
    for chunk in &mut chunks {
        sum = sum.wrapping_add(u32::from(u16::from_be_bytes([chunk[0], chunk[1]])));
    }
    if let Some(&byte) = chunks.remainder().first() {
        sum = sum.wrapping_add(u32::from(byte) << 8);
    }
    sum
}

/// Folds a 32-bit sum to 16 bits and returns its one's complement.
pub fn fold(mut sum: u32) -> u16 {
    while (sum >> 16) != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

/// Calculates the Internet checksum of `data`.
pub fn internet_checksum(data: &[u8]) -> u16 {
    fold(sum16(data))
}

/// Sums `data` as if the 16-bit field at `field_offset` were zero.
///
/// `field_offset` must be even, which holds for every checksum field this crate handles.
pub fn sum16_excluding(data: &[u8], field_offset: usize) -> u32 {
    let split = field_offset.min(data.len());
    let resume = field_offset.saturating_add(2).min(data.len());
    sum16(&data[..split]).wrapping_add(sum16(&data[resume..]))
}

/// Checksum over `data` with the embedded checksum field treated as zero.
pub fn checksum_excluding(data: &[u8], field_offset: usize) -> u16 {
    fold(sum16_excluding(data, field_offset))
}

/// The addresses an IP layer contributes to a transport checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PseudoHeader {
    V4 {
        source: Ipv4Addr,
        destination: Ipv4Addr,
    },
    V6 {
        source: Ipv6Addr,
        destination: Ipv6Addr,
    },
}

impl PseudoHeader {
    /// Sum of the pseudo-header words.
    ///
    /// # Arguments
    /// * `protocol` - Transport protocol number (next header for IPv6)
    /// * `length` - Length of the transport header plus payload
    pub fn sum(&self, protocol: u8, length: u32) -> u32 {
        let addresses = match self {
            PseudoHeader::V4 {
                source,
                destination,
            } => sum16(&source.octets()).wrapping_add(sum16(&destination.octets())),
            PseudoHeader::V6 {
                source,
                destination,
            } => sum16(&source.octets()).wrapping_add(sum16(&destination.octets())),
        };
        addresses
            .wrapping_add(u32::from(protocol))
            .wrapping_add(length >> 16)
            .wrapping_add(length & 0xFFFF)
    }

    /// Transport checksum of `segment`, skipping the field at `checksum_offset`.
    pub fn transport_checksum(&self, protocol: u8, segment: &[u8], checksum_offset: usize) -> u16 {
        let sum = self
            .sum(protocol, segment.len() as u32)
            .wrapping_add(sum16_excluding(segment, checksum_offset));
        fold(sum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internet_checksum_known_header() {
        // IPv4 header from RFC 1071 style examples, checksum field zeroed.
        let header = [
            0x45, 0x00, 0x00, 0x73, 0x00, 0x00, 0x40, 0x00, 0x40, 0x11, 0x00, 0x00, 0xc0, 0xa8,
            0x00, 0x01, 0xc0, 0xa8, 0x00, 0xc7,
        ];
        assert_eq!(internet_checksum(&header), 0xb861);
    }

    #[test]
    fn test_odd_length_pads_high_byte() {
        assert_eq!(sum16(&[0x01]), 0x0100);
        assert_eq!(sum16(&[0x00, 0x01, 0x02]), 0x0201);
    }

    #[test]
    fn test_excluding_checksum_field() {
        let data = [0x12, 0x34, 0xFF, 0xFF, 0x56, 0x78];
        assert_eq!(
            checksum_excluding(&data, 2),
            internet_checksum(&[0x12, 0x34, 0x00, 0x00, 0x56, 0x78])
        );
    }

    #[test]
    fn test_verifying_includes_stored_checksum() {
        let mut data = vec![0x45, 0x00, 0x00, 0x1c, 0x00, 0x00, 0x00, 0x00];
        let checksum = checksum_excluding(&data, 6);
        data[6..8].copy_from_slice(&checksum.to_be_bytes());
        assert_eq!(internet_checksum(&data), 0);
    }

    #[test]
    fn test_pseudo_header_sum_v4() {
        let header = PseudoHeader::V4 {
            source: Ipv4Addr::new(10, 0, 0, 1),
            destination: Ipv4Addr::new(10, 0, 0, 2),
        };
        assert_eq!(header.sum(17, 12), 0x0a00 + 0x0001 + 0x0a00 + 0x0002 + 17 + 12);
    }
}
