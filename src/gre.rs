//! Generic Routing Encapsulation (RFC 1701, RFC 2784, RFC 2890, RFC 2637).
//!
//! The fixed 4-byte header is followed by optional fields in a fixed order:
//! checksum and routing offset, key, sequence number, acknowledgment, and
//! finally the source route entries. Flags in the first two bytes say which
//! are present.

use std::net::Ipv4Addr;

use log::trace;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::bytes_ext::{
    Endianity, read_ipv4, read_u16, set_u16, write_bytes, write_ipv4, write_u8, write_u16,
    write_u32,
};
use crate::checksum;
use crate::datagram::{DataSegment, Datagram, impl_datagram_eq};
use crate::ethernet::{EtherType, EtherTypePayload};
use crate::ip::IpProtocol;
use crate::layer::{IpNextLayer, Layer, resolve_ether_type};
use crate::{Checksumable, PacketError};

mod offset {
    pub const FLAGS: usize = 0;
    pub const VERSION: usize = 1;
    pub const PROTOCOL_TYPE: usize = 2;
    pub const CHECKSUM: usize = 4;
    pub const ROUTING_OFFSET: usize = 6;
}

const CHECKSUM_PRESENT: u8 = 0x80;
const ROUTING_PRESENT: u8 = 0x40;
const KEY_PRESENT: u8 = 0x20;
const SEQUENCE_NUMBER_PRESENT: u8 = 0x10;
const STRICT_SOURCE_ROUTE: u8 = 0x08;
const RECURSION_CONTROL_MASK: u8 = 0x07;
const ACKNOWLEDGMENT_PRESENT: u8 = 0x80;
const FUTURE_USE_MASK: u8 = 0x78;
const VERSION_MASK: u8 = 0x07;

/// GRE version: 0 is standard GRE, 1 is enhanced GRE as used by PPTP.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GreVersion(pub u8);

impl GreVersion {
    pub const GRE: GreVersion = GreVersion(0);
    pub const ENHANCED: GreVersion = GreVersion(1);
}

pub mod address_family {
    pub const IP: u16 = 0x0800;
    pub const AS: u16 = 0xC200;
}

/// One source route entry (SRE).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GreSourceRouteEntry {
    Ip {
        addresses: Vec<Ipv4Addr>,
        next_address_index: u8,
    },
    As {
        as_numbers: Vec<u16>,
        next_as_number_index: u8,
    },
    Unknown {
        address_family: u16,
        payload_offset: u8,
        #[serde(with = "serde_bytes")]
        data: Vec<u8>,
    },
}

impl GreSourceRouteEntry {
    const HEADER_LENGTH: usize = 4;

    pub fn address_family(&self) -> u16 {
        match self {
            GreSourceRouteEntry::Ip { .. } => address_family::IP,
            GreSourceRouteEntry::As { .. } => address_family::AS,
            GreSourceRouteEntry::Unknown { address_family, .. } => *address_family,
        }
    }

    fn payload_length(&self) -> usize {
        match self {
            GreSourceRouteEntry::Ip { addresses, .. } => 4 * addresses.len(),
            GreSourceRouteEntry::As { as_numbers, .. } => 2 * as_numbers.len(),
            GreSourceRouteEntry::Unknown { data, .. } => data.len(),
        }
    }

    pub fn length(&self) -> usize {
        Self::HEADER_LENGTH + self.payload_length()
    }

    fn payload_offset(&self) -> usize {
        match self {
            GreSourceRouteEntry::Ip {
                next_address_index, ..
            } => 4 * usize::from(*next_address_index),
            GreSourceRouteEntry::As {
                next_as_number_index,
                ..
            } => 2 * usize::from(*next_as_number_index),
            GreSourceRouteEntry::Unknown { payload_offset, .. } => usize::from(*payload_offset),
        }
    }

    fn write(&self, buffer: &mut [u8], offset: &mut usize) -> Result<(), PacketError> {
        let length = u8::try_from(self.payload_length()).map_err(|_| PacketError::InvalidLength)?;
        let payload_offset =
            u8::try_from(self.payload_offset()).map_err(|_| PacketError::InvalidLength)?;
        write_u16(buffer, offset, self.address_family(), Endianity::Big);
        write_u8(buffer, offset, payload_offset);
        write_u8(buffer, offset, length);
        match self {
            GreSourceRouteEntry::Ip { addresses, .. } => {
                for address in addresses {
                    write_ipv4(buffer, offset, *address);
                }
            }
            GreSourceRouteEntry::As { as_numbers, .. } => {
                for number in as_numbers {
                    write_u16(buffer, offset, *number, Endianity::Big);
                }
            }
            GreSourceRouteEntry::Unknown { data, .. } => write_bytes(buffer, offset, data),
        }
        Ok(())
    }

    fn parse(address_family: u16, payload_offset: u8, data: &[u8]) -> Option<Self> {
        match address_family {
            address_family::IP => {
                if data.len() % 4 != 0 || payload_offset % 4 != 0 {
                    return None;
                }
                Some(GreSourceRouteEntry::Ip {
                    addresses: data.chunks_exact(4).map(|a| read_ipv4(a, 0)).collect(),
                    next_address_index: payload_offset / 4,
                })
            }
            address_family::AS => {
                if data.len() % 2 != 0 || payload_offset % 2 != 0 {
                    return None;
                }
                Some(GreSourceRouteEntry::As {
                    as_numbers: data
                        .chunks_exact(2)
                        .map(|n| read_u16(n, 0, Endianity::Big))
                        .collect(),
                    next_as_number_index: payload_offset / 2,
                })
            }
            _ => Some(GreSourceRouteEntry::Unknown {
                address_family,
                payload_offset,
                data: data.to_vec(),
            }),
        }
    }
}

/// Parses source route entries up to the terminating null entry.
///
/// Returns the entries and the bytes consumed, null entry included, or
/// `None` if the list is malformed or unterminated.
fn parse_routing(bytes: &[u8]) -> Option<(Vec<GreSourceRouteEntry>, usize)> {
    let mut entries = Vec::new();
    let mut position = 0;
    loop {
        let header = bytes.get(position..position + GreSourceRouteEntry::HEADER_LENGTH)?;
        let address_family = read_u16(header, 0, Endianity::Big);
        let payload_offset = header[2];
        let length = usize::from(header[3]);
        position += GreSourceRouteEntry::HEADER_LENGTH;
        if address_family == 0 && length == 0 {
            return Some((entries, position));
        }
        let data = bytes.get(position..position + length)?;
        match GreSourceRouteEntry::parse(address_family, payload_offset, data) {
            Some(entry) => entries.push(entry),
            None => {
                trace!("GRE source route entry for family {address_family:#06x} malformed");
                return None;
            }
        }
        position += length;
    }
}

/// A parsed GRE header and its payload.
#[derive(Debug, Clone)]
pub struct GreDatagram {
    segment: DataSegment,
    validity: OnceCell<bool>,
}

impl_datagram_eq!(GreDatagram);

impl GreDatagram {
    pub const HEADER_MINIMUM_LENGTH: usize = 4;

    pub fn new(segment: DataSegment) -> Self {
        Self {
            segment,
            validity: OnceCell::new(),
        }
    }

    fn flags(&self) -> u8 {
        self.segment.read_u8(offset::FLAGS)
    }

    pub fn checksum_present(&self) -> bool {
        self.flags() & CHECKSUM_PRESENT != 0
    }

    pub fn routing_present(&self) -> bool {
        self.flags() & ROUTING_PRESENT != 0
    }

    pub fn key_present(&self) -> bool {
        self.flags() & KEY_PRESENT != 0
    }

    pub fn sequence_number_present(&self) -> bool {
        self.flags() & SEQUENCE_NUMBER_PRESENT != 0
    }

    pub fn strict_source_route(&self) -> bool {
        self.flags() & STRICT_SOURCE_ROUTE != 0
    }

    pub fn recursion_control(&self) -> u8 {
        self.flags() & RECURSION_CONTROL_MASK
    }

    pub fn acknowledgment_sequence_number_present(&self) -> bool {
        self.segment.read_u8(offset::VERSION) & ACKNOWLEDGMENT_PRESENT != 0
    }

    pub fn future_use_bits(&self) -> u8 {
        (self.segment.read_u8(offset::VERSION) & FUTURE_USE_MASK) >> 3
    }

    pub fn version(&self) -> GreVersion {
        GreVersion(self.segment.read_u8(offset::VERSION) & VERSION_MASK)
    }

    pub fn protocol_type(&self) -> EtherType {
        EtherType(self.segment.read_u16(offset::PROTOCOL_TYPE, Endianity::Big))
    }

    pub fn checksum_field(&self) -> u16 {
        self.segment.read_u16(offset::CHECKSUM, Endianity::Big)
    }

    pub fn routing_offset(&self) -> u16 {
        self.segment.read_u16(offset::ROUTING_OFFSET, Endianity::Big)
    }

    fn key_offset(&self) -> usize {
        if self.checksum_present() || self.routing_present() {
            8
        } else {
            4
        }
    }

    fn sequence_number_offset(&self) -> usize {
        self.key_offset() + if self.key_present() { 4 } else { 0 }
    }

    fn acknowledgment_offset(&self) -> usize {
        self.sequence_number_offset() + if self.sequence_number_present() { 4 } else { 0 }
    }

    fn routing_start(&self) -> usize {
        self.acknowledgment_offset()
            + if self.acknowledgment_sequence_number_present() {
                4
            } else {
                0
            }
    }

    pub fn key(&self) -> u32 {
        self.segment.read_u32(self.key_offset(), Endianity::Big)
    }

    /// Enhanced GRE: the high half of the key is the payload length.
    pub fn key_payload_length(&self) -> u16 {
        (self.key() >> 16) as u16
    }

    /// Enhanced GRE: the low half of the key is the call id.
    pub fn key_call_id(&self) -> u16 {
        self.key() as u16
    }

    pub fn sequence_number(&self) -> u32 {
        self.segment
            .read_u32(self.sequence_number_offset(), Endianity::Big)
    }

    pub fn acknowledgment_sequence_number(&self) -> u32 {
        self.segment
            .read_u32(self.acknowledgment_offset(), Endianity::Big)
    }

    fn parsed_routing(&self) -> Option<(Vec<GreSourceRouteEntry>, usize)> {
        if !self.routing_present() {
            return Some((Vec::new(), 0));
        }
        parse_routing(self.segment.tail(self.routing_start()).as_slice())
    }

    /// Source route entries; empty when absent or malformed.
    pub fn routing(&self) -> Vec<GreSourceRouteEntry> {
        self.parsed_routing().map(|(entries, _)| entries).unwrap_or_default()
    }

    pub fn header_length(&self) -> usize {
        let routing_length = self.parsed_routing().map_or(0, |(_, length)| length);
        self.routing_start() + routing_length
    }

    pub fn payload(&self) -> DataSegment {
        self.segment.tail(self.header_length())
    }

    pub fn payload_datagram(&self) -> EtherTypePayload {
        EtherTypePayload::new(self.protocol_type(), self.payload())
    }

    pub fn extract_layer(&self) -> GreLayer {
        let routing_present = self.routing_present();
        GreLayer {
            protocol_type: Some(self.protocol_type()),
            recursion_control: self.recursion_control(),
            future_use_bits: self.future_use_bits(),
            version: self.version(),
            checksum_present: self.checksum_present(),
            checksum: self.checksum_present().then(|| self.checksum_field()),
            key: self.key_present().then(|| self.key()),
            sequence_number: self.sequence_number_present().then(|| self.sequence_number()),
            acknowledgment_sequence_number: self
                .acknowledgment_sequence_number_present()
                .then(|| self.acknowledgment_sequence_number()),
            routing_offset: routing_present.then(|| self.routing_offset()),
            routing: routing_present.then(|| self.routing()),
            strict_source_route: self.strict_source_route(),
        }
    }
}

impl Checksumable for GreDatagram {
    fn checksum(&self) -> u16 {
        self.checksum_field()
    }

    fn calculate_checksum(&self) -> u16 {
        checksum::checksum_excluding(self.segment.as_slice(), offset::CHECKSUM)
    }
}

impl Datagram for GreDatagram {
    fn segment(&self) -> &DataSegment {
        &self.segment
    }

    fn validity(&self) -> &OnceCell<bool> {
        &self.validity
    }

    fn calculate_is_valid(&self) -> bool {
        if self.segment.len() < Self::HEADER_MINIMUM_LENGTH || self.version().0 > 1 {
            return false;
        }
        if self.routing_start() > self.segment.len() || self.parsed_routing().is_none() {
            return false;
        }
        if self.checksum_present() && !self.is_checksum_correct() {
            return false;
        }
        self.payload_datagram().is_valid()
    }
}

/// GRE header description.
///
/// `protocol_type: None` takes the EtherType from the next layer.
/// With `checksum_present` and `checksum: None` the checksum is computed.
/// `routing: Some(..)` sets the routing flag, even for an empty list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GreLayer {
    pub protocol_type: Option<EtherType>,
    pub recursion_control: u8,
    pub future_use_bits: u8,
    pub version: GreVersion,
    pub checksum_present: bool,
    pub checksum: Option<u16>,
    pub key: Option<u32>,
    pub sequence_number: Option<u32>,
    pub acknowledgment_sequence_number: Option<u32>,
    pub routing_offset: Option<u16>,
    pub routing: Option<Vec<GreSourceRouteEntry>>,
    pub strict_source_route: bool,
}

impl GreLayer {
    fn has_checksum_and_offset(&self) -> bool {
        self.checksum_present || self.routing.is_some()
    }
}

impl Layer for GreLayer {
    fn name(&self) -> &'static str {
        "GRE"
    }

    fn length(&self) -> usize {
        let optional_words = [
            self.has_checksum_and_offset(),
            self.key.is_some(),
            self.sequence_number.is_some(),
            self.acknowledgment_sequence_number.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count();
        let routing_length = self.routing.as_ref().map_or(0, |entries| {
            entries.iter().map(GreSourceRouteEntry::length).sum::<usize>()
                + GreSourceRouteEntry::HEADER_LENGTH
        });
        GreDatagram::HEADER_MINIMUM_LENGTH + 4 * optional_words + routing_length
    }

    fn write(
        &self,
        buffer: &mut [u8],
        offset: &mut usize,
        _payload_length: usize,
        _previous: Option<&dyn Layer>,
        next: Option<&dyn Layer>,
    ) -> Result<(), PacketError> {
        if self.recursion_control > RECURSION_CONTROL_MASK || self.version.0 > VERSION_MASK {
            return Err(PacketError::InvalidFieldValue(
                "GRE recursion control and version are 3-bit fields".to_string(),
            ));
        }
        let protocol_type = resolve_ether_type(self.protocol_type, next, self.name())?;

        let mut flags = self.recursion_control;
        if self.checksum_present {
            flags |= CHECKSUM_PRESENT;
        }
        if self.routing.is_some() {
            flags |= ROUTING_PRESENT;
        }
        if self.key.is_some() {
            flags |= KEY_PRESENT;
        }
        if self.sequence_number.is_some() {
            flags |= SEQUENCE_NUMBER_PRESENT;
        }
        if self.strict_source_route {
            flags |= STRICT_SOURCE_ROUTE;
        }
        let mut version = self.version.0 | ((self.future_use_bits << 3) & FUTURE_USE_MASK);
        if self.acknowledgment_sequence_number.is_some() {
            version |= ACKNOWLEDGMENT_PRESENT;
        }

        write_u8(buffer, offset, flags);
        write_u8(buffer, offset, version);
        write_u16(buffer, offset, protocol_type.0, Endianity::Big);
        if self.has_checksum_and_offset() {
            write_u16(buffer, offset, self.checksum.unwrap_or(0), Endianity::Big);
            write_u16(buffer, offset, self.routing_offset.unwrap_or(0), Endianity::Big);
        }
        for value in [
            self.key,
            self.sequence_number,
            self.acknowledgment_sequence_number,
        ]
        .into_iter()
        .flatten()
        {
            write_u32(buffer, offset, value, Endianity::Big);
        }
        if let Some(entries) = &self.routing {
            for entry in entries {
                entry.write(buffer, offset)?;
            }
            write_u32(buffer, offset, 0, Endianity::Big);
        }
        Ok(())
    }

    fn finalize(
        &self,
        buffer: &mut [u8],
        offset: usize,
        payload_length: usize,
        _next: Option<&dyn Layer>,
    ) -> Result<(), PacketError> {
        if self.checksum_present && self.checksum.is_none() {
            let end = offset + self.length() + payload_length;
            let value = checksum::checksum_excluding(&buffer[offset..end], offset::CHECKSUM);
            set_u16(buffer, offset + offset::CHECKSUM, value, Endianity::Big);
        }
        Ok(())
    }

    fn as_ip_next(&self) -> Option<&dyn IpNextLayer> {
        Some(self)
    }
}

impl IpNextLayer for GreLayer {
    fn previous_layer_protocol(&self) -> IpProtocol {
        IpProtocol::GRE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::PacketBuilder;
    use crate::ipv4::{IpV4Datagram, IpV4Layer};
    use crate::layer::PayloadLayer;
    use chrono::Utc;

    fn ip() -> IpV4Layer {
        IpV4Layer {
            source: Ipv4Addr::new(1, 2, 3, 4),
            destination: Ipv4Addr::new(5, 6, 7, 8),
            ..Default::default()
        }
    }

    #[test]
    fn test_gre_with_everything() {
        let gre = GreLayer {
            protocol_type: Some(EtherType(0x1234)),
            recursion_control: 3,
            version: GreVersion::ENHANCED,
            checksum_present: true,
            key: Some(0x0010_0001),
            sequence_number: Some(99),
            acknowledgment_sequence_number: Some(98),
            routing_offset: Some(4),
            routing: Some(vec![
                GreSourceRouteEntry::Ip {
                    addresses: vec![Ipv4Addr::new(9, 9, 9, 9), Ipv4Addr::new(8, 8, 8, 8)],
                    next_address_index: 1,
                },
                GreSourceRouteEntry::As {
                    as_numbers: vec![64512],
                    next_as_number_index: 0,
                },
            ]),
            strict_source_route: true,
            ..Default::default()
        };
        let packet = PacketBuilder::build_packet(
            Utc::now(),
            vec![
                Box::new(ip()),
                Box::new(gre.clone()),
                Box::new(PayloadLayer::new(vec![1, 2, 3])),
            ],
        )
        .unwrap();
        assert!(packet.is_valid());

        let datagram = packet.ip_v4().gre();
        assert!(datagram.is_checksum_correct());
        assert_eq!(datagram.header_length(), gre.length());
        assert_eq!(datagram.key_call_id(), 1);
        assert_eq!(datagram.key_payload_length(), 0x10);
        assert_eq!(datagram.payload().as_slice(), &[1, 2, 3]);

        let mut extracted = datagram.extract_layer();
        extracted.checksum = None;
        assert_eq!(extracted, gre);
    }

    #[test]
    fn test_checksum_flip_detected() {
        let gre = GreLayer {
            protocol_type: Some(EtherType(0x1234)),
            checksum_present: true,
            ..Default::default()
        };
        let packet = PacketBuilder::build_packet(
            Utc::now(),
            vec![
                Box::new(ip()),
                Box::new(gre),
                Box::new(PayloadLayer::new(vec![1, 2, 3, 4])),
            ],
        )
        .unwrap();
        assert!(packet.ip_v4().gre().is_checksum_correct());

        let mut bytes = packet.as_bytes().to_vec();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x40;
        let datagram = IpV4Datagram::new(DataSegment::new(bytes)).gre();
        assert!(!datagram.is_checksum_correct());
        assert!(!datagram.is_valid());
    }

    #[test]
    fn test_protocol_type_from_next_layer() {
        let inner = IpV4Layer {
            protocol: Some(IpProtocol(253)),
            ..ip()
        };
        let packet = PacketBuilder::build_packet(
            Utc::now(),
            vec![
                Box::new(ip()),
                Box::new(GreLayer::default()),
                Box::new(inner),
            ],
        )
        .unwrap();
        let gre = packet.ip_v4().gre();
        assert_eq!(gre.protocol_type(), EtherType::IPV4);
        assert_eq!(gre.header_length(), 4);
        assert!(matches!(gre.payload_datagram(), EtherTypePayload::IpV4(_)));
        assert!(packet.is_valid());
    }

    #[test]
    fn test_unterminated_routing_is_invalid() {
        let bytes = vec![ROUTING_PRESENT, 0, 0x08, 0x00, 0, 0, 0, 0, 0x08, 0x00, 0, 4];
        let gre = GreDatagram::new(DataSegment::new(bytes));
        assert!(!gre.is_valid());
        assert!(gre.routing().is_empty());
    }
}
