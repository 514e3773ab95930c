//! IPv4 datagrams and layers.

pub mod options;

use std::net::Ipv4Addr;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::bytes_ext::{Endianity, set_u16, write_ipv4, write_u8, write_u16};
use crate::checksum::{self, PseudoHeader};
use crate::datagram::{DataSegment, Datagram, impl_datagram_eq};
use crate::ethernet::EtherType;
use crate::gre::GreDatagram;
use crate::icmp::IcmpDatagram;
use crate::igmp::IgmpDatagram;
use crate::ip::{IpPayload, IpProtocol, is_transport_checksum_correct, write_transport_checksum};
use crate::layer::{EthernetNextLayer, IpNextLayer, Layer, resolve_ip_protocol};
use crate::packet::DataLinkKind;
use crate::tcp::TcpDatagram;
use crate::udp::UdpDatagram;
use crate::{Checksumable, PacketError};

pub use options::{IpV4Option, IpV4OptionTimestampType, IpV4Options, IpV4TimestampEntry};

mod offset {
    pub const VERSION_AND_HEADER_LENGTH: usize = 0;
    pub const TYPE_OF_SERVICE: usize = 1;
    pub const TOTAL_LENGTH: usize = 2;
    pub const IDENTIFICATION: usize = 4;
    pub const FRAGMENTATION: usize = 6;
    pub const TTL: usize = 8;
    pub const PROTOCOL: usize = 9;
    pub const HEADER_CHECKSUM: usize = 10;
    pub const SOURCE: usize = 12;
    pub const DESTINATION: usize = 16;
    pub const OPTIONS: usize = 20;
}

const RESERVED_FLAG: u16 = 0x8000;
const DONT_FRAGMENT_FLAG: u16 = 0x4000;
const MORE_FRAGMENTS_FLAG: u16 = 0x2000;
const FRAGMENT_OFFSET_MASK: u16 = 0x1FFF;

/// IPv4 fragmentation flags and offset.
///
/// `offset` is in bytes and must be a multiple of 8.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpV4Fragmentation {
    pub reserved: bool,
    pub dont_fragment: bool,
    pub more_fragments: bool,
    pub offset: u16,
}

impl IpV4Fragmentation {
    pub fn new(dont_fragment: bool, more_fragments: bool, offset: u16) -> Self {
        Self {
            reserved: false,
            dont_fragment,
            more_fragments,
            offset,
        }
    }

    pub fn dont_fragment() -> Self {
        Self::new(true, false, 0)
    }

    fn from_word(word: u16) -> Self {
        Self {
            reserved: word & RESERVED_FLAG != 0,
            dont_fragment: word & DONT_FRAGMENT_FLAG != 0,
            more_fragments: word & MORE_FRAGMENTS_FLAG != 0,
            offset: (word & FRAGMENT_OFFSET_MASK) * 8,
        }
    }

    fn to_word(self) -> Result<u16, PacketError> {
        if self.offset % 8 != 0 {
            return Err(PacketError::InvalidFieldValue(format!(
                "Fragment offset {} is not a multiple of 8",
                self.offset
            )));
        }
        let mut word = self.offset / 8;
        if self.reserved {
            word |= RESERVED_FLAG;
        }
        if self.dont_fragment {
            word |= DONT_FRAGMENT_FLAG;
        }
        if self.more_fragments {
            word |= MORE_FRAGMENTS_FLAG;
        }
        Ok(word)
    }

    /// Whether this is the first (or only) fragment, the one holding the transport header.
    pub fn is_first_fragment(&self) -> bool {
        self.offset == 0
    }
}

/// A parsed IPv4 datagram.
#[derive(Debug, Clone)]
pub struct IpV4Datagram {
    segment: DataSegment,
    validity: OnceCell<bool>,
}

impl_datagram_eq!(IpV4Datagram);

impl IpV4Datagram {
    pub const HEADER_MINIMUM_LENGTH: usize = 20;
    pub const HEADER_MAXIMUM_LENGTH: usize = 60;

    pub fn new(segment: DataSegment) -> Self {
        Self {
            segment,
            validity: OnceCell::new(),
        }
    }

    #[inline]
    pub fn version(&self) -> u8 {
        self.segment.read_u8(offset::VERSION_AND_HEADER_LENGTH) >> 4
    }

    /// Header length in bytes (IHL * 4).
    #[inline]
    pub fn header_length(&self) -> usize {
        usize::from(self.segment.read_u8(offset::VERSION_AND_HEADER_LENGTH) & 0x0F) * 4
    }

    #[inline]
    pub fn type_of_service(&self) -> u8 {
        self.segment.read_u8(offset::TYPE_OF_SERVICE)
    }

    #[inline]
    pub fn total_length(&self) -> u16 {
        self.segment.read_u16(offset::TOTAL_LENGTH, Endianity::Big)
    }

    #[inline]
    pub fn identification(&self) -> u16 {
        self.segment.read_u16(offset::IDENTIFICATION, Endianity::Big)
    }

    pub fn fragmentation(&self) -> IpV4Fragmentation {
        IpV4Fragmentation::from_word(self.segment.read_u16(offset::FRAGMENTATION, Endianity::Big))
    }

    #[inline]
    pub fn ttl(&self) -> u8 {
        self.segment.read_u8(offset::TTL)
    }

    #[inline]
    pub fn protocol(&self) -> IpProtocol {
        IpProtocol(self.segment.read_u8(offset::PROTOCOL))
    }

    #[inline]
    pub fn header_checksum(&self) -> u16 {
        self.segment.read_u16(offset::HEADER_CHECKSUM, Endianity::Big)
    }

    #[inline]
    pub fn source(&self) -> Ipv4Addr {
        self.segment.read_ipv4(offset::SOURCE)
    }

    #[inline]
    pub fn destination(&self) -> Ipv4Addr {
        self.segment.read_ipv4(offset::DESTINATION)
    }

    /// Options between the fixed header and the declared header length.
    pub fn options(&self) -> IpV4Options {
        let length = self.header_length().saturating_sub(offset::OPTIONS);
        IpV4Options::parse(self.segment.subsegment(offset::OPTIONS, length).as_slice())
    }

    pub fn is_header_checksum_correct(&self) -> bool {
        self.is_checksum_correct()
    }

    /// The bytes between the header and the declared total length.
    pub fn payload(&self) -> DataSegment {
        let header_length = self.header_length();
        let total_length = usize::from(self.total_length());
        self.segment
            .subsegment(header_length, total_length.saturating_sub(header_length))
    }

    pub fn payload_datagram(&self) -> IpPayload {
        IpPayload::new(self.protocol(), self.payload())
    }

    pub fn icmp(&self) -> IcmpDatagram {
        IcmpDatagram::new(self.payload())
    }

    pub fn igmp(&self) -> IgmpDatagram {
        IgmpDatagram::new(self.payload())
    }

    pub fn tcp(&self) -> TcpDatagram {
        TcpDatagram::new(self.payload())
    }

    pub fn udp(&self) -> UdpDatagram {
        UdpDatagram::new(self.payload())
    }

    pub fn gre(&self) -> GreDatagram {
        GreDatagram::new(self.payload())
    }

    /// The encapsulated datagram of an IP-in-IP packet.
    pub fn ip_v4(&self) -> IpV4Datagram {
        IpV4Datagram::new(self.payload())
    }

    pub fn pseudo_header(&self) -> PseudoHeader {
        PseudoHeader::V4 {
            source: self.source(),
            destination: self.destination(),
        }
    }

    /// Checks the TCP or UDP checksum; other protocols report true.
    pub fn is_transport_checksum_correct(&self) -> bool {
        is_transport_checksum_correct(self.pseudo_header(), self.protocol(), &self.payload())
    }

    pub fn extract_layer(&self) -> IpV4Layer {
        IpV4Layer {
            type_of_service: self.type_of_service(),
            identification: self.identification(),
            fragmentation: self.fragmentation(),
            ttl: self.ttl(),
            protocol: Some(self.protocol()),
            header_checksum: Some(self.header_checksum()),
            source: self.source(),
            destination: self.destination(),
            options: self.options(),
        }
    }
}

impl Checksumable for IpV4Datagram {
    fn checksum(&self) -> u16 {
        self.header_checksum()
    }

    fn calculate_checksum(&self) -> u16 {
        let header = self.segment.subsegment(0, self.header_length());
        checksum::checksum_excluding(header.as_slice(), offset::HEADER_CHECKSUM)
    }
}

impl Datagram for IpV4Datagram {
    fn segment(&self) -> &DataSegment {
        &self.segment
    }

    fn validity(&self) -> &OnceCell<bool> {
        &self.validity
    }

    fn calculate_is_valid(&self) -> bool {
        let length = self.segment.len();
        if length < Self::HEADER_MINIMUM_LENGTH || self.version() != 4 {
            return false;
        }
        let header_length = self.header_length();
        let total_length = usize::from(self.total_length());
        if header_length < Self::HEADER_MINIMUM_LENGTH
            || header_length > length
            || total_length < header_length
            || total_length > length
        {
            return false;
        }
        if !self.is_header_checksum_correct() || !self.options().is_valid() {
            return false;
        }

        let fragmentation = self.fragmentation();
        if !fragmentation.is_first_fragment() || fragmentation.more_fragments {
            // Without reassembly only the header can be checked.
            return true;
        }
        self.payload_datagram().is_valid() && self.is_transport_checksum_correct()
    }
}

/// IPv4 header description.
///
/// `protocol: None` takes the protocol from the next layer.
/// `header_checksum: None` computes it. The checksum of a following TCP or
/// UDP layer is computed here as well, since it needs this layer's addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpV4Layer {
    pub type_of_service: u8,
    pub identification: u16,
    pub fragmentation: IpV4Fragmentation,
    pub ttl: u8,
    pub protocol: Option<IpProtocol>,
    pub header_checksum: Option<u16>,
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    pub options: IpV4Options,
}

impl Default for IpV4Layer {
    fn default() -> Self {
        Self {
            type_of_service: 0,
            identification: 0,
            fragmentation: IpV4Fragmentation::default(),
            ttl: 64,
            protocol: None,
            header_checksum: None,
            source: Ipv4Addr::UNSPECIFIED,
            destination: Ipv4Addr::UNSPECIFIED,
            options: IpV4Options::none(),
        }
    }
}

impl IpV4Layer {
    pub fn builder() -> IpV4LayerBuilder {
        IpV4LayerBuilder::default()
    }

    fn header_length(&self) -> usize {
        IpV4Datagram::HEADER_MINIMUM_LENGTH + self.options.bytes_length()
    }
}

impl Layer for IpV4Layer {
    fn name(&self) -> &'static str {
        "IPv4"
    }

    fn length(&self) -> usize {
        self.header_length()
    }

    fn write(
        &self,
        buffer: &mut [u8],
        offset: &mut usize,
        payload_length: usize,
        _previous: Option<&dyn Layer>,
        next: Option<&dyn Layer>,
    ) -> Result<(), PacketError> {
        let header_length = self.header_length();
        if header_length > IpV4Datagram::HEADER_MAXIMUM_LENGTH {
            return Err(PacketError::InvalidFieldValue(format!(
                "IPv4 options take {} bytes, at most 40 fit",
                self.options.bytes_length()
            )));
        }
        let total_length = u16::try_from(header_length + payload_length)
            .map_err(|_| PacketError::InvalidLength)?;
        let protocol = resolve_ip_protocol(self.protocol, next, self.name())?;
        let start = *offset;

        write_u8(buffer, offset, 0x40 | (header_length / 4) as u8);
        write_u8(buffer, offset, self.type_of_service);
        write_u16(buffer, offset, total_length, Endianity::Big);
        write_u16(buffer, offset, self.identification, Endianity::Big);
        write_u16(buffer, offset, self.fragmentation.to_word()?, Endianity::Big);
        write_u8(buffer, offset, self.ttl);
        write_u8(buffer, offset, protocol.0);
        write_u16(buffer, offset, self.header_checksum.unwrap_or(0), Endianity::Big);
        write_ipv4(buffer, offset, self.source);
        write_ipv4(buffer, offset, self.destination);
        self.options.write(buffer, offset)?;

        if self.header_checksum.is_none() {
            let value = checksum::checksum_excluding(
                &buffer[start..start + header_length],
                offset::HEADER_CHECKSUM,
            );
            set_u16(buffer, start + offset::HEADER_CHECKSUM, value, Endianity::Big);
        }
        Ok(())
    }

    fn finalize(
        &self,
        buffer: &mut [u8],
        offset: usize,
        payload_length: usize,
        next: Option<&dyn Layer>,
    ) -> Result<(), PacketError> {
        let pseudo_header = PseudoHeader::V4 {
            source: self.source,
            destination: self.destination,
        };
        let protocol = resolve_ip_protocol(self.protocol, next, self.name())?;
        write_transport_checksum(
            buffer,
            offset + self.header_length(),
            payload_length,
            pseudo_header,
            protocol,
            next,
        );
        Ok(())
    }

    fn data_link(&self) -> Option<DataLinkKind> {
        Some(DataLinkKind::IpV4)
    }

    fn as_ethernet_next(&self) -> Option<&dyn EthernetNextLayer> {
        Some(self)
    }

    fn as_ip_next(&self) -> Option<&dyn IpNextLayer> {
        Some(self)
    }
}

impl EthernetNextLayer for IpV4Layer {
    fn previous_layer_ether_type(&self) -> EtherType {
        EtherType::IPV4
    }
}

impl IpNextLayer for IpV4Layer {
    fn previous_layer_protocol(&self) -> IpProtocol {
        IpProtocol::IP_IN_IP
    }
}

/// Builder for constructing IPv4 layers.
#[derive(Debug, Default)]
pub struct IpV4LayerBuilder {
    source: Option<Ipv4Addr>,
    destination: Option<Ipv4Addr>,
    ttl: Option<u8>,
    protocol: Option<IpProtocol>,
    identification: u16,
    type_of_service: u8,
    fragmentation: IpV4Fragmentation,
    options: Vec<IpV4Option>,
}

impl IpV4LayerBuilder {
    pub fn source(mut self, addr: Ipv4Addr) -> Self {
        self.source = Some(addr);
        self
    }

    pub fn destination(mut self, addr: Ipv4Addr) -> Self {
        self.destination = Some(addr);
        self
    }

    pub fn ttl(mut self, ttl: u8) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn protocol(mut self, protocol: IpProtocol) -> Self {
        self.protocol = Some(protocol);
        self
    }

    pub fn identification(mut self, identification: u16) -> Self {
        self.identification = identification;
        self
    }

    pub fn type_of_service(mut self, type_of_service: u8) -> Self {
        self.type_of_service = type_of_service;
        self
    }

    pub fn fragmentation(mut self, fragmentation: IpV4Fragmentation) -> Self {
        self.fragmentation = fragmentation;
        self
    }

    pub fn option(mut self, option: IpV4Option) -> Self {
        self.options.push(option);
        self
    }

    /// Builds the layer.
    ///
    /// # Returns
    /// - `Ok(IpV4Layer)` - The constructed layer
    /// - `Err(PacketError)` - If an address is missing or the options do not fit
    pub fn build(self) -> Result<IpV4Layer, PacketError> {
        let source = self.source.ok_or_else(|| {
            PacketError::InvalidFieldValue("Source address not set".to_string())
        })?;
        let destination = self.destination.ok_or_else(|| {
            PacketError::InvalidFieldValue("Destination address not set".to_string())
        })?;
        let options = IpV4Options::new(self.options);
        if options.bytes_length() > options::MAXIMUM_OPTIONS_LENGTH {
            return Err(PacketError::InvalidFieldValue(
                "IPv4 options exceed 40 bytes".to_string(),
            ));
        }
        Ok(IpV4Layer {
            type_of_service: self.type_of_service,
            identification: self.identification,
            fragmentation: self.fragmentation,
            ttl: self.ttl.unwrap_or(64),
            protocol: self.protocol,
            header_checksum: None,
            source,
            destination,
            options,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::PacketBuilder;
    use crate::layer::PayloadLayer;
    use chrono::Utc;

    fn layer() -> IpV4Layer {
        IpV4Layer::builder()
            .source(Ipv4Addr::new(10, 0, 0, 1))
            .destination(Ipv4Addr::new(10, 0, 0, 2))
            .protocol(IpProtocol(200))
            .identification(0x1234)
            .fragmentation(IpV4Fragmentation::dont_fragment())
            .option(IpV4Option::StreamIdentifier(7))
            .build()
            .unwrap()
    }

    fn build(layers: Vec<Box<dyn Layer>>) -> crate::packet::Packet {
        PacketBuilder::build_packet(Utc::now(), layers).unwrap()
    }

    #[test]
    fn test_raw_ipv4_round_trip() {
        let ip = layer();
        let packet = build(vec![Box::new(ip.clone()), Box::new(PayloadLayer::new(vec![1, 2, 3]))]);
        assert_eq!(packet.data_link(), DataLinkKind::IpV4);

        let datagram = packet.ip_v4();
        assert!(datagram.is_valid());
        assert_eq!(datagram.header_length(), 24);
        assert_eq!(datagram.total_length(), 27);
        assert!(datagram.is_header_checksum_correct());
        assert_eq!(datagram.payload().as_slice(), &[1, 2, 3]);

        let mut extracted = datagram.extract_layer();
        extracted.header_checksum = None;
        assert_eq!(extracted, ip);
    }

    #[test]
    fn test_fragmentation_word() {
        let fragmentation = IpV4Fragmentation::new(false, true, 1480);
        let word = fragmentation.to_word().unwrap();
        assert_eq!(word, 0x2000 | 185);
        assert_eq!(IpV4Fragmentation::from_word(word), fragmentation);
        assert!(IpV4Fragmentation::new(false, false, 3).to_word().is_err());
    }

    #[test]
    fn test_header_checksum_flip_detected() {
        let packet = build(vec![Box::new(layer()), Box::new(PayloadLayer::new(vec![0]))]);
        let mut bytes = packet.as_bytes().to_vec();
        bytes[8] ^= 0x01;
        let datagram = IpV4Datagram::new(DataSegment::new(bytes));
        assert!(!datagram.is_header_checksum_correct());
        assert!(!datagram.is_valid());
    }

    #[test]
    fn test_header_length_beyond_capture_is_invalid() {
        let mut bytes = vec![0u8; 20];
        bytes[0] = 0x4F;
        let datagram = IpV4Datagram::new(DataSegment::new(bytes));
        assert!(!datagram.is_valid());
        assert!(datagram.payload().is_empty());
        assert!(datagram.options().options().is_empty() || !datagram.options().is_valid());
    }

    #[test]
    fn test_protocol_required_without_next_layer() {
        let mut ip = layer();
        ip.protocol = None;
        let result = PacketBuilder::build_packet(
            Utc::now(),
            vec![Box::new(ip), Box::new(PayloadLayer::new(vec![1]))],
        );
        assert!(matches!(result, Err(PacketError::CannotInferField { .. })));
    }

    #[test]
    fn test_ip_in_ip() {
        let mut outer = layer();
        outer.protocol = None;
        outer.options = IpV4Options::none();
        let packet = build(vec![
            Box::new(outer),
            Box::new(layer()),
            Box::new(PayloadLayer::new(vec![5])),
        ]);
        let datagram = packet.ip_v4();
        assert_eq!(datagram.protocol(), IpProtocol::IP_IN_IP);
        assert!(datagram.is_valid());
        assert_eq!(datagram.ip_v4().payload().as_slice(), &[5]);
    }
}
