//! IPv6 datagrams, extension headers and layers.

pub mod extension;
pub mod mobility;
pub mod options;

use std::net::Ipv6Addr;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::PacketError;
use crate::bytes_ext::{Endianity, set_u16, write_ipv6, write_u8, write_u16, write_u32};
use crate::checksum::PseudoHeader;
use crate::datagram::{DataSegment, Datagram, impl_datagram_eq};
use crate::ethernet::EtherType;
use crate::gre::GreDatagram;
use crate::ip::{IpPayload, IpProtocol, is_transport_checksum_correct, write_transport_checksum};
use crate::layer::{EthernetNextLayer, IpNextLayer, Layer, resolve_ip_protocol};
use crate::packet::DataLinkKind;
use crate::tcp::TcpDatagram;
use crate::udp::UdpDatagram;

pub use extension::{IpV6ExtensionHeader, IpV6ExtensionHeaders, IpV6RoutingData};
pub use mobility::{IpV6MobilityHeader, IpV6MobilityHeaderType, IpV6MobilityOption};
pub use options::{IpV6Option, IpV6Options};

mod offset {
    pub const VERSION_CLASS_FLOW: usize = 0;
    pub const PAYLOAD_LENGTH: usize = 4;
    pub const NEXT_HEADER: usize = 6;
    pub const HOP_LIMIT: usize = 7;
    pub const SOURCE: usize = 8;
    pub const DESTINATION: usize = 24;
}

const FLOW_LABEL_MASK: u32 = 0x000F_FFFF;

/// A parsed IPv6 datagram.
#[derive(Debug, Clone)]
pub struct IpV6Datagram {
    segment: DataSegment,
    validity: OnceCell<bool>,
}

impl_datagram_eq!(IpV6Datagram);

impl IpV6Datagram {
    pub const HEADER_LENGTH: usize = 40;

    pub fn new(segment: DataSegment) -> Self {
        Self {
            segment,
            validity: OnceCell::new(),
        }
    }

    fn first_word(&self) -> u32 {
        self.segment.read_u32(offset::VERSION_CLASS_FLOW, Endianity::Big)
    }

    pub fn version(&self) -> u8 {
        (self.first_word() >> 28) as u8
    }

    pub fn traffic_class(&self) -> u8 {
        (self.first_word() >> 20) as u8
    }

    pub fn flow_label(&self) -> u32 {
        self.first_word() & FLOW_LABEL_MASK
    }

    pub fn payload_length(&self) -> u16 {
        self.segment.read_u16(offset::PAYLOAD_LENGTH, Endianity::Big)
    }

    pub fn next_header(&self) -> IpProtocol {
        IpProtocol(self.segment.read_u8(offset::NEXT_HEADER))
    }

    pub fn hop_limit(&self) -> u8 {
        self.segment.read_u8(offset::HOP_LIMIT)
    }

    pub fn source(&self) -> Ipv6Addr {
        self.segment.read_ipv6(offset::SOURCE)
    }

    pub fn destination(&self) -> Ipv6Addr {
        self.segment.read_ipv6(offset::DESTINATION)
    }

    /// Extension headers plus upper-layer data, bounded by the payload length field.
    pub fn payload(&self) -> DataSegment {
        self.segment
            .subsegment(Self::HEADER_LENGTH, usize::from(self.payload_length()))
    }

    pub fn extension_headers(&self) -> IpV6ExtensionHeaders {
        IpV6ExtensionHeaders::parse(self.next_header(), self.payload().as_slice())
    }

    /// Protocol after the extension header chain.
    pub fn transport_protocol(&self) -> IpProtocol {
        self.extension_headers()
            .next_header()
            .unwrap_or(self.next_header())
    }

    /// Bytes after the extension header chain.
    pub fn transport_payload(&self) -> DataSegment {
        self.payload().tail(self.extension_headers().parsed_length())
    }

    pub fn payload_datagram(&self) -> IpPayload {
        IpPayload::new(self.transport_protocol(), self.transport_payload())
    }

    pub fn tcp(&self) -> TcpDatagram {
        TcpDatagram::new(self.transport_payload())
    }

    pub fn udp(&self) -> UdpDatagram {
        UdpDatagram::new(self.transport_payload())
    }

    pub fn gre(&self) -> GreDatagram {
        GreDatagram::new(self.transport_payload())
    }

    pub fn pseudo_header(&self) -> PseudoHeader {
        PseudoHeader::V6 {
            source: self.source(),
            destination: self.destination(),
        }
    }

    pub fn is_transport_checksum_correct(&self) -> bool {
        is_transport_checksum_correct(
            self.pseudo_header(),
            self.transport_protocol(),
            &self.transport_payload(),
        )
    }

    /// Checks the mobility header checksum; true when there is no mobility header.
    pub fn is_mobility_checksum_correct(&self) -> bool {
        let headers = self.extension_headers();
        let payload = self.payload();
        let mut position = 0;
        for header in headers.headers() {
            let length = header.length();
            if let IpV6ExtensionHeader::Mobility(mobility) = header {
                let bytes = payload.subsegment(position, length);
                let expected = self.pseudo_header().transport_checksum(
                    IpProtocol::MOBILITY_HEADER.0,
                    bytes.as_slice(),
                    mobility::CHECKSUM_OFFSET,
                );
                return mobility.checksum == Some(expected);
            }
            position += length;
        }
        true
    }

    pub fn extract_layer(&self) -> IpV6Layer {
        let headers = self.extension_headers();
        IpV6Layer {
            traffic_class: self.traffic_class(),
            flow_label: self.flow_label(),
            next_header: headers.next_header(),
            hop_limit: self.hop_limit(),
            source: self.source(),
            destination: self.destination(),
            extension_headers: IpV6ExtensionHeaders::new(headers.headers().to_vec()),
        }
    }
}

impl Datagram for IpV6Datagram {
    fn segment(&self) -> &DataSegment {
        &self.segment
    }

    fn validity(&self) -> &OnceCell<bool> {
        &self.validity
    }

    fn calculate_is_valid(&self) -> bool {
        if self.segment.len() < Self::HEADER_LENGTH || self.version() != 6 {
            return false;
        }
        if Self::HEADER_LENGTH + usize::from(self.payload_length()) > self.segment.len() {
            return false;
        }
        let headers = self.extension_headers();
        if !headers.is_valid() || !self.is_mobility_checksum_correct() {
            return false;
        }
        if headers.is_fragmented() {
            return true;
        }
        self.payload_datagram().is_valid() && self.is_transport_checksum_correct()
    }
}

/// IPv6 header description, extension headers included.
///
/// `next_header` is the protocol after the extension headers; `None` takes it
/// from the next layer, or writes No Next Header when this is the last layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpV6Layer {
    pub traffic_class: u8,
    pub flow_label: u32,
    pub next_header: Option<IpProtocol>,
    pub hop_limit: u8,
    pub source: Ipv6Addr,
    pub destination: Ipv6Addr,
    pub extension_headers: IpV6ExtensionHeaders,
}

impl Default for IpV6Layer {
    fn default() -> Self {
        Self {
            traffic_class: 0,
            flow_label: 0,
            next_header: None,
            hop_limit: 64,
            source: Ipv6Addr::UNSPECIFIED,
            destination: Ipv6Addr::UNSPECIFIED,
            extension_headers: IpV6ExtensionHeaders::default(),
        }
    }
}

impl IpV6Layer {
    fn resolve_next_header(&self, next: Option<&dyn Layer>) -> Result<IpProtocol, PacketError> {
        if next.is_none() && self.next_header.is_none() {
            return Ok(IpProtocol::IPV6_NO_NEXT_HEADER);
        }
        resolve_ip_protocol(self.next_header, next, self.name())
    }

    fn pseudo_header(&self) -> PseudoHeader {
        PseudoHeader::V6 {
            source: self.source,
            destination: self.destination,
        }
    }

    fn write_mobility_checksum(&self, buffer: &mut [u8], start: usize) {
        let mut position = start;
        for header in self.extension_headers.headers() {
            let length = header.length();
            if let IpV6ExtensionHeader::Mobility(mobility) = header {
                if mobility.checksum.is_none() {
                    let value = self.pseudo_header().transport_checksum(
                        IpProtocol::MOBILITY_HEADER.0,
                        &buffer[position..position + length],
                        mobility::CHECKSUM_OFFSET,
                    );
                    set_u16(buffer, position + mobility::CHECKSUM_OFFSET, value, Endianity::Big);
                }
            }
            position += length;
        }
    }
}

impl Layer for IpV6Layer {
    fn name(&self) -> &'static str {
        "IPv6"
    }

    fn length(&self) -> usize {
        IpV6Datagram::HEADER_LENGTH + self.extension_headers.bytes_length()
    }

    fn write(
        &self,
        buffer: &mut [u8],
        offset: &mut usize,
        payload_length: usize,
        _previous: Option<&dyn Layer>,
        next: Option<&dyn Layer>,
    ) -> Result<(), PacketError> {
        if self.flow_label > FLOW_LABEL_MASK {
            return Err(PacketError::InvalidFieldValue(format!(
                "IPv6 flow label {:#x} exceeds 20 bits",
                self.flow_label
            )));
        }
        let extension_length = self.extension_headers.bytes_length();
        let ipv6_payload_length = u16::try_from(extension_length + payload_length)
            .map_err(|_| PacketError::InvalidLength)?;
        let next_header = self.resolve_next_header(next)?;
        let first_header = self.extension_headers.first_protocol().unwrap_or(next_header);

        let first_word = (6u32 << 28) | (u32::from(self.traffic_class) << 20) | self.flow_label;
        write_u32(buffer, offset, first_word, Endianity::Big);
        write_u16(buffer, offset, ipv6_payload_length, Endianity::Big);
        write_u8(buffer, offset, first_header.0);
        write_u8(buffer, offset, self.hop_limit);
        write_ipv6(buffer, offset, self.source);
        write_ipv6(buffer, offset, self.destination);

        let chain_start = *offset;
        self.extension_headers.write(buffer, offset, next_header)?;
        self.write_mobility_checksum(buffer, chain_start);
        Ok(())
    }

    fn finalize(
        &self,
        buffer: &mut [u8],
        offset: usize,
        payload_length: usize,
        next: Option<&dyn Layer>,
    ) -> Result<(), PacketError> {
        let protocol = self.resolve_next_header(next)?;
        write_transport_checksum(
            buffer,
            offset + self.length(),
            payload_length,
            self.pseudo_header(),
            protocol,
            next,
        );
        Ok(())
    }

    fn data_link(&self) -> Option<DataLinkKind> {
        Some(DataLinkKind::IpV6)
    }

    fn as_ethernet_next(&self) -> Option<&dyn EthernetNextLayer> {
        Some(self)
    }

    fn as_ip_next(&self) -> Option<&dyn IpNextLayer> {
        Some(self)
    }
}

impl EthernetNextLayer for IpV6Layer {
    fn previous_layer_ether_type(&self) -> EtherType {
        EtherType::IPV6
    }
}

impl IpNextLayer for IpV6Layer {
    fn previous_layer_protocol(&self) -> IpProtocol {
        IpProtocol::IPV6
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::PacketBuilder;
    use crate::layer::PayloadLayer;
    use chrono::Utc;

    fn layer() -> IpV6Layer {
        IpV6Layer {
            traffic_class: 0x12,
            flow_label: 0xABCDE,
            next_header: Some(IpProtocol(253)),
            hop_limit: 10,
            source: "2001:db8::1".parse().unwrap(),
            destination: "2001:db8::2".parse().unwrap(),
            extension_headers: IpV6ExtensionHeaders::new(vec![
                IpV6ExtensionHeader::DestinationOptions(IpV6Options::new(vec![
                    IpV6Option::TunnelEncapsulationLimit(4),
                ])),
            ]),
        }
    }

    #[test]
    fn test_ipv6_round_trip() {
        let ip = layer();
        let packet = PacketBuilder::build_packet(
            Utc::now(),
            vec![Box::new(ip.clone()), Box::new(PayloadLayer::new(vec![9, 9]))],
        )
        .unwrap();
        assert_eq!(packet.data_link(), DataLinkKind::IpV6);

        let datagram = packet.ip_v6();
        assert!(datagram.is_valid());
        assert_eq!(datagram.version(), 6);
        assert_eq!(datagram.traffic_class(), 0x12);
        assert_eq!(datagram.flow_label(), 0xABCDE);
        assert_eq!(datagram.payload_length(), 10);
        assert_eq!(datagram.next_header(), IpProtocol::IPV6_DESTINATION_OPTIONS);
        assert_eq!(datagram.transport_protocol(), IpProtocol(253));
        assert_eq!(datagram.transport_payload().as_slice(), &[9, 9]);
        assert_eq!(datagram.extract_layer(), ip);
    }

    #[test]
    fn test_mobility_checksum() {
        let mut ip = layer();
        ip.next_header = None;
        ip.extension_headers = IpV6ExtensionHeaders::new(vec![IpV6ExtensionHeader::Mobility(
            IpV6MobilityHeader::new(
                IpV6MobilityHeaderType::BINDING_REFRESH_REQUEST,
                vec![0, 0],
                vec![IpV6MobilityOption::BindingRefreshAdvice(30)],
            ),
        )]);
        let packet = PacketBuilder::build_packet(Utc::now(), vec![Box::new(ip)]).unwrap();
        let datagram = packet.ip_v6();
        assert!(datagram.is_mobility_checksum_correct());
        assert!(datagram.is_valid());
        assert_eq!(datagram.transport_protocol(), IpProtocol::IPV6_NO_NEXT_HEADER);

        let mut bytes = packet.as_bytes().to_vec();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        let corrupted = IpV6Datagram::new(DataSegment::new(bytes));
        assert!(!corrupted.is_mobility_checksum_correct());
        assert!(!corrupted.is_valid());
    }

    #[test]
    fn test_short_buffer_is_invalid() {
        let datagram = IpV6Datagram::new(DataSegment::new(vec![0x60; 39]));
        assert!(!datagram.is_valid());
        assert_eq!(datagram.version(), 6);
    }

    #[test]
    fn test_flow_label_range_checked() {
        let mut ip = layer();
        ip.flow_label = 0x100000;
        assert!(PacketBuilder::build_packet(Utc::now(), vec![Box::new(ip)]).is_err());
    }
}
