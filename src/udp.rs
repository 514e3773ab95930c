//! UDP (User Datagram Protocol) implementation.
//!
//! This module provides the parsed [`UdpDatagram`] view, the [`UdpLayer`]
//! used to build one, and the DNS and DHCP views of a UDP payload.

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::PacketError;
use crate::bytes_ext::{Endianity, write_u16};
use crate::checksum::PseudoHeader;
use crate::datagram::{DataSegment, Datagram, impl_datagram_eq};
use crate::dhcp::DhcpDatagram;
use crate::dns::DnsDatagram;
use crate::ip::IpProtocol;
use crate::layer::{IpNextLayer, IpNextTransportLayer, Layer};

mod offset {
    pub const SOURCE_PORT: usize = 0;
    pub const DESTINATION_PORT: usize = 2;
    pub const TOTAL_LENGTH: usize = 4;
    pub const CHECKSUM: usize = 6;
}

/// A parsed UDP datagram.
#[derive(Debug, Clone)]
pub struct UdpDatagram {
    segment: DataSegment,
    validity: OnceCell<bool>,
}

impl_datagram_eq!(UdpDatagram);

impl UdpDatagram {
    /// The UDP header is always 8 bytes long.
    pub const HEADER_LENGTH: usize = 8;

    pub fn new(segment: DataSegment) -> Self {
        Self {
            segment,
            validity: OnceCell::new(),
        }
    }

    #[inline]
    pub fn source_port(&self) -> u16 {
        self.segment.read_u16(offset::SOURCE_PORT, Endianity::Big)
    }

    #[inline]
    pub fn destination_port(&self) -> u16 {
        self.segment.read_u16(offset::DESTINATION_PORT, Endianity::Big)
    }

    /// Header plus payload length as declared in the header.
    #[inline]
    pub fn total_length(&self) -> u16 {
        self.segment.read_u16(offset::TOTAL_LENGTH, Endianity::Big)
    }

    #[inline]
    pub fn checksum_field(&self) -> u16 {
        self.segment.read_u16(offset::CHECKSUM, Endianity::Big)
    }

    /// Whether the sender computed a checksum (a zero field means it did not).
    pub fn has_checksum(&self) -> bool {
        self.checksum_field() != 0
    }

    /// The payload, bounded by both the declared and the captured length.
    pub fn payload(&self) -> DataSegment {
        let declared = usize::from(self.total_length()).saturating_sub(Self::HEADER_LENGTH);
        self.segment.subsegment(Self::HEADER_LENGTH, declared)
    }

    pub fn dns(&self) -> DnsDatagram {
        DnsDatagram::new(self.payload())
    }

    pub fn dhcp(&self) -> DhcpDatagram {
        DhcpDatagram::new(self.payload())
    }

    /// Verifies the checksum against the enclosing IP addresses.
    ///
    /// A zero checksum field means none was computed and is reported correct.
    pub fn is_checksum_correct(&self, pseudo_header: PseudoHeader) -> bool {
        let stored = self.checksum_field();
        if stored == 0 {
            return true;
        }
        let mut calculated = pseudo_header.transport_checksum(
            IpProtocol::UDP.0,
            self.segment.as_slice(),
            offset::CHECKSUM,
        );
        if calculated == 0 {
            calculated = 0xFFFF;
        }
        calculated == stored
    }

    pub fn extract_layer(&self) -> UdpLayer {
        UdpLayer {
            source_port: self.source_port(),
            destination_port: self.destination_port(),
            checksum: Some(self.checksum_field()),
        }
    }
}

impl Datagram for UdpDatagram {
    fn segment(&self) -> &DataSegment {
        &self.segment
    }

    fn validity(&self) -> &OnceCell<bool> {
        &self.validity
    }

    fn calculate_is_valid(&self) -> bool {
        let total_length = usize::from(self.total_length());
        self.segment.len() >= Self::HEADER_LENGTH
            && total_length >= Self::HEADER_LENGTH
            && total_length <= self.segment.len()
    }
}

/// UDP header description.
///
/// `checksum: None` has the enclosing IP layer compute it; `Some(0)` sends
/// the datagram without a checksum.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UdpLayer {
    pub source_port: u16,
    pub destination_port: u16,
    pub checksum: Option<u16>,
}

impl UdpLayer {
    /// Creates a new UDP layer builder.
    pub fn builder() -> UdpBuilder {
        UdpBuilder::new()
    }
}

impl Layer for UdpLayer {
    fn name(&self) -> &'static str {
        "UDP"
    }

    fn length(&self) -> usize {
        UdpDatagram::HEADER_LENGTH
    }

    fn write(
        &self,
        buffer: &mut [u8],
        offset: &mut usize,
        payload_length: usize,
        _previous: Option<&dyn Layer>,
        _next: Option<&dyn Layer>,
    ) -> Result<(), PacketError> {
        let total_length = u16::try_from(UdpDatagram::HEADER_LENGTH + payload_length)
            .map_err(|_| PacketError::InvalidLength)?;
        write_u16(buffer, offset, self.source_port, Endianity::Big);
        write_u16(buffer, offset, self.destination_port, Endianity::Big);
        write_u16(buffer, offset, total_length, Endianity::Big);
        write_u16(buffer, offset, self.checksum.unwrap_or(0), Endianity::Big);
        Ok(())
    }

    fn as_ip_next(&self) -> Option<&dyn IpNextLayer> {
        Some(self)
    }

    fn as_ip_next_transport(&self) -> Option<&dyn IpNextTransportLayer> {
        Some(self)
    }
}

impl IpNextLayer for UdpLayer {
    fn previous_layer_protocol(&self) -> IpProtocol {
        IpProtocol::UDP
    }
}

impl IpNextTransportLayer for UdpLayer {
    fn checksum(&self) -> Option<u16> {
        self.checksum
    }

    fn checksum_offset(&self) -> usize {
        offset::CHECKSUM
    }

    fn is_checksum_optional(&self) -> bool {
        true
    }
}

/// Builder for constructing UDP layers.
///
/// Provides a fluent interface with validation of the required ports.
#[derive(Debug, Default)]
pub struct UdpBuilder {
    src_port: Option<u16>,
    dst_port: Option<u16>,
    checksum: Option<u16>,
}

impl UdpBuilder {
    /// Creates a new UDP layer builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the source port.
    pub fn src_port(mut self, port: u16) -> Self {
        self.src_port = Some(port);
        self
    }

    /// Sets the destination port.
    pub fn dst_port(mut self, port: u16) -> Self {
        self.dst_port = Some(port);
        self
    }

    /// Sends the datagram without a checksum.
    pub fn without_checksum(mut self) -> Self {
        self.checksum = Some(0);
        self
    }

    /// Builds the UDP layer.
    ///
    /// # Returns
    /// - `Ok(UdpLayer)` - The constructed layer
    /// - `Err(PacketError)` - If any required fields are missing
    pub fn build(self) -> Result<UdpLayer, PacketError> {
        let source_port = self.src_port.ok_or_else(|| {
            PacketError::InvalidFieldValue("Source port not set".to_string())
        })?;
        let destination_port = self.dst_port.ok_or_else(|| {
            PacketError::InvalidFieldValue("Destination port not set".to_string())
        })?;
        Ok(UdpLayer {
            source_port,
            destination_port,
            checksum: self.checksum,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::PacketBuilder;
    use crate::ipv4::IpV4Layer;
    use crate::layer::PayloadLayer;
    use crate::packet::Packet;
    use chrono::Utc;
    use std::net::Ipv4Addr;

    fn ip() -> IpV4Layer {
        IpV4Layer::builder()
            .source(Ipv4Addr::new(10, 0, 0, 1))
            .destination(Ipv4Addr::new(10, 0, 0, 2))
            .build()
            .unwrap()
    }

    fn build(layers: Vec<Box<dyn Layer>>) -> Packet {
        PacketBuilder::build_packet(Utc::now(), layers).unwrap()
    }

    #[test]
    fn test_udp_builder() {
        let layer = UdpLayer::builder()
            .src_port(12345)
            .dst_port(53)
            .build()
            .unwrap();
        assert_eq!(layer.length(), 8);
        assert_eq!(layer.checksum, None);

        // Test missing fields
        let result = UdpLayer::builder().src_port(12345).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_udp_round_trip() {
        let udp = UdpLayer::builder().src_port(1234).dst_port(80).build().unwrap();
        let packet = build(vec![
            Box::new(ip()),
            Box::new(udp.clone()),
            Box::new(PayloadLayer::new(vec![1, 2, 3, 4])),
        ]);
        let ip_datagram = packet.ip_v4();
        let datagram = ip_datagram.udp();
        assert!(datagram.is_valid());
        assert_eq!(datagram.total_length(), 12);
        assert_eq!(datagram.payload().as_slice(), &[1, 2, 3, 4]);
        assert!(datagram.has_checksum());
        assert!(datagram.is_checksum_correct(ip_datagram.pseudo_header()));

        let extracted = datagram.extract_layer();
        assert_eq!(extracted.source_port, udp.source_port);
        assert_eq!(extracted.destination_port, udp.destination_port);
    }

    #[test]
    fn test_zero_checksum_is_accepted() {
        let udp = UdpLayer::builder()
            .src_port(1)
            .dst_port(2)
            .without_checksum()
            .build()
            .unwrap();
        let packet = build(vec![
            Box::new(ip()),
            Box::new(udp),
            Box::new(PayloadLayer::new(vec![9; 3])),
        ]);
        let ip_datagram = packet.ip_v4();
        assert_eq!(ip_datagram.udp().checksum_field(), 0);
        assert!(ip_datagram.is_valid());
    }

    #[test]
    fn test_checksum_flip_detected() {
        let udp = UdpLayer::builder().src_port(1).dst_port(2).build().unwrap();
        let packet = build(vec![
            Box::new(ip()),
            Box::new(udp),
            Box::new(PayloadLayer::new(vec![1, 2, 3, 4])),
        ]);
        let mut bytes = packet.as_bytes().to_vec();
        bytes[28] ^= 0x80;
        let corrupted = Packet::new(bytes, Utc::now(), packet.data_link());
        let ip_datagram = corrupted.ip_v4();
        assert!(!ip_datagram.udp().is_checksum_correct(ip_datagram.pseudo_header()));
        assert!(!ip_datagram.is_valid());
    }

    #[test]
    fn test_declared_length_beyond_capture_is_invalid() {
        let datagram = UdpDatagram::new(DataSegment::new(vec![0, 1, 0, 2, 0, 20, 0, 0, 1]));
        assert!(!datagram.is_valid());
        assert_eq!(datagram.payload().as_slice(), &[1]);
        assert!(!UdpDatagram::new(DataSegment::new(vec![0; 7])).is_valid());
    }
}
