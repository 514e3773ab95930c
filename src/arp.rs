//! ARP (Address Resolution Protocol) implementation.
//!
//! Addresses are kept as raw byte strings because ARP carries whatever
//! hardware and protocol address lengths its header announces. Helpers cover
//! the common Ethernet/IPv4 case.

use std::net::Ipv4Addr;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::PacketError;
use crate::bytes_ext::{Endianity, write_bytes, write_u8, write_u16};
use crate::datagram::{DataSegment, Datagram, impl_datagram_eq};
use crate::ethernet::{EtherType, MacAddress};
use crate::layer::{EthernetNextLayer, Layer};

/// ARP hardware types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ArpHardwareType(pub u16);

impl ArpHardwareType {
    /// Ethernet (10Mb)
    pub const ETHERNET: ArpHardwareType = ArpHardwareType(1);
    /// Experimental Ethernet
    pub const EXPERIMENTAL_ETHERNET: ArpHardwareType = ArpHardwareType(2);
    /// AX.25 Level 2
    pub const AX25: ArpHardwareType = ArpHardwareType(3);
    /// ProNET Token Ring
    pub const PRONET_TOKEN_RING: ArpHardwareType = ArpHardwareType(4);
    pub const CHAOS: ArpHardwareType = ArpHardwareType(5);
    /// IEEE 802 Networks
    pub const IEEE802: ArpHardwareType = ArpHardwareType(6);
    pub const ARCNET: ArpHardwareType = ArpHardwareType(7);
}

/// ARP operation codes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ArpOperation(pub u16);

impl ArpOperation {
    pub const REQUEST: ArpOperation = ArpOperation(1);
    pub const REPLY: ArpOperation = ArpOperation(2);
    pub const REVERSE_REQUEST: ArpOperation = ArpOperation(3);
    pub const REVERSE_REPLY: ArpOperation = ArpOperation(4);
    pub const INVERSE_REQUEST: ArpOperation = ArpOperation(8);
    pub const INVERSE_REPLY: ArpOperation = ArpOperation(9);
}

mod offset {
    pub const HARDWARE_TYPE: usize = 0;
    pub const PROTOCOL_TYPE: usize = 2;
    pub const HARDWARE_LENGTH: usize = 4;
    pub const PROTOCOL_LENGTH: usize = 5;
    pub const OPERATION: usize = 6;
    pub const SENDER_HARDWARE_ADDRESS: usize = 8;
}

/// A parsed ARP message.
#[derive(Debug, Clone)]
pub struct ArpDatagram {
    segment: DataSegment,
    validity: OnceCell<bool>,
}

impl_datagram_eq!(ArpDatagram);

impl ArpDatagram {
    pub const HEADER_BASE_LENGTH: usize = 8;

    pub fn new(segment: DataSegment) -> Self {
        Self {
            segment,
            validity: OnceCell::new(),
        }
    }

    /// Header length for the given address sizes.
    pub fn header_length(hardware_length: u8, protocol_length: u8) -> usize {
        Self::HEADER_BASE_LENGTH + 2 * (usize::from(hardware_length) + usize::from(protocol_length))
    }

    pub fn hardware_type(&self) -> ArpHardwareType {
        ArpHardwareType(self.segment.read_u16(offset::HARDWARE_TYPE, Endianity::Big))
    }

    pub fn protocol_type(&self) -> EtherType {
        EtherType(self.segment.read_u16(offset::PROTOCOL_TYPE, Endianity::Big))
    }

    pub fn hardware_length(&self) -> u8 {
        self.segment.read_u8(offset::HARDWARE_LENGTH)
    }

    pub fn protocol_length(&self) -> u8 {
        self.segment.read_u8(offset::PROTOCOL_LENGTH)
    }

    pub fn operation(&self) -> ArpOperation {
        ArpOperation(self.segment.read_u16(offset::OPERATION, Endianity::Big))
    }

    fn hardware_len(&self) -> usize {
        usize::from(self.hardware_length())
    }

    fn protocol_len(&self) -> usize {
        usize::from(self.protocol_length())
    }

    pub fn sender_hardware_address(&self) -> Vec<u8> {
        self.segment
            .read_bytes(offset::SENDER_HARDWARE_ADDRESS, self.hardware_len())
    }

    pub fn sender_protocol_address(&self) -> Vec<u8> {
        self.segment.read_bytes(
            offset::SENDER_HARDWARE_ADDRESS + self.hardware_len(),
            self.protocol_len(),
        )
    }

    pub fn target_hardware_address(&self) -> Vec<u8> {
        self.segment.read_bytes(
            offset::SENDER_HARDWARE_ADDRESS + self.hardware_len() + self.protocol_len(),
            self.hardware_len(),
        )
    }

    pub fn target_protocol_address(&self) -> Vec<u8> {
        self.segment.read_bytes(
            offset::SENDER_HARDWARE_ADDRESS + 2 * self.hardware_len() + self.protocol_len(),
            self.protocol_len(),
        )
    }

    /// The sender protocol address as IPv4, when it is 4 bytes long.
    pub fn sender_protocol_ipv4_address(&self) -> Option<Ipv4Addr> {
        to_ipv4(&self.sender_protocol_address())
    }

    pub fn target_protocol_ipv4_address(&self) -> Option<Ipv4Addr> {
        to_ipv4(&self.target_protocol_address())
    }

    pub fn extract_layer(&self) -> ArpLayer {
        ArpLayer {
            protocol_type: self.protocol_type(),
            operation: self.operation(),
            sender_hardware_address: self.sender_hardware_address(),
            sender_protocol_address: self.sender_protocol_address(),
            target_hardware_address: self.target_hardware_address(),
            target_protocol_address: self.target_protocol_address(),
        }
    }
}

fn to_ipv4(bytes: &[u8]) -> Option<Ipv4Addr> {
    let octets: [u8; 4] = bytes.try_into().ok()?;
    Some(Ipv4Addr::from(octets))
}

impl Datagram for ArpDatagram {
    fn segment(&self) -> &DataSegment {
        &self.segment
    }

    fn validity(&self) -> &OnceCell<bool> {
        &self.validity
    }

    fn calculate_is_valid(&self) -> bool {
        self.segment.len() >= Self::HEADER_BASE_LENGTH
            && self.segment.len()
                >= Self::header_length(self.hardware_length(), self.protocol_length())
    }
}

/// ARP message description.
///
/// The hardware type comes from the previous layer, which must be able to
/// carry ARP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArpLayer {
    pub protocol_type: EtherType,
    pub operation: ArpOperation,
    #[serde(with = "serde_bytes")]
    pub sender_hardware_address: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub sender_protocol_address: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub target_hardware_address: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub target_protocol_address: Vec<u8>,
}

impl ArpLayer {
    /// An Ethernet/IPv4 who-has request.
    pub fn request(sender_mac: MacAddress, sender_ip: Ipv4Addr, target_ip: Ipv4Addr) -> Self {
        Self {
            protocol_type: EtherType::IPV4,
            operation: ArpOperation::REQUEST,
            sender_hardware_address: sender_mac.as_bytes().to_vec(),
            sender_protocol_address: sender_ip.octets().to_vec(),
            target_hardware_address: MacAddress::ZERO.as_bytes().to_vec(),
            target_protocol_address: target_ip.octets().to_vec(),
        }
    }

    /// An Ethernet/IPv4 is-at reply.
    pub fn reply(
        sender_mac: MacAddress,
        sender_ip: Ipv4Addr,
        target_mac: MacAddress,
        target_ip: Ipv4Addr,
    ) -> Self {
        Self {
            protocol_type: EtherType::IPV4,
            operation: ArpOperation::REPLY,
            sender_hardware_address: sender_mac.as_bytes().to_vec(),
            sender_protocol_address: sender_ip.octets().to_vec(),
            target_hardware_address: target_mac.as_bytes().to_vec(),
            target_protocol_address: target_ip.octets().to_vec(),
        }
    }
}

impl Layer for ArpLayer {
    fn name(&self) -> &'static str {
        "ARP"
    }

    fn length(&self) -> usize {
        ArpDatagram::HEADER_BASE_LENGTH
            + self.sender_hardware_address.len()
            + self.sender_protocol_address.len()
            + self.target_hardware_address.len()
            + self.target_protocol_address.len()
    }

    fn write(
        &self,
        buffer: &mut [u8],
        offset: &mut usize,
        _payload_length: usize,
        previous: Option<&dyn Layer>,
        _next: Option<&dyn Layer>,
    ) -> Result<(), PacketError> {
        let previous = previous.ok_or(PacketError::MissingPreviousLayer { layer: self.name() })?;
        let hardware_type = previous
            .as_arp_previous()
            .ok_or(PacketError::IncompatiblePreviousLayer {
                layer: self.name(),
                required: "an ARP hardware type",
            })?
            .previous_layer_hardware_type();

        if self.sender_hardware_address.len() != self.target_hardware_address.len() {
            return Err(PacketError::AddressLengthMismatch {
                sender: self.sender_hardware_address.len(),
                target: self.target_hardware_address.len(),
            });
        }
        if self.sender_protocol_address.len() != self.target_protocol_address.len() {
            return Err(PacketError::AddressLengthMismatch {
                sender: self.sender_protocol_address.len(),
                target: self.target_protocol_address.len(),
            });
        }
        let hardware_length = u8::try_from(self.sender_hardware_address.len()).map_err(|_| {
            PacketError::InvalidFieldValue("ARP hardware address longer than 255 bytes".to_string())
        })?;
        let protocol_length = u8::try_from(self.sender_protocol_address.len()).map_err(|_| {
            PacketError::InvalidFieldValue("ARP protocol address longer than 255 bytes".to_string())
        })?;

        write_u16(buffer, offset, hardware_type.0, Endianity::Big);
        write_u16(buffer, offset, self.protocol_type.0, Endianity::Big);
        write_u8(buffer, offset, hardware_length);
        write_u8(buffer, offset, protocol_length);
        write_u16(buffer, offset, self.operation.0, Endianity::Big);
        write_bytes(buffer, offset, &self.sender_hardware_address);
        write_bytes(buffer, offset, &self.sender_protocol_address);
        write_bytes(buffer, offset, &self.target_hardware_address);
        write_bytes(buffer, offset, &self.target_protocol_address);
        Ok(())
    }

    fn as_ethernet_next(&self) -> Option<&dyn EthernetNextLayer> {
        Some(self)
    }
}

impl EthernetNextLayer for ArpLayer {
    fn previous_layer_ether_type(&self) -> EtherType {
        EtherType::ARP
    }

    fn previous_layer_default_destination(&self) -> Option<MacAddress> {
        Some(MacAddress::BROADCAST)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::PacketBuilder;
    use crate::ethernet::EthernetLayer;
    use crate::layer::PayloadLayer;
    use crate::packet::DataLinkKind;
    use chrono::Utc;

    fn ethernet() -> EthernetLayer {
        EthernetLayer {
            source: MacAddress::new([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]),
            ..Default::default()
        }
    }

    #[test]
    fn test_arp_request_round_trip() {
        let arp = ArpLayer::request(
            MacAddress::new([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]),
            Ipv4Addr::new(192, 168, 1, 1),
            Ipv4Addr::new(192, 168, 1, 2),
        );
        let packet =
            PacketBuilder::build_packet(Utc::now(), vec![Box::new(ethernet()), Box::new(arp.clone())])
                .unwrap();
        assert_eq!(packet.len(), 42);
        assert_eq!(packet.data_link(), DataLinkKind::Ethernet);

        let ethernet = packet.ethernet();
        assert_eq!(ethernet.destination(), MacAddress::BROADCAST);
        assert_eq!(ethernet.ether_type(), EtherType::ARP);

        let datagram = ethernet.arp();
        assert!(datagram.is_valid());
        assert_eq!(datagram.hardware_type(), ArpHardwareType::ETHERNET);
        assert_eq!(datagram.operation(), ArpOperation::REQUEST);
        assert_eq!(
            datagram.target_protocol_ipv4_address(),
            Some(Ipv4Addr::new(192, 168, 1, 2))
        );
        assert_eq!(datagram.extract_layer(), arp);
    }

    #[test]
    fn test_requires_arp_capable_previous_layer() {
        let arp = ArpLayer::request(MacAddress::ZERO, Ipv4Addr::LOCALHOST, Ipv4Addr::LOCALHOST);
        let missing = PacketBuilder::build_packet(
            Utc::now(),
            vec![
                Box::new(EthernetLayer {
                    ether_type: Some(EtherType::ARP),
                    ..ethernet()
                }),
                Box::new(PayloadLayer::new(vec![1])),
                Box::new(arp),
            ],
        );
        assert!(matches!(
            missing,
            Err(PacketError::IncompatiblePreviousLayer { layer: "ARP", .. })
        ));
    }

    #[test]
    fn test_mismatched_address_lengths() {
        let mut arp = ArpLayer::request(MacAddress::ZERO, Ipv4Addr::LOCALHOST, Ipv4Addr::LOCALHOST);
        arp.target_protocol_address = vec![1, 2];
        let result =
            PacketBuilder::build_packet(Utc::now(), vec![Box::new(ethernet()), Box::new(arp)]);
        assert!(matches!(
            result,
            Err(PacketError::AddressLengthMismatch { sender: 4, target: 2 })
        ));
    }

    #[test]
    fn test_truncated_arp_is_invalid() {
        let datagram = ArpDatagram::new(DataSegment::new(vec![0, 1, 8, 0, 6, 4, 0, 1, 0, 0]));
        assert!(!datagram.is_valid());
        assert_eq!(datagram.sender_hardware_address(), vec![0, 0]);
        assert_eq!(datagram.sender_protocol_ipv4_address(), None);
    }
}
