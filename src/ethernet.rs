//! Ethernet II frames.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::arp::{ArpDatagram, ArpHardwareType};
use crate::bytes_ext::{Endianity, write_bytes, write_u16};
use crate::datagram::{DataSegment, Datagram, impl_datagram_eq};
use crate::ipv4::IpV4Datagram;
use crate::ipv6::IpV6Datagram;
use crate::layer::{ArpPreviousLayer, Layer, resolve_ether_type};
use crate::packet::DataLinkKind;
use crate::vlan::VLanTaggedFrameDatagram;
use crate::PacketError;

/// MAC address representation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash, Default)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub const ZERO: MacAddress = MacAddress([0; 6]);
    pub const BROADCAST: MacAddress = MacAddress([0xFF; 6]);

    pub const fn new(addr: [u8; 6]) -> Self {
        Self(addr)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    pub(crate) fn read(segment: &DataSegment, offset: usize) -> Self {
        let mut addr = [0u8; 6];
        for (i, byte) in addr.iter_mut().enumerate() {
            *byte = segment.read_u8(offset + i);
        }
        Self(addr)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl FromStr for MacAddress {
    type Err = PacketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PacketError::InvalidFieldValue(format!("Invalid MAC address: {s}"));
        let mut addr = [0u8; 6];
        let mut parts = s.split([':', '-']);
        for byte in addr.iter_mut() {
            let part = parts.next().ok_or_else(invalid)?;
            *byte = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self(addr))
    }
}

/// EtherType values
///
/// Unlisted values are carried as-is.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EtherType(pub u16);

impl EtherType {
    pub const NONE: EtherType = EtherType(0x0000);
    pub const IPV4: EtherType = EtherType(0x0800);
    pub const ARP: EtherType = EtherType(0x0806);
    pub const REVERSE_ARP: EtherType = EtherType(0x8035);
    pub const VLAN_TAGGED_FRAME: EtherType = EtherType(0x8100);
    pub const IPV6: EtherType = EtherType(0x86DD);
    pub const PPP: EtherType = EtherType(0x880B);
    pub const MPLS_UNICAST: EtherType = EtherType(0x8847);
    pub const PROVIDER_BRIDGING: EtherType = EtherType(0x88A8);
}

lazy_static! {
    static ref ETHER_TYPE_NAMES: HashMap<u16, &'static str> = HashMap::from([
        (0x0000, "None"),
        (0x0800, "IPv4"),
        (0x0806, "ARP"),
        (0x8035, "Reverse ARP"),
        (0x8100, "VLAN Tagged Frame"),
        (0x86DD, "IPv6"),
        (0x880B, "PPP"),
        (0x8847, "MPLS Unicast"),
        (0x88A8, "Provider Bridging"),
    ]);
}

impl fmt::Display for EtherType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match ETHER_TYPE_NAMES.get(&self.0) {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "0x{:04X}", self.0),
        }
    }
}

/// The datagram an EtherType field announces.
///
/// Shared by Ethernet, VLAN tagged frames and GRE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EtherTypePayload {
    IpV4(IpV4Datagram),
    IpV6(IpV6Datagram),
    Arp(ArpDatagram),
    VLanTaggedFrame(VLanTaggedFrameDatagram),
    Unknown(EtherType, DataSegment),
}

impl EtherTypePayload {
    pub fn new(ether_type: EtherType, segment: DataSegment) -> Self {
        match ether_type {
            EtherType::IPV4 => EtherTypePayload::IpV4(IpV4Datagram::new(segment)),
            EtherType::IPV6 => EtherTypePayload::IpV6(IpV6Datagram::new(segment)),
            EtherType::ARP => EtherTypePayload::Arp(ArpDatagram::new(segment)),
            EtherType::VLAN_TAGGED_FRAME => {
                EtherTypePayload::VLanTaggedFrame(VLanTaggedFrameDatagram::new(segment))
            }
            other => EtherTypePayload::Unknown(other, segment),
        }
    }

    /// Validity of the payload; unknown payloads are taken as valid.
    pub fn is_valid(&self) -> bool {
        match self {
            EtherTypePayload::IpV4(datagram) => datagram.is_valid(),
            EtherTypePayload::IpV6(datagram) => datagram.is_valid(),
            EtherTypePayload::Arp(datagram) => datagram.is_valid(),
            EtherTypePayload::VLanTaggedFrame(datagram) => datagram.is_valid(),
            EtherTypePayload::Unknown(..) => true,
        }
    }
}

mod offset {
    pub const DESTINATION: usize = 0;
    pub const SOURCE: usize = 6;
    pub const ETHER_TYPE: usize = 12;
}

/// A parsed Ethernet II frame.
#[derive(Debug, Clone)]
pub struct EthernetDatagram {
    segment: DataSegment,
    validity: OnceCell<bool>,
}

impl_datagram_eq!(EthernetDatagram);

impl EthernetDatagram {
    pub const HEADER_LENGTH: usize = 14;

    pub fn new(segment: DataSegment) -> Self {
        Self {
            segment,
            validity: OnceCell::new(),
        }
    }

    pub fn destination(&self) -> MacAddress {
        MacAddress::read(&self.segment, offset::DESTINATION)
    }

    pub fn source(&self) -> MacAddress {
        MacAddress::read(&self.segment, offset::SOURCE)
    }

    pub fn ether_type(&self) -> EtherType {
        EtherType(self.segment.read_u16(offset::ETHER_TYPE, Endianity::Big))
    }

    pub fn header_length(&self) -> usize {
        Self::HEADER_LENGTH
    }

    pub fn payload(&self) -> DataSegment {
        self.segment.tail(Self::HEADER_LENGTH)
    }

    /// The payload, typed by the EtherType field.
    pub fn payload_datagram(&self) -> EtherTypePayload {
        EtherTypePayload::new(self.ether_type(), self.payload())
    }

    pub fn ip_v4(&self) -> IpV4Datagram {
        IpV4Datagram::new(self.payload())
    }

    pub fn ip_v6(&self) -> IpV6Datagram {
        IpV6Datagram::new(self.payload())
    }

    pub fn arp(&self) -> ArpDatagram {
        ArpDatagram::new(self.payload())
    }

    pub fn vlan_tagged_frame(&self) -> VLanTaggedFrameDatagram {
        VLanTaggedFrameDatagram::new(self.payload())
    }

    /// Bytes after an IPv4 payload's declared total length (frame padding).
    pub fn trailer(&self) -> DataSegment {
        match self.ether_type() {
            EtherType::IPV4 => {
                let ip = self.ip_v4();
                self.payload().tail(usize::from(ip.total_length()))
            }
            _ => DataSegment::empty(),
        }
    }

    pub fn extract_layer(&self) -> EthernetLayer {
        EthernetLayer {
            source: self.source(),
            destination: self.destination(),
            ether_type: Some(self.ether_type()),
        }
    }
}

impl Datagram for EthernetDatagram {
    fn segment(&self) -> &DataSegment {
        &self.segment
    }

    fn validity(&self) -> &OnceCell<bool> {
        &self.validity
    }

    fn calculate_is_valid(&self) -> bool {
        self.segment.len() >= Self::HEADER_LENGTH && self.payload_datagram().is_valid()
    }
}

/// Ethernet II header description.
///
/// A zero destination is replaced by the next layer's default destination
/// (broadcast for ARP). A missing EtherType is taken from the next layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EthernetLayer {
    pub source: MacAddress,
    pub destination: MacAddress,
    pub ether_type: Option<EtherType>,
}

impl EthernetLayer {
    pub fn builder() -> EthernetLayerBuilder {
        EthernetLayerBuilder::default()
    }
}

impl Layer for EthernetLayer {
    fn name(&self) -> &'static str {
        "Ethernet"
    }

    fn length(&self) -> usize {
        EthernetDatagram::HEADER_LENGTH
    }

    fn write(
        &self,
        buffer: &mut [u8],
        offset: &mut usize,
        _payload_length: usize,
        _previous: Option<&dyn Layer>,
        next: Option<&dyn Layer>,
    ) -> Result<(), PacketError> {
        let ether_type = resolve_ether_type(self.ether_type, next, self.name())?;
        let mut destination = self.destination;
        if destination == MacAddress::ZERO {
            if let Some(default) = next
                .and_then(|next| next.as_ethernet_next())
                .and_then(|next| next.previous_layer_default_destination())
            {
                destination = default;
            }
        }

        write_bytes(buffer, offset, destination.as_bytes());
        write_bytes(buffer, offset, self.source.as_bytes());
        write_u16(buffer, offset, ether_type.0, Endianity::Big);
        Ok(())
    }

    fn data_link(&self) -> Option<DataLinkKind> {
        Some(DataLinkKind::Ethernet)
    }

    fn as_arp_previous(&self) -> Option<&dyn ArpPreviousLayer> {
        Some(self)
    }
}

impl ArpPreviousLayer for EthernetLayer {
    fn previous_layer_hardware_type(&self) -> ArpHardwareType {
        ArpHardwareType::ETHERNET
    }
}

/// Builder for constructing Ethernet layers.
#[derive(Debug, Default)]
pub struct EthernetLayerBuilder {
    source: Option<MacAddress>,
    destination: Option<MacAddress>,
    ether_type: Option<EtherType>,
}

impl EthernetLayerBuilder {
    pub fn source(mut self, mac: MacAddress) -> Self {
        self.source = Some(mac);
        self
    }

    /// Sets the destination; leave unset to take the next layer's default.
    pub fn destination(mut self, mac: MacAddress) -> Self {
        self.destination = Some(mac);
        self
    }

    pub fn ether_type(mut self, ether_type: EtherType) -> Self {
        self.ether_type = Some(ether_type);
        self
    }

    /// Builds the layer.
    ///
    /// # Returns
    /// - `Ok(EthernetLayer)` - The constructed layer
    /// - `Err(PacketError)` - If the source address is missing
    pub fn build(self) -> Result<EthernetLayer, PacketError> {
        let source = self
            .source
            .ok_or_else(|| PacketError::InvalidFieldValue("Source MAC not set".to_string()))?;
        Ok(EthernetLayer {
            source,
            destination: self.destination.unwrap_or(MacAddress::ZERO),
            ether_type: self.ether_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::PacketBuilder;
    use crate::layer::PayloadLayer;
    use chrono::Utc;

    #[test]
    fn test_mac_address_text() {
        let mac: MacAddress = "00:01:02:03:04:0a".parse().unwrap();
        assert_eq!(mac, MacAddress::new([0, 1, 2, 3, 4, 10]));
        assert_eq!(mac.to_string(), "00:01:02:03:04:0A");
        assert!("00:01:02".parse::<MacAddress>().is_err());
        assert!("00:01:02:03:04:05:06".parse::<MacAddress>().is_err());
    }

    #[test]
    fn test_ether_type_display() {
        assert_eq!(EtherType::IPV4.to_string(), "IPv4");
        assert_eq!(EtherType(0x1234).to_string(), "0x1234");
    }

    #[test]
    fn test_ethernet_round_trip() {
        let layer = EthernetLayer::builder()
            .source("00:01:02:03:04:05".parse().unwrap())
            .destination("A0:A1:A2:A3:A4:A5".parse().unwrap())
            .ether_type(EtherType(0x1234))
            .build()
            .unwrap();
        let packet = PacketBuilder::build_packet(
            Utc::now(),
            vec![Box::new(layer.clone()), Box::new(PayloadLayer::new(vec![1, 2, 3]))],
        )
        .unwrap();

        let ethernet = packet.ethernet();
        assert!(ethernet.is_valid());
        assert_eq!(ethernet.extract_layer(), layer);
        assert_eq!(ethernet.payload().as_slice(), &[1, 2, 3]);
        assert!(matches!(
            ethernet.payload_datagram(),
            EtherTypePayload::Unknown(EtherType(0x1234), _)
        ));
    }

    #[test]
    fn test_missing_ether_type_without_next_layer_fails() {
        let layer = EthernetLayer::builder()
            .source(MacAddress::new([0, 1, 2, 3, 4, 5]))
            .build()
            .unwrap();
        let result = PacketBuilder::build_packet(
            Utc::now(),
            vec![Box::new(layer), Box::new(PayloadLayer::new(vec![1]))],
        );
        assert!(matches!(result, Err(PacketError::CannotInferField { .. })));
    }

    #[test]
    fn test_builder_requires_source() {
        assert!(EthernetLayer::builder().build().is_err());
    }

    #[test]
    fn test_short_frame_is_invalid() {
        let datagram = EthernetDatagram::new(DataSegment::new(vec![0u8; 13]));
        assert!(!datagram.is_valid());
        assert_eq!(datagram.ether_type(), EtherType(0));
    }
}
