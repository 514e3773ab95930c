//! IEEE 802.1Q VLAN tagged frames.
//!
//! The tag sits between the Ethernet header and the encapsulated payload:
//! a 16-bit tag control field (priority, drop eligibility, VLAN id) followed
//! by the EtherType of what comes next. Tags may be stacked.

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::PacketError;
use crate::arp::ArpHardwareType;
use crate::bytes_ext::{Endianity, write_u16};
use crate::datagram::{DataSegment, Datagram, impl_datagram_eq};
use crate::ethernet::{EtherType, EtherTypePayload};
use crate::layer::{ArpPreviousLayer, EthernetNextLayer, Layer, resolve_ether_type};

mod offset {
    pub const TAG_CONTROL: usize = 0;
    pub const ETHER_TYPE: usize = 2;
}

const PRIORITY_SHIFT: u16 = 13;
const DROP_ELIGIBLE_MASK: u16 = 0x1000;
const VLAN_IDENTIFIER_MASK: u16 = 0x0FFF;

/// A parsed 802.1Q tag and its payload.
#[derive(Debug, Clone)]
pub struct VLanTaggedFrameDatagram {
    segment: DataSegment,
    validity: OnceCell<bool>,
}

impl_datagram_eq!(VLanTaggedFrameDatagram);

impl VLanTaggedFrameDatagram {
    pub const HEADER_LENGTH: usize = 4;

    pub fn new(segment: DataSegment) -> Self {
        Self {
            segment,
            validity: OnceCell::new(),
        }
    }

    fn tag_control(&self) -> u16 {
        self.segment.read_u16(offset::TAG_CONTROL, Endianity::Big)
    }

    /// Priority code point (class of service), 0 to 7.
    pub fn priority(&self) -> u8 {
        (self.tag_control() >> PRIORITY_SHIFT) as u8
    }

    /// Drop eligible indicator (formerly canonical format indicator).
    pub fn drop_eligible(&self) -> bool {
        self.tag_control() & DROP_ELIGIBLE_MASK != 0
    }

    pub fn vlan_identifier(&self) -> u16 {
        self.tag_control() & VLAN_IDENTIFIER_MASK
    }

    pub fn ether_type(&self) -> EtherType {
        EtherType(self.segment.read_u16(offset::ETHER_TYPE, Endianity::Big))
    }

    pub fn payload(&self) -> DataSegment {
        self.segment.tail(Self::HEADER_LENGTH)
    }

    pub fn payload_datagram(&self) -> EtherTypePayload {
        EtherTypePayload::new(self.ether_type(), self.payload())
    }

    pub fn extract_layer(&self) -> VLanTaggedFrameLayer {
        VLanTaggedFrameLayer {
            priority: self.priority(),
            drop_eligible: self.drop_eligible(),
            vlan_identifier: self.vlan_identifier(),
            ether_type: Some(self.ether_type()),
        }
    }
}

impl Datagram for VLanTaggedFrameDatagram {
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

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VLanTaggedFrameLayer {
    pub priority: u8,
    pub drop_eligible: bool,
    pub vlan_identifier: u16,
    pub ether_type: Option<EtherType>,
}

impl VLanTaggedFrameLayer {
    fn tag_control(&self) -> Result<u16, PacketError> {
        if self.priority > 7 {
            return Err(PacketError::InvalidFieldValue(format!(
                "VLAN priority {} exceeds 7",
                self.priority
            )));
        }
        if self.vlan_identifier > VLAN_IDENTIFIER_MASK {
            return Err(PacketError::InvalidFieldValue(format!(
                "VLAN identifier {} exceeds 4095",
                self.vlan_identifier
            )));
        }
        let mut value = (u16::from(self.priority) << PRIORITY_SHIFT) | self.vlan_identifier;
        if self.drop_eligible {
            value |= DROP_ELIGIBLE_MASK;
        }
        Ok(value)
    }
}

impl Layer for VLanTaggedFrameLayer {
    fn name(&self) -> &'static str {
        "VLanTaggedFrame"
    }

    fn length(&self) -> usize {
        VLanTaggedFrameDatagram::HEADER_LENGTH
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
        write_u16(buffer, offset, self.tag_control()?, Endianity::Big);
        write_u16(buffer, offset, ether_type.0, Endianity::Big);
        Ok(())
    }

    fn as_ethernet_next(&self) -> Option<&dyn EthernetNextLayer> {
        Some(self)
    }

    fn as_arp_previous(&self) -> Option<&dyn ArpPreviousLayer> {
        Some(self)
    }
}

impl EthernetNextLayer for VLanTaggedFrameLayer {
    fn previous_layer_ether_type(&self) -> EtherType {
        EtherType::VLAN_TAGGED_FRAME
    }
}

impl ArpPreviousLayer for VLanTaggedFrameLayer {
    fn previous_layer_hardware_type(&self) -> ArpHardwareType {
        ArpHardwareType::ETHERNET
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::PacketBuilder;
    use crate::ethernet::{EthernetLayer, MacAddress};
    use crate::layer::PayloadLayer;
    use chrono::Utc;

    fn ethernet() -> EthernetLayer {
        EthernetLayer {
            source: MacAddress::new([0, 1, 2, 3, 4, 5]),
            destination: MacAddress::new([6, 7, 8, 9, 10, 11]),
            ether_type: None,
        }
    }

    #[test]
    fn test_vlan_round_trip() {
        let vlan = VLanTaggedFrameLayer {
            priority: 5,
            drop_eligible: true,
            vlan_identifier: 0x123,
            ether_type: Some(EtherType(0x9999)),
        };
        let packet = PacketBuilder::build_packet(
            Utc::now(),
            vec![
                Box::new(ethernet()),
                Box::new(vlan.clone()),
                Box::new(PayloadLayer::new(vec![0xAB])),
            ],
        )
        .unwrap();

        let ethernet = packet.ethernet();
        assert_eq!(ethernet.ether_type(), EtherType::VLAN_TAGGED_FRAME);
        let frame = ethernet.vlan_tagged_frame();
        assert!(frame.is_valid());
        assert_eq!(frame.extract_layer(), vlan);
        assert_eq!(frame.payload().as_slice(), &[0xAB]);
        assert!(packet.is_valid());
    }

    #[test]
    fn test_priority_out_of_range() {
        let vlan = VLanTaggedFrameLayer {
            priority: 8,
            ether_type: Some(EtherType::IPV4),
            ..Default::default()
        };
        let result = PacketBuilder::build_packet(Utc::now(), vec![Box::new(ethernet()), Box::new(vlan)]);
        assert!(matches!(result, Err(PacketError::InvalidFieldValue(_))));
    }
}
