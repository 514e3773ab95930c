//! ICMP (Internet Control Message Protocol) implementation.
//!
//! Every message shares a 4-byte type/code/checksum prefix and a 4-byte
//! "rest of header" whose meaning depends on the type. Error messages quote
//! the offending IPv4 header; on the write path the quoted datagram is built
//! from the layers that follow the ICMP layer.

use std::net::Ipv4Addr;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::bytes_ext::{
    Endianity, read_ipv4, read_u16, read_u32, set_u16, write_bytes, write_ipv4, write_u8,
    write_u16, write_u32,
};
use crate::checksum;
use crate::datagram::{DataSegment, Datagram, impl_datagram_eq};
use crate::ip::IpProtocol;
use crate::ipv4::IpV4Datagram;
use crate::layer::{IpNextLayer, Layer};
use crate::{Checksumable, PacketError};

mod offset {
    pub const TYPE: usize = 0;
    pub const CODE: usize = 1;
    pub const CHECKSUM: usize = 2;
    pub const REST_OF_HEADER: usize = 4;
    pub const VARIABLE: usize = 8;
}

/// ICMP message types as defined in RFC 792 and subsequent RFCs.
pub mod message_type {
    pub const ECHO_REPLY: u8 = 0;
    pub const DESTINATION_UNREACHABLE: u8 = 3;
    pub const SOURCE_QUENCH: u8 = 4;
    pub const REDIRECT: u8 = 5;
    pub const ECHO: u8 = 8;
    pub const ROUTER_ADVERTISEMENT: u8 = 9;
    pub const ROUTER_SOLICITATION: u8 = 10;
    pub const TIME_EXCEEDED: u8 = 11;
    pub const PARAMETER_PROBLEM: u8 = 12;
    pub const TIMESTAMP: u8 = 13;
    pub const TIMESTAMP_REPLY: u8 = 14;
    pub const INFORMATION_REQUEST: u8 = 15;
    pub const INFORMATION_REPLY: u8 = 16;
    pub const ADDRESS_MASK_REQUEST: u8 = 17;
    pub const ADDRESS_MASK_REPLY: u8 = 18;
    pub const TRACE_ROUTE: u8 = 30;
    pub const CONVERSION_FAILED: u8 = 31;
    pub const DOMAIN_NAME_REQUEST: u8 = 37;
    pub const SECURITY_FAILURES: u8 = 40;
}

/// ICMP codes for Destination Unreachable messages.
pub mod destination_unreachable_code {
    pub const NET_UNREACHABLE: u8 = 0;
    pub const HOST_UNREACHABLE: u8 = 1;
    pub const PROTOCOL_UNREACHABLE: u8 = 2;
    pub const PORT_UNREACHABLE: u8 = 3;
    pub const FRAGMENTATION_NEEDED: u8 = 4;
    pub const SOURCE_ROUTE_FAILED: u8 = 5;
}

/// Highest code defined for a message type; `None` for unknown types.
fn maximum_code(message_type: u8) -> Option<u8> {
    use message_type::*;
    Some(match message_type {
        DESTINATION_UNREACHABLE => 5,
        REDIRECT => 3,
        TIME_EXCEEDED => 1,
        TRACE_ROUTE => 1,
        CONVERSION_FAILED => 11,
        SECURITY_FAILURES => 5,
        ECHO_REPLY | SOURCE_QUENCH | ECHO | ROUTER_ADVERTISEMENT | ROUTER_SOLICITATION
        | PARAMETER_PROBLEM | TIMESTAMP | TIMESTAMP_REPLY | INFORMATION_REQUEST
        | INFORMATION_REPLY | ADDRESS_MASK_REQUEST | ADDRESS_MASK_REPLY
        | DOMAIN_NAME_REQUEST => 0,
        _ => return None,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IcmpRouterAdvertisementEntry {
    pub router_address: Ipv4Addr,
    pub router_address_preference: i32,
}

/// Type-specific content of an ICMP message.
///
/// Error variants carry no quoted datagram; it is whatever follows the header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IcmpMessage {
    EchoReply {
        identifier: u16,
        sequence_number: u16,
        #[serde(with = "serde_bytes")]
        data: Vec<u8>,
    },
    DestinationUnreachable {
        code: u8,
        next_hop_mtu: u16,
    },
    SourceQuench,
    Redirect {
        code: u8,
        gateway: Ipv4Addr,
    },
    Echo {
        identifier: u16,
        sequence_number: u16,
        #[serde(with = "serde_bytes")]
        data: Vec<u8>,
    },
    RouterAdvertisement {
        lifetime: u16,
        entries: Vec<IcmpRouterAdvertisementEntry>,
    },
    RouterSolicitation,
    TimeExceeded {
        code: u8,
    },
    ParameterProblem {
        pointer: u8,
    },
    Timestamp {
        identifier: u16,
        sequence_number: u16,
        originate_timestamp: u32,
        receive_timestamp: u32,
        transmit_timestamp: u32,
    },
    TimestampReply {
        identifier: u16,
        sequence_number: u16,
        originate_timestamp: u32,
        receive_timestamp: u32,
        transmit_timestamp: u32,
    },
    InformationRequest {
        identifier: u16,
        sequence_number: u16,
    },
    InformationReply {
        identifier: u16,
        sequence_number: u16,
    },
    AddressMaskRequest {
        identifier: u16,
        sequence_number: u16,
        address_mask: Ipv4Addr,
    },
    AddressMaskReply {
        identifier: u16,
        sequence_number: u16,
        address_mask: Ipv4Addr,
    },
    TraceRoute {
        code: u8,
        identification: u16,
        outbound_hop_count: u16,
        return_hop_count: u16,
        output_link_speed: u32,
        output_link_mtu: u32,
    },
    ConversionFailed {
        code: u8,
        pointer: u32,
    },
    DomainNameRequest {
        identifier: u16,
        sequence_number: u16,
    },
    SecurityFailures {
        code: u8,
        pointer: u16,
    },
    Unknown {
        message_type: u8,
        code: u8,
        rest_of_header: u32,
        #[serde(with = "serde_bytes")]
        body: Vec<u8>,
    },
}

fn identified(identifier: u16, sequence_number: u16) -> u32 {
    (u32::from(identifier) << 16) | u32::from(sequence_number)
}

impl IcmpMessage {
    pub fn message_type(&self) -> u8 {
        use message_type::*;
        match self {
            IcmpMessage::EchoReply { .. } => ECHO_REPLY,
            IcmpMessage::DestinationUnreachable { .. } => DESTINATION_UNREACHABLE,
            IcmpMessage::SourceQuench => SOURCE_QUENCH,
            IcmpMessage::Redirect { .. } => REDIRECT,
            IcmpMessage::Echo { .. } => ECHO,
            IcmpMessage::RouterAdvertisement { .. } => ROUTER_ADVERTISEMENT,
            IcmpMessage::RouterSolicitation => ROUTER_SOLICITATION,
            IcmpMessage::TimeExceeded { .. } => TIME_EXCEEDED,
            IcmpMessage::ParameterProblem { .. } => PARAMETER_PROBLEM,
            IcmpMessage::Timestamp { .. } => TIMESTAMP,
            IcmpMessage::TimestampReply { .. } => TIMESTAMP_REPLY,
            IcmpMessage::InformationRequest { .. } => INFORMATION_REQUEST,
            IcmpMessage::InformationReply { .. } => INFORMATION_REPLY,
            IcmpMessage::AddressMaskRequest { .. } => ADDRESS_MASK_REQUEST,
            IcmpMessage::AddressMaskReply { .. } => ADDRESS_MASK_REPLY,
            IcmpMessage::TraceRoute { .. } => TRACE_ROUTE,
            IcmpMessage::ConversionFailed { .. } => CONVERSION_FAILED,
            IcmpMessage::DomainNameRequest { .. } => DOMAIN_NAME_REQUEST,
            IcmpMessage::SecurityFailures { .. } => SECURITY_FAILURES,
            IcmpMessage::Unknown { message_type, .. } => *message_type,
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            IcmpMessage::DestinationUnreachable { code, .. }
            | IcmpMessage::Redirect { code, .. }
            | IcmpMessage::TimeExceeded { code }
            | IcmpMessage::TraceRoute { code, .. }
            | IcmpMessage::ConversionFailed { code, .. }
            | IcmpMessage::SecurityFailures { code, .. }
            | IcmpMessage::Unknown { code, .. } => *code,
            _ => 0,
        }
    }

    /// Whether the body is a quoted IPv4 datagram.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            IcmpMessage::DestinationUnreachable { .. }
                | IcmpMessage::SourceQuench
                | IcmpMessage::Redirect { .. }
                | IcmpMessage::TimeExceeded { .. }
                | IcmpMessage::ParameterProblem { .. }
                | IcmpMessage::ConversionFailed { .. }
                | IcmpMessage::SecurityFailures { .. }
        )
    }

    fn rest_of_header(&self) -> u32 {
        match self {
            IcmpMessage::EchoReply {
                identifier,
                sequence_number,
                ..
            }
            | IcmpMessage::Echo {
                identifier,
                sequence_number,
                ..
            }
            | IcmpMessage::Timestamp {
                identifier,
                sequence_number,
                ..
            }
            | IcmpMessage::TimestampReply {
                identifier,
                sequence_number,
                ..
            }
            | IcmpMessage::InformationRequest {
                identifier,
                sequence_number,
            }
            | IcmpMessage::InformationReply {
                identifier,
                sequence_number,
            }
            | IcmpMessage::AddressMaskRequest {
                identifier,
                sequence_number,
                ..
            }
            | IcmpMessage::AddressMaskReply {
                identifier,
                sequence_number,
                ..
            }
            | IcmpMessage::DomainNameRequest {
                identifier,
                sequence_number,
            } => identified(*identifier, *sequence_number),
            IcmpMessage::DestinationUnreachable { next_hop_mtu, .. } => u32::from(*next_hop_mtu),
            IcmpMessage::Redirect { gateway, .. } => u32::from(*gateway),
            IcmpMessage::RouterAdvertisement { lifetime, entries } => {
                // Address entry size is always 2 words.
                ((entries.len() as u32) << 24) | (2 << 16) | u32::from(*lifetime)
            }
            IcmpMessage::ParameterProblem { pointer } => u32::from(*pointer) << 24,
            IcmpMessage::TraceRoute { identification, .. } => u32::from(*identification) << 16,
            IcmpMessage::ConversionFailed { pointer, .. } => *pointer,
            IcmpMessage::SecurityFailures { pointer, .. } => u32::from(*pointer),
            IcmpMessage::Unknown { rest_of_header, .. } => *rest_of_header,
            IcmpMessage::SourceQuench
            | IcmpMessage::RouterSolicitation
            | IcmpMessage::TimeExceeded { .. } => 0,
        }
    }

    /// Bytes this message writes after the 8-byte header.
    pub fn body_length(&self) -> usize {
        match self {
            IcmpMessage::EchoReply { data, .. } | IcmpMessage::Echo { data, .. } => data.len(),
            IcmpMessage::RouterAdvertisement { entries, .. } => entries.len() * 8,
            IcmpMessage::Timestamp { .. } | IcmpMessage::TimestampReply { .. } => 12,
            IcmpMessage::AddressMaskRequest { .. } | IcmpMessage::AddressMaskReply { .. } => 4,
            IcmpMessage::TraceRoute { .. } => 12,
            IcmpMessage::Unknown { body, .. } => body.len(),
            _ => 0,
        }
    }

    fn write_body(&self, buffer: &mut [u8], offset: &mut usize) {
        match self {
            IcmpMessage::EchoReply { data, .. } | IcmpMessage::Echo { data, .. } => {
                write_bytes(buffer, offset, data)
            }
            IcmpMessage::RouterAdvertisement { entries, .. } => {
                for entry in entries {
                    write_ipv4(buffer, offset, entry.router_address);
                    write_u32(
                        buffer,
                        offset,
                        entry.router_address_preference as u32,
                        Endianity::Big,
                    );
                }
            }
            IcmpMessage::Timestamp {
                originate_timestamp,
                receive_timestamp,
                transmit_timestamp,
                ..
            }
            | IcmpMessage::TimestampReply {
                originate_timestamp,
                receive_timestamp,
                transmit_timestamp,
                ..
            } => {
                write_u32(buffer, offset, *originate_timestamp, Endianity::Big);
                write_u32(buffer, offset, *receive_timestamp, Endianity::Big);
                write_u32(buffer, offset, *transmit_timestamp, Endianity::Big);
            }
            IcmpMessage::AddressMaskRequest { address_mask, .. }
            | IcmpMessage::AddressMaskReply { address_mask, .. } => {
                write_ipv4(buffer, offset, *address_mask)
            }
            IcmpMessage::TraceRoute {
                outbound_hop_count,
                return_hop_count,
                output_link_speed,
                output_link_mtu,
                ..
            } => {
                write_u16(buffer, offset, *outbound_hop_count, Endianity::Big);
                write_u16(buffer, offset, *return_hop_count, Endianity::Big);
                write_u32(buffer, offset, *output_link_speed, Endianity::Big);
                write_u32(buffer, offset, *output_link_mtu, Endianity::Big);
            }
            IcmpMessage::Unknown { body, .. } => write_bytes(buffer, offset, body),
            _ => {}
        }
    }

    /// Decodes a message from its type, code, rest of header and body.
    ///
    /// Fields beyond a short body read as zero.
    pub fn parse(message_type: u8, code: u8, rest: u32, body: &[u8]) -> IcmpMessage {
        use message_type::*;
        let identifier = (rest >> 16) as u16;
        let sequence_number = rest as u16;
        match message_type {
            ECHO_REPLY => IcmpMessage::EchoReply {
                identifier,
                sequence_number,
                data: body.to_vec(),
            },
            ECHO => IcmpMessage::Echo {
                identifier,
                sequence_number,
                data: body.to_vec(),
            },
            DESTINATION_UNREACHABLE => IcmpMessage::DestinationUnreachable {
                code,
                next_hop_mtu: rest as u16,
            },
            SOURCE_QUENCH => IcmpMessage::SourceQuench,
            REDIRECT => IcmpMessage::Redirect {
                code,
                gateway: Ipv4Addr::from(rest),
            },
            ROUTER_ADVERTISEMENT => {
                let count = (rest >> 24) as usize;
                let entries = body
                    .chunks_exact(8)
                    .take(count)
                    .map(|chunk| IcmpRouterAdvertisementEntry {
                        router_address: read_ipv4(chunk, 0),
                        router_address_preference: read_u32(chunk, 4, Endianity::Big) as i32,
                    })
                    .collect();
                IcmpMessage::RouterAdvertisement {
                    lifetime: rest as u16,
                    entries,
                }
            }
            ROUTER_SOLICITATION => IcmpMessage::RouterSolicitation,
            TIME_EXCEEDED => IcmpMessage::TimeExceeded { code },
            PARAMETER_PROBLEM => IcmpMessage::ParameterProblem {
                pointer: (rest >> 24) as u8,
            },
            TIMESTAMP | TIMESTAMP_REPLY => {
                let originate_timestamp = read_u32(body, 0, Endianity::Big);
                let receive_timestamp = read_u32(body, 4, Endianity::Big);
                let transmit_timestamp = read_u32(body, 8, Endianity::Big);
                if message_type == TIMESTAMP {
                    IcmpMessage::Timestamp {
                        identifier,
                        sequence_number,
                        originate_timestamp,
                        receive_timestamp,
                        transmit_timestamp,
                    }
                } else {
                    IcmpMessage::TimestampReply {
                        identifier,
                        sequence_number,
                        originate_timestamp,
                        receive_timestamp,
                        transmit_timestamp,
                    }
                }
            }
            INFORMATION_REQUEST => IcmpMessage::InformationRequest {
                identifier,
                sequence_number,
            },
            INFORMATION_REPLY => IcmpMessage::InformationReply {
                identifier,
                sequence_number,
            },
            ADDRESS_MASK_REQUEST => IcmpMessage::AddressMaskRequest {
                identifier,
                sequence_number,
                address_mask: read_ipv4(body, 0),
            },
            ADDRESS_MASK_REPLY => IcmpMessage::AddressMaskReply {
                identifier,
                sequence_number,
                address_mask: read_ipv4(body, 0),
            },
            TRACE_ROUTE => IcmpMessage::TraceRoute {
                code,
                identification: identifier,
                outbound_hop_count: read_u16(body, 0, Endianity::Big),
                return_hop_count: read_u16(body, 2, Endianity::Big),
                output_link_speed: read_u32(body, 4, Endianity::Big),
                output_link_mtu: read_u32(body, 8, Endianity::Big),
            },
            CONVERSION_FAILED => IcmpMessage::ConversionFailed {
                code,
                pointer: rest,
            },
            DOMAIN_NAME_REQUEST => IcmpMessage::DomainNameRequest {
                identifier,
                sequence_number,
            },
            SECURITY_FAILURES => IcmpMessage::SecurityFailures {
                code,
                pointer: rest as u16,
            },
            _ => IcmpMessage::Unknown {
                message_type,
                code,
                rest_of_header: rest,
                body: body.to_vec(),
            },
        }
    }
}

/// A parsed ICMP message.
#[derive(Debug, Clone)]
pub struct IcmpDatagram {
    segment: DataSegment,
    validity: OnceCell<bool>,
}

impl_datagram_eq!(IcmpDatagram);

impl IcmpDatagram {
    pub const HEADER_LENGTH: usize = 8;

    pub fn new(segment: DataSegment) -> Self {
        Self {
            segment,
            validity: OnceCell::new(),
        }
    }

    #[inline]
    pub fn message_type(&self) -> u8 {
        self.segment.read_u8(offset::TYPE)
    }

    #[inline]
    pub fn code(&self) -> u8 {
        self.segment.read_u8(offset::CODE)
    }

    /// Type and code as one word, type in the high byte.
    pub fn message_type_and_code(&self) -> u16 {
        self.segment.read_u16(offset::TYPE, Endianity::Big)
    }

    #[inline]
    pub fn checksum_field(&self) -> u16 {
        self.segment.read_u16(offset::CHECKSUM, Endianity::Big)
    }

    pub fn rest_of_header(&self) -> u32 {
        self.segment.read_u32(offset::REST_OF_HEADER, Endianity::Big)
    }

    /// Everything after the 8-byte header.
    pub fn payload(&self) -> DataSegment {
        self.segment.tail(offset::VARIABLE)
    }

    pub fn message(&self) -> IcmpMessage {
        IcmpMessage::parse(
            self.message_type(),
            self.code(),
            self.rest_of_header(),
            self.payload().as_slice(),
        )
    }

    /// The IPv4 datagram quoted by an error message.
    pub fn ip_v4(&self) -> IpV4Datagram {
        IpV4Datagram::new(self.payload())
    }

    pub fn extract_layer(&self) -> IcmpLayer {
        IcmpLayer {
            message: self.message(),
            checksum: Some(self.checksum_field()),
        }
    }

    fn is_body_valid(&self) -> bool {
        use message_type::*;
        let body_length = self.payload().len();
        match self.message_type() {
            TIMESTAMP | TIMESTAMP_REPLY | TRACE_ROUTE => body_length == 12,
            ADDRESS_MASK_REQUEST | ADDRESS_MASK_REPLY => body_length == 4,
            INFORMATION_REQUEST | INFORMATION_REPLY | ROUTER_SOLICITATION
            | DOMAIN_NAME_REQUEST => body_length == 0,
            ROUTER_ADVERTISEMENT => {
                let rest = self.rest_of_header();
                let count = (rest >> 24) as usize;
                let entry_size = ((rest >> 16) & 0xFF) as usize;
                entry_size == 2 && body_length == count * 8
            }
            _ => true,
        }
    }
}

impl Checksumable for IcmpDatagram {
    fn checksum(&self) -> u16 {
        self.checksum_field()
    }

    fn calculate_checksum(&self) -> u16 {
        checksum::checksum_excluding(self.segment.as_slice(), offset::CHECKSUM)
    }
}

impl Datagram for IcmpDatagram {
    fn segment(&self) -> &DataSegment {
        &self.segment
    }

    fn validity(&self) -> &OnceCell<bool> {
        &self.validity
    }

    fn calculate_is_valid(&self) -> bool {
        if self.segment.len() < Self::HEADER_LENGTH || !self.is_checksum_correct() {
            return false;
        }
        if let Some(maximum) = maximum_code(self.message_type()) {
            if self.code() > maximum {
                return false;
            }
        }
        self.is_body_valid()
    }
}

/// ICMP header description.
///
/// `checksum: None` computes the checksum over the header and everything after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IcmpLayer {
    pub message: IcmpMessage,
    pub checksum: Option<u16>,
}

impl IcmpLayer {
    pub fn new(message: IcmpMessage) -> Self {
        Self {
            message,
            checksum: None,
        }
    }

    /// Creates a new Echo Request.
    pub fn echo_request(identifier: u16, sequence_number: u16, data: Vec<u8>) -> Self {
        Self::new(IcmpMessage::Echo {
            identifier,
            sequence_number,
            data,
        })
    }

    /// Creates a new Echo Reply.
    pub fn echo_reply(identifier: u16, sequence_number: u16, data: Vec<u8>) -> Self {
        Self::new(IcmpMessage::EchoReply {
            identifier,
            sequence_number,
            data,
        })
    }
}

impl Layer for IcmpLayer {
    fn name(&self) -> &'static str {
        "ICMP"
    }

    fn length(&self) -> usize {
        IcmpDatagram::HEADER_LENGTH + self.message.body_length()
    }

    fn write(
        &self,
        buffer: &mut [u8],
        offset: &mut usize,
        _payload_length: usize,
        _previous: Option<&dyn Layer>,
        _next: Option<&dyn Layer>,
    ) -> Result<(), PacketError> {
        if let IcmpMessage::RouterAdvertisement { entries, .. } = &self.message {
            if entries.len() > usize::from(u8::MAX) {
                return Err(PacketError::InvalidFieldValue(format!(
                    "{} router advertisement entries do not fit in one message",
                    entries.len()
                )));
            }
        }
        write_u8(buffer, offset, self.message.message_type());
        write_u8(buffer, offset, self.message.code());
        write_u16(buffer, offset, self.checksum.unwrap_or(0), Endianity::Big);
        write_u32(buffer, offset, self.message.rest_of_header(), Endianity::Big);
        self.message.write_body(buffer, offset);
        Ok(())
    }

    fn finalize(
        &self,
        buffer: &mut [u8],
        offset: usize,
        payload_length: usize,
        _next: Option<&dyn Layer>,
    ) -> Result<(), PacketError> {
        if self.checksum.is_none() {
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

impl IpNextLayer for IcmpLayer {
    fn previous_layer_protocol(&self) -> IpProtocol {
        IpProtocol::ICMP
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::PacketBuilder;
    use crate::ipv4::IpV4Layer;
    use crate::layer::PayloadLayer;
    use chrono::Utc;

    fn ip() -> IpV4Layer {
        IpV4Layer {
            source: Ipv4Addr::new(192, 168, 0, 1),
            destination: Ipv4Addr::new(192, 168, 0, 2),
            ..Default::default()
        }
    }

    fn build(layers: Vec<Box<dyn Layer>>) -> IcmpDatagram {
        let packet = PacketBuilder::build_packet(Utc::now(), layers).unwrap();
        assert!(packet.is_valid());
        packet.ip_v4().icmp()
    }

    #[test]
    fn test_icmp_echo_request() {
        let layer = IcmpLayer::echo_request(1, 1, b"Hello, World!".to_vec());
        let icmp = build(vec![Box::new(ip()), Box::new(layer.clone())]);

        assert_eq!(icmp.message_type(), message_type::ECHO);
        assert_eq!(icmp.code(), 0);
        assert!(icmp.is_checksum_correct());
        let mut extracted = icmp.extract_layer();
        extracted.checksum = None;
        assert_eq!(extracted, layer);
    }

    #[test]
    fn test_messages_round_trip() {
        let messages = vec![
            IcmpMessage::Timestamp {
                identifier: 7,
                sequence_number: 8,
                originate_timestamp: 1,
                receive_timestamp: 2,
                transmit_timestamp: 3,
            },
            IcmpMessage::AddressMaskReply {
                identifier: 1,
                sequence_number: 2,
                address_mask: Ipv4Addr::new(255, 255, 255, 0),
            },
            IcmpMessage::RouterAdvertisement {
                lifetime: 1800,
                entries: vec![IcmpRouterAdvertisementEntry {
                    router_address: Ipv4Addr::new(10, 0, 0, 254),
                    router_address_preference: -1,
                }],
            },
            IcmpMessage::TraceRoute {
                code: 1,
                identification: 3,
                outbound_hop_count: 4,
                return_hop_count: 0xFFFF,
                output_link_speed: 100_000,
                output_link_mtu: 1500,
            },
            IcmpMessage::InformationRequest {
                identifier: 5,
                sequence_number: 6,
            },
            IcmpMessage::Unknown {
                message_type: 200,
                code: 9,
                rest_of_header: 0x01020304,
                body: vec![5, 6],
            },
        ];
        for message in messages {
            let icmp = build(vec![Box::new(ip()), Box::new(IcmpLayer::new(message.clone()))]);
            assert_eq!(icmp.message(), message);
        }
    }

    #[test]
    fn test_error_quotes_ipv4_datagram() {
        let quoted = IpV4Layer {
            source: Ipv4Addr::new(192, 168, 0, 2),
            destination: Ipv4Addr::new(8, 8, 8, 8),
            protocol: Some(IpProtocol::UDP),
            ..Default::default()
        };
        let icmp = build(vec![
            Box::new(ip()),
            Box::new(IcmpLayer::new(IcmpMessage::DestinationUnreachable {
                code: destination_unreachable_code::FRAGMENTATION_NEEDED,
                next_hop_mtu: 1400,
            })),
            Box::new(quoted),
            Box::new(PayloadLayer::new(vec![0; 8])),
        ]);
        assert!(icmp.message().is_error());
        assert_eq!(
            icmp.message(),
            IcmpMessage::DestinationUnreachable {
                code: 4,
                next_hop_mtu: 1400
            }
        );
        assert_eq!(icmp.ip_v4().destination(), Ipv4Addr::new(8, 8, 8, 8));
        assert_eq!(icmp.ip_v4().protocol(), IpProtocol::UDP);
    }

    #[test]
    fn test_checksum_flip_detected() {
        let packet = PacketBuilder::build_packet(
            Utc::now(),
            vec![Box::new(ip()), Box::new(IcmpLayer::echo_reply(1, 2, vec![1, 2, 3]))],
        )
        .unwrap();
        let mut bytes = packet.as_bytes().to_vec();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x40;
        let icmp = IpV4Datagram::new(DataSegment::new(bytes)).icmp();
        assert!(!icmp.is_checksum_correct());
        assert!(!icmp.is_valid());
    }

    #[test]
    fn test_bad_code_is_invalid() {
        let layer = IcmpLayer::new(IcmpMessage::TimeExceeded { code: 2 });
        let packet =
            PacketBuilder::build_packet(Utc::now(), vec![Box::new(ip()), Box::new(layer)]).unwrap();
        assert!(packet.ip_v4().icmp().is_checksum_correct());
        assert!(!packet.ip_v4().icmp().is_valid());
    }
}
