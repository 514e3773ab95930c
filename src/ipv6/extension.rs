//! The IPv6 extension header chain.
//!
//! Headers are stored without their next-header byte: on the wire each one
//! names the protocol of the header after it, which the chain derives from
//! its neighbours when writing and consumes when parsing.

use std::net::Ipv6Addr;

use log::trace;
use serde::{Deserialize, Serialize};

use crate::PacketError;
use crate::bytes_ext::{
    Endianity, read_ipv6, read_u16, read_u32, write_bytes, write_ipv6, write_u8, write_u16,
    write_u32,
};
use crate::ip::IpProtocol;

use super::mobility::IpV6MobilityHeader;
use super::options::IpV6Options;

/// Routing header data, by routing type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IpV6RoutingData {
    /// Type 0: a list of addresses to visit.
    SourceRoute(Vec<Ipv6Addr>),
    /// Type 2: the home address of a mobile node.
    HomeAddress(Ipv6Addr),
    Unknown {
        routing_type: u8,
        #[serde(with = "serde_bytes")]
        data: Vec<u8>,
    },
}

impl IpV6RoutingData {
    pub fn routing_type(&self) -> u8 {
        match self {
            IpV6RoutingData::SourceRoute(_) => 0,
            IpV6RoutingData::HomeAddress(_) => 2,
            IpV6RoutingData::Unknown { routing_type, .. } => *routing_type,
        }
    }

    /// Length of the type-specific data that follows the segments-left byte.
    fn length(&self) -> usize {
        match self {
            IpV6RoutingData::SourceRoute(addresses) => 4 + 16 * addresses.len(),
            IpV6RoutingData::HomeAddress(_) => 4 + 16,
            IpV6RoutingData::Unknown { data, .. } => data.len(),
        }
    }

    fn parse(routing_type: u8, data: &[u8]) -> Option<Self> {
        match routing_type {
            0 => {
                let addresses = data.get(4..)?;
                if addresses.len() % 16 != 0 {
                    return None;
                }
                Some(IpV6RoutingData::SourceRoute(
                    addresses.chunks_exact(16).map(|a| read_ipv6(a, 0)).collect(),
                ))
            }
            2 => (data.len() == 20).then(|| IpV6RoutingData::HomeAddress(read_ipv6(data, 4))),
            _ => Some(IpV6RoutingData::Unknown {
                routing_type,
                data: data.to_vec(),
            }),
        }
    }

    fn write(&self, buffer: &mut [u8], offset: &mut usize) {
        match self {
            IpV6RoutingData::SourceRoute(addresses) => {
                write_u32(buffer, offset, 0, Endianity::Big);
                for address in addresses {
                    write_ipv6(buffer, offset, *address);
                }
            }
            IpV6RoutingData::HomeAddress(address) => {
                write_u32(buffer, offset, 0, Endianity::Big);
                write_ipv6(buffer, offset, *address);
            }
            IpV6RoutingData::Unknown { data, .. } => write_bytes(buffer, offset, data),
        }
    }
}

/// One extension header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IpV6ExtensionHeader {
    HopByHopOptions(IpV6Options),
    DestinationOptions(IpV6Options),
    Routing {
        segments_left: u8,
        data: IpV6RoutingData,
    },
    Fragment {
        /// Offset in 8-byte units.
        fragment_offset: u16,
        more_fragments: bool,
        identification: u32,
    },
    Authentication {
        security_parameters_index: u32,
        sequence_number: u32,
        #[serde(with = "serde_bytes")]
        authentication_data: Vec<u8>,
    },
    /// Ends the chain: everything after the sequence number is encrypted.
    EncapsulatingSecurityPayload {
        security_parameters_index: u32,
        sequence_number: u32,
        #[serde(with = "serde_bytes")]
        encrypted_data: Vec<u8>,
    },
    Mobility(IpV6MobilityHeader),
}

impl IpV6ExtensionHeader {
    /// The protocol number announcing this header.
    pub fn protocol(&self) -> IpProtocol {
        match self {
            IpV6ExtensionHeader::HopByHopOptions(_) => IpProtocol::IPV6_HOP_BY_HOP_OPTION,
            IpV6ExtensionHeader::DestinationOptions(_) => IpProtocol::IPV6_DESTINATION_OPTIONS,
            IpV6ExtensionHeader::Routing { .. } => IpProtocol::IPV6_ROUTE,
            IpV6ExtensionHeader::Fragment { .. } => IpProtocol::IPV6_FRAGMENT,
            IpV6ExtensionHeader::Authentication { .. } => IpProtocol::AUTHENTICATION_HEADER,
            IpV6ExtensionHeader::EncapsulatingSecurityPayload { .. } => {
                IpProtocol::ENCAPSULATING_SECURITY_PAYLOAD
            }
            IpV6ExtensionHeader::Mobility(_) => IpProtocol::MOBILITY_HEADER,
        }
    }

    /// Whether `protocol` announces an extension header.
    pub fn is_extension_header(protocol: IpProtocol) -> bool {
        matches!(
            protocol,
            IpProtocol::IPV6_HOP_BY_HOP_OPTION
                | IpProtocol::IPV6_DESTINATION_OPTIONS
                | IpProtocol::IPV6_ROUTE
                | IpProtocol::IPV6_FRAGMENT
                | IpProtocol::AUTHENTICATION_HEADER
                | IpProtocol::ENCAPSULATING_SECURITY_PAYLOAD
                | IpProtocol::MOBILITY_HEADER
        )
    }

    pub fn length(&self) -> usize {
        match self {
            IpV6ExtensionHeader::HopByHopOptions(options)
            | IpV6ExtensionHeader::DestinationOptions(options) => 2 + options.bytes_length(),
            IpV6ExtensionHeader::Routing { data, .. } => 4 + data.length(),
            IpV6ExtensionHeader::Fragment { .. } => 8,
            IpV6ExtensionHeader::Authentication {
                authentication_data,
                ..
            } => 12 + authentication_data.len(),
            IpV6ExtensionHeader::EncapsulatingSecurityPayload { encrypted_data, .. } => {
                8 + encrypted_data.len()
            }
            IpV6ExtensionHeader::Mobility(header) => header.length(),
        }
    }

    /// Value of the header length byte.
    fn length_field(&self) -> Result<u8, PacketError> {
        let length = self.length();
        let (unit, bias) = match self {
            // Authentication headers count 4-byte words, minus 2.
            IpV6ExtensionHeader::Authentication { .. } => (4, 2),
            _ => (8, 1),
        };
        if length % unit != 0 {
            return Err(PacketError::InvalidFieldValue(format!(
                "IPv6 extension header {} is {length} bytes, not a multiple of {unit}",
                self.protocol()
            )));
        }
        u8::try_from(length / unit - bias).map_err(|_| PacketError::InvalidLength)
    }

    fn write(
        &self,
        buffer: &mut [u8],
        offset: &mut usize,
        next_header: IpProtocol,
    ) -> Result<(), PacketError> {
        if let IpV6ExtensionHeader::EncapsulatingSecurityPayload {
            security_parameters_index,
            sequence_number,
            encrypted_data,
        } = self
        {
            write_u32(buffer, offset, *security_parameters_index, Endianity::Big);
            write_u32(buffer, offset, *sequence_number, Endianity::Big);
            write_bytes(buffer, offset, encrypted_data);
            return Ok(());
        }

        let length_field = match self {
            IpV6ExtensionHeader::Fragment { .. } => 0,
            _ => self.length_field()?,
        };
        write_u8(buffer, offset, next_header.0);
        write_u8(buffer, offset, length_field);
        match self {
            IpV6ExtensionHeader::HopByHopOptions(options)
            | IpV6ExtensionHeader::DestinationOptions(options) => options.write(buffer, offset),
            IpV6ExtensionHeader::Routing {
                segments_left,
                data,
            } => {
                write_u8(buffer, offset, data.routing_type());
                write_u8(buffer, offset, *segments_left);
                data.write(buffer, offset);
            }
            IpV6ExtensionHeader::Fragment {
                fragment_offset,
                more_fragments,
                identification,
            } => {
                if *fragment_offset > 0x1FFF {
                    return Err(PacketError::InvalidFieldValue(format!(
                        "IPv6 fragment offset {fragment_offset} exceeds 13 bits"
                    )));
                }
                let word = (fragment_offset << 3) | u16::from(*more_fragments);
                write_u16(buffer, offset, word, Endianity::Big);
                write_u32(buffer, offset, *identification, Endianity::Big);
            }
            IpV6ExtensionHeader::Authentication {
                security_parameters_index,
                sequence_number,
                authentication_data,
            } => {
                write_u16(buffer, offset, 0, Endianity::Big);
                write_u32(buffer, offset, *security_parameters_index, Endianity::Big);
                write_u32(buffer, offset, *sequence_number, Endianity::Big);
                write_bytes(buffer, offset, authentication_data);
            }
            IpV6ExtensionHeader::Mobility(header) => header.write_body(buffer, offset),
            IpV6ExtensionHeader::EncapsulatingSecurityPayload { .. } => {}
        }
        Ok(())
    }

    /// Parses one header announced by `protocol`.
    ///
    /// Returns the header, the protocol following it, and its length.
    fn parse(protocol: IpProtocol, bytes: &[u8]) -> Option<(Self, IpProtocol, usize)> {
        if protocol == IpProtocol::ENCAPSULATING_SECURITY_PAYLOAD {
            if bytes.len() < 8 {
                return None;
            }
            let header = IpV6ExtensionHeader::EncapsulatingSecurityPayload {
                security_parameters_index: read_u32(bytes, 0, Endianity::Big),
                sequence_number: read_u32(bytes, 4, Endianity::Big),
                encrypted_data: bytes[8..].to_vec(),
            };
            return Some((header, IpProtocol::IPV6_NO_NEXT_HEADER, bytes.len()));
        }

        if bytes.len() < 8 {
            return None;
        }
        let next_header = IpProtocol(bytes[0]);
        let length_field = usize::from(bytes[1]);
        let length = match protocol {
            IpProtocol::AUTHENTICATION_HEADER => (length_field + 2) * 4,
            IpProtocol::IPV6_FRAGMENT => 8,
            _ => (length_field + 1) * 8,
        };
        let header_bytes = bytes.get(..length)?;

        let header = match protocol {
            IpProtocol::IPV6_HOP_BY_HOP_OPTION => {
                IpV6ExtensionHeader::HopByHopOptions(IpV6Options::parse(&header_bytes[2..]))
            }
            IpProtocol::IPV6_DESTINATION_OPTIONS => {
                IpV6ExtensionHeader::DestinationOptions(IpV6Options::parse(&header_bytes[2..]))
            }
            IpProtocol::IPV6_ROUTE => IpV6ExtensionHeader::Routing {
                segments_left: header_bytes[3],
                data: IpV6RoutingData::parse(header_bytes[2], &header_bytes[4..])?,
            },
            IpProtocol::IPV6_FRAGMENT => {
                let word = read_u16(header_bytes, 2, Endianity::Big);
                IpV6ExtensionHeader::Fragment {
                    fragment_offset: word >> 3,
                    more_fragments: word & 0x0001 != 0,
                    identification: read_u32(header_bytes, 4, Endianity::Big),
                }
            }
            IpProtocol::AUTHENTICATION_HEADER => {
                if length < 12 {
                    return None;
                }
                IpV6ExtensionHeader::Authentication {
                    security_parameters_index: read_u32(header_bytes, 4, Endianity::Big),
                    sequence_number: read_u32(header_bytes, 8, Endianity::Big),
                    authentication_data: header_bytes[12..].to_vec(),
                }
            }
            IpProtocol::MOBILITY_HEADER => {
                IpV6ExtensionHeader::Mobility(IpV6MobilityHeader::parse(header_bytes))
            }
            _ => return None,
        };
        Some((header, next_header, length))
    }

    fn is_valid(&self) -> bool {
        match self {
            IpV6ExtensionHeader::HopByHopOptions(options)
            | IpV6ExtensionHeader::DestinationOptions(options) => options.is_valid(),
            IpV6ExtensionHeader::Mobility(header) => header.are_options_valid(),
            _ => true,
        }
    }
}

/// An ordered extension header chain and the protocol that follows it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IpV6ExtensionHeaders {
    headers: Vec<IpV6ExtensionHeader>,
    #[serde(skip)]
    next_header: Option<IpProtocol>,
    #[serde(skip)]
    parsed_length: usize,
    #[serde(skip, default = "default_valid")]
    is_valid: bool,
}

fn default_valid() -> bool {
    true
}

impl From<Vec<IpV6ExtensionHeader>> for IpV6ExtensionHeaders {
    fn from(headers: Vec<IpV6ExtensionHeader>) -> Self {
        Self::new(headers)
    }
}

impl IpV6ExtensionHeaders {
    pub fn new(headers: Vec<IpV6ExtensionHeader>) -> Self {
        Self {
            headers,
            next_header: None,
            parsed_length: 0,
            is_valid: true,
        }
    }

    pub fn headers(&self) -> &[IpV6ExtensionHeader] {
        &self.headers
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Protocol of the first header, if any.
    pub fn first_protocol(&self) -> Option<IpProtocol> {
        self.headers.first().map(IpV6ExtensionHeader::protocol)
    }

    /// For a parsed chain, the protocol after the last header.
    pub fn next_header(&self) -> Option<IpProtocol> {
        self.next_header
    }

    /// False when the chain stopped on a truncated or malformed header.
    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    pub fn bytes_length(&self) -> usize {
        self.headers.iter().map(IpV6ExtensionHeader::length).sum()
    }

    /// Bytes the parsed chain occupied.
    pub(crate) fn parsed_length(&self) -> usize {
        self.parsed_length
    }

    pub fn mobility(&self) -> Option<&IpV6MobilityHeader> {
        self.headers.iter().find_map(|header| match header {
            IpV6ExtensionHeader::Mobility(mobility) => Some(mobility),
            _ => None,
        })
    }

    /// Whether the chain contains a fragment header other than a lone complete fragment.
    pub fn is_fragmented(&self) -> bool {
        self.headers.iter().any(|header| {
            matches!(header, IpV6ExtensionHeader::Fragment { fragment_offset, more_fragments, .. }
                if *fragment_offset != 0 || *more_fragments)
        })
    }

    /// Writes the chain; the last header announces `next_header`.
    pub(crate) fn write(
        &self,
        buffer: &mut [u8],
        offset: &mut usize,
        next_header: IpProtocol,
    ) -> Result<(), PacketError> {
        for (index, header) in self.headers.iter().enumerate() {
            let following = self
                .headers
                .get(index + 1)
                .map_or(next_header, IpV6ExtensionHeader::protocol);
            header.write(buffer, offset, following)?;
        }
        Ok(())
    }

    /// Walks the chain starting at `first`, the fixed header's next-header value.
    pub fn parse(first: IpProtocol, bytes: &[u8]) -> Self {
        let mut headers = Vec::new();
        let mut protocol = first;
        let mut position = 0;
        let mut is_valid = true;

        while IpV6ExtensionHeader::is_extension_header(protocol) {
            let Some((header, next, length)) =
                IpV6ExtensionHeader::parse(protocol, &bytes[position.min(bytes.len())..])
            else {
                trace!("IPv6 extension header {protocol} malformed at byte {position}");
                is_valid = false;
                break;
            };
            is_valid &= header.is_valid();
            let terminal = matches!(header, IpV6ExtensionHeader::EncapsulatingSecurityPayload { .. });
            headers.push(header);
            position += length;
            protocol = next;
            if terminal {
                break;
            }
        }

        Self {
            headers,
            next_header: Some(protocol),
            parsed_length: position,
            is_valid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipv6::options::IpV6Option;

    fn write_chain(chain: &IpV6ExtensionHeaders, next: IpProtocol) -> Vec<u8> {
        let mut buffer = vec![0u8; chain.bytes_length()];
        let mut offset = 0;
        chain.write(&mut buffer, &mut offset, next).unwrap();
        assert_eq!(offset, buffer.len());
        buffer
    }

    #[test]
    fn test_chain_round_trip() {
        let chain = IpV6ExtensionHeaders::new(vec![
            IpV6ExtensionHeader::HopByHopOptions(IpV6Options::new(vec![IpV6Option::RouterAlert(0)])),
            IpV6ExtensionHeader::Routing {
                segments_left: 1,
                data: IpV6RoutingData::SourceRoute(vec!["2001:db8::2".parse().unwrap()]),
            },
            IpV6ExtensionHeader::Fragment {
                fragment_offset: 0,
                more_fragments: false,
                identification: 0xDEADBEEF,
            },
            IpV6ExtensionHeader::Authentication {
                security_parameters_index: 0x100,
                sequence_number: 1,
                authentication_data: vec![0xAA; 12],
            },
        ]);
        let bytes = write_chain(&chain, IpProtocol::UDP);
        // AH is 24 bytes: (4 + 2) * 4.
        assert_eq!(bytes[8 + 24 + 8 + 1], 4);

        let parsed = IpV6ExtensionHeaders::parse(IpProtocol::IPV6_HOP_BY_HOP_OPTION, &bytes);
        assert!(parsed.is_valid());
        assert_eq!(parsed.headers(), chain.headers());
        assert_eq!(parsed.next_header(), Some(IpProtocol::UDP));
        assert_eq!(parsed.parsed_length(), bytes.len());
        assert!(!parsed.is_fragmented());
    }

    #[test]
    fn test_esp_terminates_chain() {
        let bytes = [0, 0, 0, 1, 0, 0, 0, 7, 0xEE, 0xEE, 0xEE];
        let parsed =
            IpV6ExtensionHeaders::parse(IpProtocol::ENCAPSULATING_SECURITY_PAYLOAD, &bytes);
        assert!(parsed.is_valid());
        assert_eq!(parsed.next_header(), Some(IpProtocol::IPV6_NO_NEXT_HEADER));
        assert_eq!(parsed.parsed_length(), bytes.len());
        assert_eq!(
            parsed.headers()[0],
            IpV6ExtensionHeader::EncapsulatingSecurityPayload {
                security_parameters_index: 1,
                sequence_number: 7,
                encrypted_data: vec![0xEE; 3],
            }
        );
    }

    #[test]
    fn test_truncated_header_stops_walk() {
        // Destination options claiming 16 bytes with only 8 present.
        let bytes = [6, 1, 1, 4, 0, 0, 0, 0];
        let parsed = IpV6ExtensionHeaders::parse(IpProtocol::IPV6_DESTINATION_OPTIONS, &bytes);
        assert!(!parsed.is_valid());
        assert!(parsed.is_empty());
        assert_eq!(parsed.next_header(), Some(IpProtocol::IPV6_DESTINATION_OPTIONS));
    }

    #[test]
    fn test_authentication_length_must_be_word_aligned() {
        let chain = IpV6ExtensionHeaders::new(vec![IpV6ExtensionHeader::Authentication {
            security_parameters_index: 0,
            sequence_number: 0,
            authentication_data: vec![1, 2, 3],
        }]);
        let mut buffer = vec![0u8; chain.bytes_length()];
        let mut offset = 0;
        assert!(chain.write(&mut buffer, &mut offset, IpProtocol::TCP).is_err());
    }
}
