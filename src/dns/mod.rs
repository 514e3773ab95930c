//! DNS messages (RFC 1035 and successors).
//!
//! [`DnsDatagram`] reads the header and lazily parses the four record
//! sections; [`DnsLayer`] writes a whole message, compressing names
//! according to its [`DnsDomainNameCompressionMode`].

pub mod name;
pub mod options;
pub mod record;
pub mod resource_data;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::PacketError;
use crate::bytes_ext::{Endianity, write_bytes};
use crate::datagram::{DataSegment, Datagram, impl_datagram_eq};
use crate::layer::Layer;

use name::DnsMessageWriter;

pub use name::{DnsDomainName, DnsDomainNameCompressionMode};
pub use options::{DnsOption, DnsOptions};
pub use record::{DnsClass, DnsDataResourceRecord, DnsQueryResourceRecord, DnsType};
pub use resource_data::{DnsAddressPrefix, DnsGateway, DnsResourceData};

mod offset {
    pub const ID: usize = 0;
    pub const FLAGS_HIGH: usize = 2;
    pub const FLAGS_LOW: usize = 3;
    pub const QUERY_COUNT: usize = 4;
    pub const ANSWER_COUNT: usize = 6;
    pub const AUTHORITY_COUNT: usize = 8;
    pub const ADDITIONAL_COUNT: usize = 10;
    pub const QUERY: usize = 12;
}

mod mask {
    pub const IS_RESPONSE: u8 = 0x80;
    pub const OPCODE: u8 = 0x78;
    pub const IS_AUTHORITATIVE_ANSWER: u8 = 0x04;
    pub const IS_TRUNCATED: u8 = 0x02;
    pub const IS_RECURSION_DESIRED: u8 = 0x01;
    pub const IS_RECURSION_AVAILABLE: u8 = 0x80;
    pub const FUTURE_USE: u8 = 0x70;
    pub const RESPONSE_CODE: u8 = 0x0F;
}

pub mod opcode {
    pub const QUERY: u8 = 0;
    pub const INVERSE_QUERY: u8 = 1;
    pub const STATUS: u8 = 2;
    pub const NOTIFY: u8 = 4;
    pub const UPDATE: u8 = 5;
}

pub mod response_code {
    pub const NO_ERROR: u8 = 0;
    pub const FORMAT_ERROR: u8 = 1;
    pub const SERVER_FAILURE: u8 = 2;
    pub const NAME_ERROR: u8 = 3;
    pub const NOT_IMPLEMENTED: u8 = 4;
    pub const REFUSED: u8 = 5;
    pub const YX_DOMAIN: u8 = 6;
    pub const YX_RR_SET: u8 = 7;
    pub const NX_RR_SET: u8 = 8;
    pub const NOT_AUTH: u8 = 9;
    pub const NOT_ZONE: u8 = 10;
}

/// Well-known DNS port.
pub const PORT: u16 = 53;

/// The records of a message, parsed as far as the bytes allow.
#[derive(Debug, Clone, Default)]
struct DnsSections {
    queries: Vec<DnsQueryResourceRecord>,
    answers: Vec<DnsDataResourceRecord>,
    authorities: Vec<DnsDataResourceRecord>,
    additionals: Vec<DnsDataResourceRecord>,
    /// Every declared record was read.
    is_complete: bool,
    /// Every record's data matched the layout of its type.
    is_typed: bool,
}

/// A parsed DNS message.
#[derive(Debug, Clone)]
pub struct DnsDatagram {
    segment: DataSegment,
    validity: OnceCell<bool>,
    sections: OnceCell<DnsSections>,
}

impl_datagram_eq!(DnsDatagram);

impl DnsDatagram {
    pub const HEADER_LENGTH: usize = 12;

    pub fn new(segment: DataSegment) -> Self {
        Self {
            segment,
            validity: OnceCell::new(),
            sections: OnceCell::new(),
        }
    }

    pub fn id(&self) -> u16 {
        self.segment.read_u16(offset::ID, Endianity::Big)
    }

    pub fn is_response(&self) -> bool {
        self.segment.read_u8(offset::FLAGS_HIGH) & mask::IS_RESPONSE != 0
    }

    pub fn is_query(&self) -> bool {
        !self.is_response()
    }

    pub fn opcode(&self) -> u8 {
        (self.segment.read_u8(offset::FLAGS_HIGH) & mask::OPCODE) >> 3
    }

    pub fn is_authoritative_answer(&self) -> bool {
        self.segment.read_u8(offset::FLAGS_HIGH) & mask::IS_AUTHORITATIVE_ANSWER != 0
    }

    pub fn is_truncated(&self) -> bool {
        self.segment.read_u8(offset::FLAGS_HIGH) & mask::IS_TRUNCATED != 0
    }

    pub fn is_recursion_desired(&self) -> bool {
        self.segment.read_u8(offset::FLAGS_HIGH) & mask::IS_RECURSION_DESIRED != 0
    }

    pub fn is_recursion_available(&self) -> bool {
        self.segment.read_u8(offset::FLAGS_LOW) & mask::IS_RECURSION_AVAILABLE != 0
    }

    /// The three reserved bits (Z, AD and CD in later RFCs).
    pub fn future_use(&self) -> u8 {
        (self.segment.read_u8(offset::FLAGS_LOW) & mask::FUTURE_USE) >> 4
    }

    pub fn response_code(&self) -> u8 {
        self.segment.read_u8(offset::FLAGS_LOW) & mask::RESPONSE_CODE
    }

    pub fn query_count(&self) -> u16 {
        self.segment.read_u16(offset::QUERY_COUNT, Endianity::Big)
    }

    pub fn answer_count(&self) -> u16 {
        self.segment.read_u16(offset::ANSWER_COUNT, Endianity::Big)
    }

    pub fn authority_count(&self) -> u16 {
        self.segment.read_u16(offset::AUTHORITY_COUNT, Endianity::Big)
    }

    pub fn additional_count(&self) -> u16 {
        self.segment.read_u16(offset::ADDITIONAL_COUNT, Endianity::Big)
    }

    pub fn queries(&self) -> &[DnsQueryResourceRecord] {
        &self.sections().queries
    }

    pub fn answers(&self) -> &[DnsDataResourceRecord] {
        &self.sections().answers
    }

    pub fn authorities(&self) -> &[DnsDataResourceRecord] {
        &self.sections().authorities
    }

    pub fn additionals(&self) -> &[DnsDataResourceRecord] {
        &self.sections().additionals
    }

    /// Answers, authorities and additionals in message order.
    pub fn data_resource_records(&self) -> impl Iterator<Item = &DnsDataResourceRecord> {
        let sections = self.sections();
        sections
            .answers
            .iter()
            .chain(&sections.authorities)
            .chain(&sections.additionals)
    }

    /// The OPT pseudo-record, if the additionals carry one.
    pub fn options_record(&self) -> Option<&DnsDataResourceRecord> {
        self.additionals()
            .iter()
            .find(|record| record.dns_type == DnsType::OPT)
    }

    fn sections(&self) -> &DnsSections {
        self.sections.get_or_init(|| self.parse_sections())
    }

    fn parse_sections(&self) -> DnsSections {
        let message = self.segment.as_slice();
        let mut sections = DnsSections {
            is_typed: true,
            ..DnsSections::default()
        };
        if message.len() < Self::HEADER_LENGTH {
            return sections;
        }

        let mut position = offset::QUERY;
        for _ in 0..self.query_count() {
            let Some((query, length)) = DnsQueryResourceRecord::parse(message, position) else {
                return sections;
            };
            sections.queries.push(query);
            position += length;
        }

        let counts = [
            self.answer_count(),
            self.authority_count(),
            self.additional_count(),
        ];
        for (section, count) in counts.into_iter().enumerate() {
            for _ in 0..count {
                let Some((record, length, is_typed)) =
                    DnsDataResourceRecord::parse(message, position)
                else {
                    return sections;
                };
                sections.is_typed &= is_typed;
                match section {
                    0 => sections.answers.push(record),
                    1 => sections.authorities.push(record),
                    _ => sections.additionals.push(record),
                }
                position += length;
            }
        }
        sections.is_complete = true;
        sections
    }

    pub fn extract_layer(&self) -> DnsLayer {
        DnsLayer {
            id: self.id(),
            is_response: self.is_response(),
            opcode: self.opcode(),
            is_authoritative_answer: self.is_authoritative_answer(),
            is_truncated: self.is_truncated(),
            is_recursion_desired: self.is_recursion_desired(),
            is_recursion_available: self.is_recursion_available(),
            future_use: self.future_use(),
            response_code: self.response_code(),
            queries: self.queries().to_vec(),
            answers: self.answers().to_vec(),
            authorities: self.authorities().to_vec(),
            additionals: self.additionals().to_vec(),
            compression: DnsDomainNameCompressionMode::All,
        }
    }
}

impl Datagram for DnsDatagram {
    fn segment(&self) -> &DataSegment {
        &self.segment
    }

    fn validity(&self) -> &OnceCell<bool> {
        &self.validity
    }

    fn calculate_is_valid(&self) -> bool {
        let sections = self.sections();
        self.segment.len() >= Self::HEADER_LENGTH && sections.is_complete && sections.is_typed
    }
}

/// A DNS message to write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsLayer {
    pub id: u16,
    pub is_response: bool,
    pub opcode: u8,
    pub is_authoritative_answer: bool,
    pub is_truncated: bool,
    pub is_recursion_desired: bool,
    pub is_recursion_available: bool,
    pub future_use: u8,
    pub response_code: u8,
    pub queries: Vec<DnsQueryResourceRecord>,
    pub answers: Vec<DnsDataResourceRecord>,
    pub authorities: Vec<DnsDataResourceRecord>,
    pub additionals: Vec<DnsDataResourceRecord>,
    pub compression: DnsDomainNameCompressionMode,
}

impl DnsLayer {
    /// A recursive query for one name.
    pub fn query(id: u16, domain_name: impl Into<DnsDomainName>, dns_type: DnsType) -> Self {
        Self {
            id,
            is_recursion_desired: true,
            queries: vec![DnsQueryResourceRecord::new(
                domain_name,
                dns_type,
                DnsClass::INTERNET,
            )],
            ..Self::default()
        }
    }

    /// Serializes the message.
    pub fn as_bytes(&self) -> Result<Vec<u8>, PacketError> {
        let section_count = |count: usize| u16::try_from(count).map_err(|_| PacketError::InvalidLength);

        let mut writer = DnsMessageWriter::new(self.compression);
        writer.u16(self.id);
        let mut flags_high = (self.opcode << 3) & mask::OPCODE;
        if self.is_response {
            flags_high |= mask::IS_RESPONSE;
        }
        if self.is_authoritative_answer {
            flags_high |= mask::IS_AUTHORITATIVE_ANSWER;
        }
        if self.is_truncated {
            flags_high |= mask::IS_TRUNCATED;
        }
        if self.is_recursion_desired {
            flags_high |= mask::IS_RECURSION_DESIRED;
        }
        let mut flags_low = ((self.future_use << 4) & mask::FUTURE_USE)
            | (self.response_code & mask::RESPONSE_CODE);
        if self.is_recursion_available {
            flags_low |= mask::IS_RECURSION_AVAILABLE;
        }
        writer.u8(flags_high);
        writer.u8(flags_low);
        writer.u16(section_count(self.queries.len())?);
        writer.u16(section_count(self.answers.len())?);
        writer.u16(section_count(self.authorities.len())?);
        writer.u16(section_count(self.additionals.len())?);

        for query in &self.queries {
            query.write(&mut writer)?;
        }
        for record in self
            .answers
            .iter()
            .chain(&self.authorities)
            .chain(&self.additionals)
        {
            record.write(&mut writer)?;
        }
        Ok(writer.bytes)
    }
}

impl Layer for DnsLayer {
    fn name(&self) -> &'static str {
        "DNS"
    }

    /// Zero when the message cannot be serialized; `write` then reports why.
    fn length(&self) -> usize {
        self.as_bytes().map(|bytes| bytes.len()).unwrap_or(0)
    }

    fn write(
        &self,
        buffer: &mut [u8],
        offset: &mut usize,
        _payload_length: usize,
        _previous: Option<&dyn Layer>,
        _next: Option<&dyn Layer>,
    ) -> Result<(), PacketError> {
        let bytes = self.as_bytes()?;
        if buffer.len() < *offset + bytes.len() {
            return Err(PacketError::BufferTooSmall);
        }
        write_bytes(buffer, offset, &bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::PacketBuilder;
    use crate::ethernet::{EthernetLayer, MacAddress};
    use crate::ipv4::IpV4Layer;
    use crate::udp::UdpLayer;
    use chrono::Utc;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn response() -> DnsLayer {
        DnsLayer {
            id: 0xBEEF,
            is_response: true,
            is_authoritative_answer: true,
            is_recursion_desired: true,
            is_recursion_available: true,
            response_code: response_code::NO_ERROR,
            queries: vec![DnsQueryResourceRecord::new(
                "www.example.com",
                DnsType::A,
                DnsClass::INTERNET,
            )],
            answers: vec![
                DnsDataResourceRecord::new(
                    "www.example.com",
                    DnsType::CNAME,
                    DnsClass::INTERNET,
                    300,
                    DnsResourceData::DomainName("web.example.com".into()),
                ),
                DnsDataResourceRecord::new(
                    "web.example.com",
                    DnsType::A,
                    DnsClass::INTERNET,
                    300,
                    DnsResourceData::IpV4(Ipv4Addr::new(93, 184, 216, 34)),
                ),
                DnsDataResourceRecord::new(
                    "web.example.com",
                    DnsType::AAAA,
                    DnsClass::INTERNET,
                    300,
                    DnsResourceData::IpV6(Ipv6Addr::LOCALHOST),
                ),
            ],
            authorities: vec![DnsDataResourceRecord::new(
                "example.com",
                DnsType::NS,
                DnsClass::INTERNET,
                86400,
                DnsResourceData::DomainName("ns1.example.com".into()),
            )],
            additionals: vec![DnsDataResourceRecord::opt(
                4096,
                0,
                0,
                true,
                DnsOptions::new(vec![DnsOption::UpdateLease { lease: 60 }]),
            )],
            ..DnsLayer::default()
        }
    }

    #[test]
    fn test_dns_over_udp_round_trip() {
        let dns = response();
        let layers: Vec<Box<dyn Layer>> = vec![
            Box::new(EthernetLayer {
                source: MacAddress::new([0, 1, 2, 3, 4, 5]),
                destination: MacAddress::new([6, 7, 8, 9, 10, 11]),
                ..EthernetLayer::default()
            }),
            Box::new(
                IpV4Layer::builder()
                    .source(Ipv4Addr::new(10, 0, 0, 53))
                    .destination(Ipv4Addr::new(10, 0, 0, 1))
                    .build()
                    .unwrap(),
            ),
            Box::new(UdpLayer::builder().src_port(PORT).dst_port(40000).build().unwrap()),
            Box::new(dns.clone()),
        ];
        let packet = PacketBuilder::build_packet(Utc::now(), layers).unwrap();
        let ip = packet.ethernet().ip_v4();
        let datagram = ip.udp().dns();

        assert!(ip.is_valid());
        assert!(datagram.is_valid());
        assert_eq!(datagram.id(), 0xBEEF);
        assert!(datagram.is_response());
        assert_eq!(datagram.answer_count(), 3);
        assert_eq!(datagram.options_record().unwrap().opt_send_payload_size(), 4096);
        assert!(datagram.options_record().unwrap().opt_dnssec_ok());
        assert_eq!(datagram.extract_layer(), dns);
    }

    #[test]
    fn test_compression_modes() {
        let compressed = response().as_bytes().unwrap();
        let plain = DnsLayer {
            compression: DnsDomainNameCompressionMode::Nothing,
            ..response()
        }
        .as_bytes()
        .unwrap();
        assert!(compressed.len() < plain.len());

        let compressed = DnsDatagram::new(DataSegment::new(compressed));
        let plain = DnsDatagram::new(DataSegment::new(plain));
        assert!(compressed.is_valid());
        assert!(plain.is_valid());
        assert_eq!(compressed.answers(), plain.answers());
        assert_eq!(compressed.authorities(), plain.authorities());
    }

    #[test]
    fn test_header_flags() {
        let layer = DnsLayer {
            opcode: opcode::UPDATE,
            is_truncated: true,
            future_use: 5,
            response_code: response_code::REFUSED,
            ..DnsLayer::default()
        };
        let datagram = DnsDatagram::new(DataSegment::new(layer.as_bytes().unwrap()));
        assert_eq!(datagram.len(), DnsDatagram::HEADER_LENGTH);
        assert_eq!(datagram.opcode(), opcode::UPDATE);
        assert!(datagram.is_truncated());
        assert!(datagram.is_query());
        assert!(!datagram.is_recursion_desired());
        assert_eq!(datagram.future_use(), 5);
        assert_eq!(datagram.response_code(), response_code::REFUSED);
        assert!(datagram.is_valid());
    }

    #[test]
    fn test_self_referencing_name_terminates() {
        let mut message = vec![0x12, 0x34, 0x01, 0x00, 0, 1, 0, 0, 0, 0, 0, 0];
        message.extend_from_slice(&[0xC0, 0x0C, 0x00, 0x01, 0x00, 0x01]);
        let datagram = DnsDatagram::new(DataSegment::new(message));
        assert!(datagram.queries().is_empty());
        assert!(!datagram.is_valid());
        assert_eq!(datagram.id(), 0x1234);
    }

    #[test]
    fn test_mistyped_data_is_kept_as_bytes() {
        let mut message = vec![0, 1, 0x81, 0x80, 0, 0, 0, 1, 0, 0, 0, 0];
        message.extend_from_slice(b"\x01a\x00");
        message.extend_from_slice(&[0, 1, 0, 1, 0, 0, 0, 60, 0, 3, 1, 2, 3]);
        let datagram = DnsDatagram::new(DataSegment::new(message));
        assert_eq!(datagram.answers().len(), 1);
        assert_eq!(
            datagram.answers()[0].data,
            DnsResourceData::Anonymous(vec![1, 2, 3])
        );
        assert!(!datagram.is_valid());
    }

    #[test]
    fn test_short_message() {
        let datagram = DnsDatagram::new(DataSegment::new(vec![0; 11]));
        assert!(!datagram.is_valid());
        assert!(datagram.answers().is_empty());
        assert_eq!(datagram.query_count(), 0);
    }

    #[test]
    fn test_overlong_label_fails_to_build() {
        let layer = DnsLayer::query(1, "a".repeat(64).as_str(), DnsType::A);
        assert!(layer.as_bytes().is_err());
        assert_eq!(layer.length(), 0);
    }
}
