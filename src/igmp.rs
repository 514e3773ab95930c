//! IGMP versions 1, 2 and 3 (RFC 1112, RFC 2236, RFC 3376).

use std::net::Ipv4Addr;
use std::time::Duration;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::bytes_ext::{
    Endianity, read_ipv4, read_u16, set_u16, write_bytes, write_ipv4, write_u8, write_u16,
};
use crate::checksum;
use crate::datagram::{DataSegment, Datagram, impl_datagram_eq};
use crate::ip::IpProtocol;
use crate::layer::{IpNextLayer, Layer};
use crate::{Checksumable, PacketError};

mod offset {
    pub const MESSAGE_TYPE: usize = 0;
    pub const MAX_RESPONSE_CODE: usize = 1;
    pub const CHECKSUM: usize = 2;
    pub const GROUP_ADDRESS: usize = 4;
    pub const NUMBER_OF_GROUP_RECORDS: usize = 6;
    pub const GROUP_RECORDS: usize = 8;
    pub const QUERY_FLAGS: usize = 8;
    pub const QUERY_INTERVAL_CODE: usize = 9;
    pub const NUMBER_OF_SOURCES: usize = 10;
    pub const SOURCE_ADDRESSES: usize = 12;
}

pub mod message_type {
    pub const MEMBERSHIP_QUERY: u8 = 0x11;
    pub const MEMBERSHIP_REPORT_VERSION_1: u8 = 0x12;
    pub const MEMBERSHIP_REPORT_VERSION_2: u8 = 0x16;
    pub const LEAVE_GROUP_VERSION_2: u8 = 0x17;
    pub const MEMBERSHIP_REPORT_VERSION_3: u8 = 0x22;
}

const SUPPRESS_ROUTER_SIDE_PROCESSING: u8 = 0x08;
const QUERY_ROBUSTNESS_MASK: u8 = 0x07;

/// Which IGMP version a membership query belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IgmpQueryVersion {
    None,
    Version1,
    Version2,
    Version3,
    Unknown,
}

/// Decodes an 8-bit IGMPv3 code: literal below 128, otherwise a float
/// with a 3-bit exponent and 4-bit mantissa.
pub fn code_to_value(code: u8) -> u32 {
    if code < 0x80 {
        return u32::from(code);
    }
    let mantissa = u32::from(code & 0x0F);
    let exponent = u32::from((code & 0x70) >> 4);
    (mantissa | 0x10) << (exponent + 3)
}

/// Encodes `value` as an IGMPv3 code, if it is exactly representable.
pub fn value_to_code(value: u32) -> Option<u8> {
    if value < 0x80 {
        return Some(value as u8);
    }
    (0..8u8).find_map(|exponent| {
        let shift = u32::from(exponent) + 3;
        if value & ((1 << shift) - 1) != 0 {
            return None;
        }
        let mantissa = value >> shift;
        (0x10..0x20)
            .contains(&mantissa)
            .then(|| 0x80 | (exponent << 4) | (mantissa as u8 & 0x0F))
    })
}

/// IGMPv3 group record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IgmpRecordType(pub u8);

impl IgmpRecordType {
    pub const MODE_IS_INCLUDE: Self = Self(1);
    pub const MODE_IS_EXCLUDE: Self = Self(2);
    pub const CHANGE_TO_INCLUDE_MODE: Self = Self(3);
    pub const CHANGE_TO_EXCLUDE_MODE: Self = Self(4);
    pub const ALLOW_NEW_SOURCES: Self = Self(5);
    pub const BLOCK_OLD_SOURCES: Self = Self(6);
}

/// One group record of an IGMPv3 membership report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgmpGroupRecord {
    pub record_type: IgmpRecordType,
    pub multicast_address: Ipv4Addr,
    pub source_addresses: Vec<Ipv4Addr>,
    /// Length must be a multiple of 4.
    #[serde(with = "serde_bytes")]
    pub auxiliary_data: Vec<u8>,
}

impl IgmpGroupRecord {
    const HEADER_LENGTH: usize = 8;

    pub fn length(&self) -> usize {
        Self::HEADER_LENGTH + 4 * self.source_addresses.len() + self.auxiliary_data.len()
    }

    fn write(&self, buffer: &mut [u8], offset: &mut usize) -> Result<(), PacketError> {
        if self.auxiliary_data.len() % 4 != 0 {
            return Err(PacketError::InvalidFieldValue(format!(
                "IGMP auxiliary data of {} bytes is not a multiple of 4",
                self.auxiliary_data.len()
            )));
        }
        let auxiliary_words =
            u8::try_from(self.auxiliary_data.len() / 4).map_err(|_| PacketError::InvalidLength)?;
        let sources =
            u16::try_from(self.source_addresses.len()).map_err(|_| PacketError::InvalidLength)?;
        write_u8(buffer, offset, self.record_type.0);
        write_u8(buffer, offset, auxiliary_words);
        write_u16(buffer, offset, sources, Endianity::Big);
        write_ipv4(buffer, offset, self.multicast_address);
        for source in &self.source_addresses {
            write_ipv4(buffer, offset, *source);
        }
        write_bytes(buffer, offset, &self.auxiliary_data);
        Ok(())
    }

    /// Parses one record; `None` when it runs past `bytes`.
    fn parse(bytes: &[u8]) -> Option<(IgmpGroupRecord, usize)> {
        if bytes.len() < Self::HEADER_LENGTH {
            return None;
        }
        let auxiliary_length = usize::from(bytes[1]) * 4;
        let sources = usize::from(read_u16(bytes, 2, Endianity::Big));
        let length = Self::HEADER_LENGTH + 4 * sources + auxiliary_length;
        let record = bytes.get(..length)?;
        let auxiliary_start = Self::HEADER_LENGTH + 4 * sources;
        Some((
            IgmpGroupRecord {
                record_type: IgmpRecordType(record[0]),
                multicast_address: read_ipv4(record, 4),
                source_addresses: record[Self::HEADER_LENGTH..auxiliary_start]
                    .chunks_exact(4)
                    .map(|chunk| read_ipv4(chunk, 0))
                    .collect(),
                auxiliary_data: record[auxiliary_start..].to_vec(),
            },
            length,
        ))
    }
}

/// A parsed IGMP message.
#[derive(Debug, Clone)]
pub struct IgmpDatagram {
    segment: DataSegment,
    validity: OnceCell<bool>,
}

impl_datagram_eq!(IgmpDatagram);

impl IgmpDatagram {
    pub const HEADER_LENGTH: usize = 8;
    pub const QUERY_VERSION_3_HEADER_LENGTH: usize = 12;

    pub fn new(segment: DataSegment) -> Self {
        Self {
            segment,
            validity: OnceCell::new(),
        }
    }

    pub fn message_type(&self) -> u8 {
        self.segment.read_u8(offset::MESSAGE_TYPE)
    }

    pub fn max_response_code(&self) -> u8 {
        self.segment.read_u8(offset::MAX_RESPONSE_CODE)
    }

    pub fn checksum_field(&self) -> u16 {
        self.segment.read_u16(offset::CHECKSUM, Endianity::Big)
    }

    pub fn group_address(&self) -> Ipv4Addr {
        self.segment.read_ipv4(offset::GROUP_ADDRESS)
    }

    pub fn query_version(&self) -> IgmpQueryVersion {
        if self.message_type() != message_type::MEMBERSHIP_QUERY {
            return IgmpQueryVersion::None;
        }
        let length = self.segment.len();
        if length >= Self::QUERY_VERSION_3_HEADER_LENGTH {
            IgmpQueryVersion::Version3
        } else if length != Self::HEADER_LENGTH {
            IgmpQueryVersion::Unknown
        } else if self.max_response_code() == 0 {
            IgmpQueryVersion::Version1
        } else {
            IgmpQueryVersion::Version2
        }
    }

    /// Maximum response time; v3 queries use the exponential code.
    pub fn max_response_time(&self) -> Duration {
        let code = self.max_response_code();
        let tenths = if self.query_version() == IgmpQueryVersion::Version3 {
            code_to_value(code)
        } else {
            u32::from(code)
        };
        Duration::from_millis(u64::from(tenths) * 100)
    }

    pub fn is_suppress_router_side_processing(&self) -> bool {
        self.segment.read_u8(offset::QUERY_FLAGS) & SUPPRESS_ROUTER_SIDE_PROCESSING != 0
    }

    pub fn query_robustness_variable(&self) -> u8 {
        self.segment.read_u8(offset::QUERY_FLAGS) & QUERY_ROBUSTNESS_MASK
    }

    pub fn query_interval_code(&self) -> u8 {
        self.segment.read_u8(offset::QUERY_INTERVAL_CODE)
    }

    pub fn query_interval(&self) -> Duration {
        Duration::from_secs(u64::from(code_to_value(self.query_interval_code())))
    }

    pub fn number_of_sources(&self) -> u16 {
        self.segment.read_u16(offset::NUMBER_OF_SOURCES, Endianity::Big)
    }

    /// Source addresses of a v3 query, bounded by the captured bytes.
    pub fn source_addresses(&self) -> Vec<Ipv4Addr> {
        let count = usize::from(self.number_of_sources());
        self.segment
            .tail(offset::SOURCE_ADDRESSES)
            .as_slice()
            .chunks_exact(4)
            .take(count)
            .map(|chunk| read_ipv4(chunk, 0))
            .collect()
    }

    pub fn number_of_group_records(&self) -> u16 {
        self.segment
            .read_u16(offset::NUMBER_OF_GROUP_RECORDS, Endianity::Big)
    }

    /// Group records of a v3 report, stopping at the first truncated one.
    pub fn group_records(&self) -> Vec<IgmpGroupRecord> {
        self.parse_group_records().0
    }

    fn parse_group_records(&self) -> (Vec<IgmpGroupRecord>, usize) {
        let bytes = self.segment.tail(offset::GROUP_RECORDS);
        let mut records = Vec::new();
        let mut position = 0;
        for _ in 0..self.number_of_group_records() {
            match IgmpGroupRecord::parse(&bytes.as_slice()[position..]) {
                Some((record, length)) => {
                    records.push(record);
                    position += length;
                }
                None => break,
            }
        }
        (records, offset::GROUP_RECORDS + position)
    }

    pub fn message(&self) -> IgmpMessage {
        use message_type::*;
        let group_address = self.group_address();
        match (self.message_type(), self.query_version()) {
            (MEMBERSHIP_QUERY, IgmpQueryVersion::Version1) => {
                IgmpMessage::QueryVersion1 { group_address }
            }
            (MEMBERSHIP_QUERY, IgmpQueryVersion::Version2) => IgmpMessage::QueryVersion2 {
                max_response_code: self.max_response_code(),
                group_address,
            },
            (MEMBERSHIP_QUERY, IgmpQueryVersion::Version3) => IgmpMessage::QueryVersion3 {
                max_response_code: self.max_response_code(),
                group_address,
                suppress_router_side_processing: self.is_suppress_router_side_processing(),
                query_robustness_variable: self.query_robustness_variable(),
                query_interval_code: self.query_interval_code(),
                source_addresses: self.source_addresses(),
            },
            (MEMBERSHIP_REPORT_VERSION_1, _) => IgmpMessage::ReportVersion1 { group_address },
            (MEMBERSHIP_REPORT_VERSION_2, _) => IgmpMessage::ReportVersion2 {
                max_response_code: self.max_response_code(),
                group_address,
            },
            (LEAVE_GROUP_VERSION_2, _) => IgmpMessage::LeaveGroupVersion2 {
                max_response_code: self.max_response_code(),
                group_address,
            },
            (MEMBERSHIP_REPORT_VERSION_3, _) => IgmpMessage::ReportVersion3 {
                group_records: self.group_records(),
            },
            (message_type, _) => IgmpMessage::Unknown {
                message_type,
                max_response_code: self.max_response_code(),
                data: self.segment.tail(offset::GROUP_ADDRESS).to_vec(),
            },
        }
    }

    pub fn extract_layer(&self) -> IgmpLayer {
        IgmpLayer {
            message: self.message(),
            checksum: Some(self.checksum_field()),
        }
    }
}

impl Checksumable for IgmpDatagram {
    fn checksum(&self) -> u16 {
        self.checksum_field()
    }

    fn calculate_checksum(&self) -> u16 {
        checksum::checksum_excluding(self.segment.as_slice(), offset::CHECKSUM)
    }
}

impl Datagram for IgmpDatagram {
    fn segment(&self) -> &DataSegment {
        &self.segment
    }

    fn validity(&self) -> &OnceCell<bool> {
        &self.validity
    }

    fn calculate_is_valid(&self) -> bool {
        use message_type::*;
        let length = self.segment.len();
        if length < Self::HEADER_LENGTH || !self.is_checksum_correct() {
            return false;
        }
        match self.message_type() {
            MEMBERSHIP_QUERY => match self.query_version() {
                IgmpQueryVersion::Version1 | IgmpQueryVersion::Version2 => true,
                IgmpQueryVersion::Version3 => {
                    length
                        == Self::QUERY_VERSION_3_HEADER_LENGTH
                            + 4 * usize::from(self.number_of_sources())
                }
                _ => false,
            },
            MEMBERSHIP_REPORT_VERSION_1 => {
                length == Self::HEADER_LENGTH && self.max_response_code() == 0
            }
            MEMBERSHIP_REPORT_VERSION_2 | LEAVE_GROUP_VERSION_2 => length == Self::HEADER_LENGTH,
            MEMBERSHIP_REPORT_VERSION_3 => {
                let (records, end) = self.parse_group_records();
                self.max_response_code() == 0
                    && records.len() == usize::from(self.number_of_group_records())
                    && end == length
            }
            _ => true,
        }
    }
}

/// Content of an IGMP message.
///
/// Max response codes are raw: tenths of a second for v2, the exponential
/// form for v3 (see [`value_to_code`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IgmpMessage {
    QueryVersion1 {
        group_address: Ipv4Addr,
    },
    QueryVersion2 {
        max_response_code: u8,
        group_address: Ipv4Addr,
    },
    QueryVersion3 {
        max_response_code: u8,
        group_address: Ipv4Addr,
        suppress_router_side_processing: bool,
        query_robustness_variable: u8,
        query_interval_code: u8,
        source_addresses: Vec<Ipv4Addr>,
    },
    ReportVersion1 {
        group_address: Ipv4Addr,
    },
    ReportVersion2 {
        max_response_code: u8,
        group_address: Ipv4Addr,
    },
    LeaveGroupVersion2 {
        max_response_code: u8,
        group_address: Ipv4Addr,
    },
    ReportVersion3 {
        group_records: Vec<IgmpGroupRecord>,
    },
    Unknown {
        message_type: u8,
        max_response_code: u8,
        #[serde(with = "serde_bytes")]
        data: Vec<u8>,
    },
}

impl IgmpMessage {
    pub fn message_type(&self) -> u8 {
        use message_type::*;
        match self {
            IgmpMessage::QueryVersion1 { .. }
            | IgmpMessage::QueryVersion2 { .. }
            | IgmpMessage::QueryVersion3 { .. } => MEMBERSHIP_QUERY,
            IgmpMessage::ReportVersion1 { .. } => MEMBERSHIP_REPORT_VERSION_1,
            IgmpMessage::ReportVersion2 { .. } => MEMBERSHIP_REPORT_VERSION_2,
            IgmpMessage::LeaveGroupVersion2 { .. } => LEAVE_GROUP_VERSION_2,
            IgmpMessage::ReportVersion3 { .. } => MEMBERSHIP_REPORT_VERSION_3,
            IgmpMessage::Unknown { message_type, .. } => *message_type,
        }
    }

    fn length(&self) -> usize {
        match self {
            IgmpMessage::QueryVersion3 {
                source_addresses, ..
            } => IgmpDatagram::QUERY_VERSION_3_HEADER_LENGTH + 4 * source_addresses.len(),
            IgmpMessage::ReportVersion3 { group_records } => {
                IgmpDatagram::HEADER_LENGTH
                    + group_records.iter().map(IgmpGroupRecord::length).sum::<usize>()
            }
            IgmpMessage::Unknown { data, .. } => 4 + data.len(),
            _ => IgmpDatagram::HEADER_LENGTH,
        }
    }
}

/// IGMP message description; `checksum: None` computes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgmpLayer {
    pub message: IgmpMessage,
    pub checksum: Option<u16>,
}

impl IgmpLayer {
    pub fn new(message: IgmpMessage) -> Self {
        Self {
            message,
            checksum: None,
        }
    }
}

impl Layer for IgmpLayer {
    fn name(&self) -> &'static str {
        "IGMP"
    }

    fn length(&self) -> usize {
        self.message.length()
    }

    fn write(
        &self,
        buffer: &mut [u8],
        offset: &mut usize,
        _payload_length: usize,
        _previous: Option<&dyn Layer>,
        _next: Option<&dyn Layer>,
    ) -> Result<(), PacketError> {
        let max_response_code = match &self.message {
            IgmpMessage::QueryVersion2 {
                max_response_code, ..
            }
            | IgmpMessage::QueryVersion3 {
                max_response_code, ..
            }
            | IgmpMessage::ReportVersion2 {
                max_response_code, ..
            }
            | IgmpMessage::LeaveGroupVersion2 {
                max_response_code, ..
            }
            | IgmpMessage::Unknown {
                max_response_code, ..
            } => *max_response_code,
            _ => 0,
        };
        write_u8(buffer, offset, self.message.message_type());
        write_u8(buffer, offset, max_response_code);
        write_u16(buffer, offset, self.checksum.unwrap_or(0), Endianity::Big);

        match &self.message {
            IgmpMessage::QueryVersion1 { group_address }
            | IgmpMessage::QueryVersion2 { group_address, .. }
            | IgmpMessage::ReportVersion1 { group_address }
            | IgmpMessage::ReportVersion2 { group_address, .. }
            | IgmpMessage::LeaveGroupVersion2 { group_address, .. } => {
                write_ipv4(buffer, offset, *group_address)
            }
            IgmpMessage::QueryVersion3 {
                group_address,
                suppress_router_side_processing,
                query_robustness_variable,
                query_interval_code,
                source_addresses,
                ..
            } => {
                if *query_robustness_variable > QUERY_ROBUSTNESS_MASK {
                    return Err(PacketError::InvalidFieldValue(format!(
                        "IGMP query robustness variable {query_robustness_variable} exceeds 7"
                    )));
                }
                let sources = u16::try_from(source_addresses.len())
                    .map_err(|_| PacketError::InvalidLength)?;
                let mut flags = *query_robustness_variable;
                if *suppress_router_side_processing {
                    flags |= SUPPRESS_ROUTER_SIDE_PROCESSING;
                }
                write_ipv4(buffer, offset, *group_address);
                write_u8(buffer, offset, flags);
                write_u8(buffer, offset, *query_interval_code);
                write_u16(buffer, offset, sources, Endianity::Big);
                for source in source_addresses {
                    write_ipv4(buffer, offset, *source);
                }
            }
            IgmpMessage::ReportVersion3 { group_records } => {
                let count =
                    u16::try_from(group_records.len()).map_err(|_| PacketError::InvalidLength)?;
                write_u16(buffer, offset, 0, Endianity::Big);
                write_u16(buffer, offset, count, Endianity::Big);
                for record in group_records {
                    record.write(buffer, offset)?;
                }
            }
            IgmpMessage::Unknown { data, .. } => write_bytes(buffer, offset, data),
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

impl IpNextLayer for IgmpLayer {
    fn previous_layer_protocol(&self) -> IpProtocol {
        IpProtocol::IGMP
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::PacketBuilder;
    use crate::ipv4::IpV4Layer;
    use chrono::Utc;

    fn build(message: IgmpMessage) -> IgmpDatagram {
        let ip = IpV4Layer {
            source: Ipv4Addr::new(10, 0, 0, 1),
            destination: Ipv4Addr::new(224, 0, 0, 1),
            ttl: 1,
            ..Default::default()
        };
        let packet =
            PacketBuilder::build_packet(Utc::now(), vec![Box::new(ip), Box::new(IgmpLayer::new(message))])
                .unwrap();
        assert!(packet.is_valid());
        packet.ip_v4().igmp()
    }

    #[test]
    fn test_exponential_codes() {
        assert_eq!(code_to_value(0x7F), 127);
        assert_eq!(code_to_value(0x80), 128);
        assert_eq!(code_to_value(0xFF), 31744);
        assert_eq!(value_to_code(128), Some(0x80));
        assert_eq!(value_to_code(31744), Some(0xFF));
        assert_eq!(value_to_code(129), None);
        for code in 0..=255u8 {
            assert_eq!(value_to_code(code_to_value(code)), Some(code));
        }
    }

    #[test]
    fn test_query_versions() {
        let v1 = build(IgmpMessage::QueryVersion1 {
            group_address: Ipv4Addr::UNSPECIFIED,
        });
        assert_eq!(v1.query_version(), IgmpQueryVersion::Version1);

        let v2 = build(IgmpMessage::QueryVersion2 {
            max_response_code: 100,
            group_address: Ipv4Addr::new(224, 1, 2, 3),
        });
        assert_eq!(v2.query_version(), IgmpQueryVersion::Version2);
        assert_eq!(v2.max_response_time(), Duration::from_secs(10));

        let message = IgmpMessage::QueryVersion3 {
            max_response_code: 0x8F,
            group_address: Ipv4Addr::new(224, 1, 2, 3),
            suppress_router_side_processing: true,
            query_robustness_variable: 2,
            query_interval_code: 125,
            source_addresses: vec![Ipv4Addr::new(1, 1, 1, 1), Ipv4Addr::new(2, 2, 2, 2)],
        };
        let v3 = build(message.clone());
        assert_eq!(v3.query_version(), IgmpQueryVersion::Version3);
        assert_eq!(v3.max_response_time(), Duration::from_millis(u64::from(31u32 << 3) * 100));
        assert_eq!(v3.query_interval(), Duration::from_secs(125));
        assert_eq!(v3.message(), message);
    }

    #[test]
    fn test_report_version_3_round_trip() {
        let message = IgmpMessage::ReportVersion3 {
            group_records: vec![
                IgmpGroupRecord {
                    record_type: IgmpRecordType::MODE_IS_EXCLUDE,
                    multicast_address: Ipv4Addr::new(239, 0, 0, 1),
                    source_addresses: vec![Ipv4Addr::new(10, 1, 1, 1)],
                    auxiliary_data: vec![1, 2, 3, 4],
                },
                IgmpGroupRecord {
                    record_type: IgmpRecordType::ALLOW_NEW_SOURCES,
                    multicast_address: Ipv4Addr::new(239, 0, 0, 2),
                    source_addresses: vec![],
                    auxiliary_data: vec![],
                },
            ],
        };
        let igmp = build(message.clone());
        assert_eq!(igmp.number_of_group_records(), 2);
        let mut extracted = igmp.extract_layer();
        extracted.checksum = None;
        assert_eq!(extracted, IgmpLayer::new(message));
    }

    #[test]
    fn test_report_v1_with_response_code_is_invalid() {
        let mut bytes = vec![message_type::MEMBERSHIP_REPORT_VERSION_1, 5, 0, 0, 224, 0, 0, 1];
        let value = checksum::checksum_excluding(&bytes, offset::CHECKSUM);
        bytes[2..4].copy_from_slice(&value.to_be_bytes());
        let igmp = IgmpDatagram::new(DataSegment::new(bytes));
        assert!(igmp.is_checksum_correct());
        assert!(!igmp.is_valid());
        assert_eq!(igmp.query_version(), IgmpQueryVersion::None);
    }

    #[test]
    fn test_truncated_v3_query() {
        let igmp = IgmpDatagram::new(DataSegment::new(vec![
            message_type::MEMBERSHIP_QUERY,
            0,
            0,
            0,
            0,
            0,
            0,
            0,
            0,
            0,
        ]));
        assert_eq!(igmp.query_version(), IgmpQueryVersion::Unknown);
        assert!(!igmp.is_valid());
        assert!(igmp.source_addresses().is_empty());
    }

    #[test]
    fn test_checksum_flip_detected() {
        let igmp = build(IgmpMessage::QueryVersion3 {
            max_response_code: 100,
            group_address: Ipv4Addr::new(224, 1, 2, 3),
            suppress_router_side_processing: false,
            query_robustness_variable: 2,
            query_interval_code: 125,
            source_addresses: vec![Ipv4Addr::new(10, 0, 0, 9)],
        });
        assert!(igmp.is_checksum_correct());

        let bytes = igmp.segment().to_vec();
        for index in (0..bytes.len()).filter(|&index| index != 2 && index != 3) {
            let mut flipped = bytes.clone();
            flipped[index] ^= 0x01;
            let corrupted = IgmpDatagram::new(DataSegment::new(flipped));
            assert!(!corrupted.is_checksum_correct(), "byte {}", index);
            assert!(!corrupted.is_valid(), "byte {}", index);
        }
    }
}
