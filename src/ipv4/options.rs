//! IPv4 header options.
//!
//! Options are a sequence of records. `End` and `Nop` are a single byte; all
//! others are `(type, length, value)` with `length` covering the whole
//! record. Parsing stops at `End`, at a record that runs past the header, or
//! at a second copy of an option that may appear only once. Such a stop marks
//! the option list invalid but keeps what was parsed.

use std::net::Ipv4Addr;

use log::trace;
use serde::{Deserialize, Serialize};

use crate::PacketError;
use crate::bytes_ext::{
    Endianity, read_ipv4, read_u16, read_u32, write_bytes, write_ipv4, write_u8, write_u16,
    write_u32,
};

pub mod option_type {
    pub const END_OF_OPTION_LIST: u8 = 0;
    pub const NO_OPERATION: u8 = 1;
    pub const RECORD_ROUTE: u8 = 7;
    pub const QUICK_START: u8 = 25;
    pub const INTERNET_TIMESTAMP: u8 = 68;
    pub const TRACE_ROUTE: u8 = 82;
    pub const BASIC_SECURITY: u8 = 130;
    pub const LOOSE_SOURCE_ROUTING: u8 = 131;
    pub const STREAM_IDENTIFIER: u8 = 136;
    pub const STRICT_SOURCE_ROUTING: u8 = 137;
    pub const ROUTER_ALERT: u8 = 148;
}

/// Maximum bytes of options an IPv4 header can hold (60 - 20).
pub const MAXIMUM_OPTIONS_LENGTH: usize = 40;

const ROUTE_POINTER_BASE: u8 = 4;
const TIMESTAMP_POINTER_BASE: u8 = 5;

/// Layout of the Internet Timestamp option's entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IpV4OptionTimestampType {
    TimestampOnly,
    AddressAndTimestamp,
    AddressPrespecified,
}

impl IpV4OptionTimestampType {
    fn flag(self) -> u8 {
        match self {
            IpV4OptionTimestampType::TimestampOnly => 0,
            IpV4OptionTimestampType::AddressAndTimestamp => 1,
            IpV4OptionTimestampType::AddressPrespecified => 3,
        }
    }

    fn from_flag(flag: u8) -> Option<Self> {
        match flag {
            0 => Some(IpV4OptionTimestampType::TimestampOnly),
            1 => Some(IpV4OptionTimestampType::AddressAndTimestamp),
            3 => Some(IpV4OptionTimestampType::AddressPrespecified),
            _ => None,
        }
    }

    fn entry_length(self) -> usize {
        match self {
            IpV4OptionTimestampType::TimestampOnly => 4,
            _ => 8,
        }
    }
}

/// One slot of an Internet Timestamp option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpV4TimestampEntry {
    /// Absent for `TimestampOnly` options.
    pub address: Option<Ipv4Addr>,
    /// Milliseconds since midnight UT.
    pub timestamp: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IpV4Option {
    EndOfOptionList,
    NoOperation,
    /// RFC 1108 basic security.
    BasicSecurity {
        classification_level: u8,
        #[serde(with = "serde_bytes")]
        protection_authorities: Vec<u8>,
    },
    LooseSourceRouting {
        pointed_address_index: u8,
        route: Vec<Ipv4Addr>,
    },
    StrictSourceRouting {
        pointed_address_index: u8,
        route: Vec<Ipv4Addr>,
    },
    RecordRoute {
        pointed_address_index: u8,
        route: Vec<Ipv4Addr>,
    },
    StreamIdentifier(u16),
    InternetTimestamp {
        timestamp_type: IpV4OptionTimestampType,
        overflow: u8,
        pointed_index: u8,
        entries: Vec<IpV4TimestampEntry>,
    },
    /// RFC 1393 traceroute.
    TraceRoute {
        identification: u16,
        outbound_hop_count: u16,
        return_hop_count: u16,
        originator: Ipv4Addr,
    },
    RouterAlert(u16),
    /// RFC 4782 quick-start request or report.
    QuickStart {
        function: u8,
        rate: u8,
        ttl: u8,
        nonce: u32,
    },
    Unknown {
        option_type: u8,
        #[serde(with = "serde_bytes")]
        data: Vec<u8>,
    },
}

impl IpV4Option {
    pub fn option_type(&self) -> u8 {
        use option_type::*;
        match self {
            IpV4Option::EndOfOptionList => END_OF_OPTION_LIST,
            IpV4Option::NoOperation => NO_OPERATION,
            IpV4Option::BasicSecurity { .. } => BASIC_SECURITY,
            IpV4Option::LooseSourceRouting { .. } => LOOSE_SOURCE_ROUTING,
            IpV4Option::StrictSourceRouting { .. } => STRICT_SOURCE_ROUTING,
            IpV4Option::RecordRoute { .. } => RECORD_ROUTE,
            IpV4Option::StreamIdentifier(_) => STREAM_IDENTIFIER,
            IpV4Option::InternetTimestamp { .. } => INTERNET_TIMESTAMP,
            IpV4Option::TraceRoute { .. } => TRACE_ROUTE,
            IpV4Option::RouterAlert(_) => ROUTER_ALERT,
            IpV4Option::QuickStart { .. } => QUICK_START,
            IpV4Option::Unknown { option_type, .. } => *option_type,
        }
    }

    /// Encoded length including type and length bytes.
    pub fn length(&self) -> usize {
        match self {
            IpV4Option::EndOfOptionList | IpV4Option::NoOperation => 1,
            IpV4Option::BasicSecurity {
                protection_authorities,
                ..
            } => 3 + protection_authorities.len(),
            IpV4Option::LooseSourceRouting { route, .. }
            | IpV4Option::StrictSourceRouting { route, .. }
            | IpV4Option::RecordRoute { route, .. } => 3 + 4 * route.len(),
            IpV4Option::StreamIdentifier(_) => 4,
            IpV4Option::InternetTimestamp {
                timestamp_type,
                entries,
                ..
            } => 4 + timestamp_type.entry_length() * entries.len(),
            IpV4Option::TraceRoute { .. } => 12,
            IpV4Option::RouterAlert(_) => 4,
            IpV4Option::QuickStart { .. } => 8,
            IpV4Option::Unknown { data, .. } => 2 + data.len(),
        }
    }

    /// Whether a second occurrence makes the option list invalid.
    pub fn appears_at_most_once(&self) -> bool {
        !matches!(
            self,
            IpV4Option::EndOfOptionList | IpV4Option::NoOperation | IpV4Option::Unknown { .. }
        )
    }

    fn write(&self, buffer: &mut [u8], offset: &mut usize) -> Result<(), PacketError> {
        write_u8(buffer, offset, self.option_type());
        if matches!(self, IpV4Option::EndOfOptionList | IpV4Option::NoOperation) {
            return Ok(());
        }
        let length = u8::try_from(self.length()).map_err(|_| {
            PacketError::InvalidFieldValue(format!("IPv4 option {} too long", self.option_type()))
        })?;
        write_u8(buffer, offset, length);

        match self {
            IpV4Option::EndOfOptionList | IpV4Option::NoOperation => {}
            IpV4Option::BasicSecurity {
                classification_level,
                protection_authorities,
            } => {
                write_u8(buffer, offset, *classification_level);
                write_bytes(buffer, offset, protection_authorities);
            }
            IpV4Option::LooseSourceRouting {
                pointed_address_index,
                route,
            }
            | IpV4Option::StrictSourceRouting {
                pointed_address_index,
                route,
            }
            | IpV4Option::RecordRoute {
                pointed_address_index,
                route,
            } => {
                write_u8(buffer, offset, ROUTE_POINTER_BASE + 4 * pointed_address_index);
                for address in route {
                    write_ipv4(buffer, offset, *address);
                }
            }
            IpV4Option::StreamIdentifier(identifier) => {
                write_u16(buffer, offset, *identifier, Endianity::Big);
            }
            IpV4Option::InternetTimestamp {
                timestamp_type,
                overflow,
                pointed_index,
                entries,
            } => {
                let entry_length = timestamp_type.entry_length() as u8;
                write_u8(
                    buffer,
                    offset,
                    TIMESTAMP_POINTER_BASE + entry_length * pointed_index,
                );
                write_u8(buffer, offset, (*overflow << 4) | timestamp_type.flag());
                for entry in entries {
                    if *timestamp_type != IpV4OptionTimestampType::TimestampOnly {
                        write_ipv4(
                            buffer,
                            offset,
                            entry.address.unwrap_or(Ipv4Addr::UNSPECIFIED),
                        );
                    }
                    write_u32(buffer, offset, entry.timestamp, Endianity::Big);
                }
            }
            IpV4Option::TraceRoute {
                identification,
                outbound_hop_count,
                return_hop_count,
                originator,
            } => {
                write_u16(buffer, offset, *identification, Endianity::Big);
                write_u16(buffer, offset, *outbound_hop_count, Endianity::Big);
                write_u16(buffer, offset, *return_hop_count, Endianity::Big);
                write_ipv4(buffer, offset, *originator);
            }
            IpV4Option::RouterAlert(value) => write_u16(buffer, offset, *value, Endianity::Big),
            IpV4Option::QuickStart {
                function,
                rate,
                ttl,
                nonce,
            } => {
                write_u8(buffer, offset, (*function << 4) | (*rate & 0x0F));
                write_u8(buffer, offset, *ttl);
                write_u32(buffer, offset, *nonce, Endianity::Big);
            }
            IpV4Option::Unknown { data, .. } => write_bytes(buffer, offset, data),
        }
        Ok(())
    }

    /// Parses the value of a complex option; `None` when it is malformed.
    fn parse_value(option_type: u8, value: &[u8]) -> Option<IpV4Option> {
        use option_type::*;
        match option_type {
            BASIC_SECURITY => {
                let (&classification_level, rest) = value.split_first()?;
                Some(IpV4Option::BasicSecurity {
                    classification_level,
                    protection_authorities: rest.to_vec(),
                })
            }
            LOOSE_SOURCE_ROUTING | STRICT_SOURCE_ROUTING | RECORD_ROUTE => {
                let (&pointer, addresses) = value.split_first()?;
                if pointer < ROUTE_POINTER_BASE || addresses.len() % 4 != 0 {
                    return None;
                }
                let pointed_address_index = (pointer - ROUTE_POINTER_BASE) / 4;
                let route = addresses.chunks_exact(4).map(|a| read_ipv4(a, 0)).collect();
                Some(match option_type {
                    LOOSE_SOURCE_ROUTING => IpV4Option::LooseSourceRouting {
                        pointed_address_index,
                        route,
                    },
                    STRICT_SOURCE_ROUTING => IpV4Option::StrictSourceRouting {
                        pointed_address_index,
                        route,
                    },
                    _ => IpV4Option::RecordRoute {
                        pointed_address_index,
                        route,
                    },
                })
            }
            STREAM_IDENTIFIER if value.len() == 2 => Some(IpV4Option::StreamIdentifier(
                read_u16(value, 0, Endianity::Big),
            )),
            INTERNET_TIMESTAMP => {
                if value.len() < 2 {
                    return None;
                }
                let pointer = value[0];
                let timestamp_type = IpV4OptionTimestampType::from_flag(value[1] & 0x0F)?;
                let overflow = value[1] >> 4;
                let entry_length = timestamp_type.entry_length();
                let data = &value[2..];
                if pointer < TIMESTAMP_POINTER_BASE || data.len() % entry_length != 0 {
                    return None;
                }
                let pointed_index = (pointer - TIMESTAMP_POINTER_BASE) / entry_length as u8;
                let entries = data
                    .chunks_exact(entry_length)
                    .map(|chunk| match timestamp_type {
                        IpV4OptionTimestampType::TimestampOnly => IpV4TimestampEntry {
                            address: None,
                            timestamp: read_u32(chunk, 0, Endianity::Big),
                        },
                        _ => IpV4TimestampEntry {
                            address: Some(read_ipv4(chunk, 0)),
                            timestamp: read_u32(chunk, 4, Endianity::Big),
                        },
                    })
                    .collect();
                Some(IpV4Option::InternetTimestamp {
                    timestamp_type,
                    overflow,
                    pointed_index,
                    entries,
                })
            }
            TRACE_ROUTE if value.len() == 10 => Some(IpV4Option::TraceRoute {
                identification: read_u16(value, 0, Endianity::Big),
                outbound_hop_count: read_u16(value, 2, Endianity::Big),
                return_hop_count: read_u16(value, 4, Endianity::Big),
                originator: read_ipv4(value, 6),
            }),
            ROUTER_ALERT if value.len() == 2 => {
                Some(IpV4Option::RouterAlert(read_u16(value, 0, Endianity::Big)))
            }
            QUICK_START if value.len() == 6 => Some(IpV4Option::QuickStart {
                function: value[0] >> 4,
                rate: value[0] & 0x0F,
                ttl: value[1],
                nonce: read_u32(value, 2, Endianity::Big),
            }),
            STREAM_IDENTIFIER | TRACE_ROUTE | ROUTER_ALERT | QUICK_START => None,
            _ => Some(IpV4Option::Unknown {
                option_type,
                data: value.to_vec(),
            }),
        }
    }
}

/// An ordered IPv4 option list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpV4Options {
    options: Vec<IpV4Option>,
    #[serde(skip, default = "default_valid")]
    is_valid: bool,
}

fn default_valid() -> bool {
    true
}

impl IpV4Options {
    /// Creates an option list, appending End when padding will be needed.
    pub fn new(mut options: Vec<IpV4Option>) -> Self {
        let length: usize = options.iter().map(IpV4Option::length).sum();
        if length % 4 != 0 && options.last() != Some(&IpV4Option::EndOfOptionList) {
            options.push(IpV4Option::EndOfOptionList);
        }
        Self {
            options,
            is_valid: true,
        }
    }

    pub fn none() -> Self {
        Self::new(Vec::new())
    }

    pub fn options(&self) -> &[IpV4Option] {
        &self.options
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    /// False when parsing stopped on a malformed or repeated option.
    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    /// Encoded length, padded to a multiple of 4.
    pub fn bytes_length(&self) -> usize {
        let length: usize = self.options.iter().map(IpV4Option::length).sum();
        length.div_ceil(4) * 4
    }

    pub(crate) fn write(&self, buffer: &mut [u8], offset: &mut usize) -> Result<(), PacketError> {
        let end = *offset + self.bytes_length();
        for option in &self.options {
            option.write(buffer, offset)?;
        }
        // Padding bytes are End-of-Option-List (zero).
        buffer[*offset..end].fill(0);
        *offset = end;
        Ok(())
    }

    /// Parses the option area of an IPv4 header.
    pub fn parse(bytes: &[u8]) -> Self {
        let mut options: Vec<IpV4Option> = Vec::new();
        let mut is_valid = true;
        let mut position = 0;

        while position < bytes.len() {
            let option_type = bytes[position];
            position += 1;
            match option_type {
                option_type::END_OF_OPTION_LIST => {
                    options.push(IpV4Option::EndOfOptionList);
                    break;
                }
                option_type::NO_OPERATION => {
                    options.push(IpV4Option::NoOperation);
                    continue;
                }
                _ => {}
            }

            let Some(&length) = bytes.get(position) else {
                trace!("IPv4 option {option_type} missing its length byte");
                is_valid = false;
                break;
            };
            position += 1;
            let length = usize::from(length);
            if length < 2 || position + length - 2 > bytes.len() {
                trace!("IPv4 option {option_type} length {length} runs past the header");
                is_valid = false;
                break;
            }
            let value = &bytes[position..position + length - 2];
            position += length - 2;

            let Some(option) = IpV4Option::parse_value(option_type, value) else {
                trace!("IPv4 option {option_type} is malformed");
                is_valid = false;
                break;
            };
            if option.appears_at_most_once()
                && options.iter().any(|o| o.option_type() == option.option_type())
            {
                trace!("IPv4 option {option_type} appears twice");
                is_valid = false;
                break;
            }
            options.push(option);
        }

        Self { options, is_valid }
    }
}

impl From<Vec<IpV4Option>> for IpV4Options {
    fn from(options: Vec<IpV4Option>) -> Self {
        Self::new(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(options: &IpV4Options) -> Vec<u8> {
        let mut buffer = vec![0xEE; options.bytes_length()];
        let mut offset = 0;
        options.write(&mut buffer, &mut offset).unwrap();
        assert_eq!(offset, buffer.len());
        buffer
    }

    #[test]
    fn test_padding_appends_end() {
        let options = IpV4Options::new(vec![IpV4Option::NoOperation]);
        assert_eq!(
            options.options(),
            &[IpV4Option::NoOperation, IpV4Option::EndOfOptionList]
        );
        assert_eq!(options.bytes_length(), 4);
        assert_eq!(encode(&options), vec![1, 0, 0, 0]);
    }

    #[test]
    fn test_full_option_set_round_trip() {
        let options = IpV4Options::new(vec![
            IpV4Option::RecordRoute {
                pointed_address_index: 1,
                route: vec![Ipv4Addr::new(1, 2, 3, 4), Ipv4Addr::new(5, 6, 7, 8)],
            },
            IpV4Option::StreamIdentifier(0x1234),
            IpV4Option::InternetTimestamp {
                timestamp_type: IpV4OptionTimestampType::AddressAndTimestamp,
                overflow: 2,
                pointed_index: 0,
                entries: vec![IpV4TimestampEntry {
                    address: Some(Ipv4Addr::new(9, 9, 9, 9)),
                    timestamp: 1000,
                }],
            },
            IpV4Option::RouterAlert(0),
            IpV4Option::NoOperation,
        ]);
        let bytes = encode(&options);
        assert!(bytes.len() <= MAXIMUM_OPTIONS_LENGTH);
        let parsed = IpV4Options::parse(&bytes);
        assert!(parsed.is_valid());
        assert_eq!(parsed, options);
    }

    #[test]
    fn test_trace_route_and_quick_start() {
        let options = IpV4Options::new(vec![
            IpV4Option::TraceRoute {
                identification: 1,
                outbound_hop_count: 2,
                return_hop_count: 3,
                originator: Ipv4Addr::new(10, 0, 0, 1),
            },
            IpV4Option::QuickStart {
                function: 0,
                rate: 9,
                ttl: 20,
                nonce: 0x1000,
            },
        ]);
        let parsed = IpV4Options::parse(&encode(&options));
        assert_eq!(parsed, options);
    }

    #[test]
    fn test_option_running_past_header_stops_parsing() {
        let parsed = IpV4Options::parse(&[1, 136, 10, 0]);
        assert!(!parsed.is_valid());
        assert_eq!(parsed.options(), &[IpV4Option::NoOperation]);
    }

    #[test]
    fn test_duplicate_option_invalidates() {
        let parsed = IpV4Options::parse(&[136, 4, 0, 1, 136, 4, 0, 2]);
        assert!(!parsed.is_valid());
        assert_eq!(parsed.options(), &[IpV4Option::StreamIdentifier(1)]);
    }

    #[test]
    fn test_unknown_option_is_kept() {
        let parsed = IpV4Options::parse(&[200, 3, 7, 0]);
        assert!(parsed.is_valid());
        assert_eq!(
            parsed.options(),
            &[
                IpV4Option::Unknown {
                    option_type: 200,
                    data: vec![7]
                },
                IpV4Option::EndOfOptionList
            ]
        );
    }
}
