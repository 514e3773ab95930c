//! TCP header options.

use log::trace;
use serde::{Deserialize, Serialize};

use crate::PacketError;
use crate::bytes_ext::{Endianity, read_u16, read_u32, write_bytes, write_u8, write_u16, write_u32};

/// TCP option kinds.
pub mod option_kind {
    pub const END_OF_OPTION_LIST: u8 = 0;
    pub const NO_OPERATION: u8 = 1;
    pub const MAXIMUM_SEGMENT_SIZE: u8 = 2;
    pub const WINDOW_SCALE: u8 = 3;
    pub const SELECTIVE_ACKNOWLEDGMENT_PERMITTED: u8 = 4;
    pub const SELECTIVE_ACKNOWLEDGMENT: u8 = 5;
    pub const ECHO: u8 = 6;
    pub const ECHO_REPLY: u8 = 7;
    pub const TIMESTAMP: u8 = 8;
    pub const PARTIAL_ORDER_CONNECTION_PERMITTED: u8 = 9;
    pub const PARTIAL_ORDER_SERVICE_PROFILE: u8 = 10;
    pub const CONNECTION_COUNT: u8 = 11;
    pub const CONNECTION_COUNT_NEW: u8 = 12;
    pub const CONNECTION_COUNT_ECHO: u8 = 13;
    pub const ALTERNATE_CHECKSUM_REQUEST: u8 = 14;
    pub const ALTERNATE_CHECKSUM_DATA: u8 = 15;
    pub const MD5_SIGNATURE: u8 = 19;
    pub const MOOD: u8 = 25;
    pub const QUICK_START_RESPONSE: u8 = 27;
    pub const USER_TIMEOUT: u8 = 28;
    pub const AUTHENTICATION: u8 = 29;
}

pub const MAXIMUM_OPTIONS_LENGTH: usize = 40;

const PARTIAL_ORDER_START: u8 = 0x80;
const PARTIAL_ORDER_END: u8 = 0x40;
const USER_TIMEOUT_MINUTES: u16 = 0x8000;

/// A selective acknowledgment block: the edges of a received range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpSelectiveAcknowledgmentBlock {
    pub left_edge: u32,
    pub right_edge: u32,
}

/// Emotions of the (April 1st) mood option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TcpOptionMoodEmotion {
    Happy,
    Sad,
    Amused,
    Confused,
    Bored,
    Surprised,
    Silly,
    Frustrated,
    Angry,
    Apathetic,
    Sneaky,
    Evil,
}

impl TcpOptionMoodEmotion {
    const ALL: [TcpOptionMoodEmotion; 12] = [
        TcpOptionMoodEmotion::Happy,
        TcpOptionMoodEmotion::Sad,
        TcpOptionMoodEmotion::Amused,
        TcpOptionMoodEmotion::Confused,
        TcpOptionMoodEmotion::Bored,
        TcpOptionMoodEmotion::Surprised,
        TcpOptionMoodEmotion::Silly,
        TcpOptionMoodEmotion::Frustrated,
        TcpOptionMoodEmotion::Angry,
        TcpOptionMoodEmotion::Apathetic,
        TcpOptionMoodEmotion::Sneaky,
        TcpOptionMoodEmotion::Evil,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TcpOptionMoodEmotion::Happy => ":)",
            TcpOptionMoodEmotion::Sad => ":(",
            TcpOptionMoodEmotion::Amused => ":D",
            TcpOptionMoodEmotion::Confused => "%(",
            TcpOptionMoodEmotion::Bored => ":o",
            TcpOptionMoodEmotion::Surprised => ":O",
            TcpOptionMoodEmotion::Silly => ":P",
            TcpOptionMoodEmotion::Frustrated => ":@",
            TcpOptionMoodEmotion::Angry => ">:@",
            TcpOptionMoodEmotion::Apathetic => ":|",
            TcpOptionMoodEmotion::Sneaky => ";)",
            TcpOptionMoodEmotion::Evil => ">:)",
        }
    }

    fn from_bytes(bytes: &[u8]) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|emotion| emotion.as_str().as_bytes() == bytes)
    }
}

/// TCP Header Options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TcpOption {
    EndOfOptionList,
    NoOperation,
    MaximumSegmentSize(u16),
    WindowScale(u8),
    SelectiveAcknowledgmentPermitted,
    SelectiveAcknowledgment(Vec<TcpSelectiveAcknowledgmentBlock>),
    Echo(u32),
    EchoReply(u32),
    Timestamp {
        value: u32,
        echo_reply: u32,
    },
    PartialOrderConnectionPermitted,
    PartialOrderServiceProfile {
        is_start: bool,
        is_end: bool,
    },
    ConnectionCount(u32),
    ConnectionCountNew(u32),
    ConnectionCountEcho(u32),
    AlternateChecksumRequest(u8),
    AlternateChecksumData(#[serde(with = "serde_bytes")] Vec<u8>),
    Md5Signature([u8; 16]),
    Mood(TcpOptionMoodEmotion),
    QuickStartResponse {
        rate: u8,
        ttl_difference: u8,
        /// 30-bit nonce.
        nonce: u32,
    },
    UserTimeout {
        in_minutes: bool,
        timeout: u16,
    },
    /// TCP-AO (RFC 5925).
    Authentication {
        key_id: u8,
        receive_next_key_id: u8,
        #[serde(with = "serde_bytes")]
        message_authentication_code: Vec<u8>,
    },
    Unknown {
        kind: u8,
        #[serde(with = "serde_bytes")]
        data: Vec<u8>,
    },
}

impl TcpOption {
    pub fn kind(&self) -> u8 {
        use option_kind::*;
        match self {
            TcpOption::EndOfOptionList => END_OF_OPTION_LIST,
            TcpOption::NoOperation => NO_OPERATION,
            TcpOption::MaximumSegmentSize(_) => MAXIMUM_SEGMENT_SIZE,
            TcpOption::WindowScale(_) => WINDOW_SCALE,
            TcpOption::SelectiveAcknowledgmentPermitted => SELECTIVE_ACKNOWLEDGMENT_PERMITTED,
            TcpOption::SelectiveAcknowledgment(_) => SELECTIVE_ACKNOWLEDGMENT,
            TcpOption::Echo(_) => ECHO,
            TcpOption::EchoReply(_) => ECHO_REPLY,
            TcpOption::Timestamp { .. } => TIMESTAMP,
            TcpOption::PartialOrderConnectionPermitted => PARTIAL_ORDER_CONNECTION_PERMITTED,
            TcpOption::PartialOrderServiceProfile { .. } => PARTIAL_ORDER_SERVICE_PROFILE,
            TcpOption::ConnectionCount(_) => CONNECTION_COUNT,
            TcpOption::ConnectionCountNew(_) => CONNECTION_COUNT_NEW,
            TcpOption::ConnectionCountEcho(_) => CONNECTION_COUNT_ECHO,
            TcpOption::AlternateChecksumRequest(_) => ALTERNATE_CHECKSUM_REQUEST,
            TcpOption::AlternateChecksumData(_) => ALTERNATE_CHECKSUM_DATA,
            TcpOption::Md5Signature(_) => MD5_SIGNATURE,
            TcpOption::Mood(_) => MOOD,
            TcpOption::QuickStartResponse { .. } => QUICK_START_RESPONSE,
            TcpOption::UserTimeout { .. } => USER_TIMEOUT,
            TcpOption::Authentication { .. } => AUTHENTICATION,
            TcpOption::Unknown { kind, .. } => *kind,
        }
    }

    pub fn length(&self) -> usize {
        match self {
            TcpOption::EndOfOptionList | TcpOption::NoOperation => 1,
            TcpOption::SelectiveAcknowledgmentPermitted
            | TcpOption::PartialOrderConnectionPermitted => 2,
            TcpOption::WindowScale(_)
            | TcpOption::PartialOrderServiceProfile { .. }
            | TcpOption::AlternateChecksumRequest(_) => 3,
            TcpOption::MaximumSegmentSize(_) | TcpOption::UserTimeout { .. } => 4,
            TcpOption::Echo(_)
            | TcpOption::EchoReply(_)
            | TcpOption::ConnectionCount(_)
            | TcpOption::ConnectionCountNew(_)
            | TcpOption::ConnectionCountEcho(_) => 6,
            TcpOption::QuickStartResponse { .. } => 8,
            TcpOption::Timestamp { .. } => 10,
            TcpOption::Md5Signature(_) => 18,
            TcpOption::SelectiveAcknowledgment(blocks) => 2 + 8 * blocks.len(),
            TcpOption::AlternateChecksumData(data) | TcpOption::Unknown { data, .. } => {
                2 + data.len()
            }
            TcpOption::Mood(emotion) => 2 + emotion.as_str().len(),
            TcpOption::Authentication {
                message_authentication_code,
                ..
            } => 4 + message_authentication_code.len(),
        }
    }

    /// Options that may appear at most once in a header.
    pub fn appears_at_most_once(&self) -> bool {
        !matches!(
            self,
            TcpOption::EndOfOptionList | TcpOption::NoOperation | TcpOption::Unknown { .. }
        )
    }

    fn write(&self, buffer: &mut [u8], offset: &mut usize) -> Result<(), PacketError> {
        write_u8(buffer, offset, self.kind());
        if self.length() == 1 {
            return Ok(());
        }
        let length = u8::try_from(self.length()).map_err(|_| PacketError::InvalidLength)?;
        write_u8(buffer, offset, length);
        match self {
            TcpOption::EndOfOptionList
            | TcpOption::NoOperation
            | TcpOption::SelectiveAcknowledgmentPermitted
            | TcpOption::PartialOrderConnectionPermitted => {}
            TcpOption::MaximumSegmentSize(size) => write_u16(buffer, offset, *size, Endianity::Big),
            TcpOption::WindowScale(shift) => write_u8(buffer, offset, *shift),
            TcpOption::SelectiveAcknowledgment(blocks) => {
                for block in blocks {
                    write_u32(buffer, offset, block.left_edge, Endianity::Big);
                    write_u32(buffer, offset, block.right_edge, Endianity::Big);
                }
            }
            TcpOption::Echo(value)
            | TcpOption::EchoReply(value)
            | TcpOption::ConnectionCount(value)
            | TcpOption::ConnectionCountNew(value)
            | TcpOption::ConnectionCountEcho(value) => {
                write_u32(buffer, offset, *value, Endianity::Big)
            }
            TcpOption::Timestamp { value, echo_reply } => {
                write_u32(buffer, offset, *value, Endianity::Big);
                write_u32(buffer, offset, *echo_reply, Endianity::Big);
            }
            TcpOption::PartialOrderServiceProfile { is_start, is_end } => {
                let mut flags = 0;
                if *is_start {
                    flags |= PARTIAL_ORDER_START;
                }
                if *is_end {
                    flags |= PARTIAL_ORDER_END;
                }
                write_u8(buffer, offset, flags);
            }
            TcpOption::AlternateChecksumRequest(checksum_type) => {
                write_u8(buffer, offset, *checksum_type)
            }
            TcpOption::Md5Signature(digest) => write_bytes(buffer, offset, digest),
            TcpOption::Mood(emotion) => write_bytes(buffer, offset, emotion.as_str().as_bytes()),
            TcpOption::QuickStartResponse {
                rate,
                ttl_difference,
                nonce,
            } => {
                write_u8(buffer, offset, *rate & 0x0F);
                write_u8(buffer, offset, *ttl_difference);
                write_u32(buffer, offset, *nonce << 2, Endianity::Big);
            }
            TcpOption::UserTimeout {
                in_minutes,
                timeout,
            } => {
                if *timeout > !USER_TIMEOUT_MINUTES {
                    return Err(PacketError::InvalidFieldValue(format!(
                        "TCP user timeout {timeout} exceeds 15 bits"
                    )));
                }
                let mut value = *timeout;
                if *in_minutes {
                    value |= USER_TIMEOUT_MINUTES;
                }
                write_u16(buffer, offset, value, Endianity::Big);
            }
            TcpOption::Authentication {
                key_id,
                receive_next_key_id,
                message_authentication_code,
            } => {
                write_u8(buffer, offset, *key_id);
                write_u8(buffer, offset, *receive_next_key_id);
                write_bytes(buffer, offset, message_authentication_code);
            }
            TcpOption::AlternateChecksumData(data) | TcpOption::Unknown { data, .. } => {
                write_bytes(buffer, offset, data)
            }
        }
        Ok(())
    }

    fn parse_value(kind: u8, value: &[u8]) -> Option<TcpOption> {
        use option_kind::*;
        let exact = |length: usize| value.len() == length;
        match kind {
            MAXIMUM_SEGMENT_SIZE if exact(2) => {
                Some(TcpOption::MaximumSegmentSize(read_u16(value, 0, Endianity::Big)))
            }
            WINDOW_SCALE if exact(1) => Some(TcpOption::WindowScale(value[0])),
            SELECTIVE_ACKNOWLEDGMENT_PERMITTED if exact(0) => {
                Some(TcpOption::SelectiveAcknowledgmentPermitted)
            }
            SELECTIVE_ACKNOWLEDGMENT if value.len() % 8 == 0 => {
                Some(TcpOption::SelectiveAcknowledgment(
                    value
                        .chunks_exact(8)
                        .map(|block| TcpSelectiveAcknowledgmentBlock {
                            left_edge: read_u32(block, 0, Endianity::Big),
                            right_edge: read_u32(block, 4, Endianity::Big),
                        })
                        .collect(),
                ))
            }
            ECHO if exact(4) => Some(TcpOption::Echo(read_u32(value, 0, Endianity::Big))),
            ECHO_REPLY if exact(4) => Some(TcpOption::EchoReply(read_u32(value, 0, Endianity::Big))),
            TIMESTAMP if exact(8) => Some(TcpOption::Timestamp {
                value: read_u32(value, 0, Endianity::Big),
                echo_reply: read_u32(value, 4, Endianity::Big),
            }),
            PARTIAL_ORDER_CONNECTION_PERMITTED if exact(0) => {
                Some(TcpOption::PartialOrderConnectionPermitted)
            }
            PARTIAL_ORDER_SERVICE_PROFILE if exact(1) => {
                Some(TcpOption::PartialOrderServiceProfile {
                    is_start: value[0] & PARTIAL_ORDER_START != 0,
                    is_end: value[0] & PARTIAL_ORDER_END != 0,
                })
            }
            CONNECTION_COUNT if exact(4) => {
                Some(TcpOption::ConnectionCount(read_u32(value, 0, Endianity::Big)))
            }
            CONNECTION_COUNT_NEW if exact(4) => {
                Some(TcpOption::ConnectionCountNew(read_u32(value, 0, Endianity::Big)))
            }
            CONNECTION_COUNT_ECHO if exact(4) => {
                Some(TcpOption::ConnectionCountEcho(read_u32(value, 0, Endianity::Big)))
            }
            ALTERNATE_CHECKSUM_REQUEST if exact(1) => {
                Some(TcpOption::AlternateChecksumRequest(value[0]))
            }
            ALTERNATE_CHECKSUM_DATA => Some(TcpOption::AlternateChecksumData(value.to_vec())),
            MD5_SIGNATURE => value.try_into().ok().map(TcpOption::Md5Signature),
            MOOD => TcpOptionMoodEmotion::from_bytes(value).map(TcpOption::Mood),
            QUICK_START_RESPONSE if exact(6) => Some(TcpOption::QuickStartResponse {
                rate: value[0] & 0x0F,
                ttl_difference: value[1],
                nonce: read_u32(value, 2, Endianity::Big) >> 2,
            }),
            USER_TIMEOUT if exact(2) => {
                let raw = read_u16(value, 0, Endianity::Big);
                Some(TcpOption::UserTimeout {
                    in_minutes: raw & USER_TIMEOUT_MINUTES != 0,
                    timeout: raw & !USER_TIMEOUT_MINUTES,
                })
            }
            AUTHENTICATION if value.len() >= 2 => Some(TcpOption::Authentication {
                key_id: value[0],
                receive_next_key_id: value[1],
                message_authentication_code: value[2..].to_vec(),
            }),
            MAXIMUM_SEGMENT_SIZE
            | WINDOW_SCALE
            | SELECTIVE_ACKNOWLEDGMENT_PERMITTED
            | SELECTIVE_ACKNOWLEDGMENT
            | ECHO
            | ECHO_REPLY
            | TIMESTAMP
            | PARTIAL_ORDER_CONNECTION_PERMITTED
            | PARTIAL_ORDER_SERVICE_PROFILE
            | CONNECTION_COUNT
            | CONNECTION_COUNT_NEW
            | CONNECTION_COUNT_ECHO
            | ALTERNATE_CHECKSUM_REQUEST
            | QUICK_START_RESPONSE
            | USER_TIMEOUT
            | AUTHENTICATION => None,
            _ => Some(TcpOption::Unknown {
                kind,
                data: value.to_vec(),
            }),
        }
    }
}

/// The option area of a TCP header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpOptions {
    options: Vec<TcpOption>,
    #[serde(skip, default = "default_valid")]
    is_valid: bool,
}

fn default_valid() -> bool {
    true
}

impl Default for TcpOptions {
    fn default() -> Self {
        Self::none()
    }
}

impl From<Vec<TcpOption>> for TcpOptions {
    fn from(options: Vec<TcpOption>) -> Self {
        Self::new(options)
    }
}

impl TcpOptions {
    /// Creates an option list, appending End when padding will be needed.
    pub fn new(mut options: Vec<TcpOption>) -> Self {
        let length: usize = options.iter().map(TcpOption::length).sum();
        if length % 4 != 0 && options.last() != Some(&TcpOption::EndOfOptionList) {
            options.push(TcpOption::EndOfOptionList);
        }
        Self {
            options,
            is_valid: true,
        }
    }

    pub fn none() -> Self {
        Self {
            options: Vec::new(),
            is_valid: true,
        }
    }

    pub fn options(&self) -> &[TcpOption] {
        &self.options
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    /// Encoded length, padded to a multiple of 4.
    pub fn bytes_length(&self) -> usize {
        let length: usize = self.options.iter().map(TcpOption::length).sum();
        length.div_ceil(4) * 4
    }

    pub(crate) fn write(&self, buffer: &mut [u8], offset: &mut usize) -> Result<(), PacketError> {
        let end = *offset + self.bytes_length();
        for option in &self.options {
            option.write(buffer, offset)?;
        }
        buffer[*offset..end].fill(0);
        *offset = end;
        Ok(())
    }

    /// Parses the option area of a TCP header.
    pub fn parse(bytes: &[u8]) -> Self {
        let mut options: Vec<TcpOption> = Vec::new();
        let mut is_valid = true;
        let mut position = 0;

        while position < bytes.len() {
            let kind = bytes[position];
            match kind {
                option_kind::END_OF_OPTION_LIST => {
                    options.push(TcpOption::EndOfOptionList);
                    break;
                }
                option_kind::NO_OPERATION => {
                    options.push(TcpOption::NoOperation);
                    position += 1;
                    continue;
                }
                _ => {}
            }
            let Some(&length) = bytes.get(position + 1) else {
                trace!("TCP option {kind} truncated before its length");
                is_valid = false;
                break;
            };
            let length = usize::from(length);
            if length < 2 || position + length > bytes.len() {
                trace!("TCP option {kind} has a bad length {length}");
                is_valid = false;
                break;
            }
            let Some(option) = TcpOption::parse_value(kind, &bytes[position + 2..position + length])
            else {
                trace!("TCP option {kind} value malformed");
                is_valid = false;
                break;
            };
            if option.appears_at_most_once()
                && options.iter().any(|seen| seen.kind() == option.kind())
            {
                trace!("TCP option {kind} repeated");
                is_valid = false;
                break;
            }
            options.push(option);
            position += length;
        }

        Self { options, is_valid }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(options: Vec<TcpOption>) -> TcpOptions {
        let options = TcpOptions::new(options);
        let mut buffer = vec![0xEE; options.bytes_length()];
        let mut offset = 0;
        options.write(&mut buffer, &mut offset).unwrap();
        assert_eq!(offset, buffer.len());
        TcpOptions::parse(&buffer)
    }

    #[test]
    fn test_common_options_round_trip() {
        let options = vec![
            TcpOption::MaximumSegmentSize(1460),
            TcpOption::SelectiveAcknowledgmentPermitted,
            TcpOption::Timestamp {
                value: 1,
                echo_reply: 2,
            },
            TcpOption::NoOperation,
            TcpOption::WindowScale(7),
        ];
        let parsed = round_trip(options.clone());
        assert!(parsed.is_valid());
        assert_eq!(parsed, TcpOptions::new(options));
        assert_eq!(parsed.bytes_length(), 20);
    }

    #[test]
    fn test_rare_options_round_trip() {
        let options = vec![
            TcpOption::SelectiveAcknowledgment(vec![TcpSelectiveAcknowledgmentBlock {
                left_edge: 100,
                right_edge: 200,
            }]),
            TcpOption::PartialOrderServiceProfile {
                is_start: true,
                is_end: false,
            },
            TcpOption::Mood(TcpOptionMoodEmotion::Evil),
            TcpOption::QuickStartResponse {
                rate: 5,
                ttl_difference: 3,
                nonce: 0x3FFF_FFFF,
            },
            TcpOption::UserTimeout {
                in_minutes: true,
                timeout: 300,
            },
        ];
        let parsed = round_trip(options.clone());
        assert!(parsed.is_valid());
        assert_eq!(parsed, TcpOptions::new(options));
    }

    #[test]
    fn test_md5_and_connection_count() {
        let options = vec![
            TcpOption::Md5Signature([7; 16]),
            TcpOption::ConnectionCountNew(9),
            TcpOption::AlternateChecksumData(vec![1, 2, 3]),
        ];
        let parsed = round_trip(options.clone());
        assert_eq!(parsed, TcpOptions::new(options));
    }

    #[test]
    fn test_authentication_option() {
        let option = TcpOption::Authentication {
            key_id: 3,
            receive_next_key_id: 4,
            message_authentication_code: vec![0xAA; 12],
        };
        assert_eq!(option.length(), 16);
        assert_eq!(option.kind(), option_kind::AUTHENTICATION);
        let parsed = round_trip(vec![option.clone()]);
        assert!(parsed.is_valid());
        assert_eq!(parsed.options(), &[option]);

        assert_eq!(TcpOption::parse_value(option_kind::AUTHENTICATION, &[3]), None);
    }

    #[test]
    fn test_duplicate_option_stops_parse() {
        let bytes = [3, 3, 1, 3, 3, 2, 0, 0];
        let parsed = TcpOptions::parse(&bytes);
        assert!(!parsed.is_valid());
        assert_eq!(parsed.options(), &[TcpOption::WindowScale(1)]);
    }

    #[test]
    fn test_length_past_end_stops_parse() {
        let parsed = TcpOptions::parse(&[2, 8, 5, 180]);
        assert!(!parsed.is_valid());
        assert!(parsed.is_empty());
    }
}
