//! Mobile IPv6 mobility header (RFC 6275) and its options.

use std::net::Ipv6Addr;

use log::trace;
use serde::{Deserialize, Serialize};

use crate::bytes_ext::{Endianity, read_ipv6, read_u16, write_bytes, write_ipv6, write_u8, write_u16};

mod option_type {
    pub const PAD1: u8 = 0;
    pub const PAD_N: u8 = 1;
    pub const BINDING_REFRESH_ADVICE: u8 = 2;
    pub const ALTERNATE_CARE_OF_ADDRESS: u8 = 3;
    pub const NONCE_INDEXES: u8 = 4;
    pub const BINDING_AUTHORIZATION_DATA: u8 = 5;
}

/// Bytes before the message data: payload proto, length, type, reserved, checksum.
pub(crate) const FIXED_LENGTH: usize = 6;
pub(crate) const CHECKSUM_OFFSET: usize = 4;

/// Mobility header message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IpV6MobilityHeaderType(pub u8);

impl IpV6MobilityHeaderType {
    pub const BINDING_REFRESH_REQUEST: Self = Self(0);
    pub const HOME_TEST_INIT: Self = Self(1);
    pub const CARE_OF_TEST_INIT: Self = Self(2);
    pub const HOME_TEST: Self = Self(3);
    pub const CARE_OF_TEST: Self = Self(4);
    pub const BINDING_UPDATE: Self = Self(5);
    pub const BINDING_ACKNOWLEDGEMENT: Self = Self(6);
    pub const BINDING_ERROR: Self = Self(7);

    /// Length of the message-specific fields preceding the options, if known.
    pub fn message_data_length(self) -> Option<usize> {
        match self.0 {
            0 => Some(2),
            1 | 2 => Some(10),
            3 | 4 | 7 => Some(18),
            5 | 6 => Some(6),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IpV6MobilityOption {
    Pad1,
    PadN(u8),
    /// Refresh interval in units of 4 seconds.
    BindingRefreshAdvice(u16),
    AlternateCareOfAddress(Ipv6Addr),
    NonceIndexes {
        home_nonce_index: u16,
        care_of_nonce_index: u16,
    },
    BindingAuthorizationData(#[serde(with = "serde_bytes")] Vec<u8>),
    Unknown {
        option_type: u8,
        #[serde(with = "serde_bytes")]
        data: Vec<u8>,
    },
}

impl IpV6MobilityOption {
    pub fn option_type(&self) -> u8 {
        match self {
            IpV6MobilityOption::Pad1 => option_type::PAD1,
            IpV6MobilityOption::PadN(_) => option_type::PAD_N,
            IpV6MobilityOption::BindingRefreshAdvice(_) => option_type::BINDING_REFRESH_ADVICE,
            IpV6MobilityOption::AlternateCareOfAddress(_) => option_type::ALTERNATE_CARE_OF_ADDRESS,
            IpV6MobilityOption::NonceIndexes { .. } => option_type::NONCE_INDEXES,
            IpV6MobilityOption::BindingAuthorizationData(_) => {
                option_type::BINDING_AUTHORIZATION_DATA
            }
            IpV6MobilityOption::Unknown { option_type, .. } => *option_type,
        }
    }

    pub fn length(&self) -> usize {
        match self {
            IpV6MobilityOption::Pad1 => 1,
            IpV6MobilityOption::PadN(count) => 2 + usize::from(*count),
            IpV6MobilityOption::BindingRefreshAdvice(_) => 4,
            IpV6MobilityOption::AlternateCareOfAddress(_) => 18,
            IpV6MobilityOption::NonceIndexes { .. } => 6,
            IpV6MobilityOption::BindingAuthorizationData(data) => 2 + data.len(),
            IpV6MobilityOption::Unknown { data, .. } => 2 + data.len(),
        }
    }

    fn write(&self, buffer: &mut [u8], offset: &mut usize) {
        write_u8(buffer, offset, self.option_type());
        if *self == IpV6MobilityOption::Pad1 {
            return;
        }
        write_u8(buffer, offset, (self.length() - 2) as u8);
        match self {
            IpV6MobilityOption::Pad1 => {}
            IpV6MobilityOption::PadN(count) => {
                write_bytes(buffer, offset, &vec![0; usize::from(*count)])
            }
            IpV6MobilityOption::BindingRefreshAdvice(interval) => {
                write_u16(buffer, offset, *interval, Endianity::Big)
            }
            IpV6MobilityOption::AlternateCareOfAddress(address) => {
                write_ipv6(buffer, offset, *address)
            }
            IpV6MobilityOption::NonceIndexes {
                home_nonce_index,
                care_of_nonce_index,
            } => {
                write_u16(buffer, offset, *home_nonce_index, Endianity::Big);
                write_u16(buffer, offset, *care_of_nonce_index, Endianity::Big);
            }
            IpV6MobilityOption::BindingAuthorizationData(data)
            | IpV6MobilityOption::Unknown { data, .. } => write_bytes(buffer, offset, data),
        }
    }

    fn parse_value(option_type: u8, value: &[u8]) -> Option<IpV6MobilityOption> {
        use option_type::*;
        match option_type {
            PAD_N => Some(IpV6MobilityOption::PadN(value.len() as u8)),
            BINDING_REFRESH_ADVICE => (value.len() == 2).then(|| {
                IpV6MobilityOption::BindingRefreshAdvice(read_u16(value, 0, Endianity::Big))
            }),
            ALTERNATE_CARE_OF_ADDRESS => (value.len() == 16)
                .then(|| IpV6MobilityOption::AlternateCareOfAddress(read_ipv6(value, 0))),
            NONCE_INDEXES => (value.len() == 4).then(|| IpV6MobilityOption::NonceIndexes {
                home_nonce_index: read_u16(value, 0, Endianity::Big),
                care_of_nonce_index: read_u16(value, 2, Endianity::Big),
            }),
            BINDING_AUTHORIZATION_DATA => {
                Some(IpV6MobilityOption::BindingAuthorizationData(value.to_vec()))
            }
            _ => Some(IpV6MobilityOption::Unknown {
                option_type,
                data: value.to_vec(),
            }),
        }
    }
}

/// A mobility header: message type, message fields and options.
///
/// `checksum: None` lets the enclosing IPv6 layer compute it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpV6MobilityHeader {
    pub message_type: IpV6MobilityHeaderType,
    pub checksum: Option<u16>,
    #[serde(with = "serde_bytes")]
    message_data: Vec<u8>,
    options: Vec<IpV6MobilityOption>,
    #[serde(skip, default = "default_valid")]
    options_valid: bool,
}

fn default_valid() -> bool {
    true
}

impl IpV6MobilityHeader {
    /// Creates a header, padding the options so the whole header is a multiple of 8 bytes.
    pub fn new(
        message_type: IpV6MobilityHeaderType,
        message_data: Vec<u8>,
        mut options: Vec<IpV6MobilityOption>,
    ) -> Self {
        let length = FIXED_LENGTH
            + message_data.len()
            + options.iter().map(IpV6MobilityOption::length).sum::<usize>();
        match (8 - length % 8) % 8 {
            0 => {}
            1 => options.push(IpV6MobilityOption::Pad1),
            n => options.push(IpV6MobilityOption::PadN((n - 2) as u8)),
        }
        Self {
            message_type,
            checksum: None,
            message_data,
            options,
            options_valid: true,
        }
    }

    pub fn message_data(&self) -> &[u8] {
        &self.message_data
    }

    pub fn options(&self) -> &[IpV6MobilityOption] {
        &self.options
    }

    pub fn are_options_valid(&self) -> bool {
        self.options_valid
    }

    pub fn length(&self) -> usize {
        FIXED_LENGTH
            + self.message_data.len()
            + self
                .options
                .iter()
                .map(IpV6MobilityOption::length)
                .sum::<usize>()
    }

    /// Writes everything after the payload proto and length bytes.
    pub(crate) fn write_body(&self, buffer: &mut [u8], offset: &mut usize) {
        write_u8(buffer, offset, self.message_type.0);
        write_u8(buffer, offset, 0);
        write_u16(buffer, offset, self.checksum.unwrap_or(0), Endianity::Big);
        write_bytes(buffer, offset, &self.message_data);
        for option in &self.options {
            option.write(buffer, offset);
        }
    }

    /// Parses a whole mobility header, starting at its payload proto byte.
    pub(crate) fn parse(bytes: &[u8]) -> Self {
        let message_type = IpV6MobilityHeaderType(bytes.get(2).copied().unwrap_or(0));
        let checksum = read_u16(bytes, CHECKSUM_OFFSET, Endianity::Big);
        let body = bytes.get(FIXED_LENGTH..).unwrap_or(&[]);
        let data_length = message_type
            .message_data_length()
            .unwrap_or(body.len())
            .min(body.len());
        let (message_data, option_bytes) = body.split_at(data_length);
        let (options, options_valid) = parse_options(option_bytes);
        Self {
            message_type,
            checksum: Some(checksum),
            message_data: message_data.to_vec(),
            options,
            options_valid,
        }
    }
}

fn parse_options(bytes: &[u8]) -> (Vec<IpV6MobilityOption>, bool) {
    let mut options = Vec::new();
    let mut position = 0;
    while position < bytes.len() {
        let option_type = bytes[position];
        if option_type == option_type::PAD1 {
            options.push(IpV6MobilityOption::Pad1);
            position += 1;
            continue;
        }
        let Some(&length) = bytes.get(position + 1) else {
            trace!("mobility option {option_type} truncated");
            return (options, false);
        };
        let end = position + 2 + usize::from(length);
        let Some(value) = bytes.get(position + 2..end) else {
            trace!("mobility option {option_type} runs past the header");
            return (options, false);
        };
        match IpV6MobilityOption::parse_value(option_type, value) {
            Some(option) => options.push(option),
            None => return (options, false),
        }
        position = end;
    }
    (options, true)
}
