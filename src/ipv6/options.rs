//! TLV options carried by Hop-by-Hop and Destination Options headers.

use log::trace;
use serde::{Deserialize, Serialize};

use crate::bytes_ext::{Endianity, read_u16, read_u32, write_bytes, write_u8, write_u16, write_u32};

mod option_type {
    pub const PAD1: u8 = 0;
    pub const PAD_N: u8 = 1;
    pub const TUNNEL_ENCAPSULATION_LIMIT: u8 = 4;
    pub const ROUTER_ALERT: u8 = 5;
    pub const JUMBO_PAYLOAD: u8 = 0xC2;
}

/// An option inside a Hop-by-Hop or Destination Options header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IpV6Option {
    Pad1,
    /// Padding with the given number of zero data bytes.
    PadN(u8),
    JumboPayload(u32),
    RouterAlert(u16),
    TunnelEncapsulationLimit(u8),
    Unknown {
        option_type: u8,
        #[serde(with = "serde_bytes")]
        data: Vec<u8>,
    },
}

impl IpV6Option {
    pub fn option_type(&self) -> u8 {
        match self {
            IpV6Option::Pad1 => option_type::PAD1,
            IpV6Option::PadN(_) => option_type::PAD_N,
            IpV6Option::JumboPayload(_) => option_type::JUMBO_PAYLOAD,
            IpV6Option::RouterAlert(_) => option_type::ROUTER_ALERT,
            IpV6Option::TunnelEncapsulationLimit(_) => option_type::TUNNEL_ENCAPSULATION_LIMIT,
            IpV6Option::Unknown { option_type, .. } => *option_type,
        }
    }

    pub fn length(&self) -> usize {
        match self {
            IpV6Option::Pad1 => 1,
            IpV6Option::PadN(count) => 2 + usize::from(*count),
            IpV6Option::JumboPayload(_) => 6,
            IpV6Option::RouterAlert(_) => 4,
            IpV6Option::TunnelEncapsulationLimit(_) => 3,
            IpV6Option::Unknown { data, .. } => 2 + data.len(),
        }
    }

    /// The padding option that fills `count` bytes.
    fn padding(count: usize) -> Option<IpV6Option> {
        match count {
            0 => None,
            1 => Some(IpV6Option::Pad1),
            n => Some(IpV6Option::PadN((n - 2) as u8)),
        }
    }

    fn write(&self, buffer: &mut [u8], offset: &mut usize) {
        write_u8(buffer, offset, self.option_type());
        if *self == IpV6Option::Pad1 {
            return;
        }
        write_u8(buffer, offset, (self.length() - 2) as u8);
        match self {
            IpV6Option::Pad1 => {}
            IpV6Option::PadN(count) => {
                write_bytes(buffer, offset, &vec![0; usize::from(*count)]);
            }
            IpV6Option::JumboPayload(length) => write_u32(buffer, offset, *length, Endianity::Big),
            IpV6Option::RouterAlert(value) => write_u16(buffer, offset, *value, Endianity::Big),
            IpV6Option::TunnelEncapsulationLimit(limit) => write_u8(buffer, offset, *limit),
            IpV6Option::Unknown { data, .. } => write_bytes(buffer, offset, data),
        }
    }

    fn parse_value(option_type: u8, value: &[u8]) -> Option<IpV6Option> {
        match option_type {
            option_type::PAD_N => Some(IpV6Option::PadN(value.len() as u8)),
            option_type::JUMBO_PAYLOAD if value.len() == 4 => {
                Some(IpV6Option::JumboPayload(read_u32(value, 0, Endianity::Big)))
            }
            option_type::ROUTER_ALERT if value.len() == 2 => {
                Some(IpV6Option::RouterAlert(read_u16(value, 0, Endianity::Big)))
            }
            option_type::TUNNEL_ENCAPSULATION_LIMIT if value.len() == 1 => {
                Some(IpV6Option::TunnelEncapsulationLimit(value[0]))
            }
            option_type::JUMBO_PAYLOAD
            | option_type::ROUTER_ALERT
            | option_type::TUNNEL_ENCAPSULATION_LIMIT => None,
            _ => Some(IpV6Option::Unknown {
                option_type,
                data: value.to_vec(),
            }),
        }
    }
}

/// Options of one Hop-by-Hop or Destination Options header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpV6Options {
    options: Vec<IpV6Option>,
    #[serde(skip, default = "default_valid")]
    is_valid: bool,
}

fn default_valid() -> bool {
    true
}

impl Default for IpV6Options {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl IpV6Options {
    /// Creates an option list padded so that the enclosing header is a multiple of 8 bytes.
    pub fn new(mut options: Vec<IpV6Option>) -> Self {
        let length: usize = options.iter().map(IpV6Option::length).sum();
        if let Some(padding) = IpV6Option::padding((8 - (length + 2) % 8) % 8) {
            options.push(padding);
        }
        Self {
            options,
            is_valid: true,
        }
    }

    pub fn options(&self) -> &[IpV6Option] {
        &self.options
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    pub fn bytes_length(&self) -> usize {
        self.options.iter().map(IpV6Option::length).sum()
    }

    pub(crate) fn write(&self, buffer: &mut [u8], offset: &mut usize) {
        for option in &self.options {
            option.write(buffer, offset);
        }
    }

    pub fn parse(bytes: &[u8]) -> Self {
        let mut options = Vec::new();
        let mut is_valid = true;
        let mut position = 0;

        while position < bytes.len() {
            let option_type = bytes[position];
            if option_type == option_type::PAD1 {
                options.push(IpV6Option::Pad1);
                position += 1;
                continue;
            }
            let Some(&length) = bytes.get(position + 1) else {
                trace!("IPv6 option {option_type} truncated before its length");
                is_valid = false;
                break;
            };
            let start = position + 2;
            let end = start + usize::from(length);
            if end > bytes.len() {
                trace!("IPv6 option {option_type} runs past the header");
                is_valid = false;
                break;
            }
            match IpV6Option::parse_value(option_type, &bytes[start..end]) {
                Some(option) => options.push(option),
                None => {
                    trace!("IPv6 option {option_type} has a bad length {length}");
                    is_valid = false;
                    break;
                }
            }
            position = end;
        }

        Self { options, is_valid }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_pads_to_eight() {
        let options = IpV6Options::new(vec![IpV6Option::RouterAlert(0)]);
        assert_eq!(options.bytes_length() + 2, 8);
        assert_eq!(options.options().last(), Some(&IpV6Option::PadN(0)));

        let options = IpV6Options::new(vec![IpV6Option::TunnelEncapsulationLimit(4)]);
        assert_eq!(options.options().last(), Some(&IpV6Option::PadN(1)));
        assert_eq!(options.bytes_length() + 2, 8);

        let options = IpV6Options::new(vec![
            IpV6Option::TunnelEncapsulationLimit(4),
            IpV6Option::Unknown {
                option_type: 0x1E,
                data: vec![],
            },
        ]);
        assert_eq!(options.options().last(), Some(&IpV6Option::Pad1));
    }

    #[test]
    fn test_write_then_parse() {
        let options = IpV6Options::new(vec![
            IpV6Option::JumboPayload(70000),
            IpV6Option::Unknown {
                option_type: 0x3E,
                data: vec![1, 2, 3],
            },
        ]);
        let mut buffer = vec![0u8; options.bytes_length()];
        let mut offset = 0;
        options.write(&mut buffer, &mut offset);
        assert_eq!(offset, buffer.len());
        assert_eq!(IpV6Options::parse(&buffer), options);
    }

    #[test]
    fn test_overrunning_option_stops_parse() {
        let parsed = IpV6Options::parse(&[option_type::ROUTER_ALERT, 2, 0]);
        assert!(!parsed.is_valid());
        assert!(parsed.options().is_empty());
    }
}
