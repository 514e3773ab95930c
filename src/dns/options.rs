//! EDNS options carried in OPT record data (RFC 6891).

use serde::{Deserialize, Serialize};

use super::name::DnsMessageWriter;
use super::resource_data::DataReader;
use crate::PacketError;

pub mod option_code {
    pub const LONG_LIVED_QUERY: u16 = 1;
    pub const UPDATE_LEASE: u16 = 2;
    pub const CLIENT_SUBNET: u16 = 8;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DnsOption {
    /// draft-sekar-dns-llq
    LongLivedQuery {
        version: u16,
        opcode: u16,
        error_code: u16,
        id: u64,
        lease_life: u32,
    },
    /// draft-sekar-dns-ul, lease in seconds.
    UpdateLease { lease: i32 },
    /// RFC 7871. `address` holds only the significant bytes.
    ClientSubnet {
        family: u16,
        source_netmask: u8,
        scope_netmask: u8,
        #[serde(with = "serde_bytes")]
        address: Vec<u8>,
    },
    Unknown {
        code: u16,
        #[serde(with = "serde_bytes")]
        data: Vec<u8>,
    },
}

impl DnsOption {
    pub fn code(&self) -> u16 {
        match self {
            DnsOption::LongLivedQuery { .. } => option_code::LONG_LIVED_QUERY,
            DnsOption::UpdateLease { .. } => option_code::UPDATE_LEASE,
            DnsOption::ClientSubnet { .. } => option_code::CLIENT_SUBNET,
            DnsOption::Unknown { code, .. } => *code,
        }
    }

    fn data_length(&self) -> usize {
        match self {
            DnsOption::LongLivedQuery { .. } => 18,
            DnsOption::UpdateLease { .. } => 4,
            DnsOption::ClientSubnet { address, .. } => 4 + address.len(),
            DnsOption::Unknown { data, .. } => data.len(),
        }
    }

    fn parse_data(code: u16, data: &[u8]) -> Self {
        let mut reader = DataReader::new(data, 0, data.len());
        let typed = match code {
            option_code::LONG_LIVED_QUERY if data.len() == 18 => Some(DnsOption::LongLivedQuery {
                version: reader.u16().unwrap_or_default(),
                opcode: reader.u16().unwrap_or_default(),
                error_code: reader.u16().unwrap_or_default(),
                id: reader.u64().unwrap_or_default(),
                lease_life: reader.u32().unwrap_or_default(),
            }),
            option_code::UPDATE_LEASE if data.len() == 4 => reader
                .u32()
                .map(|lease| DnsOption::UpdateLease { lease: lease as i32 }),
            option_code::CLIENT_SUBNET if data.len() >= 4 => {
                let family = reader.u16().unwrap_or_default();
                let source_netmask = reader.u8().unwrap_or_default();
                let scope_netmask = reader.u8().unwrap_or_default();
                Some(DnsOption::ClientSubnet {
                    family,
                    source_netmask,
                    scope_netmask,
                    address: reader.rest(),
                })
            }
            _ => None,
        };
        typed.unwrap_or_else(|| DnsOption::Unknown {
            code,
            data: data.to_vec(),
        })
    }

    fn write(&self, writer: &mut DnsMessageWriter) -> Result<(), PacketError> {
        let length = u16::try_from(self.data_length()).map_err(|_| PacketError::InvalidLength)?;
        writer.u16(self.code());
        writer.u16(length);
        match self {
            DnsOption::LongLivedQuery {
                version,
                opcode,
                error_code,
                id,
                lease_life,
            } => {
                writer.u16(*version);
                writer.u16(*opcode);
                writer.u16(*error_code);
                writer.u64(*id);
                writer.u32(*lease_life);
            }
            DnsOption::UpdateLease { lease } => writer.u32(*lease as u32),
            DnsOption::ClientSubnet {
                family,
                source_netmask,
                scope_netmask,
                address,
            } => {
                writer.u16(*family);
                writer.u8(*source_netmask);
                writer.u8(*scope_netmask);
                writer.slice(address);
            }
            DnsOption::Unknown { data, .. } => writer.slice(data),
        }
        Ok(())
    }
}

/// The options of an OPT record, in wire order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsOptions {
    options: Vec<DnsOption>,
}

impl DnsOptions {
    pub fn new(options: Vec<DnsOption>) -> Self {
        Self { options }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn options(&self) -> &[DnsOption] {
        &self.options
    }

    pub fn bytes_length(&self) -> usize {
        self.options.iter().map(|option| 4 + option.data_length()).sum()
    }

    pub(crate) fn parse(reader: &mut DataReader<'_>) -> Option<Self> {
        let mut options = Vec::new();
        while !reader.is_done() {
            let code = reader.u16()?;
            let length = usize::from(reader.u16()?);
            let data = reader.bytes(length)?;
            options.push(DnsOption::parse_data(code, data));
        }
        Some(Self { options })
    }

    pub(crate) fn write(&self, writer: &mut DnsMessageWriter) -> Result<(), PacketError> {
        for option in &self.options {
            option.write(writer)?;
        }
        Ok(())
    }
}

impl From<Vec<DnsOption>> for DnsOptions {
    fn from(options: Vec<DnsOption>) -> Self {
        Self::new(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::name::DnsDomainNameCompressionMode;

    #[test]
    fn test_options_round_trip() {
        let options = DnsOptions::new(vec![
            DnsOption::LongLivedQuery {
                version: 1,
                opcode: 1,
                error_code: 0,
                id: 0x0102_0304_0506_0708,
                lease_life: 3600,
            },
            DnsOption::UpdateLease { lease: -5 },
            DnsOption::ClientSubnet {
                family: 1,
                source_netmask: 24,
                scope_netmask: 0,
                address: vec![192, 0, 2],
            },
            DnsOption::Unknown {
                code: 10,
                data: vec![1, 2, 3, 4, 5, 6, 7, 8],
            },
        ]);
        let mut writer = DnsMessageWriter::new(DnsDomainNameCompressionMode::All);
        options.write(&mut writer).unwrap();
        assert_eq!(writer.bytes.len(), options.bytes_length());

        let mut reader = DataReader::new(&writer.bytes, 0, writer.bytes.len());
        assert_eq!(DnsOptions::parse(&mut reader), Some(options));
    }

    #[test]
    fn test_malformed_known_option_is_unknown() {
        let bytes = [0, 2, 0, 2, 0xAB, 0xCD];
        let mut reader = DataReader::new(&bytes, 0, bytes.len());
        let options = DnsOptions::parse(&mut reader).unwrap();
        assert_eq!(
            options.options(),
            &[DnsOption::Unknown {
                code: 2,
                data: vec![0xAB, 0xCD]
            }]
        );
    }

    #[test]
    fn test_truncated_option_fails() {
        let bytes = [0, 2, 0, 4, 0];
        let mut reader = DataReader::new(&bytes, 0, bytes.len());
        assert!(DnsOptions::parse(&mut reader).is_none());
    }
}
