//! Resource record framing: owner name, type, class, TTL and data.

use std::collections::HashMap;
use std::fmt;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

use super::name::{DnsDomainName, DnsMessageWriter};
use super::resource_data::DnsResourceData;
use crate::PacketError;
use crate::bytes_ext::{Endianity, read_u16, read_u32};

/// Resource record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DnsType(pub u16);

impl DnsType {
    pub const A: DnsType = DnsType(1);
    pub const NS: DnsType = DnsType(2);
    pub const MD: DnsType = DnsType(3);
    pub const MF: DnsType = DnsType(4);
    pub const CNAME: DnsType = DnsType(5);
    pub const SOA: DnsType = DnsType(6);
    pub const MB: DnsType = DnsType(7);
    pub const MG: DnsType = DnsType(8);
    pub const MR: DnsType = DnsType(9);
    pub const NULL: DnsType = DnsType(10);
    pub const WKS: DnsType = DnsType(11);
    pub const PTR: DnsType = DnsType(12);
    pub const HINFO: DnsType = DnsType(13);
    pub const MINFO: DnsType = DnsType(14);
    pub const MX: DnsType = DnsType(15);
    pub const TXT: DnsType = DnsType(16);
    pub const RP: DnsType = DnsType(17);
    pub const AFSDB: DnsType = DnsType(18);
    pub const X25: DnsType = DnsType(19);
    pub const ISDN: DnsType = DnsType(20);
    pub const RT: DnsType = DnsType(21);
    pub const NSAP: DnsType = DnsType(22);
    pub const NSAP_PTR: DnsType = DnsType(23);
    pub const SIG: DnsType = DnsType(24);
    pub const KEY: DnsType = DnsType(25);
    pub const PX: DnsType = DnsType(26);
    pub const GPOS: DnsType = DnsType(27);
    pub const AAAA: DnsType = DnsType(28);
    pub const LOC: DnsType = DnsType(29);
    pub const NXT: DnsType = DnsType(30);
    pub const SRV: DnsType = DnsType(33);
    pub const ATMA: DnsType = DnsType(34);
    pub const NAPTR: DnsType = DnsType(35);
    pub const KX: DnsType = DnsType(36);
    pub const CERT: DnsType = DnsType(37);
    pub const A6: DnsType = DnsType(38);
    pub const DNAME: DnsType = DnsType(39);
    pub const SINK: DnsType = DnsType(40);
    pub const OPT: DnsType = DnsType(41);
    pub const APL: DnsType = DnsType(42);
    pub const DS: DnsType = DnsType(43);
    pub const SSHFP: DnsType = DnsType(44);
    pub const IPSECKEY: DnsType = DnsType(45);
    pub const RRSIG: DnsType = DnsType(46);
    pub const NSEC: DnsType = DnsType(47);
    pub const DNSKEY: DnsType = DnsType(48);
    pub const DHCID: DnsType = DnsType(49);
    pub const NSEC3: DnsType = DnsType(50);
    pub const NSEC3PARAM: DnsType = DnsType(51);
    pub const TLSA: DnsType = DnsType(52);
    pub const HIP: DnsType = DnsType(55);
    pub const NINFO: DnsType = DnsType(56);
    pub const RKEY: DnsType = DnsType(57);
    pub const TALINK: DnsType = DnsType(58);
    pub const CDS: DnsType = DnsType(59);
    pub const CDNSKEY: DnsType = DnsType(60);
    pub const SPF: DnsType = DnsType(99);
    pub const UNSPEC: DnsType = DnsType(103);
    pub const TKEY: DnsType = DnsType(249);
    pub const TSIG: DnsType = DnsType(250);
    pub const IXFR: DnsType = DnsType(251);
    pub const AXFR: DnsType = DnsType(252);
    pub const MAILB: DnsType = DnsType(253);
    pub const MAILA: DnsType = DnsType(254);
    pub const ANY: DnsType = DnsType(255);
    pub const URI: DnsType = DnsType(256);
    pub const CAA: DnsType = DnsType(257);
    pub const TA: DnsType = DnsType(32768);
    pub const DLV: DnsType = DnsType(32769);
}

lazy_static! {
    static ref DNS_TYPE_NAMES: HashMap<u16, &'static str> = HashMap::from([
        (1, "A"), (2, "NS"), (3, "MD"), (4, "MF"), (5, "CNAME"), (6, "SOA"),
        (7, "MB"), (8, "MG"), (9, "MR"), (10, "NULL"), (11, "WKS"), (12, "PTR"),
        (13, "HINFO"), (14, "MINFO"), (15, "MX"), (16, "TXT"), (17, "RP"),
        (18, "AFSDB"), (19, "X25"), (20, "ISDN"), (21, "RT"), (22, "NSAP"),
        (23, "NSAP-PTR"), (24, "SIG"), (25, "KEY"), (26, "PX"), (27, "GPOS"),
        (28, "AAAA"), (29, "LOC"), (30, "NXT"), (33, "SRV"), (34, "ATMA"),
        (35, "NAPTR"), (36, "KX"), (37, "CERT"), (38, "A6"), (39, "DNAME"),
        (40, "SINK"), (41, "OPT"), (42, "APL"), (43, "DS"), (44, "SSHFP"),
        (45, "IPSECKEY"), (46, "RRSIG"), (47, "NSEC"), (48, "DNSKEY"),
        (49, "DHCID"), (50, "NSEC3"), (51, "NSEC3PARAM"), (52, "TLSA"),
        (55, "HIP"), (56, "NINFO"), (57, "RKEY"), (58, "TALINK"), (59, "CDS"),
        (60, "CDNSKEY"), (99, "SPF"), (103, "UNSPEC"), (249, "TKEY"),
        (250, "TSIG"), (251, "IXFR"), (252, "AXFR"), (253, "MAILB"),
        (254, "MAILA"), (255, "ANY"), (256, "URI"), (257, "CAA"),
        (32768, "TA"), (32769, "DLV"),
    ]);
}

impl fmt::Display for DnsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match DNS_TYPE_NAMES.get(&self.0) {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "TYPE{}", self.0),
        }
    }
}

/// Resource record class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DnsClass(pub u16);

impl DnsClass {
    pub const INTERNET: DnsClass = DnsClass(1);
    pub const CHAOS: DnsClass = DnsClass(3);
    pub const HESIOD: DnsClass = DnsClass(4);
    pub const NONE: DnsClass = DnsClass(254);
    pub const ANY: DnsClass = DnsClass(255);
}

/// An entry of the question section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsQueryResourceRecord {
    pub domain_name: DnsDomainName,
    pub dns_type: DnsType,
    pub dns_class: DnsClass,
}

impl DnsQueryResourceRecord {
    pub fn new(domain_name: impl Into<DnsDomainName>, dns_type: DnsType, dns_class: DnsClass) -> Self {
        Self {
            domain_name: domain_name.into(),
            dns_type,
            dns_class,
        }
    }

    pub(crate) fn parse(message: &[u8], offset: usize) -> Option<(Self, usize)> {
        let (domain_name, name_length) = DnsDomainName::parse(message, offset)?;
        let fixed = offset + name_length;
        if fixed + 4 > message.len() {
            return None;
        }
        let record = Self {
            domain_name,
            dns_type: DnsType(read_u16(message, fixed, Endianity::Big)),
            dns_class: DnsClass(read_u16(message, fixed + 2, Endianity::Big)),
        };
        Some((record, name_length + 4))
    }

    pub(crate) fn write(&self, writer: &mut DnsMessageWriter) -> Result<(), PacketError> {
        writer.domain_name(&self.domain_name, true)?;
        writer.u16(self.dns_type.0);
        writer.u16(self.dns_class.0);
        Ok(())
    }
}

/// An answer, authority or additional record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsDataResourceRecord {
    pub domain_name: DnsDomainName,
    pub dns_type: DnsType,
    pub dns_class: DnsClass,
    pub ttl: u32,
    pub data: DnsResourceData,
}

impl DnsDataResourceRecord {
    pub fn new(
        domain_name: impl Into<DnsDomainName>,
        dns_type: DnsType,
        dns_class: DnsClass,
        ttl: u32,
        data: DnsResourceData,
    ) -> Self {
        Self {
            domain_name: domain_name.into(),
            dns_type,
            dns_class,
            ttl,
            data,
        }
    }

    /// An EDNS(0) OPT pseudo-record (RFC 6891).
    ///
    /// The class field carries the sender's UDP payload size and the TTL
    /// field the extended response code, version and flags.
    pub fn opt(
        send_payload_size: u16,
        extended_response_code: u8,
        version: u8,
        dnssec_ok: bool,
        options: super::DnsOptions,
    ) -> Self {
        let flags: u32 = if dnssec_ok { 0x8000 } else { 0 };
        Self {
            domain_name: DnsDomainName::root(),
            dns_type: DnsType::OPT,
            dns_class: DnsClass(send_payload_size),
            ttl: (u32::from(extended_response_code) << 24) | (u32::from(version) << 16) | flags,
            data: DnsResourceData::Options(options),
        }
    }

    pub fn opt_send_payload_size(&self) -> u16 {
        self.dns_class.0
    }

    pub fn opt_extended_response_code(&self) -> u8 {
        (self.ttl >> 24) as u8
    }

    pub fn opt_version(&self) -> u8 {
        (self.ttl >> 16) as u8
    }

    pub fn opt_dnssec_ok(&self) -> bool {
        self.ttl & 0x8000 != 0
    }

    /// Parses a record; the flag is false when the data did not match its type.
    pub(crate) fn parse(message: &[u8], offset: usize) -> Option<(Self, usize, bool)> {
        let (domain_name, name_length) = DnsDomainName::parse(message, offset)?;
        let fixed = offset + name_length;
        if fixed + 10 > message.len() {
            return None;
        }
        let dns_type = DnsType(read_u16(message, fixed, Endianity::Big));
        let dns_class = DnsClass(read_u16(message, fixed + 2, Endianity::Big));
        let ttl = read_u32(message, fixed + 4, Endianity::Big);
        let data_length = usize::from(read_u16(message, fixed + 8, Endianity::Big));
        let data_offset = fixed + 10;
        if data_offset + data_length > message.len() {
            return None;
        }
        let (data, is_typed) = match DnsResourceData::parse(dns_type, message, data_offset, data_length) {
            Some(data) => (data, true),
            None => (
                DnsResourceData::Anonymous(message[data_offset..data_offset + data_length].to_vec()),
                false,
            ),
        };
        let record = Self {
            domain_name,
            dns_type,
            dns_class,
            ttl,
            data,
        };
        Some((record, name_length + 10 + data_length, is_typed))
    }

    pub(crate) fn write(&self, writer: &mut DnsMessageWriter) -> Result<(), PacketError> {
        writer.domain_name(&self.domain_name, true)?;
        writer.u16(self.dns_type.0);
        writer.u16(self.dns_class.0);
        writer.u32(self.ttl);
        let length_at = writer.position();
        writer.u16(0);
        self.data.write(self.dns_type, writer)?;
        let data_length = writer.position() - length_at - 2;
        let data_length = u16::try_from(data_length).map_err(|_| PacketError::InvalidLength)?;
        writer.patch_u16(length_at, data_length);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::name::DnsDomainNameCompressionMode;
    use std::net::Ipv4Addr;

    #[test]
    fn test_type_display() {
        assert_eq!(DnsType::NSAP_PTR.to_string(), "NSAP-PTR");
        assert_eq!(DnsType(65000).to_string(), "TYPE65000");
    }

    #[test]
    fn test_data_record_round_trip() {
        let record = DnsDataResourceRecord::new(
            "host.example",
            DnsType::A,
            DnsClass::INTERNET,
            3600,
            DnsResourceData::IpV4(Ipv4Addr::new(1, 2, 3, 4)),
        );
        let mut writer = DnsMessageWriter::new(DnsDomainNameCompressionMode::All);
        record.write(&mut writer).unwrap();
        let (parsed, length, is_typed) = DnsDataResourceRecord::parse(&writer.bytes, 0).unwrap();
        assert!(is_typed);
        assert_eq!(length, writer.bytes.len());
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_mistyped_data_falls_back_to_anonymous() {
        // An A record with 3 bytes of data.
        let message = [0, 0, 1, 0, 1, 0, 0, 0, 0, 0, 3, 1, 2, 3];
        let (record, _, is_typed) = DnsDataResourceRecord::parse(&message, 0).unwrap();
        assert!(!is_typed);
        assert_eq!(record.data, DnsResourceData::Anonymous(vec![1, 2, 3]));
    }
}
