//! Typed resource record data.
//!
//! Record types that share a wire shape share a variant: every type whose
//! data is a single domain name parses to [`DnsResourceData::DomainName`],
//! every key-like record to [`DnsResourceData::Key`], and so on. Types with
//! no typed form keep their bytes in [`DnsResourceData::Anonymous`].

use std::net::{Ipv4Addr, Ipv6Addr};

use serde::{Deserialize, Serialize};

use super::name::{DnsDomainName, DnsMessageWriter};
use super::options::DnsOptions;
use super::record::DnsType;
use crate::PacketError;
use crate::bytes_ext::{Endianity, read_ipv4, read_u16, read_u32, read_uint};

/// Bounded reader over the data of one record.
///
/// Names are resolved against the whole message, since their pointers may
/// lead outside the record.
pub(crate) struct DataReader<'a> {
    message: &'a [u8],
    position: usize,
    end: usize,
}

impl<'a> DataReader<'a> {
    pub(crate) fn new(message: &'a [u8], offset: usize, length: usize) -> Self {
        Self {
            message,
            position: offset,
            end: (offset + length).min(message.len()),
        }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.end.saturating_sub(self.position)
    }

    pub(crate) fn is_done(&self) -> bool {
        self.position == self.end
    }

    pub(crate) fn bytes(&mut self, count: usize) -> Option<&'a [u8]> {
        if count > self.remaining() {
            return None;
        }
        let bytes = &self.message[self.position..self.position + count];
        self.position += count;
        Some(bytes)
    }

    pub(crate) fn rest(&mut self) -> Vec<u8> {
        let bytes = &self.message[self.position.min(self.end)..self.end];
        self.position = self.end;
        bytes.to_vec()
    }

    pub(crate) fn u8(&mut self) -> Option<u8> {
        self.bytes(1).map(|bytes| bytes[0])
    }

    pub(crate) fn u16(&mut self) -> Option<u16> {
        self.bytes(2).map(|bytes| read_u16(bytes, 0, Endianity::Big))
    }

    pub(crate) fn u32(&mut self) -> Option<u32> {
        self.bytes(4).map(|bytes| read_u32(bytes, 0, Endianity::Big))
    }

    pub(crate) fn u48(&mut self) -> Option<u64> {
        self.bytes(6).map(|bytes| read_uint(bytes, 0, 6, Endianity::Big))
    }

    pub(crate) fn u64(&mut self) -> Option<u64> {
        self.bytes(8).map(|bytes| read_uint(bytes, 0, 8, Endianity::Big))
    }

    fn ipv4(&mut self) -> Option<Ipv4Addr> {
        self.bytes(4).map(|bytes| read_ipv4(bytes, 0))
    }

    fn ipv6(&mut self) -> Option<Ipv6Addr> {
        let bytes: [u8; 16] = self.bytes(16)?.try_into().ok()?;
        Some(Ipv6Addr::from(bytes))
    }

    /// A length-prefixed character string.
    fn string(&mut self) -> Option<Vec<u8>> {
        let length = usize::from(self.u8()?);
        self.bytes(length).map(<[u8]>::to_vec)
    }

    fn domain_name(&mut self) -> Option<DnsDomainName> {
        let (name, consumed) = DnsDomainName::parse(self.message, self.position)?;
        if consumed > self.remaining() {
            return None;
        }
        self.position += consumed;
        Some(name)
    }
}

/// One entry of an APL record (RFC 3123).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsAddressPrefix {
    /// IANA address family (1 = IPv4, 2 = IPv6).
    pub address_family: u16,
    pub prefix_length: u8,
    pub negation: bool,
    #[serde(with = "serde_bytes")]
    pub address_fragment: Vec<u8>,
}

impl DnsAddressPrefix {
    const NEGATION_FLAG: u8 = 0x80;
    const MAX_FRAGMENT_LENGTH: usize = 0x7F;
}

/// Where an IPSECKEY gateway is found (RFC 4025).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DnsGateway {
    None,
    IpV4(Ipv4Addr),
    IpV6(Ipv6Addr),
    DomainName(DnsDomainName),
}

impl DnsGateway {
    pub fn gateway_type(&self) -> u8 {
        match self {
            DnsGateway::None => 0,
            DnsGateway::IpV4(_) => 1,
            DnsGateway::IpV6(_) => 2,
            DnsGateway::DomainName(_) => 3,
        }
    }
}

/// Decodes NSEC-style type bitmaps (RFC 4034 section 4.1.2).
fn parse_type_bitmaps(bytes: &[u8]) -> Option<Vec<DnsType>> {
    let mut types = Vec::new();
    let mut position = 0;
    let mut previous_window: Option<u8> = None;
    while position < bytes.len() {
        let window = *bytes.get(position)?;
        let length = usize::from(*bytes.get(position + 1)?);
        if length == 0 || length > 32 || previous_window.is_some_and(|previous| window <= previous) {
            return None;
        }
        let bitmap = bytes.get(position + 2..position + 2 + length)?;
        for (index, byte) in bitmap.iter().enumerate() {
            for bit in 0..8 {
                if byte & (0x80 >> bit) != 0 {
                    types.push(DnsType((u16::from(window) << 8) | (index * 8 + bit) as u16));
                }
            }
        }
        previous_window = Some(window);
        position += 2 + length;
    }
    Some(types)
}

fn write_type_bitmaps(types: &[DnsType], writer: &mut DnsMessageWriter) {
    let mut sorted: Vec<u16> = types.iter().map(|dns_type| dns_type.0).collect();
    sorted.sort_unstable();
    sorted.dedup();
    let mut index = 0;
    while index < sorted.len() {
        let window = (sorted[index] >> 8) as u8;
        let mut bitmap = [0u8; 32];
        let mut used = 0;
        while index < sorted.len() && (sorted[index] >> 8) as u8 == window {
            let low = usize::from(sorted[index] & 0xFF);
            bitmap[low / 8] |= 0x80 >> (low % 8);
            used = low / 8 + 1;
            index += 1;
        }
        writer.u8(window);
        writer.u8(used as u8);
        writer.slice(&bitmap[..used]);
    }
}

/// The data of a resource record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DnsResourceData {
    /// A
    IpV4(Ipv4Addr),
    /// AAAA
    IpV6(Ipv6Addr),
    /// NS, MD, MF, CNAME, MB, MG, MR, PTR, NSAP-PTR, DNAME
    DomainName(DnsDomainName),
    /// MINFO, RP, TALINK: exactly two names.
    DomainNames(Vec<DnsDomainName>),
    /// MX, AFSDB, RT, KX: a preference or subtype followed by a name.
    UShortDomainName {
        value: u16,
        domain_name: DnsDomainName,
    },
    /// HINFO (2), X25 (1), ISDN (1 or 2), GPOS (3), TXT, SPF, NINFO
    Strings(Vec<Vec<u8>>),
    StartOfAuthority {
        main_name_server: DnsDomainName,
        responsible_mailbox: DnsDomainName,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum_ttl: u32,
    },
    WellKnownService {
        address: Ipv4Addr,
        protocol: u8,
        #[serde(with = "serde_bytes")]
        bitmap: Vec<u8>,
    },
    NetworkServiceAccessPoint {
        #[serde(with = "serde_bytes")]
        area_address: Vec<u8>,
        /// 48 bits.
        system_identifier: u64,
        selector: u8,
    },
    /// SIG, RRSIG
    Signature {
        type_covered: DnsType,
        algorithm: u8,
        labels: u8,
        original_ttl: u32,
        signature_expiration: u32,
        signature_inception: u32,
        key_tag: u16,
        signer_name: DnsDomainName,
        #[serde(with = "serde_bytes")]
        signature: Vec<u8>,
    },
    /// KEY, DNSKEY, CDNSKEY, RKEY
    Key {
        flags: u16,
        protocol: u8,
        algorithm: u8,
        #[serde(with = "serde_bytes")]
        public_key: Vec<u8>,
    },
    /// PX
    X400Pointer {
        preference: u16,
        map822: DnsDomainName,
        map_x400: DnsDomainName,
    },
    /// LOC version 0, fields in their encoded form.
    LocationInformation {
        version: u8,
        size: u8,
        horizontal_precision: u8,
        vertical_precision: u8,
        latitude: u32,
        longitude: u32,
        altitude: u32,
    },
    /// NXT
    NextDomain {
        next_domain_name: DnsDomainName,
        #[serde(with = "serde_bytes")]
        type_bitmap: Vec<u8>,
    },
    /// SRV
    ServerSelection {
        priority: u16,
        weight: u16,
        port: u16,
        target: DnsDomainName,
    },
    /// ATMA
    AtmAddress {
        format: u8,
        #[serde(with = "serde_bytes")]
        address: Vec<u8>,
    },
    /// NAPTR
    NamingAuthorityPointer {
        order: u16,
        preference: u16,
        flags: Vec<u8>,
        services: Vec<u8>,
        regexp: Vec<u8>,
        replacement: DnsDomainName,
    },
    /// CERT
    Certificate {
        certificate_type: u16,
        key_tag: u16,
        algorithm: u8,
        #[serde(with = "serde_bytes")]
        certificate: Vec<u8>,
    },
    /// A6; `prefix_name` is the root name when `prefix_length` is zero.
    A6 {
        prefix_length: u8,
        address_suffix: Ipv6Addr,
        prefix_name: DnsDomainName,
    },
    Sink {
        coding: u8,
        subcoding: u8,
        #[serde(with = "serde_bytes")]
        data: Vec<u8>,
    },
    /// OPT
    Options(DnsOptions),
    /// APL
    AddressPrefixList(Vec<DnsAddressPrefix>),
    /// DS, CDS, TA, DLV
    DelegationSigner {
        key_tag: u16,
        algorithm: u8,
        digest_type: u8,
        #[serde(with = "serde_bytes")]
        digest: Vec<u8>,
    },
    /// SSHFP
    SshFingerprint {
        algorithm: u8,
        fingerprint_type: u8,
        #[serde(with = "serde_bytes")]
        fingerprint: Vec<u8>,
    },
    IpSecKey {
        precedence: u8,
        algorithm: u8,
        gateway: DnsGateway,
        #[serde(with = "serde_bytes")]
        public_key: Vec<u8>,
    },
    /// NSEC; `types` are kept in ascending order.
    NextDomainSecure {
        next_domain_name: DnsDomainName,
        types: Vec<DnsType>,
    },
    /// NSEC3; `types` are kept in ascending order.
    NextDomainSecure3 {
        hash_algorithm: u8,
        flags: u8,
        iterations: u16,
        salt: Vec<u8>,
        next_hashed_owner_name: Vec<u8>,
        types: Vec<DnsType>,
    },
    /// NSEC3PARAM
    NextDomainSecure3Parameters {
        hash_algorithm: u8,
        flags: u8,
        iterations: u16,
        salt: Vec<u8>,
    },
    /// TLSA
    TlsCertificateAssociation {
        certificate_usage: u8,
        selector: u8,
        matching_type: u8,
        #[serde(with = "serde_bytes")]
        certificate_association_data: Vec<u8>,
    },
    /// HIP
    HostIdentityProtocol {
        host_identity_tag: Vec<u8>,
        public_key_algorithm: u8,
        public_key: Vec<u8>,
        rendezvous_servers: Vec<DnsDomainName>,
    },
    /// TKEY
    TransactionKey {
        algorithm: DnsDomainName,
        inception: u32,
        expiration: u32,
        mode: u16,
        error: u16,
        key: Vec<u8>,
        other: Vec<u8>,
    },
    /// TSIG
    TransactionSignature {
        algorithm: DnsDomainName,
        /// 48-bit seconds since the epoch.
        time_signed: u64,
        fudge: u16,
        message_authentication_code: Vec<u8>,
        original_id: u16,
        error: u16,
        other: Vec<u8>,
    },
    /// URI
    Uri {
        priority: u16,
        weight: u16,
        #[serde(with = "serde_bytes")]
        target: Vec<u8>,
    },
    /// CAA
    CertificationAuthorityAuthorization {
        flags: u8,
        tag: Vec<u8>,
        #[serde(with = "serde_bytes")]
        value: Vec<u8>,
    },
    /// NULL, UNSPEC, DHCID and unknown types.
    Anonymous(#[serde(with = "serde_bytes")] Vec<u8>),
}

/// Types whose embedded names may be compressed (RFC 3597 section 4).
fn allows_compression(dns_type: DnsType) -> bool {
    matches!(
        dns_type,
        DnsType::NS
            | DnsType::MD
            | DnsType::MF
            | DnsType::CNAME
            | DnsType::SOA
            | DnsType::MB
            | DnsType::MG
            | DnsType::MR
            | DnsType::PTR
            | DnsType::MINFO
            | DnsType::MX
    )
}

fn u8_length(length: usize, what: &str) -> Result<u8, PacketError> {
    u8::try_from(length)
        .map_err(|_| PacketError::InvalidFieldValue(format!("DNS {what} of {length} bytes exceeds 255")))
}

impl DnsResourceData {
    /// Parses `length` bytes of record data at `offset` of `message`.
    ///
    /// Returns `None` when the bytes do not fit the layout of `dns_type`;
    /// types without a typed layout always succeed as `Anonymous`.
    pub fn parse(dns_type: DnsType, message: &[u8], offset: usize, length: usize) -> Option<Self> {
        let mut reader = DataReader::new(message, offset, length);
        if reader.remaining() != length {
            return None;
        }
        let data = Self::parse_typed(dns_type, &mut reader)?;
        reader.is_done().then_some(data)
    }

    fn parse_typed(dns_type: DnsType, reader: &mut DataReader<'_>) -> Option<Self> {
        let data = match dns_type {
            DnsType::A => DnsResourceData::IpV4(reader.ipv4()?),
            DnsType::AAAA => DnsResourceData::IpV6(reader.ipv6()?),
            DnsType::NS
            | DnsType::MD
            | DnsType::MF
            | DnsType::CNAME
            | DnsType::MB
            | DnsType::MG
            | DnsType::MR
            | DnsType::PTR
            | DnsType::NSAP_PTR
            | DnsType::DNAME => DnsResourceData::DomainName(reader.domain_name()?),
            DnsType::MINFO | DnsType::RP | DnsType::TALINK => {
                DnsResourceData::DomainNames(vec![reader.domain_name()?, reader.domain_name()?])
            }
            DnsType::MX | DnsType::AFSDB | DnsType::RT | DnsType::KX => {
                DnsResourceData::UShortDomainName {
                    value: reader.u16()?,
                    domain_name: reader.domain_name()?,
                }
            }
            DnsType::HINFO
            | DnsType::X25
            | DnsType::ISDN
            | DnsType::GPOS
            | DnsType::TXT
            | DnsType::SPF
            | DnsType::NINFO => {
                let mut strings = Vec::new();
                while !reader.is_done() {
                    strings.push(reader.string()?);
                }
                let count_fits = match dns_type {
                    DnsType::HINFO => strings.len() == 2,
                    DnsType::X25 => strings.len() == 1,
                    DnsType::ISDN => (1..=2).contains(&strings.len()),
                    DnsType::GPOS => strings.len() == 3,
                    _ => !strings.is_empty(),
                };
                if !count_fits {
                    return None;
                }
                DnsResourceData::Strings(strings)
            }
            DnsType::SOA => DnsResourceData::StartOfAuthority {
                main_name_server: reader.domain_name()?,
                responsible_mailbox: reader.domain_name()?,
                serial: reader.u32()?,
                refresh: reader.u32()?,
                retry: reader.u32()?,
                expire: reader.u32()?,
                minimum_ttl: reader.u32()?,
            },
            DnsType::WKS => DnsResourceData::WellKnownService {
                address: reader.ipv4()?,
                protocol: reader.u8()?,
                bitmap: reader.rest(),
            },
            DnsType::NSAP => {
                let area_length = reader.remaining().checked_sub(7).filter(|&length| length > 0)?;
                DnsResourceData::NetworkServiceAccessPoint {
                    area_address: reader.bytes(area_length)?.to_vec(),
                    system_identifier: reader.u48()?,
                    selector: reader.u8()?,
                }
            }
            DnsType::SIG | DnsType::RRSIG => DnsResourceData::Signature {
                type_covered: DnsType(reader.u16()?),
                algorithm: reader.u8()?,
                labels: reader.u8()?,
                original_ttl: reader.u32()?,
                signature_expiration: reader.u32()?,
                signature_inception: reader.u32()?,
                key_tag: reader.u16()?,
                signer_name: reader.domain_name()?,
                signature: reader.rest(),
            },
            DnsType::KEY | DnsType::DNSKEY | DnsType::CDNSKEY | DnsType::RKEY => {
                DnsResourceData::Key {
                    flags: reader.u16()?,
                    protocol: reader.u8()?,
                    algorithm: reader.u8()?,
                    public_key: reader.rest(),
                }
            }
            DnsType::PX => DnsResourceData::X400Pointer {
                preference: reader.u16()?,
                map822: reader.domain_name()?,
                map_x400: reader.domain_name()?,
            },
            DnsType::LOC => {
                let version = reader.u8()?;
                if version != 0 {
                    return None;
                }
                DnsResourceData::LocationInformation {
                    version,
                    size: reader.u8()?,
                    horizontal_precision: reader.u8()?,
                    vertical_precision: reader.u8()?,
                    latitude: reader.u32()?,
                    longitude: reader.u32()?,
                    altitude: reader.u32()?,
                }
            }
            DnsType::NXT => DnsResourceData::NextDomain {
                next_domain_name: reader.domain_name()?,
                type_bitmap: reader.rest(),
            },
            DnsType::SRV => DnsResourceData::ServerSelection {
                priority: reader.u16()?,
                weight: reader.u16()?,
                port: reader.u16()?,
                target: reader.domain_name()?,
            },
            DnsType::ATMA => DnsResourceData::AtmAddress {
                format: reader.u8()?,
                address: reader.rest(),
            },
            DnsType::NAPTR => DnsResourceData::NamingAuthorityPointer {
                order: reader.u16()?,
                preference: reader.u16()?,
                flags: reader.string()?,
                services: reader.string()?,
                regexp: reader.string()?,
                replacement: reader.domain_name()?,
            },
            DnsType::CERT => DnsResourceData::Certificate {
                certificate_type: reader.u16()?,
                key_tag: reader.u16()?,
                algorithm: reader.u8()?,
                certificate: reader.rest(),
            },
            DnsType::A6 => {
                let prefix_length = reader.u8()?;
                if prefix_length > 128 {
                    return None;
                }
                let suffix_length = (128 - usize::from(prefix_length)).div_ceil(8);
                let mut address = [0u8; 16];
                address[16 - suffix_length..].copy_from_slice(reader.bytes(suffix_length)?);
                let prefix_name = if prefix_length == 0 {
                    DnsDomainName::root()
                } else {
                    reader.domain_name()?
                };
                DnsResourceData::A6 {
                    prefix_length,
                    address_suffix: Ipv6Addr::from(address),
                    prefix_name,
                }
            }
            DnsType::SINK => DnsResourceData::Sink {
                coding: reader.u8()?,
                subcoding: reader.u8()?,
                data: reader.rest(),
            },
            DnsType::OPT => DnsResourceData::Options(DnsOptions::parse(reader)?),
            DnsType::APL => {
                let mut prefixes = Vec::new();
                while !reader.is_done() {
                    let address_family = reader.u16()?;
                    let prefix_length = reader.u8()?;
                    let flags_and_length = reader.u8()?;
                    let fragment_length = usize::from(flags_and_length) & DnsAddressPrefix::MAX_FRAGMENT_LENGTH;
                    prefixes.push(DnsAddressPrefix {
                        address_family,
                        prefix_length,
                        negation: flags_and_length & DnsAddressPrefix::NEGATION_FLAG != 0,
                        address_fragment: reader.bytes(fragment_length)?.to_vec(),
                    });
                }
                DnsResourceData::AddressPrefixList(prefixes)
            }
            DnsType::DS | DnsType::CDS | DnsType::TA | DnsType::DLV => {
                DnsResourceData::DelegationSigner {
                    key_tag: reader.u16()?,
                    algorithm: reader.u8()?,
                    digest_type: reader.u8()?,
                    digest: reader.rest(),
                }
            }
            DnsType::SSHFP => DnsResourceData::SshFingerprint {
                algorithm: reader.u8()?,
                fingerprint_type: reader.u8()?,
                fingerprint: reader.rest(),
            },
            DnsType::IPSECKEY => {
                let precedence = reader.u8()?;
                let gateway_type = reader.u8()?;
                let algorithm = reader.u8()?;
                let gateway = match gateway_type {
                    0 => DnsGateway::None,
                    1 => DnsGateway::IpV4(reader.ipv4()?),
                    2 => DnsGateway::IpV6(reader.ipv6()?),
                    3 => DnsGateway::DomainName(reader.domain_name()?),
                    _ => return None,
                };
                DnsResourceData::IpSecKey {
                    precedence,
                    algorithm,
                    gateway,
                    public_key: reader.rest(),
                }
            }
            DnsType::NSEC => DnsResourceData::NextDomainSecure {
                next_domain_name: reader.domain_name()?,
                types: parse_type_bitmaps(&reader.rest())?,
            },
            DnsType::NSEC3 => DnsResourceData::NextDomainSecure3 {
                hash_algorithm: reader.u8()?,
                flags: reader.u8()?,
                iterations: reader.u16()?,
                salt: reader.string()?,
                next_hashed_owner_name: reader.string()?,
                types: parse_type_bitmaps(&reader.rest())?,
            },
            DnsType::NSEC3PARAM => DnsResourceData::NextDomainSecure3Parameters {
                hash_algorithm: reader.u8()?,
                flags: reader.u8()?,
                iterations: reader.u16()?,
                salt: reader.string()?,
            },
            DnsType::TLSA => DnsResourceData::TlsCertificateAssociation {
                certificate_usage: reader.u8()?,
                selector: reader.u8()?,
                matching_type: reader.u8()?,
                certificate_association_data: reader.rest(),
            },
            DnsType::HIP => {
                let tag_length = usize::from(reader.u8()?);
                let public_key_algorithm = reader.u8()?;
                let key_length = usize::from(reader.u16()?);
                let host_identity_tag = reader.bytes(tag_length)?.to_vec();
                let public_key = reader.bytes(key_length)?.to_vec();
                let mut rendezvous_servers = Vec::new();
                while !reader.is_done() {
                    rendezvous_servers.push(reader.domain_name()?);
                }
                DnsResourceData::HostIdentityProtocol {
                    host_identity_tag,
                    public_key_algorithm,
                    public_key,
                    rendezvous_servers,
                }
            }
            DnsType::TKEY => {
                let algorithm = reader.domain_name()?;
                let inception = reader.u32()?;
                let expiration = reader.u32()?;
                let mode = reader.u16()?;
                let error = reader.u16()?;
                let key_length = usize::from(reader.u16()?);
                let key = reader.bytes(key_length)?.to_vec();
                let other_length = usize::from(reader.u16()?);
                DnsResourceData::TransactionKey {
                    algorithm,
                    inception,
                    expiration,
                    mode,
                    error,
                    key,
                    other: reader.bytes(other_length)?.to_vec(),
                }
            }
            DnsType::TSIG => {
                let algorithm = reader.domain_name()?;
                let time_signed = reader.u48()?;
                let fudge = reader.u16()?;
                let mac_length = usize::from(reader.u16()?);
                let message_authentication_code = reader.bytes(mac_length)?.to_vec();
                let original_id = reader.u16()?;
                let error = reader.u16()?;
                let other_length = usize::from(reader.u16()?);
                DnsResourceData::TransactionSignature {
                    algorithm,
                    time_signed,
                    fudge,
                    message_authentication_code,
                    original_id,
                    error,
                    other: reader.bytes(other_length)?.to_vec(),
                }
            }
            DnsType::URI => DnsResourceData::Uri {
                priority: reader.u16()?,
                weight: reader.u16()?,
                target: reader.rest(),
            },
            DnsType::CAA => DnsResourceData::CertificationAuthorityAuthorization {
                flags: reader.u8()?,
                tag: reader.string()?,
                value: reader.rest(),
            },
            _ => DnsResourceData::Anonymous(reader.rest()),
        };
        Some(data)
    }

    pub(crate) fn write(
        &self,
        dns_type: DnsType,
        writer: &mut DnsMessageWriter,
    ) -> Result<(), PacketError> {
        let compress = allows_compression(dns_type);
        match self {
            DnsResourceData::IpV4(address) => writer.slice(&address.octets()),
            DnsResourceData::IpV6(address) => writer.slice(&address.octets()),
            DnsResourceData::DomainName(name) => writer.domain_name(name, compress)?,
            DnsResourceData::DomainNames(names) => {
                for name in names {
                    writer.domain_name(name, compress)?;
                }
            }
            DnsResourceData::UShortDomainName { value, domain_name } => {
                writer.u16(*value);
                writer.domain_name(domain_name, compress)?;
            }
            DnsResourceData::Strings(strings) => {
                for string in strings {
                    writer.string(string)?;
                }
            }
            DnsResourceData::StartOfAuthority {
                main_name_server,
                responsible_mailbox,
                serial,
                refresh,
                retry,
                expire,
                minimum_ttl,
            } => {
                writer.domain_name(main_name_server, compress)?;
                writer.domain_name(responsible_mailbox, compress)?;
                for value in [serial, refresh, retry, expire, minimum_ttl] {
                    writer.u32(*value);
                }
            }
            DnsResourceData::WellKnownService {
                address,
                protocol,
                bitmap,
            } => {
                writer.slice(&address.octets());
                writer.u8(*protocol);
                writer.slice(bitmap);
            }
            DnsResourceData::NetworkServiceAccessPoint {
                area_address,
                system_identifier,
                selector,
            } => {
                writer.slice(area_address);
                writer.u48(*system_identifier);
                writer.u8(*selector);
            }
            DnsResourceData::Signature {
                type_covered,
                algorithm,
                labels,
                original_ttl,
                signature_expiration,
                signature_inception,
                key_tag,
                signer_name,
                signature,
            } => {
                writer.u16(type_covered.0);
                writer.u8(*algorithm);
                writer.u8(*labels);
                writer.u32(*original_ttl);
                writer.u32(*signature_expiration);
                writer.u32(*signature_inception);
                writer.u16(*key_tag);
                writer.domain_name(signer_name, false)?;
                writer.slice(signature);
            }
            DnsResourceData::Key {
                flags,
                protocol,
                algorithm,
                public_key,
            } => {
                writer.u16(*flags);
                writer.u8(*protocol);
                writer.u8(*algorithm);
                writer.slice(public_key);
            }
            DnsResourceData::X400Pointer {
                preference,
                map822,
                map_x400,
            } => {
                writer.u16(*preference);
                writer.domain_name(map822, false)?;
                writer.domain_name(map_x400, false)?;
            }
            DnsResourceData::LocationInformation {
                version,
                size,
                horizontal_precision,
                vertical_precision,
                latitude,
                longitude,
                altitude,
            } => {
                writer.u8(*version);
                writer.u8(*size);
                writer.u8(*horizontal_precision);
                writer.u8(*vertical_precision);
                writer.u32(*latitude);
                writer.u32(*longitude);
                writer.u32(*altitude);
            }
            DnsResourceData::NextDomain {
                next_domain_name,
                type_bitmap,
            } => {
                writer.domain_name(next_domain_name, false)?;
                writer.slice(type_bitmap);
            }
            DnsResourceData::ServerSelection {
                priority,
                weight,
                port,
                target,
            } => {
                writer.u16(*priority);
                writer.u16(*weight);
                writer.u16(*port);
                writer.domain_name(target, false)?;
            }
            DnsResourceData::AtmAddress { format, address } => {
                writer.u8(*format);
                writer.slice(address);
            }
            DnsResourceData::NamingAuthorityPointer {
                order,
                preference,
                flags,
                services,
                regexp,
                replacement,
            } => {
                writer.u16(*order);
                writer.u16(*preference);
                writer.string(flags)?;
                writer.string(services)?;
                writer.string(regexp)?;
                writer.domain_name(replacement, false)?;
            }
            DnsResourceData::Certificate {
                certificate_type,
                key_tag,
                algorithm,
                certificate,
            } => {
                writer.u16(*certificate_type);
                writer.u16(*key_tag);
                writer.u8(*algorithm);
                writer.slice(certificate);
            }
            DnsResourceData::A6 {
                prefix_length,
                address_suffix,
                prefix_name,
            } => {
                if *prefix_length > 128 {
                    return Err(PacketError::InvalidFieldValue(format!(
                        "A6 prefix length {prefix_length} exceeds 128"
                    )));
                }
                let suffix_length = (128 - usize::from(*prefix_length)).div_ceil(8);
                writer.u8(*prefix_length);
                writer.slice(&address_suffix.octets()[16 - suffix_length..]);
                if *prefix_length != 0 {
                    writer.domain_name(prefix_name, false)?;
                }
            }
            DnsResourceData::Sink {
                coding,
                subcoding,
                data,
            } => {
                writer.u8(*coding);
                writer.u8(*subcoding);
                writer.slice(data);
            }
            DnsResourceData::Options(options) => options.write(writer)?,
            DnsResourceData::AddressPrefixList(prefixes) => {
                for prefix in prefixes {
                    let length = prefix.address_fragment.len();
                    if length > DnsAddressPrefix::MAX_FRAGMENT_LENGTH {
                        return Err(PacketError::InvalidFieldValue(format!(
                            "APL address fragment of {length} bytes exceeds 127"
                        )));
                    }
                    writer.u16(prefix.address_family);
                    writer.u8(prefix.prefix_length);
                    let mut flags_and_length = length as u8;
                    if prefix.negation {
                        flags_and_length |= DnsAddressPrefix::NEGATION_FLAG;
                    }
                    writer.u8(flags_and_length);
                    writer.slice(&prefix.address_fragment);
                }
            }
            DnsResourceData::DelegationSigner {
                key_tag,
                algorithm,
                digest_type,
                digest,
            } => {
                writer.u16(*key_tag);
                writer.u8(*algorithm);
                writer.u8(*digest_type);
                writer.slice(digest);
            }
            DnsResourceData::SshFingerprint {
                algorithm,
                fingerprint_type,
                fingerprint,
            } => {
                writer.u8(*algorithm);
                writer.u8(*fingerprint_type);
                writer.slice(fingerprint);
            }
            DnsResourceData::IpSecKey {
                precedence,
                algorithm,
                gateway,
                public_key,
            } => {
                writer.u8(*precedence);
                writer.u8(gateway.gateway_type());
                writer.u8(*algorithm);
                match gateway {
                    DnsGateway::None => {}
                    DnsGateway::IpV4(address) => writer.slice(&address.octets()),
                    DnsGateway::IpV6(address) => writer.slice(&address.octets()),
                    DnsGateway::DomainName(name) => writer.domain_name(name, false)?,
                }
                writer.slice(public_key);
            }
            DnsResourceData::NextDomainSecure {
                next_domain_name,
                types,
            } => {
                writer.domain_name(next_domain_name, false)?;
                write_type_bitmaps(types, writer);
            }
            DnsResourceData::NextDomainSecure3 {
                hash_algorithm,
                flags,
                iterations,
                salt,
                next_hashed_owner_name,
                types,
            } => {
                writer.u8(*hash_algorithm);
                writer.u8(*flags);
                writer.u16(*iterations);
                writer.string(salt)?;
                writer.string(next_hashed_owner_name)?;
                write_type_bitmaps(types, writer);
            }
            DnsResourceData::NextDomainSecure3Parameters {
                hash_algorithm,
                flags,
                iterations,
                salt,
            } => {
                writer.u8(*hash_algorithm);
                writer.u8(*flags);
                writer.u16(*iterations);
                writer.string(salt)?;
            }
            DnsResourceData::TlsCertificateAssociation {
                certificate_usage,
                selector,
                matching_type,
                certificate_association_data,
            } => {
                writer.u8(*certificate_usage);
                writer.u8(*selector);
                writer.u8(*matching_type);
                writer.slice(certificate_association_data);
            }
            DnsResourceData::HostIdentityProtocol {
                host_identity_tag,
                public_key_algorithm,
                public_key,
                rendezvous_servers,
            } => {
                writer.u8(u8_length(host_identity_tag.len(), "host identity tag")?);
                writer.u8(*public_key_algorithm);
                let key_length =
                    u16::try_from(public_key.len()).map_err(|_| PacketError::InvalidLength)?;
                writer.u16(key_length);
                writer.slice(host_identity_tag);
                writer.slice(public_key);
                for server in rendezvous_servers {
                    writer.domain_name(server, false)?;
                }
            }
            DnsResourceData::TransactionKey {
                algorithm,
                inception,
                expiration,
                mode,
                error,
                key,
                other,
            } => {
                writer.domain_name(algorithm, false)?;
                writer.u32(*inception);
                writer.u32(*expiration);
                writer.u16(*mode);
                writer.u16(*error);
                for data in [key, other] {
                    writer.u16(u16::try_from(data.len()).map_err(|_| PacketError::InvalidLength)?);
                    writer.slice(data);
                }
            }
            DnsResourceData::TransactionSignature {
                algorithm,
                time_signed,
                fudge,
                message_authentication_code,
                original_id,
                error,
                other,
            } => {
                if *time_signed >> 48 != 0 {
                    return Err(PacketError::InvalidFieldValue(format!(
                        "TSIG time signed {time_signed} exceeds 48 bits"
                    )));
                }
                writer.domain_name(algorithm, false)?;
                writer.u48(*time_signed);
                writer.u16(*fudge);
                writer.u16(
                    u16::try_from(message_authentication_code.len())
                        .map_err(|_| PacketError::InvalidLength)?,
                );
                writer.slice(message_authentication_code);
                writer.u16(*original_id);
                writer.u16(*error);
                writer.u16(u16::try_from(other.len()).map_err(|_| PacketError::InvalidLength)?);
                writer.slice(other);
            }
            DnsResourceData::Uri {
                priority,
                weight,
                target,
            } => {
                writer.u16(*priority);
                writer.u16(*weight);
                writer.slice(target);
            }
            DnsResourceData::CertificationAuthorityAuthorization { flags, tag, value } => {
                writer.u8(*flags);
                writer.string(tag)?;
                writer.slice(value);
            }
            DnsResourceData::Anonymous(data) => writer.slice(data),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::name::DnsDomainNameCompressionMode;

    fn round_trip(dns_type: DnsType, data: DnsResourceData) {
        let mut writer = DnsMessageWriter::new(DnsDomainNameCompressionMode::All);
        data.write(dns_type, &mut writer).unwrap();
        let length = writer.bytes.len();
        let parsed = DnsResourceData::parse(dns_type, &writer.bytes, 0, length);
        assert_eq!(parsed, Some(data), "{dns_type}");
    }

    #[test]
    fn test_name_based_types() {
        round_trip(DnsType::CNAME, DnsResourceData::DomainName("alias.example".into()));
        round_trip(
            DnsType::RP,
            DnsResourceData::DomainNames(vec!["mbox.example".into(), "txt.example".into()]),
        );
        round_trip(
            DnsType::MX,
            DnsResourceData::UShortDomainName {
                value: 10,
                domain_name: "mail.example".into(),
            },
        );
        round_trip(
            DnsType::SOA,
            DnsResourceData::StartOfAuthority {
                main_name_server: "ns.example".into(),
                responsible_mailbox: "admin.example".into(),
                serial: 2024010101,
                refresh: 7200,
                retry: 3600,
                expire: 1209600,
                minimum_ttl: 300,
            },
        );
        round_trip(
            DnsType::NAPTR,
            DnsResourceData::NamingAuthorityPointer {
                order: 100,
                preference: 10,
                flags: b"S".to_vec(),
                services: b"SIP+D2U".to_vec(),
                regexp: Vec::new(),
                replacement: "_sip._udp.example".into(),
            },
        );
    }

    #[test]
    fn test_string_counts_are_checked() {
        round_trip(
            DnsType::HINFO,
            DnsResourceData::Strings(vec![b"x86".to_vec(), b"linux".to_vec()]),
        );
        let one_string = [3, b'x', b'8', b'6'];
        assert_eq!(DnsResourceData::parse(DnsType::HINFO, &one_string, 0, 4), None);
        assert!(DnsResourceData::parse(DnsType::TXT, &one_string, 0, 4).is_some());
    }

    #[test]
    fn test_security_types() {
        round_trip(
            DnsType::RRSIG,
            DnsResourceData::Signature {
                type_covered: DnsType::A,
                algorithm: 8,
                labels: 2,
                original_ttl: 3600,
                signature_expiration: 2,
                signature_inception: 1,
                key_tag: 0x1234,
                signer_name: "example".into(),
                signature: vec![1, 2, 3, 4],
            },
        );
        round_trip(
            DnsType::NSEC,
            DnsResourceData::NextDomainSecure {
                next_domain_name: "b.example".into(),
                types: vec![DnsType::A, DnsType::MX, DnsType::RRSIG, DnsType::NSEC, DnsType::CAA],
            },
        );
        round_trip(
            DnsType::NSEC3,
            DnsResourceData::NextDomainSecure3 {
                hash_algorithm: 1,
                flags: 1,
                iterations: 12,
                salt: vec![0xAA, 0xBB],
                next_hashed_owner_name: vec![5; 20],
                types: vec![DnsType::NS, DnsType::SOA],
            },
        );
        round_trip(
            DnsType::IPSECKEY,
            DnsResourceData::IpSecKey {
                precedence: 10,
                algorithm: 2,
                gateway: DnsGateway::DomainName("gw.example".into()),
                public_key: vec![9, 9],
            },
        );
        round_trip(
            DnsType::TSIG,
            DnsResourceData::TransactionSignature {
                algorithm: "hmac-sha256".into(),
                time_signed: 0x0000_1234_5678_9ABC,
                fudge: 300,
                message_authentication_code: vec![1; 32],
                original_id: 7,
                error: 0,
                other: Vec::new(),
            },
        );
    }

    #[test]
    fn test_layout_types() {
        round_trip(
            DnsType::A6,
            DnsResourceData::A6 {
                prefix_length: 64,
                address_suffix: "::1:2:3:4".parse().unwrap(),
                prefix_name: "prefix.example".into(),
            },
        );
        round_trip(
            DnsType::APL,
            DnsResourceData::AddressPrefixList(vec![DnsAddressPrefix {
                address_family: 1,
                prefix_length: 24,
                negation: true,
                address_fragment: vec![192, 168, 1],
            }]),
        );
        round_trip(
            DnsType::NSAP,
            DnsResourceData::NetworkServiceAccessPoint {
                area_address: vec![0x47, 0x00, 0x05],
                system_identifier: 0x0102_0304_0506,
                selector: 1,
            },
        );
        round_trip(
            DnsType::HIP,
            DnsResourceData::HostIdentityProtocol {
                host_identity_tag: vec![1; 16],
                public_key_algorithm: 2,
                public_key: vec![3; 8],
                rendezvous_servers: vec!["rvs.example".into()],
            },
        );
        round_trip(
            DnsType::CAA,
            DnsResourceData::CertificationAuthorityAuthorization {
                flags: 0,
                tag: b"issue".to_vec(),
                value: b"ca.example".to_vec(),
            },
        );
    }

    #[test]
    fn test_type_bitmap_rejects_unordered_windows() {
        assert!(parse_type_bitmaps(&[1, 1, 0x80, 0, 1, 0x80]).is_none());
        assert_eq!(
            parse_type_bitmaps(&[0, 1, 0x40]).unwrap(),
            vec![DnsType::A]
        );
    }

    #[test]
    fn test_unknown_type_is_anonymous() {
        let data = [1, 2, 3];
        assert_eq!(
            DnsResourceData::parse(DnsType(65000), &data, 0, 3),
            Some(DnsResourceData::Anonymous(vec![1, 2, 3]))
        );
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let data = [1, 2, 3, 4, 5];
        assert_eq!(DnsResourceData::parse(DnsType::A, &data, 0, 5), None);
    }
}
