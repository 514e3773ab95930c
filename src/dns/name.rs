//! Domain names and their compressed wire encoding (RFC 1035 section 4.1.4).

use std::collections::HashMap;
use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::PacketError;
use crate::bytes_ext::{Endianity, read_u16};

const MAX_LABEL_LENGTH: usize = 63;
const POINTER_FLAGS: u8 = 0xC0;
const POINTER_OFFSET_MASK: u16 = 0x3FFF;
const MAX_POINTER_HOPS: usize = 128;
/// Offsets at or past this cannot be expressed by a pointer.
const MAX_POINTER_TARGET: usize = 0x4000;

/// A domain name as a list of raw labels, without the root label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DnsDomainName {
    labels: Vec<Vec<u8>>,
}

impl DnsDomainName {
    /// Parses dotted text such as `"www.example.com"`. Empty labels are skipped.
    pub fn new(name: &str) -> Self {
        Self {
            labels: name
                .split('.')
                .filter(|label| !label.is_empty())
                .map(|label| label.as_bytes().to_vec())
                .collect(),
        }
    }

    pub fn root() -> Self {
        Self::default()
    }

    pub fn from_labels(labels: Vec<Vec<u8>>) -> Self {
        Self { labels }
    }

    pub fn labels(&self) -> &[Vec<u8>] {
        &self.labels
    }

    pub fn is_root(&self) -> bool {
        self.labels.is_empty()
    }

    /// Uncompressed wire length, including the terminating root label.
    pub fn non_compressed_length(&self) -> usize {
        self.labels.iter().map(|label| label.len() + 1).sum::<usize>() + 1
    }

    /// Reads a possibly compressed name starting at `offset` of a DNS message.
    ///
    /// Returns the name and the number of bytes it occupies at `offset`.
    /// Pointers must point strictly backwards of the label run they end and
    /// at most `MAX_POINTER_HOPS` are followed, so crafted loops terminate.
    pub fn parse(message: &[u8], offset: usize) -> Option<(DnsDomainName, usize)> {
        let mut labels = Vec::new();
        let mut position = offset;
        let mut run_start = offset;
        let mut consumed: Option<usize> = None;
        let mut hops = 0;

        loop {
            let length = *message.get(position)?;
            if length & POINTER_FLAGS == POINTER_FLAGS {
                if position + 1 >= message.len() {
                    return None;
                }
                let target = usize::from(read_u16(message, position, Endianity::Big) & POINTER_OFFSET_MASK);
                consumed.get_or_insert_with(|| position + 2 - offset);
                hops += 1;
                if hops > MAX_POINTER_HOPS || target >= run_start {
                    debug!("DNS compression pointer to {target} rejected after {hops} hops");
                    return None;
                }
                run_start = target;
                position = target;
                continue;
            }
            if length & POINTER_FLAGS != 0 {
                // Extended label types are not supported.
                return None;
            }
            if length == 0 {
                consumed.get_or_insert_with(|| position + 1 - offset);
                break;
            }
            let start = position + 1;
            let label = message.get(start..start + usize::from(length))?;
            labels.push(label.to_vec());
            position = start + usize::from(length);
        }

        consumed.map(|consumed| (DnsDomainName { labels }, consumed))
    }

    fn suffix_key(&self, from: usize) -> Vec<Vec<u8>> {
        self.labels[from..]
            .iter()
            .map(|label| label.to_ascii_lowercase())
            .collect()
    }
}

impl fmt::Display for DnsDomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.labels.is_empty() {
            return write!(f, ".");
        }
        for label in &self.labels {
            write!(f, "{}.", String::from_utf8_lossy(label))?;
        }
        Ok(())
    }
}

impl From<&str> for DnsDomainName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// How domain names are written by a [`DnsLayer`](super::DnsLayer).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DnsDomainNameCompressionMode {
    /// Reuse every suffix already written in the message.
    #[default]
    All,
    Nothing,
}

/// Accumulates a DNS message, remembering where name suffixes were written.
pub(crate) struct DnsMessageWriter {
    pub(crate) bytes: Vec<u8>,
    mode: DnsDomainNameCompressionMode,
    suffixes: HashMap<Vec<Vec<u8>>, u16>,
}

impl DnsMessageWriter {
    pub(crate) fn new(mode: DnsDomainNameCompressionMode) -> Self {
        Self {
            bytes: Vec::new(),
            mode,
            suffixes: HashMap::new(),
        }
    }

    pub(crate) fn position(&self) -> usize {
        self.bytes.len()
    }

    pub(crate) fn u8(&mut self, value: u8) {
        self.bytes.push(value);
    }

    pub(crate) fn u16(&mut self, value: u16) {
        self.bytes.extend_from_slice(&value.to_be_bytes());
    }

    pub(crate) fn u32(&mut self, value: u32) {
        self.bytes.extend_from_slice(&value.to_be_bytes());
    }

    pub(crate) fn u48(&mut self, value: u64) {
        self.bytes.extend_from_slice(&value.to_be_bytes()[2..]);
    }

    pub(crate) fn u64(&mut self, value: u64) {
        self.bytes.extend_from_slice(&value.to_be_bytes());
    }

    pub(crate) fn slice(&mut self, data: &[u8]) {
        self.bytes.extend_from_slice(data);
    }

    /// Writes a length-prefixed character string.
    pub(crate) fn string(&mut self, data: &[u8]) -> Result<(), PacketError> {
        let length = u8::try_from(data.len()).map_err(|_| {
            PacketError::InvalidFieldValue(format!("DNS string of {} bytes exceeds 255", data.len()))
        })?;
        self.u8(length);
        self.slice(data);
        Ok(())
    }

    /// Overwrites a 16-bit field written earlier.
    pub(crate) fn patch_u16(&mut self, at: usize, value: u16) {
        self.bytes[at..at + 2].copy_from_slice(&value.to_be_bytes());
    }

    /// Writes `name`, pointing at an earlier copy of a suffix when allowed.
    pub(crate) fn domain_name(
        &mut self,
        name: &DnsDomainName,
        compress: bool,
    ) -> Result<(), PacketError> {
        let compress = compress && self.mode == DnsDomainNameCompressionMode::All;
        for (index, label) in name.labels.iter().enumerate() {
            if compress {
                let key = name.suffix_key(index);
                if let Some(&target) = self.suffixes.get(&key) {
                    self.u16((u16::from(POINTER_FLAGS) << 8) | target);
                    return Ok(());
                }
                if self.position() < MAX_POINTER_TARGET {
                    self.suffixes.insert(key, self.position() as u16);
                }
            }
            if label.is_empty() || label.len() > MAX_LABEL_LENGTH {
                return Err(PacketError::InvalidFieldValue(format!(
                    "DNS label of {} bytes in {name}",
                    label.len()
                )));
            }
            self.u8(label.len() as u8);
            self.slice(label);
        }
        self.u8(0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_name() {
        let message = b"\x03www\x07example\x03com\x00";
        let (name, consumed) = DnsDomainName::parse(message, 0).unwrap();
        assert_eq!(name, DnsDomainName::new("www.example.com"));
        assert_eq!(consumed, message.len());
        assert_eq!(name.to_string(), "www.example.com.");
    }

    #[test]
    fn test_parse_compressed_name() {
        let mut message = b"\x07example\x03com\x00".to_vec();
        message.extend_from_slice(b"\x03www\xC0\x00");
        let (name, consumed) = DnsDomainName::parse(&message, 13).unwrap();
        assert_eq!(name, DnsDomainName::new("www.example.com"));
        assert_eq!(consumed, 6);
    }

    #[test]
    fn test_pointer_to_name_far_before_start() {
        let mut message = b"\x03com\x00".to_vec();
        message.resize(20, 0);
        message.extend_from_slice(b"\x07example\xC0\x00");
        let (name, consumed) = DnsDomainName::parse(&message, 20).unwrap();
        assert_eq!(name, DnsDomainName::new("example.com"));
        assert_eq!(consumed, 10);
    }

    #[test]
    fn test_self_pointer_terminates() {
        let message = [0u8, 0, 0xC0, 0x02];
        assert!(DnsDomainName::parse(&message, 2).is_none());
    }

    #[test]
    fn test_pointer_loop_terminates() {
        // Two names pointing at each other.
        let message = [0xC0, 0x02, 0xC0, 0x00];
        assert!(DnsDomainName::parse(&message, 2).is_none());
        assert!(DnsDomainName::parse(&message, 0).is_none());
    }

    #[test]
    fn test_truncated_label() {
        assert!(DnsDomainName::parse(b"\x05ab", 0).is_none());
        assert!(DnsDomainName::parse(b"", 0).is_none());
    }

    #[test]
    fn test_writer_compresses_suffixes() {
        let mut writer = DnsMessageWriter::new(DnsDomainNameCompressionMode::All);
        writer.domain_name(&DnsDomainName::new("example.com"), true).unwrap();
        writer.domain_name(&DnsDomainName::new("WWW.Example.com"), true).unwrap();
        assert_eq!(&writer.bytes[13..], b"\x03WWW\xC0\x00");

        let (name, _) = DnsDomainName::parse(&writer.bytes, 13).unwrap();
        assert_eq!(name.to_string(), "WWW.example.com.");
    }

    #[test]
    fn test_writer_without_compression() {
        let mut writer = DnsMessageWriter::new(DnsDomainNameCompressionMode::Nothing);
        let name = DnsDomainName::new("a.b");
        writer.domain_name(&name, true).unwrap();
        writer.domain_name(&name, true).unwrap();
        assert_eq!(writer.bytes.len(), 2 * name.non_compressed_length());
    }

    #[test]
    fn test_root_name() {
        let mut writer = DnsMessageWriter::new(DnsDomainNameCompressionMode::All);
        writer.domain_name(&DnsDomainName::root(), true).unwrap();
        assert_eq!(writer.bytes, vec![0]);
        assert_eq!(DnsDomainName::root().to_string(), ".");
    }
}
