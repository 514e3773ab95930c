//! Captured or built packets.
//!
//! A [`Packet`] is the unit exchanged with capture and injection code: the
//! raw link-layer bytes, the capture timestamp and the link type that says
//! how to interpret the first byte.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::PacketError;
use crate::bytes_ext;
use crate::datagram::{DataSegment, Datagram};
use crate::ethernet::EthernetDatagram;
use crate::ipv4::IpV4Datagram;
use crate::ipv6::IpV6Datagram;

/// Framing of the first byte of a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataLinkKind {
    Ethernet,
    /// Raw IPv4 without link-layer framing.
    IpV4,
    /// Raw IPv6 without link-layer framing.
    IpV6,
}

/// Link-layer bytes plus capture metadata.
///
/// Two packets are equal when their bytes, timestamps and link types are equal.
#[derive(Debug, Clone)]
pub struct Packet {
    segment: DataSegment,
    timestamp: DateTime<Utc>,
    data_link: DataLinkKind,
    validity: OnceCell<bool>,
}

impl Packet {
    pub fn new(data: impl Into<Bytes>, timestamp: DateTime<Utc>, data_link: DataLinkKind) -> Self {
        Self {
            segment: DataSegment::new(data),
            timestamp,
            data_link,
            validity: OnceCell::new(),
        }
    }

    /// Builds a packet from a hex dump such as `"a0a1a2a3a4a5 0001..."`.
    pub fn from_hex(
        text: &str,
        timestamp: DateTime<Utc>,
        data_link: DataLinkKind,
    ) -> Result<Self, PacketError> {
        Ok(Self::new(bytes_ext::from_hex(text)?, timestamp, data_link))
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn data_link(&self) -> DataLinkKind {
        self.data_link
    }

    /// The bytes to hand to an injector or dump writer.
    pub fn as_bytes(&self) -> &[u8] {
        self.segment.as_slice()
    }

    /// A cheap shared handle to the packet's buffer.
    pub fn bytes(&self) -> Bytes {
        self.segment.bytes().clone()
    }

    /// The packet viewed as an Ethernet frame.
    pub fn ethernet(&self) -> EthernetDatagram {
        EthernetDatagram::new(self.segment.clone())
    }

    /// The packet viewed as a raw IPv4 datagram.
    pub fn ip_v4(&self) -> IpV4Datagram {
        IpV4Datagram::new(self.segment.clone())
    }

    /// The packet viewed as a raw IPv6 datagram.
    pub fn ip_v6(&self) -> IpV6Datagram {
        IpV6Datagram::new(self.segment.clone())
    }
}

impl Datagram for Packet {
    fn segment(&self) -> &DataSegment {
        &self.segment
    }

    fn validity(&self) -> &OnceCell<bool> {
        &self.validity
    }

    fn calculate_is_valid(&self) -> bool {
        match self.data_link {
            DataLinkKind::Ethernet => self.ethernet().is_valid(),
            DataLinkKind::IpV4 => self.ip_v4().is_valid(),
            DataLinkKind::IpV6 => self.ip_v6().is_valid(),
        }
    }
}

impl PartialEq for Packet {
    fn eq(&self, other: &Self) -> bool {
        self.segment == other.segment
            && self.timestamp == other.timestamp
            && self.data_link == other.data_link
    }
}

impl Eq for Packet {}
