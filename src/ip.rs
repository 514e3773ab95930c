//! Items shared by IPv4 and IPv6: protocol numbers and payload dispatch.

use std::collections::HashMap;
use std::fmt;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

use crate::bytes_ext::{Endianity, set_u16};
use crate::checksum::PseudoHeader;
use crate::datagram::{DataSegment, Datagram};
use crate::gre::GreDatagram;
use crate::icmp::IcmpDatagram;
use crate::igmp::IgmpDatagram;
use crate::ipv4::IpV4Datagram;
use crate::ipv6::IpV6Datagram;
use crate::layer::Layer;
use crate::tcp::TcpDatagram;
use crate::udp::UdpDatagram;

/// IP Protocol Numbers
///
/// Also used as IPv6 next-header values.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IpProtocol(pub u8);

impl IpProtocol {
    pub const IPV6_HOP_BY_HOP_OPTION: IpProtocol = IpProtocol(0);
    pub const ICMP: IpProtocol = IpProtocol(1);
    pub const IGMP: IpProtocol = IpProtocol(2);
    pub const IP_IN_IP: IpProtocol = IpProtocol(4);
    pub const TCP: IpProtocol = IpProtocol(6);
    pub const UDP: IpProtocol = IpProtocol(17);
    pub const IPV6: IpProtocol = IpProtocol(41);
    pub const IPV6_ROUTE: IpProtocol = IpProtocol(43);
    pub const IPV6_FRAGMENT: IpProtocol = IpProtocol(44);
    pub const GRE: IpProtocol = IpProtocol(47);
    pub const ENCAPSULATING_SECURITY_PAYLOAD: IpProtocol = IpProtocol(50);
    pub const AUTHENTICATION_HEADER: IpProtocol = IpProtocol(51);
    pub const ICMPV6: IpProtocol = IpProtocol(58);
    pub const IPV6_NO_NEXT_HEADER: IpProtocol = IpProtocol(59);
    pub const IPV6_DESTINATION_OPTIONS: IpProtocol = IpProtocol(60);
    pub const MOBILITY_HEADER: IpProtocol = IpProtocol(135);
}

lazy_static! {
    static ref IP_PROTOCOL_NAMES: HashMap<u8, &'static str> = HashMap::from([
        (0, "IPv6 Hop-by-Hop Option"),
        (1, "ICMP"),
        (2, "IGMP"),
        (4, "IP in IP"),
        (6, "TCP"),
        (17, "UDP"),
        (41, "IPv6"),
        (43, "IPv6 Routing"),
        (44, "IPv6 Fragment"),
        (47, "GRE"),
        (50, "ESP"),
        (51, "AH"),
        (58, "ICMPv6"),
        (59, "IPv6 No Next Header"),
        (60, "IPv6 Destination Options"),
        (135, "Mobility Header"),
    ]);
}

impl fmt::Display for IpProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match IP_PROTOCOL_NAMES.get(&self.0) {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "{}", self.0),
        }
    }
}

/// The datagram an IP protocol field announces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpPayload {
    Icmp(IcmpDatagram),
    Igmp(IgmpDatagram),
    Tcp(TcpDatagram),
    Udp(UdpDatagram),
    Gre(GreDatagram),
    IpV4(IpV4Datagram),
    IpV6(IpV6Datagram),
    Unknown(IpProtocol, DataSegment),
}

impl IpPayload {
    pub fn new(protocol: IpProtocol, segment: DataSegment) -> Self {
        match protocol {
            IpProtocol::ICMP => IpPayload::Icmp(IcmpDatagram::new(segment)),
            IpProtocol::IGMP => IpPayload::Igmp(IgmpDatagram::new(segment)),
            IpProtocol::TCP => IpPayload::Tcp(TcpDatagram::new(segment)),
            IpProtocol::UDP => IpPayload::Udp(UdpDatagram::new(segment)),
            IpProtocol::GRE => IpPayload::Gre(GreDatagram::new(segment)),
            IpProtocol::IP_IN_IP => IpPayload::IpV4(IpV4Datagram::new(segment)),
            IpProtocol::IPV6 => IpPayload::IpV6(IpV6Datagram::new(segment)),
            other => IpPayload::Unknown(other, segment),
        }
    }

    /// Validity of the payload; unknown protocols are taken as valid.
    pub fn is_valid(&self) -> bool {
        match self {
            IpPayload::Icmp(datagram) => datagram.is_valid(),
            IpPayload::Igmp(datagram) => datagram.is_valid(),
            IpPayload::Tcp(datagram) => datagram.is_valid(),
            IpPayload::Udp(datagram) => datagram.is_valid(),
            IpPayload::Gre(datagram) => datagram.is_valid(),
            IpPayload::IpV4(datagram) => datagram.is_valid(),
            IpPayload::IpV6(datagram) => datagram.is_valid(),
            IpPayload::Unknown(..) => true,
        }
    }
}

/// Checks the pseudo-header checksum of a TCP or UDP segment.
///
/// Other protocols have no pseudo-header checksum and are reported correct.
pub(crate) fn is_transport_checksum_correct(
    pseudo_header: PseudoHeader,
    protocol: IpProtocol,
    segment: &DataSegment,
) -> bool {
    match protocol {
        IpProtocol::TCP => TcpDatagram::new(segment.clone()).is_checksum_correct(pseudo_header),
        IpProtocol::UDP => UdpDatagram::new(segment.clone()).is_checksum_correct(pseudo_header),
        _ => true,
    }
}

/// Computes the checksum of a transport layer that left it unset.
pub(crate) fn write_transport_checksum(
    buffer: &mut [u8],
    transport_offset: usize,
    transport_length: usize,
    pseudo_header: PseudoHeader,
    protocol: IpProtocol,
    next: Option<&dyn Layer>,
) {
    let Some(transport) = next.and_then(|next| next.as_ip_next_transport()) else {
        return;
    };
    if transport.checksum().is_some() {
        return;
    }
    let checksum_offset = transport.checksum_offset();
    let segment = &buffer[transport_offset..transport_offset + transport_length];
    let mut value = pseudo_header.transport_checksum(protocol.0, segment, checksum_offset);
    if value == 0 && transport.is_checksum_optional() {
        // Zero means "no checksum" for UDP.
        value = 0xFFFF;
    }
    set_u16(
        buffer,
        transport_offset + checksum_offset,
        value,
        Endianity::Big,
    );
}
