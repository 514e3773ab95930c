//! A Rust library for parsing and building network packets.
//!
//! Parsing and building are two views of the same protocols:
//!
//! - [`Packet`] wraps captured bytes; protocol datagrams such as
//!   [`ethernet::EthernetDatagram`] are cheap, lazily validated views into them
//! - [`Layer`] values describe headers to write; [`PacketBuilder`] serializes
//!   an ordered stack of them, inferring lengths, protocol numbers and checksums
//! - every datagram can `extract_layer()`, so a parsed packet rebuilds byte for byte
//! - raw socket support for sending and receiving packets, with async support via Tokio
//! - layers derive Serde traits so packet templates can be stored and reloaded
//!
//! Malformed input never fails to parse: accessors return bounded defaults and
//! [`Datagram::is_valid`] reports whether the bytes hold together.

pub mod arp;
pub mod builder;
pub mod bytes_ext;
pub mod checksum;
pub mod datagram;
pub mod dhcp;
pub mod dns;
pub mod error;
pub mod ethernet;
pub mod gre;
pub mod http;
pub mod icmp;
pub mod igmp;
pub mod ip;
pub mod ipv4;
pub mod ipv6;
pub mod layer;
pub mod packet;
pub mod socket;
pub mod tcp;
pub mod udp;
pub mod vlan;

pub use builder::PacketBuilder;
pub use datagram::{DataSegment, Datagram};
pub use error::PacketError;
pub use layer::{Layer, PayloadLayer};
pub use packet::{DataLinkKind, Packet};

/// Trait for datagrams that carry a self-contained checksum.
///
/// TCP and UDP checksums also cover the enclosing IP addresses, so those
/// datagrams check against a [`checksum::PseudoHeader`] instead.
pub trait Checksumable {
    /// The checksum stored in the datagram.
    fn checksum(&self) -> u16;

    /// The checksum the datagram's bytes should carry.
    fn calculate_checksum(&self) -> u16;

    fn is_checksum_correct(&self) -> bool {
        self.checksum() == self.calculate_checksum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    use chrono::{TimeZone, Utc};

    use crate::dns::{DnsLayer, DnsType};
    use crate::ethernet::{EtherType, EthernetLayer, MacAddress};
    use crate::ip::IpProtocol;
    use crate::ipv4::IpV4Layer;
    use crate::udp::UdpLayer;

    const SOURCE_MAC: MacAddress = MacAddress::new([0x00, 0x01, 0x02, 0x03, 0x04, 0x05]);
    const DESTINATION_MAC: MacAddress = MacAddress::new([0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5]);

    fn example_layers(payload: Box<dyn Layer>, destination_port: u16) -> Vec<Box<dyn Layer>> {
        vec![
            Box::new(
                EthernetLayer::builder()
                    .source(SOURCE_MAC)
                    .destination(DESTINATION_MAC)
                    .build()
                    .unwrap(),
            ),
            Box::new(
                IpV4Layer::builder()
                    .ttl(64)
                    .source(Ipv4Addr::new(10, 0, 0, 1))
                    .destination(Ipv4Addr::new(10, 0, 0, 2))
                    .build()
                    .unwrap(),
            ),
            Box::new(
                UdpLayer::builder()
                    .src_port(1234)
                    .dst_port(destination_port)
                    .build()
                    .unwrap(),
            ),
            payload,
        ]
    }

    fn timestamp() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_ethernet_ipv4_udp_packet() {
        let layers = example_layers(Box::new(PayloadLayer::new(vec![1, 2, 3, 4])), 80);
        let packet = PacketBuilder::build_packet(timestamp(), layers).unwrap();

        assert_eq!(packet.len(), 14 + 20 + 8 + 4);
        assert_eq!(packet.data_link(), DataLinkKind::Ethernet);
        assert!(packet.is_valid());

        let ethernet = packet.ethernet();
        assert!(ethernet.is_valid());
        assert_eq!(ethernet.source(), SOURCE_MAC);
        assert_eq!(ethernet.destination(), DESTINATION_MAC);
        assert_eq!(ethernet.ether_type(), EtherType::IPV4);

        let ip = ethernet.ip_v4();
        assert!(ip.is_valid());
        assert!(ip.is_checksum_correct());
        assert_eq!(ip.ttl(), 64);
        assert_eq!(ip.protocol(), IpProtocol::UDP);
        assert_eq!(ip.total_length(), 32);
        assert_eq!(ip.source(), Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(ip.destination(), Ipv4Addr::new(10, 0, 0, 2));

        let udp = ip.udp();
        assert!(udp.is_valid());
        assert!(udp.is_checksum_correct(ip.pseudo_header()));
        assert_eq!(udp.source_port(), 1234);
        assert_eq!(udp.destination_port(), 80);
        assert_eq!(udp.total_length(), 12);
        assert_eq!(udp.payload().as_slice(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_extracted_layers_rebuild_identical_bytes() {
        let layers = example_layers(Box::new(DnsLayer::query(7, "example.com", DnsType::A)), 53);
        let packet = PacketBuilder::build_packet(timestamp(), layers).unwrap();

        let ethernet = packet.ethernet();
        let ip = ethernet.ip_v4();
        let udp = ip.udp();
        let dns = udp.dns();
        assert!(dns.is_valid());

        let rebuilt: Vec<Box<dyn Layer>> = vec![
            Box::new(ethernet.extract_layer()),
            Box::new(ip.extract_layer()),
            Box::new(udp.extract_layer()),
            Box::new(dns.extract_layer()),
        ];
        let again = PacketBuilder::build_packet(packet.timestamp(), rebuilt).unwrap();
        assert_eq!(again, packet);
    }

    #[test]
    fn test_truncated_packets_are_invalid() {
        let layers = example_layers(Box::new(DnsLayer::query(7, "example.com", DnsType::A)), 53);
        let packet = PacketBuilder::build_packet(timestamp(), layers).unwrap();
        let bytes = packet.as_bytes().to_vec();

        for length in 0..bytes.len() {
            let truncated =
                Packet::new(bytes[..length].to_vec(), timestamp(), DataLinkKind::Ethernet);
            assert!(!truncated.is_valid(), "length {}", length);

            let ethernet = truncated.ethernet();
            let ip = ethernet.ip_v4();
            let udp = ip.udp();
            let dns = udp.dns();
            let _ = (ethernet.source(), ethernet.ether_type());
            let _ = (ip.ttl(), ip.source(), ip.header_length(), ip.is_checksum_correct());
            let _ = (udp.source_port(), udp.total_length(), udp.is_valid());
            let _ = (dns.id(), dns.query_count(), dns.is_valid());
        }
    }

    #[test]
    fn test_header_checksum_flip() {
        let layers = example_layers(Box::new(PayloadLayer::new(vec![1, 2, 3, 4])), 80);
        let packet = PacketBuilder::build_packet(timestamp(), layers).unwrap();

        let mut bytes = packet.as_bytes().to_vec();
        // TTL
        bytes[14 + 8] ^= 0x01;
        let corrupted = Packet::new(bytes, packet.timestamp(), packet.data_link());
        let ip = corrupted.ethernet().ip_v4();
        assert!(!ip.is_checksum_correct());
        assert!(!ip.is_valid());
        assert!(!corrupted.is_valid());
    }

    #[test]
    fn test_payload_flip_breaks_udp_checksum() {
        let layers = example_layers(Box::new(PayloadLayer::new(vec![1, 2, 3, 4])), 80);
        let packet = PacketBuilder::build_packet(timestamp(), layers).unwrap();

        let mut bytes = packet.as_bytes().to_vec();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        let corrupted = Packet::new(bytes, packet.timestamp(), packet.data_link());
        let ip = corrupted.ethernet().ip_v4();
        assert!(ip.is_checksum_correct());
        assert!(!ip.udp().is_checksum_correct(ip.pseudo_header()));
        assert!(!ip.is_valid());
    }

    #[test]
    fn test_layer_templates_survive_json() {
        let ethernet = EthernetLayer::builder()
            .source(SOURCE_MAC)
            .destination(DESTINATION_MAC)
            .build()
            .unwrap();
        let ip = IpV4Layer::builder()
            .ttl(64)
            .source(Ipv4Addr::new(10, 0, 0, 1))
            .destination(Ipv4Addr::new(10, 0, 0, 2))
            .build()
            .unwrap();
        let udp = UdpLayer::builder().src_port(1234).dst_port(53).build().unwrap();
        let dns = DnsLayer::query(7, "example.com", DnsType::A);

        let ethernet: EthernetLayer =
            serde_json::from_str(&serde_json::to_string(&ethernet).unwrap()).unwrap();
        let ip: IpV4Layer = serde_json::from_str(&serde_json::to_string(&ip).unwrap()).unwrap();
        let udp: UdpLayer = serde_json::from_str(&serde_json::to_string(&udp).unwrap()).unwrap();
        let dns: DnsLayer = serde_json::from_str(&serde_json::to_string(&dns).unwrap()).unwrap();

        let from_template = PacketBuilder::build_packet(
            timestamp(),
            vec![Box::new(ethernet), Box::new(ip), Box::new(udp), Box::new(dns)],
        )
        .unwrap();
        let direct = PacketBuilder::build_packet(
            timestamp(),
            example_layers(Box::new(DnsLayer::query(7, "example.com", DnsType::A)), 53),
        )
        .unwrap();
        assert_eq!(from_template, direct);
    }

    #[test]
    fn test_packet_hex_round_trip() {
        let layers = example_layers(Box::new(PayloadLayer::new(vec![1, 2, 3, 4])), 80);
        let packet = PacketBuilder::build_packet(timestamp(), layers).unwrap();

        let text = bytes_ext::to_hex(packet.as_bytes());
        assert!(text.starts_with("a0a1a2a3a4a5000102030405"));
        let parsed = Packet::from_hex(&text, packet.timestamp(), DataLinkKind::Ethernet).unwrap();
        assert_eq!(parsed, packet);

        assert!(matches!(
            Packet::from_hex("0g", timestamp(), DataLinkKind::Ethernet),
            Err(PacketError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_builder_rejects_empty_and_unframed_stacks() {
        assert!(matches!(PacketBuilder::new(Vec::new()), Err(PacketError::NoLayers)));

        let layers: Vec<Box<dyn Layer>> =
            vec![Box::new(UdpLayer::builder().src_port(1).dst_port(2).build().unwrap())];
        assert!(matches!(PacketBuilder::new(layers), Err(PacketError::NoDataLink("UDP"))));
    }
}
