//! DHCP (Dynamic Host Configuration Protocol) implementation.
//!
//! DHCP messages ride on BOOTP framing (RFC 951, RFC 2131): a fixed
//! 236-byte header, the magic cookie, then TLV options (RFC 2132).

use std::net::Ipv4Addr;

use log::trace;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::PacketError;
use crate::bytes_ext::{Endianity, write_bytes, write_ipv4, write_u8, write_u16, write_u32};
use crate::datagram::{DataSegment, Datagram, impl_datagram_eq};
use crate::ethernet::MacAddress;
use crate::layer::Layer;

mod offset {
    pub const OP: usize = 0;
    pub const HTYPE: usize = 1;
    pub const HLEN: usize = 2;
    pub const HOPS: usize = 3;
    pub const XID: usize = 4;
    pub const SECS: usize = 8;
    pub const FLAGS: usize = 10;
    pub const CIADDR: usize = 12;
    pub const YIADDR: usize = 16;
    pub const SIADDR: usize = 20;
    pub const GIADDR: usize = 24;
    pub const CHADDR: usize = 28;
    pub const SNAME: usize = 44;
    pub const FILE: usize = 108;
    pub const MAGIC_COOKIE: usize = 236;
    pub const OPTIONS: usize = 240;
}

const CHADDR_LENGTH: usize = 16;
const SNAME_LENGTH: usize = 64;
const FILE_LENGTH: usize = 128;

pub const MAGIC_COOKIE: u32 = 0x6382_5363;
pub const SERVER_PORT: u16 = 67;
pub const CLIENT_PORT: u16 = 68;

pub const BOOT_REQUEST: u8 = 1;
pub const BOOT_REPLY: u8 = 2;

/// Set in `flags` when the client wants replies broadcast.
pub const FLAG_BROADCAST: u16 = 0x8000;

/// DHCP message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum DhcpMessageType {
    /// DHCP Discover message
    Discover = 1,
    /// DHCP Offer message
    Offer = 2,
    /// DHCP Request message
    Request = 3,
    /// DHCP Decline message
    Decline = 4,
    /// DHCP Acknowledge message
    Ack = 5,
    /// DHCP Not Acknowledge message
    Nak = 6,
    /// DHCP Release message
    Release = 7,
    /// DHCP Inform message
    Inform = 8,
}

impl DhcpMessageType {
    pub fn from_u8(value: u8) -> Option<Self> {
        use DhcpMessageType::*;
        [Discover, Offer, Request, Decline, Ack, Nak, Release, Inform]
            .into_iter()
            .find(|message_type| *message_type as u8 == value)
    }
}

/// DHCP option codes. Unlisted codes are carried as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DhcpOptionCode(pub u8);

impl DhcpOptionCode {
    pub const PAD: DhcpOptionCode = DhcpOptionCode(0);
    pub const SUBNET_MASK: DhcpOptionCode = DhcpOptionCode(1);
    pub const ROUTER: DhcpOptionCode = DhcpOptionCode(3);
    pub const DOMAIN_NAME_SERVER: DhcpOptionCode = DhcpOptionCode(6);
    pub const HOST_NAME: DhcpOptionCode = DhcpOptionCode(12);
    pub const DOMAIN_NAME: DhcpOptionCode = DhcpOptionCode(15);
    pub const INTERFACE_MTU: DhcpOptionCode = DhcpOptionCode(26);
    pub const BROADCAST_ADDRESS: DhcpOptionCode = DhcpOptionCode(28);
    pub const NTP_SERVERS: DhcpOptionCode = DhcpOptionCode(42);
    pub const REQUESTED_IP_ADDRESS: DhcpOptionCode = DhcpOptionCode(50);
    pub const IP_ADDRESS_LEASE_TIME: DhcpOptionCode = DhcpOptionCode(51);
    pub const MESSAGE_TYPE: DhcpOptionCode = DhcpOptionCode(53);
    pub const SERVER_IDENTIFIER: DhcpOptionCode = DhcpOptionCode(54);
    pub const PARAMETER_REQUEST_LIST: DhcpOptionCode = DhcpOptionCode(55);
    pub const MAX_DHCP_MESSAGE_SIZE: DhcpOptionCode = DhcpOptionCode(57);
    pub const RENEWAL_TIME_VALUE: DhcpOptionCode = DhcpOptionCode(58);
    pub const REBINDING_TIME_VALUE: DhcpOptionCode = DhcpOptionCode(59);
    pub const CLIENT_IDENTIFIER: DhcpOptionCode = DhcpOptionCode(61);
    pub const END: DhcpOptionCode = DhcpOptionCode(255);
}

/// One TLV option; Pad and End are framing and never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DhcpOption {
    pub code: DhcpOptionCode,
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
}

impl DhcpOption {
    /// Creates a new DHCP option.
    pub fn new(code: DhcpOptionCode, data: Vec<u8>) -> Self {
        Self { code, data }
    }

    /// Creates a message type option.
    pub fn message_type(message_type: DhcpMessageType) -> Self {
        Self::new(DhcpOptionCode::MESSAGE_TYPE, vec![message_type as u8])
    }

    /// Creates a requested IP address option.
    pub fn requested_ip_address(addr: Ipv4Addr) -> Self {
        Self::new(DhcpOptionCode::REQUESTED_IP_ADDRESS, addr.octets().to_vec())
    }

    /// Creates a server identifier option.
    pub fn server_identifier(addr: Ipv4Addr) -> Self {
        Self::new(DhcpOptionCode::SERVER_IDENTIFIER, addr.octets().to_vec())
    }

    /// Creates a client identifier option.
    pub fn client_identifier(hardware_type: u8, mac: MacAddress) -> Self {
        let mut data = Vec::with_capacity(7);
        data.push(hardware_type);
        data.extend_from_slice(mac.as_bytes());
        Self::new(DhcpOptionCode::CLIENT_IDENTIFIER, data)
    }

    pub fn subnet_mask(mask: Ipv4Addr) -> Self {
        Self::new(DhcpOptionCode::SUBNET_MASK, mask.octets().to_vec())
    }

    pub fn addresses(code: DhcpOptionCode, addresses: &[Ipv4Addr]) -> Self {
        Self::new(code, addresses.iter().flat_map(Ipv4Addr::octets).collect())
    }

    pub fn host_name(name: &str) -> Self {
        Self::new(DhcpOptionCode::HOST_NAME, name.as_bytes().to_vec())
    }

    pub fn lease_time(seconds: u32) -> Self {
        Self::new(DhcpOptionCode::IP_ADDRESS_LEASE_TIME, seconds.to_be_bytes().to_vec())
    }

    pub fn parameter_request_list(codes: &[DhcpOptionCode]) -> Self {
        Self::new(
            DhcpOptionCode::PARAMETER_REQUEST_LIST,
            codes.iter().map(|code| code.0).collect(),
        )
    }

    /// Wire length: code, length and data.
    pub fn length(&self) -> usize {
        2 + self.data.len()
    }

    fn as_address(&self) -> Option<Ipv4Addr> {
        let octets: [u8; 4] = self.data.as_slice().try_into().ok()?;
        Some(Ipv4Addr::from(octets))
    }

    fn as_addresses(&self) -> Option<Vec<Ipv4Addr>> {
        if self.data.is_empty() || self.data.len() % 4 != 0 {
            return None;
        }
        Some(
            self.data
                .chunks_exact(4)
                .map(|chunk| Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]))
                .collect(),
        )
    }
}

/// Walks the options area. The flag is false when an option runs past the
/// data or the End option is missing.
fn parse_options(bytes: &[u8]) -> (Vec<DhcpOption>, bool) {
    let mut options = Vec::new();
    let mut position = 0;
    while position < bytes.len() {
        let code = DhcpOptionCode(bytes[position]);
        match code {
            DhcpOptionCode::PAD => {
                position += 1;
                continue;
            }
            DhcpOptionCode::END => return (options, true),
            _ => {}
        }
        let Some(&length) = bytes.get(position + 1) else {
            trace!("DHCP option {} truncated before its length", code.0);
            return (options, false);
        };
        let start = position + 2;
        let Some(data) = bytes.get(start..start + usize::from(length)) else {
            trace!("DHCP option {} runs past the message", code.0);
            return (options, false);
        };
        options.push(DhcpOption::new(code, data.to_vec()));
        position = start + usize::from(length);
    }
    trace!("DHCP options end without an End option");
    (options, false)
}

/// A parsed BOOTP/DHCP message.
#[derive(Debug, Clone)]
pub struct DhcpDatagram {
    segment: DataSegment,
    validity: OnceCell<bool>,
}

impl_datagram_eq!(DhcpDatagram);

impl DhcpDatagram {
    /// The BOOTP header, without the magic cookie.
    pub const HEADER_LENGTH: usize = 236;

    pub fn new(segment: DataSegment) -> Self {
        Self {
            segment,
            validity: OnceCell::new(),
        }
    }

    pub fn op(&self) -> u8 {
        self.segment.read_u8(offset::OP)
    }

    pub fn htype(&self) -> u8 {
        self.segment.read_u8(offset::HTYPE)
    }

    pub fn hlen(&self) -> u8 {
        self.segment.read_u8(offset::HLEN)
    }

    pub fn hops(&self) -> u8 {
        self.segment.read_u8(offset::HOPS)
    }

    pub fn xid(&self) -> u32 {
        self.segment.read_u32(offset::XID, Endianity::Big)
    }

    pub fn secs(&self) -> u16 {
        self.segment.read_u16(offset::SECS, Endianity::Big)
    }

    pub fn flags(&self) -> u16 {
        self.segment.read_u16(offset::FLAGS, Endianity::Big)
    }

    pub fn ciaddr(&self) -> Ipv4Addr {
        self.segment.read_ipv4(offset::CIADDR)
    }

    pub fn yiaddr(&self) -> Ipv4Addr {
        self.segment.read_ipv4(offset::YIADDR)
    }

    pub fn siaddr(&self) -> Ipv4Addr {
        self.segment.read_ipv4(offset::SIADDR)
    }

    pub fn giaddr(&self) -> Ipv4Addr {
        self.segment.read_ipv4(offset::GIADDR)
    }

    /// The first six bytes of the client hardware address field.
    pub fn chaddr(&self) -> MacAddress {
        MacAddress::read(&self.segment, offset::CHADDR)
    }

    pub fn sname(&self) -> String {
        self.read_string(offset::SNAME, SNAME_LENGTH)
    }

    pub fn file(&self) -> String {
        self.read_string(offset::FILE, FILE_LENGTH)
    }

    fn read_string(&self, at: usize, length: usize) -> String {
        let bytes = self.segment.read_bytes(at, length);
        let end = bytes.iter().position(|&byte| byte == 0).unwrap_or(bytes.len());
        String::from_utf8_lossy(&bytes[..end]).into_owned()
    }

    /// Whether the magic cookie follows the BOOTP header.
    pub fn is_dhcp(&self) -> bool {
        self.segment.len() >= offset::OPTIONS
            && self.segment.read_u32(offset::MAGIC_COOKIE, Endianity::Big) == MAGIC_COOKIE
    }

    pub fn options(&self) -> Vec<DhcpOption> {
        if !self.is_dhcp() {
            return Vec::new();
        }
        parse_options(&self.segment.as_slice()[offset::OPTIONS..]).0
    }

    pub fn option(&self, code: DhcpOptionCode) -> Option<DhcpOption> {
        self.options().into_iter().find(|option| option.code == code)
    }

    pub fn message_type(&self) -> Option<DhcpMessageType> {
        let option = self.option(DhcpOptionCode::MESSAGE_TYPE)?;
        match option.data.as_slice() {
            [value] => DhcpMessageType::from_u8(*value),
            _ => None,
        }
    }

    pub fn subnet_mask(&self) -> Option<Ipv4Addr> {
        self.option(DhcpOptionCode::SUBNET_MASK)?.as_address()
    }

    pub fn routers(&self) -> Option<Vec<Ipv4Addr>> {
        self.option(DhcpOptionCode::ROUTER)?.as_addresses()
    }

    pub fn domain_name_servers(&self) -> Option<Vec<Ipv4Addr>> {
        self.option(DhcpOptionCode::DOMAIN_NAME_SERVER)?.as_addresses()
    }

    pub fn host_name(&self) -> Option<String> {
        let option = self.option(DhcpOptionCode::HOST_NAME)?;
        Some(String::from_utf8_lossy(&option.data).into_owned())
    }

    pub fn requested_ip_address(&self) -> Option<Ipv4Addr> {
        self.option(DhcpOptionCode::REQUESTED_IP_ADDRESS)?.as_address()
    }

    /// Lease time in seconds.
    pub fn lease_time(&self) -> Option<u32> {
        let option = self.option(DhcpOptionCode::IP_ADDRESS_LEASE_TIME)?;
        let bytes: [u8; 4] = option.data.as_slice().try_into().ok()?;
        Some(u32::from_be_bytes(bytes))
    }

    pub fn server_identifier(&self) -> Option<Ipv4Addr> {
        self.option(DhcpOptionCode::SERVER_IDENTIFIER)?.as_address()
    }

    pub fn parameter_request_list(&self) -> Option<Vec<DhcpOptionCode>> {
        let option = self.option(DhcpOptionCode::PARAMETER_REQUEST_LIST)?;
        Some(option.data.iter().map(|&code| DhcpOptionCode(code)).collect())
    }

    pub fn extract_layer(&self) -> DhcpLayer {
        DhcpLayer {
            op: self.op(),
            htype: self.htype(),
            hlen: self.hlen(),
            hops: self.hops(),
            xid: self.xid(),
            secs: self.secs(),
            flags: self.flags(),
            ciaddr: self.ciaddr(),
            yiaddr: self.yiaddr(),
            siaddr: self.siaddr(),
            giaddr: self.giaddr(),
            chaddr: self.chaddr(),
            sname: self.sname(),
            file: self.file(),
            options: self.options(),
        }
    }
}

impl Datagram for DhcpDatagram {
    fn segment(&self) -> &DataSegment {
        &self.segment
    }

    fn validity(&self) -> &OnceCell<bool> {
        &self.validity
    }

    fn calculate_is_valid(&self) -> bool {
        if self.segment.len() < Self::HEADER_LENGTH {
            return false;
        }
        if !self.is_dhcp() {
            // Plain BOOTP.
            return true;
        }
        parse_options(&self.segment.as_slice()[offset::OPTIONS..]).1
    }
}

/// A DHCP message to write. The magic cookie and the End option are always
/// written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DhcpLayer {
    pub op: u8,
    pub htype: u8,
    pub hlen: u8,
    pub hops: u8,
    pub xid: u32,
    pub secs: u16,
    pub flags: u16,
    pub ciaddr: Ipv4Addr,
    pub yiaddr: Ipv4Addr,
    pub siaddr: Ipv4Addr,
    pub giaddr: Ipv4Addr,
    pub chaddr: MacAddress,
    pub sname: String,
    pub file: String,
    pub options: Vec<DhcpOption>,
}

impl DhcpLayer {
    /// Creates a new DHCP layer builder.
    pub fn builder() -> DhcpBuilder {
        DhcpBuilder::new()
    }

    /// Creates a new DHCP Discover message.
    ///
    /// # Arguments
    /// * `xid` - Transaction ID
    /// * `chaddr` - Client hardware address
    pub fn discover(xid: u32, chaddr: MacAddress) -> Result<Self, PacketError> {
        DhcpBuilder::new()
            .op(BOOT_REQUEST)
            .xid(xid)
            .chaddr(chaddr)
            .add_option(DhcpOption::message_type(DhcpMessageType::Discover))
            .add_option(DhcpOption::client_identifier(1, chaddr))
            .build()
    }

    /// Creates a new DHCP Request message.
    ///
    /// # Arguments
    /// * `xid` - Transaction ID
    /// * `chaddr` - Client hardware address
    /// * `requested_ip` - Requested IP address
    /// * `server_id` - Server identifier
    pub fn request(
        xid: u32,
        chaddr: MacAddress,
        requested_ip: Ipv4Addr,
        server_id: Ipv4Addr,
    ) -> Result<Self, PacketError> {
        DhcpBuilder::new()
            .op(BOOT_REQUEST)
            .xid(xid)
            .chaddr(chaddr)
            .add_option(DhcpOption::message_type(DhcpMessageType::Request))
            .add_option(DhcpOption::client_identifier(1, chaddr))
            .add_option(DhcpOption::requested_ip_address(requested_ip))
            .add_option(DhcpOption::server_identifier(server_id))
            .build()
    }
}

fn write_padded(buffer: &mut [u8], offset: &mut usize, value: &[u8], width: usize) {
    write_bytes(buffer, offset, value);
    write_bytes(buffer, offset, &vec![0; width - value.len()]);
}

impl Layer for DhcpLayer {
    fn name(&self) -> &'static str {
        "DHCP"
    }

    fn length(&self) -> usize {
        offset::OPTIONS + self.options.iter().map(DhcpOption::length).sum::<usize>() + 1
    }

    fn write(
        &self,
        buffer: &mut [u8],
        offset: &mut usize,
        _payload_length: usize,
        _previous: Option<&dyn Layer>,
        _next: Option<&dyn Layer>,
    ) -> Result<(), PacketError> {
        if self.sname.len() >= SNAME_LENGTH || self.file.len() >= FILE_LENGTH {
            return Err(PacketError::InvalidFieldValue(
                "DHCP server name or boot file name too long".to_string(),
            ));
        }
        if let Some(option) = self.options.iter().find(|option| option.data.len() > 255) {
            return Err(PacketError::InvalidFieldValue(format!(
                "DHCP option {} carries {} bytes",
                option.code.0,
                option.data.len()
            )));
        }

        write_u8(buffer, offset, self.op);
        write_u8(buffer, offset, self.htype);
        write_u8(buffer, offset, self.hlen);
        write_u8(buffer, offset, self.hops);
        write_u32(buffer, offset, self.xid, Endianity::Big);
        write_u16(buffer, offset, self.secs, Endianity::Big);
        write_u16(buffer, offset, self.flags, Endianity::Big);
        write_ipv4(buffer, offset, self.ciaddr);
        write_ipv4(buffer, offset, self.yiaddr);
        write_ipv4(buffer, offset, self.siaddr);
        write_ipv4(buffer, offset, self.giaddr);
        write_padded(buffer, offset, self.chaddr.as_bytes(), CHADDR_LENGTH);
        write_padded(buffer, offset, self.sname.as_bytes(), SNAME_LENGTH);
        write_padded(buffer, offset, self.file.as_bytes(), FILE_LENGTH);
        write_u32(buffer, offset, MAGIC_COOKIE, Endianity::Big);
        for option in &self.options {
            write_u8(buffer, offset, option.code.0);
            write_u8(buffer, offset, option.data.len() as u8);
            write_bytes(buffer, offset, &option.data);
        }
        write_u8(buffer, offset, DhcpOptionCode::END.0);
        Ok(())
    }
}

/// Builder for constructing DHCP layers.
///
/// Provides a fluent interface for creating DHCP messages with proper
/// validation and error handling.
#[derive(Debug, Default)]
pub struct DhcpBuilder {
    op: Option<u8>,
    xid: Option<u32>,
    flags: u16,
    ciaddr: Option<Ipv4Addr>,
    yiaddr: Option<Ipv4Addr>,
    siaddr: Option<Ipv4Addr>,
    giaddr: Option<Ipv4Addr>,
    chaddr: Option<MacAddress>,
    options: Vec<DhcpOption>,
}

impl DhcpBuilder {
    /// Creates a new DHCP builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the operation code.
    pub fn op(mut self, op: u8) -> Self {
        self.op = Some(op);
        self
    }

    /// Sets the transaction ID.
    pub fn xid(mut self, xid: u32) -> Self {
        self.xid = Some(xid);
        self
    }

    /// Asks the server to broadcast its replies.
    pub fn broadcast(mut self) -> Self {
        self.flags |= FLAG_BROADCAST;
        self
    }

    /// Sets the client IP address.
    pub fn ciaddr(mut self, addr: Ipv4Addr) -> Self {
        self.ciaddr = Some(addr);
        self
    }

    /// Sets the 'your' IP address.
    pub fn yiaddr(mut self, addr: Ipv4Addr) -> Self {
        self.yiaddr = Some(addr);
        self
    }

    /// Sets the server IP address.
    pub fn siaddr(mut self, addr: Ipv4Addr) -> Self {
        self.siaddr = Some(addr);
        self
    }

    /// Sets the relay agent IP address.
    pub fn giaddr(mut self, addr: Ipv4Addr) -> Self {
        self.giaddr = Some(addr);
        self
    }

    /// Sets the client hardware address.
    pub fn chaddr(mut self, addr: MacAddress) -> Self {
        self.chaddr = Some(addr);
        self
    }

    /// Adds a DHCP option.
    pub fn add_option(mut self, option: DhcpOption) -> Self {
        self.options.push(option);
        self
    }

    /// Builds the DHCP layer.
    ///
    /// # Returns
    /// - `Ok(DhcpLayer)` - The constructed layer
    /// - `Err(PacketError)` - If any required fields or the message type option are missing
    pub fn build(self) -> Result<DhcpLayer, PacketError> {
        let op = self.op.ok_or_else(||
            PacketError::InvalidFieldValue("Operation code not set".to_string()))?;
        let xid = self.xid.ok_or_else(||
            PacketError::InvalidFieldValue("Transaction ID not set".to_string()))?;
        let chaddr = self.chaddr.ok_or_else(||
            PacketError::InvalidFieldValue("Client hardware address not set".to_string()))?;
        if !self.options.iter().any(|option| option.code == DhcpOptionCode::MESSAGE_TYPE) {
            return Err(PacketError::InvalidFieldValue(
                "DHCP message type option is required".to_string(),
            ));
        }

        Ok(DhcpLayer {
            op,
            htype: 1, // Ethernet
            hlen: 6,  // MAC address length
            hops: 0,
            xid,
            secs: 0,
            flags: self.flags,
            ciaddr: self.ciaddr.unwrap_or(Ipv4Addr::UNSPECIFIED),
            yiaddr: self.yiaddr.unwrap_or(Ipv4Addr::UNSPECIFIED),
            siaddr: self.siaddr.unwrap_or(Ipv4Addr::UNSPECIFIED),
            giaddr: self.giaddr.unwrap_or(Ipv4Addr::UNSPECIFIED),
            chaddr,
            sname: String::new(),
            file: String::new(),
            options: self.options,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::PacketBuilder;
    use crate::ipv4::IpV4Layer;
    use crate::udp::UdpLayer;
    use chrono::Utc;

    fn create_test_addresses() -> (MacAddress, Ipv4Addr) {
        let chaddr = MacAddress::new([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
        let server_id = Ipv4Addr::new(192, 168, 1, 1);
        (chaddr, server_id)
    }

    fn encode(layer: &DhcpLayer) -> DhcpDatagram {
        let mut buffer = vec![0u8; layer.length()];
        let mut offset = 0;
        layer.write(&mut buffer, &mut offset, 0, None, None).unwrap();
        assert_eq!(offset, layer.length());
        DhcpDatagram::new(DataSegment::new(buffer))
    }

    #[test]
    fn test_dhcp_discover() {
        let (chaddr, _) = create_test_addresses();
        let xid = 0x12345678;

        let layer = DhcpLayer::discover(xid, chaddr).unwrap();
        assert_eq!(layer.op, BOOT_REQUEST);
        assert_eq!(layer.xid, xid);
        assert_eq!(layer.chaddr, chaddr);

        let datagram = encode(&layer);
        assert!(datagram.is_valid());
        assert!(datagram.is_dhcp());
        assert_eq!(datagram.message_type(), Some(DhcpMessageType::Discover));
        assert_eq!(datagram.extract_layer(), layer);
    }

    #[test]
    fn test_dhcp_request() {
        let (chaddr, server_id) = create_test_addresses();
        let requested_ip = Ipv4Addr::new(192, 168, 1, 100);

        let layer = DhcpLayer::request(0x12345678, chaddr, requested_ip, server_id).unwrap();
        let datagram = encode(&layer);
        assert_eq!(datagram.message_type(), Some(DhcpMessageType::Request));
        assert_eq!(datagram.requested_ip_address(), Some(requested_ip));
        assert_eq!(datagram.server_identifier(), Some(server_id));
    }

    #[test]
    fn test_offer_typed_options() {
        let (chaddr, server_id) = create_test_addresses();
        let layer = DhcpLayer::builder()
            .op(BOOT_REPLY)
            .xid(7)
            .yiaddr(Ipv4Addr::new(192, 168, 1, 50))
            .chaddr(chaddr)
            .broadcast()
            .add_option(DhcpOption::message_type(DhcpMessageType::Offer))
            .add_option(DhcpOption::subnet_mask(Ipv4Addr::new(255, 255, 255, 0)))
            .add_option(DhcpOption::addresses(DhcpOptionCode::ROUTER, &[server_id]))
            .add_option(DhcpOption::addresses(
                DhcpOptionCode::DOMAIN_NAME_SERVER,
                &[Ipv4Addr::new(8, 8, 8, 8), Ipv4Addr::new(1, 1, 1, 1)],
            ))
            .add_option(DhcpOption::host_name("client"))
            .add_option(DhcpOption::lease_time(86400))
            .add_option(DhcpOption::server_identifier(server_id))
            .add_option(DhcpOption::parameter_request_list(&[
                DhcpOptionCode::SUBNET_MASK,
                DhcpOptionCode::ROUTER,
            ]))
            .build()
            .unwrap();

        let datagram = encode(&layer);
        assert_eq!(datagram.flags(), FLAG_BROADCAST);
        assert_eq!(datagram.yiaddr(), Ipv4Addr::new(192, 168, 1, 50));
        assert_eq!(datagram.subnet_mask(), Some(Ipv4Addr::new(255, 255, 255, 0)));
        assert_eq!(datagram.routers(), Some(vec![server_id]));
        assert_eq!(datagram.domain_name_servers().unwrap().len(), 2);
        assert_eq!(datagram.host_name().as_deref(), Some("client"));
        assert_eq!(datagram.lease_time(), Some(86400));
        assert_eq!(
            datagram.parameter_request_list(),
            Some(vec![DhcpOptionCode::SUBNET_MASK, DhcpOptionCode::ROUTER])
        );
    }

    #[test]
    fn test_invalid_dhcp_layer() {
        let (chaddr, _) = create_test_addresses();

        // Create a layer without message type option
        let result = DhcpLayer::builder()
            .op(BOOT_REQUEST)
            .xid(0x12345678)
            .chaddr(chaddr)
            .build();

        // The build should fail with the appropriate error
        assert!(result.is_err());
        match result {
            Err(PacketError::InvalidFieldValue(msg)) => {
                assert_eq!(msg, "DHCP message type option is required");
            }
            _ => panic!("Expected InvalidFieldValue error"),
        }
    }

    #[test]
    fn test_truncated_options_are_invalid() {
        let (chaddr, _) = create_test_addresses();
        let layer = DhcpLayer::discover(1, chaddr).unwrap();
        let datagram = encode(&layer);
        let cut = datagram.segment().subsegment(0, offset::OPTIONS + 2);
        let truncated = DhcpDatagram::new(cut);
        assert!(truncated.is_dhcp());
        assert!(!truncated.is_valid());
        assert!(!DhcpDatagram::new(DataSegment::new(vec![0; 100])).is_valid());
    }

    #[test]
    fn test_dhcp_over_udp() {
        let (chaddr, _) = create_test_addresses();
        let dhcp = DhcpLayer::discover(42, chaddr).unwrap();
        let layers: Vec<Box<dyn Layer>> = vec![
            Box::new(
                IpV4Layer::builder()
                    .source(Ipv4Addr::UNSPECIFIED)
                    .destination(Ipv4Addr::BROADCAST)
                    .build()
                    .unwrap(),
            ),
            Box::new(
                UdpLayer::builder()
                    .src_port(CLIENT_PORT)
                    .dst_port(SERVER_PORT)
                    .build()
                    .unwrap(),
            ),
            Box::new(dhcp.clone()),
        ];
        let packet = PacketBuilder::build_packet(Utc::now(), layers).unwrap();
        let parsed = packet.ip_v4().udp().dhcp();
        assert!(parsed.is_valid());
        assert_eq!(parsed.xid(), 42);
        assert_eq!(parsed.extract_layer(), dhcp);
    }
}
