//! Raw socket boundary for sending and receiving packets.
//!
//! This module provides both synchronous and asynchronous socket implementations
//! that move [`Packet`] bytes to and from the network. Every received buffer
//! becomes a raw IPv4 [`Packet`] stamped with the time it was read.

use std::io::{self, ErrorKind, Read};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use chrono::Utc;
use log::warn;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tokio::io::Interest;

use crate::error::PacketError;
use crate::ipv4::IpV4Datagram;
use crate::packet::{DataLinkKind, Packet};

/// Minimum size required for an IPv4 header
const MIN_BUFFER_SIZE: usize = IpV4Datagram::HEADER_MINIMUM_LENGTH;

fn received_packet(data: &[u8]) -> Packet {
    if data.len() < MIN_BUFFER_SIZE {
        warn!(
            "Received {} bytes, shorter than an IPv4 header",
            data.len()
        );
    }
    Packet::new(data.to_vec(), Utc::now(), DataLinkKind::IpV4)
}

/// A synchronous socket wrapper for sending and receiving network packets.
///
/// The kernel builds the IP header for outgoing data, so packets handed to
/// [`PacketSocket::send`] should start at the transport layer.
pub struct PacketSocket {
    socket: Socket,
    is_blocking: bool,
}

impl PacketSocket {
    /// Creates a new raw socket for the specified protocol.
    ///
    /// # Arguments
    /// * `protocol` - The protocol to use (e.g., TCP, UDP)
    pub fn new(protocol: Protocol) -> io::Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::RAW, Some(protocol))?;
        Ok(Self {
            socket,
            is_blocking: true,
        })
    }

    /// Sets the socket to blocking or non-blocking mode.
    pub fn set_nonblocking(&mut self, nonblocking: bool) -> io::Result<()> {
        self.socket.set_nonblocking(nonblocking)?;
        self.is_blocking = !nonblocking;
        Ok(())
    }

    /// Sets the socket timeout for both read and write operations.
    ///
    /// # Arguments
    /// * `timeout` - The timeout duration, or None to disable timeout
    pub fn set_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.socket.set_read_timeout(timeout)?;
        self.socket.set_write_timeout(timeout)?;
        Ok(())
    }

    /// Binds the socket to a specific network interface.
    pub fn bind(&self, addr: Ipv4Addr) -> io::Result<()> {
        let sock_addr = SocketAddr::V4(SocketAddrV4::new(addr, 0));
        self.socket.bind(&SockAddr::from(sock_addr))?;
        Ok(())
    }

    /// Sends the packet's bytes to the specified destination.
    ///
    /// # Returns
    /// * `Ok(usize)` - The number of bytes sent
    /// * `Err(PacketError)` - If sending fails
    pub fn send(&self, packet: &Packet, dst_addr: Ipv4Addr) -> Result<usize, PacketError> {
        let sock_addr = SocketAddr::V4(SocketAddrV4::new(dst_addr, 0));
        Ok(self.socket.send_to(packet.as_bytes(), &SockAddr::from(sock_addr))?)
    }

    /// Receives one IPv4 packet, using `buffer` as scratch space.
    ///
    /// # Returns
    /// * `Ok(Packet)` - The received bytes, stamped with the current time
    /// * `Err(PacketError)` - If the buffer is too small or receiving fails
    pub fn receive(&self, buffer: &mut [u8]) -> Result<Packet, PacketError> {
        if buffer.len() < MIN_BUFFER_SIZE {
            return Err(PacketError::IoError(io::Error::new(
                ErrorKind::InvalidInput,
                format!("Buffer size must be at least {} bytes", MIN_BUFFER_SIZE),
            )));
        }
        let n = (&self.socket).read(buffer)?;
        Ok(received_packet(&buffer[..n]))
    }

    /// Attempts to receive a packet without blocking.
    ///
    /// # Returns
    /// * `Ok(Some(Packet))` - A packet was waiting
    /// * `Ok(None)` - If no packet is available
    /// * `Err(PacketError)` - If receiving fails or the socket is blocking
    pub fn try_receive(&self, buffer: &mut [u8]) -> Result<Option<Packet>, PacketError> {
        if self.is_blocking {
            return Err(PacketError::InvalidOperation("Socket is in blocking mode".into()));
        }
        match self.receive(buffer) {
            Ok(packet) => Ok(Some(packet)),
            Err(PacketError::IoError(e)) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// An asynchronous socket wrapper for sending and receiving network packets.
///
/// This struct provides an async interface for working with raw sockets using
/// the Tokio runtime.
pub struct AsyncPacketSocket {
    socket: tokio::net::UdpSocket,
}

impl AsyncPacketSocket {
    /// Creates a new async raw socket for the specified protocol.
    pub async fn new(protocol: Protocol) -> io::Result<Self> {
        let std_socket = Socket::new(Domain::IPV4, Type::RAW, Some(protocol))?;
        std_socket.set_nonblocking(true)?;

        let socket = tokio::net::UdpSocket::from_std(std_socket.into())?;

        Ok(Self { socket })
    }

    /// Sends the packet's bytes asynchronously to the specified destination.
    pub async fn send(&self, packet: &Packet, dst_addr: Ipv4Addr) -> Result<usize, PacketError> {
        let sock_addr = SocketAddr::V4(SocketAddrV4::new(dst_addr, 0));
        Ok(self.socket.send_to(packet.as_bytes(), sock_addr).await?)
    }

    /// Receives one IPv4 packet asynchronously, using `buffer` as scratch space.
    pub async fn receive(&self, buffer: &mut [u8]) -> Result<Packet, PacketError> {
        let (n, _) = self.socket.recv_from(buffer).await?;
        Ok(received_packet(&buffer[..n]))
    }

    /// Waits for the socket to become ready for the specified operation.
    pub async fn ready(&self, interest: Interest) -> io::Result<()> {
        self.socket.ready(interest).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::PacketBuilder;
    use crate::datagram::Datagram;
    use crate::ipv4::IpV4Layer;
    use crate::layer::{Layer, PayloadLayer};
    use crate::tcp::TcpLayer;

    const LOCAL_ADDR: Ipv4Addr = Ipv4Addr::LOCALHOST;
    const TIMEOUT: Duration = Duration::from_millis(100);

    /// A TCP segment with a payload, cut from a built IPv4 packet since the
    /// kernel supplies the IP header on send.
    fn create_test_packet() -> Packet {
        let layers: Vec<Box<dyn Layer>> = vec![
            Box::new(
                IpV4Layer::builder()
                    .source(LOCAL_ADDR)
                    .destination(LOCAL_ADDR)
                    .build()
                    .unwrap(),
            ),
            Box::new(TcpLayer::new(40000, 9)),
            Box::new(PayloadLayer::new(vec![1, 2, 3, 4])),
        ];
        let full = PacketBuilder::build_packet(Utc::now(), layers).unwrap();
        let segment = full.bytes().slice(IpV4Datagram::HEADER_MINIMUM_LENGTH..);
        Packet::new(segment, full.timestamp(), DataLinkKind::IpV4)
    }

    fn skip_if_permission_error<T>(result: Result<T, io::Error>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                if e.kind() == ErrorKind::PermissionDenied {
                    eprintln!("Skipping test due to insufficient permissions");
                    None
                } else {
                    panic!("Unexpected error: {:?}", e)
                }
            }
        }
    }

    #[test]
    fn test_received_packet_is_raw_ipv4() {
        let packet = received_packet(&[0x45, 0, 0, 20]);
        assert_eq!(packet.data_link(), DataLinkKind::IpV4);
        assert_eq!(packet.len(), 4);
        assert!(!packet.ip_v4().is_valid());
    }

    #[test]
    fn test_socket_creation() {
        if skip_if_permission_error(PacketSocket::new(Protocol::TCP)).is_none() {
            return;
        }
    }

    #[test]
    fn test_socket_bind() {
        let socket = match skip_if_permission_error(PacketSocket::new(Protocol::TCP)) {
            Some(s) => s,
            None => return,
        };

        if skip_if_permission_error(socket.bind(LOCAL_ADDR)).is_none() {
            return;
        }
    }

    #[test]
    fn test_socket_timeout() {
        let mut socket = match skip_if_permission_error(PacketSocket::new(Protocol::TCP)) {
            Some(s) => s,
            None => return,
        };

        if skip_if_permission_error(socket.set_timeout(Some(TIMEOUT))).is_none() {
            return;
        }

        if skip_if_permission_error(socket.set_timeout(None)).is_none() {
            return;
        }
    }

    #[test]
    fn test_buffer_boundaries() {
        let mut socket = match skip_if_permission_error(PacketSocket::new(Protocol::TCP)) {
            Some(s) => s,
            None => return,
        };

        if skip_if_permission_error(socket.set_timeout(Some(TIMEOUT))).is_none() {
            return;
        }

        // Test with buffer smaller than minimum packet size
        let mut small_buffer = vec![0u8; MIN_BUFFER_SIZE - 1];
        match socket.receive(&mut small_buffer) {
            Ok(_) => panic!("Should not succeed with small buffer"),
            Err(PacketError::IoError(e)) => {
                assert_eq!(e.kind(), ErrorKind::InvalidInput, "Unexpected error: {:?}", e);
            }
            Err(e) => panic!("Unexpected error: {:?}", e),
        }
    }

    #[test]
    fn test_try_receive_requires_nonblocking() {
        let mut socket = match skip_if_permission_error(PacketSocket::new(Protocol::TCP)) {
            Some(s) => s,
            None => return,
        };
        let mut buffer = vec![0u8; 2048];
        assert!(matches!(
            socket.try_receive(&mut buffer),
            Err(PacketError::InvalidOperation(_))
        ));

        if skip_if_permission_error(socket.set_nonblocking(true)).is_none() {
            return;
        }
        match socket.try_receive(&mut buffer) {
            Ok(_) => {}
            Err(e) => panic!("Unexpected error: {:?}", e),
        }
    }

    #[test]
    fn test_blocking_send_receive() {
        let sender = match skip_if_permission_error(PacketSocket::new(Protocol::TCP)) {
            Some(s) => s,
            None => return,
        };

        let mut receiver = match skip_if_permission_error(PacketSocket::new(Protocol::TCP)) {
            Some(s) => s,
            None => return,
        };

        if skip_if_permission_error(receiver.bind(LOCAL_ADDR)).is_none() {
            return;
        }

        if skip_if_permission_error(receiver.set_timeout(Some(TIMEOUT))).is_none() {
            return;
        }

        let packet = create_test_packet();
        match sender.send(&packet, LOCAL_ADDR) {
            Ok(sent) => {
                assert_eq!(sent, packet.len());

                let mut buffer = vec![0u8; 2048];
                match receiver.receive(&mut buffer) {
                    Ok(received) => {
                        assert!(!received.is_empty());
                        assert_eq!(received.ip_v4().source(), LOCAL_ADDR);
                    }
                    Err(PacketError::IoError(e)) => {
                        assert!(e.kind() == ErrorKind::TimedOut ||
                               e.kind() == ErrorKind::WouldBlock,
                               "Unexpected error: {:?}", e);
                    }
                    Err(e) => panic!("Unexpected error: {:?}", e),
                }
            }
            Err(PacketError::IoError(e)) => {
                eprintln!("Send error (might be expected): {:?}", e);
            }
            Err(e) => panic!("Unexpected error: {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_async_send_receive() {
        let socket = match skip_if_permission_error(AsyncPacketSocket::new(Protocol::TCP).await) {
            Some(s) => s,
            None => return,
        };

        let packet = create_test_packet();
        match socket.send(&packet, LOCAL_ADDR).await {
            Ok(n) => assert_eq!(n, packet.len()),
            Err(e) => eprintln!("Send error (might be expected): {:?}", e),
        }

        // Test receiving with timeout
        let mut buffer = vec![0u8; 2048];
        if let Ok(Ok(received)) = tokio::time::timeout(TIMEOUT, socket.receive(&mut buffer)).await {
            assert_eq!(received.data_link(), DataLinkKind::IpV4);
        }
    }

    #[tokio::test]
    async fn test_async_ready() {
        let socket = match skip_if_permission_error(AsyncPacketSocket::new(Protocol::TCP).await) {
            Some(s) => s,
            None => return,
        };

        // Test writable readiness with timeout
        let timeout_result = tokio::time::timeout(TIMEOUT, socket.ready(Interest::WRITABLE)).await;
        if let Ok(result) = timeout_result {
            assert!(result.is_ok());
        }
    }
}
