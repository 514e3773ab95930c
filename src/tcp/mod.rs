//! Transmission Control Protocol (RFC 793) segments.

pub mod options;

pub use options::{
    TcpOption, TcpOptionMoodEmotion, TcpOptions, TcpSelectiveAcknowledgmentBlock, option_kind,
};

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::PacketError;
use crate::bytes_ext::{Endianity, write_u16, write_u32};
use crate::checksum::PseudoHeader;
use crate::datagram::{DataSegment, Datagram, impl_datagram_eq};
use crate::http::HttpDatagram;
use crate::ip::IpProtocol;
use crate::layer::{IpNextLayer, IpNextTransportLayer, Layer};

mod offset {
    pub const SOURCE_PORT: usize = 0;
    pub const DESTINATION_PORT: usize = 2;
    pub const SEQUENCE_NUMBER: usize = 4;
    pub const ACKNOWLEDGMENT_NUMBER: usize = 8;
    pub const HEADER_LENGTH_AND_FLAGS: usize = 12;
    pub const WINDOW: usize = 14;
    pub const CHECKSUM: usize = 16;
    pub const URGENT_POINTER: usize = 18;
    pub const OPTIONS: usize = 20;
}

const FLAGS_MASK: u16 = 0x01FF;

/// TCP Flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TcpFlags {
    pub fin: bool,
    pub syn: bool,
    pub rst: bool,
    pub psh: bool,
    pub ack: bool,
    pub urg: bool,
    pub ece: bool,
    pub cwr: bool,
    /// ECN nonce sum (RFC 3540).
    pub ns: bool,
}

impl TcpFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn syn() -> Self {
        Self {
            syn: true,
            ..Self::default()
        }
    }

    pub fn syn_ack() -> Self {
        Self {
            syn: true,
            ack: true,
            ..Self::default()
        }
    }

    /// The nine flag bits as they sit in the low bits of the header word.
    pub fn as_u16(&self) -> u16 {
        let mut flags = 0u16;
        if self.fin { flags |= 0b0_0000_0001; }
        if self.syn { flags |= 0b0_0000_0010; }
        if self.rst { flags |= 0b0_0000_0100; }
        if self.psh { flags |= 0b0_0000_1000; }
        if self.ack { flags |= 0b0_0001_0000; }
        if self.urg { flags |= 0b0_0010_0000; }
        if self.ece { flags |= 0b0_0100_0000; }
        if self.cwr { flags |= 0b0_1000_0000; }
        if self.ns { flags |= 0b1_0000_0000; }
        flags
    }

    pub fn from_u16(value: u16) -> Self {
        Self {
            fin: value & 0b0_0000_0001 != 0,
            syn: value & 0b0_0000_0010 != 0,
            rst: value & 0b0_0000_0100 != 0,
            psh: value & 0b0_0000_1000 != 0,
            ack: value & 0b0_0001_0000 != 0,
            urg: value & 0b0_0010_0000 != 0,
            ece: value & 0b0_0100_0000 != 0,
            cwr: value & 0b0_1000_0000 != 0,
            ns: value & 0b1_0000_0000 != 0,
        }
    }
}

/// A parsed TCP segment.
#[derive(Debug, Clone)]
pub struct TcpDatagram {
    segment: DataSegment,
    validity: OnceCell<bool>,
}

impl_datagram_eq!(TcpDatagram);

impl TcpDatagram {
    pub const HEADER_MINIMUM_LENGTH: usize = 20;
    pub const HEADER_MAXIMUM_LENGTH: usize = 60;

    pub fn new(segment: DataSegment) -> Self {
        Self {
            segment,
            validity: OnceCell::new(),
        }
    }

    #[inline]
    pub fn source_port(&self) -> u16 {
        self.segment.read_u16(offset::SOURCE_PORT, Endianity::Big)
    }

    #[inline]
    pub fn destination_port(&self) -> u16 {
        self.segment.read_u16(offset::DESTINATION_PORT, Endianity::Big)
    }

    #[inline]
    pub fn sequence_number(&self) -> u32 {
        self.segment.read_u32(offset::SEQUENCE_NUMBER, Endianity::Big)
    }

    /// Sequence number of the byte after this segment's data.
    pub fn next_sequence_number(&self) -> u32 {
        self.sequence_number()
            .wrapping_add(self.payload().len() as u32)
    }

    #[inline]
    pub fn acknowledgment_number(&self) -> u32 {
        self.segment.read_u32(offset::ACKNOWLEDGMENT_NUMBER, Endianity::Big)
    }

    /// Header length in bytes (data offset * 4).
    #[inline]
    pub fn header_length(&self) -> usize {
        usize::from(self.segment.read_u8(offset::HEADER_LENGTH_AND_FLAGS) >> 4) * 4
    }

    pub fn flags(&self) -> TcpFlags {
        TcpFlags::from_u16(
            self.segment.read_u16(offset::HEADER_LENGTH_AND_FLAGS, Endianity::Big) & FLAGS_MASK,
        )
    }

    #[inline]
    pub fn window(&self) -> u16 {
        self.segment.read_u16(offset::WINDOW, Endianity::Big)
    }

    #[inline]
    pub fn checksum_field(&self) -> u16 {
        self.segment.read_u16(offset::CHECKSUM, Endianity::Big)
    }

    #[inline]
    pub fn urgent_pointer(&self) -> u16 {
        self.segment.read_u16(offset::URGENT_POINTER, Endianity::Big)
    }

    pub fn options(&self) -> TcpOptions {
        let length = self.header_length().saturating_sub(offset::OPTIONS);
        TcpOptions::parse(self.segment.subsegment(offset::OPTIONS, length).as_slice())
    }

    pub fn payload(&self) -> DataSegment {
        self.segment.tail(self.header_length())
    }

    /// The first HTTP message in the payload.
    pub fn http(&self) -> HttpDatagram {
        HttpDatagram::new(self.payload())
    }

    /// Every HTTP message carried back to back in the payload.
    pub fn http_collection(&self) -> Vec<HttpDatagram> {
        HttpDatagram::parse_messages(&self.payload())
    }

    /// Verifies the checksum against the enclosing IP addresses.
    pub fn is_checksum_correct(&self, pseudo_header: PseudoHeader) -> bool {
        pseudo_header.transport_checksum(
            IpProtocol::TCP.0,
            self.segment.as_slice(),
            offset::CHECKSUM,
        ) == self.checksum_field()
    }

    pub fn extract_layer(&self) -> TcpLayer {
        TcpLayer {
            source_port: self.source_port(),
            destination_port: self.destination_port(),
            sequence_number: self.sequence_number(),
            acknowledgment_number: self.acknowledgment_number(),
            flags: self.flags(),
            window: self.window(),
            checksum: Some(self.checksum_field()),
            urgent_pointer: self.urgent_pointer(),
            options: self.options(),
        }
    }
}

impl Datagram for TcpDatagram {
    fn segment(&self) -> &DataSegment {
        &self.segment
    }

    fn validity(&self) -> &OnceCell<bool> {
        &self.validity
    }

    fn calculate_is_valid(&self) -> bool {
        let length = self.segment.len();
        let header_length = self.header_length();
        length >= Self::HEADER_MINIMUM_LENGTH
            && header_length >= Self::HEADER_MINIMUM_LENGTH
            && header_length <= length
            && self.options().is_valid()
    }
}

/// TCP header description.
///
/// `checksum: None` has the enclosing IP layer compute it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpLayer {
    pub source_port: u16,
    pub destination_port: u16,
    pub sequence_number: u32,
    pub acknowledgment_number: u32,
    pub flags: TcpFlags,
    pub window: u16,
    pub checksum: Option<u16>,
    pub urgent_pointer: u16,
    pub options: TcpOptions,
}

impl Default for TcpLayer {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

impl TcpLayer {
    pub fn new(source_port: u16, destination_port: u16) -> Self {
        Self {
            source_port,
            destination_port,
            sequence_number: 0,
            acknowledgment_number: 0,
            flags: TcpFlags::new(),
            window: 65535,
            checksum: None,
            urgent_pointer: 0,
            options: TcpOptions::none(),
        }
    }

    pub fn with_flags(mut self, flags: TcpFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_sequence(mut self, seq: u32) -> Self {
        self.sequence_number = seq;
        self
    }

    pub fn with_ack(mut self, ack: u32) -> Self {
        self.acknowledgment_number = ack;
        self.flags.ack = true;
        self
    }

    pub fn with_window_size(mut self, size: u16) -> Self {
        self.window = size;
        self
    }

    pub fn with_urgent_pointer(mut self, pointer: u16) -> Self {
        self.urgent_pointer = pointer;
        self.flags.urg = true;
        self
    }

    pub fn with_checksum(mut self, checksum: u16) -> Self {
        self.checksum = Some(checksum);
        self
    }

    pub fn add_option(mut self, option: TcpOption) -> Self {
        let mut options: Vec<TcpOption> = self.options.options().to_vec();
        if options.last() == Some(&TcpOption::EndOfOptionList) {
            options.pop();
        }
        options.push(option);
        self.options = TcpOptions::new(options);
        self
    }

    fn header_length(&self) -> usize {
        TcpDatagram::HEADER_MINIMUM_LENGTH + self.options.bytes_length()
    }
}

impl Layer for TcpLayer {
    fn name(&self) -> &'static str {
        "TCP"
    }

    fn length(&self) -> usize {
        self.header_length()
    }

    fn write(
        &self,
        buffer: &mut [u8],
        offset: &mut usize,
        _payload_length: usize,
        _previous: Option<&dyn Layer>,
        _next: Option<&dyn Layer>,
    ) -> Result<(), PacketError> {
        let header_length = self.header_length();
        if header_length > TcpDatagram::HEADER_MAXIMUM_LENGTH {
            return Err(PacketError::InvalidFieldValue(format!(
                "TCP options take {} bytes, at most 40 fit",
                self.options.bytes_length()
            )));
        }
        let data_offset = (header_length / 4) as u16;

        write_u16(buffer, offset, self.source_port, Endianity::Big);
        write_u16(buffer, offset, self.destination_port, Endianity::Big);
        write_u32(buffer, offset, self.sequence_number, Endianity::Big);
        write_u32(buffer, offset, self.acknowledgment_number, Endianity::Big);
        write_u16(
            buffer,
            offset,
            (data_offset << 12) | self.flags.as_u16(),
            Endianity::Big,
        );
        write_u16(buffer, offset, self.window, Endianity::Big);
        write_u16(buffer, offset, self.checksum.unwrap_or(0), Endianity::Big);
        write_u16(buffer, offset, self.urgent_pointer, Endianity::Big);
        self.options.write(buffer, offset)
    }

    fn as_ip_next(&self) -> Option<&dyn IpNextLayer> {
        Some(self)
    }

    fn as_ip_next_transport(&self) -> Option<&dyn IpNextTransportLayer> {
        Some(self)
    }
}

impl IpNextLayer for TcpLayer {
    fn previous_layer_protocol(&self) -> IpProtocol {
        IpProtocol::TCP
    }
}

impl IpNextTransportLayer for TcpLayer {
    fn checksum(&self) -> Option<u16> {
        self.checksum
    }

    fn checksum_offset(&self) -> usize {
        offset::CHECKSUM
    }
}
