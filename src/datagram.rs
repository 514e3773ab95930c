//! Zero-copy views over captured bytes.
//!
//! A [`DataSegment`] is a window into a shared [`Bytes`] buffer. Slicing a
//! segment never copies: every protocol datagram derived from a packet points
//! into the same allocation, which is released when the last view drops.
//!
//! Protocol datagrams implement [`Datagram`]. Their validity is computed on
//! first request and cached in a [`OnceCell`], so repeated checks are free and
//! concurrent readers agree on one result.

use std::fmt;
use std::ops::Index;

use bytes::Bytes;
use once_cell::sync::OnceCell;

use crate::bytes_ext::{self, Endianity};

/// An immutable window into a shared byte buffer.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct DataSegment {
    data: Bytes,
}

impl DataSegment {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the byte at `index`.
    ///
    /// # Panics
    /// Panics when `index` is past the end of the segment.
    #[inline]
    pub fn byte(&self, index: usize) -> u8 {
        self.data[index]
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<u8> {
        self.data.get(index).copied()
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// The shared buffer backing this segment.
    pub fn bytes(&self) -> &Bytes {
        &self.data
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.data.to_vec()
    }

    /// A sub-window of `length` bytes starting at `offset`.
    ///
    /// Both bounds are clamped to this segment, so a header that claims more
    /// bytes than were captured yields a shorter view instead of a panic.
    pub fn subsegment(&self, offset: usize, length: usize) -> DataSegment {
        let start = offset.min(self.data.len());
        let end = offset.saturating_add(length).min(self.data.len());
        DataSegment {
            data: self.data.slice(start..end),
        }
    }

    /// Everything from `offset` to the end.
    pub fn tail(&self, offset: usize) -> DataSegment {
        self.subsegment(offset, usize::MAX)
    }

    #[inline]
    pub fn read_u8(&self, offset: usize) -> u8 {
        bytes_ext::read_u8(&self.data, offset)
    }

    #[inline]
    pub fn read_u16(&self, offset: usize, endianity: Endianity) -> u16 {
        bytes_ext::read_u16(&self.data, offset, endianity)
    }

    #[inline]
    pub fn read_u24(&self, offset: usize, endianity: Endianity) -> u32 {
        bytes_ext::read_u24(&self.data, offset, endianity)
    }

    #[inline]
    pub fn read_u32(&self, offset: usize, endianity: Endianity) -> u32 {
        bytes_ext::read_u32(&self.data, offset, endianity)
    }

    #[inline]
    pub fn read_u48(&self, offset: usize, endianity: Endianity) -> u64 {
        bytes_ext::read_u48(&self.data, offset, endianity)
    }

    #[inline]
    pub fn read_u64(&self, offset: usize, endianity: Endianity) -> u64 {
        bytes_ext::read_u64(&self.data, offset, endianity)
    }

    #[inline]
    pub fn read_ipv4(&self, offset: usize) -> std::net::Ipv4Addr {
        bytes_ext::read_ipv4(&self.data, offset)
    }

    #[inline]
    pub fn read_ipv6(&self, offset: usize) -> std::net::Ipv6Addr {
        bytes_ext::read_ipv6(&self.data, offset)
    }

    /// Copies `count` bytes at `offset`, clamped to the segment.
    pub fn read_bytes(&self, offset: usize, count: usize) -> Vec<u8> {
        bytes_ext::read_bytes(&self.data, offset, count)
    }
}

impl Index<usize> for DataSegment {
    type Output = u8;

    fn index(&self, index: usize) -> &u8 {
        &self.data[index]
    }
}

impl fmt::Debug for DataSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DataSegment({})", bytes_ext::to_hex(&self.data))
    }
}

impl From<Vec<u8>> for DataSegment {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl From<&'static [u8]> for DataSegment {
    fn from(data: &'static [u8]) -> Self {
        Self::new(data)
    }
}

impl From<Bytes> for DataSegment {
    fn from(data: Bytes) -> Self {
        Self { data }
    }
}

/// A parsed protocol view over a [`DataSegment`].
pub trait Datagram {
    fn segment(&self) -> &DataSegment;

    /// Cache cell holding the result of [`Datagram::calculate_is_valid`].
    fn validity(&self) -> &OnceCell<bool>;

    /// Protocol-specific structural and checksum checks.
    ///
    /// Must return `false` rather than panic on short or garbled data.
    fn calculate_is_valid(&self) -> bool {
        true
    }

    /// Whether the datagram is well formed, computed once and cached.
    fn is_valid(&self) -> bool {
        *self.validity().get_or_init(|| self.calculate_is_valid())
    }

    #[inline]
    fn len(&self) -> usize {
        self.segment().len()
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.segment().is_empty()
    }

    #[inline]
    fn as_slice(&self) -> &[u8] {
        self.segment().as_slice()
    }
}

/// Implements content equality for datagram types.
///
/// Two datagrams are equal when their bytes are equal, regardless of buffer
/// identity or whether validity was already computed.
macro_rules! impl_datagram_eq {
    ($($name:ty),+ $(,)?) => {
        $(
            impl PartialEq for $name {
                fn eq(&self, other: &Self) -> bool {
                    $crate::datagram::Datagram::segment(self)
                        == $crate::datagram::Datagram::segment(other)
                }
            }

            impl Eq for $name {}
        )+
    };
}

pub(crate) use impl_datagram_eq;
