//! Mutable layer descriptions consumed by the [`PacketBuilder`](crate::builder::PacketBuilder).
//!
//! A layer describes one protocol header as plain values. It knows how many
//! bytes it occupies and how to write them, given the layers around it.
//! Layers discover cross-layer facts (the next protocol number, the
//! addresses needed for a checksum) through small capability traits that a
//! neighbour may or may not implement.

use std::any::Any;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::PacketError;
use crate::arp::ArpHardwareType;
use crate::bytes_ext::write_bytes;
use crate::ethernet::{EtherType, MacAddress};
use crate::ip::IpProtocol;
use crate::packet::DataLinkKind;

/// Type-erased equality support for layers.
///
/// Implemented for every `'static` type with `PartialEq`, which lets
/// `Box<dyn Layer>` values be compared.
pub trait LayerAny: Any {
    fn as_any(&self) -> &dyn Any;

    fn eq_any(&self, other: &dyn Any) -> bool;
}

impl<T: Any + PartialEq> LayerAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_any(&self, other: &dyn Any) -> bool {
        other.downcast_ref::<T>().is_some_and(|other| self == other)
    }
}

/// One protocol header as it should be written.
///
/// `write` must advance `offset` by exactly `length()` bytes; the builder
/// fails the build otherwise.
pub trait Layer: LayerAny + fmt::Debug + Send + Sync {
    /// Protocol name used in build errors.
    fn name(&self) -> &'static str;

    /// Number of bytes `write` emits for the current field values.
    fn length(&self) -> usize;

    /// Writes this layer at `offset` and advances it.
    ///
    /// # Arguments
    /// * `buffer` - The whole packet buffer
    /// * `offset` - Where this layer starts; advanced past the written bytes
    /// * `payload_length` - Total length of all layers after this one
    /// * `previous` - The layer before this one, if any
    /// * `next` - The layer after this one, if any
    fn write(
        &self,
        buffer: &mut [u8],
        offset: &mut usize,
        payload_length: usize,
        previous: Option<&dyn Layer>,
        next: Option<&dyn Layer>,
    ) -> Result<(), PacketError>;

    /// Runs after every layer has been written, last layer first.
    ///
    /// Layers whose checksum covers their payload compute it here.
    fn finalize(
        &self,
        _buffer: &mut [u8],
        _offset: usize,
        _payload_length: usize,
        _next: Option<&dyn Layer>,
    ) -> Result<(), PacketError> {
        Ok(())
    }

    /// The link type of a packet starting with this layer.
    fn data_link(&self) -> Option<DataLinkKind> {
        None
    }

    fn as_ethernet_next(&self) -> Option<&dyn EthernetNextLayer> {
        None
    }

    fn as_ip_next(&self) -> Option<&dyn IpNextLayer> {
        None
    }

    fn as_ip_next_transport(&self) -> Option<&dyn IpNextTransportLayer> {
        None
    }

    fn as_arp_previous(&self) -> Option<&dyn ArpPreviousLayer> {
        None
    }
}

impl PartialEq for dyn Layer {
    fn eq(&self, other: &Self) -> bool {
        self.eq_any(LayerAny::as_any(other))
    }
}

/// A layer that can follow an Ethernet, VLAN or GRE header.
pub trait EthernetNextLayer {
    /// Value the previous layer should put in its EtherType field.
    fn previous_layer_ether_type(&self) -> EtherType;

    /// Destination address to use when the Ethernet layer leaves it unset.
    fn previous_layer_default_destination(&self) -> Option<MacAddress> {
        None
    }
}

/// A layer that can follow an IPv4 or IPv6 header.
pub trait IpNextLayer {
    fn previous_layer_protocol(&self) -> IpProtocol;
}

/// A transport layer whose checksum covers the IP pseudo-header.
pub trait IpNextTransportLayer: IpNextLayer {
    /// Explicit checksum; `None` lets the IP layer compute it.
    fn checksum(&self) -> Option<u16>;

    /// Offset of the checksum field from the start of the transport header.
    fn checksum_offset(&self) -> usize;

    /// Whether a zero checksum means "not computed" (UDP).
    fn is_checksum_optional(&self) -> bool {
        false
    }
}

/// A layer that can carry ARP.
pub trait ArpPreviousLayer {
    fn previous_layer_hardware_type(&self) -> ArpHardwareType;
}

/// Resolves the EtherType a layer should write.
pub(crate) fn resolve_ether_type(
    explicit: Option<EtherType>,
    next: Option<&dyn Layer>,
    layer: &'static str,
) -> Result<EtherType, PacketError> {
    if let Some(ether_type) = explicit {
        return Ok(ether_type);
    }
    next.and_then(|next| next.as_ethernet_next())
        .map(|next| next.previous_layer_ether_type())
        .ok_or(PacketError::CannotInferField {
            layer,
            field: "EtherType",
        })
}

/// Resolves the IP protocol number a layer should write.
pub(crate) fn resolve_ip_protocol(
    explicit: Option<IpProtocol>,
    next: Option<&dyn Layer>,
    layer: &'static str,
) -> Result<IpProtocol, PacketError> {
    if let Some(protocol) = explicit {
        return Ok(protocol);
    }
    next.and_then(|next| next.as_ip_next())
        .map(|next| next.previous_layer_protocol())
        .ok_or(PacketError::CannotInferField {
            layer,
            field: "protocol",
        })
}

/// Opaque bytes, written verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PayloadLayer {
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
}

impl PayloadLayer {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }
}

impl Layer for PayloadLayer {
    fn name(&self) -> &'static str {
        "Payload"
    }

    fn length(&self) -> usize {
        self.data.len()
    }

    fn write(
        &self,
        buffer: &mut [u8],
        offset: &mut usize,
        _payload_length: usize,
        _previous: Option<&dyn Layer>,
        _next: Option<&dyn Layer>,
    ) -> Result<(), PacketError> {
        write_bytes(buffer, offset, &self.data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boxed_layer_equality() {
        let a: Box<dyn Layer> = Box::new(PayloadLayer::new(vec![1, 2, 3]));
        let b: Box<dyn Layer> = Box::new(PayloadLayer::new(vec![1, 2, 3]));
        let c: Box<dyn Layer> = Box::new(PayloadLayer::new(vec![1, 2]));
        assert!(a == b);
        assert!(a != c);
    }

    #[test]
    fn test_payload_write() {
        let layer = PayloadLayer::new(vec![7, 8]);
        let mut buffer = [0u8; 3];
        let mut offset = 1;
        layer.write(&mut buffer, &mut offset, 0, None, None).unwrap();
        assert_eq!(offset, 3);
        assert_eq!(buffer, [0, 7, 8]);
    }

    #[test]
    fn test_resolve_without_next_layer_fails() {
        let payload = PayloadLayer::new(vec![1]);
        let result = resolve_ether_type(None, Some(&payload as &dyn Layer), "Ethernet");
        assert!(matches!(
            result,
            Err(PacketError::CannotInferField { field: "EtherType", .. })
        ));
        assert_eq!(
            resolve_ip_protocol(Some(IpProtocol::UDP), None, "IPv4").unwrap(),
            IpProtocol::UDP
        );
    }
}
