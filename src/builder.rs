//! Builds packets from ordered layers.
//!
//! Building runs in three passes:
//! 1. every layer reports its length, which fixes all offsets;
//! 2. layers are written front to back, each seeing its neighbours;
//! 3. layers are finalized back to front, so a checksum over a payload is
//!    computed after the payload (and any checksum inside it) is in place.

use chrono::{DateTime, Utc};
use log::debug;

use crate::PacketError;
use crate::layer::Layer;
use crate::packet::{DataLinkKind, Packet};

/// An ordered stack of layers ready to be serialized.
#[derive(Debug)]
pub struct PacketBuilder {
    layers: Vec<Box<dyn Layer>>,
    data_link: DataLinkKind,
}

impl PacketBuilder {
    /// Creates a builder for the given layers.
    ///
    /// # Returns
    /// - `Err(PacketError::NoLayers)` - If `layers` is empty
    /// - `Err(PacketError::NoDataLink)` - If the first layer cannot start a packet
    pub fn new(layers: Vec<Box<dyn Layer>>) -> Result<Self, PacketError> {
        let first = layers.first().ok_or(PacketError::NoLayers)?;
        let data_link = first
            .data_link()
            .ok_or(PacketError::NoDataLink(first.name()))?;
        Ok(Self { layers, data_link })
    }

    /// One-shot helper: creates a builder and builds a single packet.
    pub fn build_packet(
        timestamp: DateTime<Utc>,
        layers: Vec<Box<dyn Layer>>,
    ) -> Result<Packet, PacketError> {
        Self::new(layers)?.build(timestamp)
    }

    pub fn layers(&self) -> &[Box<dyn Layer>] {
        &self.layers
    }

    pub fn data_link(&self) -> DataLinkKind {
        self.data_link
    }

    /// Serializes the layers into a new packet.
    pub fn build(&self, timestamp: DateTime<Utc>) -> Result<Packet, PacketError> {
        let lengths: Vec<usize> = self.layers.iter().map(|layer| layer.length()).collect();
        let total: usize = lengths.iter().sum();
        let mut buffer = vec![0u8; total];
        let mut offsets = Vec::with_capacity(self.layers.len());

        debug!("building packet of {} layers, {} bytes", self.layers.len(), total);

        let mut offset = 0;
        for (index, layer) in self.layers.iter().enumerate() {
            let start = offset;
            let previous = index
                .checked_sub(1)
                .and_then(|previous| self.layers.get(previous))
                .map(Box::as_ref);
            let next = self.layers.get(index + 1).map(Box::as_ref);
            let payload_length = total - start - lengths[index];

            layer.write(&mut buffer, &mut offset, payload_length, previous, next)?;

            let written = offset - start;
            if written != lengths[index] {
                return Err(PacketError::LengthMismatch {
                    layer: layer.name(),
                    declared: lengths[index],
                    written,
                });
            }
            offsets.push(start);
        }

        for (index, layer) in self.layers.iter().enumerate().rev() {
            let start = offsets[index];
            let payload_length = total - start - lengths[index];
            let next = self.layers.get(index + 1).map(Box::as_ref);
            layer.finalize(&mut buffer, start, payload_length, next)?;
        }

        Ok(Packet::new(buffer, timestamp, self.data_link))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::PayloadLayer;

    #[derive(Debug, PartialEq)]
    struct ShortWriteLayer;

    impl Layer for ShortWriteLayer {
        fn name(&self) -> &'static str {
            "ShortWrite"
        }

        fn length(&self) -> usize {
            4
        }

        fn write(
            &self,
            _buffer: &mut [u8],
            offset: &mut usize,
            _payload_length: usize,
            _previous: Option<&dyn Layer>,
            _next: Option<&dyn Layer>,
        ) -> Result<(), PacketError> {
            *offset += 3;
            Ok(())
        }

        fn data_link(&self) -> Option<DataLinkKind> {
            Some(DataLinkKind::Ethernet)
        }
    }

    #[test]
    fn test_empty_layers_rejected() {
        assert!(matches!(
            PacketBuilder::new(Vec::new()),
            Err(PacketError::NoLayers)
        ));
    }

    #[test]
    fn test_first_layer_must_define_data_link() {
        let result = PacketBuilder::new(vec![Box::new(PayloadLayer::new(vec![1]))]);
        assert!(matches!(result, Err(PacketError::NoDataLink("Payload"))));
    }

    #[test]
    fn test_length_mismatch_detected() {
        let result = PacketBuilder::build_packet(Utc::now(), vec![Box::new(ShortWriteLayer)]);
        assert!(matches!(
            result,
            Err(PacketError::LengthMismatch {
                layer: "ShortWrite",
                declared: 4,
                written: 3
            })
        ));
    }
}
