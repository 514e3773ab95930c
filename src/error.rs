use thiserror::Error;

#[derive(Debug, Error)]
pub enum PacketError {
    #[error("Invalid packet length")]
    InvalidLength,

    #[error("Buffer too small")]
    BufferTooSmall,

    #[error("Invalid field value: {0}")]
    InvalidFieldValue(String),

    #[error("Cannot build a packet with no layers")]
    NoLayers,

    #[error("First layer ({0}) does not define a data link")]
    NoDataLink(&'static str),

    #[error("{layer} layer requires a previous layer")]
    MissingPreviousLayer { layer: &'static str },

    #[error("{layer} layer requires a previous layer that provides {required}")]
    IncompatiblePreviousLayer {
        layer: &'static str,
        required: &'static str,
    },

    #[error("{layer} layer cannot infer {field}: set it explicitly or add a next layer that provides it")]
    CannotInferField {
        layer: &'static str,
        field: &'static str,
    },

    #[error("Sender address length {sender} differs from target address length {target}")]
    AddressLengthMismatch { sender: usize, target: usize },

    #[error("{layer} layer declared {declared} bytes but wrote {written}")]
    LengthMismatch {
        layer: &'static str,
        declared: usize,
        written: usize,
    },

    #[error("Invalid hex string: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}
