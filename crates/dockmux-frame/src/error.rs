/// Errors that can occur while configuring, decoding, or encoding frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The decoder configuration was rejected at construction.
    #[error("invalid decoder config: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// The stream-type tag byte of a frame header is not 0, 1, or 2.
    #[error("malformed frame header (stream type tag {tag})")]
    MalformedHeader { tag: u8 },

    /// The decoder hit a malformed header earlier and must be reset.
    #[error("decoder is poisoned by an earlier malformed header; reset or close it")]
    Poisoned,

    /// The payload does not fit the 32-bit length field.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reasons a buffer capacity is rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// The capacity is not an integer (e.g. `9.5` or `"abc"`).
    #[error("buffer capacity must be an integer, got {0}")]
    NotAnInteger(String),

    /// The capacity is zero or negative.
    #[error("buffer capacity must be positive, got {0}")]
    NotPositive(String),

    /// The capacity exceeds what this platform can address.
    #[error("buffer capacity {0} is too large")]
    TooLarge(String),

    /// The capacity cannot hold a frame header.
    #[error("buffer capacity {capacity} must be larger than the {min}-byte header")]
    TooSmall { capacity: usize, min: usize },
}

pub type Result<T> = std::result::Result<T, FrameError>;
