use serde::{Deserialize, Serialize};

use crate::codec::HEADER_SIZE;
use crate::error::ConfigError;

/// Default decoder buffer capacity: 8 KiB.
pub const DEFAULT_BUFFER_CAPACITY: usize = 8 * 1024;

/// Environment variable read by [`DecoderConfig::from_env`].
pub const BUFFER_CAPACITY_ENV: &str = "DOCKMUX_BUFFER_CAPACITY";

/// Configuration for a [`FrameDecoder`](crate::FrameDecoder).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawDecoderConfig")]
pub struct DecoderConfig {
    /// Size of the reusable decode buffer, and the largest data event emitted.
    pub buffer_capacity: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

impl DecoderConfig {
    /// Config with an explicit buffer capacity.
    pub fn with_capacity(buffer_capacity: usize) -> Self {
        Self { buffer_capacity }
    }

    /// Check that the capacity can hold a header plus at least one payload byte.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_capacity(self.buffer_capacity).map(|_| ())
    }

    /// Default config, with the capacity overridden by `DOCKMUX_BUFFER_CAPACITY` if set.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var(BUFFER_CAPACITY_ENV) {
            Ok(raw) => Ok(Self::with_capacity(parse_buffer_capacity(&raw)?)),
            Err(_) => Ok(Self::default()),
        }
    }
}

/// Parse a buffer capacity from text, e.g. an env var or CLI flag.
pub fn parse_buffer_capacity(raw: &str) -> Result<usize, ConfigError> {
    let raw = raw.trim();
    if let Ok(value) = raw.parse::<usize>() {
        return validate_capacity(value);
    }
    match raw.parse::<f64>() {
        Ok(value) => validate_number(value),
        Err(_) => Err(ConfigError::NotAnInteger(raw.to_string())),
    }
}

fn validate_number(value: f64) -> Result<usize, ConfigError> {
    if !value.is_finite() || value.fract() != 0.0 {
        return Err(ConfigError::NotAnInteger(value.to_string()));
    }
    if value <= 0.0 {
        return Err(ConfigError::NotPositive(value.to_string()));
    }
    if value > usize::MAX as f64 {
        return Err(ConfigError::TooLarge(value.to_string()));
    }
    validate_capacity(value as usize)
}

fn validate_capacity(capacity: usize) -> Result<usize, ConfigError> {
    if capacity == 0 {
        return Err(ConfigError::NotPositive(capacity.to_string()));
    }
    if capacity <= HEADER_SIZE {
        return Err(ConfigError::TooSmall {
            capacity,
            min: HEADER_SIZE,
        });
    }
    Ok(capacity)
}

// Accepts any JSON number so fractional and negative values get a config
// error rather than a generic type mismatch.
#[derive(Deserialize)]
struct RawDecoderConfig {
    #[serde(default = "default_capacity")]
    buffer_capacity: f64,
}

fn default_capacity() -> f64 {
    DEFAULT_BUFFER_CAPACITY as f64
}

impl TryFrom<RawDecoderConfig> for DecoderConfig {
    type Error = ConfigError;

    fn try_from(raw: RawDecoderConfig) -> Result<Self, Self::Error> {
        validate_number(raw.buffer_capacity).map(Self::with_capacity)
    }
}
