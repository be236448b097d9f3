//! The three logical streams carried by an attach connection.
//!
//! Tags 0-2 are the only valid values of a header's first byte.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::FrameError;

/// Which logical channel a frame's payload belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamType {
    /// Tag 0.
    Stdin,
    /// Tag 1.
    Stdout,
    /// Tag 2.
    Stderr,
}

impl StreamType {
    /// All stream types in tag order.
    pub const ALL: [StreamType; 3] = [StreamType::Stdin, StreamType::Stdout, StreamType::Stderr];

    /// The wire tag for this stream type.
    pub fn tag(self) -> u8 {
        match self {
            StreamType::Stdin => 0,
            StreamType::Stdout => 1,
            StreamType::Stderr => 2,
        }
    }

    /// Returns a human-readable name for the stream type.
    pub fn as_str(self) -> &'static str {
        match self {
            StreamType::Stdin => "stdin",
            StreamType::Stdout => "stdout",
            StreamType::Stderr => "stderr",
        }
    }
}

impl TryFrom<u8> for StreamType {
    type Error = FrameError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(StreamType::Stdin),
            1 => Ok(StreamType::Stdout),
            2 => Ok(StreamType::Stderr),
            tag => Err(FrameError::MalformedHeader { tag }),
        }
    }
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
