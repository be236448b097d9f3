//! Split container attach streams and merge them back fairly.
//!
//! A container runtime multiplexes stdin, stdout, and stderr onto a single
//! attach connection using 8-byte frame headers. This crate ties together the
//! two halves needed to consume such a connection.
//!
//! # Crate Structure
//!
//! - [`frame`]: frame header codec and the streaming demultiplexer
//! - [`mix`]: fair merging of independently paced async sources
//! - [`attach`]: tokio adapter that splits a connection into one channel per
//!   stream (behind `async` feature)

/// Re-export frame types.
pub mod frame {
    pub use dockmux_frame::*;
}

/// Re-export multiplexer types.
pub mod mix {
    pub use dockmux_mix::*;
}

#[cfg(feature = "async")]
pub mod attach;
