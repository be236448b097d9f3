//! Fair fan-in of independently paced async sources.
//!
//! [`mix`] takes keyed [`Source`]s and merges them into a single stream of
//! `(key, value)` pairs. Per-source order is preserved, no source can starve
//! another, and the merged stream ends once every source is exhausted.
//!
//! ```
//! # futures_util::FutureExt::now_or_never(async {
//! use dockmux_mix::{mix, StreamSource};
//! use futures_util::stream::{self, StreamExt};
//!
//! let merged: Vec<_> = mix(vec![
//!     ("left", StreamSource(stream::iter(vec![1, 2]))),
//!     ("right", StreamSource(stream::iter(vec![3]))),
//! ])
//! .map(|item| item.unwrap())
//! .collect()
//! .await;
//! assert_eq!(merged.len(), 3);
//! # }).unwrap();
//! ```

pub mod mix;
pub mod source;

pub use mix::{mix, mix_with_rng, Mix};
pub use source::{Next, Source, StreamSource, TryStreamSource};
