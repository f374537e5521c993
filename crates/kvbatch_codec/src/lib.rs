//! # kvbatch Codec
//!
//! Value codecs for kvbatch.
//!
//! The storage engine only sees opaque bytes. A [`Codec`] turns typed
//! values into those bytes and back at the edge of the public API, so the
//! batching core stays independent of value shape.
//!
//! ## Available Codecs
//!
//! - [`CborCodec`] - Compact binary encoding (default)
//! - [`JsonCodec`] - Human-readable encoding, handy when inspecting tables
//!
//! ## Usage
//!
//! ```
//! use kvbatch_codec::{CborCodec, Codec};
//!
//! let bytes = CborCodec.encode(&vec![1u32, 2, 3]).unwrap();
//! let decoded: Vec<u32> = CborCodec.decode(&bytes).unwrap();
//! assert_eq!(decoded, vec![1, 2, 3]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cbor;
mod error;
mod json;

pub use cbor::CborCodec;
pub use error::{CodecError, CodecResult};
pub use json::JsonCodec;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Converts values to and from the bytes stored by the engine.
pub trait Codec: Send + Sync + 'static {
    /// Short name used in log output.
    fn name(&self) -> &'static str;

    /// Encodes a value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be represented.
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> CodecResult<Vec<u8>>;

    /// Decodes a value.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are malformed or do not match `T`.
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> CodecResult<T>;
}
