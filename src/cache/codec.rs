//! Encoding of values held in persistent caches.
//!
//! Values are stored as CBOR via their `serde` implementations. Floating point values are written
//! without loss, so decoding reproduces the input bit for bit.
use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Encode a value for storage
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_cbor::to_vec(value).context("Could not encode cache object")
}

/// Decode a value encoded with [`encode`]
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_cbor::from_slice(bytes).context("Could not decode cache object")
}
