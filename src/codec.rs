//! The opaque environment blob carried by a process template.
//!
//! The runtime never interprets a process's environment; it only carries
//! it from whoever called `wrap`/`new` through to the instance that reads
//! it back out. The baseline representation is a plain byte buffer, which
//! keeps the crate usable with no serialization dependency at all. The
//! optional `json` feature (mirroring the teacher crate's own `Json<T>`
//! wrapper) adds a convenience encode/decode pair for callers who want a
//! typed round trip instead of juggling bytes directly.
use crate::error::ProcessError;

/// An opaque, arbitrary-length byte blob attached to a process template.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnvBlob {
    bytes: Vec<u8>,
}

impl EnvBlob {
    /// Wraps raw bytes with no interpretation.
    pub fn from_bytes(bytes: Vec<u8>) -> EnvBlob {
        EnvBlob { bytes }
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of bytes carried by this blob.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` if the blob carries no bytes.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Encodes `value` as JSON and wraps the result.
    #[cfg(feature = "json")]
    pub fn encode_json<T: serde::Serialize>(value: &T) -> Result<EnvBlob, ProcessError> {
        serde_json::to_vec(value)
            .map(EnvBlob::from_bytes)
            .map_err(|_| ProcessError::invalid_argument("env value is not JSON-serializable"))
    }

    /// Decodes the blob's bytes as JSON into `T`.
    #[cfg(feature = "json")]
    pub fn decode_json<T: serde::de::DeserializeOwned>(&self) -> Result<T, ProcessError> {
        serde_json::from_slice(&self.bytes)
            .map_err(|_| ProcessError::invalid_argument("env does not match the requested type"))
    }
}

impl From<Vec<u8>> for EnvBlob {
    fn from(bytes: Vec<u8>) -> EnvBlob {
        EnvBlob::from_bytes(bytes)
    }
}
