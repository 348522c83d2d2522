//! JSON encoding shared by the relay vocabulary and the direct-channel
//! control frames.
//!
//! Both protocols travel as WebSocket / data-channel *text* frames, so the
//! codec produces `String`s rather than byte vectors.

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Error type for codec encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Encodes a protocol value into a JSON text frame.
///
/// # Errors
///
/// Returns [`CodecError::Serialization`] if the value cannot be serialized.
pub fn encode<T: Serialize>(value: &T) -> Result<String, CodecError> {
    Ok(serde_json::to_string(value)?)
}

/// Decodes a protocol value from a JSON text frame.
///
/// # Errors
///
/// Returns [`CodecError::Serialization`] if the text is not valid JSON or
/// does not match the expected shape.
pub fn decode<T: DeserializeOwned>(text: &str) -> Result<T, CodecError> {
    Ok(serde_json::from_str(text)?)
}
