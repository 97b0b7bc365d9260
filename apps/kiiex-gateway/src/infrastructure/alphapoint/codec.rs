//! Frame Codec
//!
//! Encodes and decodes AlphaPoint frames. Decoding failures are reported as
//! [`CodecError`]; the transport logs and drops such frames without touching
//! the connection.

use crate::domain::venue::Envelope;

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// The frame is not a JSON object.
    #[error("invalid frame format: {0}")]
    InvalidFormat(String),
}

/// JSON codec for venue frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvelopeCodec;

impl EnvelopeCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode one text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a well-formed frame.
    pub fn decode(&self, text: &str) -> Result<Envelope, CodecError> {
        let trimmed = text.trim();
        if !trimmed.starts_with('{') {
            let preview: String = trimmed.chars().take(50).collect();
            return Err(CodecError::InvalidFormat(format!(
                "expected JSON object, got: {preview}..."
            )));
        }
        Ok(serde_json::from_str(trimmed)?)
    }

    /// Encode a frame to text.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self, envelope: &Envelope) -> Result<String, CodecError> {
        Ok(serde_json::to_string(envelope)?)
    }
}
