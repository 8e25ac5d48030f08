//! Codec for decoding client messages and encoding structured events.
//!
//! WebSocket text frames carry JSON; binary frames carry MessagePack with the
//! same field names. WebSocket frames are already delimited, so there is no
//! length prefix.

use bytes::Bytes;
use thiserror::Error;

use crate::message::{ChatEvent, WsMessage};

/// Default maximum inbound message size (64 KiB).
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Message exceeds the configured maximum size.
    #[error("Message size {size} exceeds maximum {max}")]
    TooLarge {
        /// Size of the rejected message.
        size: usize,
        /// Configured limit.
        max: usize,
    },

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MessagePack encoding error.
    #[error("Encoding error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// MessagePack decoding error.
    #[error("Decoding error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// Decode a JSON text frame using the default size limit.
///
/// # Errors
///
/// Returns an error if the text is too large or not a valid message.
pub fn decode_text(text: &str) -> Result<WsMessage, ProtocolError> {
    MessageCodec::default().decode_text(text)
}

/// Decode a MessagePack binary frame using the default size limit.
///
/// # Errors
///
/// Returns an error if the data is too large or not a valid message.
pub fn decode_binary(data: &[u8]) -> Result<WsMessage, ProtocolError> {
    MessageCodec::default().decode_binary(data)
}

/// Encode a message as a MessagePack binary frame.
///
/// # Errors
///
/// Returns an error if encoding fails.
pub fn encode_binary(message: &WsMessage) -> Result<Bytes, ProtocolError> {
    Ok(Bytes::from(rmp_serde::to_vec_named(message)?))
}

/// Encode a message as a JSON text frame.
///
/// # Errors
///
/// Returns an error if encoding fails.
pub fn encode_text(message: &WsMessage) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(message)?)
}

/// Encode a chat event as JSON bytes.
///
/// # Errors
///
/// Returns an error if encoding fails.
pub fn encode_event(event: &ChatEvent) -> Result<Bytes, ProtocolError> {
    Ok(Bytes::from(serde_json::to_vec(event)?))
}

/// Size-limited decoder for inbound frames.
#[derive(Debug, Clone, Copy)]
pub struct MessageCodec {
    max_message_size: usize,
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new(MAX_MESSAGE_SIZE)
    }
}

impl MessageCodec {
    /// Create a codec that rejects frames larger than `max_message_size` bytes.
    #[must_use]
    pub fn new(max_message_size: usize) -> Self {
        Self { max_message_size }
    }

    /// The configured size limit.
    #[must_use]
    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Decode a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is too large or not a valid message.
    pub fn decode_text(&self, text: &str) -> Result<WsMessage, ProtocolError> {
        self.check_size(text.len())?;
        Ok(serde_json::from_str(text)?)
    }

    /// Decode a MessagePack binary frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the data is too large or not a valid message.
    pub fn decode_binary(&self, data: &[u8]) -> Result<WsMessage, ProtocolError> {
        self.check_size(data.len())?;
        Ok(rmp_serde::from_slice(data)?)
    }

    fn check_size(&self, size: usize) -> Result<(), ProtocolError> {
        if size > self.max_message_size {
            return Err(ProtocolError::TooLarge {
                size,
                max: self.max_message_size,
            });
        }
        Ok(())
    }
}
