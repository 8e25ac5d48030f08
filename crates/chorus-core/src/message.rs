//! Chat messages as stored by the hub.

use chorus_protocol::WsMessage;

/// A chat message accepted from a client.
///
/// Messages are immutable once submitted; the hub keeps them in history and
/// hands shared references to the formatter.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Identifier of the sending client.
    pub client_id: String,
    /// Message body.
    pub text: String,
    /// Client-supplied headers, carried through uninterpreted.
    pub headers: Option<serde_json::Value>,
}

impl Message {
    /// Create a new message.
    #[must_use]
    pub fn new(client_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            text: text.into(),
            headers: None,
        }
    }

    /// Build a message from a decoded wire message.
    #[must_use]
    pub fn from_wire(client_id: impl Into<String>, wire: WsMessage) -> Self {
        Self {
            client_id: client_id.into(),
            text: wire.text,
            headers: wire.headers,
        }
    }
}
