//! Message shapes exchanged with Chorus clients.
//!
//! Inbound messages follow the payload produced by the htmx `ws-send`
//! extension: the form values plus a `HEADERS` object describing the
//! triggering element. Outbound events are only used by structured
//! formatters; the default HTML formatter writes fragments directly.

use serde::{Deserialize, Serialize};

/// A chat message as sent by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WsMessage {
    /// The message body.
    pub text: String,
    /// Request headers attached by the client, passed through uninterpreted.
    #[serde(rename = "HEADERS", default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<serde_json::Value>,
}

impl WsMessage {
    /// Create a message with no headers.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            headers: None,
        }
    }

    /// Attach client headers.
    #[must_use]
    pub fn with_headers(mut self, headers: serde_json::Value) -> Self {
        self.headers = Some(headers);
        self
    }

    /// Whether the text is empty once surrounding whitespace is removed.
    ///
    /// Blank messages are accepted on the wire but never broadcast.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// A broadcast chat line in structured form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEvent {
    /// Identifier of the sending client.
    pub client_id: String,
    /// The message body.
    pub text: String,
}

impl ChatEvent {
    /// Create a new chat event.
    #[must_use]
    pub fn new(client_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            text: text.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_htmx_payload_shape() {
        let raw = json!({
            "text": "hello",
            "HEADERS": {
                "HX-Request": "true",
                "HX-Trigger": "chat-form",
                "HX-Target": "chat-form",
                "HX-Current-URL": "http://localhost:8080/"
            }
        });

        let msg: WsMessage = serde_json::from_value(raw).unwrap();
        assert_eq!(msg.text, "hello");
        let headers = msg.headers.unwrap();
        assert_eq!(headers["HX-Trigger"], "chat-form");
    }

    #[test]
    fn test_headers_optional() {
        let msg: WsMessage = serde_json::from_str(r#"{"text":"hi"}"#).unwrap();
        assert_eq!(msg, WsMessage::new("hi"));

        // Extra form fields are ignored
        let msg: WsMessage = serde_json::from_str(r#"{"text":"hi","room":"lobby"}"#).unwrap();
        assert_eq!(msg.text, "hi");
    }

    #[test]
    fn test_headers_not_serialized_when_absent() {
        let encoded = serde_json::to_string(&WsMessage::new("x")).unwrap();
        assert_eq!(encoded, r#"{"text":"x"}"#);
    }

    #[test]
    fn test_blank_detection() {
        assert!(WsMessage::new("").is_blank());
        assert!(WsMessage::new("  \n\t").is_blank());
        assert!(!WsMessage::new(" hi ").is_blank());
    }
}
