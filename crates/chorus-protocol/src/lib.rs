//! # chorus-protocol
//!
//! Wire message shapes for the Chorus chat hub.
//!
//! Clients send [`WsMessage`] values, either as JSON text frames (the format
//! produced by htmx `ws-send`) or as MessagePack binary frames. Structured
//! outbound events use [`ChatEvent`].
//!
//! ## Example
//!
//! ```rust
//! use chorus_protocol::{codec, WsMessage};
//!
//! let msg = codec::decode_text(r#"{"text":"hello","HEADERS":{"HX-Request":"true"}}"#).unwrap();
//! assert_eq!(msg.text, "hello");
//!
//! let bin = codec::encode_binary(&WsMessage::new("hello")).unwrap();
//! assert_eq!(codec::decode_binary(&bin).unwrap().text, "hello");
//! ```

pub mod codec;
pub mod message;

pub use codec::{MessageCodec, ProtocolError, MAX_MESSAGE_SIZE};
pub use message::{ChatEvent, WsMessage};
