//! # chorus-core
//!
//! Broadcast hub for the Chorus chat server.
//!
//! This crate provides the pieces every connection shares:
//!
//! - **Hub** - Single-owner actor holding the live sessions and history
//! - **Session** - One client's bounded outbound queue
//! - **Formatter** - Pluggable rendering of messages into payloads
//! - **History** - Replay log with a retention policy
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐  register / submit   ┌─────────────┐  try_send   ┌─────────────┐
//! │ Connection  │─────────────────────▶│     Hub     │────────────▶│  Outbound   │
//! │   reader    │     (HubHandle)      │  (one task) │             │   writer    │
//! └─────────────┘                      └─────────────┘             └─────────────┘
//!                                             │
//!                                             ▼
//!                                      ┌─────────────┐
//!                                      │   History   │
//!                                      └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use chorus_core::{Hub, HubConfig, JsonFormatter, Message};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), chorus_core::HubError> {
//! let (handle, _task) = Hub::spawn(HubConfig::default(), JsonFormatter);
//!
//! let (session, mut outbound) = handle.open_session("sess-1");
//! handle.register(session).await?;
//! handle.submit(Message::new("sess-1", "hello")).await?;
//!
//! let payload = outbound.recv().await.unwrap();
//! assert_eq!(&payload[..], br#"{"client_id":"sess-1","text":"hello"}"#);
//! # Ok(())
//! # }
//! ```

pub mod formatter;
pub mod handle;
pub mod history;
pub mod hub;
pub mod message;
pub mod session;

pub use formatter::{FormatError, Formatter, HtmlFormatter, JsonFormatter};
pub use handle::HubHandle;
pub use history::{History, HistoryRetention};
pub use hub::{FormatFailurePolicy, Hub, HubConfig, HubError, HubStats};
pub use message::Message;
pub use session::{DeliveryFailure, Outbound, Session, SessionId, SessionKey};
