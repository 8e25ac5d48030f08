//! Rendering messages into outbound payloads.
//!
//! The hub formats each broadcast once and sends the same bytes to every
//! session. Any [`Formatter`] can be injected, including plain closures.

use crate::message::Message;
use bytes::Bytes;
use chorus_protocol::{codec, ChatEvent, ProtocolError};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default HTML fragment: an htmx out-of-band append into `#chat_room`.
pub const DEFAULT_TEMPLATE: &str = concat!(
    r#"<div id="chat_room" hx-swap-oob="beforeend">"#,
    r#"<div class="message"><span class="client">{{client_id}}</span>: "#,
    r#"<span class="text">{{text}}</span></div>"#,
    "</div>",
);

/// Formatting errors.
#[derive(Debug, Error)]
pub enum FormatError {
    /// Template file could not be read.
    #[error("Failed to read template {}: {source}", .path.display())]
    TemplateIo {
        /// Path of the template file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Template does not reference a required field.
    #[error("Template is missing the {{{{{0}}}}} placeholder")]
    MissingPlaceholder(&'static str),

    /// Template references a field that does not exist.
    #[error("Unknown template placeholder: {0}")]
    UnknownPlaceholder(String),

    /// Structured encoding failed.
    #[error("Encoding error: {0}")]
    Encode(#[from] ProtocolError),

    /// Failure reported by a custom formatter.
    #[error("{0}")]
    Other(String),
}

/// Renders a message into the bytes sent to clients.
pub trait Formatter: Send + Sync {
    /// Format a single message.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be rendered.
    fn format(&self, message: &Message) -> Result<Bytes, FormatError>;
}

impl<F> Formatter for F
where
    F: Fn(&Message) -> Result<Bytes, FormatError> + Send + Sync,
{
    fn format(&self, message: &Message) -> Result<Bytes, FormatError> {
        self(message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    ClientId,
    Text,
}

/// HTML formatter driven by a small placeholder template.
///
/// The template is parsed once. `{{client_id}}` and `{{text}}` are replaced
/// with HTML-escaped values; everything else is copied verbatim.
#[derive(Debug, Clone)]
pub struct HtmlFormatter {
    segments: Vec<Segment>,
}

impl HtmlFormatter {
    /// Create a formatter using [`DEFAULT_TEMPLATE`].
    #[must_use]
    pub fn new() -> Self {
        // The built-in template always parses; keep it verbatim otherwise.
        let segments = parse_template(DEFAULT_TEMPLATE)
            .unwrap_or_else(|_| vec![Segment::Literal(DEFAULT_TEMPLATE.to_string())]);
        Self { segments }
    }

    /// Create a formatter from a template string.
    ///
    /// # Errors
    ///
    /// Returns an error if the template references an unknown placeholder or
    /// omits `client_id` or `text`.
    pub fn from_template(template: &str) -> Result<Self, FormatError> {
        let segments = parse_template(template)?;
        for (name, required) in [("client_id", Segment::ClientId), ("text", Segment::Text)] {
            if !segments.contains(&required) {
                return Err(FormatError::MissingPlaceholder(name));
            }
        }
        Ok(Self { segments })
    }

    /// Load a template from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the template is invalid.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, FormatError> {
        let path = path.as_ref();
        let template = std::fs::read_to_string(path).map_err(|source| FormatError::TemplateIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_template(&template)
    }
}

impl Default for HtmlFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl Formatter for HtmlFormatter {
    fn format(&self, message: &Message) -> Result<Bytes, FormatError> {
        let mut out = String::with_capacity(256 + message.text.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => out.push_str(s),
                Segment::ClientId => out.push_str(&htmlescape::encode_minimal(&message.client_id)),
                Segment::Text => out.push_str(&htmlescape::encode_minimal(&message.text)),
            }
        }
        Ok(Bytes::from(out))
    }
}

fn parse_template(template: &str) -> Result<Vec<Segment>, FormatError> {
    let mut segments = Vec::new();
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            break;
        };

        if start > 0 {
            segments.push(Segment::Literal(rest[..start].to_string()));
        }
        match after[..end].trim() {
            "client_id" => segments.push(Segment::ClientId),
            "text" => segments.push(Segment::Text),
            other => return Err(FormatError::UnknownPlaceholder(other.to_string())),
        }
        rest = &after[end + 2..];
    }

    if !rest.is_empty() {
        segments.push(Segment::Literal(rest.to_string()));
    }
    Ok(segments)
}

/// Formatter producing `{"client_id": ..., "text": ...}` JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format(&self, message: &Message) -> Result<Bytes, FormatError> {
        let event = ChatEvent::new(message.client_id.as_str(), message.text.as_str());
        Ok(codec::encode_event(&event)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_template_has_both_placeholders() {
        let formatter = HtmlFormatter::new();
        assert!(formatter.segments.contains(&Segment::ClientId));
        assert!(formatter.segments.contains(&Segment::Text));

        let out = formatter.format(&Message::new("alice", "hi")).unwrap();
        let expected = DEFAULT_TEMPLATE
            .replace("{{client_id}}", "alice")
            .replace("{{text}}", "hi");
        assert_eq!(&out[..], expected.as_bytes());
    }

    #[test]
    fn test_html_escapes_values() {
        let formatter = HtmlFormatter::new();
        let out = formatter
            .format(&Message::new("a&b", "<script>alert('x')</script>"))
            .unwrap();
        let out = std::str::from_utf8(&out).unwrap();

        assert!(out.contains("a&amp;b"));
        assert!(out.contains("&lt;script&gt;"));
        assert!(!out.contains("<script>"));
        assert!(out.starts_with(r#"<div id="chat_room" hx-swap-oob="beforeend">"#));
    }

    #[test]
    fn test_placeholder_text_is_not_reexpanded() {
        let formatter = HtmlFormatter::from_template("{{client_id}}|{{text}}").unwrap();
        let out = formatter.format(&Message::new("{{text}}", "body")).unwrap();
        assert_eq!(&out[..], b"{{text}}|body");
    }

    #[test]
    fn test_template_validation() {
        assert!(matches!(
            HtmlFormatter::from_template("<p>{{text}}</p>"),
            Err(FormatError::MissingPlaceholder("client_id"))
        ));
        assert!(matches!(
            HtmlFormatter::from_template("{{client_id}} {{text}} {{room}}"),
            Err(FormatError::UnknownPlaceholder(name)) if name == "room"
        ));
        // Whitespace inside braces is allowed
        assert!(HtmlFormatter::from_template("{{ client_id }}: {{ text }}").is_ok());
    }

    #[test]
    fn test_template_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "<li>{{{{client_id}}}} says {{{{text}}}}</li>").unwrap();

        let formatter = HtmlFormatter::from_file(file.path()).unwrap();
        let out = formatter.format(&Message::new("bob", "yo")).unwrap();
        assert_eq!(&out[..], b"<li>bob says yo</li>");
    }

    #[test]
    fn test_template_file_missing() {
        match HtmlFormatter::from_file("/nonexistent/chorus/message.html") {
            Err(FormatError::TemplateIo { path, .. }) => {
                assert_eq!(path, PathBuf::from("/nonexistent/chorus/message.html"));
            }
            other => panic!("Expected TemplateIo error, got {:?}", other),
        }
    }

    #[test]
    fn test_json_formatter() {
        let out = JsonFormatter.format(&Message::new("A", "hi")).unwrap();
        assert_eq!(&out[..], br#"{"client_id":"A","text":"hi"}"#);
    }

    #[test]
    fn test_closure_formatter() {
        let formatter = |m: &Message| -> Result<Bytes, FormatError> {
            Ok(Bytes::from(format!("{}:{}", m.client_id, m.text)))
        };
        assert_eq!(&formatter.format(&Message::new("A", "hi")).unwrap()[..], b"A:hi");
    }
}
