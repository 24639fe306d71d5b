//! Caller-supplied message description.

use serde::{Deserialize, Serialize};

/// A custom header applied after the standard headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomHeader {
    /// Header name.
    pub key: String,
    /// Header value.
    pub value: String,
}

impl CustomHeader {
    /// Creates a header.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Structured description of the email to send.
///
/// Recipient fields hold comma- or semicolon-delimited lists exactly as a
/// workflow step provides them; they are parsed when the envelope is built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageSpec {
    /// Sender address. Optional for the Graph transport, where an empty value
    /// sends as the authenticated user.
    pub from: String,
    /// Sender display name.
    pub sender_name: String,
    /// Primary recipients.
    pub to: String,
    /// Carbon copy recipients.
    pub cc: String,
    /// Blind carbon copy recipients.
    pub bcc: String,
    /// Subject line.
    pub subject: String,
    /// Body text.
    pub message: String,
    /// Whether `message` is HTML.
    pub is_message_html: bool,
    /// Custom headers in the order they should be written; duplicates allowed.
    pub headers: Vec<CustomHeader>,
}

impl MessageSpec {
    /// Creates a plain-text message with only the required fields.
    pub fn new(
        to: impl Into<String>,
        subject: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            message: message.into(),
            ..Self::default()
        }
    }

    /// Sets the sender address and display name.
    pub fn from(mut self, address: impl Into<String>, name: impl Into<String>) -> Self {
        self.from = address.into();
        self.sender_name = name.into();
        self
    }

    /// Marks the body as HTML.
    pub fn html(mut self) -> Self {
        self.is_message_html = true;
        self
    }

    /// Appends a custom header.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(CustomHeader::new(key, value));
        self
    }
}
