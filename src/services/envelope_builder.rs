//! Envelope assembly.
//!
//! Turns a [`MessageSpec`] plus resolved attachments into an immutable
//! [`MessageEnvelope`], validating every address and custom header on the way.

use std::str::FromStr;

use lettre::message::Mailbox;

use crate::domain::{
    Address, BodyFormat, BodyPart, CustomHeader, MessageBody, MessageEnvelope, MessageSpec,
    ResolvedAttachment,
};
use crate::error::{DispatchError, Result};

/// Splits a recipient list on commas and semicolons and validates each entry.
///
/// Empty segments are discarded and order is preserved. Entries may be bare
/// addresses or `Name <address>` mailboxes.
pub fn parse_recipients(list: &str) -> Result<Vec<Address>> {
    list.split([',', ';'])
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let mailbox = Mailbox::from_str(segment).map_err(|e| DispatchError::InvalidAddress {
                address: segment.to_string(),
                reason: e.to_string(),
            })?;
            Ok(Address {
                email: mailbox.email.to_string(),
                name: mailbox.name,
            })
        })
        .collect()
}

/// Builds transport-agnostic envelopes.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvelopeBuilder;

impl EnvelopeBuilder {
    /// Creates a builder.
    pub fn new() -> Self {
        Self
    }

    /// Assembles an envelope.
    ///
    /// With no attachments the body is a single text or HTML part; otherwise it
    /// is a multipart body with one part per attachment after the text part.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidAddress`] for a malformed sender or
    /// recipient, and [`DispatchError::InvalidInput`] when To is empty or a
    /// custom header cannot be written.
    pub fn build(
        &self,
        spec: &MessageSpec,
        attachments: Vec<ResolvedAttachment>,
    ) -> Result<MessageEnvelope> {
        let to = parse_recipients(&spec.to)?;
        if to.is_empty() {
            return Err(DispatchError::InvalidInput(
                "To-recipient cannot be empty".to_string(),
            ));
        }

        for header in &spec.headers {
            validate_header(header)?;
        }

        let body = BodyPart {
            content: spec.message.clone(),
            format: if spec.is_message_html {
                BodyFormat::Html
            } else {
                BodyFormat::Plain
            },
        };
        let body = if attachments.is_empty() {
            MessageBody::Single(body)
        } else {
            MessageBody::Multipart { body, attachments }
        };

        Ok(MessageEnvelope {
            from: parse_sender(&spec.from, &spec.sender_name)?,
            to,
            cc: parse_recipients(&spec.cc)?,
            bcc: parse_recipients(&spec.bcc)?,
            subject: spec.subject.clone(),
            body,
            headers: spec.headers.clone(),
        })
    }
}

fn parse_sender(address: &str, name: &str) -> Result<Option<Address>> {
    let address = address.trim();
    if address.is_empty() {
        return Ok(None);
    }

    let email = lettre::Address::from_str(address).map_err(|e| DispatchError::InvalidAddress {
        address: address.to_string(),
        reason: e.to_string(),
    })?;
    let name = name.trim();
    Ok(Some(Address {
        email: email.to_string(),
        name: (!name.is_empty()).then(|| name.to_string()),
    }))
}

/// Header names are printable ASCII without colons; values are single-line.
fn validate_header(header: &CustomHeader) -> Result<()> {
    let name_ok = !header.key.is_empty()
        && header
            .key
            .bytes()
            .all(|b| b.is_ascii_graphic() && b != b':');
    if !name_ok {
        return Err(DispatchError::InvalidInput(format!(
            "invalid header name {:?}",
            header.key
        )));
    }
    if header.value.contains(['\r', '\n']) {
        return Err(DispatchError::InvalidInput(format!(
            "header {} value must be a single line",
            header.key
        )));
    }
    Ok(())
}
