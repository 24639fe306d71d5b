//! Transport-agnostic message envelope.
//!
//! An envelope is produced by [`EnvelopeBuilder`] and never modified afterwards;
//! both transports read it through the accessors below.
//!
//! [`EnvelopeBuilder`]: crate::services::EnvelopeBuilder

use super::{render_list, Address, CustomHeader, ResolvedAttachment};

/// Body content format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFormat {
    /// text/plain
    Plain,
    /// text/html
    Html,
}

/// The text or HTML part of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyPart {
    /// Body content.
    pub content: String,
    /// Content format.
    pub format: BodyFormat,
}

/// Message body structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    /// A single text or HTML part with no multipart wrapper.
    Single(BodyPart),
    /// The text or HTML part followed by one part per attachment.
    Multipart {
        /// Leading text or HTML part.
        body: BodyPart,
        /// Attachments in input order.
        attachments: Vec<ResolvedAttachment>,
    },
}

impl MessageBody {
    /// The text or HTML part.
    pub fn text(&self) -> &BodyPart {
        match self {
            Self::Single(body) | Self::Multipart { body, .. } => body,
        }
    }

    /// Attachments, empty for a single-part body.
    pub fn attachments(&self) -> &[ResolvedAttachment] {
        match self {
            Self::Single(_) => &[],
            Self::Multipart { attachments, .. } => attachments,
        }
    }

    /// Number of MIME parts this body renders to.
    pub fn part_count(&self) -> usize {
        1 + self.attachments().len()
    }
}

/// A fully assembled email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEnvelope {
    pub(crate) from: Option<Address>,
    pub(crate) to: Vec<Address>,
    pub(crate) cc: Vec<Address>,
    pub(crate) bcc: Vec<Address>,
    pub(crate) subject: String,
    pub(crate) body: MessageBody,
    pub(crate) headers: Vec<CustomHeader>,
}

impl MessageEnvelope {
    /// Sender, if one was given.
    pub fn from(&self) -> Option<&Address> {
        self.from.as_ref()
    }

    /// Primary recipients, never empty.
    pub fn to(&self) -> &[Address] {
        &self.to
    }

    /// Carbon copy recipients.
    pub fn cc(&self) -> &[Address] {
        &self.cc
    }

    /// Blind carbon copy recipients.
    pub fn bcc(&self) -> &[Address] {
        &self.bcc
    }

    /// Subject line.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Body structure.
    pub fn body(&self) -> &MessageBody {
        &self.body
    }

    /// Custom headers in caller order.
    pub fn headers(&self) -> &[CustomHeader] {
        &self.headers
    }

    /// The To list as shown in status messages.
    pub fn rendered_to(&self) -> String {
        render_list(&self.to)
    }
}
