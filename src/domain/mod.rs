//! Domain types for email dispatch.
//!
//! This module contains the value types that flow through a send: the caller's
//! message description and attachment descriptors, the resolved attachments,
//! the assembled envelope and the final result.

mod address;
mod attachment;
mod encoding;
mod envelope;
mod message;
mod result;
mod types;

pub use address::{render_list, Address};
pub use attachment::{AttachmentDescriptor, AttachmentSource, ResolvedAttachment};
pub use encoding::{TextEncoding, UnknownEncoding};
pub use envelope::{BodyFormat, BodyPart, MessageBody, MessageEnvelope};
pub use message::{CustomHeader, MessageSpec};
pub use result::SendResult;
pub use types::{DraftId, UploadUrl};
