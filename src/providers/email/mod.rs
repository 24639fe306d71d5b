//! Email transport implementations.
//!
//! This module contains the [`EnvelopeTransport`] trait and its two
//! implementations:
//!
//! - [`SmtpAdapter`] - direct SMTP delivery, one connection per send
//! - [`GraphAdapter`] - the Graph mail API, with upload sessions for attachments
//!
//! # Architecture
//!
//! Both adapters consume the same [`MessageEnvelope`](crate::domain::MessageEnvelope)
//! and return a [`SendResult`](crate::domain::SendResult). They share nothing
//! else: each handles its own authentication, wire format and error mapping.
//!
//! # Example
//!
//! ```ignore
//! use mail_dispatch::config::GraphSettings;
//! use mail_dispatch::providers::email::{EnvelopeTransport, GraphAdapter, GraphClient};
//!
//! async fn send(settings: &GraphSettings, envelope: &MessageEnvelope) -> Result<SendResult> {
//!     let client = GraphClient::sign_in(settings).await?;
//!     GraphAdapter::new(client, settings.upload_chunk_size)
//!         .send(envelope, &CancellationToken::new())
//!         .await
//! }
//! ```

mod graph;
mod smtp;
mod traits;

pub use graph::{
    require_message_fields, AttachmentItem, BodyType, EmailAddress, GraphAdapter, GraphClient,
    GraphMessage, InternetMessageHeader, ItemBody, MailApi, MailboxTarget, Recipient,
    UploadSession,
};
pub use smtp::SmtpAdapter;
pub use traits::EnvelopeTransport;
