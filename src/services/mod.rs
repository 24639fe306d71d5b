//! Dispatch services layer.
//!
//! This module contains the steps of a send, each usable on its own, and the
//! service that runs them in order.
//!
//! # Architecture
//!
//! ```text
//! DispatchService
//!      |
//!      +--> AttachmentResolver   descriptors -> resolved attachments | halt
//!      +--> EnvelopeBuilder      spec + attachments -> envelope
//!      +--> EnvelopeTransport    envelope -> SendResult
//! ```
//!
//! # Services Overview
//!
//! - [`AttachmentResolver`]: Turns file patterns and inline content into payloads
//! - [`EnvelopeBuilder`]: Validates addresses and headers and assembles the envelope
//! - [`DispatchService`]: Runs a send end to end over SMTP or the Graph API

mod attachment_resolver;
mod dispatch_service;
mod envelope_builder;

pub use attachment_resolver::{AttachmentResolver, Halt, Resolution};
pub use dispatch_service::{DispatchService, Prepared};
pub use envelope_builder::{parse_recipients, EnvelopeBuilder};
