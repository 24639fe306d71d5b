//! Dispatch orchestration.
//!
//! The [`DispatchService`] wires the [`AttachmentResolver`], the
//! [`EnvelopeBuilder`] and a transport together. It exposes one entry point per
//! transport plus [`DispatchService::run`] for a complete [`DispatchRequest`].
//!
//! A halt from the resolver becomes a `SendResult` with `email_sent == false`
//! and no transport is contacted. Everything else that goes wrong is returned
//! as an error.

use tokio_util::sync::CancellationToken;

use super::{AttachmentResolver, EnvelopeBuilder, Resolution};
use crate::config::{DispatchRequest, GraphSettings, SmtpSettings, TransportSettings};
use crate::domain::{AttachmentDescriptor, MessageEnvelope, MessageSpec, SendResult};
use crate::error::Result;
use crate::providers::email::{
    require_message_fields, EnvelopeTransport, GraphAdapter, GraphClient, SmtpAdapter,
};

/// Outcome of the transport-independent half of a send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prepared {
    /// Envelope ready for a transport.
    Ready(MessageEnvelope),
    /// A policy decided not to send.
    Halted(SendResult),
}

/// Orchestrates a single send.
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchService {
    resolver: AttachmentResolver,
    builder: EnvelopeBuilder,
}

impl DispatchService {
    /// Creates a new dispatch service.
    pub fn new() -> Self {
        Self {
            resolver: AttachmentResolver::new(),
            builder: EnvelopeBuilder::new(),
        }
    }

    /// Resolves attachments in order and builds the envelope.
    pub async fn prepare(
        &self,
        spec: &MessageSpec,
        attachments: &[AttachmentDescriptor],
    ) -> Result<Prepared> {
        let resolved = match self.resolver.resolve_all(attachments).await? {
            Resolution::Attach(resolved) => resolved,
            Resolution::Halt(halt) => {
                tracing::info!(reason = %halt, "Send halted by attachment policy");
                return Ok(Prepared::Halted(SendResult::not_sent(halt.to_string())));
            }
        };

        let envelope = self.builder.build(spec, resolved)?;
        tracing::debug!(
            recipients = envelope.to().len(),
            parts = envelope.body().part_count(),
            "Built envelope"
        );
        Ok(Prepared::Ready(envelope))
    }

    /// Prepares the message and hands it to `transport`.
    pub async fn dispatch(
        &self,
        transport: &dyn EnvelopeTransport,
        spec: &MessageSpec,
        attachments: &[AttachmentDescriptor],
        cancel: &CancellationToken,
    ) -> Result<SendResult> {
        match self.prepare(spec, attachments).await? {
            Prepared::Halted(result) => Ok(result),
            Prepared::Ready(envelope) => {
                tracing::debug!(transport = transport.name(), "Dispatching envelope");
                transport.send(&envelope, cancel).await
            }
        }
    }

    /// Sends over SMTP.
    pub async fn send_smtp(
        &self,
        spec: &MessageSpec,
        attachments: &[AttachmentDescriptor],
        settings: &SmtpSettings,
        cancel: &CancellationToken,
    ) -> Result<SendResult> {
        settings.validate()?;
        let transport = SmtpAdapter::new(settings.clone());
        self.dispatch(&transport, spec, attachments, cancel).await
    }

    /// Sends through the Graph mail API.
    ///
    /// Credentials and the required message fields are checked before any
    /// file is read, and sign-in happens only once the envelope is built.
    pub async fn send_graph(
        &self,
        spec: &MessageSpec,
        attachments: &[AttachmentDescriptor],
        settings: &GraphSettings,
        cancel: &CancellationToken,
    ) -> Result<SendResult> {
        settings.validate()?;
        require_message_fields(&spec.subject, &spec.message, !spec.to.trim().is_empty())?;

        let envelope = match self.prepare(spec, attachments).await? {
            Prepared::Halted(result) => return Ok(result),
            Prepared::Ready(envelope) => envelope,
        };

        let client = GraphClient::sign_in(settings).await?;
        GraphAdapter::new(client, settings.upload_chunk_size)
            .send(&envelope, cancel)
            .await
    }

    /// Runs a complete job on the transport it names.
    pub async fn run(
        &self,
        request: &DispatchRequest,
        cancel: &CancellationToken,
    ) -> Result<SendResult> {
        match &request.transport {
            TransportSettings::Smtp(settings) => {
                self.send_smtp(&request.message, &request.attachments, settings, cancel)
                    .await
            }
            TransportSettings::Graph(settings) => {
                self.send_graph(&request.message, &request.attachments, settings, cancel)
                    .await
            }
        }
    }
}
