//! SMTP transport adapter.
//!
//! This module provides an [`EnvelopeTransport`] implementation that delivers
//! an envelope over a direct SMTP connection using `lettre`.
//!
//! # Connection
//!
//! One connection is opened per send and closed afterwards. Security follows
//! [`SecureSocket`]: plain text, implicit TLS, mandatory or opportunistic
//! STARTTLS, or `Auto`, which picks implicit TLS on port 465 and opportunistic
//! STARTTLS elsewhere.
//!
//! # Authentication
//!
//! Unless disabled, the adapter authenticates with the configured username and
//! password using PLAIN or LOGIN. XOAUTH2 is never offered.

use std::time::Duration;

use async_trait::async_trait;
use lettre::address::Envelope;
use lettre::message::header::{ContentType, HeaderName, HeaderValue, Headers};
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::{Credentials as SmtpCredentials, Mechanism};
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tokio_util::sync::CancellationToken;

use super::traits::ensure_not_cancelled;
use super::EnvelopeTransport;
use crate::config::{SecureSocket, SmtpSettings};
use crate::domain::{
    Address, BodyFormat, BodyPart, CustomHeader, MessageBody, MessageEnvelope, SendResult,
};
use crate::error::{DispatchError, Result};

/// SMTP delivery.
///
/// # Example
///
/// ```ignore
/// use mail_dispatch::config::SmtpSettings;
/// use mail_dispatch::providers::email::{EnvelopeTransport, SmtpAdapter};
///
/// let adapter = SmtpAdapter::new(SmtpSettings::new("smtp.example.com", 587));
/// let result = adapter.send(&envelope, &CancellationToken::new()).await?;
/// ```
#[derive(Debug, Clone)]
pub struct SmtpAdapter {
    settings: SmtpSettings,
}

impl SmtpAdapter {
    /// Creates an adapter for the given server.
    pub fn new(settings: SmtpSettings) -> Self {
        Self { settings }
    }

    /// Returns the server settings.
    pub fn settings(&self) -> &SmtpSettings {
        &self.settings
    }

    /// Builds TLS parameters, disabling certificate checks on request.
    fn tls_parameters(&self) -> Result<TlsParameters> {
        let mut builder = TlsParameters::builder(self.settings.server.clone());
        if self.settings.accept_all_certs {
            tracing::warn!(
                server = %self.settings.server,
                "Certificate validation disabled, accepting any server certificate"
            );
            builder = builder
                .dangerous_accept_invalid_certs(true)
                .dangerous_accept_invalid_hostnames(true);
        }
        builder
            .build()
            .map_err(|e| DispatchError::InvalidConfig(format!("TLS parameters: {}", e)))
    }

    /// Creates a single-use transport for the configured server.
    fn build_transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        let security = self.settings.secure_socket.resolve(self.settings.port);
        let tls = match security {
            SecureSocket::None => Tls::None,
            SecureSocket::ImplicitTls => Tls::Wrapper(self.tls_parameters()?),
            SecureSocket::StartTls => Tls::Required(self.tls_parameters()?),
            SecureSocket::StartTlsIfAvailable | SecureSocket::Auto => {
                Tls::Opportunistic(self.tls_parameters()?)
            }
        };

        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.settings.server)
                .port(self.settings.port)
                .timeout(Some(Duration::from_secs(self.settings.timeout_secs)))
                .tls(tls);

        if !self.settings.skip_authentication {
            builder = builder
                .credentials(SmtpCredentials::new(
                    self.settings.username.clone(),
                    self.settings.password.clone(),
                ))
                .authentication(vec![Mechanism::Plain, Mechanism::Login]);
        }

        tracing::debug!(
            server = %self.settings.server,
            port = self.settings.port,
            security = ?security,
            "SMTP transport configured"
        );
        Ok(builder.build())
    }

    /// Picks the originator: the envelope sender, else the login name when it
    /// is an address, else none (null reverse path).
    fn originator(&self, envelope: &MessageEnvelope) -> Result<Option<Mailbox>> {
        if let Some(from) = envelope.from() {
            return to_mailbox(from).map(Some);
        }
        Ok(self
            .settings
            .username
            .trim()
            .parse::<lettre::Address>()
            .ok()
            .map(Mailbox::from))
    }

    /// Renders the envelope as an RFC 5322 message plus its SMTP envelope.
    ///
    /// Attachments are staged one at a time; `cancel` is checked before each.
    fn build_message(
        &self,
        envelope: &MessageEnvelope,
        cancel: &CancellationToken,
    ) -> Result<RenderedMessage> {
        let originator = self.originator(envelope)?;

        let mut recipients = Vec::new();
        let mut builder = Message::builder().subject(envelope.subject());
        for addr in envelope.to() {
            let mailbox = to_mailbox(addr)?;
            recipients.push(mailbox.email.clone());
            builder = builder.to(mailbox);
        }
        for addr in envelope.cc() {
            let mailbox = to_mailbox(addr)?;
            recipients.push(mailbox.email.clone());
            builder = builder.cc(mailbox);
        }
        for addr in envelope.bcc() {
            let mailbox = to_mailbox(addr)?;
            recipients.push(mailbox.email.clone());
            builder = builder.bcc(mailbox);
        }

        let smtp_envelope = Envelope::new(
            originator.as_ref().map(|mailbox| mailbox.email.clone()),
            recipients,
        )
        .map_err(|e| DispatchError::InvalidInput(format!("invalid SMTP envelope: {}", e)))?;

        // lettre will not build a message without From; a null sender removes it below.
        let header_from = match &originator {
            Some(mailbox) => mailbox.clone(),
            None => envelope
                .to()
                .first()
                .map(to_mailbox)
                .transpose()?
                .ok_or_else(|| {
                    DispatchError::InvalidInput("To-recipient cannot be empty".to_string())
                })?,
        };
        let builder = builder.from(header_from).envelope(smtp_envelope.clone());

        let message = match envelope.body() {
            MessageBody::Single(body) => builder.singlepart(text_part(body)),
            MessageBody::Multipart { body, attachments } => {
                let mut multipart = MultiPart::mixed().singlepart(text_part(body));
                for attachment in attachments {
                    ensure_not_cancelled(cancel)?;
                    let content_type = ContentType::parse(&attachment.content_type).map_err(|e| {
                        DispatchError::InvalidInput(format!(
                            "invalid content type {:?} for {}: {}",
                            attachment.content_type, attachment.filename, e
                        ))
                    })?;
                    multipart = multipart.singlepart(
                        Attachment::new(attachment.filename.clone())
                            .body(attachment.data.to_vec(), content_type),
                    );
                }
                builder.multipart(multipart)
            }
        };
        let mut message = message
            .map_err(|e| DispatchError::InvalidInput(format!("failed to build message: {}", e)))?;

        if originator.is_none() {
            tracing::debug!("No sender address, sending with a null reverse path");
            message.headers_mut().remove_raw("From");
        }

        Ok(RenderedMessage {
            envelope: smtp_envelope,
            raw: with_custom_headers(message.formatted(), envelope.headers())?,
        })
    }
}

/// A formatted message and the envelope it is sent under.
struct RenderedMessage {
    envelope: Envelope,
    raw: Vec<u8>,
}

#[async_trait]
impl EnvelopeTransport for SmtpAdapter {
    fn name(&self) -> &'static str {
        "smtp"
    }

    async fn send(
        &self,
        envelope: &MessageEnvelope,
        cancel: &CancellationToken,
    ) -> Result<SendResult> {
        self.settings.validate()?;

        let rendered = self.build_message(envelope, cancel)?;
        let mailer = self.build_transport()?;

        let response = mailer
            .send_raw(&rendered.envelope, &rendered.raw)
            .await
            .map_err(classify_error)?;

        tracing::info!(
            server = %self.settings.server,
            recipients = envelope.to().len() + envelope.cc().len() + envelope.bcc().len(),
            attachments = envelope.body().attachments().len(),
            code = %response.code(),
            "Email sent via SMTP"
        );
        Ok(SendResult::sent(&envelope.rendered_to()))
    }
}

fn to_mailbox(addr: &Address) -> Result<Mailbox> {
    let email = addr
        .email
        .parse()
        .map_err(|e: lettre::address::AddressError| DispatchError::InvalidAddress {
            address: addr.email.clone(),
            reason: e.to_string(),
        })?;
    Ok(Mailbox::new(addr.name.clone(), email))
}

/// Inserts custom headers after lettre's own, keeping caller order and
/// duplicates, which lettre's header map would collapse.
fn with_custom_headers(formatted: Vec<u8>, headers: &[CustomHeader]) -> Result<Vec<u8>> {
    if headers.is_empty() {
        return Ok(formatted);
    }

    let mut block = String::new();
    for header in headers {
        let name = HeaderName::new_from_ascii(header.key.clone()).map_err(|e| {
            DispatchError::InvalidInput(format!("invalid header name {:?}: {}", header.key, e))
        })?;
        let mut single = Headers::new();
        single.insert_raw(HeaderValue::new(name, header.value.clone()));
        block.push_str(&single.to_string());
    }

    let end = formatted
        .windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map(|idx| idx + 2)
        .unwrap_or(formatted.len());

    let mut raw = Vec::with_capacity(formatted.len() + block.len());
    raw.extend_from_slice(&formatted[..end]);
    raw.extend_from_slice(block.as_bytes());
    raw.extend_from_slice(&formatted[end..]);
    Ok(raw)
}

fn text_part(body: &BodyPart) -> SinglePart {
    match body.format {
        BodyFormat::Plain => SinglePart::plain(body.content.clone()),
        BodyFormat::Html => SinglePart::html(body.content.clone()),
    }
}

/// 530/534/535 replies mean the server refused our credentials.
fn classify_error(err: lettre::transport::smtp::Error) -> DispatchError {
    let auth_failure = err
        .status()
        .map(|code| matches!(code.to_string().as_str(), "530" | "534" | "535"))
        .unwrap_or(false);

    if auth_failure {
        DispatchError::Authentication(format!("SMTP server rejected credentials: {}", err))
    } else {
        DispatchError::Transport(format!("SMTP send failed: {}", err))
    }
}
