//! Microsoft Graph mail transport.
//!
//! This module provides an [`EnvelopeTransport`] implementation backed by the
//! Graph REST API, plus the [`GraphClient`] that speaks it.
//!
//! # Authentication
//!
//! The client signs in with the resource-owner password grant against the
//! configured authority (public cloud by default) and uses the resulting bearer
//! token for every API call. A failed sign-in is returned as-is; nothing is
//! retried here.
//!
//! # API Usage
//!
//! - `POST /{mailbox}/sendMail` for messages without attachments
//! - `POST /{mailbox}/messages` to create a draft when attachments are present
//! - `POST /{mailbox}/messages/{id}/attachments/createUploadSession` per attachment
//! - `PUT {uploadUrl}` with `Content-Range` for each chunk
//! - `POST /{mailbox}/messages/{id}/send` once every upload has completed
//!
//! `{mailbox}` is `me` when no sender is given and `users/{address}` otherwise.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_RANGE, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::traits::ensure_not_cancelled;
use super::EnvelopeTransport;
use crate::config::GraphSettings;
use crate::domain::{
    Address, BodyFormat, DraftId, MessageEnvelope, ResolvedAttachment, SendResult, UploadUrl,
};
use crate::error::{DispatchError, Result};

/// Mailbox a request acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailboxTarget {
    /// The signed-in user's own mailbox.
    Me,
    /// Another mailbox the signed-in user may send as.
    User(String),
}

impl MailboxTarget {
    /// Picks the mailbox for an envelope's sender.
    pub fn for_sender(from: Option<&Address>) -> Self {
        match from {
            Some(addr) => Self::User(addr.email.clone()),
            None => Self::Me,
        }
    }

    fn segments(&self) -> Vec<&str> {
        match self {
            Self::Me => vec!["me"],
            Self::User(address) => vec!["users", address.as_str()],
        }
    }
}

/// Graph message resource, as much of it as a send needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphMessage {
    /// Subject line.
    pub subject: String,
    /// Body.
    pub body: ItemBody,
    /// Primary recipients.
    pub to_recipients: Vec<Recipient>,
    /// Carbon copy recipients.
    pub cc_recipients: Vec<Recipient>,
    /// Blind carbon copy recipients.
    pub bcc_recipients: Vec<Recipient>,
    /// Custom `X-` headers.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub internet_message_headers: Vec<InternetMessageHeader>,
}

impl GraphMessage {
    /// Maps an envelope onto the Graph message shape.
    ///
    /// Graph only accepts custom headers whose names start with `X-`; any other
    /// header is dropped with a warning.
    pub fn from_envelope(envelope: &MessageEnvelope) -> Self {
        let body = envelope.body().text();
        let recipients = |list: &[Address]| list.iter().map(Recipient::from).collect::<Vec<_>>();

        let internet_message_headers = envelope
            .headers()
            .iter()
            .filter(|header| {
                let carried = header.key.len() > 2
                    && header
                        .key
                        .get(..2)
                        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("x-"));
                if !carried {
                    tracing::warn!(header = %header.key, "Graph accepts only X- headers, dropping");
                }
                carried
            })
            .map(|header| InternetMessageHeader {
                name: header.key.clone(),
                value: header.value.clone(),
            })
            .collect();

        Self {
            subject: envelope.subject().to_string(),
            body: ItemBody {
                content_type: match body.format {
                    BodyFormat::Plain => BodyType::Text,
                    BodyFormat::Html => BodyType::Html,
                },
                content: body.content.clone(),
            },
            to_recipients: recipients(envelope.to()),
            cc_recipients: recipients(envelope.cc()),
            bcc_recipients: recipients(envelope.bcc()),
            internet_message_headers,
        }
    }
}

/// Message body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemBody {
    /// Body format.
    pub content_type: BodyType,
    /// Body content.
    pub content: String,
}

/// Body format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BodyType {
    /// Plain text.
    #[serde(rename = "text")]
    Text,
    /// HTML.
    #[serde(rename = "html")]
    Html,
}

/// A message recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    /// Address and optional name.
    pub email_address: EmailAddress,
}

impl From<&Address> for Recipient {
    fn from(addr: &Address) -> Self {
        Self {
            email_address: EmailAddress {
                address: addr.email.clone(),
                name: addr.name.clone(),
            },
        }
    }
}

/// Address inside a [`Recipient`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailAddress {
    /// Email address.
    pub address: String,
    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// A custom header carried by Graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InternetMessageHeader {
    /// Header name, starting with `X-`.
    pub name: String,
    /// Header value.
    pub value: String,
}

/// Describes a file about to be uploaded through an upload session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentItem {
    /// Always `file`.
    pub attachment_type: &'static str,
    /// Attachment filename.
    pub name: String,
    /// Total size in bytes.
    pub size: u64,
    /// MIME content type.
    pub content_type: String,
}

impl From<&ResolvedAttachment> for AttachmentItem {
    fn from(attachment: &ResolvedAttachment) -> Self {
        Self {
            attachment_type: "file",
            name: attachment.filename.clone(),
            size: attachment.size(),
            content_type: attachment.content_type.clone(),
        }
    }
}

/// An open upload session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    /// Pre-authorised URL chunks are PUT to.
    pub upload_url: UploadUrl,
    /// Byte ranges the service still expects, e.g. `["0-"]`.
    #[serde(default)]
    pub next_expected_ranges: Vec<String>,
}

impl UploadSession {
    /// First byte the service expects, taken from the first expected range.
    ///
    /// An absent or unparsable range means start from the beginning.
    pub fn next_offset(&self) -> u64 {
        self.next_expected_ranges
            .first()
            .and_then(|range| range.split('-').next())
            .and_then(|start| start.trim().parse().ok())
            .unwrap_or(0)
    }
}

/// Graph mail operations used by [`GraphAdapter`].
///
/// Implemented by [`GraphClient`] for real traffic.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MailApi: Send + Sync {
    /// Sends a message in one call. Used only when there are no attachments.
    async fn send_mail(&self, mailbox: &MailboxTarget, message: &GraphMessage) -> Result<()>;

    /// Creates a draft and returns its id.
    async fn create_draft(&self, mailbox: &MailboxTarget, message: &GraphMessage)
        -> Result<DraftId>;

    /// Opens an upload session for one attachment of a draft.
    async fn create_upload_session(
        &self,
        mailbox: &MailboxTarget,
        draft: &DraftId,
        item: &AttachmentItem,
    ) -> Result<UploadSession>;

    /// Uploads `chunk`, which starts at byte `offset` of a `total`-byte file.
    async fn upload_chunk(
        &self,
        session: &UploadSession,
        offset: u64,
        total: u64,
        chunk: Bytes,
    ) -> Result<()>;

    /// Sends a completed draft.
    async fn send_draft(&self, mailbox: &MailboxTarget, draft: &DraftId) -> Result<()>;
}

/// OAuth token response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[allow(dead_code)]
    #[serde(default)]
    expires_in: u64,
    #[allow(dead_code)]
    #[serde(default)]
    token_type: String,
}

/// Draft creation response.
#[derive(Debug, Deserialize)]
struct CreatedMessage {
    id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMailRequest<'a> {
    message: &'a GraphMessage,
    save_to_sent_items: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct UploadSessionRequest<'a> {
    attachment_item: &'a AttachmentItem,
}

/// Authenticated Graph REST client.
pub struct GraphClient {
    /// HTTP client for API requests.
    client: reqwest::Client,
    /// REST endpoint, e.g. `https://graph.microsoft.com/v1.0`.
    api_base: Url,
    /// Bearer token from sign-in.
    access_token: String,
}

impl GraphClient {
    /// Signs in with the configured delegated credentials.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidConfig`] for bad settings,
    /// [`DispatchError::Authentication`] when the authority rejects the
    /// credentials and [`DispatchError::Transport`] when it cannot be reached.
    pub async fn sign_in(settings: &GraphSettings) -> Result<Self> {
        Self::sign_in_with(reqwest::Client::new(), settings).await
    }

    /// Signs in using `client` for the token request and every later call.
    pub async fn sign_in_with(client: reqwest::Client, settings: &GraphSettings) -> Result<Self> {
        settings.validate()?;
        let api_base = parse_base(&settings.api_base)?;

        let scope = format!("{}/.default", api_base.origin().ascii_serialization());
        let params = [
            ("client_id", settings.app_id.as_str()),
            ("grant_type", "password"),
            ("username", settings.username.as_str()),
            ("password", settings.password.as_str()),
            ("scope", scope.as_str()),
        ];

        let response = client
            .post(settings.token_url())
            .form(&params)
            .send()
            .await
            .map_err(|e| DispatchError::Transport(format!("token request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DispatchError::Authentication(format!(
                "token acquisition failed ({}): {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| DispatchError::Authentication(format!("parse token response: {}", e)))?;

        tracing::info!(user = %settings.username, "Signed in to Graph");
        Ok(Self::with_token(client, api_base, token.access_token))
    }

    /// Creates a client around an already acquired token.
    pub fn with_token(client: reqwest::Client, api_base: Url, access_token: String) -> Self {
        Self {
            client,
            api_base,
            access_token,
        }
    }

    /// Builds an endpoint URL below the API base, percent-encoding each segment.
    fn endpoint(&self, mailbox: &MailboxTarget, rest: &[&str]) -> Result<Url> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| DispatchError::InvalidConfig("API base cannot be a base URL".to_string()))?
            .pop_if_empty()
            .extend(mailbox.segments())
            .extend(rest);
        Ok(url)
    }

    /// Builds authorization headers for API requests.
    fn auth_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.access_token))
                .map_err(|e| DispatchError::Authentication(format!("invalid token: {}", e)))?,
        );
        Ok(headers)
    }

    /// Makes an authenticated POST request and decodes the JSON response.
    async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(&self, url: Url, body: &B) -> Result<T> {
        let response = self
            .client
            .post(url)
            .headers(self.auth_headers()?)
            .json(body)
            .send()
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::handle_error(response).await);
        }
        response
            .json()
            .await
            .map_err(|e| DispatchError::Transport(format!("parse response: {}", e)))
    }

    /// Makes an authenticated POST request that doesn't return a body.
    async fn post_no_response(&self, url: Url, body: Option<&SendMailRequest<'_>>) -> Result<()> {
        let request = self.client.post(url).headers(self.auth_headers()?);
        let request = match body {
            Some(body) => request.json(body),
            None => request.body(Vec::new()),
        };

        let response = request
            .send()
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::handle_error(response).await);
        }
        Ok(())
    }

    /// Handles API error responses.
    async fn handle_error(response: reqwest::Response) -> DispatchError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        match status.as_u16() {
            401 | 403 => DispatchError::Authentication(format!("unauthorized ({}): {}", status, body)),
            _ => DispatchError::Transport(format!("Graph API error ({}): {}", status, body)),
        }
    }
}

#[async_trait]
impl MailApi for GraphClient {
    async fn send_mail(&self, mailbox: &MailboxTarget, message: &GraphMessage) -> Result<()> {
        let url = self.endpoint(mailbox, &["sendMail"])?;
        let request = SendMailRequest {
            message,
            save_to_sent_items: true,
        };
        self.post_no_response(url, Some(&request)).await
    }

    async fn create_draft(
        &self,
        mailbox: &MailboxTarget,
        message: &GraphMessage,
    ) -> Result<DraftId> {
        let url = self.endpoint(mailbox, &["messages"])?;
        let created: CreatedMessage = self.post(url, message).await?;
        Ok(DraftId(created.id))
    }

    async fn create_upload_session(
        &self,
        mailbox: &MailboxTarget,
        draft: &DraftId,
        item: &AttachmentItem,
    ) -> Result<UploadSession> {
        let url = self.endpoint(
            mailbox,
            &["messages", &draft.0, "attachments", "createUploadSession"],
        )?;
        let request = UploadSessionRequest {
            attachment_item: item,
        };
        self.post(url, &request).await
    }

    async fn upload_chunk(
        &self,
        session: &UploadSession,
        offset: u64,
        total: u64,
        chunk: Bytes,
    ) -> Result<()> {
        if chunk.is_empty() {
            return Err(DispatchError::InvalidInput(
                "upload chunk cannot be empty".to_string(),
            ));
        }
        let end = offset + chunk.len() as u64 - 1;
        // The upload URL carries its own authorization.
        let response = self
            .client
            .put(&session.upload_url.0)
            .header(CONTENT_RANGE, format!("bytes {}-{}/{}", offset, end, total))
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(chunk)
            .send()
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::handle_error(response).await);
        }
        Ok(())
    }

    async fn send_draft(&self, mailbox: &MailboxTarget, draft: &DraftId) -> Result<()> {
        let url = self.endpoint(mailbox, &["messages", &draft.0, "send"])?;
        self.post_no_response(url, None).await
    }
}

fn parse_base(api_base: &str) -> Result<Url> {
    Url::parse(api_base)
        .map_err(|e| DispatchError::InvalidConfig(format!("invalid API base {:?}: {}", api_base, e)))
}

/// Graph delivery.
///
/// Messages without attachments go out in a single `sendMail` call. Messages
/// with attachments are created as a draft, each attachment is streamed through
/// its own upload session in order, and the draft is sent last.
///
/// If an upload fails or the send is cancelled after the draft exists, the
/// draft is left in the mailbox.
pub struct GraphAdapter<A> {
    api: A,
    chunk_size: usize,
}

impl<A: MailApi> GraphAdapter<A> {
    /// Creates an adapter that uploads in `chunk_size` byte slices.
    pub fn new(api: A, chunk_size: usize) -> Self {
        Self {
            api,
            chunk_size: chunk_size.max(1),
        }
    }

    async fn upload_attachment(
        &self,
        mailbox: &MailboxTarget,
        draft: &DraftId,
        attachment: &ResolvedAttachment,
    ) -> Result<()> {
        let item = AttachmentItem::from(attachment);
        let session = self.api.create_upload_session(mailbox, draft, &item).await?;

        let total = attachment.size();
        let mut offset = usize::try_from(session.next_offset())
            .unwrap_or(usize::MAX)
            .min(attachment.data.len());
        if offset > 0 {
            tracing::debug!(file = %attachment.filename, offset, "Resuming upload session");
        }
        while offset < attachment.data.len() {
            let end = (offset + self.chunk_size).min(attachment.data.len());
            self.api
                .upload_chunk(&session, offset as u64, total, attachment.data.slice(offset..end))
                .await?;
            tracing::debug!(
                file = %attachment.filename,
                uploaded = end,
                total,
                "Uploaded attachment chunk"
            );
            offset = end;
        }
        Ok(())
    }
}

/// Checks the fields Graph refuses to send without.
pub fn require_message_fields(subject: &str, body: &str, has_to: bool) -> Result<()> {
    if subject.trim().is_empty() || body.trim().is_empty() || !has_to {
        return Err(DispatchError::InvalidInput(
            "Subject, message, and To-recipient cannot be empty".to_string(),
        ));
    }
    Ok(())
}

#[async_trait]
impl<A: MailApi> EnvelopeTransport for GraphAdapter<A> {
    fn name(&self) -> &'static str {
        "graph"
    }

    async fn send(
        &self,
        envelope: &MessageEnvelope,
        cancel: &CancellationToken,
    ) -> Result<SendResult> {
        require_message_fields(
            envelope.subject(),
            &envelope.body().text().content,
            !envelope.to().is_empty(),
        )?;

        let mailbox = MailboxTarget::for_sender(envelope.from());
        let message = GraphMessage::from_envelope(envelope);
        let attachments = envelope.body().attachments();

        if attachments.is_empty() {
            self.api.send_mail(&mailbox, &message).await?;
            tracing::info!(mailbox = ?mailbox, recipients = envelope.to().len(), "Email sent via Graph");
            return Ok(SendResult::sent(&envelope.rendered_to()));
        }

        let draft = self.api.create_draft(&mailbox, &message).await?;
        tracing::debug!(draft = %draft, attachments = attachments.len(), "Created Graph draft");

        for attachment in attachments {
            if let Err(e) = ensure_not_cancelled(cancel) {
                tracing::warn!(draft = %draft, "Send cancelled, draft left in mailbox");
                return Err(e);
            }
            if attachment.data.is_empty() {
                tracing::warn!(file = %attachment.filename, "Skipping empty file, upload sessions need content");
                continue;
            }
            if let Err(e) = self.upload_attachment(&mailbox, &draft, attachment).await {
                tracing::warn!(draft = %draft, file = %attachment.filename, "Upload failed, draft left in mailbox");
                return Err(e);
            }
        }

        self.api.send_draft(&mailbox, &draft).await?;
        tracing::info!(
            mailbox = ?mailbox,
            draft = %draft,
            recipients = envelope.to().len(),
            attachments = attachments.len(),
            "Email sent via Graph"
        );
        Ok(SendResult::sent(&envelope.rendered_to()))
    }
}
