//! Transport trait definition.
//!
//! This module defines the [`EnvelopeTransport`] trait implemented by the SMTP
//! and Graph adapters. Both consume the same [`MessageEnvelope`] and report a
//! [`SendResult`]; they share no other code.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::{MessageEnvelope, SendResult};
use crate::error::{DispatchError, Result};

/// Capability to deliver an assembled envelope.
///
/// Implementations check `cancel` at attachment boundaries only; a chunk or
/// command already in flight is allowed to finish.
///
/// # Example
///
/// ```ignore
/// use mail_dispatch::providers::email::{EnvelopeTransport, SmtpAdapter};
///
/// async fn deliver(transport: &dyn EnvelopeTransport, envelope: &MessageEnvelope) -> Result<()> {
///     let result = transport.send(envelope, &CancellationToken::new()).await?;
///     println!("{}", result.status_string);
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait EnvelopeTransport: Send + Sync {
    /// Short transport name for logs.
    fn name(&self) -> &'static str;

    /// Delivers the envelope.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Authentication`] or [`DispatchError::Transport`]
    /// for server-side failures and [`DispatchError::Cancelled`] when `cancel`
    /// fires before an attachment is staged.
    async fn send(
        &self,
        envelope: &MessageEnvelope,
        cancel: &CancellationToken,
    ) -> Result<SendResult>;
}

/// Fails with [`DispatchError::Cancelled`] once `cancel` has fired.
pub(crate) fn ensure_not_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(DispatchError::Cancelled);
    }
    Ok(())
}
