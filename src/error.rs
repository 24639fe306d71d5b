//! Error type shared by the resolver, the envelope builder and both transports.
//!
//! Only conditions that indicate a broken configuration or a malformed request
//! are errors. Outcomes a workflow can branch on (a missing optional attachment,
//! an unknown inline encoding) are reported as a [`SendResult`] instead.
//!
//! [`SendResult`]: crate::domain::SendResult

/// Result type alias for dispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Errors that abort a dispatch.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Transport settings are missing or malformed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A required message field is missing or unusable.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A recipient or sender address is not syntactically valid.
    #[error("invalid address {address:?}: {reason}")]
    InvalidAddress {
        /// The offending address as given.
        address: String,
        /// Parser diagnostic.
        reason: String,
    },

    /// A file attachment pattern matched nothing and the descriptor demands a match.
    #[error("the given filepath \"{path}\" had no matching files")]
    AttachmentNotFound {
        /// The pattern as given.
        path: String,
    },

    /// Credentials were rejected or a token could not be obtained.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Network or protocol failure reported by the mail server or API.
    #[error("transport error: {0}")]
    Transport(String),

    /// Local filesystem failure while reading attachments.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The caller cancelled the send at an attachment boundary.
    #[error("send cancelled")]
    Cancelled,
}
