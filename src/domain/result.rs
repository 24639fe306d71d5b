//! Outcome reported to the calling workflow step.

use serde::{Deserialize, Serialize};

/// Whether the email went out, with a human-readable status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendResult {
    /// True once the transport accepted the message.
    pub email_sent: bool,
    /// Description of what happened.
    pub status_string: String,
}

impl SendResult {
    /// A delivered message addressed to `rendered_to`.
    pub fn sent(rendered_to: &str) -> Self {
        Self {
            email_sent: true,
            status_string: format!("Email sent to: {}", rendered_to),
        }
    }

    /// A message that was deliberately not sent.
    pub fn not_sent(status: impl Into<String>) -> Self {
        Self {
            email_sent: false,
            status_string: status.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sent_status() {
        let result = SendResult::sent("a@x.com, b@y.com");
        assert!(result.email_sent);
        assert_eq!(result.status_string, "Email sent to: a@x.com, b@y.com");
    }

    #[test]
    fn serializes_with_field_names() {
        let json = serde_json::to_string(&SendResult::not_sent("skipped")).unwrap();
        assert_eq!(json, r#"{"email_sent":false,"status_string":"skipped"}"#);
    }
}
