//! Identifier types returned by the Graph mail API.
//!
//! These newtype wrappers keep draft message ids and upload session URLs
//! from being passed where the other is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Id of a draft message created in a mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DraftId(pub String);

impl fmt::Display for DraftId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DraftId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DraftId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Pre-authorised URL of an attachment upload session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UploadUrl(pub String);

impl fmt::Display for UploadUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for UploadUrl {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UploadUrl {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}
