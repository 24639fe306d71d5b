//! Attachment descriptors and resolved attachment payloads.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Where an attachment's content comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AttachmentSource {
    /// Files in one directory matching a filename pattern (`*` and `?` wildcards).
    ///
    /// A path ending in a separator matches every file in that directory.
    FileGlob {
        /// Directory plus filename pattern.
        path: String,
    },
    /// Text content encoded with a named encoding.
    InlineText {
        /// Raw text.
        content: String,
        /// Encoding name, validated at resolution time.
        encoding: String,
        /// Attachment filename.
        file_name: String,
    },
    /// Raw bytes attached unchanged.
    InlineBytes {
        /// Attachment content.
        #[serde(with = "base64_serde")]
        content: Vec<u8>,
        /// Attachment filename.
        file_name: String,
    },
}

/// One attachment request together with its missing-content policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentDescriptor {
    /// Content source.
    #[serde(flatten)]
    pub source: AttachmentSource,
    /// Fail the whole send when no content resolves.
    #[serde(default)]
    pub fail_if_missing: bool,
    /// Send anyway, without this attachment, when no content resolves.
    #[serde(default = "default_send_if_missing")]
    pub send_if_missing: bool,
}

fn default_send_if_missing() -> bool {
    true
}

impl AttachmentDescriptor {
    /// Describes the files matching `path`.
    pub fn file_glob(path: impl Into<String>) -> Self {
        Self::with_source(AttachmentSource::FileGlob { path: path.into() })
    }

    /// Describes text content to be encoded with `encoding`.
    pub fn inline_text(
        content: impl Into<String>,
        encoding: impl Into<String>,
        file_name: impl Into<String>,
    ) -> Self {
        Self::with_source(AttachmentSource::InlineText {
            content: content.into(),
            encoding: encoding.into(),
            file_name: file_name.into(),
        })
    }

    /// Describes a byte buffer.
    pub fn inline_bytes(content: impl Into<Vec<u8>>, file_name: impl Into<String>) -> Self {
        Self::with_source(AttachmentSource::InlineBytes {
            content: content.into(),
            file_name: file_name.into(),
        })
    }

    fn with_source(source: AttachmentSource) -> Self {
        Self {
            source,
            fail_if_missing: false,
            send_if_missing: true,
        }
    }

    /// Sets whether missing content aborts the send with an error.
    pub fn fail_if_missing(mut self, fail: bool) -> Self {
        self.fail_if_missing = fail;
        self
    }

    /// Sets whether the email is still sent when content is missing.
    pub fn send_if_missing(mut self, send: bool) -> Self {
        self.send_if_missing = send;
        self
    }

    /// Whether an empty result may be skipped silently.
    pub fn allows_missing(&self) -> bool {
        !self.fail_if_missing && self.send_if_missing
    }
}

/// Concrete attachment content ready to be placed in an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAttachment {
    /// Filename shown to the recipient.
    pub filename: String,
    /// MIME content type derived from the filename extension.
    pub content_type: String,
    /// Payload.
    pub data: Bytes,
}

impl ResolvedAttachment {
    /// Creates an attachment, deriving the content type from `filename`.
    pub fn new(filename: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let filename = filename.into();
        let content_type = mime_guess::from_path(&filename)
            .first_or_octet_stream()
            .to_string();
        Self {
            filename,
            content_type,
            data: data.into(),
        }
    }

    /// Payload size in bytes.
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

mod base64_serde {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD
            .decode(&s)
            .map_err(|e| serde::de::Error::custom(e.to_string()))
    }
}
