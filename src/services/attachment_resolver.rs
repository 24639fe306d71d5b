//! Attachment resolution.
//!
//! The [`AttachmentResolver`] turns each [`AttachmentDescriptor`] into concrete
//! [`ResolvedAttachment`]s. It is the only place that branches on the source
//! shape; everything downstream sees names, content types and bytes.
//!
//! Missing content is governed by the descriptor's two policy flags:
//!
//! | `fail_if_missing` | `send_if_missing` | no content resolves                          |
//! |-------------------|-------------------|----------------------------------------------|
//! | true              | any               | glob: error; inline: halt                    |
//! | false             | false             | halt, email not sent                         |
//! | false             | true              | glob: nothing attached; inline: empty part   |

use std::fmt;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};

use crate::domain::{AttachmentDescriptor, AttachmentSource, ResolvedAttachment, TextEncoding};
use crate::error::{DispatchError, Result};

/// Why a send stops without being an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Halt {
    /// A file pattern matched nothing and the policy says not to send.
    NoMatches {
        /// The pattern as given.
        path: String,
    },
    /// An inline text attachment named an unsupported encoding.
    InvalidEncoding {
        /// Attachment filename.
        file_name: String,
    },
    /// An inline attachment had no content and the policy requires content.
    EmptyContent {
        /// Attachment filename.
        file_name: String,
    },
}

impl fmt::Display for Halt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoMatches { path } => write!(
                f,
                "No attachments found matching path \"{}\". No email sent.",
                path
            ),
            Self::InvalidEncoding { file_name } => {
                write!(f, "Invalid encoding set for attachment {}", file_name)
            }
            Self::EmptyContent { file_name } => {
                write!(f, "Invalid attachment {} - no content found", file_name)
            }
        }
    }
}

/// Outcome of resolving one or more descriptors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Attachments to include, possibly none.
    Attach(Vec<ResolvedAttachment>),
    /// Stop without sending.
    Halt(Halt),
}

/// Resolves attachment descriptors against the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttachmentResolver;

impl AttachmentResolver {
    /// Creates a resolver.
    pub fn new() -> Self {
        Self
    }

    /// Resolves every descriptor in order, stopping at the first halt.
    pub async fn resolve_all(&self, descriptors: &[AttachmentDescriptor]) -> Result<Resolution> {
        let mut resolved = Vec::new();
        for descriptor in descriptors {
            match self.resolve(descriptor).await? {
                Resolution::Attach(attachments) => resolved.extend(attachments),
                halt @ Resolution::Halt(_) => return Ok(halt),
            }
        }
        Ok(Resolution::Attach(resolved))
    }

    /// Resolves a single descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::AttachmentNotFound`] when a file pattern matches
    /// nothing and `fail_if_missing` is set, [`DispatchError::InvalidInput`]
    /// for an unusable pattern or filename, and [`DispatchError::Io`] when a
    /// matched file cannot be read.
    pub async fn resolve(&self, descriptor: &AttachmentDescriptor) -> Result<Resolution> {
        match &descriptor.source {
            AttachmentSource::FileGlob { path } => self.resolve_glob(path, descriptor).await,
            AttachmentSource::InlineText {
                content,
                encoding,
                file_name,
            } => {
                let encoding = match encoding.parse::<TextEncoding>() {
                    Ok(encoding) => encoding,
                    Err(e) => {
                        tracing::warn!(file_name = %file_name, "{}", e);
                        return Ok(Resolution::Halt(Halt::InvalidEncoding {
                            file_name: file_name.clone(),
                        }));
                    }
                };
                Self::resolve_inline(file_name, encoding.encode(content), descriptor)
            }
            AttachmentSource::InlineBytes { content, file_name } => {
                Self::resolve_inline(file_name, content.clone(), descriptor)
            }
        }
    }

    async fn resolve_glob(&self, path: &str, descriptor: &AttachmentDescriptor) -> Result<Resolution> {
        let files = list_matching_files(path).await?;

        if files.is_empty() {
            if descriptor.fail_if_missing {
                return Err(DispatchError::AttachmentNotFound {
                    path: path.to_string(),
                });
            }
            if !descriptor.send_if_missing {
                return Ok(Resolution::Halt(Halt::NoMatches {
                    path: path.to_string(),
                }));
            }
            tracing::debug!(path = %path, "No files matched attachment pattern, sending without");
            return Ok(Resolution::Attach(Vec::new()));
        }

        let mut attachments = Vec::with_capacity(files.len());
        for file in files {
            let data = tokio::fs::read(&file).await?;
            let filename = file
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            tracing::debug!(file = %file.display(), size = data.len(), "Resolved file attachment");
            attachments.push(ResolvedAttachment::new(filename, data));
        }
        Ok(Resolution::Attach(attachments))
    }

    fn resolve_inline(
        file_name: &str,
        data: Vec<u8>,
        descriptor: &AttachmentDescriptor,
    ) -> Result<Resolution> {
        if file_name.trim().is_empty() {
            return Err(DispatchError::InvalidInput(
                "inline attachment requires a file name".to_string(),
            ));
        }

        if data.is_empty() && !descriptor.allows_missing() {
            return Ok(Resolution::Halt(Halt::EmptyContent {
                file_name: file_name.to_string(),
            }));
        }

        tracing::debug!(file_name = %file_name, size = data.len(), "Resolved inline attachment");
        Ok(Resolution::Attach(vec![ResolvedAttachment::new(file_name, data)]))
    }
}

/// Splits a pattern path into its directory and filename mask.
///
/// A trailing separator or a bare directory-less mask is handled the same way
/// a shell would: `"/out/"` lists everything in `/out`, `"*.csv"` looks in the
/// working directory.
fn split_pattern(path: &str) -> (PathBuf, String) {
    let is_separator = |c: char| c == '/' || c == MAIN_SEPARATOR;

    let (dir, mask) = match path.rfind(is_separator) {
        Some(0) => ("/", &path[1..]),
        Some(idx) => (&path[..idx], &path[idx + 1..]),
        None => (".", path),
    };
    let mask = if mask.is_empty() { "*" } else { mask };
    (PathBuf::from(dir), mask.to_string())
}

/// Lists regular files directly inside the pattern's directory whose names
/// match its mask, sorted by name. A missing directory yields no files.
async fn list_matching_files(path: &str) -> Result<Vec<PathBuf>> {
    let (dir, mask) = split_pattern(path);
    let pattern = glob::Pattern::new(&mask).map_err(|e| {
        DispatchError::InvalidInput(format!("invalid attachment pattern {:?}: {}", path, e))
    })?;

    let mut entries = match tokio::fs::read_dir(&dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(dir = %dir.display(), "Attachment directory does not exist");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        if !pattern.matches(&name.to_string_lossy()) {
            continue;
        }
        if is_regular_file(&entry.path()).await {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

async fn is_regular_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn fixture() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.csv"), "b,2\n").unwrap();
        std::fs::write(dir.path().join("a.csv"), "a,1\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "hello").unwrap();
        std::fs::create_dir(dir.path().join("nested.csv")).unwrap();
        std::fs::write(dir.path().join("nested.csv").join("c.csv"), "c,3\n").unwrap();
        dir
    }

    fn names(resolution: &Resolution) -> Vec<String> {
        match resolution {
            Resolution::Attach(attachments) => {
                attachments.iter().map(|a| a.filename.clone()).collect()
            }
            Resolution::Halt(halt) => panic!("Expected attachments, got halt: {}", halt),
        }
    }

    #[test]
    fn split_pattern_variants() {
        assert_eq!(
            split_pattern("/data/out/*.csv"),
            (PathBuf::from("/data/out"), "*.csv".to_string())
        );
        assert_eq!(
            split_pattern("/data/out/"),
            (PathBuf::from("/data/out"), "*".to_string())
        );
        assert_eq!(split_pattern("/x.txt"), (PathBuf::from("/"), "x.txt".to_string()));
        assert_eq!(split_pattern("x.txt"), (PathBuf::from("."), "x.txt".to_string()));
    }

    #[tokio::test]
    async fn glob_matches_files_non_recursively_in_name_order() {
        let dir = fixture();
        let descriptor = AttachmentDescriptor::file_glob(format!("{}/*.csv", dir.path().display()));

        let resolution = AttachmentResolver::new().resolve(&descriptor).await.unwrap();

        assert_eq!(names(&resolution), vec!["a.csv", "b.csv"]);
        if let Resolution::Attach(attachments) = resolution {
            assert_eq!(attachments[0].content_type, "text/csv");
            assert_eq!(&attachments[0].data[..], b"a,1\n");
        }
    }

    #[tokio::test]
    async fn empty_filename_segment_matches_everything() {
        let dir = fixture();
        let descriptor = AttachmentDescriptor::file_glob(format!("{}/", dir.path().display()));

        let resolution = AttachmentResolver::new().resolve(&descriptor).await.unwrap();

        assert_eq!(names(&resolution), vec!["a.csv", "b.csv", "notes.txt"]);
    }

    #[tokio::test]
    async fn exact_filename_matches_one_file() {
        let dir = fixture();
        let descriptor =
            AttachmentDescriptor::file_glob(format!("{}/notes.txt", dir.path().display()));

        let resolution = AttachmentResolver::new().resolve(&descriptor).await.unwrap();

        assert_eq!(names(&resolution), vec!["notes.txt"]);
    }

    #[tokio::test]
    async fn no_match_with_fail_flag_is_an_error() {
        let dir = fixture();
        let path = format!("{}/*.pdf", dir.path().display());
        let descriptor = AttachmentDescriptor::file_glob(path.clone())
            .fail_if_missing(true)
            .send_if_missing(true);

        let err = AttachmentResolver::new().resolve(&descriptor).await.unwrap_err();

        assert!(matches!(err, DispatchError::AttachmentNotFound { path: p } if p == path));
    }

    #[tokio::test]
    async fn no_match_without_send_flag_halts() {
        let dir = fixture();
        let path = format!("{}/*.pdf", dir.path().display());
        let descriptor = AttachmentDescriptor::file_glob(path.clone()).send_if_missing(false);

        let resolution = AttachmentResolver::new().resolve(&descriptor).await.unwrap();

        assert_eq!(resolution, Resolution::Halt(Halt::NoMatches { path: path.clone() }));
        if let Resolution::Halt(halt) = resolution {
            assert_eq!(
                halt.to_string(),
                format!("No attachments found matching path \"{}\". No email sent.", path)
            );
        }
    }

    #[tokio::test]
    async fn no_match_with_send_flag_resolves_nothing() {
        let dir = fixture();
        let descriptor = AttachmentDescriptor::file_glob(format!("{}/*.pdf", dir.path().display()));

        let resolution = AttachmentResolver::new().resolve(&descriptor).await.unwrap();

        assert_eq!(resolution, Resolution::Attach(vec![]));
    }

    #[tokio::test]
    async fn missing_directory_counts_as_no_match() {
        let dir = fixture();
        let path = format!("{}/gone/*.csv", dir.path().display());

        let lenient = AttachmentDescriptor::file_glob(path.clone());
        assert_eq!(
            AttachmentResolver::new().resolve(&lenient).await.unwrap(),
            Resolution::Attach(vec![])
        );

        let strict = AttachmentDescriptor::file_glob(path).fail_if_missing(true);
        assert!(matches!(
            AttachmentResolver::new().resolve(&strict).await,
            Err(DispatchError::AttachmentNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn invalid_pattern_is_rejected() {
        let descriptor = AttachmentDescriptor::file_glob("/tmp/[unclosed");
        assert!(matches!(
            AttachmentResolver::new().resolve(&descriptor).await,
            Err(DispatchError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn inline_text_is_encoded() {
        let descriptor = AttachmentDescriptor::inline_text("Åre", "latin1", "place.txt");

        let resolution = AttachmentResolver::new().resolve(&descriptor).await.unwrap();

        assert_eq!(
            resolution,
            Resolution::Attach(vec![ResolvedAttachment::new("place.txt", vec![0xC5, b'r', b'e'])])
        );
    }

    #[tokio::test]
    async fn unknown_encoding_halts() {
        let descriptor = AttachmentDescriptor::inline_text("data", "klingon", "data.txt");

        let resolution = AttachmentResolver::new().resolve(&descriptor).await.unwrap();

        let Resolution::Halt(halt) = resolution else {
            panic!("Expected halt");
        };
        assert_eq!(halt.to_string(), "Invalid encoding set for attachment data.txt");
    }

    #[tokio::test]
    async fn empty_inline_content_follows_policy() {
        let resolver = AttachmentResolver::new();

        let lenient = AttachmentDescriptor::inline_text("", "utf-8", "empty.txt");
        assert_eq!(
            resolver.resolve(&lenient).await.unwrap(),
            Resolution::Attach(vec![ResolvedAttachment::new("empty.txt", Vec::new())])
        );

        let lenient_bytes = AttachmentDescriptor::inline_bytes(Vec::new(), "empty.bin");
        let Resolution::Attach(attached) = resolver.resolve(&lenient_bytes).await.unwrap() else {
            panic!("Expected attachment");
        };
        assert_eq!(attached.len(), 1);
        assert_eq!(attached[0].filename, "empty.bin");
        assert_eq!(attached[0].size(), 0);

        let strict = AttachmentDescriptor::inline_bytes(Vec::new(), "empty.bin").fail_if_missing(true);
        let Resolution::Halt(halt) = resolver.resolve(&strict).await.unwrap() else {
            panic!("Expected halt");
        };
        assert_eq!(halt.to_string(), "Invalid attachment empty.bin - no content found");

        let no_send = AttachmentDescriptor::inline_text("", "utf-8", "empty.txt").send_if_missing(false);
        assert!(matches!(
            resolver.resolve(&no_send).await.unwrap(),
            Resolution::Halt(Halt::EmptyContent { .. })
        ));
    }

    #[tokio::test]
    async fn inline_bytes_pass_through() {
        let descriptor = AttachmentDescriptor::inline_bytes(vec![0, 1, 2, 255], "blob.bin");

        let resolution = AttachmentResolver::new().resolve(&descriptor).await.unwrap();

        let Resolution::Attach(attachments) = resolution else {
            panic!("Expected attachments");
        };
        assert_eq!(&attachments[0].data[..], &[0, 1, 2, 255]);
        assert_eq!(attachments[0].content_type, "application/octet-stream");
    }

    #[tokio::test]
    async fn inline_attachment_requires_file_name() {
        let descriptor = AttachmentDescriptor::inline_bytes(vec![1], " ");
        assert!(matches!(
            AttachmentResolver::new().resolve(&descriptor).await,
            Err(DispatchError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn resolve_all_preserves_order_and_stops_at_halt() {
        let dir = fixture();
        let resolver = AttachmentResolver::new();
        let descriptors = vec![
            AttachmentDescriptor::inline_text("first", "utf-8", "first.txt"),
            AttachmentDescriptor::file_glob(format!("{}/*.csv", dir.path().display())),
            AttachmentDescriptor::inline_bytes(vec![9], "last.bin"),
        ];

        let resolution = resolver.resolve_all(&descriptors).await.unwrap();
        assert_eq!(
            names(&resolution),
            vec!["first.txt", "a.csv", "b.csv", "last.bin"]
        );

        let halting = vec![
            AttachmentDescriptor::inline_text("x", "bogus", "x.txt"),
            AttachmentDescriptor::file_glob("/definitely/missing/*").fail_if_missing(true),
        ];
        assert!(matches!(
            resolver.resolve_all(&halting).await.unwrap(),
            Resolution::Halt(Halt::InvalidEncoding { .. })
        ));
    }
}
