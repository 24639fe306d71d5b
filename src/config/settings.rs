//! Transport settings and dispatch job files.
//!
//! Settings are plain serde structs so a workflow engine can hand them over as
//! JSON. A complete job (message, attachments, transport) is a
//! [`DispatchRequest`], which the command-line entry point reads from disk.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{AttachmentDescriptor, MessageSpec};
use crate::error::{DispatchError, Result};

/// Public-cloud sign-in authority.
pub const PUBLIC_CLOUD_AUTHORITY: &str = "https://login.microsoftonline.com";
/// Graph REST endpoint.
pub const GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0";
/// Upload session chunks must be a multiple of this many bytes.
pub const UPLOAD_CHUNK_GRANULARITY: usize = 320 * 1024;

/// SMTP connection security.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum SecureSocket {
    /// Plain text, no TLS.
    None,
    /// TLS from the first byte (SMTPS).
    ImplicitTls,
    /// STARTTLS, failing if the server does not offer it.
    StartTls,
    /// STARTTLS when the server offers it, plain text otherwise.
    StartTlsIfAvailable,
    /// Pick based on the port.
    Auto,
}

impl From<String> for SecureSocket {
    fn from(value: String) -> Self {
        let normalized: String = value
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "none" => Self::None,
            "implicittls" | "sslonconnect" | "tls" => Self::ImplicitTls,
            "starttls" => Self::StartTls,
            "starttlsifavailable" | "starttlswhenavailable" => Self::StartTlsIfAvailable,
            _ => Self::Auto,
        }
    }
}

impl SecureSocket {
    /// Resolves [`SecureSocket::Auto`] for a concrete port.
    ///
    /// Port 465 is SMTPS; anything else upgrades opportunistically.
    pub fn resolve(self, port: u16) -> Self {
        match self {
            Self::Auto if port == 465 => Self::ImplicitTls,
            Self::Auto => Self::StartTlsIfAvailable,
            other => other,
        }
    }
}

/// SMTP server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpSettings {
    /// Server hostname.
    pub server: String,
    /// Server port.
    pub port: u16,
    /// Username for plain authentication.
    pub username: String,
    /// Password for plain authentication.
    pub password: String,
    /// Connection security.
    pub secure_socket: SecureSocket,
    /// Skip certificate and hostname validation.
    pub accept_all_certs: bool,
    /// Send without authenticating.
    pub skip_authentication: bool,
    /// Command timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            server: String::new(),
            port: 25,
            username: String::new(),
            password: String::new(),
            secure_socket: SecureSocket::Auto,
            accept_all_certs: false,
            skip_authentication: false,
            timeout_secs: 60,
        }
    }
}

impl SmtpSettings {
    /// Creates settings for `server:port` with automatic security.
    pub fn new(server: impl Into<String>, port: u16) -> Self {
        Self {
            server: server.into(),
            port,
            ..Self::default()
        }
    }

    /// Checks that the settings can open a connection.
    pub fn validate(&self) -> Result<()> {
        if self.server.trim().is_empty() {
            return Err(DispatchError::InvalidConfig(
                "SMTP server cannot be empty".to_string(),
            ));
        }
        if !self.skip_authentication && self.username.trim().is_empty() {
            return Err(DispatchError::InvalidConfig(
                "SMTP username is required unless authentication is skipped".to_string(),
            ));
        }
        Ok(())
    }
}

/// Microsoft Graph mail API configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphSettings {
    /// Application (client) id.
    pub app_id: String,
    /// Directory (tenant) id.
    pub tenant_id: String,
    /// Account used for delegated sign-in.
    pub username: String,
    /// Password for delegated sign-in.
    pub password: String,
    /// Sign-in authority host.
    pub authority_host: String,
    /// Graph REST endpoint.
    pub api_base: String,
    /// Bytes per upload session request.
    pub upload_chunk_size: usize,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            tenant_id: String::new(),
            username: String::new(),
            password: String::new(),
            authority_host: PUBLIC_CLOUD_AUTHORITY.to_string(),
            api_base: GRAPH_API_BASE.to_string(),
            upload_chunk_size: 16 * UPLOAD_CHUNK_GRANULARITY,
        }
    }
}

impl GraphSettings {
    /// Creates settings for the public cloud.
    pub fn new(
        app_id: impl Into<String>,
        tenant_id: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            tenant_id: tenant_id.into(),
            username: username.into(),
            password: password.into(),
            ..Self::default()
        }
    }

    /// Checks credentials and endpoints before any network call.
    pub fn validate(&self) -> Result<()> {
        let credentials = [&self.app_id, &self.tenant_id, &self.username, &self.password];
        if credentials.iter().any(|value| value.trim().is_empty()) {
            return Err(DispatchError::InvalidConfig(
                "invalid application id, tenant id, username or password; check Graph settings"
                    .to_string(),
            ));
        }

        for (name, value) in [
            ("authority host", &self.authority_host),
            ("API base", &self.api_base),
        ] {
            url::Url::parse(value).map_err(|e| {
                DispatchError::InvalidConfig(format!("invalid {} {:?}: {}", name, value, e))
            })?;
        }

        if self.upload_chunk_size == 0 || self.upload_chunk_size % UPLOAD_CHUNK_GRANULARITY != 0 {
            return Err(DispatchError::InvalidConfig(format!(
                "upload chunk size {} must be a positive multiple of {}",
                self.upload_chunk_size, UPLOAD_CHUNK_GRANULARITY
            )));
        }
        Ok(())
    }

    /// Token endpoint for this tenant.
    pub fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host.trim_end_matches('/'),
            self.tenant_id
        )
    }
}

/// Transport selection with its settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportSettings {
    /// Direct SMTP delivery.
    Smtp(SmtpSettings),
    /// Delivery through the Graph mail API.
    Graph(GraphSettings),
}

/// A complete dispatch job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchRequest {
    /// Message to send.
    pub message: MessageSpec,
    /// Attachments in order.
    #[serde(default)]
    pub attachments: Vec<AttachmentDescriptor>,
    /// Transport and its settings.
    pub transport: TransportSettings,
}

impl DispatchRequest {
    /// Parses a job from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| DispatchError::InvalidConfig(format!("invalid dispatch request: {}", e)))
    }

    /// Reads a job file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}
