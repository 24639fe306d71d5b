//! Configuration and settings management.
//!
//! This module provides transport settings and the JSON job format read by the
//! command-line entry point.

mod settings;

pub use settings::{
    DispatchRequest, GraphSettings, SecureSocket, SmtpSettings, TransportSettings,
    GRAPH_API_BASE, PUBLIC_CLOUD_AUTHORITY, UPLOAD_CHUNK_GRANULARITY,
};
