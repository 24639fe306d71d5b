//! mail-dispatch - Outbound email delivery for workflow steps
//!
//! This crate resolves attachments from file patterns or inline content,
//! assembles a transport-agnostic envelope and delivers it over SMTP or the
//! Microsoft Graph mail API, reporting a uniform [`SendResult`].
//!
//! [`SendResult`]: domain::SendResult

pub mod config;
pub mod domain;
pub mod error;
pub mod providers;
pub mod services;

pub use error::{DispatchError, Result};
pub use services::DispatchService;
