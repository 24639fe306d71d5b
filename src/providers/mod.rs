//! Outbound mail transports.
//!
//! - [`email`] - SMTP and Graph API adapters

pub mod email;
