//! Browser automation for JavaScript-heavy advisor directories.
//!
//! Provides a chromiumoxide-backed browser with per-domain pacing and a
//! randomized fingerprint, exposed to the scraping controller through the
//! [`BrowserActions`] and [`SessionFactory`] traits.

pub mod actions;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod session;

pub use actions::{extract_domain, BrowserActions, PageContent, SessionFactory};
pub use engine::BrowserEngine;
pub use error::{BrowserError, Result};
pub use fingerprint::FingerprintConfig;
pub use session::BrowserSession;
