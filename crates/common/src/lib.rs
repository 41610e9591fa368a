//! Conformance Autopilot Common Library
//!
//! Shared types and pure building blocks for running conformance plans:
//! - Plan configuration schema and validated loading
//! - Test state / result classification and execution summaries
//! - `{{var}}` template rendering over JSON values
//! - Variable capture from JSON documents and URLs

pub mod capture;
pub mod config;
pub mod error;
pub mod template;
pub mod types;

// Re-export commonly used types
pub use capture::{capture_from_url, capture_from_value};
pub use config::{
    ActionConfig, ApiAction, BrowserAction, BrowserOperation, ModuleConfig, PlanConfig, WaitUntil,
    CONFIG_SUFFIX,
};
pub use error::{ConfigError, Result};
pub use template::{apply, apply_str, merge_layers};
pub use types::*;

/// Conformance Autopilot version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
