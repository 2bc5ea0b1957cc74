//! Shared types, error model, and configuration for the gift-refresh pipeline.
//!
//! This crate is the foundation depended on by all other giftrefresh crates.
//! It provides:
//! - [`RefreshError`]: the unified error type
//! - Domain types ([`PeriodKey`], [`PostKind`], [`RunId`])
//! - Configuration ([`AppConfig`], [`Credentials`], [`RunContext`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AffiliateConfig, AppConfig, CONFIG_FILE_NAME, Credentials, GenerationConfig, PromptsConfig,
    RefreshConfig, RunContext, SiteConfig, init_config, load_config, load_config_from,
};
pub use error::{RefreshError, Result};
pub use types::{PeriodKey, PostKind, RunId, classify_post};
