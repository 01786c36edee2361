//! Shared types, error model, configuration, and the domain allow-list for SiteScout.
//!
//! This crate is the foundation depended on by all other SiteScout crates.
//! It provides:
//! - [`SiteScoutError`]: the unified error type
//! - [`AllowList`]: the single authority on which URLs may be crawled
//! - [`SessionId`]: answer-session identifiers
//! - Configuration ([`AppConfig`], [`CrawlConfig`], config loading)

pub mod config;
pub mod domain;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CrawlConfig, CrawlSection, StreamSection, config_dir, config_file_path,
    init_config, load_config, load_config_from,
};
pub use domain::{AllowList, is_allowed, site_root};
pub use error::{Result, SiteScoutError};
pub use types::SessionId;
