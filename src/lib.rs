//! Sumi-Harvest: a paginated social content collector
//!
//! This crate harvests posts, comments and creator profiles from social
//! platforms by combining signed HTTP calls with a browser page that computes
//! anti-bot signatures, and persists everything incrementally to a run-scoped
//! storage sink.

pub mod client;
pub mod config;
pub mod crawler;
pub mod filter;
pub mod model;
pub mod platform;
pub mod storage;

use thiserror::Error;

/// Main error type for Sumi-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("API error: {0}")]
    Api(#[from] client::ApiError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Session is not authenticated; log in through the browser and retry")]
    NotAuthenticated,

    #[error("Invalid collection target: {0}")]
    InvalidTarget(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type alias for Sumi-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Coordinator, CrawlEvent, StopSignal};
pub use model::{Author, CollectionTarget, Comment, CrawlMode, Creator, Item, Platform};
