//! Configuration module for newsraker
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Invalid seed URLs or policy values are fatal at startup, before any fetch.

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, CrawlerConfig, ExtractionConfig, StorageConfig, UserAgentConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
