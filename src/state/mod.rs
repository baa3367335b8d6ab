//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `UrlState`: the per-URL lifecycle (discovered, in flight, visited, failed)
//! - `HostState`: per-host politeness accounting (in-flight count, last start)
//! - `HostPolicy`: the read-only politeness limits derived from configuration

mod host_state;
mod url_state;

// Re-export main types
pub use host_state::{to_chrono, HostPolicy, HostState};
pub use url_state::UrlState;
