//! URL handling module for Ripple-Crawl
//!
//! This module provides the URL helpers the orchestrator and the spiders
//! share: dedup-key normalization, domain extraction and resolution of
//! discovered links against the page they were found on.

mod domain;
mod normalize;
mod resolve;

// Re-export main functions
pub use domain::{domain_of, extract_domain};
pub use normalize::normalize_url;
pub use resolve::resolve_url;
