//! docshunter - resilient headless-browser acquisition engine.
//!
//! Drives a single long-lived browser session against an answer engine and
//! extracts readable content from arbitrary pages, recovering from crashes,
//! timeouts and bot challenges along the way.

pub mod browser;
pub mod config;
pub mod crawl;
pub mod engine;
pub mod error;
pub mod extract;
pub mod recovery;
pub mod search;
pub mod tools;

pub use config::Config;
pub use engine::Engine;
pub use error::{BrowserError, ConfigError, ErrorKind};
pub use extract::{ExtractionOutcome, ExtractionResult, ExtractionStatus};
