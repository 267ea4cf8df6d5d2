//! Error types for browser-driven acquisition.
//!
//! Failures are tagged with an [`ErrorKind`] where they happen. Errors that
//! bubble up untyped from the automation layer land in [`BrowserError::Driver`]
//! and are categorized by message text in `recovery::classify`.

use thiserror::Error;

/// Category assigned at the point of failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Timeout,
    Navigation,
    Connection,
    DetachedFrame,
    Captcha,
    InputNotFound,
    Extraction,
    Initialization,
    Other,
}

#[derive(Debug, Clone, Error)]
pub enum BrowserError {
    #[error("{0}")]
    Timeout(String),
    #[error("{0}")]
    Navigation(String),
    #[error("{0}")]
    Connection(String),
    #[error("{0}")]
    DetachedFrame(String),
    #[error("CAPTCHA challenge detected: {0}")]
    Captcha(String),
    #[error("{0}")]
    InputNotFound(String),
    #[error("{0}")]
    Extraction(String),
    #[error("Page not initialized: {0}")]
    Initialization(String),
    /// Untyped error surfaced by the automation layer.
    #[error("{0}")]
    Driver(String),
    #[error("Recovery limit reached after {0} recoveries")]
    RecoveryExhausted(u32),
    #[error("Operation failed after {attempts} retries. Last error: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

impl BrowserError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Navigation(_) => ErrorKind::Navigation,
            Self::Connection(_) => ErrorKind::Connection,
            Self::DetachedFrame(_) => ErrorKind::DetachedFrame,
            Self::Captcha(_) => ErrorKind::Captcha,
            Self::InputNotFound(_) => ErrorKind::InputNotFound,
            Self::Extraction(_) => ErrorKind::Extraction,
            Self::Initialization(_) => ErrorKind::Initialization,
            Self::Driver(_) | Self::RecoveryExhausted(_) | Self::RetriesExhausted { .. } => {
                ErrorKind::Other
            }
        }
    }

    /// Whether the retry loop must stop instead of trying again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::RecoveryExhausted(_) | Self::RetriesExhausted { .. }
        )
    }
}

/// Errors raised while loading configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("Failed to parse {format} config: {message}")]
    Parse {
        format: &'static str,
        message: String,
    },
}
