//! Page and browser driver abstractions.
//!
//! Orchestration code talks to these traits only. The Chromium implementation
//! lives in `chromium`; tests use the scripted fake in `testing`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::scripts;
use crate::error::BrowserError;

/// Snapshot of the answer containers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AnswerSample {
    pub text: String,
    /// Last container ends in `.`, `?` or `!`.
    #[serde(default)]
    pub terminal: bool,
}

/// Per-page settings applied to every freshly opened page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageSetup {
    pub user_agent: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Injected before any page script runs.
    pub evasion_script: String,
}

#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigate and wait for DOM content to be loaded.
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), BrowserError>;

    async fn reload(&self, timeout: Duration) -> Result<(), BrowserError>;

    /// Evaluate an expression and return its JSON value.
    async fn evaluate(&self, script: &str) -> Result<Value, BrowserError>;

    /// Rendered HTML of the current document.
    async fn content(&self) -> Result<String, BrowserError>;

    async fn url(&self) -> Result<Option<String>, BrowserError>;

    /// Focus the element and type `text` key by key.
    async fn type_text(&self, selector: &str, text: &str) -> Result<(), BrowserError>;

    async fn press_enter(&self, selector: &str) -> Result<(), BrowserError>;

    async fn screenshot(&self, path: &Path) -> Result<(), BrowserError>;

    async fn apply_setup(&self, setup: &PageSetup) -> Result<(), BrowserError>;

    async fn close(&self) -> Result<(), BrowserError>;

    async fn title(&self) -> Result<Option<String>, BrowserError> {
        let value = self.evaluate(scripts::DOCUMENT_TITLE).await?;
        Ok(value.as_str().map(str::to_string))
    }

    /// False once the frame or target has gone away.
    async fn is_attached(&self) -> bool {
        self.evaluate(scripts::PING).await.is_ok()
    }

    async fn is_interactive(&self, selector: &str) -> Result<bool, BrowserError> {
        let value = self.evaluate(&scripts::interactive_check(selector)).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn has_element(&self, selector: &str) -> Result<bool, BrowserError> {
        let value = self.evaluate(&scripts::element_exists(selector)).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn text_of(&self, selector: &str) -> Result<Option<String>, BrowserError> {
        let value = self.evaluate(&scripts::text_of(selector)).await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn value_of(&self, selector: &str) -> Result<Option<String>, BrowserError> {
        let value = self.evaluate(&scripts::value_of(selector)).await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn clear_input(&self, selector: &str) -> Result<(), BrowserError> {
        self.evaluate(&scripts::clear_input(selector)).await?;
        Ok(())
    }

    async fn answer_sample(&self, selector: &str) -> Result<AnswerSample, BrowserError> {
        let value = self.evaluate(&scripts::answer_sample(selector)).await?;
        serde_json::from_value(value)
            .map_err(|e| BrowserError::Driver(format!("Malformed answer sample: {}", e)))
    }
}

#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn new_page(&self) -> Result<Arc<dyn PageDriver>, BrowserError>;

    fn is_connected(&self) -> bool;

    async fn close(&self) -> Result<(), BrowserError>;
}

/// Starts (or connects to) a browser instance.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn BrowserDriver>, BrowserError>;
}
