//! Single-page content extraction.

pub mod mirror;
pub mod content_type;
pub mod readable;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::browser::driver::PageDriver;
use crate::config::Config;
use crate::crawl::CrawlResult;
use crate::error::BrowserError;

pub use mirror::{mirror_for, RepoMirror};
pub use content_type::ContentTypeCheck;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractionStatus {
    Success,
    SuccessWithPartial,
    SuccessWithFallback,
    Error,
}

/// Content pulled from one page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub byline: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_selector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExtractionResult {
    pub fn failed(url: &str, error: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Has text and no error.
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.text_content.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// What `extract_url_content` hands back: one page, or a crawl.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ExtractionOutcome {
    Page {
        status: ExtractionStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(flatten)]
        result: ExtractionResult,
    },
    Crawl(CrawlResult),
}

impl ExtractionOutcome {
    pub fn page_error(url: &str, error: &BrowserError) -> Self {
        ExtractionOutcome::Page {
            status: ExtractionStatus::Error,
            message: Some(format!(
                "Failed to extract content from {}. Reason: {}",
                url, error
            )),
            result: ExtractionResult::failed(url, error.to_string()),
        }
    }

    pub fn status(&self) -> ExtractionStatus {
        match self {
            ExtractionOutcome::Page { status, .. } => *status,
            ExtractionOutcome::Crawl(crawl) => crawl.status,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// A successful extraction plus the HTML it came from, for link discovery.
#[derive(Debug, Clone)]
pub struct PageExtraction {
    pub status: ExtractionStatus,
    pub result: ExtractionResult,
    pub html: Option<String>,
}

pub struct ContentExtractor {
    config: Arc<Config>,
    head_check: Option<ContentTypeCheck>,
}

impl ContentExtractor {
    pub fn new(config: Arc<Config>) -> Self {
        let head_check = config
            .content_type_check
            .then(|| ContentTypeCheck::new(&config.user_agent));
        Self { config, head_check }
    }

    /// Extract `url` on `page`, reading repository roots through the mirror
    /// and probing the content type of everything else first.
    pub async fn extract_page(
        &self,
        page: &dyn PageDriver,
        url: &str,
    ) -> Result<PageExtraction, BrowserError> {
        if let Some(mirror) = mirror_for(url) {
            let result = mirror::extract_mirror(page, &mirror, &self.config).await?;
            return Ok(PageExtraction {
                status: ExtractionStatus::Success,
                result,
                html: None,
            });
        }

        if let Some(ref head_check) = self.head_check {
            head_check.check(url).await?;
        }

        self.read_page(page, url).await
    }

    /// Navigate and run main-content extraction, without the pre-flight content-type check.
    pub async fn read_page(
        &self,
        page: &dyn PageDriver,
        url: &str,
    ) -> Result<PageExtraction, BrowserError> {
        info!("Navigating to {} for extraction", url);
        page.goto(url, self.config.timeout_profiles.navigation())
            .await?;

        let html = page.content().await?;
        let page_title = page.title().await.ok().flatten();
        let (status, result) = readable::extract_readable(&html, url, page_title)?;

        Ok(PageExtraction {
            status,
            result,
            html: Some(html),
        })
    }

    /// Like [`extract_page`](Self::extract_page) but failures become an
    /// `Error` outcome.
    pub async fn extract(&self, page: &dyn PageDriver, url: &str) -> ExtractionOutcome {
        match self.extract_page(page, url).await {
            Ok(extraction) => ExtractionOutcome::Page {
                status: extraction.status,
                message: None,
                result: extraction.result,
            },
            Err(e) => {
                warn!("Error extracting content from {}: {}", url, e);
                ExtractionOutcome::page_error(url, &e)
            }
        }
    }
}
