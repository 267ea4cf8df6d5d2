//! HEAD pre-flight that rejects URLs serving something other than a page.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tracing::{debug, warn};

use crate::error::BrowserError;

const HEAD_TIMEOUT: Duration = Duration::from_secs(10);

/// True for content types the extractor can read.
pub fn is_supported_content_type(content_type: &str) -> bool {
    let lower = content_type.to_ascii_lowercase();
    lower.contains("text/html") || lower.contains("text/plain") || lower.contains("xhtml")
}

#[derive(Clone)]
pub struct ContentTypeCheck {
    client: Client,
}

impl ContentTypeCheck {
    pub fn new(user_agent: &str) -> Self {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(HEAD_TIMEOUT)
            .gzip(true)
            .brotli(true)
            .build()
            .unwrap_or_else(|e| {
                warn!("Falling back to default HTTP client: {}", e);
                Client::new()
            });
        Self { client }
    }

    /// Fail only when the server names an unsupported content type. Transport
    /// errors and missing headers let extraction go ahead.
    pub async fn check(&self, url: &str) -> Result<(), BrowserError> {
        let response = match self.client.head(url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("HEAD request to {} failed, continuing: {}", url, e);
                return Ok(());
            }
        };

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        match content_type {
            Some(ct) if !is_supported_content_type(&ct) => {
                Err(BrowserError::Extraction(format!("Unsupported content type: {}", ct)))
            }
            Some(ct) => {
                debug!("{} serves {}", url, ct);
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_and_text_are_supported() {
        assert!(is_supported_content_type("text/html; charset=utf-8"));
        assert!(is_supported_content_type("TEXT/PLAIN"));
        assert!(is_supported_content_type("application/xhtml+xml"));
    }

    #[test]
    fn binary_types_are_rejected() {
        assert!(!is_supported_content_type("application/pdf"));
        assert!(!is_supported_content_type("image/png"));
        assert!(!is_supported_content_type("application/json"));
    }

    #[tokio::test]
    async fn transport_errors_are_ignored() {
        let check = ContentTypeCheck::new("test-agent");
        assert!(check.check("http://127.0.0.1:9/nothing").await.is_ok());
    }
}
