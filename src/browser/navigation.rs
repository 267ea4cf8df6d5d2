//! Navigation to the answer engine and readiness checks.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::driver::PageDriver;
use super::scripts::SEARCH_INPUT_SELECTORS;
use super::session::Session;
use crate::config::Config;
use crate::error::BrowserError;
use crate::recovery::classify;

const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(200);

pub const SCREENSHOT_SEARCH_NOT_FOUND: &str = "debug_search_not_found.png";
pub const SCREENSHOT_NAVIGATION_FAILED: &str = "debug_navigation_failed.png";

/// Poll until `selector` matches (and, if `interactive`, can take input).
pub async fn wait_for_element(
    page: &dyn PageDriver,
    selector: &str,
    timeout: Duration,
    interactive: bool,
) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let found = if interactive {
            page.is_interactive(selector).await
        } else {
            page.has_element(selector).await
        };
        match found {
            Ok(true) => return true,
            Ok(false) => {}
            Err(e) => debug!("Lookup of {} failed: {}", selector, e),
        }

        let now = tokio::time::Instant::now();
        if now >= deadline {
            return false;
        }
        tokio::time::sleep(SELECTOR_POLL_INTERVAL.min(deadline - now)).await;
    }
}

/// True when `url`'s host is `domain` or a subdomain of it.
pub fn host_matches(url: &str, domain: &str) -> bool {
    let Ok(parsed) = url::Url::parse(url) else {
        return false;
    };
    match parsed.host_str() {
        Some(host) => host == domain || host.ends_with(&format!(".{}", domain)),
        None => false,
    }
}

/// Best-effort diagnostic screenshot, written only when a directory is configured.
pub async fn capture_debug(page: &dyn PageDriver, config: &Config, name: &str) {
    let Some(ref dir) = config.screenshot_dir else {
        return;
    };
    let path = dir.join(name);
    match page.screenshot(&path).await {
        Ok(()) => info!("Saved diagnostic screenshot to {}", path.display()),
        Err(e) => debug!("Could not capture {}: {}", name, e),
    }
}

pub struct NavigationController {
    session: Arc<Session>,
    config: Arc<Config>,
}

impl NavigationController {
    pub fn new(session: Arc<Session>, config: Arc<Config>) -> Self {
        Self { session, config }
    }

    /// Bring the session's page to the target with the search input ready.
    pub async fn navigate_to_target(&self) -> Result<Arc<dyn PageDriver>, BrowserError> {
        let page = self.session.ensure_ready().await?;
        match self.navigate(page.as_ref()).await {
            Ok(()) => Ok(page),
            Err(e) => {
                warn!("Navigation to {} failed: {}", self.config.target_url, e);
                capture_debug(page.as_ref(), &self.config, SCREENSHOT_NAVIGATION_FAILED).await;
                Err(e)
            }
        }
    }

    async fn navigate(&self, page: &dyn PageDriver) -> Result<(), BrowserError> {
        let url = &self.config.target_url;
        info!("Navigating to {}", url);

        if let Err(e) = page.goto(url, self.config.page_timeout()).await {
            if classify::is_timeout(&e) {
                warn!("Navigation did not settle, checking page anyway: {}", e);
            } else {
                return Err(e);
            }
        }

        match page.text_of("main").await {
            Ok(Some(text)) if text.to_lowercase().contains("internal error") => {
                warn!("Target served an internal error page, checking page anyway");
            }
            Ok(_) => {}
            Err(e) => debug!("Could not read page body: {}", e),
        }

        if !page.is_attached().await {
            return Err(BrowserError::DetachedFrame(
                "Frame detached during navigation".to_string(),
            ));
        }

        let selector = self.find_search_input(page).await?;
        self.session.set_search_selector(selector);

        tokio::time::sleep(self.config.settle_delay()).await;

        let title = page.title().await?.unwrap_or_default();
        let final_url = page.url().await?.unwrap_or_default();
        debug!("Landed on {} ({})", final_url, title);

        if !host_matches(&final_url, &self.config.expected_domain) {
            return Err(BrowserError::Navigation(format!(
                "Navigation redirected to unexpected URL: {}",
                final_url
            )));
        }

        Ok(())
    }

    async fn find_search_input(&self, page: &dyn PageDriver) -> Result<&'static str, BrowserError> {
        for &selector in SEARCH_INPUT_SELECTORS {
            if wait_for_element(page, selector, self.config.input_wait_timeout(), true).await {
                info!("Found search input: {}", selector);
                return Ok(selector);
            }
            debug!("Search input candidate {} not ready", selector);
        }

        capture_debug(page, &self.config, SCREENSHOT_SEARCH_NOT_FOUND).await;
        Err(BrowserError::InputNotFound("Search input not found".to_string()))
    }
}
