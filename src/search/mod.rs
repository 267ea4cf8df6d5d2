//! Submitting a query to the answer engine and collecting the answer.

pub mod stability;

use std::sync::Arc;

use tracing::{debug, info};

use crate::browser::navigation::{wait_for_element, NavigationController};
use crate::browser::scripts::ANSWER_SELECTOR;
use crate::browser::session::Session;
use crate::config::Config;
use crate::error::BrowserError;

pub use stability::{wait_for_complete_answer, Decision, StabilityConfig, StabilityTracker};

/// One search attempt: cooldown, navigate, submit, wait for the answer.
pub struct SearchFlow {
    session: Arc<Session>,
    navigator: Arc<NavigationController>,
    config: Arc<Config>,
    stability: StabilityConfig,
}

impl SearchFlow {
    pub fn new(
        session: Arc<Session>,
        navigator: Arc<NavigationController>,
        config: Arc<Config>,
    ) -> Self {
        let stability = StabilityConfig::from_config(&config);
        Self {
            session,
            navigator,
            config,
            stability,
        }
    }

    pub fn with_stability(mut self, stability: StabilityConfig) -> Self {
        self.stability = stability;
        self
    }

    async fn wait_for_cooldown(&self) {
        let Some(last) = self.session.last_search() else {
            return;
        };
        let cooldown = self.config.search_cooldown();
        let elapsed = last.elapsed();
        if elapsed < cooldown {
            let remaining = cooldown - elapsed;
            debug!("Search cooldown, waiting {:?}", remaining);
            tokio::time::sleep(remaining).await;
        }
    }

    pub async fn run(&self, query: &str) -> Result<String, BrowserError> {
        self.wait_for_cooldown().await;

        let page = self.navigator.navigate_to_target().await?;
        let selector = self
            .session
            .search_selector()
            .ok_or_else(|| BrowserError::InputNotFound("Search input not found".to_string()))?;

        info!("Submitting query ({} chars)", query.len());
        page.clear_input(&selector).await?;
        page.type_text(&selector, query).await?;
        page.press_enter(&selector).await?;
        self.session.mark_search();

        let answer_timeout = self
            .config
            .timeout_profiles
            .selector()
            .min(self.config.selector_timeout());
        if !wait_for_element(page.as_ref(), ANSWER_SELECTOR, answer_timeout, false).await {
            return Err(BrowserError::Timeout(format!(
                "Waiting for selector `{}` timed out after {}ms",
                ANSWER_SELECTOR,
                answer_timeout.as_millis()
            )));
        }

        Ok(wait_for_complete_answer(page.as_ref(), &self.stability).await)
    }
}
