//! The acquisition engine: search and URL extraction over one shared session.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::browser::chromium::ChromiumLauncher;
use crate::browser::driver::{BrowserLauncher, PageSetup};
use crate::browser::idle::IdleSupervisor;
use crate::browser::navigation::NavigationController;
use crate::browser::session::Session;
use crate::browser::stealth::evasion_script;
use crate::config::Config;
use crate::crawl::{clamp_depth, summarize_failure, RecursiveCrawler};
use crate::error::BrowserError;
use crate::extract::{ContentExtractor, ExtractionOutcome, ExtractionStatus};
use crate::recovery::{RecoveryBudget, RecoveryCoordinator, RetryExecutor, RetryPolicy};
use crate::search::SearchFlow;
use crate::tools::SearchEngine;

pub struct Engine {
    config: Arc<Config>,
    session: Arc<Session>,
    coordinator: Arc<RecoveryCoordinator>,
    retry: RetryExecutor,
    search: SearchFlow,
    crawler: RecursiveCrawler,
    idle: IdleSupervisor,
}

impl Engine {
    /// Engine backed by a real Chrome, launched lazily on first use.
    pub fn new(config: Config) -> Self {
        let launcher = Arc::new(ChromiumLauncher::new(
            config.browser.clone(),
            config.user_agent.clone(),
        ));
        Self::with_launcher(config, launcher)
    }

    pub fn with_launcher(config: Config, launcher: Arc<dyn BrowserLauncher>) -> Self {
        Self::with_policy(config, launcher, RetryPolicy::default())
    }

    pub fn with_policy(
        config: Config,
        launcher: Arc<dyn BrowserLauncher>,
        policy: RetryPolicy,
    ) -> Self {
        let config = Arc::new(config);
        let setup = PageSetup {
            user_agent: config.user_agent.clone(),
            viewport_width: config.browser.viewport_width,
            viewport_height: config.browser.viewport_height,
            evasion_script: evasion_script(),
        };
        let session = Arc::new(Session::new(launcher, setup));
        let navigator = Arc::new(NavigationController::new(session.clone(), config.clone()));
        let coordinator = Arc::new(RecoveryCoordinator::new(session.clone(), config.clone()));
        let retry = RetryExecutor::new(
            session.clone(),
            navigator.clone(),
            coordinator.clone(),
            policy,
            config.max_recoveries,
        );
        let search = SearchFlow::new(session.clone(), navigator, config.clone());
        let extractor = Arc::new(ContentExtractor::new(config.clone()));
        let crawler = RecursiveCrawler::new(session.clone(), extractor, config.clone());
        let idle = IdleSupervisor::new(config.idle_timeout());

        Self {
            config,
            session,
            coordinator,
            retry,
            search,
            crawler,
            idle,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Ask the answer engine and wait for a complete answer.
    pub async fn perform_search(&self, query: &str) -> Result<String, BrowserError> {
        let deadline = self.config.operation_deadline();
        let attempts = self
            .retry
            .retry(|| self.search.run(query), self.config.max_retries);

        match tokio::time::timeout(deadline, attempts).await {
            Ok(Ok(answer)) => {
                self.idle.reset(&self.session);
                Ok(answer)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                let error = BrowserError::Timeout(format!(
                    "Search timed out after {}ms",
                    deadline.as_millis()
                ));
                warn!("{}, recovering session", error);
                let mut budget = RecoveryBudget::new(1);
                if let Err(e) = self.coordinator.recover(Some(&error), &mut budget).await {
                    warn!("Recovery after search timeout failed: {}", e);
                }
                Err(error)
            }
        }
    }

    /// Extract `url`, following same-domain links when `depth` is above 1.
    pub async fn extract_url_content(&self, url: &str, depth: Option<u32>) -> ExtractionOutcome {
        let depth = clamp_depth(depth);
        info!("Extracting {} (depth {})", url, depth);

        if let Err(e) = self
            .retry
            .retry(|| self.session.ensure_ready(), self.config.max_retries)
            .await
        {
            warn!("No usable browser session for {}: {}", url, e);
            return if depth == 1 {
                ExtractionOutcome::page_error(url, &e)
            } else {
                ExtractionOutcome::Crawl(summarize_failure(url, depth, Vec::new(), &e.to_string()))
            };
        }

        let outcome = self.crawler.crawl(url, depth).await;
        if outcome.status() != ExtractionStatus::Error {
            self.idle.reset(&self.session);
        }
        outcome
    }

    /// Close the browser and stop the idle timer.
    pub async fn shutdown(&self) {
        info!("Shutting down browser session");
        self.idle.cancel();
        self.session.teardown().await;
    }
}

#[async_trait]
impl SearchEngine for Engine {
    async fn perform_search(&self, query: &str) -> Result<String, BrowserError> {
        Engine::perform_search(self, query).await
    }

    async fn extract_url_content(&self, url: &str, depth: Option<u32>) -> ExtractionOutcome {
        Engine::extract_url_content(self, url, depth).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::driver::AnswerSample;
    use crate::browser::scripts::ANSWER_SELECTOR;
    use crate::browser::testing::FakeSite;
    use crate::config::TimeoutProfiles;
    use crate::extract::mirror::MIRROR_RESULT_SELECTOR;
    use std::time::Duration;

    const TARGET: &str = "https://www.perplexity.ai/";

    fn fast_config() -> Config {
        Config {
            input_wait_timeout: 1,
            settle_delay: 0,
            search_cooldown: 0,
            recovery_wait_time: 0,
            max_retries: 3,
            content_type_check: false,
            answer_wait_timeout: 10_000,
            ..Default::default()
        }
    }

    fn engine(site: &Arc<FakeSite>, config: Config) -> Engine {
        Engine::with_policy(config, site.launcher(), RetryPolicy::immediate())
    }

    fn answering_site(answer: &str) -> Arc<FakeSite> {
        let site = FakeSite::new();
        site.add_page(TARGET, "Perplexity", "<html></html>");
        site.set_interactive("textarea");
        site.set_element(ANSWER_SELECTOR);
        site.push_answers([AnswerSample {
            text: answer.to_string(),
            terminal: true,
        }]);
        site
    }

    #[tokio::test]
    async fn search_returns_stable_answer() {
        let answer = "Tokio is an asynchronous runtime for Rust. ".repeat(5);
        let site = answering_site(&answer);
        let engine = engine(&site, fast_config());

        let result = engine.perform_search("What is tokio?").await.unwrap();

        assert_eq!(result, answer);
        assert_eq!(site.launch_count(), 1);
        engine.shutdown().await;
        assert_eq!(site.browsers_closed(), 1);
    }

    #[tokio::test]
    async fn search_survives_a_crashed_page() {
        let answer = "Recovered answer after the page crashed, with enough text to settle. ".repeat(3);
        let site = answering_site(&answer);
        site.fail_next_goto(BrowserError::Driver("Protocol error: Target closed".into()));
        let engine = engine(&site, fast_config());

        let result = engine.perform_search("anything").await.unwrap();

        assert_eq!(result, answer);
        // the detached/protocol error forced a full restart
        assert_eq!(site.launch_count(), 2);
    }

    #[tokio::test]
    async fn search_reports_exhausted_retries() {
        let site = FakeSite::new();
        site.add_page(TARGET, "Perplexity", "<html></html>");
        site.set_interactive("textarea");
        let config = Config {
            timeout_profiles: TimeoutProfiles {
                selector: 5,
                ..Default::default()
            },
            ..fast_config()
        };
        let engine = engine(&site, config);

        let err = engine.perform_search("anything").await.unwrap_err();

        assert!(matches!(err, BrowserError::RetriesExhausted { attempts: 3, .. }));
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn operation_deadline_bounds_search() {
        let site = FakeSite::new();
        site.add_page(TARGET, "Perplexity", "<html></html>");
        site.set_interactive("textarea");
        let config = Config {
            page_timeout: 1_100,
            mcp_timeout_buffer: 1_000,
            timeout_profiles: TimeoutProfiles {
                selector: 10_000,
                ..Default::default()
            },
            ..fast_config()
        };
        let engine = engine(&site, config);

        let err = engine.perform_search("anything").await.unwrap_err();

        assert_eq!(err.to_string(), "Search timed out after 100ms");
    }

    #[tokio::test]
    async fn idle_timeout_closes_browser_after_success() {
        let site = answering_site(&"Idle answer text that is long enough to count. ".repeat(4));
        let engine = engine(
            &site,
            Config {
                idle_timeout: 30,
                ..fast_config()
            },
        );

        engine.perform_search("q").await.unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;

        assert!(engine.session().browser().is_none());
        assert_eq!(site.browsers_closed(), 1);
    }

    #[tokio::test]
    async fn repository_extraction_uses_mirror() {
        let site = FakeSite::new();
        site.add_page("https://gitingest.com/owner/repo", "Gitingest", "<html></html>");
        site.set_element(MIRROR_RESULT_SELECTOR);
        site.set_value(MIRROR_RESULT_SELECTOR, "Summary of owner/repo");
        let engine = engine(&site, fast_config());

        let outcome = engine
            .extract_url_content("https://github.com/owner/repo", Some(1))
            .await;

        assert_eq!(outcome.status(), ExtractionStatus::Success);
        assert_eq!(site.visits(), vec!["https://gitingest.com/owner/repo".to_string()]);
        let json: serde_json::Value = serde_json::from_str(&outcome.to_json().unwrap()).unwrap();
        assert_eq!(json["title"], "owner/repo");
        assert_eq!(json["textContent"], "Summary of owner/repo");
    }

    #[tokio::test]
    async fn launch_failure_becomes_error_outcome() {
        let site = FakeSite::new();
        site.fail_next_launches(100);
        let engine = engine(&site, fast_config());

        let outcome = engine.extract_url_content("https://example.com/", Some(3)).await;

        let json: serde_json::Value = serde_json::from_str(&outcome.to_json().unwrap()).unwrap();
        assert_eq!(json["status"], "Error");
        assert_eq!(json["explorationDepth"], 3);
        assert_eq!(json["pagesExplored"], 0);
        assert!(json["message"]
            .as_str()
            .unwrap()
            .starts_with("Recursive fetch failed:"));
    }
}
