//! Escalating recovery for a broken browser session.
//!
//! Level 1 reloads the page, level 2 swaps in a new page, level 3 tears the
//! whole browser down and starts over.

use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use super::classify::classify;
use crate::browser::session::Session;
use crate::config::Config;
use crate::error::BrowserError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RecoveryLevel {
    Refresh = 1,
    NewPage = 2,
    FullRestart = 3,
}

impl fmt::Display for RecoveryLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as u8)
    }
}

/// Session health as seen at the moment recovery starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryContext {
    pub has_valid_page: bool,
    pub has_browser: bool,
    pub is_browser_connected: bool,
    pub operation_count: u64,
}

/// Pick the recovery level for an error in the given session state.
pub fn decide(error: Option<&BrowserError>, context: &RecoveryContext) -> RecoveryLevel {
    let Some(error) = error else {
        return RecoveryLevel::Refresh;
    };
    let class = classify(error, 0, 0);

    if class.is_detached_frame || !context.has_browser || !context.is_browser_connected {
        RecoveryLevel::FullRestart
    } else if !context.has_valid_page || class.is_navigation || class.is_timeout {
        RecoveryLevel::NewPage
    } else {
        RecoveryLevel::Refresh
    }
}

/// Caps how many recoveries one logical operation may trigger.
#[derive(Debug, Clone)]
pub struct RecoveryBudget {
    used: u32,
    limit: u32,
}

impl RecoveryBudget {
    pub fn new(limit: u32) -> Self {
        Self { used: 0, limit }
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    fn spend(&mut self) -> Result<(), BrowserError> {
        if self.used >= self.limit {
            return Err(BrowserError::RecoveryExhausted(self.used));
        }
        self.used += 1;
        Ok(())
    }
}

pub struct RecoveryCoordinator {
    session: Arc<Session>,
    config: Arc<Config>,
}

impl RecoveryCoordinator {
    pub fn new(session: Arc<Session>, config: Arc<Config>) -> Self {
        Self { session, config }
    }

    pub async fn snapshot(&self) -> RecoveryContext {
        let browser = self.session.browser();
        let has_valid_page = match self.session.page() {
            Some(page) => page.is_attached().await,
            None => false,
        };
        RecoveryContext {
            has_valid_page,
            has_browser: browser.is_some(),
            is_browser_connected: browser.map(|b| b.is_connected()).unwrap_or(false),
            operation_count: self.session.operation_count(),
        }
    }

    /// Decide on a level for `error` and run it, falling back to a full
    /// restart if a lower level fails.
    pub async fn recover(
        &self,
        error: Option<&BrowserError>,
        budget: &mut RecoveryBudget,
    ) -> Result<RecoveryLevel, BrowserError> {
        budget.spend()?;
        let context = self.snapshot().await;
        let operation = self.session.next_operation();
        let level = decide(error, &context);
        info!(
            "Starting recovery procedure at level {} (operation {})",
            level, operation
        );

        match self.execute(level).await {
            Ok(()) => Ok(level),
            Err(e) if level < RecoveryLevel::FullRestart => {
                warn!(
                    "Level {} recovery failed: {}. Attempting higher level recovery",
                    level, e
                );
                budget.spend()?;
                self.execute(RecoveryLevel::FullRestart).await?;
                Ok(RecoveryLevel::FullRestart)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn execute(&self, level: RecoveryLevel) -> Result<(), BrowserError> {
        match level {
            RecoveryLevel::Refresh => {
                self.refresh().await;
                Ok(())
            }
            RecoveryLevel::NewPage => self.new_page().await,
            RecoveryLevel::FullRestart => self.full_restart().await,
        }
    }

    async fn refresh(&self) {
        info!("Recovery level 1: refreshing page");
        let Some(page) = self.session.page() else {
            warn!("No page to refresh");
            return;
        };
        if let Err(e) = page
            .reload(self.config.timeout_profiles.recovery())
            .await
        {
            warn!("Page refresh failed: {}", e);
        }
    }

    async fn new_page(&self) -> Result<(), BrowserError> {
        info!("Recovery level 2: creating new page");
        match self.session.replace_page().await {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!("Could not open a new page ({}), escalating to full restart", e);
                self.full_restart().await
            }
        }
    }

    async fn full_restart(&self) -> Result<(), BrowserError> {
        info!("Recovery level 3: restarting browser");
        self.session.teardown().await;
        tokio::time::sleep(self.config.recovery_wait()).await;
        self.session.initialize().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::testing::FakeSite;
    use std::time::Duration;

    fn healthy() -> RecoveryContext {
        RecoveryContext {
            has_valid_page: true,
            has_browser: true,
            is_browser_connected: true,
            operation_count: 0,
        }
    }

    fn fast_config() -> Arc<Config> {
        Arc::new(Config {
            recovery_wait_time: 0,
            ..Default::default()
        })
    }

    #[test]
    fn no_error_means_refresh() {
        let broken = RecoveryContext {
            has_valid_page: false,
            has_browser: false,
            is_browser_connected: false,
            operation_count: 9,
        };
        assert_eq!(decide(None, &healthy()), RecoveryLevel::Refresh);
        assert_eq!(decide(None, &broken), RecoveryLevel::Refresh);
    }

    #[test]
    fn detached_means_full_restart() {
        let err = BrowserError::Driver("Navigating frame was detached".into());
        assert_eq!(decide(Some(&err), &healthy()), RecoveryLevel::FullRestart);
    }

    #[test]
    fn missing_or_disconnected_browser_means_full_restart() {
        let err = BrowserError::Driver("boom".into());
        let no_browser = RecoveryContext {
            has_browser: false,
            ..healthy()
        };
        let disconnected = RecoveryContext {
            is_browser_connected: false,
            ..healthy()
        };
        assert_eq!(decide(Some(&err), &no_browser), RecoveryLevel::FullRestart);
        assert_eq!(decide(Some(&err), &disconnected), RecoveryLevel::FullRestart);
    }

    #[test]
    fn invalid_page_or_timeout_means_new_page() {
        let generic = BrowserError::Driver("boom".into());
        let no_page = RecoveryContext {
            has_valid_page: false,
            ..healthy()
        };
        assert_eq!(decide(Some(&generic), &no_page), RecoveryLevel::NewPage);

        let timeout = BrowserError::Timeout("Waiting for selector timed out".into());
        assert_eq!(decide(Some(&timeout), &healthy()), RecoveryLevel::NewPage);

        let nav = BrowserError::Navigation("Navigation redirected".into());
        assert_eq!(decide(Some(&nav), &healthy()), RecoveryLevel::NewPage);
    }

    #[test]
    fn generic_error_on_healthy_session_means_refresh() {
        let err = BrowserError::Driver("boom".into());
        assert_eq!(decide(Some(&err), &healthy()), RecoveryLevel::Refresh);
    }

    #[test]
    fn budget_stops_at_limit() {
        let mut budget = RecoveryBudget::new(2);
        assert!(budget.spend().is_ok());
        assert!(budget.spend().is_ok());
        assert!(matches!(budget.spend(), Err(BrowserError::RecoveryExhausted(2))));
        assert_eq!(budget.used(), 2);
    }

    #[tokio::test]
    async fn refresh_failures_are_swallowed() {
        let site = FakeSite::new();
        site.fail_reloads();
        let session = site.session();
        session.ensure_ready().await.unwrap();
        let coordinator = RecoveryCoordinator::new(session, fast_config());

        let mut budget = RecoveryBudget::new(5);
        let level = coordinator
            .recover(Some(&BrowserError::Driver("boom".into())), &mut budget)
            .await
            .unwrap();

        assert_eq!(level, RecoveryLevel::Refresh);
        assert_eq!(site.reload_count(), 1);
        assert_eq!(site.launch_count(), 1);
    }

    #[tokio::test]
    async fn refresh_is_bounded_by_recovery_profile() {
        let site = FakeSite::new();
        let session = site.session();
        session.ensure_ready().await.unwrap();
        let config = Arc::new(Config {
            recovery_wait_time: 0,
            timeout_profiles: crate::config::TimeoutProfiles {
                navigation: 45_000,
                recovery: 1_234,
                ..Default::default()
            },
            ..Default::default()
        });
        let coordinator = RecoveryCoordinator::new(session, config);

        coordinator.execute(RecoveryLevel::Refresh).await.unwrap();

        assert_eq!(site.reload_timeouts(), vec![Duration::from_millis(1_234)]);
    }

    #[tokio::test]
    async fn new_page_keeps_browser() {
        let site = FakeSite::new();
        let session = site.session();
        let first = session.ensure_ready().await.unwrap();
        let coordinator = RecoveryCoordinator::new(session.clone(), fast_config());

        let mut budget = RecoveryBudget::new(5);
        let level = coordinator
            .recover(Some(&BrowserError::Timeout("timed out".into())), &mut budget)
            .await
            .unwrap();

        assert_eq!(level, RecoveryLevel::NewPage);
        assert_eq!(site.launch_count(), 1);
        assert_eq!(site.pages_opened(), 2);
        assert!(!Arc::ptr_eq(&first, &session.page().unwrap()));
    }

    #[tokio::test]
    async fn new_page_escalates_when_page_creation_fails() {
        let site = FakeSite::new();
        let session = site.session();
        session.ensure_ready().await.unwrap();
        site.fail_next_page_opens(1);
        let coordinator = RecoveryCoordinator::new(session.clone(), fast_config());

        coordinator.execute(RecoveryLevel::NewPage).await.unwrap();

        assert_eq!(site.launch_count(), 2);
        assert!(session.page().is_some());
    }

    #[tokio::test]
    async fn detached_error_restarts_browser() {
        let site = FakeSite::new();
        let session = site.session();
        session.ensure_ready().await.unwrap();
        let coordinator = RecoveryCoordinator::new(session.clone(), fast_config());

        let mut budget = RecoveryBudget::new(5);
        let err = BrowserError::Driver("frame got detached".into());
        let level = coordinator.recover(Some(&err), &mut budget).await.unwrap();

        assert_eq!(level, RecoveryLevel::FullRestart);
        assert_eq!(site.launch_count(), 2);
        assert_eq!(site.browsers_closed(), 1);
        assert!(!session.is_initializing());
        assert_eq!(session.operation_count(), 1);
    }

    #[tokio::test]
    async fn failed_full_restart_propagates() {
        let site = FakeSite::new();
        let session = site.session();
        session.ensure_ready().await.unwrap();
        site.fail_next_launches(1);
        let coordinator = RecoveryCoordinator::new(session.clone(), fast_config());

        let mut budget = RecoveryBudget::new(5);
        let err = BrowserError::DetachedFrame("gone".into());
        let result = coordinator.recover(Some(&err), &mut budget).await;

        assert!(matches!(result, Err(BrowserError::Initialization(_))));
        assert!(session.browser().is_none());
    }

    #[tokio::test]
    async fn exhausted_budget_refuses_to_recover() {
        let site = FakeSite::new();
        let session = site.session();
        let coordinator = RecoveryCoordinator::new(session, fast_config());

        let mut budget = RecoveryBudget::new(0);
        let result = coordinator.recover(None, &mut budget).await;
        assert!(matches!(result, Err(BrowserError::RecoveryExhausted(0))));
        assert_eq!(site.launch_count(), 0);
    }
}
