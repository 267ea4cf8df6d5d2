//! The single live browser session.
//!
//! `Session` owns the browser and page handles and the control state that goes
//! with them. Other components read it and mutate it through these methods
//! only. The state lock is never held across an await.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use tokio::sync::Notify;
use tracing::{debug, error, info};

use super::driver::{BrowserDriver, BrowserLauncher, PageDriver, PageSetup};
use crate::error::BrowserError;

#[derive(Default)]
struct SessionState {
    browser: Option<Arc<dyn BrowserDriver>>,
    page: Option<Arc<dyn PageDriver>>,
    initializing: bool,
    search_selector: Option<String>,
    operation_count: u64,
    last_search: Option<Instant>,
}

pub struct Session {
    launcher: Arc<dyn BrowserLauncher>,
    setup: PageSetup,
    state: Mutex<SessionState>,
    /// Signalled whenever the initializing flag is cleared.
    init_done: Notify,
}

/// Clears the initializing flag even if initialization is cancelled.
struct InitializingGuard<'a> {
    session: &'a Session,
}

impl Drop for InitializingGuard<'_> {
    fn drop(&mut self) {
        self.session.state().initializing = false;
        self.session.init_done.notify_waiters();
    }
}

impl Session {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, setup: PageSetup) -> Self {
        Self {
            launcher,
            setup,
            state: Mutex::new(SessionState::default()),
            init_done: Notify::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Launch a fresh browser and page, replacing any existing ones.
    ///
    /// A call made while another initialization is in flight returns
    /// immediately without doing anything.
    pub async fn initialize(&self) -> Result<(), BrowserError> {
        let (old_page, old_browser) = {
            let mut state = self.state();
            if state.initializing {
                debug!("Browser initialization already in progress");
                return Ok(());
            }
            state.initializing = true;
            state.search_selector = None;
            (state.page.take(), state.browser.take())
        };
        let _guard = InitializingGuard { session: self };

        close_quietly(old_page, old_browser).await;

        info!("Initializing browser session");
        match self.launch_with_page().await {
            Ok((browser, page)) => {
                let mut state = self.state();
                state.browser = Some(browser);
                state.page = Some(page);
                info!("Browser session initialized");
                Ok(())
            }
            Err(e) => {
                error!("Browser initialization failed: {}", e);
                Err(match e {
                    BrowserError::Initialization(message) => {
                        BrowserError::Initialization(message)
                    }
                    other => BrowserError::Initialization(other.to_string()),
                })
            }
        }
    }

    async fn launch_with_page(
        &self,
    ) -> Result<(Arc<dyn BrowserDriver>, Arc<dyn PageDriver>), BrowserError> {
        let browser = self.launcher.launch().await?;
        match self.prepare_page(&browser).await {
            Ok(page) => Ok((browser, page)),
            Err(e) => {
                if let Err(close_err) = browser.close().await {
                    debug!("Closing half-initialized browser failed: {}", close_err);
                }
                Err(e)
            }
        }
    }

    async fn prepare_page(
        &self,
        browser: &Arc<dyn BrowserDriver>,
    ) -> Result<Arc<dyn PageDriver>, BrowserError> {
        let page = browser.new_page().await?;
        page.apply_setup(&self.setup).await?;
        Ok(page)
    }

    /// Current page, initializing the session first when needed. If another
    /// caller is already initializing, waits for it to finish.
    pub async fn ensure_ready(&self) -> Result<Arc<dyn PageDriver>, BrowserError> {
        if let Some(page) = self.live_page() {
            return Ok(page);
        }
        self.initialize().await?;
        self.wait_for_initialization().await;
        self.live_page().ok_or_else(|| {
            BrowserError::Initialization("browser session is not available".to_string())
        })
    }

    async fn wait_for_initialization(&self) {
        loop {
            let notified = self.init_done.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !self.is_initializing() {
                return;
            }
            debug!("Waiting for in-flight browser initialization");
            notified.await;
        }
    }

    fn live_page(&self) -> Option<Arc<dyn PageDriver>> {
        let state = self.state();
        match (&state.browser, &state.page) {
            (Some(browser), Some(page)) if browser.is_connected() => Some(page.clone()),
            _ => None,
        }
    }

    pub fn page(&self) -> Option<Arc<dyn PageDriver>> {
        self.state().page.clone()
    }

    pub fn browser(&self) -> Option<Arc<dyn BrowserDriver>> {
        self.state().browser.clone()
    }

    pub fn is_initializing(&self) -> bool {
        self.state().initializing
    }

    /// Close the current page and open a new one on the same browser.
    pub async fn replace_page(&self) -> Result<Arc<dyn PageDriver>, BrowserError> {
        let (old_page, browser) = {
            let mut state = self.state();
            state.search_selector = None;
            (state.page.take(), state.browser.clone())
        };

        if let Some(page) = old_page {
            if let Err(e) = page.close().await {
                debug!("Ignoring error closing page: {}", e);
            }
        }

        let browser = match browser {
            Some(browser) if browser.is_connected() => browser,
            _ => return Err(BrowserError::Connection("Browser disconnected".to_string())),
        };

        let page = self.prepare_page(&browser).await?;
        self.state().page = Some(page.clone());
        Ok(page)
    }

    /// Open an extra page on the current browser. The caller owns and closes it.
    pub async fn open_page(&self) -> Result<Arc<dyn PageDriver>, BrowserError> {
        let browser = match self.browser() {
            Some(browser) if browser.is_connected() => browser,
            _ => return Err(BrowserError::Connection("Browser disconnected".to_string())),
        };
        self.prepare_page(&browser).await
    }

    /// Close page and browser, ignoring errors, and reset all control flags.
    pub async fn teardown(&self) {
        let (page, browser) = {
            let mut state = self.state();
            state.initializing = false;
            state.search_selector = None;
            (state.page.take(), state.browser.take())
        };
        self.init_done.notify_waiters();
        close_quietly(page, browser).await;
    }

    pub fn search_selector(&self) -> Option<String> {
        self.state().search_selector.clone()
    }

    pub fn set_search_selector(&self, selector: &str) {
        self.state().search_selector = Some(selector.to_string());
    }

    /// Bump and return the operation counter.
    pub fn next_operation(&self) -> u64 {
        let mut state = self.state();
        state.operation_count += 1;
        state.operation_count
    }

    pub fn operation_count(&self) -> u64 {
        self.state().operation_count
    }

    pub fn last_search(&self) -> Option<Instant> {
        self.state().last_search
    }

    pub fn mark_search(&self) {
        self.state().last_search = Some(Instant::now());
    }
}

async fn close_quietly(page: Option<Arc<dyn PageDriver>>, browser: Option<Arc<dyn BrowserDriver>>) {
    if let Some(page) = page {
        if let Err(e) = page.close().await {
            debug!("Ignoring error closing page: {}", e);
        }
    }
    if let Some(browser) = browser {
        if let Err(e) = browser.close().await {
            debug!("Ignoring error closing browser: {}", e);
        }
    }
}
