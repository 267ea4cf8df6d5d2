//! Scripted in-memory browser for orchestration tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::driver::{AnswerSample, BrowserDriver, BrowserLauncher, PageDriver, PageSetup};
use super::session::Session;
use super::stealth::evasion_script;
use crate::error::BrowserError;

#[derive(Clone)]
struct FakeDocument {
    title: String,
    html: String,
}

/// Shared state behind every fake browser and page created from it.
#[derive(Default)]
pub struct FakeSite {
    documents: Mutex<HashMap<String, FakeDocument>>,
    goto_failures: Mutex<VecDeque<BrowserError>>,
    goto_delays: Mutex<HashMap<String, Duration>>,
    visits: Mutex<Vec<String>>,
    interactive: Mutex<HashSet<String>>,
    elements: Mutex<HashSet<String>>,
    texts: Mutex<HashMap<String, String>>,
    values: Mutex<HashMap<String, String>>,
    answers: Mutex<VecDeque<AnswerSample>>,
    typed: Mutex<Vec<String>>,
    redirect: Mutex<Option<String>>,
    detached: AtomicBool,
    fail_launches: AtomicUsize,
    fail_page_opens: AtomicUsize,
    fail_reloads: AtomicBool,
    reload_timeouts: Mutex<Vec<Duration>>,
    launch_delay: Mutex<Option<Duration>>,
    launches: AtomicUsize,
    setups: AtomicUsize,
    reloads: AtomicUsize,
    pages_opened: AtomicUsize,
    pages_closed: AtomicUsize,
    browsers_closed: AtomicUsize,
    answer_reads: AtomicUsize,
    browsers: Mutex<Vec<Arc<FakeBrowser>>>,
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl FakeSite {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn launcher(self: &Arc<Self>) -> Arc<dyn BrowserLauncher> {
        Arc::new(FakeLauncher { site: self.clone() })
    }

    pub fn session(self: &Arc<Self>) -> Arc<Session> {
        Arc::new(Session::new(self.launcher(), test_setup()))
    }

    pub fn add_page(&self, url: &str, title: &str, html: &str) {
        lock(&self.documents).insert(
            url.to_string(),
            FakeDocument {
                title: title.to_string(),
                html: html.to_string(),
            },
        );
    }

    pub fn fail_next_goto(&self, error: BrowserError) {
        lock(&self.goto_failures).push_back(error);
    }

    pub fn delay_goto(&self, url: &str, delay: Duration) {
        lock(&self.goto_delays).insert(url.to_string(), delay);
    }

    pub fn set_interactive(&self, selector: &str) {
        lock(&self.interactive).insert(selector.to_string());
        lock(&self.elements).insert(selector.to_string());
    }

    pub fn set_element(&self, selector: &str) {
        lock(&self.elements).insert(selector.to_string());
    }

    pub fn set_text(&self, selector: &str, text: &str) {
        lock(&self.texts).insert(selector.to_string(), text.to_string());
    }

    pub fn set_value(&self, selector: &str, value: &str) {
        lock(&self.values).insert(selector.to_string(), value.to_string());
    }

    /// Queue answer samples. The last one repeats once the queue runs dry.
    pub fn push_answers<I: IntoIterator<Item = AnswerSample>>(&self, samples: I) {
        lock(&self.answers).extend(samples);
    }

    pub fn redirect_to(&self, url: &str) {
        *lock(&self.redirect) = Some(url.to_string());
    }

    pub fn set_detached(&self, detached: bool) {
        self.detached.store(detached, Ordering::SeqCst);
    }

    pub fn fail_next_launches(&self, count: usize) {
        self.fail_launches.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_page_opens(&self, count: usize) {
        self.fail_page_opens.store(count, Ordering::SeqCst);
    }

    /// Make every launch take `delay` before the browser is available.
    pub fn delay_launch(&self, delay: Duration) {
        *lock(&self.launch_delay) = Some(delay);
    }

    pub fn fail_reloads(&self) {
        self.fail_reloads.store(true, Ordering::SeqCst);
    }

    pub fn disconnect_browsers(&self) {
        for browser in lock(&self.browsers).iter() {
            browser.connected.store(false, Ordering::SeqCst);
        }
    }

    pub fn visits(&self) -> Vec<String> {
        lock(&self.visits).clone()
    }

    pub fn typed(&self) -> Vec<String> {
        lock(&self.typed).clone()
    }

    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn setups_applied(&self) -> usize {
        self.setups.load(Ordering::SeqCst)
    }

    pub fn reload_count(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }

    /// Timeouts passed to each reload, in order.
    pub fn reload_timeouts(&self) -> Vec<Duration> {
        lock(&self.reload_timeouts).clone()
    }

    pub fn pages_opened(&self) -> usize {
        self.pages_opened.load(Ordering::SeqCst)
    }

    pub fn pages_closed(&self) -> usize {
        self.pages_closed.load(Ordering::SeqCst)
    }

    pub fn browsers_closed(&self) -> usize {
        self.browsers_closed.load(Ordering::SeqCst)
    }

    pub fn answer_reads(&self) -> usize {
        self.answer_reads.load(Ordering::SeqCst)
    }

    fn take_one(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

pub fn test_setup() -> PageSetup {
    PageSetup {
        user_agent: "test-agent".to_string(),
        viewport_width: 1280,
        viewport_height: 720,
        evasion_script: evasion_script(),
    }
}

struct FakeLauncher {
    site: Arc<FakeSite>,
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self) -> Result<Arc<dyn BrowserDriver>, BrowserError> {
        if FakeSite::take_one(&self.site.fail_launches) {
            return Err(BrowserError::Initialization("Failed to launch browser".into()));
        }
        let delay = *lock(&self.site.launch_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.site.launches.fetch_add(1, Ordering::SeqCst);
        let browser = Arc::new(FakeBrowser {
            site: self.site.clone(),
            connected: AtomicBool::new(true),
        });
        lock(&self.site.browsers).push(browser.clone());
        Ok(browser)
    }
}

pub struct FakeBrowser {
    site: Arc<FakeSite>,
    connected: AtomicBool,
}

#[async_trait]
impl BrowserDriver for FakeBrowser {
    async fn new_page(&self) -> Result<Arc<dyn PageDriver>, BrowserError> {
        if !self.is_connected() {
            return Err(BrowserError::Connection("Browser disconnected".into()));
        }
        if FakeSite::take_one(&self.site.fail_page_opens) {
            return Err(BrowserError::Driver("Target closed while opening page".into()));
        }
        self.site.pages_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakePage {
            site: self.site.clone(),
            current: Mutex::new(None),
            closed: AtomicBool::new(false),
        }))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), BrowserError> {
        self.connected.store(false, Ordering::SeqCst);
        self.site.browsers_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakePage {
    site: Arc<FakeSite>,
    current: Mutex<Option<String>>,
    closed: AtomicBool,
}

impl FakePage {
    fn document(&self) -> Option<FakeDocument> {
        let current = lock(&self.current).clone()?;
        lock(&self.site.documents).get(&current).cloned()
    }

    fn check_open(&self) -> Result<(), BrowserError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrowserError::Driver("Target closed".into()));
        }
        if self.site.detached.load(Ordering::SeqCst) {
            return Err(BrowserError::Driver("Execution context was destroyed: frame detached".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl PageDriver for FakePage {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), BrowserError> {
        self.check_open()?;
        lock(&self.site.visits).push(url.to_string());

        let delay = lock(&self.site.goto_delays).get(url).copied();
        if let Some(delay) = delay {
            if delay > timeout {
                tokio::time::sleep(timeout).await;
                return Err(BrowserError::Timeout(format!(
                    "Navigation timed out after {}ms for {}",
                    timeout.as_millis(),
                    url
                )));
            }
            tokio::time::sleep(delay).await;
        }

        let known = lock(&self.site.documents).contains_key(url);
        if known {
            *lock(&self.current) = Some(url.to_string());
        }

        let failure = lock(&self.site.goto_failures).pop_front();
        if let Some(error) = failure {
            return Err(error);
        }

        if !known {
            return Err(BrowserError::Connection(format!(
                "Navigation failed for {}: net::ERR_NAME_NOT_RESOLVED",
                url
            )));
        }
        Ok(())
    }

    async fn reload(&self, timeout: Duration) -> Result<(), BrowserError> {
        self.check_open()?;
        self.site.reloads.fetch_add(1, Ordering::SeqCst);
        lock(&self.site.reload_timeouts).push(timeout);
        if self.site.fail_reloads.load(Ordering::SeqCst) {
            return Err(BrowserError::Timeout("Page reload timed out".into()));
        }
        Ok(())
    }

    async fn evaluate(&self, _script: &str) -> Result<Value, BrowserError> {
        self.check_open()?;
        Ok(Value::Null)
    }

    async fn content(&self) -> Result<String, BrowserError> {
        self.check_open()?;
        Ok(self.document().map(|d| d.html).unwrap_or_default())
    }

    async fn url(&self) -> Result<Option<String>, BrowserError> {
        self.check_open()?;
        if let Some(redirect) = lock(&self.site.redirect).clone() {
            return Ok(Some(redirect));
        }
        Ok(lock(&self.current).clone())
    }

    async fn type_text(&self, selector: &str, text: &str) -> Result<(), BrowserError> {
        self.check_open()?;
        if !lock(&self.site.elements).contains(selector) {
            return Err(BrowserError::Driver(format!("Element not found: {}", selector)));
        }
        lock(&self.site.typed).push(text.to_string());
        Ok(())
    }

    async fn press_enter(&self, _selector: &str) -> Result<(), BrowserError> {
        self.check_open()
    }

    async fn screenshot(&self, _path: &Path) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn apply_setup(&self, _setup: &PageSetup) -> Result<(), BrowserError> {
        self.site.setups.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), BrowserError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(BrowserError::Driver("Target closed".into()));
        }
        self.site.pages_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn title(&self) -> Result<Option<String>, BrowserError> {
        self.check_open()?;
        Ok(self.document().map(|d| d.title))
    }

    async fn is_attached(&self) -> bool {
        self.check_open().is_ok()
    }

    async fn is_interactive(&self, selector: &str) -> Result<bool, BrowserError> {
        self.check_open()?;
        Ok(lock(&self.site.interactive).contains(selector))
    }

    async fn has_element(&self, selector: &str) -> Result<bool, BrowserError> {
        self.check_open()?;
        Ok(lock(&self.site.elements).contains(selector))
    }

    async fn text_of(&self, selector: &str) -> Result<Option<String>, BrowserError> {
        self.check_open()?;
        Ok(lock(&self.site.texts).get(selector).cloned())
    }

    async fn value_of(&self, selector: &str) -> Result<Option<String>, BrowserError> {
        self.check_open()?;
        Ok(lock(&self.site.values).get(selector).cloned())
    }

    async fn clear_input(&self, _selector: &str) -> Result<(), BrowserError> {
        self.check_open()
    }

    async fn answer_sample(&self, _selector: &str) -> Result<AnswerSample, BrowserError> {
        self.check_open()?;
        self.site.answer_reads.fetch_add(1, Ordering::SeqCst);
        let mut answers = lock(&self.site.answers);
        let sample = if answers.len() > 1 {
            answers.pop_front()
        } else {
            answers.front().cloned()
        };
        Ok(sample.unwrap_or_default())
    }
}
