//! Chromium driver built on chromiumoxide (CDP).

#[cfg(feature = "browser")]
use std::path::{Path, PathBuf};
use std::sync::Arc;
#[cfg(feature = "browser")]
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(feature = "browser")]
use std::time::Duration;

use async_trait::async_trait;
#[cfg(feature = "browser")]
use serde_json::Value;
#[cfg(feature = "browser")]
use tokio::sync::Mutex;
#[cfg(feature = "browser")]
use tracing::{debug, info, warn};

#[cfg(feature = "browser")]
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
#[cfg(feature = "browser")]
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
#[cfg(feature = "browser")]
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, NavigateParams,
};
#[cfg(feature = "browser")]
use chromiumoxide::error::CdpError;
#[cfg(feature = "browser")]
use chromiumoxide::page::ScreenshotParams;
#[cfg(feature = "browser")]
use chromiumoxide::{Browser, BrowserConfig, Handler, Page};
#[cfg(feature = "browser")]
use futures::StreamExt;

#[cfg(feature = "browser")]
use super::driver::{PageDriver, PageSetup};
use super::driver::{BrowserDriver, BrowserLauncher};
#[cfg(feature = "browser")]
use super::scripts;
#[cfg(feature = "browser")]
use super::stealth::LAUNCH_ARGS;
use crate::config::BrowserEngineConfig;
use crate::error::BrowserError;

#[cfg(feature = "browser")]
fn driver_error(e: CdpError) -> BrowserError {
    BrowserError::Driver(e.to_string())
}

/// Launches a local Chrome or connects to a remote one.
pub struct ChromiumLauncher {
    config: BrowserEngineConfig,
    user_agent: String,
}

impl ChromiumLauncher {
    pub fn new(config: BrowserEngineConfig, user_agent: impl Into<String>) -> Self {
        Self {
            config,
            user_agent: user_agent.into(),
        }
    }
}

#[cfg(feature = "browser")]
impl ChromiumLauncher {
    /// Common Chrome executable paths to check.
    const CHROME_PATHS: &'static [&'static str] = &[
        // Linux
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        // macOS
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        // Common install locations
        "/opt/google/chrome/google-chrome",
    ];

    /// Find the Chrome executable, preferring the configured one.
    fn find_chrome(&self) -> Result<PathBuf, BrowserError> {
        if let Some(ref path) = self.config.chrome_path {
            if path.exists() {
                return Ok(path.clone());
            }
            warn!("Configured chrome_path {} does not exist", path.display());
        }

        for path in Self::CHROME_PATHS {
            let p = Path::new(path);
            if p.exists() {
                info!("Found Chrome at: {}", path);
                return Ok(p.to_path_buf());
            }
        }

        for cmd in &[
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
        ] {
            if let Ok(output) = std::process::Command::new("which").arg(cmd).output() {
                if output.status.success() {
                    let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                    if !path.is_empty() {
                        info!("Found Chrome in PATH: {}", path);
                        return Ok(PathBuf::from(path));
                    }
                }
            }
        }

        Err(BrowserError::Initialization(
            "Chrome/Chromium not found. Install it or set CHROME_PATH".to_string(),
        ))
    }

    async fn launch_local(&self) -> Result<ChromiumBrowser, BrowserError> {
        info!("Launching browser (headless={})", self.config.headless);

        let chrome_path = self.find_chrome()?;
        let mut builder = BrowserConfig::builder().chrome_executable(chrome_path);

        // with_head means NOT headless
        if !self.config.headless {
            builder = builder.with_head();
        }

        if let Some(ref proxy) = self.config.proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }

        for arg in LAUNCH_ARGS {
            builder = builder.arg(*arg);
        }
        builder = builder.arg(format!("--user-agent={}", self.user_agent));

        for arg in &self.config.chrome_args {
            builder = builder.arg(arg);
        }

        let config = builder.build().map_err(|e| {
            BrowserError::Initialization(format!("Failed to build browser config: {}", e))
        })?;

        let (browser, handler) = Browser::launch(config).await.map_err(|e| {
            BrowserError::Initialization(format!("Failed to launch browser: {}", e))
        })?;

        Ok(ChromiumBrowser::new(browser, handler))
    }

    /// Connect to a remote Chrome instance.
    async fn connect_remote(&self, url: &str) -> Result<ChromiumBrowser, BrowserError> {
        info!(
            "Connecting to remote browser at {} (timeout: {}s)",
            url, self.config.timeout
        );

        // Get WebSocket URL from the /json/version endpoint
        let http_url = url
            .replace("ws://", "http://")
            .replace("wss://", "https://");
        let version_url = format!("{}/json/version", http_url.trim_end_matches('/'));

        let connect_error =
            |e: reqwest::Error| BrowserError::Connection(format!("Remote browser unreachable: {}", e));
        let resp: Value = reqwest::Client::new()
            .get(&version_url)
            .send()
            .await
            .map_err(connect_error)?
            .json()
            .await
            .map_err(connect_error)?;

        let ws_url = resp
            .get("webSocketDebuggerUrl")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                BrowserError::Initialization("No webSocketDebuggerUrl in response".to_string())
            })?;

        info!("Connecting to WebSocket: {}", ws_url);

        let handler_config = chromiumoxide::handler::HandlerConfig {
            request_timeout: Duration::from_secs(self.config.timeout),
            ..Default::default()
        };

        let (browser, handler) = Browser::connect_with_config(ws_url, handler_config)
            .await
            .map_err(|e| {
                BrowserError::Connection(format!("Failed to connect to remote browser: {}", e))
            })?;

        Ok(ChromiumBrowser::new(browser, handler))
    }
}

#[cfg(feature = "browser")]
#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self) -> Result<Arc<dyn BrowserDriver>, BrowserError> {
        let browser = match self.config.remote_url.clone() {
            Some(remote_url) => self.connect_remote(&remote_url).await?,
            None => self.launch_local().await?,
        };
        Ok(Arc::new(browser))
    }
}

// Stub for when browser feature is disabled
#[cfg(not(feature = "browser"))]
#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self) -> Result<Arc<dyn BrowserDriver>, BrowserError> {
        let _ = (&self.config, &self.user_agent);
        Err(BrowserError::Initialization(
            "Browser support not compiled in. Rebuild with --features browser".to_string(),
        ))
    }
}

/// A running browser plus the liveness of its CDP handler loop.
#[cfg(feature = "browser")]
pub struct ChromiumBrowser {
    browser: Mutex<Browser>,
    connected: Arc<AtomicBool>,
}

#[cfg(feature = "browser")]
impl ChromiumBrowser {
    fn new(browser: Browser, mut handler: Handler) -> Self {
        let connected = Arc::new(AtomicBool::new(true));
        let flag = connected.clone();

        tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
            debug!("Browser handler loop exited");
            flag.store(false, Ordering::SeqCst);
        });

        Self {
            browser: Mutex::new(browser),
            connected,
        }
    }
}

#[cfg(feature = "browser")]
#[async_trait]
impl BrowserDriver for ChromiumBrowser {
    async fn new_page(&self) -> Result<Arc<dyn PageDriver>, BrowserError> {
        if !self.is_connected() {
            return Err(BrowserError::Connection("Browser disconnected".to_string()));
        }
        let page = self
            .browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .map_err(driver_error)?;
        Ok(Arc::new(ChromiumPage { page }))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), BrowserError> {
        let mut browser = self.browser.lock().await;
        let result = browser.close().await.map(|_| ()).map_err(driver_error);
        self.connected.store(false, Ordering::SeqCst);
        result
    }
}

#[cfg(feature = "browser")]
pub struct ChromiumPage {
    page: Page,
}

#[cfg(feature = "browser")]
#[async_trait]
impl PageDriver for ChromiumPage {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), BrowserError> {
        info!("Navigating to {}", url);
        let nav_params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(|e| BrowserError::Navigation(format!("Invalid URL: {}", e)))?;

        let started = tokio::time::Instant::now();
        let response = tokio::time::timeout(timeout, self.page.execute(nav_params))
            .await
            .map_err(|_| {
                BrowserError::Timeout(format!(
                    "Navigation timed out after {}ms for {}",
                    timeout.as_millis(),
                    url
                ))
            })?
            .map_err(driver_error)?;

        if let Some(ref error_text) = response.result.error_text {
            let message = format!("Navigation failed for {}: {}", url, error_text);
            return Err(if error_text.starts_with("net::") {
                BrowserError::Connection(message)
            } else {
                BrowserError::Navigation(message)
            });
        }

        // Wait for DOMContentLoaded within what is left of the budget
        let remaining = timeout.saturating_sub(started.elapsed());
        match tokio::time::timeout(remaining, self.page.evaluate(scripts::WAIT_FOR_READY.to_string()))
            .await
        {
            Ok(Ok(result)) => {
                let state: String = result
                    .into_value()
                    .unwrap_or_else(|_| "unknown".to_string());
                debug!("Page ready state: {}", state);
                Ok(())
            }
            Ok(Err(e)) => {
                debug!("Could not check ready state: {}", e);
                Ok(())
            }
            Err(_) => Err(BrowserError::Timeout(format!(
                "Timed out waiting for DOM content of {}",
                url
            ))),
        }
    }

    async fn reload(&self, timeout: Duration) -> Result<(), BrowserError> {
        tokio::time::timeout(timeout, self.page.reload())
            .await
            .map_err(|_| BrowserError::Timeout("Page reload timed out".to_string()))?
            .map_err(driver_error)?;
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<Value, BrowserError> {
        let result = self
            .page
            .evaluate(script.to_string())
            .await
            .map_err(driver_error)?;
        Ok(result.into_value::<Value>().unwrap_or(Value::Null))
    }

    async fn content(&self) -> Result<String, BrowserError> {
        self.page.content().await.map_err(driver_error)
    }

    async fn url(&self) -> Result<Option<String>, BrowserError> {
        self.page
            .url()
            .await
            .map(|u| u.map(|u| u.to_string()))
            .map_err(driver_error)
    }

    async fn type_text(&self, selector: &str, text: &str) -> Result<(), BrowserError> {
        let element = self.page.find_element(selector).await.map_err(driver_error)?;
        element.click().await.map_err(driver_error)?;
        element.type_str(text).await.map_err(driver_error)?;
        Ok(())
    }

    async fn press_enter(&self, selector: &str) -> Result<(), BrowserError> {
        let element = self.page.find_element(selector).await.map_err(driver_error)?;
        element.press_key("Enter").await.map_err(driver_error)?;
        Ok(())
    }

    async fn screenshot(&self, path: &Path) -> Result<(), BrowserError> {
        self.page
            .save_screenshot(ScreenshotParams::builder().full_page(true).build(), path)
            .await
            .map_err(driver_error)?;
        Ok(())
    }

    async fn apply_setup(&self, setup: &PageSetup) -> Result<(), BrowserError> {
        self.page
            .execute(AddScriptToEvaluateOnNewDocumentParams::new(
                setup.evasion_script.clone(),
            ))
            .await
            .map_err(driver_error)?;

        self.page
            .execute(SetUserAgentOverrideParams::new(setup.user_agent.clone()))
            .await
            .map_err(driver_error)?;

        let metrics = SetDeviceMetricsOverrideParams::builder()
            .width(setup.viewport_width as i64)
            .height(setup.viewport_height as i64)
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(BrowserError::Driver)?;
        self.page.execute(metrics).await.map_err(driver_error)?;

        Ok(())
    }

    async fn close(&self) -> Result<(), BrowserError> {
        self.page.clone().close().await.map_err(driver_error)
    }
}
