//! Configuration for the acquisition engine.
//!
//! Values come from (highest priority first) environment variables, an explicit
//! or auto-discovered config file, and built-in defaults. All durations are in
//! milliseconds unless the field name says otherwise.

mod browser;

pub use browser::BrowserEngineConfig;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default user agent presented to the target site.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Extra margin kept between the crawl deadline and the caller's budget.
const CRAWL_SAFETY_MARGIN_MS: u64 = 5000;

/// Per-phase timeout budgets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeoutProfiles {
    #[serde(default = "default_navigation_profile")]
    pub navigation: u64,
    #[serde(default = "default_selector_profile")]
    pub selector: u64,
    #[serde(default = "default_content_profile")]
    pub content: u64,
    #[serde(default = "default_recovery_profile")]
    pub recovery: u64,
}

impl Default for TimeoutProfiles {
    fn default() -> Self {
        Self {
            navigation: default_navigation_profile(),
            selector: default_selector_profile(),
            content: default_content_profile(),
            recovery: default_recovery_profile(),
        }
    }
}

impl TimeoutProfiles {
    pub fn navigation(&self) -> Duration {
        Duration::from_millis(self.navigation)
    }

    pub fn selector(&self) -> Duration {
        Duration::from_millis(self.selector)
    }

    pub fn content(&self) -> Duration {
        Duration::from_millis(self.content)
    }

    /// Bound on the page reload done by a level 1 recovery.
    pub fn recovery(&self) -> Duration {
        Duration::from_millis(self.recovery)
    }
}

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Page that hosts the answer engine.
    #[serde(default = "default_target_url")]
    pub target_url: String,

    /// Host suffix the target must stay on after navigation.
    #[serde(default = "default_expected_domain")]
    pub expected_domain: String,

    /// Minimum gap between two consecutive searches.
    #[serde(default = "default_search_cooldown")]
    pub search_cooldown: u64,

    /// Navigation budget and the base of the crawl deadline.
    #[serde(default = "default_page_timeout")]
    pub page_timeout: u64,

    /// How long to wait for the answer container after submitting.
    #[serde(default = "default_selector_timeout")]
    pub selector_timeout: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Headroom reserved for the caller's own request timeout.
    #[serde(default = "default_mcp_timeout_buffer")]
    pub mcp_timeout_buffer: u64,

    /// Outer limit for answer stability polling.
    #[serde(default = "default_answer_wait_timeout")]
    pub answer_wait_timeout: u64,

    /// Pause between tearing down and relaunching on a full restart.
    #[serde(default = "default_recovery_wait_time")]
    pub recovery_wait_time: u64,

    /// Inactivity before the browser is closed.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: u64,

    /// Per-candidate wait while probing for the search input.
    #[serde(default = "default_input_wait_timeout")]
    pub input_wait_timeout: u64,

    /// Delay after the input is found, before the host check.
    #[serde(default = "default_settle_delay")]
    pub settle_delay: u64,

    /// Ceiling on recoveries within a single logical operation.
    #[serde(default = "default_max_recoveries")]
    pub max_recoveries: u32,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default)]
    pub timeout_profiles: TimeoutProfiles,

    /// Directory for diagnostic screenshots. Screenshots are skipped when unset.
    #[serde(default)]
    pub screenshot_dir: Option<PathBuf>,

    /// Send a HEAD request before extracting a page and skip non-HTML content.
    #[serde(default = "default_content_type_check")]
    pub content_type_check: bool,

    #[serde(default)]
    pub browser: BrowserEngineConfig,

    /// Path the config was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target_url: default_target_url(),
            expected_domain: default_expected_domain(),
            search_cooldown: default_search_cooldown(),
            page_timeout: default_page_timeout(),
            selector_timeout: default_selector_timeout(),
            max_retries: default_max_retries(),
            mcp_timeout_buffer: default_mcp_timeout_buffer(),
            answer_wait_timeout: default_answer_wait_timeout(),
            recovery_wait_time: default_recovery_wait_time(),
            idle_timeout: default_idle_timeout(),
            input_wait_timeout: default_input_wait_timeout(),
            settle_delay: default_settle_delay(),
            max_recoveries: default_max_recoveries(),
            user_agent: default_user_agent(),
            timeout_profiles: TimeoutProfiles::default(),
            screenshot_dir: None,
            content_type_check: default_content_type_check(),
            browser: BrowserEngineConfig::default(),
            source_path: None,
        }
    }
}

impl Config {
    /// Load configuration using prefer for file discovery, falling back to
    /// defaults. Environment overrides are always applied.
    pub async fn load() -> Self {
        match prefer::load("docshunter").await {
            Ok(pref_config) => {
                if let Some(path) = pref_config.source_path() {
                    match Self::load_from_path(path).await {
                        Ok(config) => config,
                        Err(e) => {
                            tracing::warn!("Ignoring config at {}: {}", path.display(), e);
                            Self::default_with_env()
                        }
                    }
                } else {
                    Self::default_with_env()
                }
            }
            Err(_) => Self::default_with_env(),
        }
    }

    /// Create a default config with environment variable overrides applied.
    pub fn default_with_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Load configuration from a specific file path.
    /// Supports JSON, TOML, and YAML based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path).await?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

        let mut config: Config = match ext {
            "toml" => toml::from_str(&contents).map_err(|e| ConfigError::Parse {
                format: "TOML",
                message: e.to_string(),
            })?,
            "yaml" | "yml" => serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
                format: "YAML",
                message: e.to_string(),
            })?,
            _ => serde_json::from_str(&contents).map_err(|e| ConfigError::Parse {
                format: "JSON",
                message: e.to_string(),
            })?,
        };

        config.source_path = Some(path.to_path_buf());
        Ok(config.with_env_overrides())
    }

    /// Apply environment variable overrides.
    ///
    /// Numeric settings use the upper-case field name (`PAGE_TIMEOUT`,
    /// `MAX_RETRIES`, ...). `TIMEOUT_PROFILES` takes a JSON object.
    pub fn with_env_overrides(mut self) -> Self {
        override_u64("SEARCH_COOLDOWN", &mut self.search_cooldown);
        override_u64("PAGE_TIMEOUT", &mut self.page_timeout);
        override_u64("SELECTOR_TIMEOUT", &mut self.selector_timeout);
        override_u64("MCP_TIMEOUT_BUFFER", &mut self.mcp_timeout_buffer);
        override_u64("ANSWER_WAIT_TIMEOUT", &mut self.answer_wait_timeout);
        override_u64("RECOVERY_WAIT_TIME", &mut self.recovery_wait_time);
        override_u64("IDLE_TIMEOUT", &mut self.idle_timeout);

        if let Some(val) = env_value("MAX_RETRIES").and_then(|v| v.parse().ok()) {
            self.max_retries = val;
        }

        if let Some(val) = env_value("USER_AGENT") {
            self.user_agent = val;
        }

        if let Some(val) = env_value("TIMEOUT_PROFILES") {
            match serde_json::from_str::<TimeoutProfiles>(&val) {
                Ok(profiles) => self.timeout_profiles = profiles,
                Err(e) => tracing::warn!("Invalid TIMEOUT_PROFILES: {}", e),
            }
        }

        if let Some(val) = env_value("SCREENSHOT_DIR") {
            self.screenshot_dir = Some(PathBuf::from(val));
        }

        self.browser = self.browser.with_env_overrides();
        self
    }

    pub fn page_timeout(&self) -> Duration {
        Duration::from_millis(self.page_timeout)
    }

    pub fn selector_timeout(&self) -> Duration {
        Duration::from_millis(self.selector_timeout)
    }

    pub fn answer_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.answer_wait_timeout)
    }

    pub fn recovery_wait(&self) -> Duration {
        Duration::from_millis(self.recovery_wait_time)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout)
    }

    pub fn search_cooldown(&self) -> Duration {
        Duration::from_millis(self.search_cooldown)
    }

    pub fn input_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.input_wait_timeout)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay)
    }

    /// Budget for a whole multi-attempt operation, leaving the caller's buffer.
    pub fn operation_deadline(&self) -> Duration {
        Duration::from_millis(self.page_timeout.saturating_sub(self.mcp_timeout_buffer))
    }

    /// Wall-clock limit for a recursive crawl.
    pub fn crawl_deadline(&self) -> Duration {
        Duration::from_millis(
            self.page_timeout
                .saturating_sub(self.mcp_timeout_buffer)
                .saturating_sub(CRAWL_SAFETY_MARGIN_MS),
        )
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn override_u64(name: &str, target: &mut u64) {
    if let Some(raw) = env_value(name) {
        match raw.trim().parse() {
            Ok(val) => *target = val,
            Err(_) => tracing::warn!("Ignoring non-numeric {}={}", name, raw),
        }
    }
}

fn default_target_url() -> String {
    "https://www.perplexity.ai/".to_string()
}

fn default_expected_domain() -> String {
    "perplexity.ai".to_string()
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_search_cooldown() -> u64 {
    5000
}

fn default_page_timeout() -> u64 {
    180_000
}

fn default_selector_timeout() -> u64 {
    90_000
}

fn default_max_retries() -> u32 {
    10
}

fn default_mcp_timeout_buffer() -> u64 {
    60_000
}

fn default_answer_wait_timeout() -> u64 {
    120_000
}

fn default_recovery_wait_time() -> u64 {
    15_000
}

fn default_idle_timeout() -> u64 {
    5 * 60 * 1000
}

fn default_input_wait_timeout() -> u64 {
    5000
}

fn default_settle_delay() -> u64 {
    3000
}

fn default_max_recoveries() -> u32 {
    6
}

fn default_content_type_check() -> bool {
    true
}

fn default_navigation_profile() -> u64 {
    45_000
}

fn default_selector_profile() -> u64 {
    15_000
}

fn default_content_profile() -> u64 {
    120_000
}

fn default_recovery_profile() -> u64 {
    30_000
}

#[cfg(test)]
pub(crate) static ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());
