//! Bounded retry loop that classifies each failure and reacts to it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, warn};

use super::classify::classify;
use super::coordinator::{RecoveryBudget, RecoveryCoordinator};
use crate::browser::navigation::NavigationController;
use crate::browser::scripts::CAPTCHA_SELECTORS;
use crate::browser::session::Session;
use crate::error::BrowserError;

/// Delays used between attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Jittered wait after a detached frame or protocol error.
    pub detached_wait: (Duration, Duration),
    pub captcha_wait: Duration,
    /// Grows with consecutive timeouts, up to `timeout_cap`.
    pub timeout_step: Duration,
    pub timeout_cap: Duration,
    /// Grows with consecutive navigation errors, up to `navigation_cap`.
    pub navigation_step: Duration,
    pub navigation_cap: Duration,
    pub connection_wait: (Duration, Duration),
    /// Exponential backoff for everything else.
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    pub jitter_step: Duration,
    pub jitter_cap: Duration,
    /// Extra wait when re-navigating after a generic failure also fails.
    pub renavigation_wait: (Duration, Duration),
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            detached_wait: (Duration::from_secs(10), Duration::from_secs(15)),
            captcha_wait: Duration::from_secs(3),
            timeout_step: Duration::from_secs(5),
            timeout_cap: Duration::from_secs(30),
            navigation_step: Duration::from_secs(8),
            navigation_cap: Duration::from_secs(40),
            connection_wait: (Duration::from_secs(15), Duration::from_secs(25)),
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(30),
            jitter_step: Duration::from_secs(1),
            jitter_cap: Duration::from_secs(10),
            renavigation_wait: (Duration::from_secs(10), Duration::from_secs(15)),
        }
    }
}

impl RetryPolicy {
    /// No waiting at all.
    pub fn immediate() -> Self {
        Self {
            detached_wait: (Duration::ZERO, Duration::ZERO),
            captcha_wait: Duration::ZERO,
            timeout_step: Duration::ZERO,
            timeout_cap: Duration::ZERO,
            navigation_step: Duration::ZERO,
            navigation_cap: Duration::ZERO,
            connection_wait: (Duration::ZERO, Duration::ZERO),
            backoff_base: Duration::ZERO,
            backoff_cap: Duration::ZERO,
            jitter_step: Duration::ZERO,
            jitter_cap: Duration::ZERO,
            renavigation_wait: (Duration::ZERO, Duration::ZERO),
        }
    }

    pub fn timeout_delay(&self, consecutive: u32) -> Duration {
        self.timeout_step.saturating_mul(consecutive).min(self.timeout_cap)
    }

    pub fn navigation_delay(&self, consecutive: u32) -> Duration {
        self.navigation_step
            .saturating_mul(consecutive)
            .min(self.navigation_cap)
    }

    /// Exponential part of the generic backoff for a zero-based attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.backoff_base.saturating_mul(factor).min(self.backoff_cap)
    }

    /// Upper bound of the random jitter added to `backoff(attempt)`.
    pub fn jitter_limit(&self, attempt: u32) -> Duration {
        self.jitter_step
            .saturating_mul(attempt.saturating_add(1))
            .min(self.jitter_cap)
    }
}

fn random_between(low: Duration, high: Duration) -> Duration {
    if high <= low {
        return low;
    }
    let millis = rand::rng().random_range(low.as_millis() as u64..=high.as_millis() as u64);
    Duration::from_millis(millis)
}

#[derive(Debug, Default)]
struct FailureCounters {
    timeouts: u32,
    navigation: u32,
    input_misses: u32,
}

pub struct RetryExecutor {
    session: Arc<Session>,
    navigator: Arc<NavigationController>,
    coordinator: Arc<RecoveryCoordinator>,
    policy: RetryPolicy,
    max_recoveries: u32,
}

impl RetryExecutor {
    pub fn new(
        session: Arc<Session>,
        navigator: Arc<NavigationController>,
        coordinator: Arc<RecoveryCoordinator>,
        policy: RetryPolicy,
        max_recoveries: u32,
    ) -> Self {
        Self {
            session,
            navigator,
            coordinator,
            policy,
            max_recoveries,
        }
    }

    /// Run `operation` up to `max_attempts` times.
    pub async fn retry<T, F, Fut>(
        &self,
        mut operation: F,
        max_attempts: u32,
    ) -> Result<T, BrowserError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BrowserError>>,
    {
        let mut budget = RecoveryBudget::new(self.max_recoveries);
        let mut counters = FailureCounters::default();
        let mut last_error: Option<BrowserError> = None;

        for attempt in 0..max_attempts {
            info!("Attempt {}/{}...", attempt + 1, max_attempts);
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if error.is_terminal() {
                return Err(error);
            }
            warn!("Attempt {} failed: {}", attempt + 1, error);

            if attempt + 1 < max_attempts {
                self.react(&error, attempt, &mut counters, &mut budget)
                    .await?;
            }
            last_error = Some(error);
        }

        Err(BrowserError::RetriesExhausted {
            attempts: max_attempts,
            last: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown error".to_string()),
        })
    }

    async fn react(
        &self,
        error: &BrowserError,
        attempt: u32,
        counters: &mut FailureCounters,
        budget: &mut RecoveryBudget,
    ) -> Result<(), BrowserError> {
        let class = classify(error, counters.timeouts, counters.navigation);

        if class.is_detached_frame {
            warn!("Detached frame or protocol error, recovering");
            self.coordinator.recover(Some(error), budget).await?;
            tokio::time::sleep(random_between(
                self.policy.detached_wait.0,
                self.policy.detached_wait.1,
            ))
            .await;
            return Ok(());
        }

        if let BrowserError::InputNotFound(_) = error {
            counters.input_misses += 1;
            if counters.input_misses > 1 {
                warn!("Search input missing after recovery, giving up");
                return Err(error.clone());
            }
            self.coordinator.recover(Some(error), budget).await?;
            return Ok(());
        }

        if class.is_captcha || self.captcha_present().await {
            warn!("CAPTCHA detected, recovering");
            self.coordinator.recover(Some(error), budget).await?;
            tokio::time::sleep(self.policy.captcha_wait).await;
            return Ok(());
        }

        if class.is_timeout {
            counters.timeouts += 1;
            let delay = self.policy.timeout_delay(counters.timeouts);
            warn!(
                "Timeout detected (consecutive: {}), waiting {:?}",
                counters.timeouts, delay
            );
            self.coordinator.recover(Some(error), budget).await?;
            tokio::time::sleep(delay).await;
            return Ok(());
        }

        if class.is_navigation {
            counters.navigation += 1;
            let delay = self.policy.navigation_delay(counters.navigation);
            warn!(
                "Navigation error (consecutive: {}), waiting {:?}",
                counters.navigation, delay
            );
            self.coordinator.recover(Some(error), budget).await?;
            tokio::time::sleep(delay).await;
            return Ok(());
        }

        if class.is_connection {
            warn!("Connection error, recovering");
            self.coordinator.recover(Some(error), budget).await?;
            tokio::time::sleep(random_between(
                self.policy.connection_wait.0,
                self.policy.connection_wait.1,
            ))
            .await;
            return Ok(());
        }

        let delay = self.policy.backoff(attempt)
            + random_between(Duration::ZERO, self.policy.jitter_limit(attempt));
        debug!("Backing off for {:?}", delay);
        tokio::time::sleep(delay).await;

        if let Err(nav_error) = self.navigator.navigate_to_target().await {
            warn!("Re-navigation failed: {}", nav_error);
            tokio::time::sleep(random_between(
                self.policy.renavigation_wait.0,
                self.policy.renavigation_wait.1,
            ))
            .await;
            if attempt > 1 {
                self.coordinator.recover(Some(&nav_error), budget).await?;
            }
        }
        Ok(())
    }

    /// Look for a challenge widget on the current page. Lookup errors count as
    /// "no challenge".
    async fn captcha_present(&self) -> bool {
        let Some(page) = self.session.page() else {
            return false;
        };
        if !page.is_attached().await {
            return false;
        }
        for selector in CAPTCHA_SELECTORS {
            match page.has_element(selector).await {
                Ok(true) => return true,
                Ok(false) => {}
                Err(e) => {
                    debug!("CAPTCHA check failed: {}", e);
                    return false;
                }
            }
        }
        false
    }
}
