//! Detects when a streamed answer has stopped changing.
//!
//! The target gives no completion signal, so the page is sampled on an
//! interval and `StabilityTracker` decides from the sequence of samples.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::browser::driver::{AnswerSample, PageDriver};
use crate::browser::scripts::ANSWER_SELECTOR;
use crate::config::Config;

pub const PARTIAL_ANSWER_TAG: &str = "[Partial answer, answer may be incomplete]";
pub const ANSWER_TIMEOUT_MESSAGE: &str = "Timed out waiting for a complete answer.";

const MIN_FALLBACK_LENGTH: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Continue,
    Stop,
}

/// Pure decision state over successive answer samples.
#[derive(Debug, Default)]
pub struct StabilityTracker {
    last_text: String,
    stability: u32,
    no_change: u32,
}

impl StabilityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stability(&self) -> u32 {
        self.stability
    }

    pub fn observe(&mut self, sample: &AnswerSample) -> Decision {
        let len = sample.text.chars().count();
        let last_len = self.last_text.chars().count();

        if len > last_len {
            self.stability = 0;
            self.no_change = 0;
        } else if sample.text == self.last_text {
            // an empty page is not a stable answer
            if len > 0 {
                self.stability += 1;
                self.no_change += 1;
                if (len > 1000 && self.stability >= 3)
                    || (len > 500 && self.stability >= 4)
                    || self.stability >= 5
                {
                    return Decision::Stop;
                }
            }
        } else {
            self.no_change += 1;
            self.stability = 0;
        }
        self.last_text.clone_from(&sample.text);

        if self.no_change >= 10 && len > 200 {
            return Decision::Stop;
        }
        if sample.terminal && self.stability >= 2 && len > 100 {
            return Decision::Stop;
        }
        Decision::Continue
    }
}

#[derive(Debug, Clone)]
pub struct StabilityConfig {
    pub poll_interval: Duration,
    pub max_samples: u32,
    /// Absolute limit for the whole wait.
    pub answer_timeout: Duration,
    pub fallback_attempts: u32,
    pub fallback_interval: Duration,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(600),
            max_samples: 60,
            answer_timeout: Duration::from_secs(120),
            fallback_attempts: 3,
            fallback_interval: Duration::from_secs(1),
        }
    }
}

impl StabilityConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            answer_timeout: config.answer_wait_timeout(),
            ..Default::default()
        }
    }
}

async fn read_sample(page: &dyn PageDriver) -> AnswerSample {
    match page.answer_sample(ANSWER_SELECTOR).await {
        Ok(sample) => sample,
        Err(e) => {
            debug!("Answer sample failed: {}", e);
            AnswerSample::default()
        }
    }
}

async fn poll_until_stable(page: &dyn PageDriver, config: &StabilityConfig) -> String {
    let mut tracker = StabilityTracker::new();
    let mut last = String::new();

    for sample_index in 0..config.max_samples {
        let sample = read_sample(page).await;
        if tracker.observe(&sample) == Decision::Stop {
            info!(
                "Answer stable after {} samples ({} chars)",
                sample_index + 1,
                sample.text.len()
            );
            return sample.text;
        }
        last = sample.text;
        tokio::time::sleep(config.poll_interval).await;
    }

    warn!("Answer still changing after {} samples, using last sample", config.max_samples);
    last
}

/// Wait for the answer on `page` to settle and return its text.
///
/// Never fails: a timeout yields either a tagged partial answer or
/// [`ANSWER_TIMEOUT_MESSAGE`].
pub async fn wait_for_complete_answer(page: &dyn PageDriver, config: &StabilityConfig) -> String {
    match tokio::time::timeout(config.answer_timeout, poll_until_stable(page, config)).await {
        Ok(text) => text,
        Err(_) => {
            warn!(
                "Answer did not settle within {:?}, trying fallback reads",
                config.answer_timeout
            );
            fallback_answer(page, config).await
        }
    }
}

async fn fallback_answer(page: &dyn PageDriver, config: &StabilityConfig) -> String {
    for attempt in 0..config.fallback_attempts {
        if attempt > 0 {
            tokio::time::sleep(config.fallback_interval).await;
        }
        let sample = read_sample(page).await;
        if sample.text.chars().count() > MIN_FALLBACK_LENGTH {
            return format!("{}\n\n{}", sample.text, PARTIAL_ANSWER_TAG);
        }
    }
    ANSWER_TIMEOUT_MESSAGE.to_string()
}
