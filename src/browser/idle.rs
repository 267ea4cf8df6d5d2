//! Closes the browser after a period without successful operations.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

use super::session::Session;

pub struct IdleSupervisor {
    timeout: Duration,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl IdleSupervisor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            timer: Mutex::new(None),
        }
    }

    /// Restart the countdown. Any previously scheduled teardown is cancelled.
    pub fn reset(&self, session: &Arc<Session>) {
        let session: Weak<Session> = Arc::downgrade(session);
        let timeout = self.timeout;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(session) = session.upgrade() {
                info!("Browser idle timeout reached, closing browser");
                session.teardown().await;
            }
        });

        let previous = self
            .timer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    pub fn cancel(&self) {
        if let Some(handle) = self.timer.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handle.abort();
        }
    }
}

impl Drop for IdleSupervisor {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::testing::FakeSite;

    #[tokio::test]
    async fn fires_after_timeout() {
        let site = FakeSite::new();
        let session = site.session();
        session.ensure_ready().await.unwrap();

        let idle = IdleSupervisor::new(Duration::from_millis(20));
        idle.reset(&session);
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(session.page().is_none());
        assert!(session.browser().is_none());
        assert_eq!(site.browsers_closed(), 1);
    }

    #[tokio::test]
    async fn reset_postpones_teardown() {
        let site = FakeSite::new();
        let session = site.session();
        session.ensure_ready().await.unwrap();

        let idle = IdleSupervisor::new(Duration::from_millis(60));
        idle.reset(&session);
        tokio::time::sleep(Duration::from_millis(30)).await;
        idle.reset(&session);
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(session.page().is_some());
        assert_eq!(site.browsers_closed(), 0);

        idle.cancel();
    }
}
