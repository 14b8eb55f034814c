//! Sliding-window throttle for outbound completion calls.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Length of the sliding window.
pub const WINDOW: Duration = Duration::from_secs(60);

/// Delays callers so that no more than `requests_per_minute` calls start in
/// any 60 second window.
///
/// The limiter never rejects a call. Waiters hold the internal lock while
/// sleeping, so admission is first come, first served.
#[derive(Debug)]
pub struct RateLimiter {
    requests_per_minute: usize,
    window: Duration,
    calls: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter admitting `requests_per_minute` calls per window.
    ///
    /// A budget of zero is treated as one.
    #[must_use]
    pub fn new(requests_per_minute: u32) -> Self {
        Self::with_window(requests_per_minute, WINDOW)
    }

    /// Creates a limiter with a custom window length.
    #[must_use]
    pub fn with_window(requests_per_minute: u32, window: Duration) -> Self {
        let capacity = usize::try_from(requests_per_minute.max(1)).unwrap_or(usize::MAX);
        Self {
            requests_per_minute: capacity,
            window,
            calls: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    /// Waits until a call is allowed, then records it.
    pub async fn wait_if_needed(&self) {
        let mut calls = self.calls.lock().await;
        loop {
            let now = Instant::now();
            while calls
                .front()
                .is_some_and(|oldest| now.duration_since(*oldest) >= self.window)
            {
                calls.pop_front();
            }

            if calls.len() < self.requests_per_minute {
                calls.push_back(now);
                return;
            }

            let Some(oldest) = calls.front().copied() else {
                continue;
            };
            let wait = self.window.saturating_sub(now.duration_since(oldest));
            debug!(
                wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                in_window = calls.len(),
                "Rate limit reached, waiting"
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Number of calls recorded in the current window.
    pub async fn in_window(&self) -> usize {
        let now = Instant::now();
        self.calls
            .lock()
            .await
            .iter()
            .filter(|t| now.duration_since(**t) < self.window)
            .count()
    }

    /// Configured budget per window.
    #[must_use]
    pub const fn requests_per_minute(&self) -> usize {
        self.requests_per_minute
    }
}
