//! Fixed-window admission control for rate-limited remote calls
//!
//! At most `max_calls` acquisitions are admitted per window. The window opens
//! on the first call after the previous one elapsed; once its budget is spent,
//! callers wait until it closes. The limiter is shared by all workers
//! (`Arc<RateLimiter>`) and serializes its own bookkeeping, so a caller
//! waiting for the next window holds back everyone queued behind it.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{IngestError, Result};

/// Rate limiting configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Calls admitted per window
    pub max_calls: u32,
    /// Window length
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_calls: 5,
            window: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Default)]
struct Window {
    started: Option<Instant>,
    calls: u32,
}

/// Shared call-count-bounded limiter
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    window: Mutex<Window>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config: RateLimitConfig {
                max_calls: config.max_calls.max(1),
                window: config.window,
            },
            window: Mutex::new(Window::default()),
        }
    }

    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    /// Wait until a call may be issued, then count it against the window.
    pub async fn acquire(&self) {
        let mut window = self.window.lock().await;
        let now = Instant::now();

        match window.started {
            Some(started) if now.duration_since(started) < self.config.window => {
                if window.calls >= self.config.max_calls {
                    let reopens = started + self.config.window;
                    debug!(
                        calls = window.calls,
                        wait_ms = reopens.duration_since(now).as_millis() as u64,
                        "Rate limit budget spent, waiting for next window"
                    );
                    tokio::time::sleep_until(reopens).await;
                    window.started = Some(Instant::now());
                    window.calls = 0;
                }
            },
            _ => {
                window.started = Some(now);
                window.calls = 0;
            },
        }

        window.calls += 1;
    }

    /// [`acquire`](Self::acquire), giving up if `cancel` fires first.
    pub async fn acquire_or_cancel(&self, cancel: &CancellationToken) -> Result<()> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(IngestError::Cancelled),
            _ = self.acquire() => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_sixth_call_waits_for_next_window() {
        let limiter = RateLimiter::new(RateLimitConfig::default());
        let start = Instant::now();
        let mut admitted_at = Vec::new();

        for _ in 0..10 {
            limiter.acquire().await;
            admitted_at.push(start.elapsed());
        }

        for elapsed in &admitted_at[..5] {
            assert!(*elapsed < Duration::from_secs(1));
        }
        for elapsed in &admitted_at[5..] {
            assert!(*elapsed >= Duration::from_secs(30));
            assert!(*elapsed < Duration::from_secs(31));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_resets_after_idle_period() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_calls: 2,
            window: Duration::from_secs(10),
        });

        limiter.acquire().await;
        limiter.acquire().await;
        tokio::time::sleep(Duration::from_secs(11)).await;

        let before = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        assert_eq!(before.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_limiter_bounds_concurrent_callers() {
        let limiter = Arc::new(RateLimiter::new(RateLimitConfig {
            max_calls: 3,
            window: Duration::from_secs(30),
        }));
        let start = Instant::now();

        let handles: Vec<_> = (0..7)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move {
                    limiter.acquire().await;
                    start.elapsed()
                })
            })
            .collect();

        let mut elapsed = Vec::new();
        for handle in handles {
            elapsed.push(handle.await.unwrap());
        }
        elapsed.sort();

        assert!(elapsed[..3].iter().all(|e| *e < Duration::from_secs(30)));
        assert!(elapsed[3..6].iter().all(|e| *e >= Duration::from_secs(30) && *e < Duration::from_secs(60)));
        assert!(elapsed[6] >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_wait() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_calls: 1,
            window: Duration::from_secs(30),
        });
        let cancel = CancellationToken::new();

        limiter.acquire_or_cancel(&cancel).await.unwrap();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            canceller.cancel();
        });

        let start = Instant::now();
        let outcome = limiter.acquire_or_cancel(&cancel).await;
        assert!(matches!(outcome, Err(IngestError::Cancelled)));
        assert!(start.elapsed() < Duration::from_secs(30));
    }
}
