use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Enforces a minimum interval between requests to a single provider
///
/// The lock is held while sleeping, so concurrent callers queue up behind
/// each other and every permitted request is at least `min_interval` apart.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Create a limiter that allows one request per `min_interval`
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    /// Minimum spacing between two permitted requests
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Block until the next request is allowed, then record it
    pub fn wait(&self) {
        let mut last_request = self
            .last_request
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(last) = *last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                let remaining = self.min_interval - elapsed;
                log::debug!("Rate limiting: sleeping {:?}", remaining);
                std::thread::sleep(remaining);
            }
        }

        *last_request = Some(Instant::now());
    }
}
