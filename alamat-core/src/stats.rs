//! Run-level outcome counters
//!
//! Workers update a shared [`RunCounters`] with lock-free atomic increments;
//! callers read a [`RunStatistics`] snapshot once the batch has finished.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Fraction of NOT_FOUND rows above which a run is flagged as suspicious
pub const NOT_FOUND_WARNING_RATIO: f64 = 0.5;

/// Atomic counters shared by all workers of one batch run
#[derive(Debug, Default)]
pub struct RunCounters {
    success: AtomicU64,
    not_found: AtomicU64,
    error: AtomicU64,
    timeout: AtomicU64,
    rate_limited: AtomicU64,
}

impl RunCounters {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_success(&self) {
        self.success.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_not_found(&self) {
        self.not_found.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_error(&self) {
        self.error.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_timeout(&self) {
        self.timeout.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    /// Read all counters
    ///
    /// Counters are independent, so a snapshot taken while workers are still
    /// running may mix slightly different moments. Take it after the run.
    pub fn snapshot(&self) -> RunStatistics {
        RunStatistics {
            success: self.success.load(Ordering::Relaxed),
            not_found: self.not_found.load(Ordering::Relaxed),
            error: self.error.load(Ordering::Relaxed),
            timeout: self.timeout.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
        }
    }
}

/// Read-only outcome summary of a batch run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStatistics {
    /// Rows resolved to an address
    pub success: u64,
    /// Rows no provider could resolve
    pub not_found: u64,
    /// Unexpected provider responses (non-200 status, transport errors)
    pub error: u64,
    /// Requests that hit their deadline, retried ones included
    pub timeout: u64,
    /// HTTP 429 responses, retried ones included
    pub rate_limited: u64,
}

impl RunStatistics {
    /// Number of rows accounted for (every row is either success or not found)
    pub fn rows(&self) -> u64 {
        self.success + self.not_found
    }

    /// Share of rows resolved, as a percentage
    pub fn success_percent(&self) -> f64 {
        match self.rows() {
            0 => 0.0,
            rows => self.success as f64 / rows as f64 * 100.0,
        }
    }

    /// True when more than half the rows came back NOT_FOUND, which usually
    /// means throttling or connectivity trouble rather than bad coordinates
    pub fn mostly_not_found(&self) -> bool {
        let rows = self.rows();
        rows > 0 && self.not_found as f64 > rows as f64 * NOT_FOUND_WARNING_RATIO
    }
}
