//! Progress computation and coalescing for engine downloads.
//!
//! The tracker turns raw byte counts into a 0-100 percentage that never
//! decreases and is reported at a bounded rate. While transferring it stays
//! below 100; only [`ProgressTracker::finish`] yields 100, so a completed
//! sequence always terminates at exactly 100.

use std::time::{Duration, Instant};

/// Default minimum interval between progress reports.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// Highest value reported while bytes are still arriving.
const MAX_IN_FLIGHT: u8 = 99;

/// Bytes for the unknown-size heuristic to reach half of its range.
const UNKNOWN_SIZE_HALF_POINT: f64 = 16.0 * 1024.0 * 1024.0;

/// Ceiling of the unknown-size heuristic.
const UNKNOWN_SIZE_CEILING: f64 = 95.0;

/// Percentage for `received` bytes out of an optional `total`.
///
/// With a known total this is the plain ratio (capped at 99). Without one,
/// an asymptotic curve approaches 95 as data keeps arriving.
pub fn percent_for(received: u64, total: Option<u64>) -> u8 {
    match total {
        Some(total) if total > 0 => {
            let pct = received.saturating_mul(100) / total;
            pct.min(MAX_IN_FLIGHT as u64) as u8
        }
        _ => {
            let r = received as f64;
            (UNKNOWN_SIZE_CEILING * r / (r + UNKNOWN_SIZE_HALF_POINT)) as u8
        }
    }
}

/// Monotonic, rate-limited progress reporting for one download.
#[derive(Debug)]
pub struct ProgressTracker {
    total: Option<u64>,
    received: u64,
    last_reported: u8,
    last_report_at: Option<Instant>,
    interval: Duration,
}

impl ProgressTracker {
    pub fn new(interval: Duration) -> Self {
        Self {
            total: None,
            received: 0,
            last_reported: 0,
            last_report_at: None,
            interval,
        }
    }

    /// Start (or restart) a transfer attempt.
    ///
    /// Byte counts reset, but the reported percentage does not go back.
    pub fn start_attempt(&mut self, total: Option<u64>) {
        self.total = total.filter(|t| *t > 0);
        self.received = 0;
    }

    /// Record a received chunk. Returns a percentage to report, if any.
    pub fn advance(&mut self, bytes: u64) -> Option<u8> {
        self.advance_at(bytes, Instant::now())
    }

    fn advance_at(&mut self, bytes: u64, now: Instant) -> Option<u8> {
        self.received = self.received.saturating_add(bytes);
        let pct = percent_for(self.received, self.total);
        if pct <= self.last_reported {
            return None;
        }
        if let Some(at) = self.last_report_at {
            if now.duration_since(at) < self.interval {
                return None;
            }
        }
        self.last_reported = pct;
        self.last_report_at = Some(now);
        Some(pct)
    }

    /// Transfer and install completed.
    pub fn finish(&mut self) -> u8 {
        self.last_reported = 100;
        100
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn total(&self) -> Option<u64> {
        self.total
    }

    pub fn last_reported(&self) -> u8 {
        self.last_reported
    }
}
