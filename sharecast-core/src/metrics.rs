//! Retrieval metrics for monitoring
//!
//! Thread-safe counters using atomic types, rendered as Prometheus text.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::getter::GetterError;

/// Which retrieval operation was performed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    GetShare,
    GetEds,
}

/// How a retrieval call ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
    Cancelled,
}

impl Outcome {
    pub fn of<T>(result: &Result<T, GetterError>) -> Self {
        match result {
            Ok(_) => Outcome::Success,
            Err(err) if err.is_cancellation() => Outcome::Cancelled,
            Err(_) => Outcome::Failure,
        }
    }
}

#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    share_requests: AtomicU64,
    eds_requests: AtomicU64,

    successes: AtomicU64,
    failures: AtomicU64,
    cancellations: AtomicU64,

    bytes_served: AtomicU64,

    // Simple moving average in milliseconds
    total_request_time_ms: AtomicU64,
    total_requests_timed: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                share_requests: AtomicU64::new(0),
                eds_requests: AtomicU64::new(0),
                successes: AtomicU64::new(0),
                failures: AtomicU64::new(0),
                cancellations: AtomicU64::new(0),
                bytes_served: AtomicU64::new(0),
                total_request_time_ms: AtomicU64::new(0),
                total_requests_timed: AtomicU64::new(0),
                start_time: Instant::now(),
            }),
        }
    }

    /// Record one finished retrieval call
    pub fn record(&self, operation: Operation, outcome: Outcome, elapsed: Duration) {
        match operation {
            Operation::GetShare => self.inner.share_requests.fetch_add(1, Ordering::Relaxed),
            Operation::GetEds => self.inner.eds_requests.fetch_add(1, Ordering::Relaxed),
        };
        match outcome {
            Outcome::Success => self.inner.successes.fetch_add(1, Ordering::Relaxed),
            Outcome::Failure => self.inner.failures.fetch_add(1, Ordering::Relaxed),
            Outcome::Cancelled => self.inner.cancellations.fetch_add(1, Ordering::Relaxed),
        };
        self.inner
            .total_request_time_ms
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
        self.inner.total_requests_timed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_served(&self, size: usize) {
        self.inner
            .bytes_served
            .fetch_add(size as u64, Ordering::Relaxed);
    }

    pub fn share_requests(&self) -> u64 {
        self.inner.share_requests.load(Ordering::Relaxed)
    }

    pub fn eds_requests(&self) -> u64 {
        self.inner.eds_requests.load(Ordering::Relaxed)
    }

    pub fn successes(&self) -> u64 {
        self.inner.successes.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.inner.failures.load(Ordering::Relaxed)
    }

    pub fn cancellations(&self) -> u64 {
        self.inner.cancellations.load(Ordering::Relaxed)
    }

    pub fn total_bytes_served(&self) -> u64 {
        self.inner.bytes_served.load(Ordering::Relaxed)
    }

    pub fn avg_request_time_ms(&self) -> f64 {
        let total = self.inner.total_request_time_ms.load(Ordering::Relaxed);
        let count = self.inner.total_requests_timed.load(Ordering::Relaxed);
        if count == 0 {
            0.0
        } else {
            total as f64 / count as f64
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.inner.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-formatted metrics text
    pub fn to_prometheus(&self, square_count: usize, total_bytes: usize) -> String {
        format!(
            "# HELP sharecast_square_count Total number of squares stored\n\
             # TYPE sharecast_square_count gauge\n\
             sharecast_square_count {}\n\
             \n\
             # HELP sharecast_square_bytes Total bytes of square data stored\n\
             # TYPE sharecast_square_bytes gauge\n\
             sharecast_square_bytes {}\n\
             \n\
             # HELP sharecast_uptime_seconds Time since node started in seconds\n\
             # TYPE sharecast_uptime_seconds counter\n\
             sharecast_uptime_seconds {}\n\
             \n\
             # HELP sharecast_share_requests_total Total number of share requests\n\
             # TYPE sharecast_share_requests_total counter\n\
             sharecast_share_requests_total {}\n\
             \n\
             # HELP sharecast_eds_requests_total Total number of square requests\n\
             # TYPE sharecast_eds_requests_total counter\n\
             sharecast_eds_requests_total {}\n\
             \n\
             # HELP sharecast_requests_succeeded_total Requests that returned data\n\
             # TYPE sharecast_requests_succeeded_total counter\n\
             sharecast_requests_succeeded_total {}\n\
             \n\
             # HELP sharecast_requests_failed_total Requests that failed\n\
             # TYPE sharecast_requests_failed_total counter\n\
             sharecast_requests_failed_total {}\n\
             \n\
             # HELP sharecast_requests_cancelled_total Requests stopped by cancellation or deadline\n\
             # TYPE sharecast_requests_cancelled_total counter\n\
             sharecast_requests_cancelled_total {}\n\
             \n\
             # HELP sharecast_bytes_served_total Total bytes returned to callers\n\
             # TYPE sharecast_bytes_served_total counter\n\
             sharecast_bytes_served_total {}\n\
             \n\
             # HELP sharecast_avg_request_time_ms Average request time in milliseconds\n\
             # TYPE sharecast_avg_request_time_ms gauge\n\
             sharecast_avg_request_time_ms {:.2}\n",
            square_count,
            total_bytes,
            self.uptime_seconds(),
            self.share_requests(),
            self.eds_requests(),
            self.successes(),
            self.failures(),
            self.cancellations(),
            self.total_bytes_served(),
            self.avg_request_time_ms(),
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
