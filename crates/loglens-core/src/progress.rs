//! Live counters for one in-flight log stream.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Progress snapshot sent to observers.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamProgress {
    /// Raw bytes pulled from the source so far.
    pub source_bytes_read: u64,
    /// Decoded log bytes produced so far.
    pub decoded_bytes_emitted: u64,
    /// Source size (if known).
    pub source_size: Option<u64>,
    /// Percentage of the source consumed (0-100).
    pub percent: Option<f64>,
}

impl StreamProgress {
    fn new(source_bytes_read: u64, decoded_bytes_emitted: u64, source_size: Option<u64>) -> Self {
        let percent = source_size.map(|total| {
            if total > 0 {
                (source_bytes_read as f64 / total as f64 * 100.0).min(100.0)
            } else {
                0.0
            }
        });
        Self {
            source_bytes_read,
            decoded_bytes_emitted,
            source_size,
            percent,
        }
    }
}

#[derive(Debug)]
struct Counters {
    source_bytes_read: AtomicU64,
    decoded_bytes_emitted: AtomicU64,
    last_report: Mutex<Instant>,
}

/// Shared by the network producer and the blocking decoder of one request.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    counters: Arc<Counters>,
    source_size: Option<u64>,
    interval: Duration,
    tx: Option<mpsc::Sender<StreamProgress>>,
}

impl ProgressTracker {
    pub fn new(
        source_size: Option<u64>,
        interval: Duration,
        tx: Option<mpsc::Sender<StreamProgress>>,
    ) -> Self {
        Self {
            counters: Arc::new(Counters {
                source_bytes_read: AtomicU64::new(0),
                decoded_bytes_emitted: AtomicU64::new(0),
                last_report: Mutex::new(Instant::now()),
            }),
            source_size,
            interval,
            tx,
        }
    }

    /// A tracker nobody listens to.
    pub fn detached() -> Self {
        Self::new(None, Duration::MAX, None)
    }

    pub fn record_source(&self, bytes: u64) {
        self.counters
            .source_bytes_read
            .fetch_add(bytes, Ordering::Relaxed);
        self.maybe_report();
    }

    pub fn record_decoded(&self, bytes: u64) {
        self.counters
            .decoded_bytes_emitted
            .fetch_add(bytes, Ordering::Relaxed);
        self.maybe_report();
    }

    pub fn source_bytes_read(&self) -> u64 {
        self.counters.source_bytes_read.load(Ordering::Relaxed)
    }

    pub fn decoded_bytes_emitted(&self) -> u64 {
        self.counters.decoded_bytes_emitted.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StreamProgress {
        StreamProgress::new(
            self.source_bytes_read(),
            self.decoded_bytes_emitted(),
            self.source_size,
        )
    }

    /// Send a final snapshot regardless of the interval.
    pub fn finish(&self) {
        if let Some(tx) = &self.tx {
            let _ = tx.try_send(self.snapshot());
        }
    }

    fn maybe_report(&self) {
        let Some(tx) = &self.tx else {
            return;
        };
        let mut last = self
            .counters
            .last_report
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if last.elapsed() >= self.interval {
            // Observers that fall behind miss intermediate snapshots.
            let _ = tx.try_send(self.snapshot());
            *last = Instant::now();
        }
    }
}
