//! Read diagnostics
//!
//! Counters shared by a VFS and every file it opens. Diagnostic only: nothing
//! in the read path depends on them.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

#[derive(Debug, Default)]
pub struct ReadStats {
    /// Bytes fetched from the network
    network_bytes: AtomicU64,
    /// Range requests issued
    network_reads: AtomicU64,
    /// Reads served from a window
    hits: AtomicU64,
    /// Reads that needed a fetch
    misses: AtomicU64,
}

impl ReadStats {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch(&self, bytes: u64) {
        self.network_reads.fetch_add(1, Ordering::Relaxed);
        self.network_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Cumulative bytes fetched from the network
    pub fn total_read_bytes(&self) -> u64 {
        self.network_bytes.load(Ordering::Relaxed)
    }

    /// Number of range requests that completed
    pub fn network_reads(&self) -> u64 {
        self.network_reads.load(Ordering::Relaxed)
    }

    /// Returns (hits, misses, hit_rate)
    pub fn stats(&self) -> (u64, u64, f64) {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        (hits, misses, hit_rate)
    }

    /// Log current read metrics
    pub fn log_metrics(&self) {
        let (hits, misses, hit_rate) = self.stats();
        let bytes = self.total_read_bytes();

        debug!(
            hits = hits,
            misses = misses,
            hit_rate = format!("{:.1}%", hit_rate),
            network_reads = self.network_reads(),
            network_bytes = bytes,
            network_mb = format!("{:.3}", bytes as f64 / 1_000_000.0),
            "Read metrics"
        );
    }
}
