//! Cache performance counters.

use serde::Serialize;

/// Snapshot of the cache counters. Diagnostic only.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    /// Entries removed by explicit or observer-driven invalidation.
    pub invalidations: u64,
    /// Entries dropped by the sweep.
    pub swept: u64,
    pub structural_entries: usize,
    pub style_entries: usize,
    pub rect_entries: usize,
    /// Handles with at least one live host observation.
    pub observed_nodes: usize,
}

impl CacheMetrics {
    /// Fraction of reads answered from the cache, 0 when nothing was read.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits.saturating_add(self.misses);
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Total live entries.
    pub const fn entries(&self) -> usize {
        self.structural_entries + self.style_entries + self.rect_entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_rate_handles_zero_reads() {
        assert!(CacheMetrics::default().hit_rate().abs() < f64::EPSILON);
        let metrics = CacheMetrics {
            hits: 3,
            misses: 1,
            ..CacheMetrics::default()
        };
        assert!((metrics.hit_rate() - 0.75).abs() < f64::EPSILON);
    }
}
