//! Cache timing configuration.

use crate::key::KindTag;
use core::time::Duration;

/// Freshness budgets and sweep cadence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheConfig {
    /// How long a computed-style read stays fresh.
    pub style_ttl: Duration,
    /// How long a layout rectangle stays fresh.
    pub rect_ttl: Duration,
    /// Period of the background sweep.
    pub sweep_interval: Duration,
    /// Entries older than this are dropped by the sweep whatever their kind.
    pub max_age: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            style_ttl: Duration::from_secs(5),
            rect_ttl: Duration::from_secs(1),
            sweep_interval: Duration::from_secs(30),
            max_age: Duration::from_secs(60),
        }
    }
}

impl CacheConfig {
    /// TTL for a kind of entry. Structural entries have none: they stay valid
    /// for as long as the cached node is attached.
    pub const fn ttl(&self, kind: KindTag) -> Option<Duration> {
        match kind {
            KindTag::Structural => None,
            KindTag::Style => Some(self.style_ttl),
            KindTag::Rect => Some(self.rect_ttl),
        }
    }
}
