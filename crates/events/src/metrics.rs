//! Router performance counters.

use serde::Serialize;

/// Snapshot of the router counters and live registration counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RouterMetrics {
    pub delegated_calls: u64,
    pub direct_calls: u64,
    pub throttled_calls: u64,
    pub debounced_calls: u64,
    /// Registrations reclaimed by the leak sweep.
    pub reclaimed: u64,
    /// Registrations removed through their cleanup handle.
    pub released: u64,
    pub delegate_groups: usize,
    pub delegated_selectors: usize,
    pub direct_listeners: usize,
    pub throttled: usize,
    pub debounced: usize,
}
