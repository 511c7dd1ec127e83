//! Router timing configuration.

use core::time::Duration;

/// Leak sweep cadence and the defaults used by the convenience helpers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RouterConfig {
    /// Period of the leak-detection sweep.
    pub leak_sweep_interval: Duration,
    /// Minimum gap between two accepted clicks in `on_click`.
    pub click_gate: Duration,
    /// Throttle interval of `on_scroll`.
    pub scroll_throttle: Duration,
    /// Debounce delay of `on_resize`.
    pub resize_debounce: Duration,
    /// Hover-in delay of `on_hover`.
    pub hover_delay: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            leak_sweep_interval: Duration::from_secs(60),
            click_gate: Duration::from_millis(300),
            scroll_throttle: Duration::from_millis(16),
            resize_debounce: Duration::from_millis(250),
            hover_delay: Duration::from_millis(100),
        }
    }
}
