//! Runtime configuration for the Squirrel core.
//!
//! Defaults are usable as-is; every knob can be overridden from the
//! environment with [`SquirrelConfig::from_env`].

use core::time::Duration;
use squirrel_cache::CacheConfig;
use squirrel_events::RouterConfig;
use std::env;

/// Batches larger than this suspend visual transitions while they run.
pub const DEFAULT_BATCH_THRESHOLD: usize = 10;

/// Configuration of every Squirrel service.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SquirrelConfig {
    pub cache: CacheConfig,
    pub router: RouterConfig,
    /// Operation count above which `batch` suspends transitions
    pub batch_threshold: usize,
    /// Whether `emit_telemetry` logs metric snapshots
    pub telemetry_enabled: bool,
}

impl Default for SquirrelConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            router: RouterConfig::default(),
            batch_threshold: DEFAULT_BATCH_THRESHOLD,
            telemetry_enabled: false,
        }
    }
}

impl SquirrelConfig {
    /// Load configuration from environment variables.
    ///
    /// Reads the following environment variables, keeping the default for any
    /// that is missing, unparsable or zero:
    /// - `SQUIRREL_STYLE_TTL_MS`: style entry TTL (default: 5000)
    /// - `SQUIRREL_RECT_TTL_MS`: rect entry TTL (default: 1000)
    /// - `SQUIRREL_CACHE_SWEEP_MS`: cache sweep period (default: 30000)
    /// - `SQUIRREL_CACHE_MAX_AGE_MS`: age at which the sweep drops entries (default: 60000)
    /// - `SQUIRREL_LEAK_SWEEP_MS`: router leak sweep period (default: 60000)
    /// - `SQUIRREL_BATCH_THRESHOLD`: transition suspension threshold (default: 10)
    /// - `SQUIRREL_TELEMETRY`: set to "1" to enable telemetry (default: disabled)
    #[inline]
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build a configuration from an arbitrary variable source.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let number = |name: &str| {
            lookup(name)
                .and_then(|val| val.trim().parse::<u64>().ok())
                .and_then(|value| (value > 0).then_some(value))
        };
        let millis = |name: &str, fallback: Duration| {
            number(name).map_or(fallback, Duration::from_millis)
        };

        let defaults = Self::default();
        let cache = CacheConfig {
            style_ttl: millis("SQUIRREL_STYLE_TTL_MS", defaults.cache.style_ttl),
            rect_ttl: millis("SQUIRREL_RECT_TTL_MS", defaults.cache.rect_ttl),
            sweep_interval: millis("SQUIRREL_CACHE_SWEEP_MS", defaults.cache.sweep_interval),
            max_age: millis("SQUIRREL_CACHE_MAX_AGE_MS", defaults.cache.max_age),
        };
        let router = RouterConfig {
            leak_sweep_interval: millis(
                "SQUIRREL_LEAK_SWEEP_MS",
                defaults.router.leak_sweep_interval,
            ),
            ..defaults.router
        };
        let batch_threshold = number("SQUIRREL_BATCH_THRESHOLD")
            .map_or(defaults.batch_threshold, |value| value as usize);
        let telemetry_enabled = lookup("SQUIRREL_TELEMETRY").as_deref() == Some("1");
        Self {
            cache,
            router,
            batch_threshold,
            telemetry_enabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> SquirrelConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
            .collect();
        SquirrelConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        assert_eq!(config(&[]), SquirrelConfig::default());
    }

    #[test]
    fn overrides_are_applied() {
        let loaded = config(&[
            ("SQUIRREL_STYLE_TTL_MS", "250"),
            ("SQUIRREL_LEAK_SWEEP_MS", "1000"),
            ("SQUIRREL_BATCH_THRESHOLD", "3"),
            ("SQUIRREL_TELEMETRY", "1"),
        ]);
        assert_eq!(loaded.cache.style_ttl, Duration::from_millis(250));
        assert_eq!(loaded.cache.rect_ttl, Duration::from_secs(1));
        assert_eq!(loaded.router.leak_sweep_interval, Duration::from_secs(1));
        assert_eq!(loaded.router.click_gate, Duration::from_millis(300));
        assert_eq!(loaded.batch_threshold, 3);
        assert!(loaded.telemetry_enabled);
    }

    #[test]
    fn bad_values_fall_back() {
        let loaded = config(&[
            ("SQUIRREL_RECT_TTL_MS", "soon"),
            ("SQUIRREL_CACHE_SWEEP_MS", "0"),
            ("SQUIRREL_TELEMETRY", "yes"),
        ]);
        assert_eq!(loaded, SquirrelConfig::default());
    }
}
