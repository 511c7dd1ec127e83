//! Telemetry snapshots of the cache and router counters.

use anyhow::Result;
use log::{info, warn};
use serde::Serialize;
use squirrel_cache::CacheMetrics;
use squirrel_events::RouterMetrics;

/// Log target of telemetry lines, so they can be routed separately.
pub const TARGET: &str = "squirrel::telemetry";

/// Point-in-time counters of every service.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Snapshot {
    pub cache: CacheMetrics,
    pub router: RouterMetrics,
}

/// Render a snapshot as one JSON line.
pub fn snapshot_json(snapshot: &Snapshot) -> Result<String> {
    Ok(serde_json::to_string(snapshot)?)
}

/// Log `snapshot` under [`TARGET`] when telemetry is enabled.
pub fn maybe_emit(enabled: bool, snapshot: &Snapshot) {
    if !enabled {
        return;
    }
    match snapshot_json(snapshot) {
        Ok(line) => info!(target: TARGET, "{line}"),
        Err(err) => warn!("telemetry snapshot could not be rendered: {err:#}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn snapshot_renders_both_services() {
        let snapshot = Snapshot {
            cache: CacheMetrics {
                hits: 3,
                ..CacheMetrics::default()
            },
            router: RouterMetrics {
                released: 2,
                ..RouterMetrics::default()
            },
        };
        let line = snapshot_json(&snapshot).unwrap();
        assert!(!line.contains('\n'));
        let parsed: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["cache"]["hits"], 3);
        assert_eq!(parsed["router"]["released"], 2);
    }
}
