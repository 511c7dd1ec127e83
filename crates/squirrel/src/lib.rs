//! Squirrel core: resource cache, event router and batched mutations over a
//! host document.
//!
//! [`Squirrel`] is the composition root. It owns exactly one
//! [`ResourceCache`] and one [`EventRouter`] built on the same [`Host`];
//! widgets receive it (or the services) explicitly instead of reaching for a
//! global.

#![allow(clippy::missing_errors_doc, reason = "Only telemetry rendering can fail")]

mod batch;
mod config;
pub mod telemetry;

pub use batch::{BatchHandle, Operation, TransitionGuard, batch, batch_update};
pub use config::{DEFAULT_BATCH_THRESHOLD, SquirrelConfig};
pub use squirrel_cache::{CacheConfig, CacheMetrics, ResourceCache};
pub use squirrel_events::{Callback, Cleanup, EventRouter, RouterConfig, RouterMetrics};
pub use squirrel_host as host;
pub use telemetry::Snapshot;

use anyhow::Result;
use log::info;
use squirrel_host::{Host, NodeKey};

/// The services of one application, sharing one host.
pub struct Squirrel {
    host: Host,
    config: SquirrelConfig,
    cache: ResourceCache,
    router: EventRouter,
}

impl Squirrel {
    pub fn new(host: Host, config: SquirrelConfig) -> Self {
        let cache = ResourceCache::new(host.clone(), config.cache);
        let router = EventRouter::new(host.clone(), config.router);
        info!(
            "squirrel started (batch threshold {}, telemetry {})",
            config.batch_threshold,
            if config.telemetry_enabled { "on" } else { "off" }
        );
        Self {
            host,
            config,
            cache,
            router,
        }
    }

    pub const fn host(&self) -> &Host {
        &self.host
    }

    pub const fn config(&self) -> &SquirrelConfig {
        &self.config
    }

    pub const fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    pub const fn router(&self) -> &EventRouter {
        &self.router
    }

    /// Run `operations` on the next frame. See [`batch()`].
    pub fn batch<T: 'static>(&self, operations: Vec<Operation<T>>) -> BatchHandle<T> {
        batch::batch(&self.host, self.config.batch_threshold, operations)
    }

    /// Update one node with transitions suspended and its cache entries
    /// dropped afterwards.
    pub fn batch_update(&self, node: NodeKey, update: impl FnOnce() -> Result<()>) -> bool {
        batch::batch_update(&self.host.document, &self.cache, node, update)
    }

    pub fn metrics(&self) -> Snapshot {
        Snapshot {
            cache: self.cache.metrics(),
            router: self.router.metrics(),
        }
    }

    /// Log a metrics snapshot if telemetry is enabled.
    pub fn emit_telemetry(&self) {
        telemetry::maybe_emit(self.config.telemetry_enabled, &self.metrics());
    }

    /// Release every listener, observation and timer. Reads keep working
    /// afterwards but are no longer swept.
    pub fn shutdown(&self) {
        self.router.cleanup_all();
        self.cache.destroy();
        info!("squirrel shut down");
    }
}
