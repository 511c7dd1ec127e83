//! Memoizing cache for expensive host reads.
//!
//! Three kinds of read are cached, each keyed by a node plus a logical key:
//!
//! - structural lookups (`selector` under a scope), valid while the result is attached
//! - computed-style properties, valid for the style TTL
//! - layout rectangles, valid for the rect TTL
//!
//! Entries are also dropped explicitly (`invalidate`), when the host reports
//! a change on an observed node, and by a periodic max-age sweep. A miss
//! always falls back to the real read, so the cache is never a source of
//! errors of its own.

#![allow(clippy::missing_errors_doc, reason = "Errors come straight from the host")]

mod cache;
mod config;
mod key;
mod metrics;
mod observation;
mod storage;

pub use cache::ResourceCache;
pub use config::CacheConfig;
pub use key::{CacheKey, CacheKind, CacheValue, KindTag};
pub use metrics::CacheMetrics;
pub use observation::ObservationRecord;
pub use storage::CacheEntry;
