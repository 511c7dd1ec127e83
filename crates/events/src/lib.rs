//! Event routing over a host document.
//!
//! [`EventRouter`] offers three ways to listen:
//!
//! - delegation: one host subscription per container and event kind, fanned
//!   out to selectors matched against the event target's ancestry
//! - direct listeners, de-duplicated on target, kind and callback identity
//! - throttled and debounced listeners, coalesced with host timers
//!
//! Every registration returns an idempotent [`Cleanup`]. A direct listener is
//! released as soon as its target is removed from its parent; anything else
//! whose node left the document is reclaimed by a periodic sweep.

#![allow(clippy::missing_errors_doc, reason = "Errors are the callbacks' own")]

mod callback;
mod cleanup;
mod coalesce;
mod config;
mod convenience;
mod metrics;
mod registry;
mod router;

pub use callback::Callback;
pub use cleanup::Cleanup;
pub use coalesce::{ClickGate, DebounceState, ThrottleState, ThrottleStep};
pub use config::RouterConfig;
pub use metrics::RouterMetrics;
pub use registry::{GroupKey, RegistrationId};
pub use router::EventRouter;
