//! Host capabilities consumed by the Squirrel core.
//!
//! The resource cache and the event router never talk to a concrete DOM.
//! Everything they need is expressed here as a small set of traits:
//!
//! ```text
//! Document          structural queries, style and geometry reads
//! SubtreeObserver   "something under this node changed"
//! ResizeObserver    "this node changed size"
//! EventHost         raw listener subscription
//! Scheduler         clock, timers, next-frame callbacks
//! ```
//!
//! `MemoryDocument` and `ManualScheduler` implement all of them in memory with
//! a virtual clock, so every time- and tree-dependent behaviour of the core can
//! be driven deterministically.

#![allow(
    clippy::module_name_repetitions,
    reason = "Types like MemoryDocument are clearer than just Memory"
)]
#![allow(clippy::missing_errors_doc, reason = "Internal crate")]

mod document;
mod memory;
mod node;
mod scheduler;

pub mod selector;

pub use document::{
    ChangeCallback, Document, Event, EventHost, Host, HostListener, HostListenerId,
    ListenerOptions, ObserverId, ResizeObserver, SubtreeObserver,
};
pub use memory::{MemoryDocument, ReadCounters};
pub use node::{NodeKey, Rect};
pub use scheduler::{FrameTask, ManualScheduler, Scheduler, TimerId, TimerTask};
