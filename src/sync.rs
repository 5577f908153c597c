//! Indirection over `core`/`loom` atomics so the lock-free list and slot
//! code can be exercised by loom's model checker under `--cfg loom`,
//! the same way `examples/Johnabell-atom_box/src/sync.rs` swaps them for
//! its own lock-free list.
//!
//! The collector's registry mutex ([`parking_lot::ReentrantMutex`]) is
//! deliberately not routed through here: loom cannot instrument a
//! non-loom-aware lock, so `collect()`'s cross-thread behaviour is
//! covered by ordinary threaded integration tests instead of loom.

#[cfg(loom)]
pub(crate) use loom::sync::atomic::{AtomicPtr, Ordering};

#[cfg(not(loom))]
pub(crate) use std::sync::atomic::{AtomicPtr, Ordering};
