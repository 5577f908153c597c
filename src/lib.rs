//! Hazard-pointer safe memory reclamation with a shared background
//! collector.
//!
//! A [`domain::Domain`] hands out [`domain::ReaderHandle`]s; a reader
//! protects an `AtomicPtr<T>` load by publishing it into its handle's
//! hazard slot, then re-validates before trusting the value (see
//! [`domain::Domain::acquire`]). Retiring a handle moves its protected
//! pointer onto the domain's retired list, where it stays until a
//! [`domain::Domain::collect`] pass (driven by hand, or by registering
//! the domain with a [`collector::Collector`]) finds no live hazard
//! still pointing at it.
//!
//! The collector sleeps between reclamation passes on an internal binary
//! event semaphore (a futex-backed, edge-triggered post/wait primitive);
//! it is an implementation detail and not part of the public surface.

pub mod collector;
pub mod domain;
mod error;
mod event;
mod futex;
mod sync;

pub use collector::{Collector, CollectorClient};
pub use domain::{BoxReclaim, Domain, Reclaim, ReaderHandle};
pub use error::SmrError;
