//! Domain
//!
//! A domain is a holder for hazard slots and retired objects awaiting
//! reclamation (`spec.md` §3 "Domain"). Typically one domain exists per
//! protected container; a domain may optionally register with a
//! [`crate::collector::Collector`] so that `retire` wakes a background
//! thread instead of relying on a caller to drive `collect` by hand.
//!
//! # Example
//!
//! ```
//! use bd_hazard_smr::domain::Domain;
//! use std::sync::atomic::{AtomicPtr, Ordering};
//!
//! let domain: Domain<String> = Domain::new();
//! let slot = Box::into_raw(Box::new(String::from("hello")));
//! let published = AtomicPtr::new(slot);
//!
//! let handle = domain.acquire();
//! handle.protect(&published);
//! assert_eq!(unsafe { &*handle.get() }, "hello");
//! ```

mod handle;
mod list;
mod slot;

pub use handle::ReaderHandle;

use crate::collector::{Collector, CollectorClient, RegistrationState};
use crate::sync::{AtomicPtr, Ordering};
use parking_lot::ReentrantMutex;
use slot::Slot;
// `registration_state` is scanned by the collector's own `collect_all`
// loop, never by the lock-free list code loom model-checks, so it is
// pinned to `std`'s atomics (matching `CollectorClient`'s signature in
// `collector.rs`, which is never routed through `crate::sync` either)
// rather than `crate::sync`'s loom-swappable ones.
use std::sync::atomic::AtomicU8;

/// Frees a retired object. Parameterises [`Domain`] over how a reclaimed
/// `T*` is actually deleted, per `spec.md` §6 ("an object-deleter").
pub trait Reclaim<T> {
    /// # Safety
    ///
    /// `ptr` must point to a live `T` that is no longer reachable from
    /// any hazard slot, and must not have been reclaimed before.
    unsafe fn reclaim(&self, ptr: *mut T);
}

/// The default deleter: the object was boxed, so it is freed by boxing
/// the raw pointer back up and letting it drop.
#[derive(Debug, Default, Clone, Copy)]
pub struct BoxReclaim;

impl<T> Reclaim<T> for BoxReclaim {
    unsafe fn reclaim(&self, ptr: *mut T) {
        drop(unsafe { Box::from_raw(ptr) });
    }
}

/// A protection domain: owns the `nodes`/`free`/`retired` slot lists for
/// one kind of protected object, per `spec.md` §3/§4.1.
pub struct Domain<T, R: Reclaim<T> = BoxReclaim> {
    sentinel: *mut Slot<T>,
    nodes: AtomicPtr<Slot<T>>,
    free: AtomicPtr<Slot<T>>,
    retired: AtomicPtr<Slot<T>>,
    reclaim: R,
    reclaim_lock: ReentrantMutex<()>,
    state: AtomicU8,
    collector: AtomicPtr<Collector>,
}

impl<T: Send + 'static> Domain<T, BoxReclaim> {
    /// Creates a domain whose objects are reclaimed by dropping a `Box<T>`.
    pub fn new() -> Self {
        Self::with_reclaim(BoxReclaim)
    }
}

impl<T: Send + 'static> Default for Domain<T, BoxReclaim> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static, R: Reclaim<T> + Send + Sync + 'static> Domain<T, R> {
    /// Creates a domain using a custom [`Reclaim`] strategy.
    pub fn with_reclaim(reclaim: R) -> Self {
        let sentinel = Box::into_raw(Box::new(Slot::detached(0)));
        // Safety: `sentinel` was just allocated and is not yet visible to
        // any other thread.
        unsafe {
            (*sentinel).fixed_link.store(sentinel, Ordering::Relaxed);
            (*sentinel).list_next.store(sentinel, Ordering::Relaxed);
        }
        Self {
            sentinel,
            nodes: AtomicPtr::new(sentinel),
            free: AtomicPtr::new(sentinel),
            retired: AtomicPtr::new(sentinel),
            reclaim,
            reclaim_lock: ReentrantMutex::new(()),
            state: AtomicU8::new(RegistrationState::Unregistered as u8),
            collector: AtomicPtr::new(std::ptr::null_mut()),
        }
    }

    fn self_addr(&self) -> usize {
        self as *const Self as usize
    }

    fn new_slot(&self) -> *mut Slot<T> {
        let slot = Box::into_raw(Box::new(Slot::detached(self.self_addr())));
        list::push(&self.nodes, |s| &s.fixed_link, slot);
        slot
    }

    /// Preallocates `n` slots onto `free`, avoiding allocator calls on
    /// readers' hot path. `prime(0)` is a valid no-op.
    pub fn prime(&self, n: usize) {
        for _ in 0..n {
            let slot = self.new_slot();
            list::push(&self.free, |s| &s.list_next, slot);
        }
    }

    /// Acquires a scoped reader handle bound to a slot. Pops a slot from
    /// `free`; if empty, allocates a fresh one. Never blocks on anything
    /// but memory allocation.
    pub fn acquire(&self) -> ReaderHandle<'_, T, R> {
        let popped = list::pop(&self.free, |s| &s.list_next, self.sentinel);
        let slot = if popped == self.sentinel {
            self.new_slot()
        } else {
            popped
        };
        ReaderHandle::new(self, slot)
    }

    pub(crate) fn release_slot(&self, slot: *mut Slot<T>) {
        debug_assert_eq!(unsafe { &*slot }.domain_addr, self.self_addr());
        unsafe { &*slot }.clear();
        list::push(&self.free, |s| &s.list_next, slot);
    }

    pub(crate) fn retire_slot(&self, slot: *mut Slot<T>) {
        debug_assert_eq!(unsafe { &*slot }.domain_addr, self.self_addr());
        // Safety: the handle retiring this slot held exclusive ownership
        // of it and has confirmed `hazard` is non-null.
        unsafe { &*slot }.exchange_hazard_into_retired();
        list::push(&self.retired, |s| &s.list_next, slot);
        self.signal_collector();
    }

    fn signal_collector(&self) {
        let collector = self.collector.load(Ordering::Acquire);
        if !collector.is_null() {
            // Safety: a non-null pointer here was published by `register`,
            // which requires `&'static Collector`.
            unsafe { &*collector }.signal();
        }
    }

    /// True iff the `retired` list is non-empty.
    pub fn has_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire) != self.sentinel
    }

    /// Runs one reclamation pass: snapshot every published hazard, then
    /// free every retired object whose pointer is not among them.
    /// Returns true iff `retired` is empty once the pass completes.
    ///
    /// See `spec.md` §4.1 for the correctness argument.
    pub fn collect(&self) -> bool {
        let _serialize = self.reclaim_lock.lock();

        if self.retired.load(Ordering::Acquire) == self.sentinel {
            return true;
        }

        let mut protected = Vec::new();
        let mut node = self.nodes.load(Ordering::Acquire);
        while node != self.sentinel {
            // Safety: nodes are append-only and never freed while the
            // domain is alive.
            let slot = unsafe { &*node };
            let hazard = slot.hazard.load(Ordering::Acquire);
            if !hazard.is_null() {
                protected.push(hazard);
            }
            node = slot.fixed_link.load(Ordering::Acquire);
        }
        protected.sort_unstable();

        let mut current = self.retired.load(Ordering::Acquire);
        while current != self.sentinel {
            // Safety: `current` is a live slot reachable from `retired`.
            let slot = unsafe { &*current };
            let next = slot.list_next.load(Ordering::Acquire);
            let ptr = slot.retired.load(Ordering::Acquire);

            if protected.binary_search(&ptr).is_err() {
                debug_assert!(
                    slot.hazard.load(Ordering::Acquire).is_null(),
                    "a slot about to be reclaimed must not also be protecting"
                );
                slot.retired.store(std::ptr::null_mut(), Ordering::Release);
                // Safety: `ptr` is not in `protected`, so no live handle is
                // publishing it; it was placed on `retired` exactly once
                // by `ReaderHandle::retire`.
                unsafe { self.reclaim.reclaim(ptr) };
                list::remove(&self.retired, |s| &s.list_next, self.sentinel, current);
                list::push(&self.free, |s| &s.list_next, current);
                tracing::trace!(ptr = ?ptr, "reclaimed retired object");
            }
            current = next;
        }

        self.retired.load(Ordering::Acquire) == self.sentinel
    }

    /// Registers this domain with a collector so that `retire` wakes its
    /// background thread. Requires `&'static self`: the domain's address
    /// must stay stable for as long as it is registered (a `static`, a
    /// leaked `Box`, or similar).
    pub fn register(&'static self, collector: &'static Collector) {
        collector.register(self);
    }

    /// Deregisters this domain from whichever collector it is registered
    /// with, if any. Returns only once no in-flight collection pass is
    /// still inspecting this domain.
    pub fn deregister(&self) {
        let collector = self.collector.swap(std::ptr::null_mut(), Ordering::AcqRel);
        if !collector.is_null() {
            // Safety: see `register`; the pointer was published by a
            // `&'static Collector`.
            unsafe { &*collector }.deregister(self);
        }
    }
}

impl<T: Send + 'static, R: Reclaim<T> + Send + Sync + 'static> CollectorClient for Domain<T, R> {
    fn has_retired(&self) -> bool {
        Domain::has_retired(self)
    }

    fn collect(&self) -> bool {
        Domain::collect(self)
    }

    fn registration_state(&self) -> &AtomicU8 {
        &self.state
    }

    fn set_collector_ptr(&self, collector: *const Collector) {
        self.collector.store(collector as *mut Collector, Ordering::Relaxed);
    }
}

impl<T: Send + 'static, R: Reclaim<T> + Send + Sync + 'static> Drop for Domain<T, R> {
    fn drop(&mut self) {
        let collector = *self.collector.get_mut();
        if !collector.is_null() {
            // Safety: teardown is not thread-safe by contract (`spec.md`
            // §4.1); the caller must have already ensured no other thread
            // is using this domain.
            unsafe { (&*collector).deregister(&*self) };
        }

        // Any slot still holding a live hazard belonged to a handle the
        // caller never released (a leaked/forgotten handle, or one being
        // dropped concurrently in violation of the teardown contract).
        // Clear it so the final `collect` below does not mistake it for
        // a still-live protection.
        let mut node = *self.nodes.get_mut();
        while node != self.sentinel {
            // Safety: nodes are never freed while the domain is alive.
            let slot = unsafe { &*node };
            if !slot.hazard.load(Ordering::Relaxed).is_null() {
                self.release_slot(node);
            }
            node = slot.fixed_link.load(Ordering::Relaxed);
        }

        self.collect();
        debug_assert_eq!(
            *self.retired.get_mut(),
            self.sentinel,
            "objects remained retired at domain teardown"
        );

        let mut node = *self.nodes.get_mut();
        while node != self.sentinel {
            // Safety: we have exclusive access (`&mut self`) and every
            // node was allocated via `Box::into_raw` in `new_slot`.
            let next = unsafe { &*node }.fixed_link.load(Ordering::Relaxed);
            drop(unsafe { Box::from_raw(node) });
            node = next;
        }
        drop(unsafe { Box::from_raw(self.sentinel) });
    }
}

// Safety: all shared state is either atomic or guarded by
// `reclaim_lock`; `T` is only ever moved behind raw pointers that this
// domain hands out one at a time via hazard slots.
unsafe impl<T: Send, R: Reclaim<T> + Send + Sync> Sync for Domain<T, R> {}
unsafe impl<T: Send, R: Reclaim<T> + Send> Send for Domain<T, R> {}

#[cfg(not(loom))]
#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::AtomicPtr;

    #[test]
    fn prime_zero_is_valid() {
        let domain: Domain<u32> = Domain::new();
        domain.prime(0);
        assert!(!domain.has_retired());
    }

    #[test]
    fn single_threaded_life_cycle() {
        let domain: Domain<String> = Domain::new();

        let s0 = Box::into_raw(Box::new(String::from("s0")));
        let s1 = Box::into_raw(Box::new(String::from("s1")));
        let s2 = Box::into_raw(Box::new(String::from("s2")));

        let mut h0 = domain.acquire();
        h0.protect(&AtomicPtr::new(s0));
        let mut h1 = domain.acquire();
        h1.protect(&AtomicPtr::new(s1));
        let mut h2 = domain.acquire();
        h2.protect(&AtomicPtr::new(s2));

        h2.retire();
        assert!(domain.has_retired());
        assert!(domain.collect());
        assert!(!domain.has_retired());

        assert_eq!(unsafe { &*h0.get() }, "s0");
        assert_eq!(unsafe { &*h1.get() }, "s1");

        h0.release();
        h1.release();
        unsafe {
            drop(Box::from_raw(s0));
            drop(Box::from_raw(s1));
        }
    }

    #[test]
    fn retire_then_collect_with_no_live_protector_reclaims() {
        static DROPPED: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(false);
        struct Guard;
        impl Drop for Guard {
            fn drop(&mut self) {
                DROPPED.store(true, Ordering::SeqCst);
            }
        }

        let domain: Domain<Guard> = Domain::new();
        let ptr = Box::into_raw(Box::new(Guard));
        let mut handle = domain.acquire();
        handle.protect(&AtomicPtr::new(ptr));
        handle.retire();

        assert!(domain.collect());
        assert!(DROPPED.load(Ordering::SeqCst));
    }

    #[test]
    fn live_protection_defers_free() {
        static DROPPED: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(false);
        struct Guard;
        impl Drop for Guard {
            fn drop(&mut self) {
                DROPPED.store(true, Ordering::SeqCst);
            }
        }

        let domain: Domain<Guard> = Domain::new();
        let ptr = Box::into_raw(Box::new(Guard));
        let atomic = AtomicPtr::new(ptr);

        let holder = domain.acquire();
        holder.protect(&atomic);

        let mut retirer = domain.acquire();
        retirer.protect(&atomic);
        retirer.retire();

        assert!(!domain.collect(), "protected pointer must not be reclaimed");
        assert!(!DROPPED.load(Ordering::SeqCst));

        drop(holder);
        assert!(domain.collect());
        assert!(DROPPED.load(Ordering::SeqCst));
    }

    #[test]
    fn preemptive_teardown_deletes_everything() {
        static DROP_COUNT: std::sync::atomic::AtomicUsize = std::sync::atomic::AtomicUsize::new(0);
        struct Counted;
        impl Drop for Counted {
            fn drop(&mut self) {
                DROP_COUNT.fetch_add(1, Ordering::SeqCst);
            }
        }

        let domain: Domain<Counted> = Domain::new();
        domain.prime(16);
        for _ in 0..32 {
            let ptr = Box::into_raw(Box::new(Counted));
            let mut handle = domain.acquire();
            handle.protect(&AtomicPtr::new(ptr));
            handle.retire();
        }
        domain.collect();
        drop(domain);
        assert_eq!(DROP_COUNT.load(Ordering::SeqCst), 32);
    }
}
