//! The scoped reader handle (`spec.md` §3 "Reader handle", §6).

use super::slot::Slot;
use super::Domain;
use crate::domain::Reclaim;
use crate::sync::{AtomicPtr, Ordering};

/// A move-only token bound to one hazard slot for the duration of a read
/// critical section. Dropping the handle releases the slot back to
/// `free` unless [`retire`](ReaderHandle::retire) already consumed it.
pub struct ReaderHandle<'domain, T, R: Reclaim<T> = super::BoxReclaim> {
    pub(crate) domain: &'domain Domain<T, R>,
    pub(crate) slot: *mut Slot<T>,
}

// Slots only move between domain-owned lists; the handle itself owns no
// `T` and is safe to hand across threads along with its domain.
unsafe impl<T: Send, R: Reclaim<T> + Sync> Send for ReaderHandle<'_, T, R> {}

impl<'domain, T: Send + 'static, R: Reclaim<T> + Send + Sync + 'static> ReaderHandle<'domain, T, R> {
    pub(crate) fn new(domain: &'domain Domain<T, R>, slot: *mut Slot<T>) -> Self {
        Self { domain, slot }
    }

    fn slot(&self) -> &Slot<T> {
        debug_assert!(!self.slot.is_null(), "handle used after release/retire");
        // Safety: the slot outlives the handle (it belongs to `self.domain`,
        // which outlives all its slots), and no other handle can hold the
        // same slot pointer at the same time.
        unsafe { &*self.slot }
    }

    /// Publishes the current value of `atomic_ptr` into this slot's
    /// `hazard` field with release ordering.
    ///
    /// Per `spec.md` §4.1, the caller is responsible for the
    /// read-protect-read validation loop: re-read `atomic_ptr` after this
    /// call and retry until two consecutive reads agree.
    pub fn protect(&self, atomic_ptr: &AtomicPtr<T>) -> bool {
        if self.slot.is_null() {
            return false;
        }
        let ptr = atomic_ptr.load(Ordering::Relaxed);
        self.slot().protect(ptr);
        true
    }

    /// Clears the published pointer. The slot remains owned by this
    /// handle and reusable.
    pub fn clear(&self) {
        if !self.slot.is_null() {
            self.slot().clear();
        }
    }

    /// Returns the currently protected pointer, or null if released,
    /// retired, or never protected.
    pub fn get(&self) -> *mut T {
        if self.slot.is_null() {
            return std::ptr::null_mut();
        }
        self.slot().hazard.load(Ordering::Acquire)
    }

    /// Clears the hazard and returns the slot to `free`. Idempotent.
    pub fn release(&mut self) {
        if self.slot.is_null() {
            return;
        }
        let slot = self.slot;
        self.slot = std::ptr::null_mut();
        self.domain.release_slot(slot);
    }

    /// Moves the protected pointer onto the domain's `retired` list and
    /// signals the collector. Precondition: `hazard` is non-null.
    ///
    /// After this call the handle no longer owns the slot; further calls
    /// to `protect`/`clear`/`release`/`retire` are no-ops.
    pub fn retire(&mut self) {
        if self.slot.is_null() {
            return;
        }
        let slot = self.slot;
        self.slot = std::ptr::null_mut();
        // Safety: we hold exclusive ownership of the slot (only this
        // handle can operate on it) and are about to retire it.
        let ptr = unsafe { (&*slot).hazard.load(Ordering::Acquire) };
        debug_assert!(!ptr.is_null(), "retire called on an unprotected slot");
        self.domain.retire_slot(slot);
    }
}

impl<T: Send + 'static, R: Reclaim<T> + Send + Sync + 'static> Drop for ReaderHandle<'_, T, R> {
    fn drop(&mut self) {
        self.release();
    }
}
