//! Lock-free push/pop/remove over chains of [`Slot`], terminated by a
//! domain's `sentinel` rather than null (`spec.md` §4.1 "List
//! primitives").
//!
//! These are free functions rather than a standalone collection type
//! because a single [`Slot`] participates in two different chains
//! (`nodes` via `fixed_link`, and `free`/`retired` via `list_next`) and
//! the head + link-selector vary per call site, mirroring the shape of
//! `examples/original_source/src/HazardPointer.hpp`'s `push`/`pop`/`remove`
//! member functions, generalised with a link accessor instead of being
//! duplicated per list.

use super::slot::Slot;
use crate::sync::{AtomicPtr, Ordering};

/// Pushes `node` onto the head of the list rooted at `head`, linking
/// through whichever field `link` selects.
pub(crate) fn push<T>(
    head: &AtomicPtr<Slot<T>>,
    link: impl Fn(&Slot<T>) -> &AtomicPtr<Slot<T>>,
    node: *mut Slot<T>,
) {
    // Safety: `node` is a live slot for the duration of this call; all
    // callers own it exclusively at the moment they push it.
    let node_ref = unsafe { &*node };
    let mut current_head = head.load(Ordering::Acquire);
    loop {
        link(node_ref).store(current_head, Ordering::Release);
        match head.compare_exchange_weak(current_head, node, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => return,
            Err(observed) => current_head = observed,
        }
    }
}

/// Pops the head of the list rooted at `head`. Returns `sentinel` if the
/// list is empty. On success, the popped slot's `link` field is reset to
/// null (not-enqueued).
pub(crate) fn pop<T>(
    head: &AtomicPtr<Slot<T>>,
    link: impl Fn(&Slot<T>) -> &AtomicPtr<Slot<T>>,
    sentinel: *mut Slot<T>,
) -> *mut Slot<T> {
    let mut current_head = head.load(Ordering::Acquire);
    loop {
        if current_head == sentinel {
            return sentinel;
        }
        // Safety: non-sentinel heads observed here are live slots owned
        // by this list until successfully popped.
        let next = link(unsafe { &*current_head }).load(Ordering::Acquire);
        match head.compare_exchange_weak(current_head, next, Ordering::AcqRel, Ordering::Acquire) {
            Ok(popped) => {
                // Safety: `popped` is the slot we just removed exclusive
                // ownership of.
                link(unsafe { &*popped }).store(std::ptr::null_mut(), Ordering::Release);
                return popped;
            }
            Err(observed) => current_head = observed,
        }
    }
}

/// Splices `node` out of the list rooted at `head`, restarting the walk
/// if a concurrent push changes the head underneath it. `node` must
/// currently be reachable from `head` via `link`. On return `node`'s
/// `link` field is null (not-enqueued).
pub(crate) fn remove<T>(
    head: &AtomicPtr<Slot<T>>,
    link: impl Fn(&Slot<T>) -> &AtomicPtr<Slot<T>>,
    sentinel: *mut Slot<T>,
    node: *mut Slot<T>,
) {
    'restart: loop {
        let mut pred = head;
        let mut current = pred.load(Ordering::Acquire);
        loop {
            if current == node {
                // Safety: `current` is reachable and live.
                let next = link(unsafe { &*current }).load(Ordering::Acquire);
                if pred
                    .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    continue 'restart;
                }
                // Safety: we just unlinked `node` exclusively.
                link(unsafe { &*node }).store(std::ptr::null_mut(), Ordering::Release);
                return;
            }
            if current == sentinel {
                debug_assert!(false, "remove: node was not present in the list");
                return;
            }
            // Safety: `current` is reachable and live for as long as we
            // hold a valid predecessor pointer to it.
            pred = link(unsafe { &*current });
            current = pred.load(Ordering::Acquire);
        }
    }
}
