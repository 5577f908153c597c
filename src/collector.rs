//! The shared background collector (`spec.md` §3 "Collector", §6).
//!
//! A [`Collector`] drives reclamation for every [`crate::domain::Domain`]
//! registered with it, so that callers who don't want to call `collect()`
//! themselves still get their retired objects freed promptly. Registered
//! clients are scanned with an id-watermark technique
//! (`examples/original_source/src/HazardPointer.cpp`'s `Collect`) that
//! bounds how long the registry mutex is held to a single lookup per
//! client, never across a client's own `collect()` call.

use crate::event::BinaryEvent;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

const RETRY_INTERVAL: Duration = Duration::from_millis(100);

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RegistrationState {
    Unregistered = 0,
    Registered = 1,
    Collecting = 2,
    Deleting = 3,
}

/// What the collector needs from a registered domain. Implemented by
/// [`crate::domain::Domain`]; not meant to be implemented elsewhere.
pub trait CollectorClient: Sync {
    /// True iff this client has at least one object awaiting reclamation.
    fn has_retired(&self) -> bool;

    /// Runs one reclamation pass. Returns true iff nothing remains
    /// retired afterwards.
    fn collect(&self) -> bool;

    /// The client's registration state cell, owned by the client but
    /// mutated by the collector during scans.
    fn registration_state(&self) -> &AtomicU8;

    /// Publishes a non-owning back-pointer to the collector this client
    /// has just registered with.
    fn set_collector_ptr(&self, collector: *const Collector);
}

fn client_identity(client: &dyn CollectorClient) -> *const () {
    client as *const dyn CollectorClient as *const ()
}

/// Background reclamation driver shared by any number of domains.
///
/// A collector does nothing until [`Collector::start`] spawns its
/// worker thread; constructing one with [`Collector::new`] is free and
/// safe to do at any time, including in a `static`.
pub struct Collector {
    registry: Mutex<Vec<(u64, &'static dyn CollectorClient)>>,
    next_id: AtomicU64,
    event: BinaryEvent,
    running: AtomicBool,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Collector {
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
            event: BinaryEvent::new(),
            running: AtomicBool::new(false),
            thread: Mutex::new(None),
        }
    }

    /// Spawns the background worker thread. A no-op if already started.
    /// Requires `&'static self`: the worker closure borrows the
    /// collector for as long as it runs.
    pub fn start(&'static self) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }
        let handle = std::thread::Builder::new()
            .name("smr-collector".into())
            .spawn(move || self.run())
            .expect("failed to spawn collector thread");
        *self.thread.lock() = Some(handle);
    }

    fn run(&'static self) {
        let span = tracing::debug_span!("collector_run");
        let _enter = span.enter();
        while self.running.load(Ordering::Acquire) {
            self.collect_all();
            if self.has_any_retired() {
                std::thread::sleep(RETRY_INTERVAL);
                self.event.post();
            }
            self.event.wait();
        }
        tracing::debug!("collector thread exiting");
    }

    /// Registers `client` so the background thread collects it.
    ///
    /// Asserts the client is not already registered with a collector.
    /// Requires `&'static dyn CollectorClient`: the registry keeps the
    /// reference until a matching [`Collector::deregister`].
    pub fn register(&self, client: &'static dyn CollectorClient) {
        debug_assert_eq!(
            client.registration_state().load(Ordering::Acquire),
            RegistrationState::Unregistered as u8,
            "client is already registered with a collector"
        );

        let mut registry = self.registry.lock();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        registry.push((id, client));
        drop(registry);

        client.set_collector_ptr(self as *const Collector);
        client
            .registration_state()
            .store(RegistrationState::Registered as u8, Ordering::Release);
        tracing::debug!(id, "registered collector client");
    }

    /// Removes `client` from the registry, waiting out any in-flight
    /// `collect_all` pass that is currently scanning it. A no-op if the
    /// client is not registered with this collector.
    pub fn deregister(&self, client: &dyn CollectorClient) {
        loop {
            let state = client.registration_state().load(Ordering::Acquire);
            if state == RegistrationState::Collecting as u8 {
                std::thread::yield_now();
                continue;
            }
            match client.registration_state().compare_exchange(
                RegistrationState::Registered as u8,
                RegistrationState::Deleting as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(observed) if observed == RegistrationState::Collecting as u8 => continue,
                Err(observed) => {
                    debug_assert_eq!(observed, RegistrationState::Unregistered as u8);
                    return;
                }
            }
        }

        let identity = client_identity(client);
        let mut registry = self.registry.lock();
        registry.retain(|(_, c)| client_identity(*c) != identity);
        drop(registry);

        client
            .registration_state()
            .store(RegistrationState::Unregistered as u8, Ordering::Release);
        tracing::debug!("deregistered collector client");
    }

    /// Wakes the worker thread; called by a domain after retiring an
    /// object. A no-op if no thread is running yet.
    pub(crate) fn signal(&self) {
        self.event.post();
    }

    /// Stops the worker thread. If `join` is true, blocks until it has
    /// exited.
    pub fn stop(&self, join: bool) {
        self.running.store(false, Ordering::Release);
        self.event.post();
        if join {
            if let Some(handle) = self.thread.lock().take() {
                let _ = handle.join();
            }
        }
    }

    fn has_any_retired(&self) -> bool {
        self.registry.lock().iter().any(|(_, c)| c.has_retired())
    }

    /// Scans every registered client once, in increasing registration-id
    /// order, collecting any with pending retirees.
    ///
    /// Snapshots `next_id` as a watermark up front so clients registered
    /// mid-scan are left for the following pass, and never holds the
    /// registry mutex across a client's own `collect()` call.
    fn collect_all(&self) {
        let watermark = self.next_id.load(Ordering::Acquire);
        let mut last_id = 0u64;

        loop {
            let next = {
                let registry = self.registry.lock();
                registry
                    .iter()
                    .filter(|(id, _)| *id > last_id && *id <= watermark)
                    .min_by_key(|(id, _)| *id)
                    .map(|(id, c)| (*id, *c))
            };
            let (id, client) = match next {
                Some(pair) => pair,
                None => break,
            };
            last_id = id;

            let became_collecting = client
                .registration_state()
                .compare_exchange(
                    RegistrationState::Registered as u8,
                    RegistrationState::Collecting as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok();
            if !became_collecting {
                // Mid-deregistration (DELETING); skip it this round.
                continue;
            }

            if client.has_retired() {
                let span = tracing::trace_span!("collect_client", id);
                let _enter = span.enter();
                client.collect();
            }

            let _ = client.registration_state().compare_exchange(
                RegistrationState::Collecting as u8,
                RegistrationState::Registered as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        }
    }
}

impl Default for Collector {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Collector {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        self.event.post();
        if let Some(handle) = self.thread.get_mut().take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::AtomicBool as StdAtomicBool;
    use std::sync::Arc;

    struct FakeClient {
        state: AtomicU8,
        retired: StdAtomicBool,
        collected: StdAtomicBool,
    }

    impl FakeClient {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                state: AtomicU8::new(RegistrationState::Unregistered as u8),
                retired: StdAtomicBool::new(true),
                collected: StdAtomicBool::new(false),
            })
        }
    }

    impl CollectorClient for FakeClient {
        fn has_retired(&self) -> bool {
            self.retired.load(Ordering::Acquire)
        }

        fn collect(&self) -> bool {
            self.collected.store(true, Ordering::Release);
            self.retired.store(false, Ordering::Release);
            true
        }

        fn registration_state(&self) -> &AtomicU8 {
            &self.state
        }

        fn set_collector_ptr(&self, _collector: *const Collector) {}
    }

    #[test]
    fn register_then_collect_all_collects_pending_client() {
        let collector = Collector::new();
        let client = FakeClient::new();
        // Safety: test-only leak; the client outlives the collector call.
        let client_ref: &'static FakeClient = unsafe { &*(Arc::as_ptr(&client)) };

        collector.register(client_ref);
        assert_eq!(
            client.state.load(Ordering::Acquire),
            RegistrationState::Registered as u8
        );

        collector.collect_all();
        assert!(client.collected.load(Ordering::Acquire));
        assert_eq!(
            client.state.load(Ordering::Acquire),
            RegistrationState::Registered as u8
        );

        collector.deregister(client_ref);
        assert_eq!(
            client.state.load(Ordering::Acquire),
            RegistrationState::Unregistered as u8
        );
    }

    #[test]
    fn deregister_unknown_client_is_a_no_op() {
        let collector = Collector::new();
        let client = FakeClient::new();
        let client_ref: &'static FakeClient = unsafe { &*(Arc::as_ptr(&client)) };
        collector.deregister(client_ref);
        assert_eq!(
            client.state.load(Ordering::Acquire),
            RegistrationState::Unregistered as u8
        );
    }
}
