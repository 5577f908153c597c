//! End-to-end scenarios exercising a domain's full life cycle, with and
//! without a background collector.

use bd_hazard_smr::collector::{Collector, CollectorClient};
use bd_hazard_smr::domain::Domain;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

struct DropCounter<'a> {
    count: &'a AtomicUsize,
}

impl Drop for DropCounter<'_> {
    fn drop(&mut self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn single_threaded_life_cycle() {
    let domain: Domain<String> = Domain::new();

    let s0 = Box::into_raw(Box::new(String::from("s0")));
    let s1 = Box::into_raw(Box::new(String::from("s1")));
    let s2 = Box::into_raw(Box::new(String::from("s2")));

    let h0 = domain.acquire();
    h0.protect(&AtomicPtr::new(s0));
    let h1 = domain.acquire();
    h1.protect(&AtomicPtr::new(s1));
    let mut h2 = domain.acquire();
    h2.protect(&AtomicPtr::new(s2));

    h2.retire();
    domain.collect();

    assert!(!domain.has_retired());
    assert_eq!(unsafe { &*h0.get() }, "s0");
    assert_eq!(unsafe { &*h1.get() }, "s1");

    drop(h0);
    drop(h1);
    unsafe {
        drop(Box::from_raw(s0));
        drop(Box::from_raw(s1));
    }
}

#[test]
fn live_protection_defers_free() {
    let drop_count = AtomicUsize::new(0);
    let domain: Domain<DropCounter> = Domain::new();

    let p = Box::into_raw(Box::new(DropCounter { count: &drop_count }));
    let published = AtomicPtr::new(p);

    let holder = domain.acquire();
    holder.protect(&published);

    let mut retirer = domain.acquire();
    retirer.protect(&published);
    retirer.retire();

    domain.collect();
    assert_eq!(drop_count.load(Ordering::SeqCst), 0, "p is still protected by holder");

    drop(holder);
    domain.collect();
    assert_eq!(drop_count.load(Ordering::SeqCst), 1, "delete(p) called exactly once");
}

#[test]
fn async_collector_wakeup_drains_a_thousand_retirees() {
    static DROPS: AtomicUsize = AtomicUsize::new(0);

    struct Counted;
    impl Drop for Counted {
        fn drop(&mut self) {
            DROPS.fetch_add(1, Ordering::SeqCst);
        }
    }

    let domain: &'static Domain<Counted> = Box::leak(Box::new(Domain::new()));
    let collector: &'static Collector = Box::leak(Box::new(Collector::new()));
    collector.start();
    domain.register(collector);

    for _ in 0..1000 {
        let ptr = Box::into_raw(Box::new(Counted));
        let mut handle = domain.acquire();
        handle.protect(&AtomicPtr::new(ptr));
        handle.retire();
    }

    let deadline = Instant::now() + Duration::from_secs(1);
    while DROPS.load(Ordering::SeqCst) < 1000 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }

    assert_eq!(DROPS.load(Ordering::SeqCst), 1000);
    domain.deregister();
    collector.stop(true);
}

#[test]
fn registration_race_leaves_client_unregistered() {
    let domain: &'static Domain<u32> = Box::leak(Box::new(Domain::new()));
    let collector: &'static Collector = Box::leak(Box::new(Collector::new()));
    collector.start();
    domain.register(collector);

    for _ in 0..64 {
        let ptr = Box::into_raw(Box::new(7u32));
        let mut handle = domain.acquire();
        handle.protect(&AtomicPtr::new(ptr));
        handle.retire();
    }

    let deregisterer = std::thread::spawn(move || {
        domain.deregister();
    });
    deregisterer.join().unwrap();

    assert_eq!(domain.registration_state().load(Ordering::Acquire), 0);

    collector.stop(true);
}

#[test]
fn preemptive_teardown_deletes_everything() {
    static DROPS: AtomicUsize = AtomicUsize::new(0);

    struct Counted;
    impl Drop for Counted {
        fn drop(&mut self) {
            DROPS.fetch_add(1, Ordering::SeqCst);
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

    drop(domain);
    assert_eq!(DROPS.load(Ordering::SeqCst), 32);
}

// Binary event coalescing (5 posts, 1 wait, a subsequent wait blocks) is
// covered directly by `src/event.rs`'s own unit tests; `BinaryEvent` is
// crate-private, so it cannot be exercised from here. Its coalescing
// behaviour is exercised indirectly above through the collector's own
// wake/sleep cycle in `async_collector_wakeup_drains_a_thousand_retirees`.
