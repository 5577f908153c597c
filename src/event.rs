//! Binary "event" semaphore used to wake the collector.
//!
//! A [`post`](BinaryEvent::post) coalesces with any pending, unconsumed
//! post; a [`wait`](BinaryEvent::wait) consumes all posts issued since the
//! last wait ("edge-triggered"). See `spec.md` §4.3.
//!
//! On Linux this is backed by a raw futex word (grounded in
//! `examples/original_source/src/Semaphore.hpp`'s `BinarySemaphore`).
//! Everywhere else it falls back to a `Mutex`+`Condvar` pair with the same
//! coalescing semantics, per the design note in `spec.md` §9.

#[cfg(target_os = "linux")]
mod backend {
    use crate::futex;
    use std::sync::atomic::{AtomicI32, Ordering};

    const UNAVAILABLE: i32 = 0;
    const AVAILABLE: i32 = 1;

    pub(crate) struct Inner {
        word: AtomicI32,
    }

    impl Inner {
        pub(crate) fn new(signalled: bool) -> Self {
            Self {
                word: AtomicI32::new(if signalled { AVAILABLE } else { UNAVAILABLE }),
            }
        }

        pub(crate) fn post(&self) {
            if self
                .word
                .compare_exchange(UNAVAILABLE, AVAILABLE, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                futex::futex_wake(&self.word, 1);
            }
        }

        pub(crate) fn wait(&self) {
            loop {
                match self.word.compare_exchange(
                    AVAILABLE,
                    UNAVAILABLE,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => return,
                    Err(observed) => futex::futex_wait(&self.word, observed),
                }
            }
        }

        pub(crate) fn try_wait(&self) -> bool {
            self.word
                .compare_exchange(AVAILABLE, UNAVAILABLE, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        }
    }
}

#[cfg(not(target_os = "linux"))]
mod backend {
    use std::sync::{Condvar, Mutex};

    pub(crate) struct Inner {
        available: Mutex<bool>,
        condvar: Condvar,
    }

    impl Inner {
        pub(crate) fn new(signalled: bool) -> Self {
            Self {
                available: Mutex::new(signalled),
                condvar: Condvar::new(),
            }
        }

        pub(crate) fn post(&self) {
            let mut available = self.available.lock().unwrap();
            if !*available {
                *available = true;
                self.condvar.notify_one();
            }
        }

        pub(crate) fn wait(&self) {
            let mut available = self.available.lock().unwrap();
            while !*available {
                available = self.condvar.wait(available).unwrap();
            }
            *available = false;
        }

        pub(crate) fn try_wait(&self) -> bool {
            let mut available = self.available.lock().unwrap();
            if *available {
                *available = false;
                true
            } else {
                false
            }
        }
    }
}

/// Edge-triggered single-bit signal: `post` is idempotent while unconsumed,
/// `wait` consumes every post issued since the previous `wait`.
pub(crate) struct BinaryEvent {
    inner: backend::Inner,
}

impl BinaryEvent {
    pub(crate) fn new() -> Self {
        Self {
            inner: backend::Inner::new(false),
        }
    }

    /// Make the event available, waking one waiter. No-op if already
    /// available.
    pub(crate) fn post(&self) {
        self.inner.post();
    }

    /// Block until the event is available, then consume it.
    pub(crate) fn wait(&self) {
        self.inner.wait();
    }

    /// Non-blocking `wait`.
    #[cfg_attr(not(test), allow(dead_code))]
    pub(crate) fn try_wait(&self) -> bool {
        self.inner.try_wait()
    }
}
