//! Raw futex wait/wake wrappers.
//!
//! Thin syscall wrappers used by [`crate::event::BinaryEvent`] to put the
//! collector thread to sleep without spinning. Nothing above this module
//! should call `libc::syscall` directly.

#[cfg(target_os = "linux")]
mod linux {
    use std::sync::atomic::AtomicI32;

    // linux/futex.h — not re-exported consistently across libc versions,
    // so these are spelled out the way the original C++ did with
    // <linux/futex.h>.
    const FUTEX_WAIT: i32 = 0;
    const FUTEX_WAKE: i32 = 1;
    const FUTEX_PRIVATE_FLAG: i32 = 128;

    /// Wakes up to `count` threads blocked in [`futex_wait`] on `word`.
    pub(crate) fn futex_wake(word: &AtomicI32, count: i32) {
        unsafe {
            libc::syscall(
                libc::SYS_futex,
                word as *const AtomicI32,
                FUTEX_WAKE | FUTEX_PRIVATE_FLAG,
                count,
                std::ptr::null::<libc::timespec>(),
                std::ptr::null::<i32>(),
                0,
            );
        }
    }

    /// Blocks while `*word == expected`. Returns as soon as the kernel
    /// observes a different value, either because of a wake or a spurious
    /// return; callers must re-check the word themselves.
    pub(crate) fn futex_wait(word: &AtomicI32, expected: i32) {
        unsafe {
            libc::syscall(
                libc::SYS_futex,
                word as *const AtomicI32,
                FUTEX_WAIT | FUTEX_PRIVATE_FLAG,
                expected,
                std::ptr::null::<libc::timespec>(),
                std::ptr::null::<i32>(),
                0,
            );
        }
    }
}

#[cfg(target_os = "linux")]
pub(crate) use linux::{futex_wait, futex_wake};
