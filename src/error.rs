//! Error policy (`spec.md` §7).
//!
//! Almost every failure mode in this crate is a contract violation and is
//! handled by fail-fast assertion rather than a `Result`: double-retiring a
//! handle, operating on an already-released handle, or deregistering an
//! unknown client are all programming bugs, not recoverable conditions.
//!
//! The one tabulated failure kind that is not a contract violation —
//! allocation failure in [`crate::domain::Domain::acquire`] — is not
//! represented as a `Result` either: Rust's global allocator aborts the
//! process on exhaustion rather than returning an error, and no fallible
//! allocation API is used anywhere this crate draws on, so there is
//! nothing for a caller to catch. [`SmrError`] exists only so this policy
//! has a named place to live; no operation in this crate returns it today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum SmrError {}

impl std::fmt::Display for SmrError {
    fn fmt(&self, _f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {}
    }
}

impl std::error::Error for SmrError {}
