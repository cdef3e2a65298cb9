//! Error kinds returned by the processor, its buffer growth policy, and
//! the per-type codecs built on top of it.

use thiserror::Error;

/// Failure modes a [`crate::Processor`] can report.
///
/// These mirror the error kinds named in the processor's design: a
/// missing or malformed argument (`InvalidParam`), an allocation failure
/// while growing the spill buffer (`NoMemory`), a growth request that
/// would not actually enlarge the buffer (`SizeError`), a checksum
/// mismatch or backend failure (`ChecksumError`), invalid UTF-8 surfaced
/// only because Rust strings must be valid UTF-8 (`InvalidUtf8`), and a
/// double-free on a string object (`AlreadyFreed`).
#[derive(Debug, Error)]
pub enum ProcError {
    #[error("invalid parameter: {0}")]
    InvalidParam(&'static str),

    #[error("could not allocate spill buffer")]
    NoMemory,

    #[error("requested size {requested} does not exceed current capacity {current}")]
    SizeError { requested: usize, current: usize },

    #[error("checksum error: {0}")]
    ChecksumError(&'static str),

    #[error("decoded string was not valid UTF-8")]
    InvalidUtf8,

    #[error("string object was already freed")]
    AlreadyFreed,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ProcError>;
