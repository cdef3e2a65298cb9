//! The two buffer segments a processor writes through: the caller-owned
//! primary and the engine-owned spill, plus the page-rounded growth policy
//! shared by both.

use std::sync::OnceLock;

use crate::error::{ProcError, Result};

static PAGE_SIZE: OnceLock<usize> = OnceLock::new();

fn page_size_bytes() -> usize {
    *PAGE_SIZE.get_or_init(page_size::get)
}

/// Rounds `requested` up to a page boundary. Always adds at least one full
/// page, even when `requested` already sits on a page boundary, so every
/// growth call site gets a new size strictly larger than the old one.
pub(crate) fn round_to_page(requested: usize) -> usize {
    let page = page_size_bytes();
    (requested / page + 1) * page
}

/// The caller-supplied primary segment. Absent only while the processor is
/// bound for a `Free` pass with no buffer at all.
pub(crate) struct Primary<'buf> {
    pub(crate) buf: Option<&'buf mut [u8]>,
    pub(crate) cursor: usize,
}

impl Primary<'_> {
    pub(crate) fn capacity(&self) -> usize {
        self.buf.as_ref().map_or(0, |b| b.len())
    }

    pub(crate) fn remaining(&self) -> usize {
        self.capacity() - self.cursor
    }
}

/// The engine-owned spill segment, allocated the first time a message
/// overflows the primary. `owned` tracks whether dropping this value
/// should free the underlying allocation (the normal case) or leak it
/// because ownership was handed to the caller via
/// [`crate::Processor::set_extra_buf_is_mine`].
pub(crate) struct Spill {
    pub(crate) buf: Option<Vec<u8>>,
    pub(crate) cursor: usize,
    pub(crate) owned: bool,
}

impl Spill {
    pub(crate) fn empty() -> Self {
        Spill {
            buf: None,
            cursor: 0,
            owned: true,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.buf.as_ref().map_or(0, |b| b.len())
    }

    /// The underlying `Vec`'s true allocation capacity, which can exceed
    /// `capacity()` since `try_reserve_exact` only guarantees at least the
    /// requested size.
    pub(crate) fn real_capacity(&self) -> usize {
        self.buf.as_ref().map_or(0, |b| b.capacity())
    }

    pub(crate) fn remaining(&self) -> usize {
        self.capacity() - self.cursor
    }

    /// Grows (or allocates, if absent) the spill to `new_size`, preserving
    /// any bytes already written through `primary_cursor_bytes` on first
    /// overflow. Returns [`ProcError::NoMemory`] if the allocator can't
    /// satisfy the request instead of aborting the process.
    pub(crate) fn grow(&mut self, new_size: usize, primary: &Primary<'_>) -> Result<()> {
        match self.buf.as_mut() {
            None => {
                let mut new_buf = Vec::new();
                new_buf.try_reserve_exact(new_size).map_err(|_| {
                    log::error!("wireproc: failed to allocate {new_size} bytes for spill buffer");
                    ProcError::NoMemory
                })?;
                new_buf.resize(new_size, 0);
                if let Some(src) = primary.buf.as_ref() {
                    new_buf[..primary.cursor].copy_from_slice(&src[..primary.cursor]);
                }
                self.cursor = primary.cursor;
                self.buf = Some(new_buf);
                self.owned = true;
            }
            Some(existing) => {
                let additional = new_size.saturating_sub(existing.capacity());
                existing.try_reserve_exact(additional).map_err(|_| {
                    log::error!("wireproc: failed to grow spill buffer to {new_size} bytes");
                    ProcError::NoMemory
                })?;
                existing.resize(new_size, 0);
            }
        }
        Ok(())
    }
}

impl Drop for Spill {
    fn drop(&mut self) {
        if !self.owned {
            if let Some(buf) = self.buf.take() {
                // Ownership was transferred to the caller via
                // `set_extra_buf_is_mine`; the pointer handed out by
                // `extra_buf` must stay valid after this processor is gone.
                std::mem::forget(buf);
            }
        }
    }
}
