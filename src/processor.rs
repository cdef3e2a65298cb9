//! The processor itself: one buffer-backed traversal that encodes,
//! decodes, or frees a value depending on which [`Op`] it was reset with.

use crate::checksum::{ChecksumState, Hash};
use crate::error::{ProcError, Result};
use crate::segment::{round_to_page, Primary, Spill};

/// Which of the three traversal modes a processor is currently bound for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Encode,
    Decode,
    Free,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Active {
    Primary,
    Spill,
}

/// A buffer-backed serialization processor.
///
/// `Processor` drives one codec function over a value three ways
/// depending on the bound [`Op`]: `Encode` writes the value's wire
/// representation into the buffer, `Decode` reads it back out, and `Free`
/// releases any resources the value holds without touching the buffer.
/// Writes past the end of the caller-supplied primary segment spill into
/// an engine-owned, page-rounded buffer that grows automatically.
///
/// `C` is an opaque handle to whatever owns this processor (an RPC class,
/// a connection, a context object); the processor never inspects it.
///
/// The primary segment's lifetime `'buf` is fixed by the first buffer
/// passed to [`Processor::reset`] (or [`Processor::create_set`]); every
/// later `reset` call on the same processor must supply a buffer that
/// lives at least that long.
pub struct Processor<'buf, C> {
    class: C,
    op: Option<Op>,
    primary: Primary<'buf>,
    spill: Spill,
    active: Active,
    checksum: ChecksumState,
}

impl<'buf, C> Processor<'buf, C> {
    /// Creates a processor bound to `class`, with no buffer yet. Call
    /// [`Processor::reset`] (or use [`Processor::create_set`]) before
    /// encoding, decoding, or freeing anything.
    pub fn create(class: C, hash: Hash) -> Result<Self> {
        Ok(Processor {
            class,
            op: None,
            primary: Primary { buf: None, cursor: 0 },
            spill: Spill::empty(),
            active: Active::Primary,
            checksum: ChecksumState::new(hash),
        })
    }

    /// `create` followed immediately by `reset` with `buf` and `op`.
    pub fn create_set(class: C, buf: &'buf mut [u8], op: Op, hash: Hash) -> Result<Self> {
        let mut proc = Self::create(class, hash)?;
        proc.reset(Some(buf), op)?;
        Ok(proc)
    }

    /// Rebinds this processor to a new buffer and operation, discarding any
    /// spill buffer and restarting the checksum. `buf` may only be omitted
    /// when `op` is [`Op::Free`] (a free pass never touches the wire).
    pub fn reset(&mut self, buf: Option<&'buf mut [u8]>, op: Op) -> Result<()> {
        if buf.is_none() && op != Op::Free {
            log::error!("wireproc: reset requires a buffer unless op = Free");
            return Err(ProcError::InvalidParam("buffer required unless op = Free"));
        }
        self.op = Some(op);
        self.primary = Primary { buf, cursor: 0 };
        self.spill = Spill::empty();
        self.active = Active::Primary;
        self.checksum.reset();
        Ok(())
    }

    /// Drops this processor. Dropping releases the spill buffer unless
    /// ownership was transferred to the caller via
    /// [`Processor::set_extra_buf_is_mine`], in which case it is leaked so
    /// the pointer handed out by [`Processor::extra_buf`] stays valid.
    pub fn destroy(self) {}

    pub fn class(&self) -> &C {
        &self.class
    }

    pub fn op(&self) -> Option<Op> {
        self.op
    }

    /// Total capacity across both segments.
    pub fn size(&self) -> usize {
        self.primary.capacity() + self.spill.capacity()
    }

    /// Bytes already written/read across both segments.
    ///
    /// Once a spill exists, this is the primary's full capacity (frozen at
    /// the point of overflow) plus the spill's own cursor.
    pub fn size_used(&self) -> usize {
        if self.spill.capacity() > 0 {
            self.primary.capacity() + self.spill.cursor
        } else {
            self.primary.cursor
        }
    }

    /// Bytes remaining in whichever segment is currently active.
    pub fn size_left(&self) -> usize {
        match self.active {
            Active::Primary => self.primary.remaining(),
            Active::Spill => self.spill.remaining(),
        }
    }

    /// Requests that total capacity reach at least `requested` bytes,
    /// rounded up to a page. Fails with [`ProcError::SizeError`] if the
    /// rounded size would not exceed current capacity, or
    /// [`ProcError::NoMemory`] if the allocation itself fails.
    pub fn set_size(&mut self, requested: usize) -> Result<()> {
        let current_total = self.size();
        let new_size = round_to_page(requested);
        if new_size <= current_total {
            log::error!(
                "wireproc: growth to {requested} (rounded {new_size}) does not exceed current {current_total}"
            );
            return Err(ProcError::SizeError {
                requested,
                current: current_total,
            });
        }
        self.spill.grow(new_size, &self.primary)?;
        self.active = Active::Spill;
        Ok(())
    }

    fn grow_for(&mut self, additional: usize) -> Result<()> {
        let requested = self.size() + additional;
        self.set_size(requested)
    }

    fn active_remaining(&self) -> usize {
        match self.active {
            Active::Primary => self.primary.remaining(),
            Active::Spill => self.spill.remaining(),
        }
    }

    fn active_region(&mut self, n: usize) -> Result<&mut [u8]> {
        match self.active {
            Active::Primary => {
                let cursor = self.primary.cursor;
                let buf = self.primary.buf.as_mut().ok_or_else(|| {
                    log::error!("wireproc: no primary buffer bound");
                    ProcError::InvalidParam("no primary buffer bound")
                })?;
                if cursor + n > buf.len() {
                    log::error!("wireproc: primary segment overflow");
                    return Err(ProcError::InvalidParam("segment overflow"));
                }
                self.primary.cursor += n;
                Ok(&mut buf[cursor..cursor + n])
            }
            Active::Spill => {
                let cursor = self.spill.cursor;
                let buf = self.spill.buf.as_mut().ok_or_else(|| {
                    log::error!("wireproc: no spill buffer bound");
                    ProcError::InvalidParam("no spill buffer bound")
                })?;
                if cursor + n > buf.len() {
                    log::error!("wireproc: spill segment overflow");
                    return Err(ProcError::InvalidParam("segment overflow"));
                }
                self.spill.cursor += n;
                Ok(&mut buf[cursor..cursor + n])
            }
        }
    }

    /// Reserves `n` bytes in the active segment, growing it first if
    /// necessary, and returns a direct view onto them. A codec that writes
    /// through this slice bypasses the running checksum and must call
    /// [`Processor::restore_ptr`] with the bytes it wrote (or read) so
    /// they're still accounted for.
    ///
    /// Because the returned slice borrows `self` mutably, it cannot be
    /// held across any later call that might grow the buffer; the borrow
    /// checker enforces this at compile time.
    pub fn save_ptr(&mut self, n: usize) -> Result<&mut [u8]> {
        if n > 0 && self.active_remaining() < n {
            self.grow_for(n)?;
        }
        self.active_region(n)
    }

    /// Feeds bytes written or read through a [`Processor::save_ptr`] slice
    /// into the running checksum. Performs no cursor movement of its own.
    pub fn restore_ptr(&mut self, data: &[u8]) -> Result<()> {
        self.checksum.update(data);
        Ok(())
    }

    /// Copies `data` into the buffer (`Op::Encode`) or out of it
    /// (`Op::Decode`), growing the active segment as needed, and feeds the
    /// bytes into the running checksum. A no-op under `Op::Free`.
    pub fn raw(&mut self, data: &mut [u8]) -> Result<()> {
        let op = match self.op {
            Some(op) => op,
            None => {
                log::error!("wireproc: raw() called before reset");
                return Err(ProcError::InvalidParam("processor not reset"));
            }
        };
        if op == Op::Free {
            return Ok(());
        }
        let n = data.len();
        if n > 0 && self.active_remaining() < n {
            self.grow_for(n)?;
        }
        match op {
            Op::Encode => {
                let dst = self.active_region(n)?;
                dst.copy_from_slice(data);
            }
            Op::Decode => {
                let src = self.active_region(n)?;
                data.copy_from_slice(src);
            }
            Op::Free => unreachable!("handled above"),
        }
        self.checksum.update(data);
        Ok(())
    }

    /// Alias for [`Processor::raw`]: a plain byte sequence is already its
    /// own wire representation, so there is no separate memcpy step here.
    pub fn memcpy(&mut self, data: &mut [u8]) -> Result<()> {
        self.raw(data)
    }

    /// Returns the raw pointer backing the spill buffer, or `None` if no
    /// spill has been allocated yet. Valid only while the spill is alive;
    /// see [`Processor::set_extra_buf_is_mine`] to extend that lifetime
    /// past this processor's own.
    pub fn extra_buf(&mut self) -> Option<*mut u8> {
        self.spill.buf.as_mut().map(|v| v.as_mut_ptr())
    }

    /// Total capacity of the spill buffer, or 0 if none has been allocated.
    pub fn extra_size(&self) -> usize {
        self.spill.capacity()
    }

    /// The spill buffer's true allocation capacity, or 0 if none has been
    /// allocated. This is the value [`reclaim_extra_buf`] needs, not
    /// [`Processor::extra_size`]: `try_reserve_exact` only guarantees a
    /// capacity greater than or equal to the requested size, so the two
    /// can differ.
    pub fn extra_buf_capacity(&self) -> usize {
        self.spill.real_capacity()
    }

    /// Transfers ownership of the spill buffer to the caller (`theirs =
    /// true`) or back to this processor (`theirs = false`). When
    /// transferred, dropping this processor leaks the allocation instead
    /// of freeing it, so a pointer obtained from [`Processor::extra_buf`]
    /// stays valid; reclaim it later with
    /// [`Processor::reclaim_extra_buf`].
    pub fn set_extra_buf_is_mine(&mut self, theirs: bool) -> Result<()> {
        if self.spill.buf.is_none() {
            log::error!("wireproc: no spill buffer to transfer ownership of");
            return Err(ProcError::InvalidParam("no spill buffer allocated"));
        }
        self.spill.owned = !theirs;
        Ok(())
    }

    /// Finalizes (`Op::Encode`) or verifies (`Op::Decode`) the running
    /// checksum by writing/reading its trailing bytes. A no-op under
    /// `Op::Free`, when no hash is configured, or on a second call for the
    /// same message (checksum updates are already disabled by then).
    pub fn flush(&mut self) -> Result<()> {
        if !self.checksum.enabled() {
            return Ok(());
        }
        self.checksum.disable();
        let digest_size = self.checksum.digest_size();
        if digest_size == 0 {
            return Ok(());
        }
        match self.op {
            None => {
                log::error!("wireproc: flush() called before reset");
                Err(ProcError::InvalidParam("processor not reset"))
            }
            Some(Op::Free) => Ok(()),
            Some(Op::Encode) => {
                let mut digest = self.checksum.finalize();
                self.raw(&mut digest)
            }
            Some(Op::Decode) => {
                let mut received = vec![0u8; digest_size];
                self.raw(&mut received)?;
                let computed = self.checksum.finalize();
                if received != computed {
                    log::error!("wireproc: checksum mismatch on decode");
                    return Err(ProcError::ChecksumError("digest mismatch"));
                }
                Ok(())
            }
        }
    }
}

macro_rules! primitive_codec {
    ($name:ident, $ty:ty) => {
        impl<'buf, C> Processor<'buf, C> {
            #[doc = concat!("Encodes, decodes, or frees a `", stringify!($ty), "` in place.")]
            pub fn $name(&mut self, value: &mut $ty) -> Result<()> {
                let mut bytes = value.to_le_bytes();
                self.raw(&mut bytes)?;
                if matches!(self.op, Some(Op::Decode)) {
                    *value = <$ty>::from_le_bytes(bytes);
                }
                Ok(())
            }
        }
    };
}

primitive_codec!(u8, u8);
primitive_codec!(u16, u16);
primitive_codec!(u32, u32);
primitive_codec!(u64, u64);
primitive_codec!(i8, i8);
primitive_codec!(i16, i16);
primitive_codec!(i32, i32);
primitive_codec!(i64, i64);

/// Reconstructs the `Vec<u8>` behind a pointer previously leaked via
/// [`Processor::set_extra_buf_is_mine`]`(true)`. A free function rather
/// than an associated one, since it needs neither the processor's class
/// handle type nor its buffer lifetime.
///
/// # Safety
/// `ptr` and `capacity` must be exactly the pointer and
/// [`Processor::extra_buf_capacity`] observed from that transfer (not
/// [`Processor::extra_size`], which can be smaller than the Vec's actual
/// allocation), and must not already have been reclaimed.
pub unsafe fn reclaim_extra_buf(ptr: *mut u8, capacity: usize) -> Vec<u8> {
    unsafe { Vec::from_raw_parts(ptr, capacity, capacity) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_without_buffer_requires_free() {
        let mut proc = Processor::create((), Hash::None).unwrap();
        assert!(proc.reset(None, Op::Encode).is_err());
        assert!(proc.reset(None, Op::Free).is_ok());
    }

    #[test]
    fn primitive_round_trip() {
        let mut buf = [0u8; 64];
        let mut value = 42u32;
        {
            let mut proc = Processor::create_set((), &mut buf, Op::Encode, Hash::None).unwrap();
            proc.u32(&mut value).unwrap();
        }
        let mut decoded = 0u32;
        let mut proc = Processor::create_set((), &mut buf, Op::Decode, Hash::None).unwrap();
        proc.u32(&mut decoded).unwrap();
        assert_eq!(decoded, 42);
    }

    #[test]
    fn overflow_spills_into_engine_owned_buffer() {
        let mut small = [0u8; 4];
        let mut proc = Processor::create_set((), &mut small, Op::Encode, Hash::None).unwrap();
        let mut value = 0xdead_beefu32;
        proc.u32(&mut value).unwrap();
        assert_eq!(proc.size_left(), 0);
        let mut second = 0x1234_5678u32;
        proc.u32(&mut second).unwrap();
        assert!(proc.extra_size() > 0);
        // Once the spill exists, `size_used` counts the whole (now frozen)
        // primary capacity plus the spill's cursor, which itself already
        // includes the 4-byte prefix copied over from the primary: 4 + 8.
        assert_eq!(proc.size_used(), 12);
    }

    #[test]
    fn set_size_rejects_non_growing_requests() {
        let mut buf = [0u8; 4096];
        let mut proc = Processor::create_set((), &mut buf, Op::Encode, Hash::None).unwrap();
        let err = proc.set_size(10).unwrap_err();
        assert!(matches!(err, ProcError::SizeError { .. }));
    }

    #[test]
    fn flush_detects_checksum_mismatch() {
        let mut buf = [0u8; 64];
        {
            let mut proc =
                Processor::create_set((), &mut buf, Op::Encode, Hash::Crc32c).unwrap();
            let mut value = 7u64;
            proc.u64(&mut value).unwrap();
            proc.flush().unwrap();
        }
        buf[0] ^= 0xff;
        let mut proc = Processor::create_set((), &mut buf, Op::Decode, Hash::Crc32c).unwrap();
        let mut value = 0u64;
        proc.u64(&mut value).unwrap();
        assert!(matches!(proc.flush(), Err(ProcError::ChecksumError(_))));
    }

    #[test]
    fn flush_is_idempotent() {
        let mut buf = [0u8; 64];
        let mut proc = Processor::create_set((), &mut buf, Op::Encode, Hash::Crc32c).unwrap();
        let mut value = 1u8;
        proc.u8(&mut value).unwrap();
        proc.flush().unwrap();
        proc.flush().unwrap();
    }

    #[test]
    fn extra_buf_survives_ownership_transfer() {
        let mut small = [0u8; 1];
        let (ptr, capacity) = {
            let mut proc = Processor::create_set((), &mut small, Op::Encode, Hash::None).unwrap();
            let mut value = 0xdead_beefu32;
            proc.u32(&mut value).unwrap();
            proc.set_extra_buf_is_mine(true).unwrap();
            let ptr = proc.extra_buf().unwrap();
            let capacity = proc.extra_buf_capacity();
            (ptr, capacity)
            // `proc` drops here; the spill must not be freed.
        };
        let reclaimed = unsafe { reclaim_extra_buf(ptr, capacity) };
        assert_eq!(&reclaimed[..4], &0xdead_beefu32.to_le_bytes());
    }
}
