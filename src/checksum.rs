//! The running checksum, carried on the processor itself rather than on
//! either buffer segment. There is exactly one running digest regardless
//! of which segment is currently active.

use crc::{Crc, Digest, CRC_16_IBM_SDLC, CRC_32_ISCSI, CRC_64_XZ};

/// Which checksum algorithm (if any) a processor should maintain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hash {
    None,
    Crc16,
    Crc32c,
    Crc64,
}

static CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_SDLC);
static CRC32C: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);
static CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_XZ);

enum Running {
    None,
    Crc16(Digest<'static, u16>),
    Crc32c(Digest<'static, u32>),
    Crc64(Digest<'static, u64>),
}

/// Running digest state for a single message. Lives on the processor, not
/// on either buffer segment.
pub(crate) struct ChecksumState {
    hash: Hash,
    running: Running,
    enabled: bool,
}

impl ChecksumState {
    pub(crate) fn new(hash: Hash) -> Self {
        let mut state = ChecksumState {
            hash,
            running: Running::None,
            enabled: true,
        };
        state.reset();
        state
    }

    /// Size in bytes of the finalized digest, or 0 when no hash is configured.
    pub(crate) fn digest_size(&self) -> usize {
        match self.hash {
            Hash::None => 0,
            Hash::Crc16 => 2,
            Hash::Crc32c => 4,
            Hash::Crc64 => 8,
        }
    }

    /// Starts a fresh running digest for the next message and re-enables updates.
    pub(crate) fn reset(&mut self) {
        self.running = match self.hash {
            Hash::None => Running::None,
            Hash::Crc16 => Running::Crc16(CRC16.digest()),
            Hash::Crc32c => Running::Crc32c(CRC32C.digest()),
            Hash::Crc64 => Running::Crc64(CRC64.digest()),
        };
        self.enabled = true;
    }

    /// Feeds `data` into the running digest unless updates are currently disabled.
    pub(crate) fn update(&mut self, data: &[u8]) {
        if !self.enabled {
            return;
        }
        match &mut self.running {
            Running::None => {}
            Running::Crc16(d) => d.update(data),
            Running::Crc32c(d) => d.update(data),
            Running::Crc64(d) => d.update(data),
        }
    }

    /// Stops feeding the running digest. Set just before the trailer itself
    /// is written or read, so the digest bytes never hash themselves.
    pub(crate) fn disable(&mut self) {
        self.enabled = false;
    }

    pub(crate) fn enabled(&self) -> bool {
        self.enabled
    }

    /// Consumes the running digest, returning its little-endian bytes.
    /// Callers must `reset` before starting the next message.
    pub(crate) fn finalize(&mut self) -> Vec<u8> {
        match std::mem::replace(&mut self.running, Running::None) {
            Running::None => Vec::new(),
            Running::Crc16(d) => d.finalize().to_le_bytes().to_vec(),
            Running::Crc32c(d) => d.finalize().to_le_bytes().to_vec(),
            Running::Crc64(d) => d.finalize().to_le_bytes().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_hash_has_zero_digest_size() {
        let state = ChecksumState::new(Hash::None);
        assert_eq!(state.digest_size(), 0);
    }

    #[test]
    fn crc32c_digest_matches_known_vector() {
        // "123456789" is the standard CRC check string; CRC-32C (Castagnoli)
        // of it is the well-known value 0xE3069283.
        let mut state = ChecksumState::new(Hash::Crc32c);
        state.update(b"123456789");
        let bytes = state.finalize();
        assert_eq!(bytes, 0xE3069283u32.to_le_bytes());
    }

    #[test]
    fn disable_stops_further_updates() {
        let mut state = ChecksumState::new(Hash::Crc32c);
        state.update(b"123456789");
        state.disable();
        state.update(b"extra bytes that must not count");
        let bytes = state.finalize();
        assert_eq!(bytes, 0xE3069283u32.to_le_bytes());
    }

    #[test]
    fn reset_starts_a_fresh_digest() {
        let mut state = ChecksumState::new(Hash::Crc32c);
        state.update(b"garbage");
        state.reset();
        state.update(b"123456789");
        let bytes = state.finalize();
        assert_eq!(bytes, 0xE3069283u32.to_le_bytes());
    }
}
