//! A buffer-backed RPC serialization processor.
//!
//! A [`Processor`] drives one traversal over a value (encode, decode, or
//! free) through a single pair of buffer segments: a caller-owned
//! primary segment and, once that overflows, an engine-owned spill
//! segment that grows a page at a time. An optional running checksum
//! (CRC16, CRC32C, or CRC64) can be carried alongside the traversal and
//! finalized or verified with [`Processor::flush`].
//!
//! ```
//! use wireproc::{Hash, Op, Processor};
//!
//! let mut buf = [0u8; 64];
//! {
//!     let mut proc = Processor::create_set((), &mut buf, Op::Encode, Hash::Crc32c).unwrap();
//!     let mut value = 7u32;
//!     proc.u32(&mut value).unwrap();
//!     proc.flush().unwrap();
//! }
//! let mut proc = Processor::create_set((), &mut buf, Op::Decode, Hash::Crc32c).unwrap();
//! let mut decoded = 0u32;
//! proc.u32(&mut decoded).unwrap();
//! proc.flush().unwrap();
//! assert_eq!(decoded, 7);
//! ```

mod checksum;
mod error;
mod processor;
mod segment;
mod string;

pub use checksum::Hash;
pub use error::{ProcError, Result};
pub use processor::{reclaim_extra_buf, Op, Processor};
pub use string::StringObject;

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::quickcheck;

    fn round_trip_bytes(hash: Hash, data: &[u8]) -> bool {
        let mut buf = vec![0u8; data.len() + 4096];
        {
            let mut proc = Processor::create_set((), &mut buf, Op::Encode, hash).unwrap();
            let mut len = data.len() as u64;
            proc.u64(&mut len).unwrap();
            let mut payload = data.to_vec();
            proc.raw(&mut payload).unwrap();
            proc.flush().unwrap();
        }
        let mut proc = Processor::create_set((), &mut buf, Op::Decode, hash).unwrap();
        let mut len = 0u64;
        proc.u64(&mut len).unwrap();
        let mut payload = vec![0u8; len as usize];
        proc.raw(&mut payload).unwrap();
        proc.flush().unwrap();
        payload == data
    }

    quickcheck! {
        fn byte_strings_round_trip_under_every_hash(data: Vec<u8>) -> bool {
            [Hash::None, Hash::Crc16, Hash::Crc32c, Hash::Crc64]
                .into_iter()
                .all(|hash| round_trip_bytes(hash, &data))
        }
    }

    #[test]
    fn create_set_then_reset_reuses_the_processor() {
        let mut buf = [0u8; 32];
        let mut proc = Processor::create_set((), &mut buf, Op::Encode, Hash::None).unwrap();
        let mut first = 1u8;
        proc.u8(&mut first).unwrap();

        let mut other = [0u8; 32];
        proc.reset(Some(&mut other), Op::Decode).unwrap();
        assert_eq!(proc.op(), Some(Op::Decode));
        assert_eq!(proc.size_used(), 0);
    }
}
