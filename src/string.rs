//! String objects: a length-prefixed, NUL-terminated byte string plus two
//! ownership flags, encoded/decoded/freed through one shared inner codec.

use crate::error::{ProcError, Result};
use crate::processor::{Op, Processor};

enum Payload<'a> {
    Empty,
    Borrowed(&'a [u8]),
    Owned(Box<[u8]>),
}

/// A string value as it travels through a processor.
///
/// A borrowed value never gets freed by `Free`, an owned value releases
/// its allocation, and an already-freed (or never populated) value fails
/// a second `Free` instead of silently succeeding.
pub struct StringObject<'a> {
    payload: Payload<'a>,
}

impl<'a> StringObject<'a> {
    fn empty() -> Self {
        StringObject { payload: Payload::Empty }
    }

    /// Wraps a borrowed string for encoding, or for a `Free` pass where the
    /// processor should not take ownership of it.
    pub fn from_borrowed(s: &'a str) -> Self {
        StringObject { payload: Payload::Borrowed(s.as_bytes()) }
    }

    /// Wraps an owned string, for a `Free` pass that should release it.
    pub fn from_owned(s: String) -> Self {
        StringObject {
            payload: Payload::Owned(s.into_bytes().into_boxed_slice()),
        }
    }

    /// Consumes a decoded string object into a Rust `String`. Returns
    /// `None` if the object carries no data (never decoded, or already
    /// freed).
    pub fn into_string(self) -> Option<Result<String>> {
        let bytes: Vec<u8> = match self.payload {
            Payload::Empty => return None,
            Payload::Borrowed(b) => b.to_vec(),
            Payload::Owned(b) => b.into_vec(),
        };
        Some(String::from_utf8(bytes).map_err(|_| ProcError::InvalidUtf8))
    }
}

impl<'buf, C> Processor<'buf, C> {
    /// The shared three-mode codec for a string object: writes a
    /// little-endian `u64` length (including the wire NUL terminator),
    /// the bytes themselves, and the two ownership flags, in that order.
    /// `Free` never touches the buffer.
    fn string_object(&mut self, obj: &mut StringObject<'_>) -> Result<()> {
        let op = match self.op {
            Some(op) => op,
            None => {
                log::error!("wireproc: string_object() called before reset");
                return Err(ProcError::InvalidParam("processor not reset"));
            }
        };
        match op {
            Op::Encode => {
                let bytes: &[u8] = match &obj.payload {
                    Payload::Borrowed(b) => b,
                    Payload::Owned(b) => b,
                    Payload::Empty => {
                        log::error!("wireproc: cannot encode an empty string object");
                        return Err(ProcError::InvalidParam("string object has no data"));
                    }
                };
                let mut len = bytes.len() as u64 + 1;
                self.u64(&mut len)?;
                let mut wire = Vec::with_capacity(bytes.len() + 1);
                wire.extend_from_slice(bytes);
                wire.push(0);
                self.raw(&mut wire)?;
                let mut is_const = 0u8;
                self.u8(&mut is_const)?;
                let mut is_owned = 0u8;
                self.u8(&mut is_owned)?;
                Ok(())
            }
            Op::Decode => {
                let mut len = 0u64;
                self.u64(&mut len)?;
                let mut wire = vec![0u8; len as usize];
                self.raw(&mut wire)?;
                let mut is_const = 0u8;
                self.u8(&mut is_const)?;
                let mut is_owned = 0u8;
                self.u8(&mut is_owned)?;
                // Decoded data is always engine-owned, regardless of the
                // flags read off the wire.
                let _ = (is_const, is_owned);
                if wire.last() == Some(&0) {
                    wire.pop();
                }
                obj.payload = Payload::Owned(wire.into_boxed_slice());
                Ok(())
            }
            Op::Free => match &obj.payload {
                Payload::Empty => {
                    log::error!("wireproc: string object already freed");
                    Err(ProcError::AlreadyFreed)
                }
                Payload::Borrowed(_) | Payload::Owned(_) => {
                    obj.payload = Payload::Empty;
                    Ok(())
                }
            },
        }
    }

    /// Encodes a borrowed string value.
    pub fn encode_str(&mut self, value: &str) -> Result<()> {
        let mut obj = StringObject::from_borrowed(value);
        self.string_object(&mut obj)
    }

    /// Decodes a string value into a freshly owned `String`.
    pub fn decode_string(&mut self) -> Result<String> {
        let mut obj = StringObject::empty();
        self.string_object(&mut obj)?;
        match obj.into_string() {
            Some(result) => result,
            None => {
                log::error!("wireproc: decode_string() produced no data");
                Err(ProcError::InvalidParam("decode produced no data"))
            }
        }
    }

    /// Runs a `Free` pass over an owned string value, releasing it.
    pub fn free_string(&mut self, value: String) -> Result<()> {
        let mut obj = StringObject::from_owned(value);
        self.string_object(&mut obj)
    }

    /// Runs a `Free` pass over a borrowed string value. Since the
    /// processor never owned the bytes, this only marks the object freed
    /// so a second call is rejected; it does not deallocate anything.
    pub fn free_borrowed_str(&mut self, value: &str) -> Result<()> {
        let mut obj = StringObject::from_borrowed(value);
        self.string_object(&mut obj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::Hash;

    #[test]
    fn string_round_trip() {
        let mut buf = [0u8; 64];
        {
            let mut proc = Processor::create_set((), &mut buf, Op::Encode, Hash::None).unwrap();
            proc.encode_str("hello, wire").unwrap();
        }
        let mut proc = Processor::create_set((), &mut buf, Op::Decode, Hash::None).unwrap();
        let decoded = proc.decode_string().unwrap();
        assert_eq!(decoded, "hello, wire");
    }

    #[test]
    fn string_free_rejects_double_free() {
        let mut proc = Processor::create((), Hash::None).unwrap();
        proc.reset(None, Op::Free).unwrap();
        proc.free_string("owned".to_string()).unwrap();

        let mut obj = StringObject::empty();
        let err = proc.string_object(&mut obj).unwrap_err();
        assert!(matches!(err, ProcError::AlreadyFreed));
    }

    #[test]
    fn empty_string_round_trips() {
        let mut buf = [0u8; 32];
        {
            let mut proc = Processor::create_set((), &mut buf, Op::Encode, Hash::None).unwrap();
            proc.encode_str("").unwrap();
        }
        let mut proc = Processor::create_set((), &mut buf, Op::Decode, Hash::None).unwrap();
        assert_eq!(proc.decode_string().unwrap(), "");
    }
}
