//! Copy-on-write byte buffers.
//!
//! A [`SharedBuffer`] starts as a cheap reference-counted view, and clones
//! of a shared view share its storage. The first call to
//! [`SharedBuffer::make_mut`] takes the storage over when no other clone
//! holds it and materializes a private copy otherwise, so readers holding
//! other clones never observe the mutation.
//!
//! Once mutable, a buffer owns its bytes: cloning it copies them. Call
//! [`SharedBuffer::freeze`] to go back to cheap clones.

use std::ops::Deref;

use bytes::{Bytes, BytesMut};

#[derive(Clone)]
enum Repr {
    Shared(Bytes),
    Owned(BytesMut),
}

/// Reference-counted payload with copy on first write.
#[derive(Clone)]
pub struct SharedBuffer {
    repr: Repr,
}

impl SharedBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            repr: Repr::Shared(Bytes::new()),
        }
    }

    /// Wraps static data without copying.
    #[must_use]
    pub fn from_static(data: &'static [u8]) -> Self {
        Self {
            repr: Repr::Shared(Bytes::from_static(data)),
        }
    }

    /// Copies `data` into a new buffer.
    #[must_use]
    pub fn copy_from_slice(data: &[u8]) -> Self {
        Self {
            repr: Repr::Shared(Bytes::copy_from_slice(data)),
        }
    }

    /// Returns a mutable view, copying the payload first if another clone
    /// still refers to it.
    pub fn make_mut(&mut self) -> &mut BytesMut {
        if let Repr::Shared(bytes) = &mut self.repr {
            let owned = std::mem::take(bytes)
                .try_into_mut()
                .unwrap_or_else(|shared| BytesMut::from(shared.as_ref()));
            self.repr = Repr::Owned(owned);
        }
        match &mut self.repr {
            Repr::Owned(buf) => buf,
            Repr::Shared(_) => unreachable!("materialized above"),
        }
    }

    /// Converts into an immutable, cheaply clonable [`Bytes`].
    #[must_use]
    pub fn freeze(self) -> Bytes {
        match self.repr {
            Repr::Shared(bytes) => bytes,
            Repr::Owned(buf) => buf.freeze(),
        }
    }

    /// Returns `true` until the first [`make_mut`](Self::make_mut).
    #[must_use]
    pub fn is_shared(&self) -> bool {
        matches!(self.repr, Repr::Shared(_))
    }

    /// Payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self[..].len()
    }

    /// Returns `true` if the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SharedBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for SharedBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match &self.repr {
            Repr::Shared(bytes) => &bytes[..],
            Repr::Owned(buf) => &buf[..],
        }
    }
}

impl AsRef<[u8]> for SharedBuffer {
    fn as_ref(&self) -> &[u8] {
        self
    }
}

impl From<Bytes> for SharedBuffer {
    fn from(bytes: Bytes) -> Self {
        Self {
            repr: Repr::Shared(bytes),
        }
    }
}

impl From<Vec<u8>> for SharedBuffer {
    fn from(data: Vec<u8>) -> Self {
        Bytes::from(data).into()
    }
}

impl From<SharedBuffer> for Bytes {
    fn from(buf: SharedBuffer) -> Self {
        buf.freeze()
    }
}

impl PartialEq for SharedBuffer {
    fn eq(&self, other: &Self) -> bool {
        self[..] == other[..]
    }
}

impl Eq for SharedBuffer {}

impl PartialEq<[u8]> for SharedBuffer {
    fn eq(&self, other: &[u8]) -> bool {
        &self[..] == other
    }
}

impl std::fmt::Debug for SharedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedBuffer")
            .field("len", &self.len())
            .field("shared", &self.is_shared())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_shares_storage() {
        let a = SharedBuffer::from(vec![1, 2, 3]);
        let b = a.clone();
        assert_eq!(a.as_ptr(), b.as_ptr());
        assert!(b.is_shared());
    }

    #[test]
    fn test_copy_on_first_write() {
        let original = SharedBuffer::from_static(b"hello");
        let mut copy = original.clone();

        copy.make_mut()[0] = b'j';
        assert!(!copy.is_shared());
        assert_eq!(&copy[..], b"jello");
        assert_eq!(&original[..], b"hello");

        copy.make_mut().extend_from_slice(b"!");
        assert_eq!(copy.len(), 6);
        assert_eq!(copy.freeze(), Bytes::from_static(b"jello!"));
    }

    #[test]
    fn test_unique_buffer_mutates_in_place() {
        let mut buf = SharedBuffer::copy_from_slice(b"abc");
        let ptr = buf.as_ptr();
        buf.make_mut()[0] = b'x';
        assert_eq!(buf.as_ptr(), ptr);
        assert_eq!(&buf[..], b"xbc");
    }

    #[test]
    fn test_clone_of_mutable_buffer_is_a_copy() {
        let mut a = SharedBuffer::copy_from_slice(b"abc");
        a.make_mut();
        let b = a.clone();
        assert_ne!(a.as_ptr(), b.as_ptr());
        a.make_mut()[0] = b'z';
        assert_eq!(&b[..], b"abc");
    }

    #[test]
    fn test_freeze_shared_is_zero_copy() {
        let bytes = Bytes::from_static(b"abc");
        let buf = SharedBuffer::from(bytes.clone());
        assert_eq!(buf.freeze().as_ptr(), bytes.as_ptr());
    }

    #[test]
    fn test_equality_and_empty() {
        assert!(SharedBuffer::new().is_empty());
        let a = SharedBuffer::copy_from_slice(b"xyz");
        let mut b = a.clone();
        b.make_mut();
        assert_eq!(a, b);
        assert!(a == b"xyz"[..]);
    }
}
