//! Incremental SHA-1 hashing with a restartable snapshot.
//!
//! Pack reading needs to hash a synthesized `"<type> <len>\0"` header and then
//! the object payload as two separate `update` calls before comparing against
//! the requested id, so the hasher has to support feeding bytes in after a
//! snapshot has already been taken.

use sha1::{Digest, Sha1};

/// Incremental SHA-1 accumulator.
#[derive(Clone, Default)]
pub struct Hasher {
    inner: Sha1,
}

impl Hasher {
    pub fn new() -> Self {
        Self { inner: Sha1::new() }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.inner.update(bytes);
    }

    /// Finalize a clone of the current state, leaving `self` free to accept
    /// more bytes afterwards.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot { inner: self.inner.clone() }
    }
}

/// A point-in-time copy of a [`Hasher`]'s state, consumed by [`Snapshot::finalize`].
pub struct Snapshot {
    inner: Sha1,
}

impl Snapshot {
    pub fn finalize(self) -> [u8; 20] {
        self.inner.finalize().into()
    }
}

/// One-shot convenience hash.
pub fn hash(data: &[u8]) -> [u8; 20] {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.snapshot().finalize()
}
