//! [`ObjectId`]: the 20-byte SHA-1 identity of a Git object.

use crate::error::{GitError, Result};
use std::fmt;

/// A type-level tag describing what kind of object an [`ObjectId`] is expected
/// to name. Purely a hint for typed reads; it does not affect equality,
/// ordering, or hashing of the id itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Blob,
    Tree,
    Commit,
    Tag,
    Raw,
}

/// An immutable 20-byte SHA-1 object identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId([u8; 20]);

pub type TreeId = ObjectId;
pub type CommitId = ObjectId;
pub type BlobId = ObjectId;

impl ObjectId {
    pub const LEN: usize = 20;

    /// Construct from a 20-byte slice.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::LEN {
            return Err(GitError::invalid_argument(format!(
                "object id must be {} bytes, got {}",
                Self::LEN,
                bytes.len()
            )));
        }
        let mut buf = [0u8; 20];
        buf.copy_from_slice(bytes);
        Ok(ObjectId(buf))
    }

    /// Construct from a larger buffer at a given offset, consuming 20 bytes.
    pub fn from_bytes_at(buf: &[u8], offset: usize) -> Result<Self> {
        let end = offset
            .checked_add(Self::LEN)
            .ok_or_else(|| GitError::invalid_argument("offset overflow"))?;
        let slice = buf.get(offset..end).ok_or_else(|| {
            GitError::invalid_argument(format!(
                "buffer too short for object id at offset {}",
                offset
            ))
        })?;
        Self::from_bytes(slice)
    }

    /// Construct from a 40-character hex string, case-insensitive.
    pub fn from_hex(s: &str) -> Result<Self> {
        if s.len() != Self::LEN * 2 {
            return Err(GitError::invalid_argument(format!(
                "hex object id must be {} characters, got {}",
                Self::LEN * 2,
                s.len()
            )));
        }
        if !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(GitError::invalid_argument(format!(
                "not a valid hex object id: {:?}",
                s
            )));
        }
        let mut buf = [0u8; 20];
        hex::decode_to_slice(s.to_ascii_lowercase(), &mut buf)
            .map_err(|e| GitError::invalid_argument(format!("invalid hex: {}", e)))?;
        Ok(ObjectId(buf))
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Defensive copy of the raw bytes.
    pub fn to_bytes(&self) -> [u8; 20] {
        self.0
    }

    pub fn byte(&self, index: usize) -> u8 {
        self.0[index]
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// `prefix` padded with `'0'` up to 40 characters, decoded as the smallest
    /// id with that prefix. Used for prefix-range scans.
    pub fn low_sentinel(prefix: &str) -> Result<Self> {
        sentinel(prefix, '0')
    }

    /// `prefix` padded with `'f'` up to 40 characters, decoded as the largest
    /// id with that prefix.
    pub fn high_sentinel(prefix: &str) -> Result<Self> {
        sentinel(prefix, 'f')
    }
}

fn sentinel(prefix: &str, pad: char) -> Result<ObjectId> {
    if prefix.len() > ObjectId::LEN * 2 {
        return Err(GitError::invalid_argument("prefix longer than 40 hex chars"));
    }
    if !prefix.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(GitError::invalid_argument(format!(
            "not a valid hex prefix: {:?}",
            prefix
        )));
    }
    let mut padded = prefix.to_ascii_lowercase();
    while padded.len() < ObjectId::LEN * 2 {
        padded.push(pad);
    }
    ObjectId::from_hex(&padded)
}

impl PartialOrd for ObjectId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ObjectId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl std::str::FromStr for ObjectId {
    type Err = GitError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}
