//! A read/write object-store core for on-disk Git repositories.
//!
//! This crate decodes and encodes the four Git object kinds (blob, tree,
//! commit, tag), reads loose objects from the two-level `objects/xx/yyyy…`
//! layout, reads objects out of version-2 pack files including offset-delta
//! resolution, reads and writes branch/remote references, and builds an
//! in-memory commit graph for traversal and analysis.
//!
//! Argument-parsing CLI drivers, working-tree checkout, the index/staging
//! area, network transport (fetch/push/smart protocols), pack-file writing,
//! signature verification, and reflogs are all out of scope: they are
//! external collaborators that consume this crate's API, not things it
//! implements.

pub mod error;
pub mod graph;
pub mod hash;
pub mod id;
pub mod loose;
pub mod object;
pub mod pack;
pub mod refs;
pub mod repository;
pub mod varint;

pub use error::{ErrorKind, GitError, Result};
pub use graph::CommitGraph;
pub use id::{BlobId, CommitId, ObjectId, ObjectKind, TreeId};
pub use object::{Commit, FileMode, GitObject, ObjectType, Signature, Tag, Tree, TreeEntry};
pub use pack::{PackIndex, PackReader};
pub use refs::{Reference, RefStore};
pub use repository::{MemoryRepository, Repository, RepositoryBackend};
