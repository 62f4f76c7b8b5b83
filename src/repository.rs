//! The repository: the on-disk `Repository` dispatching across loose
//! objects and packs, an in-memory `MemoryRepository` for tests and
//! fixtures, and the `RepositoryBackend` trait both implement so the commit
//! graph can walk either one.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::PathBuf;

use crate::error::{GitError, Result};
use crate::id::ObjectId;
use crate::loose::LooseObjectStore;
use crate::object::GitObject;
use crate::pack::PackReader;
use crate::refs::{Reference, RefStore};

/// Shared read surface the commit graph walks; implemented by both
/// [`Repository`] and [`MemoryRepository`] so graph traversal does not care
/// which kind of store backs it.
pub trait RepositoryBackend {
    fn read_object(&self, id: &ObjectId) -> Result<GitObject>;
    fn contains_object(&self, id: &ObjectId) -> bool;
}

/// An on-disk Git object store: loose objects plus any number of packs
/// under `objects/pack/`, with branch and remote-tracking references under
/// `refs/`.
///
/// Per the resource model, no pack file or index is kept open or cached
/// across calls — each read opens, consumes, and closes whatever pack
/// files it needs. This trades some repeated parsing for never holding a
/// file handle longer than a single call.
pub struct Repository {
    git_dir: PathBuf,
    loose: LooseObjectStore,
    refs: RefStore,
    closed: bool,
}

impl Repository {
    /// Open a repository rooted at `git_dir` (the directory that directly
    /// contains `objects/` and `refs/` — i.e. a `.git` directory, not its
    /// parent worktree).
    pub fn open(git_dir: impl Into<PathBuf>) -> Result<Self> {
        let git_dir = git_dir.into();
        if !git_dir.is_dir() {
            return Err(GitError::invalid_argument(format!("not a directory: {:?}", git_dir)));
        }
        let objects_dir = git_dir.join("objects");
        if !objects_dir.is_dir() {
            return Err(GitError::invalid_argument(format!(
                "not a git object store (missing objects/ under {:?})",
                git_dir
            )));
        }
        if !git_dir.join("config").is_file() {
            return Err(GitError::invalid_argument(format!(
                "not a git object store (missing config file under {:?})",
                git_dir
            )));
        }
        Ok(Self {
            loose: LooseObjectStore::new(objects_dir),
            refs: RefStore::new(git_dir.clone()),
            git_dir,
            closed: false,
        })
    }

    pub fn git_dir(&self) -> &std::path::Path {
        &self.git_dir
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(GitError::Closed);
        }
        Ok(())
    }

    fn pack_dir(&self) -> PathBuf {
        self.git_dir.join("objects").join("pack")
    }

    fn each_pack_idx(&self) -> Result<Vec<PathBuf>> {
        let dir = self.pack_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(GitError::IoError(e)),
        };
        let mut idx_paths = Vec::new();
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) == Some("idx") {
                idx_paths.push(path);
            }
        }
        idx_paths.sort();
        Ok(idx_paths)
    }

    fn open_pack(&self, idx_path: &std::path::Path) -> Result<Option<PackReader>> {
        let pack_path = idx_path.with_extension("pack");
        if !pack_path.is_file() {
            return Ok(None);
        }
        Ok(Some(PackReader::open(&pack_path, idx_path)?))
    }

    pub fn contains(&self, id: &ObjectId) -> Result<bool> {
        self.ensure_open()?;
        if self.loose.contains(id) {
            return Ok(true);
        }
        log::trace!("object {} missing from loose storage, scanning packs", id);
        for idx_path in self.each_pack_idx()? {
            if let Some(pack) = self.open_pack(&idx_path)? {
                if pack.contains(id) {
                    return Ok(true);
                }
                log::trace!("object {} not in {:?}, falling back to next pack", id, idx_path);
            }
        }
        Ok(false)
    }

    pub fn read(&self, id: &ObjectId) -> Result<GitObject> {
        self.ensure_open()?;
        if self.loose.contains(id) {
            return self.loose.read(id);
        }
        log::debug!("loose file miss for {}, scanning packs under {:?}", id, self.pack_dir());
        for idx_path in self.each_pack_idx()? {
            if let Some(pack) = self.open_pack(&idx_path)? {
                if pack.contains(id) {
                    log::debug!("resolving object {} from pack {:?}", id, idx_path);
                    return pack.resolve(id);
                }
                log::trace!("object {} not in {:?}, falling back to next pack", id, idx_path);
            }
        }
        Err(GitError::not_found(format!("object {} not found", id)))
    }

    /// The canonical `"<type> <len>\0<payload>"` bytes for `id`, regardless
    /// of whether it came from a loose file or a pack entry.
    pub fn read_raw(&self, id: &ObjectId) -> Result<Vec<u8>> {
        self.read(id)?.canonical_bytes()
    }

    /// Write a loose object. This crate never writes pack files (§9).
    pub fn write(&self, object: &GitObject) -> Result<ObjectId> {
        self.ensure_open()?;
        self.loose.write(object)
    }

    pub fn ids_by_prefix(&self, prefix: &str) -> Result<Vec<ObjectId>> {
        self.ensure_open()?;
        let mut ids: BTreeSet<ObjectId> = self.loose.ids_with_prefix(prefix)?.into_iter().collect();
        for idx_path in self.each_pack_idx()? {
            if let Some(pack) = self.open_pack(&idx_path)? {
                ids.extend(pack.ids_with_prefix(prefix)?);
            }
        }
        Ok(ids.into_iter().collect())
    }

    /// Resolve an abbreviated hex prefix to exactly one object, per §4.5
    /// "prefix lookup": zero matches is `NotFound`, more than one is
    /// `Ambiguous`.
    pub fn unique_id_by_prefix(&self, prefix: &str) -> Result<ObjectId> {
        let mut ids = self.ids_by_prefix(prefix)?;
        match ids.len() {
            0 => Err(GitError::not_found(format!("no object matches prefix {:?}", prefix))),
            1 => Ok(ids.remove(0)),
            count => Err(GitError::Ambiguous { prefix: prefix.to_string(), count }),
        }
    }

    /// Branch and remote-tracking refs, excluding tags (the decided default
    /// from §9's open question).
    pub fn list_references(&self) -> Result<Vec<Reference>> {
        self.ensure_open()?;
        let mut refs = self.refs.list("heads")?;
        refs.extend(self.refs.list("remotes")?);
        refs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(refs)
    }

    /// Every reference under `refs/`, tags included.
    pub fn list_references_including_tags(&self) -> Result<Vec<Reference>> {
        self.ensure_open()?;
        let mut refs = self.list_references()?;
        refs.extend(self.refs.list("tags")?);
        refs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(refs)
    }

    pub fn read_reference(&self, name: &str) -> Result<ObjectId> {
        self.ensure_open()?;
        self.refs.read(name)
    }

    /// Write `name` to point at `target`. `target` is `Some` for the normal
    /// case; writing `None` is rejected with `IllegalState` (§3/§9) since a
    /// reference with no target has no on-disk representation.
    pub fn write_reference(&self, name: &str, target: Option<ObjectId>) -> Result<()> {
        self.ensure_open()?;
        self.refs.write(name, target)
    }

    pub fn delete_reference(&self, name: &str) -> Result<()> {
        self.ensure_open()?;
        self.refs.delete(name)
    }

    /// Mark this repository closed; further calls return `GitError::Closed`
    /// instead of touching the filesystem. Dropping a `Repository` has the
    /// same effect implicitly, since no handle outlives a single call.
    pub fn close(&mut self) {
        self.closed = true;
    }
}

impl RepositoryBackend for Repository {
    fn read_object(&self, id: &ObjectId) -> Result<GitObject> {
        self.read(id)
    }

    fn contains_object(&self, id: &ObjectId) -> bool {
        self.contains(id).unwrap_or(false)
    }
}

/// A fully in-memory repository: useful for tests and for building small
/// fixtures without touching the filesystem (§9 "supplemented features").
#[derive(Default)]
pub struct MemoryRepository {
    objects: HashMap<ObjectId, GitObject>,
    refs: BTreeMap<String, ObjectId>,
    closed: bool,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(GitError::Closed);
        }
        Ok(())
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.objects.contains_key(id)
    }

    pub fn read(&self, id: &ObjectId) -> Result<GitObject> {
        self.ensure_open()?;
        self.objects
            .get(id)
            .cloned()
            .ok_or_else(|| GitError::not_found(format!("object {} not found", id)))
    }

    pub fn write(&mut self, object: GitObject) -> Result<ObjectId> {
        self.ensure_open()?;
        let id = object.compute_id()?;
        self.objects.entry(id).or_insert(object);
        Ok(id)
    }

    pub fn ids_by_prefix(&self, prefix: &str) -> Result<Vec<ObjectId>> {
        self.ensure_open()?;
        let low = ObjectId::low_sentinel(prefix)?;
        let high = ObjectId::high_sentinel(prefix)?;
        let mut ids: Vec<ObjectId> = self
            .objects
            .keys()
            .filter(|id| **id >= low && **id <= high)
            .copied()
            .collect();
        ids.sort();
        Ok(ids)
    }

    pub fn unique_id_by_prefix(&self, prefix: &str) -> Result<ObjectId> {
        let mut ids = self.ids_by_prefix(prefix)?;
        match ids.len() {
            0 => Err(GitError::not_found(format!("no object matches prefix {:?}", prefix))),
            1 => Ok(ids.remove(0)),
            count => Err(GitError::Ambiguous { prefix: prefix.to_string(), count }),
        }
    }

    pub fn read_reference(&self, name: &str) -> Result<ObjectId> {
        self.ensure_open()?;
        crate::refs::validate_refname(name)?;
        self.refs
            .get(name)
            .copied()
            .ok_or_else(|| GitError::not_found(format!("reference {:?} not found", name)))
    }

    pub fn write_reference(&mut self, name: &str, target: Option<ObjectId>) -> Result<()> {
        self.ensure_open()?;
        crate::refs::validate_refname(name)?;
        let target = target.ok_or_else(|| {
            GitError::illegal_state(format!("cannot write reference {:?} with no target", name))
        })?;
        self.refs.insert(name.to_string(), target);
        Ok(())
    }

    pub fn delete_reference(&mut self, name: &str) -> Result<()> {
        self.ensure_open()?;
        crate::refs::validate_refname(name)?;
        self.refs
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| GitError::not_found(format!("reference {:?} not found", name)))
    }

    pub fn list_references(&self) -> Result<Vec<Reference>> {
        self.ensure_open()?;
        Ok(self
            .refs
            .iter()
            .filter(|(name, _)| !name.starts_with("tags/"))
            .map(|(name, target)| Reference { name: name.clone(), target: Some(*target) })
            .collect())
    }

    pub fn list_references_including_tags(&self) -> Result<Vec<Reference>> {
        self.ensure_open()?;
        Ok(self
            .refs
            .iter()
            .map(|(name, target)| Reference { name: name.clone(), target: Some(*target) })
            .collect())
    }

    pub fn close(&mut self) {
        self.closed = true;
    }
}

impl RepositoryBackend for MemoryRepository {
    fn read_object(&self, id: &ObjectId) -> Result<GitObject> {
        self.read(id)
    }

    fn contains_object(&self, id: &ObjectId) -> bool {
        self.contains(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Commit, Signature};

    fn repo() -> (tempfile::TempDir, Repository) {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("objects")).unwrap();
        fs::create_dir_all(dir.path().join("refs").join("heads")).unwrap();
        fs::write(dir.path().join("config"), b"").unwrap();
        let repo = Repository::open(dir.path().to_path_buf()).unwrap();
        (dir, repo)
    }

    #[test]
    fn open_rejects_non_repository_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Repository::open(dir.path().to_path_buf()).is_err());
    }

    #[test]
    fn write_then_read_loose_object() {
        let (_dir, repo) = repo();
        let blob = GitObject::Blob(b"repository round trip".to_vec());
        let id = repo.write(&blob).unwrap();
        assert!(repo.contains(&id).unwrap());
        assert_eq!(repo.read(&id).unwrap(), blob);
    }

    #[test]
    fn closed_repository_rejects_calls() {
        let (_dir, mut repo) = repo();
        repo.close();
        let err = repo.read(&ObjectId::from_hex(&"0".repeat(40)).unwrap()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Closed);
    }

    #[test]
    fn unique_id_by_prefix_resolves_single_match() {
        let (_dir, repo) = repo();
        let blob = GitObject::Blob(b"unique prefix target".to_vec());
        let id = repo.write(&blob).unwrap();
        let prefix = &id.to_hex()[..8];
        assert_eq!(repo.unique_id_by_prefix(prefix).unwrap(), id);
    }

    #[test]
    fn unique_id_by_prefix_reports_ambiguity() {
        let (dir, repo) = repo();
        // Fabricate two loose object files sharing a fanout prefix; this
        // only needs directory/filename shape, not valid compressed
        // content, since ids_by_prefix never inflates the file.
        let objects_dir = dir.path().join("objects").join("ab");
        fs::create_dir_all(&objects_dir).unwrap();
        fs::write(objects_dir.join("c".repeat(38)), b"fake").unwrap();
        fs::write(objects_dir.join(format!("{}1", "d".repeat(37))), b"fake").unwrap();

        let err = repo.unique_id_by_prefix("ab").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Ambiguous);
    }

    #[test]
    fn unique_id_by_prefix_reports_not_found() {
        let (_dir, repo) = repo();
        assert!(repo.unique_id_by_prefix("ab").is_err());
    }

    #[test]
    fn reference_round_trip_and_listing() {
        let (_dir, repo) = repo();
        let id = ObjectId::from_hex(&"7".repeat(40)).unwrap();
        repo.write_reference("heads/main", Some(id)).unwrap();
        assert_eq!(repo.read_reference("heads/main").unwrap(), id);

        let refs = repo.list_references().unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].name, "heads/main");
        assert_eq!(refs[0].target, Some(id));

        repo.delete_reference("heads/main").unwrap();
        assert!(repo.read_reference("heads/main").is_err());
    }

    #[test]
    fn writing_a_reference_with_no_target_is_illegal_state() {
        let (_dir, repo) = repo();
        let err = repo.write_reference("heads/main", None).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::IllegalState);
        assert!(repo.read_reference("heads/main").is_err());
    }

    #[test]
    fn list_references_excludes_tags_by_default() {
        let (_dir, repo) = repo();
        fs::create_dir_all(_dir.path().join("refs/tags")).unwrap();
        let id = ObjectId::from_hex(&"3".repeat(40)).unwrap();
        repo.write_reference("heads/main", Some(id)).unwrap();
        repo.write_reference("tags/v1", Some(id)).unwrap();

        let without_tags = repo.list_references().unwrap();
        assert_eq!(without_tags.len(), 1);

        let with_tags = repo.list_references_including_tags().unwrap();
        assert_eq!(with_tags.len(), 2);
    }

    #[test]
    fn memory_repository_round_trips_objects_and_refs() {
        let mut repo = MemoryRepository::new();
        let commit = GitObject::Commit(Commit {
            tree: ObjectId::from_hex(&"1".repeat(40)).unwrap(),
            parents: vec![],
            author: Signature::new("a", "a@example.com", 1, 0),
            committer: Signature::new("a", "a@example.com", 1, 0),
            message: "root\n".to_string(),
        });
        let id = repo.write(commit.clone()).unwrap();
        assert!(repo.contains(&id));
        assert_eq!(repo.read(&id).unwrap(), commit);

        repo.write_reference("heads/main", Some(id)).unwrap();
        assert_eq!(repo.read_reference("heads/main").unwrap(), id);
        assert_eq!(repo.list_references().unwrap().len(), 1);
    }

    #[test]
    fn memory_repository_tracks_closed_state() {
        let mut repo = MemoryRepository::new();
        repo.close();
        assert_eq!(repo.read_reference("heads/main").unwrap_err().kind(), crate::error::ErrorKind::Closed);
    }

    #[test]
    fn memory_repository_rejects_writing_a_reference_with_no_target() {
        let mut repo = MemoryRepository::new();
        let err = repo.write_reference("heads/main", None).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::IllegalState);
        assert!(repo.read_reference("heads/main").is_err());
    }
}
