//! The commit graph: an in-memory DAG of parent/child edges, built by
//! reading commits out of a [`RepositoryBackend`] and never touching object
//! bodies once it has the parent list it needs.
//!
//! This is deliberately independent of any one `Repository` implementation —
//! it only ever calls `read_object`/`contains_object`, so the same graph
//! code walks an on-disk `Repository` or a `MemoryRepository` fixture
//! identically (grounded on the teacher's `collect_commit_ancestors`, which
//! recurses over parents with a seen-set but never keeps the edges it
//! discovers around as a queryable structure).

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use crate::error::{GitError, Result};
use crate::id::CommitId;
use crate::object::GitObject;
use crate::repository::RepositoryBackend;

/// An in-memory DAG of commit parent/child edges.
///
/// `parents` holds an entry for every commit that has actually been read in;
/// `children` may hold an entry for an id that is only known as someone
/// else's parent and has not been read yet (§3 "unexplored").
#[derive(Default)]
pub struct CommitGraph {
    parents: HashMap<CommitId, BTreeSet<CommitId>>,
    children: HashMap<CommitId, BTreeSet<CommitId>>,
}

impl CommitGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the edges from a commit object's id to each of its parents.
    /// Idempotent: re-adding the same commit is a no-op past the first call.
    pub fn add_commit(&mut self, id: CommitId, commit: &crate::object::Commit) {
        self.parents.entry(id).or_default();
        self.children.entry(id).or_default();

        for &parent in &commit.parents {
            self.parents.get_mut(&id).unwrap().insert(parent);
            self.children.entry(parent).or_default().insert(id);
        }
    }

    /// Breadth-first walk from `starts`, reading each commit through `repo`
    /// and adding it to the graph, never visiting the same id twice. Fails
    /// with `NotFound` if any traversed id cannot be read as a commit.
    pub fn add_history(&mut self, repo: &dyn RepositoryBackend, starts: &[CommitId]) -> Result<()> {
        let mut queue: VecDeque<CommitId> = starts.iter().copied().collect();
        let mut visited: HashSet<CommitId> = HashSet::new();

        while let Some(id) = queue.pop_front() {
            if !visited.insert(id) {
                continue;
            }

            let object = repo.read_object(&id)?;
            let commit = match object {
                GitObject::Commit(commit) => commit,
                other => {
                    return Err(GitError::not_found(format!(
                        "{} is a {} object, not a commit",
                        id,
                        other.object_type()
                    )))
                }
            };

            for &parent in &commit.parents {
                if !visited.contains(&parent) {
                    queue.push_back(parent);
                }
            }

            self.add_commit(id, &commit);
        }

        Ok(())
    }

    /// Parents already known for `id` (empty if `id` is unexplored or a root).
    pub fn parents(&self, id: &CommitId) -> BTreeSet<CommitId> {
        self.parents.get(id).cloned().unwrap_or_default()
    }

    /// Children already known for `id` (empty if `id` is a leaf or unknown).
    pub fn children(&self, id: &CommitId) -> BTreeSet<CommitId> {
        self.children.get(id).cloned().unwrap_or_default()
    }

    /// Every id that has been read in (i.e. has a `parents` entry, possibly empty).
    pub fn parents_keys(&self) -> BTreeSet<CommitId> {
        self.parents.keys().copied().collect()
    }

    /// Every id known to the graph as someone's parent, whether or not it has
    /// itself been read.
    pub fn children_keys(&self) -> BTreeSet<CommitId> {
        self.children.keys().copied().collect()
    }

    /// Commits that have been read in but have no recorded parents.
    pub fn roots(&self) -> BTreeSet<CommitId> {
        self.parents
            .iter()
            .filter(|(_, parents)| parents.is_empty())
            .map(|(&id, _)| id)
            .collect()
    }

    /// Commits with no known children — nothing in the graph points at them
    /// as a parent.
    pub fn leaves(&self) -> BTreeSet<CommitId> {
        self.children
            .iter()
            .filter(|(_, children)| children.is_empty())
            .map(|(&id, _)| id)
            .collect()
    }

    /// Ids named as a parent by some read commit but never themselves read.
    pub fn unexplored(&self) -> BTreeSet<CommitId> {
        self.children_keys()
            .difference(&self.parents_keys())
            .copied()
            .collect()
    }

    /// The length, in commits, of the longest parent chain ending at a root.
    /// Memoized depth-first search over `children`, starting from every
    /// root (§8 graph scenario: A→B→C and B→D gives a longest chain of 3).
    pub fn longest_chain_len(&self) -> usize {
        let mut memo: HashMap<CommitId, usize> = HashMap::new();
        let mut best = 0;
        for root in self.roots() {
            best = best.max(self.longest_chain_from(root, &mut memo));
        }
        best
    }

    fn longest_chain_from(&self, id: CommitId, memo: &mut HashMap<CommitId, usize>) -> usize {
        if let Some(&len) = memo.get(&id) {
            return len;
        }
        let children = self.children(&id);
        let len = 1 + children
            .iter()
            .map(|&child| self.longest_chain_from(child, memo))
            .max()
            .unwrap_or(0);
        memo.insert(id, len);
        len
    }
}
