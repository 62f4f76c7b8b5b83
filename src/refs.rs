//! Branch and remote-tracking references: loose ref files under `refs/`,
//! overlaid with the `packed-refs` text file Git uses to avoid one file per
//! ref in large repositories.
//!
//! A reference's public name never carries the `refs/` prefix — `"heads/master"`,
//! not `"refs/heads/master"` — per §3's grammar; the prefix is purely an
//! on-disk and `packed-refs` detail this module translates at its boundary.
//!
//! Loose refs always win over a packed entry for the same name — that is
//! how `git pack-refs` keeps working even though it never deletes the
//! loose file for a ref someone is actively updating.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{GitError, Result};
use crate::id::ObjectId;

/// A reference: its name (`"heads/main"`, no `refs/` prefix) and the object
/// id it currently points at. `target` is `None` only for a reference that
/// exists transiently in memory and has not yet been given a target (§3);
/// writing one to a store with no target is an `IllegalState` error, so
/// every reference actually persisted on disk has `Some` here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub name: String,
    pub target: Option<ObjectId>,
}

fn is_valid_component(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Validate `name` against §3's grammar: `(heads | remotes/[^/]+ | tags) /
/// [A-Za-z0-9_-]+`, with the literal final segment `HEAD` rejected and
/// `remotes/./…`, `remotes/../…` rejected.
pub fn validate_refname(name: &str) -> Result<()> {
    let parts: Vec<&str> = name.split('/').collect();
    let matches_grammar = match parts.as_slice() {
        ["heads", component] | ["tags", component] => is_valid_component(component),
        ["remotes", remote, component] => {
            !remote.is_empty() && *remote != "." && *remote != ".." && is_valid_component(component)
        }
        _ => false,
    };
    if !matches_grammar {
        return Err(GitError::invalid_argument(format!(
            "refname does not match grammar: {:?}",
            name
        )));
    }
    if parts.last() == Some(&"HEAD") {
        return Err(GitError::invalid_argument(format!(
            "refname may not end in the literal segment HEAD: {:?}",
            name
        )));
    }
    Ok(())
}

/// Reads and writes the loose-ref tree and the `packed-refs` overlay under a
/// repository's git directory.
pub struct RefStore {
    git_dir: PathBuf,
}

impl RefStore {
    pub fn new(git_dir: impl Into<PathBuf>) -> Self {
        Self { git_dir: git_dir.into() }
    }

    fn loose_path(&self, name: &str) -> PathBuf {
        self.git_dir.join("refs").join(name)
    }

    fn packed_refs_path(&self) -> PathBuf {
        self.git_dir.join("packed-refs")
    }

    pub fn read(&self, name: &str) -> Result<ObjectId> {
        validate_refname(name)?;

        if let Some(id) = read_loose_file(&self.loose_path(name))? {
            log::trace!("reference {:?} resolved from loose ref file", name);
            return Ok(id);
        }

        log::debug!("reference {:?} has no loose ref file, falling back to packed-refs", name);
        let packed = self.read_packed_refs()?;
        packed
            .get(name)
            .copied()
            .ok_or_else(|| GitError::not_found(format!("reference {:?} not found", name)))
    }

    /// Write `name` to point at `target`. A `None` target is the "reference
    /// with no target" case §3 permits transiently in memory; writing it to
    /// durable storage has no on-disk representation, so it is rejected as
    /// `IllegalState` rather than silently dropped (§9).
    pub fn write(&self, name: &str, target: Option<ObjectId>) -> Result<()> {
        validate_refname(name)?;
        let target = target.ok_or_else(|| {
            GitError::illegal_state(format!("cannot write reference {:?} with no target", name))
        })?;
        let path = self.loose_path(name);
        let dir = path.parent().expect("ref path always has a parent directory");
        fs::create_dir_all(dir)?;

        let tmp_path = dir.join(format!(".tmp-ref-{}", target.to_hex()));
        let contents = format!("{}\n", target.to_hex());
        if let Err(e) = fs::write(&tmp_path, contents.as_bytes()) {
            let _ = fs::remove_file(&tmp_path);
            return Err(GitError::IoError(e));
        }
        if let Err(e) = fs::rename(&tmp_path, &path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(GitError::IoError(e));
        }
        Ok(())
    }

    /// Delete `name`, whether it lives as a loose file, a packed-refs
    /// entry, or both.
    pub fn delete(&self, name: &str) -> Result<()> {
        validate_refname(name)?;

        let loose_path = self.loose_path(name);
        let had_loose = match fs::remove_file(&loose_path) {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(GitError::IoError(e)),
        };

        let mut packed = self.read_packed_refs()?;
        let had_packed = packed.remove(name).is_some();
        if had_packed {
            self.write_packed_refs(&packed)?;
        }

        if !had_loose && !had_packed {
            return Err(GitError::not_found(format!("reference {:?} not found", name)));
        }
        Ok(())
    }

    /// All references under `category` (e.g. `"heads"`, `"remotes"`, `"tags"`),
    /// loose entries taking precedence over a packed entry of the same name.
    pub fn list(&self, category: &str) -> Result<Vec<Reference>> {
        let category_prefix = format!("{}/", category);
        let mut merged: BTreeMap<String, ObjectId> = self
            .read_packed_refs()?
            .into_iter()
            .filter(|(name, _)| name.starts_with(&category_prefix))
            .collect();

        let loose_root = self.git_dir.join("refs").join(category);
        self.collect_loose(&loose_root, category, &mut merged)?;

        Ok(merged
            .into_iter()
            .map(|(name, target)| Reference { name, target: Some(target) })
            .collect())
    }

    fn collect_loose(&self, dir: &Path, prefix: &str, out: &mut BTreeMap<String, ObjectId>) -> Result<()> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(GitError::IoError(e)),
        };

        for entry in entries {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') {
                continue;
            }

            if file_type.is_dir() {
                self.collect_loose(&entry.path(), &format!("{}/{}", prefix, name), out)?;
            } else if let Some(id) = read_loose_file(&entry.path())? {
                out.insert(format!("{}/{}", prefix, name), id);
            }
        }
        Ok(())
    }

    fn read_packed_refs(&self) -> Result<BTreeMap<String, ObjectId>> {
        let path = self.packed_refs_path();
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(GitError::IoError(e)),
        };
        parse_packed_refs(&text)
    }

    fn write_packed_refs(&self, refs: &BTreeMap<String, ObjectId>) -> Result<()> {
        let mut out = String::from("# pack-refs with: fully-peeled sorted\n");
        for (name, id) in refs {
            out.push_str(&id.to_hex());
            out.push(' ');
            out.push_str("refs/");
            out.push_str(name);
            out.push('\n');
        }

        let path = self.packed_refs_path();
        let tmp_path = self.git_dir.join(".tmp-packed-refs");
        if let Err(e) = fs::write(&tmp_path, out.as_bytes()) {
            let _ = fs::remove_file(&tmp_path);
            return Err(GitError::IoError(e));
        }
        if let Err(e) = fs::rename(&tmp_path, &path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(GitError::IoError(e));
        }
        Ok(())
    }
}

/// Read a loose ref file: exactly 40 hex characters and a trailing newline.
/// Returns `Ok(None)` if the file does not exist; any other read or parse
/// failure is an error.
fn read_loose_file(path: &Path) -> Result<Option<ObjectId>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(GitError::IoError(e)),
    };
    let trimmed = text
        .strip_suffix('\n')
        .ok_or_else(|| GitError::format_error(format!("loose ref file missing trailing newline: {:?}", path)))?;
    if trimmed.len() != ObjectId::LEN * 2 {
        return Err(GitError::format_error(format!(
            "loose ref file has wrong length: {:?}",
            path
        )));
    }
    ObjectId::from_hex(trimmed).map(Some)
}

/// Parse the `packed-refs` grammar (§4.6): an optional `#`-comment header,
/// then `<40-hex> <full-refname>` records (refnames always begin with
/// `refs/`), with `^`-prefixed peeled-target lines ignored entirely.
fn parse_packed_refs(text: &str) -> Result<BTreeMap<String, ObjectId>> {
    let mut refs = BTreeMap::new();
    for line in text.lines() {
        if line.starts_with('#') || line.starts_with('^') {
            continue;
        }
        if line.is_empty() {
            continue;
        }
        let space = line
            .find(' ')
            .ok_or_else(|| GitError::format_error(format!("malformed packed-refs line: {:?}", line)))?;
        let id = ObjectId::from_hex(&line[..space])?;
        let full_name = &line[space + 1..];
        let name = full_name
            .strip_prefix("refs/")
            .ok_or_else(|| GitError::format_error(format!("packed-refs name missing refs/ prefix: {:?}", line)))?;
        refs.insert(name.to_string(), id);
    }
    Ok(refs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(byte: u8) -> ObjectId {
        ObjectId::from_bytes(&[byte; 20]).unwrap()
    }

    fn store() -> (tempfile::TempDir, RefStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = RefStore::new(dir.path().to_path_buf());
        (dir, store)
    }

    #[test]
    fn refname_validation_accepts_grammar_scenarios() {
        assert!(validate_refname("heads/master").is_ok());
        assert!(validate_refname("remotes/origin/main").is_ok());
        assert!(validate_refname("tags/v1-0").is_ok());
    }

    #[test]
    fn refname_validation_rejects_known_answer_scenarios() {
        assert!(validate_refname("heads/HEAD").is_err());
        assert!(validate_refname("heads/..").is_err());
        assert!(validate_refname("tags/subdir/onetwo").is_err());
        assert!(validate_refname("remotes/foo/HEAD").is_err());
        assert!(validate_refname("remotes/./main").is_err());
        assert!(validate_refname("remotes/../main").is_err());
    }

    #[test]
    fn refname_validation_rejects_malformed_shapes() {
        assert!(validate_refname("").is_err());
        assert!(validate_refname("heads").is_err());
        assert!(validate_refname("heads/").is_err());
        assert!(validate_refname("notacategory/main").is_err());
        assert!(validate_refname("heads/a b").is_err());
    }

    #[test]
    fn write_then_read_loose_ref() {
        let (_dir, store) = store();
        store.write("heads/main", Some(id(1))).unwrap();
        assert_eq!(store.read("heads/main").unwrap(), id(1));
    }

    /// §3/§9: a reference with no target may exist transiently in memory,
    /// but writing one to durable storage is an `IllegalState` error.
    #[test]
    fn writing_a_reference_with_no_target_is_illegal_state() {
        let (_dir, store) = store();
        let err = store.write("heads/main", None).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::IllegalState);
        assert!(store.read("heads/main").is_err());
    }

    #[test]
    fn loose_ref_overrides_packed() {
        let (_dir, store) = store();
        let mut packed = BTreeMap::new();
        packed.insert("heads/main".to_string(), id(9));
        store.write_packed_refs(&packed).unwrap();
        store.write("heads/main", Some(id(1))).unwrap();

        assert_eq!(store.read("heads/main").unwrap(), id(1));
    }

    #[test]
    fn read_falls_back_to_packed_refs() {
        let (_dir, store) = store();
        let mut packed = BTreeMap::new();
        packed.insert("tags/packed-only".to_string(), id(2));
        store.write_packed_refs(&packed).unwrap();

        assert_eq!(store.read("tags/packed-only").unwrap(), id(2));
    }

    #[test]
    fn delete_removes_loose_and_packed_entries() {
        let (_dir, store) = store();
        store.write("heads/main", Some(id(1))).unwrap();
        let mut packed = BTreeMap::new();
        packed.insert("heads/main".to_string(), id(1));
        store.write_packed_refs(&packed).unwrap();

        store.delete("heads/main").unwrap();
        assert!(store.read("heads/main").is_err());
    }

    #[test]
    fn delete_missing_ref_is_not_found() {
        let (_dir, store) = store();
        let err = store.delete("heads/nope").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NotFound);
    }

    #[test]
    fn list_merges_loose_and_packed_within_category() {
        let (_dir, store) = store();
        store.write("heads/main", Some(id(1))).unwrap();
        let mut packed = BTreeMap::new();
        packed.insert("heads/old".to_string(), id(3));
        packed.insert("remotes/origin/main".to_string(), id(4));
        store.write_packed_refs(&packed).unwrap();

        let mut heads = store.list("heads").unwrap();
        heads.sort_by(|a, b| a.name.cmp(&b.name));
        let names: Vec<_> = heads.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["heads/main", "heads/old"]);

        let remotes = store.list("remotes").unwrap();
        assert_eq!(remotes.len(), 1);
        assert_eq!(remotes[0].name, "remotes/origin/main");
    }

    #[test]
    fn packed_refs_ignores_peeled_lines() {
        let (_dir, store) = store();
        let path = store.packed_refs_path();
        let body = format!(
            "# pack-refs with: peeled fully-peeled sorted\n{} refs/tags/v1\n^{}\n",
            id(1).to_hex(),
            id(2).to_hex()
        );
        fs::write(&path, body).unwrap();

        assert_eq!(store.read("tags/v1").unwrap(), id(1));
    }
}
