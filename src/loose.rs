//! The loose object store: one zlib-deflated file per object under
//! `objects/xx/yyyy…`, where `xx` is the first two hex characters of the
//! object id and `yyyy…` is the remaining 38.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::write::ZlibEncoder;
use flate2::{read::ZlibDecoder, Compression};

use crate::error::{GitError, Result};
use crate::hash;
use crate::id::ObjectId;
use crate::object::GitObject;

/// Reads and writes the `objects/` directory of loose (non-packed) objects.
pub struct LooseObjectStore {
    objects_dir: PathBuf,
}

impl LooseObjectStore {
    pub fn new(objects_dir: impl Into<PathBuf>) -> Self {
        Self { objects_dir: objects_dir.into() }
    }

    pub fn objects_dir(&self) -> &Path {
        &self.objects_dir
    }

    fn path_for(&self, id: &ObjectId) -> PathBuf {
        let hex = id.to_hex();
        self.objects_dir.join(&hex[0..2]).join(&hex[2..])
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.path_for(id).is_file()
    }

    /// Read and inflate the object at `id`, verifying its SHA-1 matches
    /// before returning. A mismatch is always an error: this store never
    /// hands back data it has not checked (§4.4).
    pub fn read_raw(&self, id: &ObjectId) -> Result<Vec<u8>> {
        let path = self.path_for(id);
        let compressed = fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                GitError::not_found(format!("loose object {} not found", id))
            } else {
                GitError::IoError(e)
            }
        })?;

        let mut decoder = ZlibDecoder::new(&compressed[..]);
        let mut data = Vec::new();
        decoder
            .read_to_end(&mut data)
            .map_err(|e| GitError::format_error(format!("zlib inflate failed for {}: {}", id, e)))?;

        let actual = ObjectId::from_bytes(&hash::hash(&data))?;
        if actual != *id {
            return Err(GitError::HashMismatch { expected: *id, actual });
        }

        Ok(data)
    }

    pub fn read(&self, id: &ObjectId) -> Result<GitObject> {
        let data = self.read_raw(id)?;
        GitObject::decode_envelope(&data)
    }

    /// Write `object`, returning its id. A loose file already present at the
    /// computed id is left untouched (content-addressed dedup); writes are
    /// staged to a sibling temp file and renamed into place so a crash never
    /// leaves a half-written object behind.
    pub fn write(&self, object: &GitObject) -> Result<ObjectId> {
        let bytes = object.canonical_bytes()?;
        let id = ObjectId::from_bytes(&hash::hash(&bytes))?;
        let path = self.path_for(&id);

        if path.is_file() {
            return Ok(id);
        }

        let dir = path.parent().expect("object path always has a parent directory");
        fs::create_dir_all(dir)?;

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&bytes)?;
        let compressed = encoder.finish()?;

        let tmp_path = dir.join(format!(".tmp-{}", id.to_hex()));
        if let Err(e) = fs::write(&tmp_path, &compressed) {
            let _ = fs::remove_file(&tmp_path);
            return Err(GitError::IoError(e));
        }
        if let Err(e) = fs::rename(&tmp_path, &path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(GitError::IoError(e));
        }

        Ok(id)
    }

    /// List every object id whose hex form starts with `prefix`, scanning
    /// only the relevant fanout directory (or all of them, for a prefix
    /// shorter than two characters).
    pub fn ids_with_prefix(&self, prefix: &str) -> Result<Vec<ObjectId>> {
        if !prefix.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(GitError::invalid_argument(format!("not a valid hex prefix: {:?}", prefix)));
        }
        let prefix_lower = prefix.to_ascii_lowercase();

        let mut out = Vec::new();
        let fanout_dirs: Vec<String> = if prefix_lower.len() >= 2 {
            vec![prefix_lower[0..2].to_string()]
        } else if prefix_lower.len() == 1 {
            (0..16u8)
                .map(|n| format!("{}{:x}", prefix_lower, n))
                .collect()
        } else {
            (0..=0xffu16).map(|n| format!("{:02x}", n)).collect()
        };

        for fanout in fanout_dirs {
            let dir = self.objects_dir.join(&fanout);
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(GitError::IoError(e)),
            };
            for entry in entries {
                let entry = entry?;
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if name.starts_with('.') {
                    continue;
                }
                let hex = format!("{}{}", fanout, name);
                if !hex.starts_with(&prefix_lower) || hex.len() != ObjectId::LEN * 2 {
                    continue;
                }
                out.push(ObjectId::from_hex(&hex)?);
            }
        }

        out.sort();
        Ok(out)
    }
}
