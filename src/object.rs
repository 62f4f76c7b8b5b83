//! The Git object model: blob, tree, commit, tag, and their canonical
//! (hash-defining) byte encodings.
//!
//! Every object's identity is `SHA-1("<type> <payload-length>\0<payload>")`.
//! Reproducing that envelope byte-exact — no leading zeros in the length, no
//! sign, no stray whitespace — is the one non-negotiable correctness
//! requirement in this module; everything else follows from it.

use crate::error::{GitError, Result};
use crate::hash;
use crate::id::{CommitId, ObjectId, TreeId};
use std::fmt;

/// The four object kinds Git knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Blob,
    Tree,
    Commit,
    Tag,
}

impl ObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Blob => "blob",
            ObjectType::Tree => "tree",
            ObjectType::Commit => "commit",
            ObjectType::Tag => "tag",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "blob" => Ok(ObjectType::Blob),
            "tree" => Ok(ObjectType::Tree),
            "commit" => Ok(ObjectType::Commit),
            "tag" => Ok(ObjectType::Tag),
            other => Err(GitError::format_error(format!("unknown object type: {}", other))),
        }
    }

    /// The type tag used in pack object headers (§4.5).
    pub fn pack_type_tag(&self) -> u8 {
        match self {
            ObjectType::Commit => 1,
            ObjectType::Tree => 2,
            ObjectType::Blob => 3,
            ObjectType::Tag => 4,
        }
    }

    pub fn from_pack_type_tag(tag: u8) -> Result<Self> {
        match tag {
            1 => Ok(ObjectType::Commit),
            2 => Ok(ObjectType::Tree),
            3 => Ok(ObjectType::Blob),
            4 => Ok(ObjectType::Tag),
            other => Err(GitError::format_error(format!(
                "unsupported pack object type tag: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One of the four canonical tree entry modes. Any other octal mode is a
/// format error (§9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileMode {
    Directory,
    Regular,
    Executable,
    Symlink,
}

impl FileMode {
    pub fn octal_str(&self) -> &'static str {
        match self {
            FileMode::Directory => "40000",
            FileMode::Regular => "100644",
            FileMode::Executable => "100755",
            FileMode::Symlink => "120000",
        }
    }

    pub fn from_octal_str(s: &str) -> Result<Self> {
        match s {
            "40000" | "040000" => Ok(FileMode::Directory),
            "100644" => Ok(FileMode::Regular),
            "100755" => Ok(FileMode::Executable),
            "120000" => Ok(FileMode::Symlink),
            other => Err(GitError::format_error(format!("unsupported tree mode: {}", other))),
        }
    }

    fn is_directory(&self) -> bool {
        matches!(self, FileMode::Directory)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub mode: FileMode,
    pub name: String,
    pub id: ObjectId,
}

impl TreeEntry {
    pub fn new(mode: FileMode, name: impl Into<String>, id: ObjectId) -> Self {
        Self { mode, name: name.into(), id }
    }

    /// The key trees are sorted by: the entry name, with a trailing `/`
    /// appended for directory entries (§4.3 "Tree ordering").
    fn sort_key(&self) -> Vec<u8> {
        let mut key = self.name.as_bytes().to_vec();
        if self.mode.is_directory() {
            key.push(b'/');
        }
        key
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tree {
    pub entries: Vec<TreeEntry>,
}

impl Tree {
    pub fn new(entries: Vec<TreeEntry>) -> Self {
        Self { entries }
    }

    /// Sort entries by the directory-aware sort-name rule. Idempotent.
    pub fn sort(&mut self) {
        self.entries.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    }

    fn is_sorted_and_unique(&self) -> bool {
        self.entries
            .windows(2)
            .all(|pair| pair[0].sort_key() < pair[1].sort_key())
    }
}

/// An author or committer/tagger identity line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: String,
    pub email: String,
    pub unix_seconds: u64,
    pub tz_offset_minutes: i32,
}

impl Signature {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        unix_seconds: u64,
        tz_offset_minutes: i32,
    ) -> Self {
        Self { name: name.into(), email: email.into(), unix_seconds, tz_offset_minutes }
    }

    fn validate(&self) -> Result<()> {
        if self.name.contains('\n') || self.email.contains('\n') {
            return Err(GitError::illegal_state("signature name/email may not contain a newline"));
        }
        if self.email.contains('<') || self.email.contains('>') {
            return Err(GitError::illegal_state("signature email may not contain '<' or '>'"));
        }
        Ok(())
    }

    fn format_tz(&self) -> String {
        let sign = if self.tz_offset_minutes < 0 { '-' } else { '+' };
        let magnitude = self.tz_offset_minutes.unsigned_abs();
        format!("{}{:02}{:02}", sign, magnitude / 60, magnitude % 60)
    }

    fn format_line(&self) -> Result<String> {
        self.validate()?;
        Ok(format!(
            "{} <{}> {} {}",
            self.name,
            self.email,
            self.unix_seconds,
            self.format_tz()
        ))
    }

    /// Parse `"<name> <<email>> <unix-seconds> <tz>"`, matching the pattern
    /// `(.*?) <([^>]*)> (\d+) ([+-])(\d\d)(\d\d)` from §4.3.
    fn parse_line(line: &str) -> Result<Self> {
        let lt = line
            .find('<')
            .ok_or_else(|| GitError::format_error(format!("missing '<' in signature: {:?}", line)))?;
        if lt == 0 || line.as_bytes()[lt - 1] != b' ' {
            return Err(GitError::format_error(format!("malformed signature: {:?}", line)));
        }
        let name = &line[..lt - 1];

        let rest = &line[lt + 1..];
        let gt = rest
            .find('>')
            .ok_or_else(|| GitError::format_error(format!("missing '>' in signature: {:?}", line)))?;
        let email = &rest[..gt];

        let tail = &rest[gt + 1..];
        let tail = tail
            .strip_prefix(' ')
            .ok_or_else(|| GitError::format_error(format!("malformed signature tail: {:?}", line)))?;

        let mut parts = tail.splitn(2, ' ');
        let ts_str = parts
            .next()
            .ok_or_else(|| GitError::format_error("missing timestamp in signature"))?;
        let tz_str = parts
            .next()
            .ok_or_else(|| GitError::format_error("missing timezone in signature"))?;

        let unix_seconds = parse_strict_u64(ts_str)?;
        let tz_offset_minutes = parse_tz(tz_str)?;

        Ok(Signature { name: name.to_string(), email: email.to_string(), unix_seconds, tz_offset_minutes })
    }
}

fn parse_strict_u64(s: &str) -> Result<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(GitError::format_error(format!("not a decimal integer: {:?}", s)));
    }
    if s.len() > 1 && s.starts_with('0') {
        return Err(GitError::format_error(format!("leading zero in integer: {:?}", s)));
    }
    s.parse::<u64>().map_err(|e| GitError::format_error(format!("integer out of range: {}", e)))
}

fn parse_tz(s: &str) -> Result<i32> {
    if s.len() != 5 {
        return Err(GitError::format_error(format!("malformed timezone: {:?}", s)));
    }
    let sign = match &s[0..1] {
        "+" => 1,
        "-" => -1,
        _ => return Err(GitError::format_error(format!("malformed timezone sign: {:?}", s))),
    };
    let digits = &s[1..5];
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(GitError::format_error(format!("malformed timezone digits: {:?}", s)));
    }
    let hh: i32 = digits[0..2].parse().unwrap();
    let mm: i32 = digits[2..4].parse().unwrap();
    Ok(sign * (hh * 60 + mm))
}

/// Format a standalone minute offset the way §8 scenario 5 expects
/// (`0 -> "+0000"`, `105 -> "+0145"`, `-240 -> "-0400"`).
pub fn format_tz_offset(tz_offset_minutes: i32) -> String {
    let sign = if tz_offset_minutes < 0 { '-' } else { '+' };
    let magnitude = tz_offset_minutes.unsigned_abs();
    format!("{}{:02}{:02}", sign, magnitude / 60, magnitude % 60)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub tree: TreeId,
    pub parents: Vec<CommitId>,
    pub author: Signature,
    pub committer: Signature,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub target: ObjectId,
    pub target_type: ObjectType,
    pub tag_name: String,
    pub tagger: Signature,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitObject {
    Blob(Vec<u8>),
    Tree(Tree),
    Commit(Commit),
    Tag(Tag),
}

impl GitObject {
    pub fn object_type(&self) -> ObjectType {
        match self {
            GitObject::Blob(_) => ObjectType::Blob,
            GitObject::Tree(_) => ObjectType::Tree,
            GitObject::Commit(_) => ObjectType::Commit,
            GitObject::Tag(_) => ObjectType::Tag,
        }
    }

    /// The variant-specific body, with no `"<type> <len>\0"` envelope. This
    /// is the buffer whose bytes are identical whether the object ends up in
    /// a loose file or a pack entry (§3 "canonical serialization").
    pub fn encode_payload(&self) -> Result<Vec<u8>> {
        match self {
            GitObject::Blob(content) => Ok(content.clone()),
            GitObject::Tree(tree) => encode_tree(tree),
            GitObject::Commit(commit) => encode_commit(commit),
            GitObject::Tag(tag) => encode_tag(tag),
        }
    }

    /// The full `"<type> <len>\0<payload>"` envelope whose SHA-1 is this
    /// object's id.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        let payload = self.encode_payload()?;
        Ok(envelope(self.object_type(), &payload))
    }

    pub fn compute_id(&self) -> Result<ObjectId> {
        let bytes = self.canonical_bytes()?;
        ObjectId::from_bytes(&hash::hash(&bytes))
    }

    /// Decode a payload of a known type (used by both the loose store and
    /// the pack reader, after each has stripped/reconstructed its own
    /// envelope).
    pub fn decode_payload(object_type: ObjectType, payload: &[u8]) -> Result<GitObject> {
        match object_type {
            ObjectType::Blob => Ok(GitObject::Blob(payload.to_vec())),
            ObjectType::Tree => decode_tree(payload).map(GitObject::Tree),
            ObjectType::Commit => decode_commit(payload).map(GitObject::Commit),
            ObjectType::Tag => decode_tag(payload).map(GitObject::Tag),
        }
    }

    /// Decode a full `"<type> <len>\0<payload>"` envelope, verifying the
    /// declared length matches the actual remaining bytes with strict
    /// numeric canonicalization (§4.3/§4.6).
    pub fn decode_envelope(data: &[u8]) -> Result<GitObject> {
        let (object_type, payload) = split_envelope(data)?;
        Self::decode_payload(object_type, payload)
    }
}

fn envelope(object_type: ObjectType, payload: &[u8]) -> Vec<u8> {
    let header = format!("{} {}\0", object_type.as_str(), payload.len());
    let mut out = Vec::with_capacity(header.len() + payload.len());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(payload);
    out
}

/// Split a canonical `"<type> <len>\0<payload>"` buffer into its type and
/// payload, rejecting any header that is not byte-exact (leading zeros,
/// minus sign, whitespace, or a length mismatch).
pub fn split_envelope(data: &[u8]) -> Result<(ObjectType, &[u8])> {
    let nul = data
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| GitError::format_error("object header missing NUL terminator"))?;
    let header = std::str::from_utf8(&data[..nul])
        .map_err(|_| GitError::format_error("object header is not valid UTF-8"))?;

    let space = header
        .find(' ')
        .ok_or_else(|| GitError::format_error(format!("malformed object header: {:?}", header)))?;
    let type_str = &header[..space];
    let len_str = &header[space + 1..];

    let declared_len = parse_strict_u64(len_str)? as usize;
    let payload = &data[nul + 1..];
    if payload.len() != declared_len {
        return Err(GitError::format_error(format!(
            "object length mismatch: header says {}, got {}",
            declared_len,
            payload.len()
        )));
    }

    Ok((ObjectType::from_str(type_str)?, payload))
}

fn encode_tree(tree: &Tree) -> Result<Vec<u8>> {
    if !tree.is_sorted_and_unique() {
        return Err(GitError::illegal_state("tree entries are not sorted and duplicate-free"));
    }
    let mut out = Vec::new();
    for entry in &tree.entries {
        if entry.name.contains('\0') {
            return Err(GitError::illegal_state("tree entry name may not contain NUL"));
        }
        out.extend_from_slice(entry.mode.octal_str().as_bytes());
        out.push(b' ');
        out.extend_from_slice(entry.name.as_bytes());
        out.push(0);
        out.extend_from_slice(entry.id.as_bytes());
    }
    Ok(out)
}

fn decode_tree(data: &[u8]) -> Result<Tree> {
    let mut entries = Vec::new();
    let mut pos = 0;

    while pos < data.len() {
        let space = data[pos..]
            .iter()
            .position(|&b| b == b' ')
            .ok_or_else(|| GitError::format_error("tree entry missing space after mode"))?;
        let mode_str = std::str::from_utf8(&data[pos..pos + space])
            .map_err(|_| GitError::format_error("tree entry mode is not valid UTF-8"))?;
        let mode = FileMode::from_octal_str(mode_str)?;
        pos += space + 1;

        let nul = data[pos..]
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| GitError::format_error("tree entry missing NUL after name"))?;
        let name = std::str::from_utf8(&data[pos..pos + nul])
            .map_err(|_| GitError::format_error("tree entry name is not valid UTF-8"))?
            .to_string();
        pos += nul + 1;

        let id = ObjectId::from_bytes_at(data, pos)
            .map_err(|_| GitError::format_error("tree entry truncated before 20-byte id"))?;
        pos += ObjectId::LEN;

        entries.push(TreeEntry { mode, name, id });
    }

    Ok(Tree { entries })
}

fn encode_commit(commit: &Commit) -> Result<Vec<u8>> {
    let mut out = String::new();
    out.push_str("tree ");
    out.push_str(&commit.tree.to_hex());
    out.push('\n');

    let mut seen_parents = std::collections::HashSet::new();
    for parent in &commit.parents {
        if !seen_parents.insert(*parent) {
            return Err(GitError::illegal_state(format!(
                "duplicate parent in commit: {}",
                parent
            )));
        }
        out.push_str("parent ");
        out.push_str(&parent.to_hex());
        out.push('\n');
    }

    out.push_str("author ");
    out.push_str(&commit.author.format_line()?);
    out.push('\n');

    out.push_str("committer ");
    out.push_str(&commit.committer.format_line()?);
    out.push('\n');

    out.push('\n');
    out.push_str(&commit.message);

    Ok(out.into_bytes())
}

fn decode_commit(data: &[u8]) -> Result<Commit> {
    let text = std::str::from_utf8(data)
        .map_err(|_| GitError::format_error("commit object is not valid UTF-8"))?;

    let header_end = text
        .find("\n\n")
        .ok_or_else(|| GitError::format_error("commit missing blank line before message"))?;
    let header = &text[..header_end];
    let message = text[header_end + 2..].to_string();

    let mut tree: Option<TreeId> = None;
    let mut parents = Vec::new();
    let mut author: Option<Signature> = None;
    let mut committer: Option<Signature> = None;

    for line in header.lines() {
        if let Some(rest) = line.strip_prefix("tree ") {
            if tree.is_some() {
                return Err(GitError::format_error("duplicate tree line in commit"));
            }
            tree = Some(ObjectId::from_hex(rest)?);
        } else if let Some(rest) = line.strip_prefix("parent ") {
            let parent = ObjectId::from_hex(rest)?;
            if parents.contains(&parent) {
                return Err(GitError::format_error("duplicate parent in commit"));
            }
            parents.push(parent);
        } else if let Some(rest) = line.strip_prefix("author ") {
            author = Some(Signature::parse_line(rest)?);
        } else if let Some(rest) = line.strip_prefix("committer ") {
            committer = Some(Signature::parse_line(rest)?);
        } else {
            return Err(GitError::format_error(format!("unexpected commit header line: {:?}", line)));
        }
    }

    Ok(Commit {
        tree: tree.ok_or_else(|| GitError::format_error("commit missing tree line"))?,
        parents,
        author: author.ok_or_else(|| GitError::format_error("commit missing author line"))?,
        committer: committer.ok_or_else(|| GitError::format_error("commit missing committer line"))?,
        message,
    })
}

fn encode_tag(tag: &Tag) -> Result<Vec<u8>> {
    if tag.tag_name.contains('\n') {
        return Err(GitError::illegal_state("tag name may not contain a newline"));
    }
    let mut out = String::new();
    out.push_str("object ");
    out.push_str(&tag.target.to_hex());
    out.push('\n');

    out.push_str("type ");
    out.push_str(tag.target_type.as_str());
    out.push('\n');

    out.push_str("tag ");
    out.push_str(&tag.tag_name);
    out.push('\n');

    out.push_str("tagger ");
    out.push_str(&tag.tagger.format_line()?);
    out.push('\n');

    out.push('\n');
    out.push_str(&tag.message);

    Ok(out.into_bytes())
}

fn decode_tag(data: &[u8]) -> Result<Tag> {
    let text = std::str::from_utf8(data)
        .map_err(|_| GitError::format_error("tag object is not valid UTF-8"))?;

    let header_end = text
        .find("\n\n")
        .ok_or_else(|| GitError::format_error("tag missing blank line before message"))?;
    let header = &text[..header_end];
    let message = text[header_end + 2..].to_string();

    let mut target: Option<ObjectId> = None;
    let mut target_type: Option<ObjectType> = None;
    let mut tag_name: Option<String> = None;
    let mut tagger: Option<Signature> = None;

    for line in header.lines() {
        if let Some(rest) = line.strip_prefix("object ") {
            target = Some(ObjectId::from_hex(rest)?);
        } else if let Some(rest) = line.strip_prefix("type ") {
            target_type = Some(ObjectType::from_str(rest)?);
        } else if let Some(rest) = line.strip_prefix("tag ") {
            tag_name = Some(rest.to_string());
        } else if let Some(rest) = line.strip_prefix("tagger ") {
            tagger = Some(Signature::parse_line(rest)?);
        } else {
            return Err(GitError::format_error(format!("unexpected tag header line: {:?}", line)));
        }
    }

    Ok(Tag {
        target: target.ok_or_else(|| GitError::format_error("tag missing object line"))?,
        target_type: target_type.ok_or_else(|| GitError::format_error("tag missing type line"))?,
        tag_name: tag_name.ok_or_else(|| GitError::format_error("tag missing tag line"))?,
        tagger: tagger.ok_or_else(|| GitError::format_error("tag missing tagger line"))?,
        message,
    })
}
