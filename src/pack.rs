//! The v2 pack file format: a sorted-id index for O(log n) lookup, and a
//! reader that resolves base and delta entries into full objects.
//!
//! A pack stores objects back to back, each independently zlib-compressed;
//! `ofs-delta`/`ref-delta` entries store a byte diff against another object
//! in the same pack rather than the full payload. Resolving one means
//! walking the delta chain down to a base object and replaying the diffs
//! back up — done here iteratively, with a depth cap, so a malicious or
//! pathologically long chain cannot blow the stack.

use std::fs;
use std::io::Read;
use std::path::Path;

use flate2::read::ZlibDecoder;

use crate::error::{GitError, Result};
use crate::hash;
use crate::id::ObjectId;
use crate::object::{GitObject, ObjectType};
use crate::varint;

pub const IDX_SIGNATURE: [u8; 4] = [0xff, b't', b'O', b'c'];
pub const IDX_VERSION: u32 = 2;
pub const PACK_SIGNATURE: [u8; 4] = *b"PACK";
pub const PACK_VERSION: u32 = 2;

/// Hard cap on delta chain depth. Git itself does not bound this, but an
/// unbounded walk is an easy denial-of-service vector for a library reading
/// packs it did not produce.
pub const MAX_DELTA_DEPTH: usize = 256;

const OFS_DELTA_TAG: u8 = 6;
const REF_DELTA_TAG: u8 = 7;

/// A parsed pack-index (`.idx`) v2 file: every object id in the companion
/// pack, sorted, paired with its byte offset into that pack.
pub struct PackIndex {
    ids: Vec<ObjectId>,
    offsets: Vec<u64>,
    pack_checksum: [u8; 20],
    idx_checksum: [u8; 20],
    raw: Vec<u8>,
}

impl PackIndex {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 8 + 256 * 4 {
            return Err(GitError::format_error("pack index truncated before fanout table"));
        }
        if data[0..4] != IDX_SIGNATURE {
            return Err(GitError::format_error("not a v2 pack index (bad magic)"));
        }
        let version = u32::from_be_bytes(data[4..8].try_into().unwrap());
        if version != IDX_VERSION {
            return Err(GitError::format_error(format!("unsupported pack index version: {}", version)));
        }

        let mut fanout = [0u32; 256];
        let mut pos = 8;
        for slot in fanout.iter_mut() {
            *slot = u32::from_be_bytes(data[pos..pos + 4].try_into().unwrap());
            pos += 4;
        }
        if fanout.windows(2).any(|w| w[0] > w[1]) {
            return Err(GitError::format_error("pack index fanout table is not monotonic"));
        }
        let count = fanout[255] as usize;

        let ids_start = pos;
        let ids_end = ids_start + count * ObjectId::LEN;
        let ids_bytes = data
            .get(ids_start..ids_end)
            .ok_or_else(|| GitError::format_error("pack index truncated in id table"))?;
        let mut ids = Vec::with_capacity(count);
        for chunk in ids_bytes.chunks_exact(ObjectId::LEN) {
            ids.push(ObjectId::from_bytes(chunk)?);
        }
        if ids.windows(2).any(|w| w[0] >= w[1]) {
            return Err(GitError::format_error("pack index id table is not strictly sorted"));
        }

        // CRC32 table: one u32 per object, parsed to advance the cursor but
        // never validated (§9 "supplemented features").
        let crc_start = ids_end;
        let crc_end = crc_start + count * 4;
        if data.get(crc_start..crc_end).is_none() {
            return Err(GitError::format_error("pack index truncated in CRC32 table"));
        }

        let off_start = crc_end;
        let off_end = off_start + count * 4;
        let off_bytes = data
            .get(off_start..off_end)
            .ok_or_else(|| GitError::format_error("pack index truncated in offset table"))?;

        let mut raw_offsets = Vec::with_capacity(count);
        let mut max_ext_index: Option<usize> = None;
        for chunk in off_bytes.chunks_exact(4) {
            let v = u32::from_be_bytes(chunk.try_into().unwrap());
            if v & 0x8000_0000 != 0 {
                let idx = (v & 0x7fff_ffff) as usize;
                max_ext_index = Some(max_ext_index.map_or(idx, |m| m.max(idx)));
            }
            raw_offsets.push(v);
        }

        let ext_count = max_ext_index.map(|m| m + 1).unwrap_or(0);
        let ext_start = off_end;
        let ext_end = ext_start + ext_count * 8;
        let ext_bytes = if ext_count > 0 {
            data.get(ext_start..ext_end)
                .ok_or_else(|| GitError::format_error("pack index truncated in extended offset table"))?
        } else {
            &[]
        };

        let mut offsets = Vec::with_capacity(count);
        for v in raw_offsets {
            if v & 0x8000_0000 != 0 {
                let idx = (v & 0x7fff_ffff) as usize;
                let bytes = &ext_bytes[idx * 8..idx * 8 + 8];
                offsets.push(u64::from_be_bytes(bytes.try_into().unwrap()));
            } else {
                offsets.push(v as u64);
            }
        }

        let trailer_start = ext_end;
        let trailer = data
            .get(trailer_start..trailer_start + 40)
            .ok_or_else(|| GitError::format_error("pack index truncated in trailer"))?;
        if trailer_start + 40 != data.len() {
            return Err(GitError::format_error("trailing bytes after pack index trailer"));
        }

        let mut pack_checksum = [0u8; 20];
        pack_checksum.copy_from_slice(&trailer[0..20]);
        let mut idx_checksum = [0u8; 20];
        idx_checksum.copy_from_slice(&trailer[20..40]);

        // §4.5 item 8: the idx-sha trailer is read here so parsing doesn't
        // desync, but it is "not verified by the core" — that check is an
        // opt-in left to `verify_checksum`, not a condition of a successful
        // parse.
        Ok(PackIndex { ids, offsets, pack_checksum, idx_checksum, raw: data.to_vec() })
    }

    /// Recompute the idx file's own trailing SHA-1 over everything but the
    /// last 20 bytes and compare it against the stored `idx-sha`. Not called
    /// implicitly by `parse`; callers opt in when they want to check a
    /// freshly-received index before trusting it (§9, mirroring
    /// `PackReader::verify_trailer`'s pack-sha counterpart).
    pub fn verify_checksum(&self) -> Result<()> {
        let split = self.raw.len() - 20;
        let actual = hash::hash(&self.raw[..split]);
        if actual != self.idx_checksum {
            return Err(GitError::HashMismatch {
                expected: ObjectId::from_bytes(&self.idx_checksum)?,
                actual: ObjectId::from_bytes(&actual)?,
            });
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn find(&self, id: &ObjectId) -> Option<u64> {
        self.ids.binary_search(id).ok().map(|i| self.offsets[i])
    }

    /// Objects whose hex id starts with `prefix`, found by binary-searching
    /// the sentinel range rather than a linear scan.
    pub fn ids_with_prefix(&self, prefix: &str) -> Result<Vec<ObjectId>> {
        let low = ObjectId::low_sentinel(prefix)?;
        let high = ObjectId::high_sentinel(prefix)?;
        let start = self.ids.partition_point(|id| *id < low);
        let end = self.ids.partition_point(|id| *id <= high);
        Ok(self.ids[start..end].to_vec())
    }

    pub fn pack_checksum(&self) -> &[u8; 20] {
        &self.pack_checksum
    }
}

enum RawEntry {
    Base { object_type: ObjectType, data: Vec<u8> },
    OfsDelta { base_offset: u64, delta: Vec<u8> },
}

/// A pack file plus its index, ready to resolve objects by id.
pub struct PackReader {
    pack_data: Vec<u8>,
    index: PackIndex,
}

impl PackReader {
    pub fn open(pack_path: impl AsRef<Path>, idx_path: impl AsRef<Path>) -> Result<Self> {
        let pack_data = fs::read(pack_path.as_ref())?;
        let idx_data = fs::read(idx_path.as_ref())?;
        Self::from_bytes(pack_data, &idx_data)
    }

    pub fn from_bytes(pack_data: Vec<u8>, idx_data: &[u8]) -> Result<Self> {
        if pack_data.len() < 12 {
            return Err(GitError::format_error("pack file truncated before header"));
        }
        if pack_data[0..4] != PACK_SIGNATURE {
            return Err(GitError::format_error("not a pack file (bad magic)"));
        }
        let version = u32::from_be_bytes(pack_data[4..8].try_into().unwrap());
        if version != PACK_VERSION {
            return Err(GitError::format_error(format!("unsupported pack version: {}", version)));
        }
        let declared_count = u32::from_be_bytes(pack_data[8..12].try_into().unwrap()) as usize;

        let index = PackIndex::parse(idx_data)?;
        if index.len() != declared_count {
            return Err(GitError::format_error(format!(
                "pack header declares {} objects but index has {}",
                declared_count,
                index.len()
            )));
        }

        log::debug!("opened pack file with {} objects", declared_count);
        Ok(Self { pack_data, index })
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.index.find(id).is_some()
    }

    pub fn ids_with_prefix(&self, prefix: &str) -> Result<Vec<ObjectId>> {
        self.index.ids_with_prefix(prefix)
    }

    /// Resolve `id` to a full object, walking and applying any delta chain.
    ///
    /// Before returning, the reconstructed bytes are re-wrapped in their
    /// canonical `"<type> <len>\0"` envelope and hashed; a mismatch against
    /// the requested id is a `HashMismatch`, never a silently wrong object
    /// (§4.5 "Integrity").
    pub fn resolve(&self, id: &ObjectId) -> Result<GitObject> {
        let offset = self
            .index
            .find(id)
            .ok_or_else(|| GitError::not_found(format!("object {} not in pack", id)))?;
        let (object_type, payload) = self.resolve_at(offset)?;

        let header = format!("{} {}\0", object_type.as_str(), payload.len());
        let mut canonical = Vec::with_capacity(header.len() + payload.len());
        canonical.extend_from_slice(header.as_bytes());
        canonical.extend_from_slice(&payload);
        let actual = ObjectId::from_bytes(&hash::hash(&canonical))?;
        if actual != *id {
            return Err(GitError::HashMismatch { expected: *id, actual });
        }

        GitObject::decode_payload(object_type, &payload)
    }

    /// Verify the pack's trailing SHA-1 against its actual content. Not
    /// called implicitly by `resolve`; callers opt in when they want to
    /// check a freshly-received pack before trusting it (§9).
    pub fn verify_trailer(&self) -> Result<()> {
        if self.pack_data.len() < 20 {
            return Err(GitError::format_error("pack file too short to contain a trailer"));
        }
        let split = self.pack_data.len() - 20;
        let expected = ObjectId::from_bytes(&self.pack_data[split..])?;
        let actual = ObjectId::from_bytes(&hash::hash(&self.pack_data[..split]))?;
        if expected != actual {
            return Err(GitError::HashMismatch { expected, actual });
        }
        Ok(())
    }

    fn read_raw_entry(&self, offset: u64) -> Result<RawEntry> {
        let start = offset as usize;
        let header = self
            .pack_data
            .get(start..)
            .ok_or_else(|| GitError::format_error("pack entry offset out of range"))?;
        let (type_tag, size, header_len) = varint::decode_object_header(header)?;
        let mut pos = start + header_len;

        match type_tag {
            1..=4 => {
                let object_type = ObjectType::from_pack_type_tag(type_tag)?;
                let data = decompress_zlib_at(&self.pack_data, pos)?;
                if data.len() as u64 != size {
                    return Err(GitError::format_error(
                        "pack entry inflated size does not match declared size",
                    ));
                }
                Ok(RawEntry::Base { object_type, data })
            }
            OFS_DELTA_TAG => {
                let (rel_offset, consumed) = varint::decode_offset_delta(&self.pack_data[pos..])?;
                pos += consumed;
                let base_offset = offset
                    .checked_sub(rel_offset)
                    .ok_or_else(|| GitError::format_error("ofs-delta base offset underflows pack start"))?;
                let delta = decompress_zlib_at(&self.pack_data, pos)?;
                Ok(RawEntry::OfsDelta { base_offset, delta })
            }
            REF_DELTA_TAG => Err(GitError::format_error(
                "reference-delta pack entries (type 7) are not supported",
            )),
            other => Err(GitError::format_error(format!("unsupported pack entry type tag: {}", other))),
        }
    }

    /// Iteratively walk the delta chain starting at `offset` down to its
    /// base, then replay deltas back up to reconstruct the final object.
    fn resolve_at(&self, offset: u64) -> Result<(ObjectType, Vec<u8>)> {
        enum Link {
            Base(ObjectType, Vec<u8>),
            Delta(Vec<u8>),
        }

        let mut chain = Vec::new();
        let mut current = offset;

        loop {
            if chain.len() >= MAX_DELTA_DEPTH {
                log::debug!(
                    "delta chain at offset {} exceeded maximum depth of {}",
                    offset,
                    MAX_DELTA_DEPTH
                );
                return Err(GitError::format_error(format!(
                    "delta chain exceeds maximum depth of {}",
                    MAX_DELTA_DEPTH
                )));
            }
            match self.read_raw_entry(current)? {
                RawEntry::Base { object_type, data } => {
                    log::trace!(
                        "delta chain from offset {} reached base entry at offset {} after {} link(s)",
                        offset,
                        current,
                        chain.len()
                    );
                    chain.push(Link::Base(object_type, data));
                    break;
                }
                RawEntry::OfsDelta { base_offset, delta } => {
                    log::trace!("following ofs-delta link at offset {} to base offset {}", current, base_offset);
                    chain.push(Link::Delta(delta));
                    current = base_offset;
                }
            }
        }

        let (object_type, mut data) = match chain.pop().expect("chain always ends in a base entry") {
            Link::Base(object_type, data) => (object_type, data),
            Link::Delta(_) => unreachable!("loop only breaks after pushing a Base link"),
        };

        while let Some(link) = chain.pop() {
            match link {
                Link::Delta(delta) => data = apply_delta(&data, &delta)?,
                Link::Base(..) => unreachable!("only one Base link is ever pushed"),
            }
        }

        Ok((object_type, data))
    }
}

fn decompress_zlib_at(data: &[u8], offset: usize) -> Result<Vec<u8>> {
    let slice = data
        .get(offset..)
        .ok_or_else(|| GitError::format_error("pack entry compressed data offset out of range"))?;
    let mut decoder = ZlibDecoder::new(slice);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| GitError::format_error(format!("zlib inflate failed in pack entry: {}", e)))?;
    Ok(out)
}

/// Apply one delta instruction stream to `base`, per §4.5 "delta
/// application": a base-length check, a result-length varint, then a
/// sequence of copy/insert ops.
fn apply_delta(base: &[u8], delta: &[u8]) -> Result<Vec<u8>> {
    let (base_len, mut pos) = varint::decode_delta_size(delta)?;
    if base_len as usize != base.len() {
        return Err(GitError::format_error("delta base length does not match actual base size"));
    }
    let (result_len, consumed) = varint::decode_delta_size(&delta[pos..])?;
    pos += consumed;

    let mut out = Vec::with_capacity(result_len as usize);

    while pos < delta.len() {
        let op = delta[pos];
        pos += 1;

        if op & 0x80 != 0 {
            let mut copy_offset: u32 = 0;
            let mut copy_len: u32 = 0;
            for i in 0..4u32 {
                if op & (1 << i) != 0 {
                    let byte = *delta
                        .get(pos)
                        .ok_or_else(|| GitError::format_error("truncated delta copy offset"))?;
                    pos += 1;
                    copy_offset |= (byte as u32) << (8 * i);
                }
            }
            for i in 0..3u32 {
                if op & (1 << (4 + i)) != 0 {
                    let byte = *delta
                        .get(pos)
                        .ok_or_else(|| GitError::format_error("truncated delta copy length"))?;
                    pos += 1;
                    copy_len |= (byte as u32) << (8 * i);
                }
            }
            if copy_len == 0 {
                copy_len = 0x10000;
            }
            let start = copy_offset as usize;
            let end = start
                .checked_add(copy_len as usize)
                .ok_or_else(|| GitError::format_error("delta copy range overflows"))?;
            let slice = base
                .get(start..end)
                .ok_or_else(|| GitError::format_error("delta copy range exceeds base object"))?;
            out.extend_from_slice(slice);
        } else {
            let len = op as usize;
            if len == 0 {
                return Err(GitError::format_error("delta insert op with zero length"));
            }
            let slice = delta
                .get(pos..pos + len)
                .ok_or_else(|| GitError::format_error("truncated delta insert payload"))?;
            out.extend_from_slice(slice);
            pos += len;
        }
    }

    if out.len() as u64 != result_len {
        return Err(GitError::format_error("delta result length does not match reconstructed size"));
    }

    Ok(out)
}
