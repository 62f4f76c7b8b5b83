//! Integration tests that build real on-disk fixture repositories —
//! loose objects, a hand-assembled v2 pack with an offset-delta entry,
//! and loose/packed refs — and drive them through `Repository`.

use std::fs;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use git_core::{
    hash, varint, Commit, FileMode, GitObject, ObjectId, Repository, Signature, Tree, TreeEntry,
};

const OFS_DELTA_TAG: u8 = 6;

fn init_repo() -> (tempfile::TempDir, Repository) {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("objects")).unwrap();
    fs::create_dir_all(dir.path().join("refs")).unwrap();
    fs::write(dir.path().join("config"), b"").unwrap();
    let repo = Repository::open(dir.path()).unwrap();
    (dir, repo)
}

/// §8 end-to-end scenario: a single commit on `heads/master` whose tree
/// holds one `README` file with content `"hi\n"`.
#[test]
fn end_to_end_commit_tree_blob_round_trips_through_a_fresh_repository() {
    let (_dir, repo) = init_repo();

    let blob = GitObject::Blob(b"hi\n".to_vec());
    let blob_id = repo.write(&blob).unwrap();

    let tree = Tree::new(vec![TreeEntry::new(FileMode::Regular, "README", blob_id)]);
    let tree_id = repo.write(&GitObject::Tree(tree)).unwrap();

    let author = Signature::new("Ada", "ada@example.com", 1_700_000_000, 0);
    let commit = Commit {
        tree: tree_id,
        parents: vec![],
        author: author.clone(),
        committer: author,
        message: "initial\n".to_string(),
    };
    let commit_id = repo.write(&GitObject::Commit(commit)).unwrap();

    repo.write_reference("heads/master", Some(commit_id)).unwrap();

    let read_commit_id = repo.read_reference("heads/master").unwrap();
    assert_eq!(read_commit_id, commit_id);

    let read_commit = match repo.read(&read_commit_id).unwrap() {
        GitObject::Commit(commit) => commit,
        other => panic!("expected a commit, got {:?}", other.object_type()),
    };

    let read_tree = match repo.read(&read_commit.tree).unwrap() {
        GitObject::Tree(tree) => tree,
        other => panic!("expected a tree, got {:?}", other.object_type()),
    };
    assert_eq!(read_tree.entries.len(), 1);
    assert_eq!(read_tree.entries[0].name, "README");
    assert_eq!(read_tree.entries[0].mode, FileMode::Regular);

    let read_blob = match repo.read(&read_tree.entries[0].id).unwrap() {
        GitObject::Blob(bytes) => bytes,
        other => panic!("expected a blob, got {:?}", other.object_type()),
    };
    assert_eq!(read_blob, b"hi\n");
}

/// Writing the same three objects to an independent empty repository
/// reproduces the same ids, since identity is purely content-derived.
#[test]
fn rewriting_the_same_objects_to_a_fresh_repository_reproduces_the_same_ids() {
    let (_dir_a, repo_a) = init_repo();
    let (_dir_b, repo_b) = init_repo();

    let blob_id_a = repo_a.write(&GitObject::Blob(b"hi\n".to_vec())).unwrap();
    let blob_id_b = repo_b.write(&GitObject::Blob(b"hi\n".to_vec())).unwrap();
    assert_eq!(blob_id_a, blob_id_b);

    let tree = Tree::new(vec![TreeEntry::new(FileMode::Regular, "README", blob_id_a)]);
    let tree_id_a = repo_a.write(&GitObject::Tree(tree.clone())).unwrap();
    let tree_id_b = repo_b.write(&GitObject::Tree(tree)).unwrap();
    assert_eq!(tree_id_a, tree_id_b);
}

fn zlib_compress(data: &[u8]) -> Vec<u8> {
    use std::io::Write;
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Build a v2 pack + idx pair holding a base blob and an ofs-delta blob
/// that reconstructs to `delta_target`, and drop both under
/// `objects/pack/` in `git_dir`.
fn write_pack_fixture(git_dir: &std::path::Path, base_payload: &[u8], delta_target: &[u8]) {
    let base_id = GitObject::Blob(base_payload.to_vec()).compute_id().unwrap();
    let delta_id = GitObject::Blob(delta_target.to_vec()).compute_id().unwrap();

    let mut pack = Vec::new();
    pack.extend_from_slice(b"PACK");
    pack.extend_from_slice(&2u32.to_be_bytes());
    pack.extend_from_slice(&2u32.to_be_bytes());

    let base_offset = pack.len() as u64;
    pack.extend_from_slice(&varint::encode_object_header(3, base_payload.len() as u64));
    pack.extend_from_slice(&zlib_compress(base_payload));

    let delta_offset = pack.len() as u64;
    let mut delta_stream = Vec::new();
    delta_stream.extend_from_slice(&varint::encode_delta_size(base_payload.len() as u64));
    delta_stream.extend_from_slice(&varint::encode_delta_size(delta_target.len() as u64));
    assert!(delta_target.len() <= 0x7f, "fixture only supports small inserts");
    delta_stream.push(delta_target.len() as u8);
    delta_stream.extend_from_slice(delta_target);

    pack.extend_from_slice(&varint::encode_object_header(
        OFS_DELTA_TAG,
        delta_stream.len() as u64,
    ));
    pack.extend_from_slice(&varint::encode_offset_delta(delta_offset - base_offset));
    pack.extend_from_slice(&zlib_compress(&delta_stream));

    let pack_checksum = hash::hash(&pack);
    pack.extend_from_slice(&pack_checksum);

    let mut entries = vec![(base_id, base_offset), (delta_id, delta_offset)];
    entries.sort_by_key(|(id, _)| *id);

    let mut idx = Vec::new();
    idx.extend_from_slice(&[0xff, b't', b'O', b'c']);
    idx.extend_from_slice(&2u32.to_be_bytes());

    let mut fanout = [0u32; 256];
    for (id, _) in &entries {
        let first_byte = id.byte(0) as usize;
        for slot in fanout.iter_mut().skip(first_byte) {
            *slot += 1;
        }
    }
    for count in fanout {
        idx.extend_from_slice(&count.to_be_bytes());
    }
    for (id, _) in &entries {
        idx.extend_from_slice(id.as_bytes());
    }
    for _ in &entries {
        idx.extend_from_slice(&0u32.to_be_bytes());
    }
    for (_, offset) in &entries {
        idx.extend_from_slice(&(*offset as u32).to_be_bytes());
    }
    idx.extend_from_slice(&pack_checksum);
    let idx_checksum = hash::hash(&idx);
    idx.extend_from_slice(&idx_checksum);

    let pack_dir = git_dir.join("objects").join("pack");
    fs::create_dir_all(&pack_dir).unwrap();
    fs::write(pack_dir.join("pack-fixture.pack"), &pack).unwrap();
    fs::write(pack_dir.join("pack-fixture.idx"), &idx).unwrap();
}

#[test]
fn repository_resolves_objects_out_of_a_hand_assembled_pack() {
    let (dir, repo) = init_repo();
    write_pack_fixture(dir.path(), b"base content", b"delta target content");

    let delta_id = GitObject::Blob(b"delta target content".to_vec())
        .compute_id()
        .unwrap();
    assert!(repo.contains(&delta_id).unwrap());
    let object = repo.read(&delta_id).unwrap();
    assert_eq!(object, GitObject::Blob(b"delta target content".to_vec()));

    let base_id = GitObject::Blob(b"base content".to_vec()).compute_id().unwrap();
    let object = repo.read(&base_id).unwrap();
    assert_eq!(object, GitObject::Blob(b"base content".to_vec()));
}

#[test]
fn repository_reads_objects_from_loose_storage_and_packs_side_by_side() {
    let (dir, repo) = init_repo();
    write_pack_fixture(dir.path(), b"packed base", b"packed delta target");

    let loose_id = repo.write(&GitObject::Blob(b"loose and proud".to_vec())).unwrap();

    let packed_id = GitObject::Blob(b"packed delta target".to_vec())
        .compute_id()
        .unwrap();

    assert_eq!(
        repo.read(&loose_id).unwrap(),
        GitObject::Blob(b"loose and proud".to_vec())
    );
    assert_eq!(
        repo.read(&packed_id).unwrap(),
        GitObject::Blob(b"packed delta target".to_vec())
    );
}

/// Branch and remote refs round-trip through loose files; tags are
/// excluded from the default listing but appear when tags are requested.
#[test]
fn references_round_trip_and_respect_the_tags_default() {
    let (_dir, repo) = init_repo();
    let id = repo.write(&GitObject::Blob(b"ref target".to_vec())).unwrap();

    repo.write_reference("heads/master", Some(id)).unwrap();
    repo.write_reference("tags/v1", Some(id)).unwrap();

    let refs = repo.list_references().unwrap();
    assert!(refs.iter().any(|r| r.name == "heads/master"));
    assert!(!refs.iter().any(|r| r.name == "tags/v1"));

    let all_refs = repo.list_references_including_tags().unwrap();
    assert!(all_refs.iter().any(|r| r.name == "tags/v1"));
}

/// §8 graph scenario: commits A → B → C and B → D, built through a real
/// on-disk repository rather than the in-memory fixture.
#[test]
fn commit_graph_walks_a_branching_history_read_from_disk() {
    let (_dir, repo) = init_repo();

    fn commit(tree: ObjectId, parents: Vec<ObjectId>) -> Commit {
        let signature = Signature::new("Grace", "grace@example.com", 1_700_000_000, 0);
        Commit {
            tree,
            parents,
            author: signature.clone(),
            committer: signature,
            message: "msg\n".to_string(),
        }
    }

    let tree_id = repo
        .write(&GitObject::Tree(Tree::new(Vec::new())))
        .unwrap();

    let a_id = repo.write(&GitObject::Commit(commit(tree_id, vec![]))).unwrap();
    let b_id = repo
        .write(&GitObject::Commit(commit(tree_id, vec![a_id])))
        .unwrap();
    let c_id = repo
        .write(&GitObject::Commit(commit(tree_id, vec![b_id])))
        .unwrap();
    let d_id = repo
        .write(&GitObject::Commit(commit(tree_id, vec![b_id])))
        .unwrap();

    let mut graph = git_core::CommitGraph::new();
    graph.add_history(&repo, &[c_id, d_id]).unwrap();

    assert_eq!(graph.roots(), std::collections::BTreeSet::from([a_id]));
    assert_eq!(graph.leaves(), std::collections::BTreeSet::from([c_id, d_id]));
    assert_eq!(graph.longest_chain_len(), 3);
}

#[test]
fn closing_a_repository_rejects_further_calls() {
    let (_dir, mut repo) = init_repo();
    repo.close();
    let err = repo.write(&GitObject::Blob(b"too late".to_vec())).unwrap_err();
    assert_eq!(err.kind(), git_core::ErrorKind::Closed);
}
