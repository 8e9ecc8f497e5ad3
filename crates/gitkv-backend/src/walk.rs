//! Packfile construction: walk the objects reachable from a commit
//! that exist locally, and encode them into a pack.
//!
//! The walk holds the store lock for its whole duration, and encoding
//! completes before the lock is released, so the pack reflects one
//! consistent view. Objects absent from the local store are skipped:
//! the remote already has them (blob-filtered fetches leave remote
//! blobs out of the store by design).

use std::collections::HashSet;
use std::sync::Arc;

use gitkv_hash::ObjectId;
use gitkv_object::{Commit, ObjectType, Tree};
use gitkv_pack::encode::encode_pack;
use gitkv_store::{MemoryStore, StoreView};

use crate::error::{ApiError, ErrorKind};

/// Build a pack of every locally-present object reachable from
/// `commit_oid`.
pub fn build_pack(store: &MemoryStore, commit_oid: &ObjectId) -> Result<Vec<u8>, ApiError> {
    let view = store.lock();
    let mut objects: Vec<(ObjectType, Arc<[u8]>)> = Vec::new();
    let mut seen: HashSet<ObjectId> = HashSet::new();

    let commit_obj = view
        .get(ObjectType::Commit, commit_oid)
        .ok_or_else(|| ApiError::internal(format!("commit {commit_oid} missing from store")))?;
    objects.push((ObjectType::Commit, commit_obj.data.clone()));
    seen.insert(*commit_oid);

    let commit = Commit::parse(&commit_obj.data)
        .map_err(|e| ApiError::with_source(ErrorKind::Internal, e))?;
    collect_tree(&view, &commit.tree, &mut objects, &mut seen)?;

    let mut pack = Vec::new();
    encode_pack(&objects, &mut pack)
        .map_err(|e| ApiError::with_source(ErrorKind::Internal, e))?;

    tracing::debug!(
        commit = %commit_oid,
        objects = objects.len(),
        bytes = pack.len(),
        "pack built"
    );
    Ok(pack)
}

fn collect_tree(
    view: &StoreView<'_>,
    oid: &ObjectId,
    objects: &mut Vec<(ObjectType, Arc<[u8]>)>,
    seen: &mut HashSet<ObjectId>,
) -> Result<(), ApiError> {
    if !seen.insert(*oid) {
        return Ok(());
    }
    // A tree we do not hold came from the remote; it and everything
    // below it is already there.
    let Some(tree_obj) = view.get(ObjectType::Tree, oid) else {
        return Ok(());
    };
    objects.push((ObjectType::Tree, tree_obj.data.clone()));

    let tree = Tree::parse(&tree_obj.data)
        .map_err(|e| ApiError::with_source(ErrorKind::Internal, e))?;
    for entry in &tree.entries {
        if entry.mode.is_file() {
            if seen.contains(&entry.oid) {
                continue;
            }
            if let Some(blob) = view.get(ObjectType::Blob, &entry.oid) {
                seen.insert(entry.oid);
                objects.push((ObjectType::Blob, blob.data.clone()));
            }
        } else if entry.mode.is_dir() {
            collect_tree(view, &entry.oid, objects, seen)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{set_path, split_path};
    use gitkv_object::Signature;
    use gitkv_pack::read::index_pack;

    fn make_commit(store: &MemoryStore, tree: ObjectId, parents: Vec<ObjectId>) -> ObjectId {
        let sig = Signature {
            name: "t".into(),
            email: "t@example.com".into(),
            timestamp: 1_700_000_000,
            tz_offset: 0,
        };
        let commit = Commit {
            tree,
            parents,
            author: sig.clone(),
            committer: sig,
            extra_headers: Vec::new(),
            message: "write doc\n".into(),
        };
        store
            .put_raw(ObjectType::Commit, &commit.serialize())
            .unwrap()
    }

    #[test]
    fn pack_contains_reachable_closure() {
        let store = MemoryStore::new();
        let blob = store.put_raw(ObjectType::Blob, b"payload").unwrap();
        let root = set_path(
            &store,
            &Tree::default(),
            &split_path("dir/file.txt").unwrap(),
            Some(blob),
        )
        .unwrap();
        let commit = make_commit(&store, root, vec![]);

        let pack = build_pack(&store, &commit).unwrap();

        // Re-index into a fresh store: commit + 2 trees + blob.
        let target = MemoryStore::new();
        let summary = index_pack(&pack, &target).unwrap();
        assert_eq!(summary.objects_indexed, 4);
        assert!(target.contains(ObjectType::Commit, &commit));
        assert!(target.contains(ObjectType::Tree, &root));
        assert!(target.contains(ObjectType::Blob, &blob));
    }

    #[test]
    fn locally_absent_blobs_skipped() {
        let store = MemoryStore::new();
        // Hand-build a tree pointing at a blob the store does not hold
        // (as after a blob-filtered fetch).
        let ghost = ObjectId::from_hex("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa").unwrap();
        let mut tree = Tree::default();
        tree.entries
            .push(gitkv_object::TreeEntry::file("remote.txt", ghost));
        let root = store.put_raw(ObjectType::Tree, &tree.serialize()).unwrap();
        let commit = make_commit(&store, root, vec![]);

        let pack = build_pack(&store, &commit).unwrap();
        let target = MemoryStore::new();
        let summary = index_pack(&pack, &target).unwrap();
        // Commit and tree only; the ghost blob is the remote's problem.
        assert_eq!(summary.objects_indexed, 2);
    }

    #[test]
    fn shared_blob_emitted_once() {
        let store = MemoryStore::new();
        let blob = store.put_raw(ObjectType::Blob, b"same").unwrap();
        let segments_a = split_path("a.txt").unwrap();
        let segments_b = split_path("b.txt").unwrap();

        let root1 = set_path(&store, &Tree::default(), &segments_a, Some(blob)).unwrap();
        let tree1 = crate::tree::load_tree(&store, &root1).unwrap();
        let root2 = set_path(&store, &tree1, &segments_b, Some(blob)).unwrap();
        let commit = make_commit(&store, root2, vec![]);

        let pack = build_pack(&store, &commit).unwrap();
        // Object count lives in the pack header.
        let count = u32::from_be_bytes([pack[8], pack[9], pack[10], pack[11]]);
        // commit + root tree + one blob (deduplicated)
        assert_eq!(count, 3);
    }

    #[test]
    fn missing_commit_is_internal_error() {
        let store = MemoryStore::new();
        let err = build_pack(&store, &ObjectId::NULL).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}
