//! The tree engine: pure path resolution and tree mutation over the
//! object store.
//!
//! Paths map directly onto nested tree objects. Mutation rebuilds the
//! spine of trees along the path, persisting each rebuilt subtree into
//! the store and returning the new root OID.

use bstr::{BString, ByteSlice};
use gitkv_hash::ObjectId;
use gitkv_object::{ObjectType, Tree, TreeEntry};
use gitkv_store::MemoryStore;

use crate::error::{ApiError, ErrorKind};

/// Deepest path the engine accepts.
pub const MAX_PATH_DEPTH: usize = 64;

/// Split and validate a request path into tree-entry names.
///
/// One leading `/` is stripped. Segments must be non-empty, must not be
/// `.` or `..`, and must not contain NUL. Invalid paths name no
/// storable resource and are reported as `NotFound`.
pub fn split_path(path: &str) -> Result<Vec<BString>, ApiError> {
    let path = path.strip_prefix('/').unwrap_or(path);
    if path.is_empty() {
        return Err(ApiError::with_source(ErrorKind::NotFound, "empty path"));
    }

    let segments: Vec<BString> = path.split('/').map(BString::from).collect();
    if segments.len() > MAX_PATH_DEPTH {
        return Err(ApiError::with_source(
            ErrorKind::NotFound,
            format!("path exceeds {MAX_PATH_DEPTH} segments"),
        ));
    }
    for segment in &segments {
        let bytes: &[u8] = segment.as_ref();
        if bytes.is_empty() || bytes == b"." || bytes == b".." || bytes.contains(&0u8) {
            return Err(ApiError::with_source(
                ErrorKind::NotFound,
                format!("invalid path segment: {:?}", segment),
            ));
        }
    }
    Ok(segments)
}

/// Resolve a path against a root tree.
///
/// Returns the blob OID when every intermediate segment is a directory
/// and the terminal entry is a regular or executable file; `None`
/// otherwise. Symlinks and submodules are not traversed.
pub fn resolve_path(
    store: &MemoryStore,
    root: &Tree,
    segments: &[BString],
) -> Result<Option<ObjectId>, ApiError> {
    let mut current = root.clone();
    for (i, segment) in segments.iter().enumerate() {
        let (mode, oid) = match current.find(segment.as_bstr()) {
            Some(entry) => (entry.mode, entry.oid),
            None => return Ok(None),
        };
        if i + 1 == segments.len() {
            return Ok(mode.is_file().then_some(oid));
        }
        if !mode.is_dir() {
            return Ok(None);
        }
        current = load_tree(store, &oid)?;
    }
    Ok(None)
}

/// Rebind `segments` to `blob` (or remove the entry when `None`),
/// returning the new root tree's OID.
///
/// Missing intermediate directories are created for writes; a removal
/// below a missing directory is a no-op at that level. Every rebuilt
/// tree is re-sorted, encoded, and persisted. An emptied subtree stays
/// represented; empty directories are not pruned.
pub fn set_path(
    store: &MemoryStore,
    tree: &Tree,
    segments: &[BString],
    blob: Option<ObjectId>,
) -> Result<ObjectId, ApiError> {
    let (name, rest) = segments
        .split_first()
        .expect("split_path yields at least one segment");

    let replacement: Option<TreeEntry> = if rest.is_empty() {
        blob.map(|oid| TreeEntry::file(name.clone(), oid))
    } else {
        let subtree = match tree.find(name.as_bstr()) {
            Some(entry) if entry.mode.is_dir() => load_tree(store, &entry.oid)?,
            // Absent, or a non-directory in the way: removals have
            // nothing to do here; writes start a fresh subtree.
            _ => {
                if blob.is_none() {
                    return persist_tree(store, tree);
                }
                Tree::new()
            }
        };
        let sub_oid = set_path(store, &subtree, rest, blob)?;
        Some(TreeEntry::dir(name.clone(), sub_oid))
    };

    let mut rebuilt = Tree::new();
    for entry in &tree.entries {
        if entry.name != *name {
            rebuilt.entries.push(entry.clone());
        }
    }
    if let Some(entry) = replacement {
        rebuilt.entries.push(entry);
    }
    rebuilt.sort();
    persist_tree(store, &rebuilt)
}

/// Load and decode a tree object from the store.
pub fn load_tree(store: &MemoryStore, oid: &ObjectId) -> Result<Tree, ApiError> {
    let obj = store
        .get(ObjectType::Tree, oid)
        .ok_or_else(|| ApiError::internal(format!("tree {oid} missing from store")))?;
    Tree::parse(obj.payload())
        .map_err(|e| ApiError::with_source(ErrorKind::Internal, e))
}

fn persist_tree(store: &MemoryStore, tree: &Tree) -> Result<ObjectId, ApiError> {
    store
        .put_raw(ObjectType::Tree, &tree.serialize())
        .map_err(|e| ApiError::with_source(ErrorKind::Internal, e))
}
