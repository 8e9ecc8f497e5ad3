//! In-memory content-addressed object storage.
//!
//! `MemoryStore` maps object ids to encoded objects. Insertion computes
//! the id from the framed payload, so everything a caller gets back
//! satisfies the identity `oid == sha1("<kind> <size>\0<payload>")`.
//!
//! The store is ephemeral by contract: the owning backend periodically
//! replaces it wholesale to cap memory, and callers must be prepared to
//! re-fetch anything that has gone missing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use gitkv_hash::{HashError, Hasher, ObjectId};
use gitkv_object::ObjectType;

/// Errors produced by store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Hash(#[from] HashError),
}

/// An encoded object held by the store.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub kind: ObjectType,
    pub data: Arc<[u8]>,
}

impl StoredObject {
    pub fn payload(&self) -> &[u8] {
        &self.data
    }
}

/// A writable object buffer, finalized by [`MemoryStore::put`].
#[derive(Debug)]
pub struct BlankObject {
    kind: ObjectType,
    buf: Vec<u8>,
}

impl BlankObject {
    pub fn kind(&self) -> ObjectType {
        self.kind
    }

    pub fn write(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }
}

impl std::io::Write for BlankObject {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// In-memory object store keyed by content address.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<ObjectId, StoredObject>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new object of the given kind.
    pub fn new_blank(&self, kind: ObjectType) -> BlankObject {
        BlankObject {
            kind,
            buf: Vec::new(),
        }
    }

    /// Finalize a blank object: compute its id and insert it.
    pub fn put(&self, blank: BlankObject) -> Result<ObjectId, StoreError> {
        self.put_raw(blank.kind, &blank.buf)
    }

    /// Insert an encoded payload, returning its computed id.
    ///
    /// Re-inserting an identical payload is a no-op yielding the same id.
    pub fn put_raw(&self, kind: ObjectType, payload: &[u8]) -> Result<ObjectId, StoreError> {
        let oid = Hasher::hash_object(kind.as_str(), payload)?;
        let mut objects = self.objects.lock().unwrap();
        objects.entry(oid).or_insert_with(|| StoredObject {
            kind,
            data: Arc::from(payload.to_vec().into_boxed_slice()),
        });
        Ok(oid)
    }

    /// Look up an object by kind and id.
    ///
    /// Returns `None` when the id is absent *or* when the stored kind
    /// differs from the requested one; a mismatched-kind lookup never
    /// succeeds with the wrong type.
    pub fn get(&self, kind: ObjectType, oid: &ObjectId) -> Option<StoredObject> {
        let objects = self.objects.lock().unwrap();
        objects.get(oid).filter(|o| o.kind == kind).cloned()
    }

    /// Look up an object by id regardless of kind. Used by delta
    /// resolution, where the base's kind is dictated by the pack.
    pub fn get_any(&self, oid: &ObjectId) -> Option<StoredObject> {
        self.objects.lock().unwrap().get(oid).cloned()
    }

    pub fn contains(&self, kind: ObjectType, oid: &ObjectId) -> bool {
        let objects = self.objects.lock().unwrap();
        objects.get(oid).is_some_and(|o| o.kind == kind)
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.lock().unwrap().is_empty()
    }

    /// Take the store lock for a span of related lookups.
    ///
    /// The packfile builder walks reachable objects under a single lock
    /// so the pack reflects one consistent view of the store.
    pub fn lock(&self) -> StoreView<'_> {
        StoreView {
            guard: self.objects.lock().unwrap(),
        }
    }
}

/// A locked view of the store's contents.
pub struct StoreView<'a> {
    guard: MutexGuard<'a, HashMap<ObjectId, StoredObject>>,
}

impl StoreView<'_> {
    pub fn get(&self, kind: ObjectType, oid: &ObjectId) -> Option<&StoredObject> {
        self.guard.get(oid).filter(|o| o.kind == kind)
    }

    pub fn contains(&self, kind: ObjectType, oid: &ObjectId) -> bool {
        self.get(kind, oid).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_computes_framed_identity() {
        let store = MemoryStore::new();
        let oid = store.put_raw(ObjectType::Blob, b"").unwrap();
        // git hash-object of the empty blob
        assert_eq!(oid.to_hex(), "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391");
        assert_eq!(
            oid,
            Hasher::hash_object("blob", b"").unwrap()
        );
    }

    #[test]
    fn put_is_idempotent() {
        let store = MemoryStore::new();
        let a = store.put_raw(ObjectType::Blob, b"content").unwrap();
        let b = store.put_raw(ObjectType::Blob, b"content").unwrap();
        assert_eq!(a, b);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn blank_object_write_then_put() {
        let store = MemoryStore::new();
        let mut blank = store.new_blank(ObjectType::Blob);
        blank.write(b"hello");
        blank.write(b" world");
        let oid = store.put(blank).unwrap();
        let got = store.get(ObjectType::Blob, &oid).unwrap();
        assert_eq!(got.payload(), b"hello world");
    }

    #[test]
    fn get_misses_on_absent_oid() {
        let store = MemoryStore::new();
        assert!(store.get(ObjectType::Blob, &ObjectId::NULL).is_none());
    }

    #[test]
    fn get_misses_on_kind_mismatch() {
        let store = MemoryStore::new();
        let oid = store.put_raw(ObjectType::Blob, b"x").unwrap();
        assert!(store.get(ObjectType::Tree, &oid).is_none());
        assert!(store.get(ObjectType::Blob, &oid).is_some());
        assert!(!store.contains(ObjectType::Commit, &oid));
    }

    #[test]
    fn get_any_ignores_kind() {
        let store = MemoryStore::new();
        let oid = store.put_raw(ObjectType::Tree, b"").unwrap();
        assert_eq!(store.get_any(&oid).unwrap().kind, ObjectType::Tree);
    }

    #[test]
    fn locked_view_sees_contents() {
        let store = MemoryStore::new();
        let oid = store.put_raw(ObjectType::Blob, b"v").unwrap();
        let view = store.lock();
        assert!(view.contains(ObjectType::Blob, &oid));
        assert!(view.get(ObjectType::Tree, &oid).is_none());
    }

    #[test]
    fn distinct_payloads_distinct_ids() {
        let store = MemoryStore::new();
        let a = store.put_raw(ObjectType::Blob, b"a").unwrap();
        let b = store.put_raw(ObjectType::Blob, b"b").unwrap();
        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn same_payload_different_kind_distinct_ids() {
        let store = MemoryStore::new();
        let a = store.put_raw(ObjectType::Blob, b"").unwrap();
        let b = store.put_raw(ObjectType::Tree, b"").unwrap();
        assert_ne!(a, b);
    }
}
