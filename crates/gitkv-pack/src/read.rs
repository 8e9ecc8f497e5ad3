//! Indexing received packs into the object store.
//!
//! The fetch side hands us the raw pack bytes the server sent. Entries
//! are inflated, deltas resolved (bases may live earlier in the pack or
//! already in the store), and every resulting object is inserted into
//! the store under its computed id.

use std::collections::HashMap;
use std::io::Read;

use flate2::read::ZlibDecoder;
use gitkv_hash::{Hasher, ObjectId};
use gitkv_object::ObjectType;
use gitkv_store::MemoryStore;

use crate::delta::apply_delta;
use crate::entry::parse_entry_header;
use crate::{PackEntryKind, PackError, PACK_HEADER_SIZE, PACK_MIN_SIZE, PACK_SIGNATURE, PACK_VERSION};

/// Result of indexing a pack.
#[derive(Debug, Default)]
pub struct IndexSummary {
    /// Objects inserted into the store (deltas counted after resolution).
    pub objects_indexed: usize,
}

/// The reference to a delta base before resolution.
enum PendingBase {
    Offset(u64),
    Oid(ObjectId),
}

/// A raw entry lifted out of the pack, pre-resolution.
enum RawEntry {
    Base(ObjectType, Vec<u8>),
    Delta { base: PendingBase, data: Vec<u8> },
}

/// Parse `data` as a complete packfile and insert every contained
/// object into `store`.
///
/// An empty input is accepted and indexes nothing: the protocol layer
/// treats a missing or zero-object pack as "no new objects".
pub fn index_pack(data: &[u8], store: &MemoryStore) -> Result<IndexSummary, PackError> {
    if data.is_empty() {
        return Ok(IndexSummary::default());
    }
    if data.len() < PACK_MIN_SIZE {
        return Err(PackError::InvalidHeader(format!(
            "pack too short: {} bytes",
            data.len()
        )));
    }
    if &data[0..4] != PACK_SIGNATURE {
        return Err(PackError::InvalidHeader("missing PACK signature".into()));
    }
    let version = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
    if version != PACK_VERSION {
        return Err(PackError::UnsupportedVersion(version));
    }
    let num_objects = u32::from_be_bytes([data[8], data[9], data[10], data[11]]) as usize;

    verify_checksum(data)?;

    // Lift all raw entries out of the pack.
    let body_end = data.len() - 20;
    let mut entries: Vec<(u64, RawEntry)> = Vec::with_capacity(num_objects);
    let mut pos = PACK_HEADER_SIZE;

    for _ in 0..num_objects {
        if pos >= body_end {
            return Err(PackError::CorruptEntry(pos as u64));
        }
        let entry_offset = pos as u64;
        let header = parse_entry_header(&data[pos..body_end], entry_offset)?;
        pos += header.header_size;

        let (inflated, consumed) = inflate(&data[pos..body_end], entry_offset)?;
        if inflated.len() != header.inflated_size {
            return Err(PackError::CorruptEntry(entry_offset));
        }
        pos += consumed;

        let raw = match header.kind {
            PackEntryKind::Base(obj_type) => RawEntry::Base(obj_type, inflated),
            PackEntryKind::OfsDelta { base_offset } => RawEntry::Delta {
                base: PendingBase::Offset(base_offset),
                data: inflated,
            },
            PackEntryKind::RefDelta { base_oid } => RawEntry::Delta {
                base: PendingBase::Oid(base_oid),
                data: inflated,
            },
        };
        entries.push((entry_offset, raw));
    }

    if pos != body_end {
        return Err(PackError::CorruptEntry(pos as u64));
    }

    resolve_and_store(entries, store)
}

/// Resolve deltas and insert everything into the store.
///
/// Bases can appear after their deltas in a pack, so resolution loops
/// until a full pass makes no progress.
fn resolve_and_store(
    entries: Vec<(u64, RawEntry)>,
    store: &MemoryStore,
) -> Result<IndexSummary, PackError> {
    // Offset -> (type, payload) for entries resolved so far.
    let mut by_offset: HashMap<u64, (ObjectType, Vec<u8>)> = HashMap::new();
    let mut by_oid: HashMap<ObjectId, u64> = HashMap::new();
    let mut pending: Vec<(u64, PendingBase, Vec<u8>)> = Vec::new();
    let mut indexed = 0usize;

    for (offset, raw) in entries {
        match raw {
            RawEntry::Base(obj_type, payload) => {
                let oid = store.put_raw(obj_type, &payload)?;
                by_oid.insert(oid, offset);
                by_offset.insert(offset, (obj_type, payload));
                indexed += 1;
            }
            RawEntry::Delta { base, data } => pending.push((offset, base, data)),
        }
    }

    while !pending.is_empty() {
        let mut unresolved = Vec::with_capacity(pending.len());
        let mut progressed = false;

        for (offset, base, data) in pending {
            let resolved_base = match &base {
                PendingBase::Offset(base_offset) => by_offset
                    .get(base_offset)
                    .map(|(ty, payload)| (*ty, payload.clone())),
                PendingBase::Oid(base_oid) => by_oid
                    .get(base_oid)
                    .and_then(|off| by_offset.get(off))
                    .map(|(ty, payload)| (*ty, payload.clone()))
                    .or_else(|| {
                        store
                            .get_any(base_oid)
                            .map(|obj| (obj.kind, obj.payload().to_vec()))
                    }),
            };

            match resolved_base {
                Some((base_type, base_payload)) => {
                    let payload = apply_delta(&base_payload, &data)?;
                    let oid = store.put_raw(base_type, &payload)?;
                    by_oid.insert(oid, offset);
                    by_offset.insert(offset, (base_type, payload));
                    indexed += 1;
                    progressed = true;
                }
                None => unresolved.push((offset, base, data)),
            }
        }

        if !progressed {
            let missing = unresolved
                .iter()
                .find_map(|(_, base, _)| match base {
                    PendingBase::Oid(oid) => Some(*oid),
                    PendingBase::Offset(_) => None,
                })
                .unwrap_or(ObjectId::NULL);
            return Err(PackError::MissingBase(missing));
        }
        pending = unresolved;
    }

    Ok(IndexSummary {
        objects_indexed: indexed,
    })
}

/// Inflate one zlib stream from the front of `data`.
///
/// Returns the inflated bytes and the number of compressed bytes
/// consumed, so the caller can find the next entry.
fn inflate(data: &[u8], entry_offset: u64) -> Result<(Vec<u8>, usize), PackError> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|_| PackError::CorruptEntry(entry_offset))?;
    Ok((out, decoder.total_in() as usize))
}

fn verify_checksum(data: &[u8]) -> Result<(), PackError> {
    let body = &data[..data.len() - 20];
    let expected = ObjectId::from_bytes(&data[data.len() - 20..])?;
    let actual = Hasher::digest(body)?;
    if actual != expected {
        return Err(PackError::ChecksumMismatch { expected, actual });
    }
    Ok(())
}
