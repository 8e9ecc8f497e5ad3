//! Pack entry header codec.
//!
//! Each pack entry starts with a variable-length header: type in bits
//! 6-4 of the first byte, size in a little-endian base-128 chain, then
//! a delta base reference for OFS_DELTA / REF_DELTA entries.

use gitkv_hash::ObjectId;
use gitkv_object::ObjectType;

use crate::{PackEntryKind, PackError};

/// A parsed entry header.
#[derive(Debug, Clone)]
pub struct EntryHeader {
    pub kind: PackEntryKind,
    /// Size of the entry's data after zlib inflation (for deltas, the
    /// size of the delta instruction stream).
    pub inflated_size: usize,
    /// Bytes consumed by the header, including any base reference.
    pub header_size: usize,
}

/// Parse an entry header starting at `data[0]`.
///
/// `entry_offset` is the absolute offset of the entry in the pack,
/// needed to resolve OFS_DELTA back-references.
pub fn parse_entry_header(data: &[u8], entry_offset: u64) -> Result<EntryHeader, PackError> {
    if data.is_empty() {
        return Err(PackError::CorruptEntry(entry_offset));
    }

    let mut pos = 0;
    let first = data[pos];
    pos += 1;

    let type_num = (first >> 4) & 0x07;
    let mut size: u64 = (first & 0x0f) as u64;
    let mut shift = 4;

    let mut byte = first;
    while byte & 0x80 != 0 {
        if pos >= data.len() {
            return Err(PackError::CorruptEntry(entry_offset));
        }
        byte = data[pos];
        pos += 1;
        size |= ((byte & 0x7f) as u64) << shift;
        shift += 7;
    }

    let kind = match type_num {
        1 | 2 | 3 | 4 => PackEntryKind::Base(
            ObjectType::from_pack_type_number(type_num)
                .expect("1..=4 are valid pack type numbers"),
        ),
        6 => {
            // OFS_DELTA: big-endian base-128 with offset-encoding bias
            if pos >= data.len() {
                return Err(PackError::CorruptEntry(entry_offset));
            }
            let mut c = data[pos];
            pos += 1;
            let mut back = (c & 0x7f) as u64;
            while c & 0x80 != 0 {
                if pos >= data.len() {
                    return Err(PackError::CorruptEntry(entry_offset));
                }
                back += 1;
                c = data[pos];
                pos += 1;
                back = (back << 7) + (c & 0x7f) as u64;
            }
            if back == 0 || back > entry_offset {
                return Err(PackError::CorruptEntry(entry_offset));
            }
            PackEntryKind::OfsDelta {
                base_offset: entry_offset - back,
            }
        }
        7 => {
            // REF_DELTA: 20-byte base OID
            if pos + 20 > data.len() {
                return Err(PackError::CorruptEntry(entry_offset));
            }
            let base_oid = ObjectId::from_bytes(&data[pos..pos + 20])
                .map_err(|_| PackError::CorruptEntry(entry_offset))?;
            pos += 20;
            PackEntryKind::RefDelta { base_oid }
        }
        _ => return Err(PackError::CorruptEntry(entry_offset)),
    };

    Ok(EntryHeader {
        kind,
        inflated_size: size as usize,
        header_size: pos,
    })
}

/// Encode a non-delta entry header for the given type and size.
pub fn encode_entry_header(obj_type: ObjectType, size: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(10);
    let mut s = size;

    let mut c = (obj_type.pack_type_number() << 4) | (s & 0x0f) as u8;
    s >>= 4;

    while s > 0 {
        buf.push(c | 0x80);
        c = (s & 0x7f) as u8;
        s >>= 7;
    }
    buf.push(c);
    buf
}
