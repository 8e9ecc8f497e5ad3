//! Pack encoding: header, non-delta zlib entries, SHA-1 trailer.
//!
//! The push side sends every object as a standalone entry; delta
//! compression is a transfer optimization the receiving side does not
//! require, and the packs the engine pushes are small.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use gitkv_hash::{Hasher, ObjectId};
use gitkv_object::ObjectType;

use crate::entry::encode_entry_header;
use crate::{PackError, PACK_HEADER_SIZE, PACK_SIGNATURE, PACK_VERSION};

/// Result of pack encoding.
#[derive(Debug)]
pub struct EncodeSummary {
    pub num_objects: u32,
    pub bytes_written: u64,
    pub checksum: ObjectId,
}

/// Encode the given objects as a complete packfile into `out`.
///
/// A zero-object input still produces a valid (empty) pack: header plus
/// checksum trailer.
pub fn encode_pack<D: AsRef<[u8]>>(
    objects: &[(ObjectType, D)],
    out: &mut dyn Write,
) -> Result<EncodeSummary, PackError> {
    let mut hasher = Hasher::new();
    let mut total: u64 = 0;

    let mut header = [0u8; PACK_HEADER_SIZE];
    header[0..4].copy_from_slice(PACK_SIGNATURE);
    header[4..8].copy_from_slice(&PACK_VERSION.to_be_bytes());
    header[8..12].copy_from_slice(&(objects.len() as u32).to_be_bytes());

    out.write_all(&header)?;
    hasher.update(&header);
    total += header.len() as u64;

    for (obj_type, payload) in objects {
        let payload = payload.as_ref();

        let entry_header = encode_entry_header(*obj_type, payload.len() as u64);
        out.write_all(&entry_header)?;
        hasher.update(&entry_header);
        total += entry_header.len() as u64;

        let mut compressed = Vec::new();
        {
            let mut encoder = ZlibEncoder::new(&mut compressed, Compression::default());
            encoder.write_all(payload)?;
            encoder.finish()?;
        }
        out.write_all(&compressed)?;
        hasher.update(&compressed);
        total += compressed.len() as u64;
    }

    let checksum = hasher.finalize()?;
    out.write_all(checksum.as_bytes())?;
    total += checksum.as_bytes().len() as u64;

    Ok(EncodeSummary {
        num_objects: objects.len() as u32,
        bytes_written: total,
        checksum,
    })
}
