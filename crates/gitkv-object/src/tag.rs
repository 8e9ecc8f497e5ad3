use bstr::{BStr, BString};
use gitkv_hash::ObjectId;

use crate::{ObjectError, ObjectType, Signature};

/// An annotated tag object.
///
/// The engine never creates tags, but fetched packs can carry them when
/// the remote's history references one; the store must be able to hold
/// and re-serialize them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    /// OID of the tagged object.
    pub object: ObjectId,
    /// Kind of the tagged object.
    pub target_type: ObjectType,
    /// Tag name.
    pub name: BString,
    /// Tagger identity; optional in ancient tags.
    pub tagger: Option<Signature>,
    /// Tag message.
    pub message: BString,
}

impl Tag {
    /// Parse tag payload bytes (no framing header).
    pub fn parse(payload: &[u8]) -> Result<Self, ObjectError> {
        let mut object: Option<ObjectId> = None;
        let mut target_type: Option<ObjectType> = None;
        let mut name: Option<BString> = None;
        let mut tagger: Option<Signature> = None;

        let mut pos = 0;
        while pos < payload.len() {
            if payload[pos] == b'\n' {
                pos += 1;
                break;
            }
            let line_end = payload[pos..]
                .iter()
                .position(|&b| b == b'\n')
                .map(|p| p + pos)
                .unwrap_or(payload.len());
            let line = &payload[pos..line_end];

            if let Some(space_pos) = line.iter().position(|&b| b == b' ') {
                let key = &line[..space_pos];
                let value = &line[space_pos + 1..];
                match key {
                    b"object" => {
                        let hex = std::str::from_utf8(value).map_err(|_| {
                            ObjectError::InvalidHeader("non-UTF8 tag object OID".into())
                        })?;
                        object = Some(ObjectId::from_hex(hex)?);
                    }
                    b"type" => target_type = Some(ObjectType::from_bytes(value)?),
                    b"tag" => name = Some(BString::from(value)),
                    b"tagger" => tagger = Some(Signature::parse(BStr::new(value))?),
                    _ => {}
                }
            }
            pos = line_end + 1;
        }

        Ok(Self {
            object: object.ok_or(ObjectError::MissingTagField { field: "object" })?,
            target_type: target_type.ok_or(ObjectError::MissingTagField { field: "type" })?,
            name: name.ok_or(ObjectError::MissingTagField { field: "tag" })?,
            tagger,
            message: BString::from(&payload[pos.min(payload.len())..]),
        })
    }

    /// Serialize to canonical tag payload bytes.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"object ");
        out.extend_from_slice(self.object.to_hex().as_bytes());
        out.push(b'\n');
        out.extend_from_slice(b"type ");
        out.extend_from_slice(self.target_type.as_str().as_bytes());
        out.push(b'\n');
        out.extend_from_slice(b"tag ");
        out.extend_from_slice(&self.name);
        out.push(b'\n');
        if let Some(ref tagger) = self.tagger {
            out.extend_from_slice(b"tagger ");
            out.extend_from_slice(&tagger.to_bytes());
            out.push(b'\n');
        }
        out.push(b'\n');
        out.extend_from_slice(&self.message);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tag_bytes() -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"object da39a3ee5e6b4b0d3255bfef95601890afd80709\n");
        out.extend_from_slice(b"type commit\n");
        out.extend_from_slice(b"tag v1.0\n");
        out.extend_from_slice(b"tagger A <a@b.com> 1234567890 +0000\n");
        out.extend_from_slice(b"\nrelease\n");
        out
    }

    #[test]
    fn parse_tag() {
        let tag = Tag::parse(&sample_tag_bytes()).unwrap();
        assert_eq!(tag.name, "v1.0");
        assert_eq!(tag.target_type, ObjectType::Commit);
        assert_eq!(tag.message, "release\n");
        assert!(tag.tagger.is_some());
    }

    #[test]
    fn serialize_roundtrip() {
        let original = sample_tag_bytes();
        let tag = Tag::parse(&original).unwrap();
        assert_eq!(tag.serialize(), original);
    }

    #[test]
    fn missing_object_errors() {
        let data = b"type commit\ntag v1\n\nmsg\n";
        assert!(Tag::parse(data).is_err());
    }
}
