use bstr::{BStr, BString};
use gitkv_hash::ObjectId;

use crate::{ObjectError, Signature};

/// A git commit object.
///
/// The engine only ever *creates* linear commits (one parent, no extra
/// headers), but parsing must tolerate anything the remote's history
/// contains — merges, gpg signatures, encodings. Headers the engine does
/// not model are preserved verbatim in `extra_headers`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    /// OID of the root tree.
    pub tree: ObjectId,
    /// Parent commit OIDs (empty for a root commit).
    pub parents: Vec<ObjectId>,
    pub author: Signature,
    pub committer: Signature,
    /// Unmodeled headers (gpgsig, encoding, mergetag, ...), in order.
    pub extra_headers: Vec<(BString, BString)>,
    /// Commit message (everything after the blank separator line).
    pub message: BString,
}

impl Commit {
    /// Parse commit payload bytes (no framing header).
    pub fn parse(payload: &[u8]) -> Result<Self, ObjectError> {
        let mut tree: Option<ObjectId> = None;
        let mut parents = Vec::new();
        let mut author: Option<Signature> = None;
        let mut committer: Option<Signature> = None;
        let mut extra_headers: Vec<(BString, BString)> = Vec::new();

        let data = payload;
        let mut pos = 0;

        loop {
            if pos >= data.len() {
                break;
            }
            // Blank line separates headers from message.
            if data[pos] == b'\n' {
                pos += 1;
                break;
            }

            let line_end = data[pos..]
                .iter()
                .position(|&b| b == b'\n')
                .map(|p| p + pos)
                .unwrap_or(data.len());
            let line = &data[pos..line_end];

            let space_pos = line.iter().position(|&b| b == b' ').ok_or_else(|| {
                ObjectError::InvalidHeader(format!(
                    "commit header without value: {}",
                    String::from_utf8_lossy(line)
                ))
            })?;
            let key = &line[..space_pos];
            let value = &line[space_pos + 1..];

            match key {
                b"tree" => {
                    tree = Some(parse_oid_value(value, "tree")?);
                    pos = line_end + 1;
                }
                b"parent" => {
                    parents.push(parse_oid_value(value, "parent")?);
                    pos = line_end + 1;
                }
                b"author" => {
                    author = Some(Signature::parse(BStr::new(value))?);
                    pos = line_end + 1;
                }
                b"committer" => {
                    committer = Some(Signature::parse(BStr::new(value))?);
                    pos = line_end + 1;
                }
                _ => {
                    // Unmodeled header; may continue over multiple lines,
                    // each continuation starting with a space.
                    let mut val = Vec::from(value);
                    let mut next = line_end + 1;
                    while next < data.len() && data[next] == b' ' {
                        val.push(b'\n');
                        let cont_end = data[next..]
                            .iter()
                            .position(|&b| b == b'\n')
                            .map(|p| p + next)
                            .unwrap_or(data.len());
                        val.extend_from_slice(&data[next + 1..cont_end]);
                        next = cont_end + 1;
                    }
                    extra_headers.push((BString::from(key), BString::from(val)));
                    pos = next;
                }
            }
        }

        let tree = tree.ok_or(ObjectError::MissingCommitField { field: "tree" })?;
        let author = author.ok_or(ObjectError::MissingCommitField { field: "author" })?;
        let committer = committer.ok_or(ObjectError::MissingCommitField { field: "committer" })?;

        Ok(Self {
            tree,
            parents,
            author,
            committer,
            extra_headers,
            message: BString::from(&data[pos.min(data.len())..]),
        })
    }

    /// Serialize to canonical commit payload bytes.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();

        out.extend_from_slice(b"tree ");
        out.extend_from_slice(self.tree.to_hex().as_bytes());
        out.push(b'\n');

        for parent in &self.parents {
            out.extend_from_slice(b"parent ");
            out.extend_from_slice(parent.to_hex().as_bytes());
            out.push(b'\n');
        }

        out.extend_from_slice(b"author ");
        out.extend_from_slice(&self.author.to_bytes());
        out.push(b'\n');

        out.extend_from_slice(b"committer ");
        out.extend_from_slice(&self.committer.to_bytes());
        out.push(b'\n');

        for (key, val) in &self.extra_headers {
            out.extend_from_slice(key);
            out.push(b' ');
            for (i, line) in val.split(|&b| b == b'\n').enumerate() {
                if i > 0 {
                    out.push(b'\n');
                    out.push(b' ');
                }
                out.extend_from_slice(line);
            }
            out.push(b'\n');
        }

        out.push(b'\n');
        out.extend_from_slice(&self.message);
        out
    }

    /// The first parent, if any.
    pub fn first_parent(&self) -> Option<&ObjectId> {
        self.parents.first()
    }

    /// Whether this is a root commit (no parents).
    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }
}

fn parse_oid_value(value: &[u8], field: &'static str) -> Result<ObjectId, ObjectError> {
    let hex = std::str::from_utf8(value)
        .map_err(|_| ObjectError::InvalidHeader(format!("non-UTF8 {field} OID")))?;
    Ok(ObjectId::from_hex(hex)?)
}
