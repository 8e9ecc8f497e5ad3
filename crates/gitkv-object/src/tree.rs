use std::cmp::Ordering;

use bstr::{BStr, BString, ByteSlice};
use gitkv_hash::ObjectId;

use crate::ObjectError;

/// Mode of a tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryMode {
    /// Regular file (100644)
    Regular,
    /// Executable file (100755)
    Executable,
    /// Symbolic link (120000)
    Symlink,
    /// Submodule link (160000)
    Gitlink,
    /// Subdirectory (040000)
    Dir,
    /// Unrecognized mode, preserved for round-trip.
    Unknown(u32),
}

impl EntryMode {
    /// Parse from octal ASCII bytes (e.g., `b"100644"`).
    pub fn from_bytes(s: &[u8]) -> Result<Self, ObjectError> {
        let raw = parse_octal(s)
            .ok_or_else(|| ObjectError::InvalidEntryMode(String::from_utf8_lossy(s).into()))?;
        Ok(Self::from_raw(raw))
    }

    /// Create from the raw numeric value.
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0o100644 => Self::Regular,
            0o100755 => Self::Executable,
            0o120000 => Self::Symlink,
            0o160000 => Self::Gitlink,
            0o040000 => Self::Dir,
            other => Self::Unknown(other),
        }
    }

    /// Serialize to octal ASCII (git's canonical format, no leading zeros).
    pub fn as_bytes(&self) -> BString {
        BString::from(format!("{:o}", self.raw()))
    }

    /// The raw numeric value.
    pub fn raw(&self) -> u32 {
        match self {
            Self::Regular => 0o100644,
            Self::Executable => 0o100755,
            Self::Symlink => 0o120000,
            Self::Gitlink => 0o160000,
            Self::Dir => 0o40000,
            Self::Unknown(v) => *v,
        }
    }

    /// Is this a directory entry?
    pub fn is_dir(&self) -> bool {
        matches!(self, Self::Dir)
    }

    /// Is this a file entry (regular or executable)?
    pub fn is_file(&self) -> bool {
        matches!(self, Self::Regular | Self::Executable)
    }
}

fn parse_octal(s: &[u8]) -> Option<u32> {
    if s.is_empty() {
        return None;
    }
    let mut val: u32 = 0;
    for &b in s {
        if !(b'0'..=b'7').contains(&b) {
            return None;
        }
        val = val.checked_mul(8)?.checked_add(u32::from(b - b'0'))?;
    }
    Some(val)
}

/// A single entry in a tree object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub mode: EntryMode,
    pub name: BString,
    pub oid: ObjectId,
}

impl TreeEntry {
    pub fn file(name: impl Into<BString>, oid: ObjectId) -> Self {
        Self {
            mode: EntryMode::Regular,
            name: name.into(),
            oid,
        }
    }

    pub fn dir(name: impl Into<BString>, oid: ObjectId) -> Self {
        Self {
            mode: EntryMode::Dir,
            name: name.into(),
            oid,
        }
    }
}

impl PartialOrd for TreeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TreeEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        entry_name_compare(
            self.name.as_ref(),
            self.mode.is_dir(),
            other.name.as_ref(),
            other.mode.is_dir(),
        )
    }
}

/// Git's canonical tree entry comparison.
///
/// Directory names compare as though suffixed with `/`, so "foo" (dir)
/// sorts after "foo.c" but a file "foo" sorts before it.
pub fn entry_name_compare(name1: &[u8], is_dir1: bool, name2: &[u8], is_dir2: bool) -> Ordering {
    let min_len = name1.len().min(name2.len());
    let cmp = name1[..min_len].cmp(&name2[..min_len]);
    if cmp != Ordering::Equal {
        return cmp;
    }
    let c1 = if name1.len() > min_len {
        name1[min_len]
    } else if is_dir1 {
        b'/'
    } else {
        0
    };
    let c2 = if name2.len() > min_len {
        name2[min_len]
    } else if is_dir2 {
        b'/'
    } else {
        0
    };
    c1.cmp(&c2)
}

/// A git tree object — an ordered directory listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tree {
    pub entries: Vec<TreeEntry>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse tree payload from binary format.
    ///
    /// Each entry is `<mode-octal> <name>\0<20-byte-oid>`.
    pub fn parse(payload: &[u8]) -> Result<Self, ObjectError> {
        let mut entries = Vec::new();
        let mut pos = 0;

        while pos < payload.len() {
            let space_pos = payload[pos..]
                .iter()
                .position(|&b| b == b' ')
                .ok_or_else(|| ObjectError::InvalidTreeEntry {
                    offset: pos,
                    reason: "missing space after mode".into(),
                })?
                + pos;

            let mode = EntryMode::from_bytes(&payload[pos..space_pos]).map_err(|_| {
                ObjectError::InvalidTreeEntry {
                    offset: pos,
                    reason: "invalid mode".into(),
                }
            })?;

            let name_start = space_pos + 1;
            let null_pos = payload[name_start..]
                .iter()
                .position(|&b| b == 0)
                .ok_or_else(|| ObjectError::InvalidTreeEntry {
                    offset: name_start,
                    reason: "missing null after name".into(),
                })?
                + name_start;

            let name = BString::from(&payload[name_start..null_pos]);
            if name.is_empty() {
                return Err(ObjectError::InvalidTreeEntry {
                    offset: name_start,
                    reason: "empty entry name".into(),
                });
            }

            let oid_start = null_pos + 1;
            let oid_end = oid_start + 20;
            if oid_end > payload.len() {
                return Err(ObjectError::InvalidTreeEntry {
                    offset: oid_start,
                    reason: "truncated OID".into(),
                });
            }

            let oid = ObjectId::from_bytes(&payload[oid_start..oid_end])?;

            entries.push(TreeEntry { mode, name, oid });
            pos = oid_end;
        }

        Ok(Self { entries })
    }

    /// Serialize to binary format, entries in canonical sort order.
    pub fn serialize(&self) -> Vec<u8> {
        let mut sorted = self.entries.clone();
        sorted.sort();

        let mut out = Vec::new();
        for entry in &sorted {
            out.extend_from_slice(&entry.mode.as_bytes());
            out.push(b' ');
            out.extend_from_slice(&entry.name);
            out.push(0);
            out.extend_from_slice(entry.oid.as_bytes());
        }
        out
    }

    /// Sort entries into canonical order in place.
    pub fn sort(&mut self) {
        self.entries.sort();
    }

    /// Lookup an entry by name.
    pub fn find(&self, name: &BStr) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| e.name.as_bstr() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TreeEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_from_bytes() {
        assert_eq!(EntryMode::from_bytes(b"100644").unwrap(), EntryMode::Regular);
        assert_eq!(
            EntryMode::from_bytes(b"100755").unwrap(),
            EntryMode::Executable
        );
        assert_eq!(EntryMode::from_bytes(b"120000").unwrap(), EntryMode::Symlink);
        assert_eq!(EntryMode::from_bytes(b"160000").unwrap(), EntryMode::Gitlink);
        assert_eq!(EntryMode::from_bytes(b"40000").unwrap(), EntryMode::Dir);
        assert!(EntryMode::from_bytes(b"10x644").is_err());
    }

    #[test]
    fn mode_roundtrip() {
        for mode in [
            EntryMode::Regular,
            EntryMode::Executable,
            EntryMode::Symlink,
            EntryMode::Gitlink,
            EntryMode::Dir,
        ] {
            assert_eq!(EntryMode::from_bytes(&mode.as_bytes()).unwrap(), mode);
        }
    }

    #[test]
    fn dir_serializes_without_leading_zero() {
        assert_eq!(EntryMode::Dir.as_bytes(), "40000");
    }

    #[test]
    fn dir_sorts_as_if_slash_suffixed() {
        // "foo/" > "foo.c" because '/' (0x2f) > '.' (0x2e)
        let dir = TreeEntry::dir("foo", ObjectId::NULL);
        let file = TreeEntry::file("foo.c", ObjectId::NULL);
        assert_eq!(dir.cmp(&file), Ordering::Greater);

        // "foo/" > "foo-" too
        let hyphen = TreeEntry::file("foo-bar", ObjectId::NULL);
        assert_eq!(dir.cmp(&hyphen), Ordering::Greater);

        // but a *file* named "foo" sorts before "foo.c"
        let plain = TreeEntry::file("foo", ObjectId::NULL);
        assert_eq!(plain.cmp(&file), Ordering::Less);
    }

    #[test]
    fn parse_empty_tree() {
        assert!(Tree::parse(b"").unwrap().is_empty());
    }

    #[test]
    fn parse_single_entry() {
        let oid = ObjectId::from_hex("da39a3ee5e6b4b0d3255bfef95601890afd80709").unwrap();
        let mut data = Vec::new();
        data.extend_from_slice(b"100644 hello.txt\0");
        data.extend_from_slice(oid.as_bytes());

        let tree = Tree::parse(&data).unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.entries[0].mode, EntryMode::Regular);
        assert_eq!(tree.entries[0].name, "hello.txt");
        assert_eq!(tree.entries[0].oid, oid);
    }

    #[test]
    fn serialize_sorts_entries() {
        let oid = ObjectId::from_hex("0000000000000000000000000000000000000001").unwrap();
        let tree = Tree {
            entries: vec![TreeEntry::file("b.txt", oid), TreeEntry::dir("a-dir", oid)],
        };

        let parsed = Tree::parse(&tree.serialize()).unwrap();
        assert_eq!(parsed.entries[0].name, "a-dir");
        assert_eq!(parsed.entries[1].name, "b.txt");
    }

    #[test]
    fn serialize_parse_roundtrip() {
        let oid = ObjectId::from_hex("da39a3ee5e6b4b0d3255bfef95601890afd80709").unwrap();
        let mut tree = Tree {
            entries: vec![
                TreeEntry::file("README.md", oid),
                TreeEntry::dir("src", oid),
                TreeEntry::file("a", oid),
            ],
        };
        tree.sort();
        let parsed = Tree::parse(&tree.serialize()).unwrap();
        assert_eq!(parsed, tree);
    }

    #[test]
    fn rejects_empty_name() {
        let oid = ObjectId::NULL;
        let mut data = Vec::new();
        data.extend_from_slice(b"100644 \0");
        data.extend_from_slice(oid.as_bytes());
        assert!(Tree::parse(&data).is_err());
    }

    #[test]
    fn find_entry() {
        let tree = Tree {
            entries: vec![
                TreeEntry::file("README.md", ObjectId::NULL),
                TreeEntry::dir("src", ObjectId::NULL),
            ],
        };
        assert!(tree.find(BStr::new("README.md")).is_some());
        assert!(tree.find(BStr::new("absent")).is_none());
    }
}
