//! Node representation and checksum fingerprinting.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The three node kinds. Directories of either kind hold children and no
/// content; files hold content and no children. The split is enforced by
/// construction, not checked at use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    Dir,
    File,
    TransientDir,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Dir => write!(f, "dir"),
            NodeKind::File => write!(f, "file"),
            NodeKind::TransientDir => write!(f, "transient-dir"),
        }
    }
}

/// A directory vertex. `next_sequence` is the parent-local counter behind
/// sequential creates; it only ever grows, so generated names never repeat
/// within the directory's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirNode {
    pub version: u64,
    pub checksum: u32,
    pub next_sequence: u64,
    pub children: BTreeMap<String, Node>,
}

/// A file vertex. Content is an opaque byte string; it is stored, hashed,
/// and served back exactly as received.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileNode {
    pub version: u64,
    pub checksum: u32,
    pub content: Vec<u8>,
}

/// A vertex in the tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Node {
    Dir(DirNode),
    TransientDir(DirNode),
    File(FileNode),
}

impl Node {
    pub fn new_dir(transient: bool) -> Self {
        let dir = DirNode {
            version: 0,
            checksum: 0,
            next_sequence: 0,
            children: BTreeMap::new(),
        };
        let mut node = if transient {
            Node::TransientDir(dir)
        } else {
            Node::Dir(dir)
        };
        node.recompute_checksum();
        node
    }

    pub fn new_file(content: Vec<u8>) -> Self {
        let mut node = Node::File(FileNode {
            version: 0,
            checksum: 0,
            content,
        });
        node.recompute_checksum();
        node
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Dir(_) => NodeKind::Dir,
            Node::TransientDir(_) => NodeKind::TransientDir,
            Node::File(_) => NodeKind::File,
        }
    }

    pub fn version(&self) -> u64 {
        match self {
            Node::Dir(d) | Node::TransientDir(d) => d.version,
            Node::File(f) => f.version,
        }
    }

    pub fn checksum(&self) -> u32 {
        match self {
            Node::Dir(d) | Node::TransientDir(d) => d.checksum,
            Node::File(f) => f.checksum,
        }
    }

    /// The zero-padded lowercase 8-hex form used in headers and JSON.
    pub fn checksum_hex(&self) -> String {
        format!("{:08x}", self.checksum())
    }

    pub fn as_dir(&self) -> Option<&DirNode> {
        match self {
            Node::Dir(d) | Node::TransientDir(d) => Some(d),
            Node::File(_) => None,
        }
    }

    pub fn as_dir_mut(&mut self) -> Option<&mut DirNode> {
        match self {
            Node::Dir(d) | Node::TransientDir(d) => Some(d),
            Node::File(_) => None,
        }
    }

    pub fn is_dir_kind(&self) -> bool {
        !matches!(self, Node::File(_))
    }

    pub fn is_empty_transient_dir(&self) -> bool {
        matches!(self, Node::TransientDir(d) if d.children.is_empty())
    }

    /// Recompute this node's fingerprint from its own state and its
    /// children's stored checksums. Children must already be current, so
    /// mutation paths recompute bottom-up.
    pub fn recompute_checksum(&mut self) {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(self.kind().to_string().as_bytes());
        hasher.update(b"\0");
        hasher.update(&self.version().to_be_bytes());
        let checksum = match self {
            Node::File(f) => {
                hasher.update(&f.content);
                hasher.finalize()
            }
            Node::Dir(d) | Node::TransientDir(d) => {
                for (name, child) in &d.children {
                    hasher.update(name.as_bytes());
                    hasher.update(b"\0");
                    hasher.update(&child.checksum().to_be_bytes());
                }
                hasher.finalize()
            }
        };
        match self {
            Node::Dir(d) | Node::TransientDir(d) => d.checksum = checksum,
            Node::File(f) => f.checksum = checksum,
        }
    }

    /// Client-facing view of this node. Full views of files carry content;
    /// full views of directories carry child stubs. Stubs carry neither.
    pub fn view(&self, path: &str, full: bool) -> NodeView {
        let mut view = NodeView {
            path: path.to_string(),
            kind: self.kind(),
            version: self.version(),
            checksum: self.checksum_hex(),
            content: None,
            children: None,
        };
        if !full {
            return view;
        }
        match self {
            Node::File(f) => view.content = Some(f.content.clone()),
            Node::Dir(d) | Node::TransientDir(d) => {
                view.children = Some(
                    d.children
                        .iter()
                        .map(|(name, child)| child.view(&crate::path::join(path, name), false))
                        .collect(),
                );
            }
        }
        view
    }
}

/// The JSON shape of a node in HTTP responses.
///
/// `content` holds the file's raw bytes; the JSON rendering shows them as a
/// string (lossily, for display only). Byte-exact retrieval is the raw GET
/// body, which serves the bytes straight from this field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeView {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub version: u64,
    pub checksum: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "content_as_string"
    )]
    pub content: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<NodeView>>,
}

mod content_as_string {
    use serde::{Deserialize as _, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        content: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match content {
            Some(bytes) => serializer.serialize_str(&String::from_utf8_lossy(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        let value: Option<String> = Option::deserialize(deserializer)?;
        Ok(value.map(String::into_bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_display() {
        assert_eq!(NodeKind::Dir.to_string(), "dir");
        assert_eq!(NodeKind::File.to_string(), "file");
        assert_eq!(NodeKind::TransientDir.to_string(), "transient-dir");
    }

    #[test]
    fn test_checksum_is_deterministic() {
        let a = Node::new_file("hello".into());
        let b = Node::new_file("hello".into());
        assert_eq!(a.checksum(), b.checksum());
        assert_eq!(a.checksum_hex().len(), 8);

        let c = Node::new_file("other".into());
        assert_ne!(a.checksum(), c.checksum());
    }

    #[test]
    fn test_checksum_covers_version_and_children() {
        let mut file = Node::new_file("same".into());
        let before = file.checksum();
        if let Node::File(f) = &mut file {
            f.version += 1;
        }
        file.recompute_checksum();
        assert_ne!(before, file.checksum());

        let mut dir = Node::new_dir(false);
        let empty = dir.checksum();
        dir.as_dir_mut()
            .unwrap()
            .children
            .insert("child".into(), Node::new_file(Vec::new()));
        dir.recompute_checksum();
        assert_ne!(empty, dir.checksum());
    }

    #[test]
    fn test_checksum_hex_is_zero_padded() {
        // any node whose crc happens to be small still renders 8 chars
        let node = Node::new_file("x".into());
        let hex = node.checksum_hex();
        assert_eq!(hex.len(), 8);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hex, hex.to_lowercase());
    }

    #[test]
    fn test_view_shapes() {
        let mut dir = Node::new_dir(false);
        dir.as_dir_mut()
            .unwrap()
            .children
            .insert("file".into(), Node::new_file("body".into()));
        dir.recompute_checksum();

        let full = dir.view("/d", true);
        let children = full.children.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].path, "/d/file");
        // stubs omit both content and children
        assert_eq!(children[0].content, None);
        assert_eq!(children[0].children, None);

        let file = Node::new_file("body".into());
        let view = file.view("/d/file", true);
        assert_eq!(view.content.as_deref(), Some(b"body".as_slice()));
        assert_eq!(view.children, None);
    }

    #[test]
    fn test_content_is_opaque_bytes() {
        // not valid UTF-8; must survive storage and views untouched
        let payload = vec![0xFF, 0xFE, 0x00, 0x41];
        let file = Node::new_file(payload.clone());
        let view = file.view("/bin", true);
        assert_eq!(view.content.as_deref(), Some(payload.as_slice()));

        // the JSON rendering of a view is still a string field
        let json = serde_json::to_value(&view).unwrap();
        assert!(json["content"].is_string());

        // snapshots carry the exact bytes
        let wire = serde_json::to_string(&file).unwrap();
        let back: Node = serde_json::from_str(&wire).unwrap();
        let Node::File(f) = back else {
            panic!("expected a file");
        };
        assert_eq!(f.content, payload);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let mut dir = Node::new_dir(true);
        dir.as_dir_mut()
            .unwrap()
            .children
            .insert("f".into(), Node::new_file("payload".into()));
        dir.recompute_checksum();

        let json = serde_json::to_string(&dir).unwrap();
        let back: Node = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind(), NodeKind::TransientDir);
        assert_eq!(back.checksum(), dir.checksum());
    }
}
