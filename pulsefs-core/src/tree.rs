//! The hierarchical state machine.
//!
//! `Tree::apply` is the only mutation entry point. It is deterministic:
//! two trees fed the same command sequence hold byte-identical state, which
//! is what lets every cluster member serve reads locally while the
//! replication layer totally orders the writes.

use serde::{Deserialize, Serialize};

use crate::command::Command;
use crate::error::StoreError;
use crate::node::{Node, NodeView};
use crate::path;

/// Outcome of a successfully applied command.
///
/// `touched` lists every node whose version changed (with its new version)
/// and `removed` every path deleted, in the order the mutations happened;
/// the caller releases watches from these after the apply.
#[derive(Debug, Clone, Default)]
pub struct Applied {
    /// Canonical path of the node the command addressed; for sequential
    /// creates, the path the server chose.
    pub path: String,
    /// Whether a new node was created (drives 201 vs 200).
    pub created: bool,
    /// Full view of the affected node after the mutation; `None` for
    /// deletes.
    pub view: Option<NodeView>,
    pub touched: Vec<(String, u64)>,
    pub removed: Vec<String>,
}

/// Which pre-existing directories get a version bump from a structural
/// change. Client commands bump the whole ancestor chain; membership
/// commands touch only `/pulsefs/servers` so a fresh member still reports
/// root version 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bump {
    Ancestors,
    ParentOnly,
}

#[derive(Debug, Clone, Copy)]
enum CreatePayload<'a> {
    Dir,
    File(&'a [u8]),
}

struct CreateOp<'a> {
    recursive: bool,
    transient: bool,
    expected_version: Option<i64>,
    payload: CreatePayload<'a>,
    bump: Bump,
}

struct DeleteOp {
    target: String,
    recursive: bool,
    expected_version: Option<i64>,
    bump: Bump,
}

/// The replicated node tree, rooted at `/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tree {
    root: Node,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    /// A fresh tree with the reserved membership sub-tree in place. Seeding
    /// it here (rather than replicating creates) keeps every version along
    /// `/pulsefs/servers` at 0 on a brand-new member.
    pub fn new() -> Self {
        let mut servers = Node::new_dir(false);
        servers.recompute_checksum();
        let mut pulsefs = Node::new_dir(false);
        pulsefs
            .as_dir_mut()
            .expect("new_dir is a directory")
            .children
            .insert("servers".to_string(), servers);
        pulsefs.recompute_checksum();
        let mut root = Node::new_dir(false);
        root.as_dir_mut()
            .expect("new_dir is a directory")
            .children
            .insert("pulsefs".to_string(), pulsefs);
        root.recompute_checksum();
        Tree { root }
    }

    /// Look up the node at `path` (any spelling; canonicalized here).
    pub fn node(&self, path: &str) -> Option<&Node> {
        let canonical = path::canonical(path);
        let mut node = &self.root;
        for seg in path::segments(&canonical) {
            node = node.as_dir()?.children.get(seg)?;
        }
        Some(node)
    }

    /// Full client-facing view of the node at `path`.
    pub fn view(&self, path: &str) -> Option<NodeView> {
        let canonical = path::canonical(path);
        self.node(&canonical).map(|n| n.view(&canonical, true))
    }

    /// The root fingerprint; identical across servers that applied the same
    /// command prefix.
    pub fn root_checksum_hex(&self) -> String {
        self.root.checksum_hex()
    }

    /// Addresses currently registered under `/pulsefs/servers`.
    pub fn members(&self) -> Vec<String> {
        self.node(path::SERVERS_PREFIX)
            .and_then(Node::as_dir)
            .map(|d| d.children.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Apply one command. On error the tree is unchanged.
    pub fn apply(&mut self, command: &Command) -> Result<Applied, StoreError> {
        match command {
            Command::CreateDir {
                path: raw,
                recursive,
                transient,
                expected_version,
            } => {
                let target = path::canonical(raw);
                if path::is_reserved(&target) {
                    return Err(StoreError::Forbidden);
                }
                if target == "/" {
                    return Err(StoreError::AlreadyExists(target));
                }
                self.create(
                    &target,
                    CreateOp {
                        recursive: *recursive,
                        transient: *transient,
                        expected_version: *expected_version,
                        payload: CreatePayload::Dir,
                        bump: Bump::Ancestors,
                    },
                )
            }
            Command::PutFile {
                path: raw,
                content,
                recursive,
                transient,
                expected_version,
            } => {
                let target = path::canonical(raw);
                if path::is_reserved(&target) {
                    return Err(StoreError::Forbidden);
                }
                if target == "/" {
                    return Err(StoreError::IsADirectory(target));
                }
                self.create(
                    &target,
                    CreateOp {
                        recursive: *recursive,
                        transient: *transient,
                        expected_version: *expected_version,
                        payload: CreatePayload::File(content),
                        bump: Bump::Ancestors,
                    },
                )
            }
            Command::Delete {
                path: raw,
                recursive,
                expected_version,
            } => {
                let target = path::canonical(raw);
                if target == "/" || path::is_reserved(&target) {
                    return Err(StoreError::Forbidden);
                }
                self.delete(DeleteOp {
                    target,
                    recursive: *recursive,
                    expected_version: *expected_version,
                    bump: Bump::Ancestors,
                })
            }
            Command::CreateSequential { parent, content } => {
                let parent = path::canonical(parent);
                if path::is_reserved(&parent) {
                    return Err(StoreError::Forbidden);
                }
                let mut applied = Applied::default();
                let segs = path::segments(&parent);
                sequential_rec(&mut self.root, "/", &segs, content, &mut applied)?;
                applied.view = self.view(&applied.path);
                Ok(applied)
            }
            Command::RegisterMember { addr } => {
                let member = path::join(path::SERVERS_PREFIX, addr);
                if self.node(&member).is_some() {
                    // re-registration after a reconnect is a no-op
                    return Ok(Applied {
                        path: member.clone(),
                        created: false,
                        view: self.view(&member),
                        ..Applied::default()
                    });
                }
                self.create(
                    &member,
                    CreateOp {
                        recursive: false,
                        transient: false,
                        expected_version: None,
                        payload: CreatePayload::File(&[]),
                        bump: Bump::ParentOnly,
                    },
                )
            }
            Command::UnregisterMember { addr } => {
                let member = path::join(path::SERVERS_PREFIX, addr);
                if self.node(&member).is_none() {
                    return Ok(Applied {
                        path: member,
                        ..Applied::default()
                    });
                }
                self.delete(DeleteOp {
                    target: member,
                    recursive: false,
                    expected_version: None,
                    bump: Bump::ParentOnly,
                })
            }
        }
    }

    fn create(&mut self, target: &str, op: CreateOp<'_>) -> Result<Applied, StoreError> {
        let mut applied = Applied::default();
        let segs = path::segments(target);
        create_rec(&mut self.root, "/", true, &segs, &op, &mut applied)?;
        applied.view = self.view(&applied.path);
        Ok(applied)
    }

    fn delete(&mut self, op: DeleteOp) -> Result<Applied, StoreError> {
        let mut applied = Applied::default();
        let target = op.target.clone();
        let segs = path::segments(&target);
        delete_rec(&mut self.root, "/", &segs, &op, &mut applied)?;
        applied.path = target;
        Ok(applied)
    }
}

/// Recursive create/update. `node` must be a directory kind; `node_existed`
/// says whether it predates this command (fresh intermediates never get
/// ancestor bumps). Returns whether a node was added at or below `node`.
/// On error every intermediate created deeper down has been removed again,
/// so a failed command leaves the tree untouched.
fn create_rec(
    node: &mut Node,
    node_path: &str,
    node_existed: bool,
    segs: &[&str],
    op: &CreateOp<'_>,
    applied: &mut Applied,
) -> Result<bool, StoreError> {
    let Some(dir) = node.as_dir_mut() else {
        return Err(StoreError::NotADirectory(node_path.to_string()));
    };

    let name = segs[0];
    let target = path::join(node_path, name);

    let structural = if segs.len() == 1 {
        match op.payload {
            CreatePayload::Dir => {
                if dir.children.contains_key(name) {
                    return Err(StoreError::AlreadyExists(target));
                }
                if let Some(v) = op.expected_version
                    && v >= 0
                    && dir.version != v as u64
                {
                    return Err(StoreError::VersionConflict {
                        expected: v,
                        actual: dir.version,
                    });
                }
                dir.children
                    .insert(name.to_string(), Node::new_dir(op.transient));
                applied.path = target.clone();
                applied.created = true;
                applied.touched.push((target, 0));
                true
            }
            CreatePayload::File(content) => match dir.children.get_mut(name) {
                Some(child) if child.is_dir_kind() => {
                    return Err(StoreError::IsADirectory(target));
                }
                Some(child) => {
                    let Node::File(file) = child else {
                        unreachable!("non-directory node is a file");
                    };
                    if op.expected_version == Some(-1) {
                        return Err(StoreError::AlreadyExists(target));
                    }
                    if let Some(v) = op.expected_version
                        && v >= 0
                        && file.version != v as u64
                    {
                        return Err(StoreError::VersionConflict {
                            expected: v,
                            actual: file.version,
                        });
                    }
                    file.content = content.to_vec();
                    file.version += 1;
                    let version = file.version;
                    child.recompute_checksum();
                    applied.path = target.clone();
                    applied.created = false;
                    applied.touched.push((target, version));
                    false
                }
                None => {
                    if let Some(v) = op.expected_version
                        && v >= 0
                    {
                        return Err(StoreError::NotFound(target));
                    }
                    dir.children
                        .insert(name.to_string(), Node::new_file(content.to_vec()));
                    applied.path = target.clone();
                    applied.created = true;
                    applied.touched.push((target, 0));
                    true
                }
            },
        }
    } else {
        let child_existed = dir.children.contains_key(name);
        if !child_existed {
            if !op.recursive {
                return Err(StoreError::NotFound(target));
            }
            dir.children
                .insert(name.to_string(), Node::new_dir(op.transient));
            applied.touched.push((target.clone(), 0));
        }
        let child = dir
            .children
            .get_mut(name)
            .expect("child present after insert");
        match create_rec(child, &target, child_existed, &segs[1..], op, applied) {
            Ok(structural_below) => structural_below || !child_existed,
            Err(err) => {
                if !child_existed {
                    dir.children.remove(name);
                    applied.touched.retain(|(p, _)| p != &target);
                }
                return Err(err);
            }
        }
    };

    // a fresh intermediate stays at version 0; pre-existing ancestors bump
    // on structural change, the direct parent under both bump policies
    let is_parent = segs.len() == 1;
    if structural && node_existed && (is_parent || op.bump == Bump::Ancestors) {
        let dir = node.as_dir_mut().expect("checked directory above");
        dir.version += 1;
        applied.touched.push((node_path.to_string(), dir.version));
    }
    node.recompute_checksum();
    Ok(structural)
}

fn sequential_rec(
    node: &mut Node,
    node_path: &str,
    segs: &[&str],
    content: &[u8],
    applied: &mut Applied,
) -> Result<(), StoreError> {
    let Some(dir) = node.as_dir_mut() else {
        return Err(StoreError::NotADirectory(node_path.to_string()));
    };

    if segs.is_empty() {
        let name = format!("{:010}", dir.next_sequence);
        dir.next_sequence += 1;
        let target = path::join(node_path, &name);
        dir.children
            .insert(name, Node::new_file(content.to_vec()));
        dir.version += 1;
        let version = dir.version;
        applied.path = target.clone();
        applied.created = true;
        applied.touched.push((target, 0));
        applied.touched.push((node_path.to_string(), version));
    } else {
        let name = segs[0];
        let child_path = path::join(node_path, name);
        let child = dir
            .children
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound(child_path.clone()))?;
        sequential_rec(child, &child_path, &segs[1..], content, applied)?;
        dir.version += 1;
        let version = dir.version;
        applied.touched.push((node_path.to_string(), version));
    }
    node.recompute_checksum();
    Ok(())
}

fn delete_rec(
    node: &mut Node,
    node_path: &str,
    segs: &[&str],
    op: &DeleteOp,
    applied: &mut Applied,
) -> Result<(), StoreError> {
    let Some(dir) = node.as_dir_mut() else {
        // an ancestor turned out to be a file, so the target cannot exist
        return Err(StoreError::NotFound(op.target.clone()));
    };

    let name = segs[0];
    let child_path = path::join(node_path, name);

    if segs.len() == 1 {
        let child = dir
            .children
            .get(name)
            .ok_or_else(|| StoreError::NotFound(child_path.clone()))?;
        if let Some(child_dir) = child.as_dir()
            && !child_dir.children.is_empty()
            && !op.recursive
        {
            return Err(StoreError::NotEmpty(child_path));
        }
        if let Some(v) = op.expected_version
            && v >= 0
            && child.version() != v as u64
        {
            return Err(StoreError::VersionConflict {
                expected: v,
                actual: child.version(),
            });
        }
        let removed = dir.children.remove(name).expect("checked above");
        collect_removed(&removed, &child_path, &mut applied.removed);
        dir.version += 1;
        let version = dir.version;
        applied.touched.push((node_path.to_string(), version));
    } else {
        let child = dir
            .children
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound(op.target.clone()))?;
        delete_rec(child, &child_path, &segs[1..], op, applied)?;
        if child.is_empty_transient_dir() {
            // the transient chain dissolves once its last descendant is gone
            dir.children.remove(name);
            applied.touched.retain(|(p, _)| p != &child_path);
            applied.removed.push(child_path);
        }
        if op.bump == Bump::Ancestors {
            dir.version += 1;
            let version = dir.version;
            applied.touched.push((node_path.to_string(), version));
        }
    }
    node.recompute_checksum();
    Ok(())
}

/// Pre-order walk of a detached subtree, recording every removed path.
fn collect_removed(node: &Node, node_path: &str, out: &mut Vec<String>) {
    out.push(node_path.to_string());
    if let Some(dir) = node.as_dir() {
        for (name, child) in &dir.children {
            collect_removed(child, &path::join(node_path, name), out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeKind;

    fn mkdir(path: &str) -> Command {
        Command::CreateDir {
            path: path.into(),
            recursive: false,
            transient: false,
            expected_version: None,
        }
    }

    fn put(path: &str, content: &str) -> Command {
        Command::PutFile {
            path: path.into(),
            content: content.into(),
            recursive: false,
            transient: false,
            expected_version: None,
        }
    }

    fn put_versioned(path: &str, content: &str, version: i64) -> Command {
        Command::PutFile {
            path: path.into(),
            content: content.into(),
            recursive: false,
            transient: false,
            expected_version: Some(version),
        }
    }

    fn put_recursive(path: &str, content: &str, transient: bool) -> Command {
        Command::PutFile {
            path: path.into(),
            content: content.into(),
            recursive: true,
            transient,
            expected_version: None,
        }
    }

    fn delete(path: &str) -> Command {
        Command::Delete {
            path: path.into(),
            recursive: false,
            expected_version: None,
        }
    }

    fn delete_recursive(path: &str) -> Command {
        Command::Delete {
            path: path.into(),
            recursive: true,
            expected_version: None,
        }
    }

    #[test]
    fn test_initial_state() {
        let tree = Tree::new();
        let root = tree.view("/").unwrap();
        assert_eq!(root.version, 0);
        assert_eq!(root.kind, NodeKind::Dir);
        assert_eq!(root.checksum.len(), 8);

        let servers = tree.view("/pulsefs/servers").unwrap();
        assert_eq!(servers.version, 0);
        assert_eq!(servers.kind, NodeKind::Dir);
        assert!(tree.members().is_empty());
    }

    #[test]
    fn test_create_dir() {
        let mut tree = Tree::new();
        let applied = tree.apply(&mkdir("/d")).unwrap();
        assert!(applied.created);
        assert_eq!(applied.path, "/d");
        assert_eq!(applied.view.as_ref().unwrap().version, 0);

        // the root is an ancestor and bumps
        assert_eq!(tree.view("/").unwrap().version, 1);

        let err = tree.apply(&mkdir("/d")).unwrap_err();
        assert_eq!(err, StoreError::AlreadyExists("/d".into()));
        assert_eq!(err.to_string(), "/d already exists");
    }

    #[test]
    fn test_create_file_and_update() {
        let mut tree = Tree::new();
        tree.apply(&mkdir("/d")).unwrap();

        let applied = tree.apply(&put("/d/file", "one")).unwrap();
        assert!(applied.created);
        assert_eq!(applied.view.as_ref().unwrap().version, 0);
        assert_eq!(tree.view("/d").unwrap().version, 1);

        let applied = tree.apply(&put("/d/file", "two")).unwrap();
        assert!(!applied.created);
        assert_eq!(applied.view.as_ref().unwrap().version, 1);
        assert_eq!(
            applied.view.as_ref().unwrap().content.as_deref(),
            Some(b"two".as_slice())
        );
        // content update is not a structural change of the parent
        assert_eq!(tree.view("/d").unwrap().version, 1);
    }

    #[test]
    fn test_conditional_update_ladder() {
        let mut tree = Tree::new();
        tree.apply(&mkdir("/d")).unwrap();

        let applied = tree.apply(&put_versioned("/d/bar", "a", -1)).unwrap();
        assert!(applied.created);

        let applied = tree.apply(&put_versioned("/d/bar", "b", 0)).unwrap();
        assert_eq!(applied.view.unwrap().version, 1);

        let err = tree.apply(&put_versioned("/d/bar", "c", 0)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Version 0 doesn't match node version 1"
        );

        tree.apply(&put_versioned("/d/bar", "c", 1)).unwrap();
        assert_eq!(tree.view("/d/bar").unwrap().version, 2);

        // create-only against an existing file
        let err = tree.apply(&put_versioned("/d/bar", "x", -1)).unwrap_err();
        assert_eq!(err, StoreError::AlreadyExists("/d/bar".into()));

        // conditional write against a missing file
        let err = tree.apply(&put_versioned("/d/none", "x", 0)).unwrap_err();
        assert_eq!(err, StoreError::NotFound("/d/none".into()));
    }

    #[test]
    fn test_missing_ancestor() {
        let mut tree = Tree::new();
        let err = tree.apply(&put("/a/b/c", "x")).unwrap_err();
        assert_eq!(err, StoreError::NotFound("/a".into()));

        tree.apply(&put_recursive("/a/b/c", "x", false)).unwrap();
        assert_eq!(
            tree.view("/a/b/c").unwrap().content.as_deref(),
            Some(b"x".as_slice())
        );
        // fresh intermediates stay at version 0
        assert_eq!(tree.view("/a").unwrap().version, 0);
        assert_eq!(tree.view("/a/b").unwrap().version, 0);
    }

    #[test]
    fn test_file_ancestor_rejected() {
        let mut tree = Tree::new();
        tree.apply(&mkdir("/d")).unwrap();
        tree.apply(&put("/d/file", "")).unwrap();

        let err = tree.apply(&put("/d/file/child", "x")).unwrap_err();
        assert_eq!(err.to_string(), "/d/file is not a directory");

        let err = tree.apply(&put("/d/file/a/b", "x")).unwrap_err();
        assert_eq!(err, StoreError::NotADirectory("/d/file".into()));
    }

    #[test]
    fn test_put_on_directory() {
        let mut tree = Tree::new();
        tree.apply(&mkdir("/d")).unwrap();
        let err = tree.apply(&put("/d", "x")).unwrap_err();
        assert_eq!(err.to_string(), "/d is a directory");

        let err = tree.apply(&put("/", "x")).unwrap_err();
        assert_eq!(err.to_string(), "/ is a directory");

        let err = tree.apply(&mkdir("/")).unwrap_err();
        assert_eq!(err.to_string(), "/ already exists");
    }

    #[test]
    fn test_failed_recursive_create_rolls_back() {
        let mut tree = Tree::new();
        tree.apply(&mkdir("/d")).unwrap();
        let before = tree.root_checksum_hex();
        let root_version = tree.view("/").unwrap().version;

        // conflicts against the (fresh) parent version after intermediates
        // would have been created; the whole command must unwind
        let err = tree
            .apply(&Command::CreateDir {
                path: "/d/a/b".into(),
                recursive: true,
                transient: false,
                expected_version: Some(7),
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { .. }));
        assert!(tree.node("/d/a").is_none());
        assert_eq!(tree.root_checksum_hex(), before);
        assert_eq!(tree.view("/").unwrap().version, root_version);
    }

    #[test]
    fn test_delete() {
        let mut tree = Tree::new();
        tree.apply(&mkdir("/d")).unwrap();
        tree.apply(&put("/d/file", "x")).unwrap();

        let err = tree.apply(&delete("/d")).unwrap_err();
        assert_eq!(err.to_string(), "/d is not empty");

        let applied = tree.apply(&delete("/d/file")).unwrap();
        assert_eq!(applied.removed, vec!["/d/file".to_string()]);
        assert!(applied.view.is_none());
        assert_eq!(tree.view("/d").unwrap().version, 2);

        let err = tree.apply(&delete("/d/file")).unwrap_err();
        assert_eq!(err.to_string(), "/d/file does not exist");

        tree.apply(&delete("/d")).unwrap();
        assert!(tree.node("/d").is_none());
    }

    #[test]
    fn test_recursive_delete_collects_descendants() {
        let mut tree = Tree::new();
        tree.apply(&mkdir("/d")).unwrap();
        tree.apply(&put_recursive("/d/a/b/c", "x", false)).unwrap();
        tree.apply(&put_recursive("/d/a/b2", "y", false)).unwrap();

        let applied = tree.apply(&delete_recursive("/d/a")).unwrap();
        let mut removed = applied.removed.clone();
        removed.sort();
        assert_eq!(
            removed,
            vec![
                "/d/a".to_string(),
                "/d/a/b".to_string(),
                "/d/a/b/c".to_string(),
                "/d/a/b2".to_string(),
            ]
        );
        assert!(tree.node("/d/a").is_none());
    }

    #[test]
    fn test_delete_version_conflict() {
        let mut tree = Tree::new();
        tree.apply(&mkdir("/d")).unwrap();
        tree.apply(&put("/d/f", "one")).unwrap();
        tree.apply(&put("/d/f", "two")).unwrap();

        let err = tree
            .apply(&Command::Delete {
                path: "/d/f".into(),
                recursive: false,
                expected_version: Some(0),
            })
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::VersionConflict {
                expected: 0,
                actual: 1
            }
        );

        tree.apply(&Command::Delete {
            path: "/d/f".into(),
            recursive: false,
            expected_version: Some(1),
        })
        .unwrap();
        assert!(tree.node("/d/f").is_none());
    }

    #[test]
    fn test_transient_cleanup() {
        let mut tree = Tree::new();
        tree.apply(&mkdir("/d")).unwrap();
        tree.apply(&put_recursive("/d/foo/bar/file1", "1", true))
            .unwrap();
        tree.apply(&put_recursive("/d/foo/bar/file2", "2", true))
            .unwrap();

        assert_eq!(tree.view("/d/foo").unwrap().kind, NodeKind::TransientDir);
        assert_eq!(
            tree.view("/d/foo/bar").unwrap().kind,
            NodeKind::TransientDir
        );
        // the files themselves are ordinary files
        assert_eq!(tree.view("/d/foo/bar/file1").unwrap().kind, NodeKind::File);

        tree.apply(&delete("/d/foo/bar/file1")).unwrap();
        assert!(tree.node("/d/foo/bar").is_some());

        let applied = tree.apply(&delete("/d/foo/bar/file2")).unwrap();
        let mut removed = applied.removed.clone();
        removed.sort();
        assert_eq!(
            removed,
            vec![
                "/d/foo".to_string(),
                "/d/foo/bar".to_string(),
                "/d/foo/bar/file2".to_string(),
            ]
        );
        assert!(tree.node("/d/foo/bar").is_none());
        assert!(tree.node("/d/foo").is_none());
        assert!(tree.node("/d").is_some());
    }

    #[test]
    fn test_transient_dir_survives_while_occupied() {
        let mut tree = Tree::new();
        tree.apply(&put_recursive("/t/keep", "x", true)).unwrap();
        tree.apply(&put("/t/more", "y")).unwrap();
        tree.apply(&delete("/t/keep")).unwrap();
        // still holds /t/more, so the transient dir stays
        assert_eq!(tree.view("/t").unwrap().kind, NodeKind::TransientDir);
    }

    #[test]
    fn test_sequential_create() {
        let mut tree = Tree::new();
        tree.apply(&mkdir("/q")).unwrap();

        let first = tree
            .apply(&Command::CreateSequential {
                parent: "/q".into(),
                content: "a".into(),
            })
            .unwrap();
        assert_eq!(first.path, "/q/0000000000");
        assert!(first.created);

        let second = tree
            .apply(&Command::CreateSequential {
                parent: "/q".into(),
                content: "b".into(),
            })
            .unwrap();
        assert_eq!(second.path, "/q/0000000001");
        assert!(first.path < second.path);

        // names are never reused, even after a delete
        tree.apply(&delete("/q/0000000001")).unwrap();
        let third = tree
            .apply(&Command::CreateSequential {
                parent: "/q".into(),
                content: "c".into(),
            })
            .unwrap();
        assert_eq!(third.path, "/q/0000000002");
    }

    #[test]
    fn test_sequential_create_errors() {
        let mut tree = Tree::new();
        let err = tree
            .apply(&Command::CreateSequential {
                parent: "/missing".into(),
                content: Vec::new(),
            })
            .unwrap_err();
        assert_eq!(err, StoreError::NotFound("/missing".into()));

        tree.apply(&put("/file", "x")).unwrap();
        let err = tree
            .apply(&Command::CreateSequential {
                parent: "/file".into(),
                content: Vec::new(),
            })
            .unwrap_err();
        assert_eq!(err, StoreError::NotADirectory("/file".into()));
    }

    #[test]
    fn test_reserved_paths_are_forbidden() {
        let mut tree = Tree::new();
        for command in [
            put("/pulsefs/servers/file", "x"),
            mkdir("/pulsefs/servers/sub"),
            mkdir("/pulsefs/other"),
            delete("/pulsefs/servers"),
            delete_recursive("/pulsefs"),
            delete("/"),
            Command::CreateSequential {
                parent: "/pulsefs/servers".into(),
                content: Vec::new(),
            },
        ] {
            assert_eq!(tree.apply(&command).unwrap_err(), StoreError::Forbidden);
        }
    }

    #[test]
    fn test_membership_commands() {
        let mut tree = Tree::new();
        let applied = tree
            .apply(&Command::RegisterMember {
                addr: "localhost:5000".into(),
            })
            .unwrap();
        assert!(applied.created);
        assert_eq!(applied.path, "/pulsefs/servers/localhost:5000");
        assert_eq!(tree.members(), vec!["localhost:5000".to_string()]);

        // membership traffic never bumps the root or /pulsefs
        assert_eq!(tree.view("/").unwrap().version, 0);
        assert_eq!(tree.view("/pulsefs").unwrap().version, 0);
        assert_eq!(tree.view("/pulsefs/servers").unwrap().version, 1);

        // idempotent re-registration
        let applied = tree
            .apply(&Command::RegisterMember {
                addr: "localhost:5000".into(),
            })
            .unwrap();
        assert!(!applied.created);
        assert!(applied.touched.is_empty());
        assert_eq!(tree.view("/pulsefs/servers").unwrap().version, 1);

        tree.apply(&Command::UnregisterMember {
            addr: "localhost:5000".into(),
        })
        .unwrap();
        assert!(tree.members().is_empty());
        assert_eq!(tree.view("/").unwrap().version, 0);

        // unregistering an unknown member is a no-op
        let applied = tree
            .apply(&Command::UnregisterMember {
                addr: "localhost:9999".into(),
            })
            .unwrap();
        assert!(applied.removed.is_empty());
    }

    #[test]
    fn test_touched_paths_drive_watches() {
        let mut tree = Tree::new();
        tree.apply(&mkdir("/d")).unwrap();

        let applied = tree.apply(&put("/d/file", "x")).unwrap();
        let touched: Vec<&str> = applied.touched.iter().map(|(p, _)| p.as_str()).collect();
        // target, then the bumped ancestors inside-out
        assert_eq!(touched, vec!["/d/file", "/d", "/"]);

        let applied = tree.apply(&put("/d/file", "y")).unwrap();
        assert_eq!(applied.touched, vec![("/d/file".to_string(), 1)]);
    }

    #[test]
    fn test_replay_determinism() {
        let commands = vec![
            mkdir("/d"),
            put_recursive("/d/a/b/file", "payload", false),
            put("/d/a/b/file", "payload2"),
            Command::CreateSequential {
                parent: "/d".into(),
                content: "s".into(),
            },
            Command::RegisterMember {
                addr: "localhost:5000".into(),
            },
            delete_recursive("/d/a"),
        ];

        let mut one = Tree::new();
        let mut two = Tree::new();
        for command in &commands {
            one.apply(command).unwrap();
            two.apply(command).unwrap();
        }
        assert_eq!(one.root_checksum_hex(), two.root_checksum_hex());

        // snapshot round-trip preserves state and sequence counters
        let snapshot = serde_json::to_string(&one).unwrap();
        let mut restored: Tree = serde_json::from_str(&snapshot).unwrap();
        assert_eq!(restored.root_checksum_hex(), one.root_checksum_hex());

        let a = one
            .apply(&Command::CreateSequential {
                parent: "/d".into(),
                content: Vec::new(),
            })
            .unwrap();
        let b = restored
            .apply(&Command::CreateSequential {
                parent: "/d".into(),
                content: Vec::new(),
            })
            .unwrap();
        assert_eq!(a.path, b.path);
        assert_eq!(one.root_checksum_hex(), restored.root_checksum_hex());
    }
}
