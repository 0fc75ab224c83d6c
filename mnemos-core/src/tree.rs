//! Hierarchical path namespace over the blob store.
//!
//! A tree is a [`VfsNode::Directory`] root whose leaves are
//! [`VfsNode::File`]s pointing at blob digests. Trees are cheap to rebuild
//! from a flat `path → content` map ([`hydrate`]) and to turn back into one
//! ([`flatten`]); the blob store deduplicates content across versions.
//!
//! Paths use `/` as separator. Empty segments are ignored, so `"/a//b"`,
//! `"a/b"` and `"/a/b"` all name the same node. [`flatten`] renders paths in
//! the canonical `/a/b` form.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{MnemosError, Result};
use crate::store::{BlobKey, BlobStore};

/// Flat `path → content` map, the exchange format for [`hydrate`] and [`flatten`].
pub type FlatMap = BTreeMap<String, String>;

/// A node in the path tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum VfsNode {
    /// A leaf referencing blob content.
    File {
        /// Digest of the content.
        digest: BlobKey,
        /// Content length in bytes.
        size: u64,
    },
    /// An interior node.
    Directory {
        /// Children by segment name.
        children: BTreeMap<String, VfsNode>,
    },
}

impl Default for VfsNode {
    fn default() -> Self {
        Self::empty_dir()
    }
}

impl VfsNode {
    /// An empty directory, the root of a fresh tree.
    #[must_use]
    pub fn empty_dir() -> Self {
        Self::Directory {
            children: BTreeMap::new(),
        }
    }

    /// Whether this node is a directory.
    #[must_use]
    pub fn is_dir(&self) -> bool {
        matches!(self, Self::Directory { .. })
    }

    /// Total number of nodes in this subtree, including `self`.
    #[must_use]
    pub fn node_count(&self) -> usize {
        match self {
            Self::File { .. } => 1,
            Self::Directory { children } => {
                1 + children.values().map(VfsNode::node_count).sum::<usize>()
            }
        }
    }

    /// Number of file leaves in this subtree.
    #[must_use]
    pub fn file_count(&self) -> usize {
        match self {
            Self::File { .. } => 1,
            Self::Directory { children } => children.values().map(VfsNode::file_count).sum(),
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Self::File { .. } => "file",
            Self::Directory { .. } => "directory",
        }
    }
}

/// What [`hydrate_into`] does when a path crosses an existing node of the
/// other kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    /// The incoming entry wins: a file in the way of a directory is replaced
    /// by a directory, and a directory at a file's terminal segment is
    /// replaced by the file (its subtree is dropped).
    #[default]
    Overwrite,
    /// Any file/directory collision aborts the hydrate with
    /// [`MnemosError::PathCollision`].
    Reject,
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Walk `path` from `root`.
///
/// Returns `None` at the first missing segment, and also when a segment
/// would have to descend into a file. `""` and `"/"` resolve to `root`.
#[must_use]
pub fn resolve<'a>(root: &'a VfsNode, path: &str) -> Option<&'a VfsNode> {
    let mut node = root;
    for segment in segments(path) {
        match node {
            VfsNode::Directory { children } => node = children.get(segment)?,
            VfsNode::File { .. } => return None,
        }
    }
    Some(node)
}

/// Names of a directory's children, or `None` if `path` is not a directory.
#[must_use]
pub fn list<'a>(root: &'a VfsNode, path: &str) -> Option<Vec<&'a str>> {
    match resolve(root, path)? {
        VfsNode::Directory { children } => Some(children.keys().map(String::as_str).collect()),
        VfsNode::File { .. } => None,
    }
}

/// Build a fresh tree and blob store from a flat map.
///
/// Uses [`CollisionPolicy::Overwrite`], so this never fails on collisions;
/// it fails only on entries whose path has no segments.
///
/// # Errors
///
/// Returns [`MnemosError::InvalidPath`] for an empty path.
pub fn hydrate(files: &FlatMap) -> Result<(VfsNode, BlobStore)> {
    let mut root = VfsNode::empty_dir();
    let mut blobs = BlobStore::new();
    hydrate_into(&mut root, &mut blobs, files, CollisionPolicy::Overwrite)?;
    Ok((root, blobs))
}

/// Write every entry of `files` into an existing tree.
///
/// Entries are applied in path order. Paths are checked before anything is
/// written. With [`CollisionPolicy::Reject`] the batch is applied to a
/// scratch copy first, so a rejected hydrate leaves `root` and `blobs`
/// untouched.
///
/// # Errors
///
/// Returns [`MnemosError::InvalidPath`] for an empty path, or
/// [`MnemosError::PathCollision`] under the reject policy.
pub fn hydrate_into(
    root: &mut VfsNode,
    blobs: &mut BlobStore,
    files: &FlatMap,
    policy: CollisionPolicy,
) -> Result<()> {
    if let VfsNode::File { .. } = root {
        // The root is always a directory.
        *root = VfsNode::empty_dir();
    }

    if let Some(path) = files.keys().find(|p| segments(p).next().is_none()) {
        return Err(MnemosError::InvalidPath(path.clone()));
    }

    match policy {
        CollisionPolicy::Overwrite => {
            for (path, content) in files {
                let leaf = file_leaf(blobs, content);
                insert(root, path, leaf, policy)?;
            }
        }
        CollisionPolicy::Reject => {
            let mut staged = root.clone();
            let mut staged_blobs = BlobStore::new();
            for (path, content) in files {
                let leaf = file_leaf(&mut staged_blobs, content);
                insert(&mut staged, path, leaf, policy)?;
            }
            *root = staged;
            blobs.merge(&staged_blobs);
        }
    }
    Ok(())
}

fn file_leaf(blobs: &mut BlobStore, content: &str) -> VfsNode {
    VfsNode::File {
        digest: blobs.put(content),
        size: content.len() as u64,
    }
}

fn insert(root: &mut VfsNode, path: &str, leaf: VfsNode, policy: CollisionPolicy) -> Result<()> {
    let parts: Vec<&str> = segments(path).collect();
    let Some((last, dirs)) = parts.split_last() else {
        return Err(MnemosError::InvalidPath(path.to_string()));
    };

    let mut node = root;
    let mut walked = String::new();
    for segment in dirs {
        walked.push('/');
        walked.push_str(segment);

        let child = children_mut(node, path)?
            .entry((*segment).to_string())
            .or_insert_with(VfsNode::empty_dir);
        if let VfsNode::File { .. } = child {
            if policy == CollisionPolicy::Reject {
                return Err(MnemosError::PathCollision {
                    path: walked,
                    existing: "file",
                });
            }
            warn!(path = %walked, "Replacing file with directory during hydrate");
            *child = VfsNode::empty_dir();
        }
        node = child;
    }

    let children = children_mut(node, path)?;
    if let Some(existing @ VfsNode::Directory { .. }) = children.get(*last) {
        walked.push('/');
        walked.push_str(last);
        if policy == CollisionPolicy::Reject {
            return Err(MnemosError::PathCollision {
                path: walked,
                existing: existing.kind_name(),
            });
        }
        warn!(
            path = %walked,
            dropped_files = existing.file_count(),
            "Replacing directory with file during hydrate"
        );
    }
    children.insert((*last).to_string(), leaf);
    Ok(())
}

fn children_mut<'a>(node: &'a mut VfsNode, path: &str) -> Result<&'a mut BTreeMap<String, VfsNode>> {
    match node {
        VfsNode::Directory { children } => Ok(children),
        VfsNode::File { .. } => Err(MnemosError::InvalidPath(path.to_string())),
    }
}

/// A file whose digest has no blob in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingBlob {
    /// Canonical path of the file.
    pub path: String,
    /// The dangling digest.
    pub digest: BlobKey,
}

/// Result of [`flatten`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Flattened {
    /// Every file whose content was found.
    pub files: FlatMap,
    /// Files whose content is missing from the store.
    pub missing: Vec<MissingBlob>,
}

impl Flattened {
    /// Whether every file resolved to content.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Turn a tree back into a flat map, resolving every file through `blobs`.
///
/// Missing blobs are reported in [`Flattened::missing`] (and logged), never
/// filled in with empty content.
#[must_use]
pub fn flatten(root: &VfsNode, blobs: &BlobStore) -> Flattened {
    let mut out = Flattened::default();
    let mut prefix = String::new();
    walk(root, blobs, &mut prefix, &mut out);
    out
}

fn walk(node: &VfsNode, blobs: &BlobStore, prefix: &mut String, out: &mut Flattened) {
    match node {
        VfsNode::File { digest, .. } => match blobs.get(digest) {
            Some(content) => {
                out.files.insert(prefix.clone(), content.to_string());
            }
            None => {
                warn!(path = %prefix, digest = %digest, "Dangling blob reference in tree");
                out.missing.push(MissingBlob {
                    path: prefix.clone(),
                    digest: digest.clone(),
                });
            }
        },
        VfsNode::Directory { children } => {
            for (name, child) in children {
                let len = prefix.len();
                prefix.push('/');
                prefix.push_str(name);
                walk(child, blobs, prefix, out);
                prefix.truncate(len);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::digest;

    fn flat(entries: &[(&str, &str)]) -> FlatMap {
        entries
            .iter()
            .map(|(p, c)| ((*p).to_string(), (*c).to_string()))
            .collect()
    }

    #[test]
    fn insert_under_a_file_root_is_an_error() {
        let mut root = VfsNode::File {
            digest: digest("x"),
            size: 1,
        };
        let leaf = VfsNode::File {
            digest: digest("y"),
            size: 1,
        };
        let err = insert(&mut root, "/a/b.txt", leaf.clone(), CollisionPolicy::Overwrite)
            .expect_err("root is a file");
        assert!(matches!(err, MnemosError::InvalidPath(ref p) if p == "/a/b.txt"));
        let err = insert(&mut root, "/b.txt", leaf, CollisionPolicy::Overwrite).expect_err("root is a file");
        assert!(matches!(err, MnemosError::InvalidPath(_)));
    }

    #[test]
    fn resolve_walks_directories() {
        let (root, _) = hydrate(&flat(&[("/src/main.rs", "fn main() {}")])).expect("hydrate");

        assert!(resolve(&root, "/").is_some_and(VfsNode::is_dir));
        assert!(resolve(&root, "/src").is_some_and(VfsNode::is_dir));
        match resolve(&root, "/src/main.rs") {
            Some(VfsNode::File { digest: d, size }) => {
                assert_eq!(*d, digest("fn main() {}"));
                assert_eq!(*size, 12);
            }
            other => panic!("expected file, got {other:?}"),
        }
    }

    #[test]
    fn resolve_missing_and_through_file_are_none() {
        let (root, _) = hydrate(&flat(&[("/a/b.txt", "x")])).expect("hydrate");
        assert!(resolve(&root, "/nope").is_none());
        assert!(resolve(&root, "/a/missing.txt").is_none());
        assert!(resolve(&root, "/a/b.txt/deeper").is_none());
    }

    #[test]
    fn separators_are_normalized() {
        let (root, _) = hydrate(&flat(&[("a//b.txt", "x")])).expect("hydrate");
        assert!(resolve(&root, "/a/b.txt").is_some());
        assert!(resolve(&root, "a/b.txt/").is_some());
    }

    #[test]
    fn hydrate_dedups_identical_content() {
        let (root, blobs) =
            hydrate(&flat(&[("/one.txt", "same"), ("/two.txt", "same")])).expect("hydrate");
        assert_eq!(blobs.len(), 1);
        assert_eq!(root.file_count(), 2);
    }

    #[test]
    fn empty_path_rejected() {
        let err = hydrate(&flat(&[("/", "x")])).expect_err("empty path");
        assert!(matches!(err, MnemosError::InvalidPath(_)));
    }

    #[test]
    fn intermediate_file_becomes_directory() {
        let (mut root, mut blobs) = hydrate(&flat(&[("/a", "file")])).expect("hydrate");
        hydrate_into(
            &mut root,
            &mut blobs,
            &flat(&[("/a/b.txt", "x")]),
            CollisionPolicy::Overwrite,
        )
        .expect("hydrate");

        assert!(resolve(&root, "/a").is_some_and(VfsNode::is_dir));
        assert!(resolve(&root, "/a/b.txt").is_some());
    }

    #[test]
    fn terminal_file_replaces_directory_subtree() {
        let (mut root, mut blobs) = hydrate(&flat(&[("/a/b.txt", "x")])).expect("hydrate");
        hydrate_into(&mut root, &mut blobs, &flat(&[("/a", "y")]), CollisionPolicy::Overwrite)
            .expect("hydrate");

        assert!(matches!(resolve(&root, "/a"), Some(VfsNode::File { .. })));
        assert!(resolve(&root, "/a/b.txt").is_none());
        // Blobs are retained even though nothing references "x" any more.
        assert!(blobs.contains(&digest("x")));
    }

    #[test]
    fn reject_policy_leaves_tree_untouched() {
        let (mut root, mut blobs) = hydrate(&flat(&[("/a/b.txt", "x")])).expect("hydrate");
        let before = root.clone();

        let err = hydrate_into(
            &mut root,
            &mut blobs,
            &flat(&[("/a", "y"), ("/c.txt", "z")]),
            CollisionPolicy::Reject,
        )
        .expect_err("collision");

        assert!(matches!(err, MnemosError::PathCollision { existing: "directory", .. }));
        assert_eq!(root, before);
        assert!(!blobs.contains(&digest("z")));
    }

    #[test]
    fn reject_policy_on_intermediate_file() {
        let (mut root, mut blobs) = hydrate(&flat(&[("/a", "file")])).expect("hydrate");
        let err = hydrate_into(
            &mut root,
            &mut blobs,
            &flat(&[("/a/b.txt", "x")]),
            CollisionPolicy::Reject,
        )
        .expect_err("collision");
        match err {
            MnemosError::PathCollision { path, existing } => {
                assert_eq!(path, "/a");
                assert_eq!(existing, "file");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn flatten_round_trips() {
        let input = flat(&[
            ("/README.md", "# hi"),
            ("/src/lib.rs", "pub mod a;"),
            ("/src/a.rs", ""),
        ]);
        let (root, blobs) = hydrate(&input).expect("hydrate");
        let out = flatten(&root, &blobs);
        assert!(out.is_complete());
        assert_eq!(out.files, input);
    }

    #[test]
    fn flatten_reports_missing_blobs() {
        let (root, _) = hydrate(&flat(&[("/a.txt", "x"), ("/b.txt", "y")])).expect("hydrate");
        let mut partial = BlobStore::new();
        partial.put("x");

        let out = flatten(&root, &partial);
        assert_eq!(out.files.len(), 1);
        assert_eq!(
            out.missing,
            vec![MissingBlob {
                path: "/b.txt".to_string(),
                digest: digest("y"),
            }]
        );
    }

    #[test]
    fn list_children() {
        let (root, _) =
            hydrate(&flat(&[("/d/x.txt", "1"), ("/d/y.txt", "2")])).expect("hydrate");
        assert_eq!(list(&root, "/d"), Some(vec!["x.txt", "y.txt"]));
        assert_eq!(list(&root, "/d/x.txt"), None);
        assert_eq!(root.node_count(), 4);
    }
}
