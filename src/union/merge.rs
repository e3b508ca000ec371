//! Merging subtrees into one union tree.
//!
//! Subtrees are merged in registration order, which is also their priority:
//!
//! - two directories with the same name become one synthetic directory whose
//!   children are the union of both, merged recursively;
//! - two files with the same name resolve to the earlier subtree's file; the
//!   later one is shadowed;
//! - a directory always wins over a file with the same name, whichever
//!   subtree it comes from.
//!
//! Nodes keep the inodes they were given when their subtree was built, so a
//! registration never renumbers anything already exposed.

use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::error::{Result, UniteError};
use crate::union::builder::{BuildOptions, SubtreeBuilder};
use crate::union::inode_manager::InodeAllocator;
use crate::union::types::{Node, Tree, ROOT_INODE};

/// Merge `subtrees` into a fresh tree rooted at [`ROOT_INODE`].
///
/// The subtrees must have been built with one shared [`InodeAllocator`];
/// overlapping inodes fail with [`UniteError::DuplicateInode`].
pub fn merge<I>(subtrees: I) -> Result<Tree>
where
    I: IntoIterator<Item = Tree>,
{
    let mut union = empty_union();
    for subtree in subtrees {
        merge_into(&mut union, &subtree)?;
    }
    Ok(union)
}

fn empty_union() -> Tree {
    Tree::new(Node::synthetic_dir(ROOT_INODE, OsString::new()))
}

/// Merge one more subtree into an existing union.
pub fn merge_into(union: &mut Tree, subtree: &Tree) -> Result<()> {
    let target = union.root_inode();
    adopt_times(union, target, subtree.root());
    merge_dir(union, target, subtree, subtree.root_inode())
}

fn merge_dir(union: &mut Tree, target: u64, subtree: &Tree, source: u64) -> Result<()> {
    for incoming in subtree.children(source) {
        let existing = union
            .lookup(target, &incoming.name)
            .map(|node| (node.inode, node.is_dir()));

        match existing {
            None => {
                graft(union, subtree, incoming.inode)?;
                union.attach_child(target, incoming.inode)?;
            }
            Some((ino, true)) if incoming.is_dir() => {
                if let Some(node) = union.get_mut(ino) {
                    if !node.is_synthetic() {
                        tracing::debug!(
                            "merging directory {:?} from {:?}",
                            node.name,
                            incoming.real_path
                        );
                        node.make_synthetic();
                    }
                }
                merge_dir(union, ino, subtree, incoming.inode)?;
            }
            Some((_, true)) => {
                tracing::warn!(
                    "File {:?} is hidden by a directory of the same name",
                    incoming.real_path.as_deref().unwrap_or(Path::new("?"))
                );
            }
            Some((ino, false)) if incoming.is_dir() => {
                tracing::warn!(
                    "Directory {:?} replaces a file of the same name",
                    incoming.real_path.as_deref().unwrap_or(Path::new("?"))
                );
                graft(union, subtree, incoming.inode)?;
                union.replace_child(target, ino, incoming.inode)?;
            }
            Some((ino, false)) => {
                tracing::debug!("{:?} shadowed by inode {}", incoming.real_path, ino);
            }
        }
    }
    Ok(())
}

/// Copy `ino` and everything below it from `subtree` into `union`, without
/// attaching `ino` itself to a parent.
fn graft(union: &mut Tree, subtree: &Tree, ino: u64) -> Result<()> {
    let mut stack = vec![ino];
    while let Some(current) = stack.pop() {
        let node = subtree
            .get(current)
            .cloned()
            .ok_or_else(|| UniteError::NotFound(format!("inode {}", current)))?;
        union.add(node)?;
        for child in subtree.child_inodes(current) {
            stack.push(*child);
        }
    }

    // Attach children once every node is registered, preserving order.
    let mut stack = vec![ino];
    while let Some(current) = stack.pop() {
        for child in subtree.child_inodes(current) {
            union.attach_child(current, *child)?;
            stack.push(*child);
        }
    }
    Ok(())
}

/// The first subtree to reach a synthetic directory lends it its timestamps
/// and ownership.
fn adopt_times(union: &mut Tree, target: u64, from: &Node) {
    if let Some(node) = union.get_mut(target) {
        if node.mtime == std::time::SystemTime::UNIX_EPOCH {
            node.mtime = from.mtime;
            node.ctime = from.ctime;
            node.uid = from.uid;
            node.gid = from.gid;
        }
    }
}

/// The live union: merged tree plus the sources it was built from.
///
/// Readers take the tree's read lock for one operation at a time. A
/// registration walks the new source without any tree lock, merges it into a
/// copy, and swaps the copy in, so readers never see a half-merged directory.
pub struct UnionTree {
    tree: RwLock<Tree>,
    /// Registered roots in priority order. Also serializes registrations.
    registered: Mutex<Vec<PathBuf>>,
    inodes: InodeAllocator,
    options: BuildOptions,
}

impl UnionTree {
    pub fn new(options: BuildOptions) -> Self {
        UnionTree {
            tree: RwLock::new(empty_union()),
            registered: Mutex::new(Vec::new()),
            inodes: InodeAllocator::new(),
            options,
        }
    }

    /// Build a union from `roots`, failing on the first unusable one.
    pub fn from_roots<P: AsRef<Path>>(roots: &[P], options: BuildOptions) -> Result<Self> {
        let union = UnionTree::new(options);
        for root in roots {
            union.register_subtree(root.as_ref())?;
        }
        Ok(union)
    }

    /// Add another source below every already registered one.
    pub fn register_subtree(&self, path: &Path) -> Result<()> {
        let root = path.canonicalize().map_err(|source| UniteError::Build {
            path: path.to_path_buf(),
            source,
        })?;

        let mut registered = self.registered.lock();
        if registered.contains(&root) {
            return Err(UniteError::SubtreeAlreadyRegistered(root));
        }

        let subtree = SubtreeBuilder::new(&self.inodes, &self.options).build(&root)?;

        let mut next = self.tree.read().clone();
        merge_into(&mut next, &subtree)?;
        *self.tree.write() = next;

        tracing::info!(
            "Registered subtree {} ({} entries, priority {})",
            root.display(),
            subtree.len() - 1,
            registered.len()
        );
        registered.push(root);
        Ok(())
    }

    /// Read access to the current tree.
    pub fn read(&self) -> RwLockReadGuard<'_, Tree> {
        self.tree.read()
    }

    /// Registered roots, highest priority first.
    pub fn subtrees(&self) -> Vec<PathBuf> {
        self.registered.lock().clone()
    }

    pub fn inodes_issued(&self) -> u64 {
        self.inodes.issued()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;
    use std::fs;

    fn build_all(roots: &[&Path]) -> Tree {
        let inodes = InodeAllocator::new();
        let options = BuildOptions::default();
        let builder = SubtreeBuilder::new(&inodes, &options);
        let subtrees: Vec<Tree> = roots.iter().map(|r| builder.build(r).unwrap()).collect();
        merge(subtrees).unwrap()
    }

    fn names(tree: &Tree, ino: u64) -> Vec<String> {
        tree.children(ino)
            .map(|n| n.name.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_merge_root_is_reserved_synthetic_dir() {
        let a = tempfile::tempdir().unwrap();
        let union = build_all(&[a.path()]);

        assert_eq!(union.root_inode(), ROOT_INODE);
        assert!(union.root().is_dir());
        assert!(union.root().is_synthetic());
    }

    #[test]
    fn test_earlier_file_wins() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        fs::write(a.path().join("x"), "A").unwrap();
        fs::write(b.path().join("x"), "B").unwrap();

        let union = build_all(&[a.path(), b.path()]);

        let x = union.lookup(ROOT_INODE, OsStr::new("x")).unwrap();
        assert_eq!(x.real_path.as_deref(), Some(a.path().join("x").as_path()));
        assert_eq!(names(&union, ROOT_INODE), ["x"]);
    }

    #[test]
    fn test_directories_merge_into_synthetic_dir() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        fs::create_dir(a.path().join("d")).unwrap();
        fs::create_dir(b.path().join("d")).unwrap();
        fs::write(a.path().join("d/p.txt"), "p").unwrap();
        fs::write(b.path().join("d/q.txt"), "q").unwrap();

        let union = build_all(&[a.path(), b.path()]);

        let d = union.lookup(ROOT_INODE, OsStr::new("d")).unwrap();
        assert!(d.is_synthetic());
        assert_eq!(d.perm(), 0o755);
        assert_eq!(d.size, 0);
        assert_eq!(names(&union, d.inode), ["p.txt", "q.txt"]);
    }

    #[test]
    fn test_directory_wins_over_file_either_order() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        fs::write(a.path().join("n"), "file").unwrap();
        fs::write(a.path().join("z"), "z").unwrap();
        fs::create_dir(b.path().join("n")).unwrap();
        fs::write(b.path().join("n/inner"), "i").unwrap();

        for order in [[a.path(), b.path()], [b.path(), a.path()]] {
            let union = build_all(&order);
            let n = union.lookup(ROOT_INODE, OsStr::new("n")).unwrap();
            assert!(n.is_dir());
            assert!(union.lookup(n.inode, OsStr::new("inner")).is_some());
        }

        // The directory takes the file's slot
        let union = build_all(&[a.path(), b.path()]);
        assert_eq!(names(&union, ROOT_INODE), ["n", "z"]);
    }

    #[test]
    fn test_merging_same_tree_twice_is_duplicate_inode() {
        let a = tempfile::tempdir().unwrap();
        fs::write(a.path().join("x"), "A").unwrap();
        let inodes = InodeAllocator::new();
        let options = BuildOptions::default();
        let tree = SubtreeBuilder::new(&inodes, &options).build(a.path()).unwrap();

        let err = merge(vec![tree.clone(), tree]).unwrap_err();
        assert!(matches!(err, UniteError::DuplicateInode(_)));
    }

    #[test]
    fn test_register_subtree_keeps_existing_inodes() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        fs::create_dir(a.path().join("d")).unwrap();
        fs::write(a.path().join("d/p.txt"), "p").unwrap();
        fs::write(a.path().join("top.txt"), "t").unwrap();
        fs::create_dir(b.path().join("d")).unwrap();
        fs::write(b.path().join("d/q.txt"), "q").unwrap();

        let union = UnionTree::from_roots(&[a.path()], BuildOptions::default()).unwrap();
        let (d_before, p_before, top_before) = {
            let tree = union.read();
            let d = tree.lookup(ROOT_INODE, OsStr::new("d")).unwrap().inode;
            let p = tree.lookup(d, OsStr::new("p.txt")).unwrap().inode;
            let top = tree.lookup(ROOT_INODE, OsStr::new("top.txt")).unwrap().inode;
            (d, p, top)
        };

        union.register_subtree(b.path()).unwrap();

        let tree = union.read();
        let d = tree.lookup(ROOT_INODE, OsStr::new("d")).unwrap();
        assert_eq!(d.inode, d_before);
        assert_eq!(tree.lookup(d.inode, OsStr::new("p.txt")).unwrap().inode, p_before);
        assert_eq!(
            tree.lookup(ROOT_INODE, OsStr::new("top.txt")).unwrap().inode,
            top_before
        );
        assert!(tree.lookup(d.inode, OsStr::new("q.txt")).is_some());
    }

    #[test]
    fn test_register_same_root_twice_fails() {
        let a = tempfile::tempdir().unwrap();
        let union = UnionTree::new(BuildOptions::default());
        union.register_subtree(a.path()).unwrap();

        let err = union.register_subtree(a.path()).unwrap_err();
        assert!(matches!(err, UniteError::SubtreeAlreadyRegistered(_)));
        assert_eq!(union.subtrees().len(), 1);
    }

    #[test]
    fn test_failed_registration_leaves_union_intact() {
        let a = tempfile::tempdir().unwrap();
        fs::write(a.path().join("x"), "A").unwrap();
        let union = UnionTree::from_roots(&[a.path()], BuildOptions::default()).unwrap();

        let err = union
            .register_subtree(&a.path().join("missing"))
            .unwrap_err();
        assert!(matches!(err, UniteError::Build { .. }));
        assert_eq!(union.read().child_inodes(ROOT_INODE).len(), 1);
    }

    #[test]
    fn test_root_adopts_first_source_owner() {
        use std::os::unix::fs::MetadataExt;

        let a = tempfile::tempdir().unwrap();
        let union = UnionTree::new(BuildOptions::default());
        assert_eq!(union.read().root().uid, 0);

        union.register_subtree(a.path()).unwrap();
        let meta = fs::metadata(a.path()).unwrap();
        let tree = union.read();
        assert_eq!(tree.root().uid, meta.uid());
        assert_eq!(tree.root().gid, meta.gid());
        assert_ne!(tree.root().mtime, std::time::SystemTime::UNIX_EPOCH);
    }
}
