use fuser::{FileType, FUSE_ROOT_ID};
use fxhash::FxHashMap;
use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use std::time::SystemTime;

use crate::error::{Result, UniteError};

/// Inode reserved for the union root. Never issued by the allocator.
pub const ROOT_INODE: u64 = FUSE_ROOT_ID;

/// Permission bits reported for directories that only aggregate children.
pub const SYNTHETIC_DIR_PERM: u32 = 0o755;

/// One entry of the union tree.
///
/// Metadata is a snapshot taken when the subtree was walked; it is not refreshed
/// from disk afterwards.
#[derive(Debug, Clone)]
pub struct Node {
    pub inode: u64,
    pub name: OsString,
    /// Full `st_mode`: file type plus permission bits.
    pub mode: u32,
    pub size: u64,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    /// Backing file for reads. `None` for the root and for merged directories.
    pub real_path: Option<PathBuf>,
}

impl Node {
    /// A directory with no backing file, as used for the union root.
    ///
    /// Owner and timestamps start zeroed; the first registered subtree root
    /// lends its own.
    pub fn synthetic_dir(inode: u64, name: OsString) -> Self {
        Node {
            inode,
            name,
            mode: libc::S_IFDIR as u32 | SYNTHETIC_DIR_PERM,
            size: 0,
            mtime: SystemTime::UNIX_EPOCH,
            ctime: SystemTime::UNIX_EPOCH,
            nlink: 2,
            uid: 0,
            gid: 0,
            real_path: None,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.mode & libc::S_IFMT as u32 == libc::S_IFDIR as u32
    }

    pub fn is_regular_file(&self) -> bool {
        self.mode & libc::S_IFMT as u32 == libc::S_IFREG as u32
    }

    pub fn is_synthetic(&self) -> bool {
        self.real_path.is_none()
    }

    pub fn perm(&self) -> u16 {
        (self.mode & 0o7777) as u16
    }

    pub fn file_type(&self) -> FileType {
        crate::union::convert::mode_to_filetype(self.mode)
    }

    /// Turn this node into a merged directory, keeping its inode, name and
    /// timestamps so clients holding it see the same identity.
    pub(crate) fn make_synthetic(&mut self) {
        self.mode = libc::S_IFDIR as u32 | SYNTHETIC_DIR_PERM;
        self.size = 0;
        self.real_path = None;
    }
}

/// A directory entry as returned to readdir.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub inode: u64,
    pub name: OsString,
    pub kind: FileType,
}

impl From<&Node> for DirEntry {
    fn from(node: &Node) -> Self {
        DirEntry {
            inode: node.inode,
            name: node.name.clone(),
            kind: node.file_type(),
        }
    }
}

/// Arena of nodes keyed by inode, plus the ordered child list of every node.
///
/// Relationships are stored by inode only, so node values can be cloned and
/// handed out without tying them to the tree's internal layout.
#[derive(Debug, Clone)]
pub struct Tree {
    root: u64,
    nodes: FxHashMap<u64, Node>,
    children: FxHashMap<u64, Vec<u64>>,
}

impl Tree {
    pub fn new(root: Node) -> Self {
        let root_ino = root.inode;
        let mut nodes = FxHashMap::default();
        let mut children = FxHashMap::default();
        nodes.insert(root_ino, root);
        children.insert(root_ino, Vec::new());
        Tree {
            root: root_ino,
            nodes,
            children,
        }
    }

    pub fn root(&self) -> &Node {
        // The root is inserted at construction and never removed.
        &self.nodes[&self.root]
    }

    pub fn root_inode(&self) -> u64 {
        self.root
    }

    /// Register a new, childless node.
    pub fn add(&mut self, node: Node) -> Result<()> {
        if self.nodes.contains_key(&node.inode) {
            return Err(UniteError::DuplicateInode(node.inode));
        }
        self.children.insert(node.inode, Vec::new());
        self.nodes.insert(node.inode, node);
        Ok(())
    }

    /// Append `child` to the end of `parent`'s child list.
    pub fn attach_child(&mut self, parent: u64, child: u64) -> Result<()> {
        if !self.nodes.contains_key(&child) {
            return Err(UniteError::NotFound(format!("inode {}", child)));
        }
        let list = self
            .children
            .get_mut(&parent)
            .ok_or_else(|| UniteError::NotFound(format!("inode {}", parent)))?;
        list.push(child);
        Ok(())
    }

    /// Swap `old` for `new` in `parent`'s child list, keeping its position.
    pub fn replace_child(&mut self, parent: u64, old: u64, new: u64) -> Result<()> {
        if !self.nodes.contains_key(&new) {
            return Err(UniteError::NotFound(format!("inode {}", new)));
        }
        let list = self
            .children
            .get_mut(&parent)
            .ok_or_else(|| UniteError::NotFound(format!("inode {}", parent)))?;
        let slot = list
            .iter_mut()
            .find(|ino| **ino == old)
            .ok_or_else(|| UniteError::NotFound(format!("inode {}", old)))?;
        *slot = new;
        Ok(())
    }

    /// Find a child of `parent` by name. Absence is a normal outcome.
    pub fn lookup(&self, parent: u64, name: &OsStr) -> Option<&Node> {
        self.children
            .get(&parent)?
            .iter()
            .filter_map(|ino| self.nodes.get(ino))
            .find(|node| node.name.as_os_str() == name)
    }

    pub fn get(&self, ino: u64) -> Option<&Node> {
        self.nodes.get(&ino)
    }

    pub(crate) fn get_mut(&mut self, ino: u64) -> Option<&mut Node> {
        self.nodes.get_mut(&ino)
    }

    /// Children of `ino` in insertion order. Empty for unknown inodes and files.
    pub fn children(&self, ino: u64) -> impl Iterator<Item = &Node> + '_ {
        self.children
            .get(&ino)
            .into_iter()
            .flatten()
            .filter_map(|child| self.nodes.get(child))
    }

    pub fn child_inodes(&self, ino: u64) -> &[u64] {
        self.children.get(&ino).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, ino: u64) -> bool {
        self.nodes.contains_key(&ino)
    }

    /// Number of registered nodes, including the root and shadowed entries.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Inodes reachable from the root, depth-first in child order.
    pub fn reachable(&self) -> Vec<u64> {
        let mut out = Vec::new();
        let mut stack = vec![self.root];
        while let Some(ino) = stack.pop() {
            out.push(ino);
            for child in self.child_inodes(ino).iter().rev() {
                stack.push(*child);
            }
        }
        out
    }
}
