use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Result, UniteError};
use crate::union::file_handle::HandleTable;
use crate::union::merge::UnionTree;
use crate::union::types::{DirEntry, Node};

/// Answers filesystem requests against the union tree.
///
/// This is the layer the FUSE callbacks delegate to. It knows nothing about
/// the kernel protocol: handle ids come from the caller, and errors are
/// [`UniteError`] values the caller maps to errno.
pub struct UnionService {
    union: Arc<UnionTree>,
    handles: HandleTable,
}

impl UnionService {
    pub fn new(union: Arc<UnionTree>) -> Self {
        UnionService {
            union,
            handles: HandleTable::new(),
        }
    }

    pub fn union(&self) -> &Arc<UnionTree> {
        &self.union
    }

    pub fn handles(&self) -> &HandleTable {
        &self.handles
    }

    pub fn root(&self) -> Node {
        self.union.read().root().clone()
    }

    /// Cached metadata for `ino`. Never touches the disk.
    pub fn attr(&self, ino: u64) -> Result<Node> {
        self.union
            .read()
            .get(ino)
            .cloned()
            .ok_or_else(|| UniteError::NotFound(format!("inode {}", ino)))
    }

    pub fn lookup(&self, parent: u64, name: &OsStr) -> Result<Node> {
        let tree = self.union.read();
        let parent_node = tree
            .get(parent)
            .ok_or_else(|| UniteError::NotFound(format!("inode {}", parent)))?;
        if !parent_node.is_dir() {
            return Err(UniteError::NotADirectory(parent));
        }
        tree.lookup(parent, name)
            .cloned()
            .ok_or_else(|| UniteError::NotFound(name.to_string_lossy().into_owned()))
    }

    /// Children of a directory, in the same order on every call.
    pub fn read_dir_all(&self, ino: u64) -> Result<Vec<DirEntry>> {
        let tree = self.union.read();
        let node = tree
            .get(ino)
            .ok_or_else(|| UniteError::NotFound(format!("inode {}", ino)))?;
        if !node.is_dir() {
            return Err(UniteError::NotADirectory(ino));
        }
        Ok(tree.children(ino).map(DirEntry::from).collect())
    }

    /// Check that `ino` can be read through a handle, returning its backing path.
    ///
    /// Only regular files qualify. Fifos, sockets and devices could block the
    /// session thread on open or read, so they are refused with `EINVAL`.
    pub fn readable_path(&self, ino: u64) -> Result<PathBuf> {
        let node = self.attr(ino)?;
        let Some(real_path) = node.real_path.clone() else {
            return Err(UniteError::BadFileDescriptor(ino));
        };
        if node.is_dir() {
            return Err(UniteError::IsDirectory(ino));
        }
        if !node.is_regular_file() {
            tracing::debug!("refusing to read special file {}", real_path.display());
            return Err(UniteError::Io(std::io::Error::from_raw_os_error(libc::EINVAL)));
        }
        Ok(real_path)
    }

    /// Read from `ino` through `handle_id`, opening the backing file on the
    /// first read of that handle.
    pub fn read(&self, ino: u64, handle_id: u64, offset: u64, length: usize) -> Result<Vec<u8>> {
        if !self.handles.contains(handle_id) {
            let real_path = self.readable_path(ino)?;
            match self.handles.open(handle_id, &real_path) {
                // A concurrent first read on the same handle got there first
                Ok(()) | Err(UniteError::AlreadyRegistered(_)) => {}
                Err(e) => return Err(e),
            }
        }
        self.handles.read_at(handle_id, offset, length)
    }

    /// Release `handle_id`. Flushing a handle that is already closed, or was
    /// never read from, is not an error.
    pub fn flush(&self, handle_id: u64) -> Result<()> {
        match self.handles.close(handle_id) {
            Ok(()) => Ok(()),
            Err(UniteError::BadHandle(_)) => {
                tracing::trace!("flush: handle {} already closed", handle_id);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Target of a symlink node.
    pub fn read_link(&self, ino: u64) -> Result<PathBuf> {
        let node = self.attr(ino)?;
        if node.file_type() != fuser::FileType::Symlink {
            return Err(UniteError::Io(std::io::Error::from_raw_os_error(libc::EINVAL)));
        }
        let real_path = node.real_path.ok_or(UniteError::BadFileDescriptor(ino))?;
        Ok(std::fs::read_link(real_path)?)
    }

    pub fn register_subtree(&self, path: &Path) -> Result<()> {
        self.union.register_subtree(path)
    }

    /// Number of nodes held by the tree, for statfs.
    pub fn node_count(&self) -> u64 {
        self.union.read().len() as u64
    }
}
