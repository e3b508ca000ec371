use std::sync::atomic::{AtomicU64, Ordering};

use crate::union::types::ROOT_INODE;

/// Issues inode numbers for every node built from any subtree.
///
/// A single allocator is shared by all subtree builds of one union so that
/// nodes coming from different sources can be grafted into the same tree
/// without renumbering. Numbers are handed out monotonically and are never
/// reused; the root inode is never issued.
#[derive(Debug)]
pub struct InodeAllocator {
    next_ino: AtomicU64,
}

impl InodeAllocator {
    pub fn new() -> Self {
        InodeAllocator {
            // Start after FUSE_ROOT_ID, which belongs to the union root
            next_ino: AtomicU64::new(ROOT_INODE + 1),
        }
    }

    /// Allocate a new unique inode number.
    pub fn next(&self) -> u64 {
        self.next_ino.fetch_add(1, Ordering::Relaxed)
    }

    /// Number of inodes issued so far.
    pub fn issued(&self) -> u64 {
        self.next_ino.load(Ordering::Relaxed) - (ROOT_INODE + 1)
    }
}

impl Default for InodeAllocator {
    fn default() -> Self {
        Self::new()
    }
}
