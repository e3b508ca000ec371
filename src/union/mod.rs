pub mod builder;
mod convert;
pub mod display;
pub mod file_handle;
pub mod inode_manager;
pub mod merge;
pub mod mount;
pub mod service;
pub mod types;

pub use builder::{BuildOptions, SubtreeBuilder};
pub use file_handle::HandleTable;
pub use inode_manager::InodeAllocator;
pub use merge::{merge, merge_into, UnionTree};
pub use mount::mount_union;
pub use service::UnionService;
pub use types::{DirEntry, Node, Tree, ROOT_INODE};

use convert::{error_to_libc, node_to_fileattr};

use fuser::{
    Filesystem, KernelConfig, ReplyAttr, ReplyData, ReplyDirectory, ReplyEmpty,
    ReplyEntry, ReplyOpen, ReplyStatfs, Request,
};
use parking_lot::Mutex;
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::UniteError;

/// FUSE front end of the union. Every callback delegates to [`UnionService`]
/// and only translates arguments and errors.
pub struct UniteFs {
    service: Arc<UnionService>,
    next_fh: Mutex<u64>,
    /// Attribute and entry cache timeout handed to the kernel. The tree only
    /// changes when a subtree is registered, so this can be generous.
    ttl: Duration,
}

impl UniteFs {
    pub fn new(service: Arc<UnionService>, ttl_secs: u64) -> Self {
        UniteFs {
            service,
            next_fh: Mutex::new(1),
            ttl: Duration::from_secs(ttl_secs),
        }
    }

    pub fn service(&self) -> &Arc<UnionService> {
        &self.service
    }

    fn alloc_fh(&self) -> u64 {
        let mut next = self.next_fh.lock();
        let fh = *next;
        // Handles are ephemeral; wrapping is not a practical concern
        *next = next.wrapping_add(1);
        fh
    }

    fn errno(op: &str, e: &UniteError) -> i32 {
        match e {
            UniteError::NotFound(_) => tracing::trace!("{}: {}", op, e),
            UniteError::BadHandle(_) | UniteError::AlreadyRegistered(_) => {
                tracing::warn!("{}: {}", op, e)
            }
            _ => tracing::debug!("{}: {}", op, e),
        }
        error_to_libc(e)
    }
}

impl Filesystem for UniteFs {
    fn init(
        &mut self,
        _req: &Request,
        _config: &mut KernelConfig,
    ) -> std::result::Result<(), libc::c_int> {
        tracing::info!(
            "unitefs initialized with {} subtree(s)",
            self.service.union().subtrees().len()
        );
        Ok(())
    }

    fn destroy(&mut self) {
        let open = self.service.handles().len();
        if open > 0 {
            tracing::debug!("{} handle(s) still open at unmount", open);
        }
        tracing::info!("unitefs destroyed");
    }

    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        tracing::debug!("lookup(parent={}, name={:?})", parent, name);
        match self.service.lookup(parent, name) {
            Ok(node) => reply.entry(&self.ttl, &node_to_fileattr(&node), 0),
            Err(e) => reply.error(Self::errno("lookup", &e)),
        }
    }

    fn getattr(&mut self, _req: &Request, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        tracing::trace!("getattr(ino={})", ino);
        match self.service.attr(ino) {
            Ok(node) => reply.attr(&self.ttl, &node_to_fileattr(&node)),
            Err(e) => reply.error(Self::errno("getattr", &e)),
        }
    }

    fn readlink(&mut self, _req: &Request, ino: u64, reply: ReplyData) {
        tracing::debug!("readlink(ino={})", ino);
        match self.service.read_link(ino) {
            Ok(target) => reply.data(target.as_os_str().as_bytes()),
            Err(e) => reply.error(Self::errno("readlink", &e)),
        }
    }

    /// Hand out a handle id without touching the backing file. The file is
    /// opened by the first read on that handle.
    fn open(&mut self, _req: &Request, ino: u64, flags: i32, reply: ReplyOpen) {
        tracing::debug!("open(ino={}, flags={:#x})", ino, flags);

        // O_RDONLY is 0, so anything else asks for write access
        if (flags & libc::O_ACCMODE) != libc::O_RDONLY {
            reply.error(libc::EROFS);
            return;
        }

        if let Err(e) = self.service.readable_path(ino) {
            reply.error(Self::errno("open", &e));
            return;
        }

        let fh = self.alloc_fh();
        reply.opened(fh, 0);
    }

    fn read(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        tracing::debug!(
            "read(ino={}, fh={}, offset={}, size={})",
            ino,
            fh,
            offset,
            size
        );
        if offset < 0 {
            reply.error(libc::EINVAL);
            return;
        }

        match self.service.read(ino, fh, offset as u64, size as usize) {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(Self::errno("read", &e)),
        }
    }

    fn flush(&mut self, _req: &Request, ino: u64, fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        tracing::debug!("flush(ino={}, fh={})", ino, fh);
        match self.service.flush(fh) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(Self::errno("flush", &e)),
        }
    }

    fn release(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        tracing::debug!("release(ino={}, fh={})", ino, fh);
        match self.service.flush(fh) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(Self::errno("release", &e)),
        }
    }

    fn opendir(&mut self, _req: &Request, ino: u64, _flags: i32, reply: ReplyOpen) {
        match self.service.attr(ino) {
            Ok(node) if node.is_dir() => reply.opened(0, 0),
            Ok(_) => reply.error(libc::ENOTDIR),
            Err(e) => reply.error(Self::errno("opendir", &e)),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        tracing::debug!("readdir(ino={}, offset={})", ino, offset);
        let entries = match self.service.read_dir_all(ino) {
            Ok(entries) => entries,
            Err(e) => {
                reply.error(Self::errno("readdir", &e));
                return;
            }
        };

        // Offsets are positions in the child list, which never reorders
        let start = offset.max(0) as usize;
        for (idx, entry) in entries.iter().enumerate().skip(start) {
            if reply.add(entry.inode, (idx + 1) as i64, entry.kind, &entry.name) {
                break;
            }
        }
        reply.ok();
    }

    fn releasedir(
        &mut self,
        _req: &Request,
        _ino: u64,
        _fh: u64,
        _flags: i32,
        reply: ReplyEmpty,
    ) {
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request, _ino: u64, reply: ReplyStatfs) {
        reply.statfs(0, 0, 0, self.service.node_count(), 0, 512, 255, 512);
    }

    fn access(&mut self, _req: &Request, ino: u64, mask: i32, reply: ReplyEmpty) {
        match self.service.attr(ino) {
            Ok(_) if mask & libc::W_OK != 0 => reply.error(libc::EROFS),
            Ok(_) => reply.ok(),
            Err(e) => reply.error(Self::errno("access", &e)),
        }
    }
}
