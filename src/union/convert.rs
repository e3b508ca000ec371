use fuser::{FileAttr, FileType};
use std::fs::Metadata;
use std::io;
use std::os::unix::prelude::MetadataExt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::UniteError;
use crate::union::types::Node;

const BLOCK_SIZE: u32 = 512;

/// Map std::io::Error to appropriate libc error code.
pub(crate) fn io_error_to_libc(e: &io::Error) -> i32 {
    // The raw OS error is the most accurate when present
    if let Some(code) = e.raw_os_error() {
        return code;
    }

    match e.kind() {
        io::ErrorKind::NotFound => libc::ENOENT,
        io::ErrorKind::PermissionDenied => libc::EACCES,
        io::ErrorKind::AlreadyExists => libc::EEXIST,
        io::ErrorKind::InvalidInput => libc::EINVAL,
        io::ErrorKind::InvalidData => libc::EINVAL,
        io::ErrorKind::TimedOut => libc::ETIMEDOUT,
        io::ErrorKind::Interrupted => libc::EINTR,
        io::ErrorKind::OutOfMemory => libc::ENOMEM,
        io::ErrorKind::WouldBlock => libc::EAGAIN,
        io::ErrorKind::Unsupported => libc::ENOTSUP,
        _ => libc::EIO,
    }
}

/// Map a core error to the errno reported to the kernel.
pub(crate) fn error_to_libc(e: &UniteError) -> i32 {
    match e {
        UniteError::NotFound(_) => libc::ENOENT,
        UniteError::BadHandle(_) | UniteError::BadFileDescriptor(_) => libc::EBADF,
        UniteError::AlreadyRegistered(_) => libc::EEXIST,
        UniteError::IsDirectory(_) => libc::EISDIR,
        UniteError::NotADirectory(_) => libc::ENOTDIR,
        UniteError::Io(io_err) => io_error_to_libc(io_err),
        UniteError::Build { source, .. } => io_error_to_libc(source),
        UniteError::DuplicateInode(_)
        | UniteError::SubtreeAlreadyRegistered(_)
        | UniteError::Config(_)
        | UniteError::Fuse(_) => libc::EIO,
    }
}

pub(crate) fn mode_to_filetype(mode: u32) -> FileType {
    match mode & (libc::S_IFMT as u32) {
        x if x == libc::S_IFREG as u32 => FileType::RegularFile,
        x if x == libc::S_IFDIR as u32 => FileType::Directory,
        x if x == libc::S_IFLNK as u32 => FileType::Symlink,
        x if x == libc::S_IFBLK as u32 => FileType::BlockDevice,
        x if x == libc::S_IFCHR as u32 => FileType::CharDevice,
        x if x == libc::S_IFIFO as u32 => FileType::NamedPipe,
        x if x == libc::S_IFSOCK as u32 => FileType::Socket,
        _ => FileType::RegularFile,
    }
}

/// Status-change time from raw stat fields. `Metadata::created()` is birth
/// time, which is not what `ctime` means.
pub(crate) fn metadata_ctime(meta: &Metadata) -> SystemTime {
    let secs = meta.ctime();
    let nanos = meta.ctime_nsec().clamp(0, 999_999_999) as u32;
    if secs >= 0 {
        UNIX_EPOCH + Duration::new(secs as u64, nanos)
    } else {
        UNIX_EPOCH - Duration::new(secs.unsigned_abs(), 0) + Duration::from_nanos(nanos as u64)
    }
}

/// Snapshot the parts of `meta` a node keeps.
pub(crate) fn node_from_metadata(
    meta: &Metadata,
    inode: u64,
    name: std::ffi::OsString,
    real_path: std::path::PathBuf,
) -> Node {
    Node {
        inode,
        name,
        mode: meta.mode(),
        size: meta.len(),
        mtime: meta.modified().unwrap_or(UNIX_EPOCH),
        ctime: metadata_ctime(meta),
        nlink: meta.nlink() as u32,
        uid: meta.uid(),
        gid: meta.gid(),
        real_path: Some(real_path),
    }
}

pub(crate) fn node_to_fileattr(node: &Node) -> FileAttr {
    FileAttr {
        ino: node.inode,
        size: node.size,
        blocks: node.size.div_ceil(BLOCK_SIZE as u64),
        atime: node.mtime,
        mtime: node.mtime,
        ctime: node.ctime,
        crtime: UNIX_EPOCH,
        kind: node.file_type(),
        perm: node.perm(),
        nlink: node.nlink,
        uid: node.uid,
        gid: node.gid,
        rdev: 0,
        blksize: BLOCK_SIZE,
        flags: 0,
    }
}
