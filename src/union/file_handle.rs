use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::{FileExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Result, UniteError};

/// One open of a backing file.
///
/// `file` is taken out when the handle is closed, so a reader that grabbed the
/// handle before the close sees `None` instead of a stale descriptor.
#[derive(Debug)]
pub(crate) struct OpenHandle {
    pub real_path: PathBuf,
    pub file: Option<File>,
}

/// Open backing files keyed by the handle id the protocol layer issued.
///
/// Different handle ids only share a map shard for the duration of a lookup;
/// all I/O on one handle is serialized by that handle's own mutex.
#[derive(Debug, Default)]
pub struct HandleTable {
    handles: DashMap<u64, Arc<Mutex<OpenHandle>>>,
}

impl HandleTable {
    pub fn new() -> Self {
        HandleTable {
            handles: DashMap::new(),
        }
    }

    /// Open `real_path` read-only and register it under `handle_id`.
    pub fn open(&self, handle_id: u64, real_path: &Path) -> Result<()> {
        if self.handles.contains_key(&handle_id) {
            return Err(UniteError::AlreadyRegistered(handle_id));
        }

        // Open before touching the map so slow disks never hold a shard lock.
        // O_NONBLOCK keeps a fifo swapped in after the walk from stalling here.
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(real_path)?;

        match self.handles.entry(handle_id) {
            Entry::Occupied(_) => Err(UniteError::AlreadyRegistered(handle_id)),
            Entry::Vacant(slot) => {
                tracing::debug!(
                    "handle {} opened for {}",
                    handle_id,
                    real_path.display()
                );
                slot.insert(Arc::new(Mutex::new(OpenHandle {
                    real_path: real_path.to_path_buf(),
                    file: Some(file),
                })));
                Ok(())
            }
        }
    }

    /// Read up to `length` bytes at `offset`. Fewer bytes are returned only at EOF.
    pub fn read_at(&self, handle_id: u64, offset: u64, length: usize) -> Result<Vec<u8>> {
        // Clone the Arc to release the shard before doing I/O.
        let handle = self
            .handles
            .get(&handle_id)
            .map(|h| Arc::clone(h.value()))
            .ok_or(UniteError::BadHandle(handle_id))?;
        let handle = handle.lock();
        let file = handle
            .file
            .as_ref()
            .ok_or(UniteError::BadHandle(handle_id))?;

        let mut buf = vec![0u8; length];
        let mut filled = 0;
        while filled < length {
            match file.read_at(&mut buf[filled..], offset + filled as u64) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!(
                        "read of {} failed at offset {}: {}",
                        handle.real_path.display(),
                        offset + filled as u64,
                        e
                    );
                    return Err(e.into());
                }
            }
        }
        buf.truncate(filled);
        Ok(buf)
    }

    /// Close the descriptor behind `handle_id` and forget the id.
    pub fn close(&self, handle_id: u64) -> Result<()> {
        let (_, handle) = self
            .handles
            .remove(&handle_id)
            .ok_or(UniteError::BadHandle(handle_id))?;
        // Waits for an in-flight read on this handle to finish.
        let mut handle = handle.lock();
        match handle.file.take() {
            Some(file) => {
                drop(file);
                tracing::debug!("handle {} closed", handle_id);
                Ok(())
            }
            None => Err(UniteError::BadHandle(handle_id)),
        }
    }

    pub fn contains(&self, handle_id: u64) -> bool {
        self.handles.contains_key(&handle_id)
    }

    /// Backing path of a live handle.
    pub fn real_path(&self, handle_id: u64) -> Option<PathBuf> {
        self.handles
            .get(&handle_id)
            .map(|h| h.value().lock().real_path.clone())
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
