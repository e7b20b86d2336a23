//! File-backed shared mapping used by both ends of the channel.
//!
//! The mapping is `MAP_SHARED`, so stores become visible to the peer process
//! without an explicit flush. Only the ready flag is accessed atomically; every
//! other byte is published by the release store on that flag.

use crate::header::READY_FLAG_OFFSET;
use crate::{TransportError, TransportResult};
use memmap2::MmapMut;
use std::fs::{self, OpenOptions};
use std::mem::ManuallyDrop;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use tracing::{debug, warn};

/// A mapped file plus the knowledge of whether this process must delete it.
pub(crate) struct MappedFile {
    path: PathBuf,
    map: ManuallyDrop<MmapMut>,
    owned: bool,
}

impl MappedFile {
    /// Creates (or truncates) `path`, sizes it to `len` zeroed bytes and maps it.
    pub(crate) fn create(path: &Path, len: usize) -> TransportResult<Self> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| TransportError::io(parent, err))?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|err| TransportError::io(path, err))?;
        file.set_len(len as u64)
            .map_err(|err| TransportError::io(path, err))?;
        Self::map(path, &file, true)
    }

    /// Maps an existing file created by the peer.
    pub(crate) fn open(path: &Path) -> TransportResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|err| TransportError::io(path, err))?;
        Self::map(path, &file, false)
    }

    fn map(path: &Path, file: &fs::File, owned: bool) -> TransportResult<Self> {
        // SAFETY: the file is shared only with the peer process, which follows
        // the ready-flag handshake; neither side truncates a file while it is
        // mapped.
        let map = unsafe { MmapMut::map_mut(file) }.map_err(|err| TransportError::io(path, err))?;
        if map.len() <= READY_FLAG_OFFSET {
            return Err(TransportError::Protocol(format!(
                "{} is too small to hold a header",
                path.display()
            )));
        }
        debug!(path = %path.display(), len = map.len(), owned, "mapped shared memory file");
        Ok(Self {
            path: path.to_path_buf(),
            map: ManuallyDrop::new(map),
            owned,
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        &self.map
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.map
    }

    pub(crate) fn ready_flag(&self) -> &AtomicU8 {
        // SAFETY: the offset is inside the mapping (checked in `map`), `AtomicU8`
        // has the size and alignment of `u8`, and the mapping outlives `&self`.
        unsafe { &*(self.map.as_ptr().add(READY_FLAG_OFFSET) as *const AtomicU8) }
    }

    pub(crate) fn load_ready_flag(&self) -> u8 {
        self.ready_flag().load(Ordering::Acquire)
    }

    pub(crate) fn store_ready_flag(&self, value: u8) {
        self.ready_flag().store(value, Ordering::Release);
    }

    /// Leaves the file on disk when this mapping is dropped.
    pub(crate) fn disown(&mut self) {
        self.owned = false;
    }

    /// Deletes the file when this mapping is dropped.
    pub(crate) fn adopt(&mut self) {
        self.owned = true;
    }

    pub(crate) fn is_owned(&self) -> bool {
        self.owned
    }
}

impl Drop for MappedFile {
    fn drop(&mut self) {
        // SAFETY: `map` is never touched again after this point.
        unsafe { ManuallyDrop::drop(&mut self.map) };
        if self.owned {
            match fs::remove_file(&self.path) {
                Ok(()) => debug!(path = %self.path.display(), "deleted shared memory file"),
                Err(err) => {
                    warn!(path = %self.path.display(), %err, "failed to delete shared memory file")
                }
            }
        }
    }
}

impl std::fmt::Debug for MappedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedFile")
            .field("path", &self.path)
            .field("len", &self.map.len())
            .field("owned", &self.owned)
            .finish()
    }
}
