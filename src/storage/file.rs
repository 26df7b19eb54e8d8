// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Memory-mapped file arena.
//!
//! Growth is unmap -> `set_len` -> remap, because a mapping's length is
//! fixed at creation. A failed grow tries to rebind the previous mapping at
//! the previous capacity; if even that fails the arena is poisoned and
//! every later operation reports `Disposed`. The file handle and mapping
//! are plain RAII values, so nothing leaks on any failure path.
//!
//! The file must not be resized or truncated by anyone else while the
//! arena is alive; the mapping's validity depends on it.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use memmap2::{MmapMut, MmapOptions};
use tracing::debug;

use crate::error::{Result, TreeError};
use crate::storage::{check_span, Storage};

const INITIAL_CAPACITY: u64 = 64 * 1024;

/// File-backed arena. The logical size trails the mapped capacity; the
/// capacity doubles on growth and `trim_to_size` snaps the file back to
/// the logical size when the build seals.
#[derive(Debug)]
pub struct FileArena {
    file: File,
    map: Option<MmapMut>,
    path: PathBuf,
    len: u64,
    capacity: u64,
    poisoned: bool,
}

impl FileArena {
    /// Create (or truncate) a file and map it with a small initial
    /// capacity.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        let map = Self::map_file(&file, INITIAL_CAPACITY)?;
        Ok(Self {
            file,
            map,
            path,
            len: 0,
            capacity: INITIAL_CAPACITY,
            poisoned: false,
        })
    }

    /// Map an existing arena file. The file length becomes the logical
    /// size, so this only makes sense on a sealed (trimmed) arena.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let len = file.metadata()?.len();
        let map = if len == 0 {
            None
        } else {
            Self::map_existing(&file, len)?
        };
        Ok(Self {
            file,
            map,
            path,
            len,
            capacity: len,
            poisoned: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn guard(&self) -> Result<()> {
        if self.poisoned {
            return Err(TreeError::Disposed);
        }
        Ok(())
    }

    fn mapped(&self) -> Result<&MmapMut> {
        self.map.as_ref().ok_or(TreeError::Disposed)
    }

    fn mapped_mut(&mut self) -> Result<&mut MmapMut> {
        self.map.as_mut().ok_or(TreeError::Disposed)
    }

    /// Extend the file to `capacity` and map it.
    fn map_file(file: &File, capacity: u64) -> Result<Option<MmapMut>> {
        file.set_len(capacity)?;
        Self::map_existing(file, capacity)
    }

    fn map_existing(file: &File, capacity: u64) -> Result<Option<MmapMut>> {
        if capacity == 0 {
            return Ok(None);
        }
        if capacity > usize::MAX as u64 {
            return Err(TreeError::CapacityExceeded {
                requested: capacity,
                limit: usize::MAX as u64,
            });
        }
        // SAFETY: the arena owns the file handle for its whole lifetime and
        // the documented contract forbids external resizing, so the mapping
        // cannot be invalidated behind our back.
        let map = unsafe { MmapOptions::new().len(capacity as usize).map_mut(file)? };
        Ok(Some(map))
    }

    /// Replace the mapping with one of `new_capacity` bytes. On failure,
    /// rebind the old capacity; if that fails too, poison the arena.
    fn rebind(&mut self, new_capacity: u64) -> Result<()> {
        let old_capacity = self.capacity;
        if let Some(map) = self.map.take() {
            let _ = map.flush();
        }
        match Self::map_file(&self.file, new_capacity) {
            Ok(map) => {
                self.map = map;
                self.capacity = new_capacity;
                Ok(())
            }
            Err(grow_err) => match Self::map_file(&self.file, old_capacity) {
                Ok(map) => {
                    self.map = map;
                    Err(grow_err)
                }
                Err(_) => {
                    self.poisoned = true;
                    Err(TreeError::Disposed)
                }
            },
        }
    }
}

impl Storage for FileArena {
    fn size(&self) -> u64 {
        self.len
    }

    fn allocate(&mut self, size: u32) -> Result<u64> {
        self.guard()?;
        let base = self.len;
        let needed = base + u64::from(size);
        if needed > self.capacity {
            let target = needed.max(self.capacity.saturating_mul(2)).max(INITIAL_CAPACITY);
            self.rebind(target)?;
        }
        self.len = needed;
        Ok(base)
    }

    fn ensure_capacity(&mut self, capacity: u64) -> Result<()> {
        self.guard()?;
        if capacity > self.capacity {
            self.rebind(capacity)?;
        }
        Ok(())
    }

    fn trim_to_size(&mut self) -> Result<()> {
        self.guard()?;
        if self.capacity == self.len {
            return Ok(());
        }
        if let Some(map) = self.map.take() {
            map.flush()?;
        }
        self.file.set_len(self.len)?;
        self.map = if self.len == 0 {
            None
        } else {
            Self::map_existing(&self.file, self.len)?
        };
        self.capacity = self.len;
        debug!(path = %self.path.display(), size = self.len, "trimmed arena file");
        Ok(())
    }

    fn read_bytes(&self, offset: u64, out: &mut [u8]) -> Result<()> {
        self.guard()?;
        check_span(offset, out.len() as u64, self.len)?;
        let map = self.mapped()?;
        let start = offset as usize;
        out.copy_from_slice(&map[start..start + out.len()]);
        Ok(())
    }

    fn write_bytes(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        self.guard()?;
        check_span(offset, bytes.len() as u64, self.len)?;
        let len = bytes.len();
        let start = offset as usize;
        let map = self.mapped_mut()?;
        map[start..start + len].copy_from_slice(bytes);
        Ok(())
    }

    fn remove_backing(&mut self) -> Result<()> {
        self.map = None;
        self.poisoned = true;
        std::fs::remove_file(&self.path)?;
        debug!(path = %self.path.display(), "removed aborted arena file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_write_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("arena.bin");

        let mut arena = FileArena::create(&path).unwrap();
        arena.allocate(64).unwrap();
        arena.write_u64(0, 0xDEAD_BEEF).unwrap();
        arena.write_u32(8, 7).unwrap();
        arena.trim_to_size().unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 64);
        drop(arena);

        let reopened = FileArena::open(&path).unwrap();
        assert_eq!(reopened.size(), 64);
        assert_eq!(reopened.read_u64(0).unwrap(), 0xDEAD_BEEF);
        assert_eq!(reopened.read_u32(8).unwrap(), 7);
    }

    #[test]
    fn growth_across_remap_preserves_contents() {
        let dir = tempfile::tempdir().unwrap();
        let mut arena = FileArena::create(dir.path().join("grow.bin")).unwrap();

        let base = arena.allocate(16).unwrap();
        arena.write_u64(base, 42).unwrap();
        // Force at least one remap past the initial capacity.
        arena.allocate(2 * INITIAL_CAPACITY as u32).unwrap();
        assert_eq!(arena.read_u64(base).unwrap(), 42);
    }

    #[test]
    fn out_of_range_is_reported_before_touching_the_map() {
        let dir = tempfile::tempdir().unwrap();
        let mut arena = FileArena::create(dir.path().join("bounds.bin")).unwrap();
        arena.allocate(8).unwrap();
        assert!(matches!(
            arena.read_u64(4),
            Err(TreeError::OutOfRange { .. })
        ));
    }

    #[test]
    fn remove_backing_deletes_and_poisons() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.bin");
        let mut arena = FileArena::create(&path).unwrap();
        arena.allocate(8).unwrap();
        arena.remove_backing().unwrap();
        assert!(!path.exists());
        assert!(matches!(arena.allocate(8), Err(TreeError::Disposed)));
        assert!(matches!(arena.read_u32(0), Err(TreeError::Disposed)));
    }
}
