//! The fixed 512-byte node record, addressed by global slot index
//! (`index * ENTRY_SIZE` = byte offset into the mapping). A single writer
//! fills an entry while `lock_this` is 1 and publishes with a release
//! store of 0; after publication only the atomic size aggregates change.

use std::mem;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use crate::error::{Result, StoreError};

pub const ENTRY_SIZE: usize = 512;

/// Inline name capacity, including the trailing NUL.
pub const NAME_CAP: usize = 256;

pub const MAX_NAME_LEN: usize = NAME_CAP - 1;

/// Sentinel parent index of the root entry.
pub const ROOT_PARENT: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Kind {
    Dir = 0,
    File = 1,
    LinkSoft = 2,
    LinkHard = 3,
    Unknown = 4,
}

impl Kind {
    pub fn from_raw(raw: u8) -> Kind {
        match raw {
            0 => Kind::Dir,
            1 => Kind::File,
            2 => Kind::LinkSoft,
            3 => Kind::LinkHard,
            _ => Kind::Unknown,
        }
    }

    pub fn is_dir(self) -> bool {
        self == Kind::Dir
    }
}

#[repr(C)]
pub struct Entry {
    parent: u32,
    children_start: u32,
    children_count: u32,
    inode: u32,
    byte_count: AtomicU64,
    block_count: AtomicU64,
    mtime: u64,
    lock_this: AtomicU8,
    lock_child: u8,
    kind: u8,
    name_len: u8,
    _reserved: [u8; 212],
    name: [u8; NAME_CAP],
}

const _: () = assert!(mem::size_of::<Entry>() == ENTRY_SIZE);
const _: () = assert!(mem::align_of::<Entry>() == 8);
const _: () = assert!(mem::offset_of!(Entry, byte_count) == 16);
const _: () = assert!(mem::offset_of!(Entry, lock_this) == 40);
const _: () = assert!(mem::offset_of!(Entry, name) == 256);

impl Entry {
    // ---------- read side ----------

    pub fn parent(&self) -> u32 {
        self.parent
    }

    pub fn children_start(&self) -> u32 {
        self.children_start
    }

    pub fn children_count(&self) -> u32 {
        self.children_count
    }

    pub fn inode(&self) -> u32 {
        self.inode
    }

    pub fn mtime(&self) -> u64 {
        self.mtime
    }

    pub fn kind(&self) -> Kind {
        Kind::from_raw(self.kind)
    }

    pub fn byte_count(&self) -> u64 {
        self.byte_count.load(Ordering::Relaxed)
    }

    pub fn block_count(&self) -> u64 {
        self.block_count.load(Ordering::Relaxed)
    }

    pub fn name(&self) -> &str {
        std::str::from_utf8(&self.name[..self.name_len as usize]).unwrap_or("")
    }

    pub fn is_published(&self) -> bool {
        self.lock_this.load(Ordering::Acquire) == 0
    }

    // ---------- write side (single writer, entry locked) ----------

    pub fn set_parent(&mut self, parent: u32) {
        self.parent = parent;
    }

    /// Written exactly once, while this directory's own `lock_this` is
    /// still 1.
    pub fn set_children(&mut self, start: u32, count: u32) {
        debug_assert_eq!(self.children_count, 0, "child slab assigned twice");
        self.children_start = start;
        self.children_count = count;
    }

    pub fn set_kind(&mut self, kind: Kind) {
        self.kind = kind as u8;
    }

    pub fn set_inode(&mut self, inode: u32) {
        self.inode = inode;
    }

    pub fn set_mtime(&mut self, mtime: u64) {
        self.mtime = mtime;
    }

    pub fn set_name(&mut self, name: &str) -> Result<()> {
        let bytes = name.as_bytes();
        if bytes.len() > MAX_NAME_LEN {
            return Err(StoreError::NameTooLong {
                len: bytes.len(),
                limit: MAX_NAME_LEN,
            });
        }
        self.name[..bytes.len()].copy_from_slice(bytes);
        self.name[bytes.len()] = 0;
        self.name_len = bytes.len() as u8;
        Ok(())
    }

    pub fn set_sizes(&mut self, bytes: u64, blocks: u64) {
        self.byte_count.store(bytes, Ordering::Relaxed);
        self.block_count.store(blocks, Ordering::Relaxed);
    }

    pub fn set_locked(&mut self) {
        self.lock_this.store(1, Ordering::Relaxed);
    }

    /// The target may already be published when a subtree folds in, hence
    /// atomic adds.
    pub fn add_sizes(&self, bytes: u64, blocks: u64) {
        self.byte_count.fetch_add(bytes, Ordering::Relaxed);
        self.block_count.fetch_add(blocks, Ordering::Relaxed);
    }

    pub fn publish(&self) {
        self.lock_this.store(0, Ordering::Release);
    }

    /// Offset of the publication byte, for lock checks through a raw
    /// pointer before a `&Entry` is formed.
    pub(crate) const LOCK_OFFSET: usize = 40;
}
