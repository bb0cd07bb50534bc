//! Typed view of the page store as an array of entry slots, indexed
//! globally (slot `i` at byte offset `i * 512`). Slabs are bump-allocated
//! in whole pages; nothing is ever freed.
//!
//! Aliasing rules: `entry_mut` is writer-only on a locked entry, which
//! readers never dereference. `published` acquire-loads the lock byte
//! through a raw pointer before a `&Entry` is formed, so a shared
//! reference never aliases an active `&mut`; after publication the writer
//! touches only the atomic size fields. `get`/`slice` are for the writer
//! reading its own tree, or anyone after the walk has finished.

use std::sync::atomic::{AtomicU8, Ordering};

use log::trace;

use crate::error::Result;
use crate::tree::entry::{Entry, ENTRY_SIZE};
use crate::tree::page_store::PageStore;

pub struct EntryPool {
    store: PageStore,
    slots_per_page: u32,
}

impl EntryPool {
    pub fn new(store: PageStore) -> EntryPool {
        let slots_per_page = (store.page_size() / ENTRY_SIZE) as u32;
        EntryPool {
            store,
            slots_per_page,
        }
    }

    pub fn store(&self) -> &PageStore {
        &self.store
    }

    pub fn slots_per_page(&self) -> u32 {
        self.slots_per_page
    }

    /// Bump-allocate a page-aligned slab, returning its starting slot.
    /// Slab bytes are zero: the pages come fresh from the anonymous
    /// mapping and are never reused. Writer thread only.
    pub fn alloc(&self, count: u32) -> Result<u32> {
        debug_assert!(count > 0, "zero-entry slabs are not allocated");
        let bytes = count as u64 * ENTRY_SIZE as u64;
        let page_size = self.store.page_size() as u64;
        let pages = ((bytes + page_size - 1) / page_size) as u32;

        let start_page = self.store.extent();
        self.store.grow_to(start_page + pages)?;
        let start_slot = start_page * self.slots_per_page;

        trace!(
            "alloc slab: {} entries, {} pages at page {} (slot {})",
            count,
            pages,
            start_page,
            start_slot
        );
        Ok(start_slot)
    }

    fn slot_ptr(&self, index: u32) -> *mut Entry {
        let offset = index as usize * ENTRY_SIZE;
        debug_assert!(
            offset + ENTRY_SIZE <= self.store.extent() as usize * self.store.page_size(),
            "slot {} outside committed extent",
            index
        );
        unsafe { self.store.base_ptr().add(offset) as *mut Entry }
    }

    pub fn get(&self, index: u32) -> &Entry {
        unsafe { &*self.slot_ptr(index) }
    }

    /// # Safety
    ///
    /// Caller must be the single writer, the entry must be unpublished
    /// (or otherwise unreachable by readers), and no other reference to
    /// it may be alive.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn entry_mut(&self, index: u32) -> &mut Entry {
        &mut *self.slot_ptr(index)
    }

    /// Reader path: a shared reference, but only if the entry is
    /// published.
    pub fn published(&self, index: u32) -> Option<&Entry> {
        let ptr = self.slot_ptr(index) as *const u8;
        let lock = unsafe { &*(ptr.add(Entry::LOCK_OFFSET) as *const AtomicU8) };
        if lock.load(Ordering::Acquire) != 0 {
            return None;
        }
        Some(unsafe { &*(ptr as *const Entry) })
    }

    pub fn slice(&self, start: u32, count: u32) -> &[Entry] {
        if count == 0 {
            return &[];
        }
        let end = start as usize + count as usize;
        debug_assert!(
            end * ENTRY_SIZE <= self.store.extent() as usize * self.store.page_size(),
            "slice {}..{} outside committed extent",
            start,
            end
        );
        unsafe { std::slice::from_raw_parts(self.slot_ptr(start) as *const Entry, count as usize) }
    }
}
