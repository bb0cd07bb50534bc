//! The root-bearing container: page store + entry pool + header. Page 0
//! starts with `StoreHeader` and ends with the root entry in its last 512
//! bytes; page 1 holds the root path bytes.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use log::info;

use crate::error::{Result, StoreError};
use crate::tree::cursor::Cursor;
use crate::tree::entry::{Entry, Kind, ENTRY_SIZE, ROOT_PARENT};
use crate::tree::entry_pool::EntryPool;
use crate::tree::page_store::PageStore;
use crate::tree::read_view::ReadView;

const MAGIC: u64 = u64::from_le_bytes(*b"chonktre");
const VERSION: u32 = 1;

/// Store geometry. The default 8 GiB reservation is address space only;
/// it costs nothing until pages are touched.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub reserved_address_bytes: usize,
    pub header_pages: u32,
    pub page_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            reserved_address_bytes: 8 << 30,
            header_pages: 2,
            page_size: page_size::get(),
        }
    }
}

// Index references in the entry records are position-independent, so
// this header plus the entry pages could be flushed to disk as-is by a
// future backing.
#[repr(C)]
struct StoreHeader {
    magic: u64,
    version: u32,
    page_size: u32,
    header_pages: u32,
    root_path_len: u32,
}

pub struct TreeStore {
    pool: EntryPool,
    root_path: PathBuf,
    root_slot: u32,
    cursor_taken: AtomicBool,
    files_indexed: AtomicU64,
    // Back-reference to the owning Arc, so cursors and read views can
    // hold the store alive.
    self_ref: Weak<TreeStore>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub files_indexed: u64,
    pub pages_committed: u32,
}

impl TreeStore {
    pub fn init(root_path: &Path, config: StoreConfig) -> Result<Arc<TreeStore>> {
        let page_store = PageStore::init(
            config.reserved_address_bytes,
            config.page_size,
            config.header_pages,
        )?;
        let page_size = page_store.page_size();

        let path_bytes = path_bytes(root_path);
        if path_bytes.len() > page_size - 1 {
            return Err(StoreError::NameTooLong {
                len: path_bytes.len(),
                limit: page_size - 1,
            });
        }

        let pool = EntryPool::new(page_store);
        let root_slot = pool.slots_per_page() - 1;

        // Single-threaded init: the store is not shared yet, plain writes
        // below are unobservable until the Arc is handed out.
        unsafe {
            let base = pool.store().base_ptr();
            let header = &mut *(base as *mut StoreHeader);
            header.magic = MAGIC;
            header.version = VERSION;
            header.page_size = page_size as u32;
            header.header_pages = config.header_pages;
            header.root_path_len = path_bytes.len() as u32;

            std::ptr::copy_nonoverlapping(
                path_bytes.as_ptr(),
                base.add(page_size),
                path_bytes.len(),
            );

            let root = &mut *(base.add(root_slot as usize * ENTRY_SIZE) as *mut Entry);
            root.set_parent(ROOT_PARENT);
            root.set_kind(Kind::Dir);
            root.set_locked();
            root.set_name(&root_name(root_path))?;
        }

        info!("store initialized at {:?}", root_path);

        Ok(Arc::new_cyclic(|self_ref| TreeStore {
            pool,
            root_path: root_path.to_path_buf(),
            root_slot,
            cursor_taken: AtomicBool::new(false),
            files_indexed: AtomicU64::new(0),
            self_ref: self_ref.clone(),
        }))
    }

    fn shared(&self) -> Arc<TreeStore> {
        // A `&self` can only exist while the owning Arc does.
        self.self_ref.upgrade().expect("store is always Arc-owned")
    }

    // Written once during init, immutable afterwards.
    fn header(&self) -> &StoreHeader {
        let header = unsafe { &*(self.pool.store().base_ptr() as *const StoreHeader) };
        debug_assert_eq!(header.magic, MAGIC);
        debug_assert_eq!(header.version, VERSION);
        debug_assert_eq!(header.page_size as usize, self.pool.store().page_size());
        debug_assert!(header.header_pages >= 2);
        header
    }

    pub fn root_path_bytes(&self) -> &[u8] {
        let len = self.header().root_path_len as usize;
        self.pool.store().bytes_at(1, len)
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    pub fn root_slot(&self) -> u32 {
        self.root_slot
    }

    pub fn root(&self) -> &Entry {
        self.pool.get(self.root_slot)
    }

    pub(crate) fn pool(&self) -> &EntryPool {
        &self.pool
    }

    pub(crate) fn count_indexed(&self) {
        self.files_indexed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            files_indexed: self.files_indexed.load(Ordering::Relaxed),
            pages_committed: self.pool.store().extent(),
        }
    }

    /// The single-shot writer cursor. `path` must equal the store's root
    /// path; subtree-scoped cursors are a future extension.
    pub fn new_cursor_at(&self, path: &Path) -> Result<Cursor> {
        if path != self.root_path {
            return Err(StoreError::NotSupported(
                "cursors can only be opened at the store root",
            ));
        }
        if self.cursor_taken.swap(true, Ordering::AcqRel) {
            return Err(StoreError::CursorActive);
        }
        Ok(Cursor::at_root(self.shared()))
    }

    pub fn read_view(&self) -> ReadView {
        ReadView::new(self.shared())
    }

    /// Panics if the published tree violates the parent back-link, slab
    /// alignment, or aggregate-sum invariants. Locked subtrees are
    /// skipped.
    pub fn check_integrity(&self) {
        let mut pending = vec![self.root_slot];
        let page_size = self.pool.store().page_size();

        while let Some(idx) = pending.pop() {
            let entry = match self.pool.published(idx) {
                Some(e) => e,
                None => continue,
            };
            let count = entry.children_count();
            if count == 0 {
                continue;
            }
            let start = entry.children_start();
            assert_eq!(
                start as usize * ENTRY_SIZE % page_size,
                0,
                "child slab of {:?} not page-aligned",
                entry.name()
            );

            let mut bytes = 0u64;
            let mut blocks = 0u64;
            let mut all_published = true;
            for i in 0..count {
                let child_idx = start + i;
                match self.pool.published(child_idx) {
                    Some(child) => {
                        assert_eq!(
                            child.parent(),
                            idx,
                            "parent back-link of {:?} is wrong",
                            child.name()
                        );
                        bytes += child.byte_count();
                        blocks += child.block_count();
                        if child.kind().is_dir() {
                            pending.push(child_idx);
                        }
                    }
                    None => all_published = false,
                }
            }
            if all_published {
                assert_eq!(
                    entry.byte_count(),
                    bytes,
                    "byte aggregate of {:?} does not match its children",
                    entry.name()
                );
                assert_eq!(
                    entry.block_count(),
                    blocks,
                    "block aggregate of {:?} does not match its children",
                    entry.name()
                );
            }
        }
    }
}

#[cfg(unix)]
fn path_bytes(path: &Path) -> &[u8] {
    use std::os::unix::ffi::OsStrExt;
    path.as_os_str().as_bytes()
}

// The final component, or the path itself for "/".
fn root_name(path: &Path) -> String {
    match path.file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => path.to_string_lossy().into_owned(),
    }
}
