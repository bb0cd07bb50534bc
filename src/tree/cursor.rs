//! The single-writer traversal cursor.
//!
//! Call order per directory: `children_begin(n)`, then per child
//! `child_init` + fill + `child_finish`, then `children_end`, then
//! `recurse_into`/`backtrack` per subdirectory. Non-directory children
//! fold into `cur` at `child_finish`; directory subtrees fold into their
//! parent at `backtrack`, so every byte counts once per ancestor. There
//! is no frame stack; `backtrack` pops through the parent links in the
//! tree. Mis-driving the call order is caught by debug assertions.

use std::sync::Arc;

use log::trace;

use crate::error::{Result, StoreError};
use crate::tree::entry::{Entry, MAX_NAME_LEN, ROOT_PARENT};
use crate::tree::store::TreeStore;

pub struct Cursor {
    store: Arc<TreeStore>,
    cur: u32,
    /// `ROOT_PARENT` when `cur` is the root.
    parent: u32,
    // The child slab bound to `cur`; unbound between `recurse_into` and
    // the next `children_begin`.
    children_start: u32,
    children_count: u32,
    children_next: u32,
    children_bound: bool,
    depth: u32,
}

impl Cursor {
    pub(crate) fn at_root(store: Arc<TreeStore>) -> Cursor {
        let root = store.root_slot();
        Cursor {
            store,
            cur: root,
            parent: ROOT_PARENT,
            children_start: 0,
            children_count: 0,
            children_next: 0,
            children_bound: false,
            depth: 0,
        }
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Allocate the child slab and bind it to the current directory. The
    /// slab location is written while `cur` is still unpublished.
    pub fn children_begin(&mut self, count: u32) -> Result<()> {
        debug_assert!(
            !self.children_bound,
            "children_begin called twice for the same directory"
        );

        if count > 0 {
            let pool = self.store.pool();
            let start = pool.alloc(count)?;
            // Safety: single writer; the slab entries and `cur` are all
            // unpublished, and no other references to them exist.
            unsafe {
                for i in 0..count {
                    pool.entry_mut(start + i).set_locked();
                }
                pool.entry_mut(self.cur).set_children(start, count);
            }
            self.children_start = start;
        } else {
            // Empty directory: `children_start` stays 0, nothing to
            // allocate.
            self.children_start = 0;
        }
        self.children_count = count;
        self.children_next = 0;
        self.children_bound = true;
        Ok(())
    }

    /// The next uninitialized child, parent link already set. Does not
    /// advance; `child_finish` does.
    pub fn child_init(&mut self) -> &mut Entry {
        debug_assert!(
            self.children_bound && self.children_next < self.children_count,
            "child_init outside children_begin..children_end"
        );
        let idx = self.children_start + self.children_next;
        // Safety: single writer, entry is locked and unreachable by
        // readers until `cur` publishes.
        let entry = unsafe { self.store.pool().entry_mut(idx) };
        entry.set_parent(self.cur);
        entry
    }

    /// Non-directory children aggregate and publish here; directory
    /// children stay locked until their own `children_end`.
    pub fn child_finish(&mut self) {
        debug_assert!(
            self.children_bound && self.children_next < self.children_count,
            "child_finish without a matching child_init"
        );
        let pool = self.store.pool();
        let child = pool.get(self.children_start + self.children_next);
        if !child.kind().is_dir() {
            pool.get(self.cur)
                .add_sizes(child.byte_count(), child.block_count());
            child.publish();
        }
        self.store.count_indexed();
        self.children_next += 1;
    }

    pub fn children_end(&mut self) {
        debug_assert!(
            self.children_bound && self.children_next == self.children_count,
            "children_end before the slab is fully initialized"
        );
        self.store.pool().get(self.cur).publish();
    }

    pub fn recurse_into(&mut self, name: &str) -> Result<()> {
        if name.len() > MAX_NAME_LEN {
            return Err(StoreError::NameTooLong {
                len: name.len(),
                limit: MAX_NAME_LEN,
            });
        }
        debug_assert!(
            self.children_bound && self.children_next == self.children_count,
            "recurse_into before children_end"
        );

        let pool = self.store.pool();
        let mut found = None;
        for i in 0..self.children_count {
            if pool.get(self.children_start + i).name() == name {
                found = Some(self.children_start + i);
                break;
            }
        }
        let dest = found.ok_or_else(|| StoreError::ChildNotFound {
            name: name.to_string(),
        })?;
        if !pool.get(dest).kind().is_dir() {
            return Err(StoreError::NotDirectory {
                name: name.to_string(),
            });
        }

        trace!("recurse into {:?} (slot {})", name, dest);
        self.parent = self.cur;
        self.cur = dest;
        if pool.get(dest).is_published() {
            // Re-entering a directory that was already populated: bind its
            // existing child list so the caller can descend further. The
            // tree is not touched, which makes backtrack-then-recurse into
            // the same directory a no-op.
            let entry = pool.get(dest);
            self.children_start = entry.children_start();
            self.children_count = entry.children_count();
            self.children_next = self.children_count;
            self.children_bound = true;
        } else {
            self.children_start = 0;
            self.children_count = 0;
            self.children_next = 0;
            self.children_bound = false;
        }
        self.depth += 1;
        Ok(())
    }

    /// Return to the parent (whose name must be `name`), folding the
    /// finished subtree's totals into it.
    pub fn backtrack(&mut self, name: &str) {
        debug_assert!(self.parent != ROOT_PARENT, "backtrack at the root");
        debug_assert!(
            self.children_bound && self.children_next == self.children_count,
            "backtrack before the current directory is fully enumerated"
        );

        let pool = self.store.pool();
        let parent = pool.get(self.parent);
        debug_assert_eq!(parent.name(), name, "backtrack to an unexpected parent");

        let cur = pool.get(self.cur);
        parent.add_sizes(cur.byte_count(), cur.block_count());
        cur.publish();

        trace!("backtrack to {:?} (slot {})", name, self.parent);
        self.cur = self.parent;
        self.parent = parent.parent();
        self.children_start = parent.children_start();
        self.children_count = parent.children_count();
        self.children_next = self.children_count;
        self.children_bound = true;
        self.depth -= 1;
    }
}
