//! The reader side used by the UI. Visibility is all-or-nothing: if any
//! child of a directory is still locked, the whole listing reports
//! `NotReady`, so a visible listing has final names and kinds. Directory
//! sizes may still be growing underneath it.

use std::sync::Arc;

use crate::tree::entry::Kind;
use crate::tree::store::{StoreStats, TreeStore};

/// Opaque handle to a published entry, obtainable only for the root or
/// out of a `Ready` listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryRef(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    Ready,
    NotReady,
    Empty,
}

/// One row of a directory listing; the name borrows from the store's
/// mapping.
#[derive(Debug, Clone)]
pub struct ChildRecord<'a> {
    pub name: &'a str,
    pub kind: Kind,
    pub byte_count: u64,
    pub block_count: u64,
    pub entry_ref: EntryRef,
}

#[derive(Clone)]
pub struct ReadView {
    store: Arc<TreeStore>,
}

impl ReadView {
    pub(crate) fn new(store: Arc<TreeStore>) -> ReadView {
        ReadView { store }
    }

    pub fn root(&self) -> EntryRef {
        EntryRef(self.store.root_slot())
    }

    pub fn entry(&self, entry_ref: EntryRef) -> Option<ChildRecord<'_>> {
        let e = self.store.pool().published(entry_ref.0)?;
        Some(ChildRecord {
            name: e.name(),
            kind: e.kind(),
            byte_count: e.byte_count(),
            block_count: e.block_count(),
            entry_ref,
        })
    }

    /// Fill `out` with the children of `entry_ref`, largest first, ties
    /// broken by name.
    pub fn children_of<'v>(
        &'v self,
        entry_ref: EntryRef,
        out: &mut Vec<ChildRecord<'v>>,
    ) -> ReadStatus {
        out.clear();
        let pool = self.store.pool();

        let entry = match pool.published(entry_ref.0) {
            Some(e) => e,
            None => return ReadStatus::NotReady,
        };
        let count = entry.children_count();
        if count == 0 {
            return ReadStatus::Empty;
        }

        let start = entry.children_start();
        for i in 0..count {
            match pool.published(start + i) {
                Some(child) => out.push(ChildRecord {
                    name: child.name(),
                    kind: child.kind(),
                    byte_count: child.byte_count(),
                    block_count: child.block_count(),
                    entry_ref: EntryRef(start + i),
                }),
                None => {
                    out.clear();
                    return ReadStatus::NotReady;
                }
            }
        }

        out.sort_by(|a, b| {
            b.byte_count
                .cmp(&a.byte_count)
                .then_with(|| a.name.cmp(b.name))
        });
        ReadStatus::Ready
    }

    pub fn stats(&self) -> StoreStats {
        self.store.stats()
    }
}
