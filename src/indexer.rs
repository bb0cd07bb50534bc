//! Translates preorder/postorder visit events into cursor calls. The
//! first `EnterDir` is the root, every later one is a `recurse_into`;
//! `LeaveDir` is a `backtrack`, except at the root, where it completes
//! the walk and fires the one-shot completion event.

use crossbeam::channel::{bounded, Receiver, Sender};
use log::{debug, info};

use crate::error::Result;
use crate::tree::cursor::Cursor;
use crate::tree::entry::Kind;

#[derive(Debug, Clone)]
pub enum VisitEvent {
    EnterDir { name: String },
    Children(Vec<ChildStat>),
    LeaveDir,
}

/// Stat results for one directory child, as recorded into the tree.
#[derive(Debug, Clone)]
pub struct ChildStat {
    pub name: String,
    pub kind: Kind,
    pub byte_count: u64,
    pub block_count: u64,
    pub mtime: u64,
    pub inode: u32,
}

impl ChildStat {
    /// The stand-in for a child whose metadata could not be read.
    pub fn unknown(name: String) -> ChildStat {
        ChildStat {
            name,
            kind: Kind::Unknown,
            byte_count: 0,
            block_count: 0,
            mtime: 0,
            inode: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexSummary {
    /// Children recorded into the tree, of any kind.
    pub entries_indexed: u64,
    /// Directories entered, including the root.
    pub dirs_indexed: u64,
}

pub struct Indexer {
    cursor: Cursor,
    // Names of the directories the walk is currently inside, root first.
    dirs: Vec<String>,
    root_seen: bool,
    finished: bool,
    summary: IndexSummary,
    done_tx: Sender<IndexSummary>,
    done_rx: Receiver<IndexSummary>,
}

impl Indexer {
    pub fn new(cursor: Cursor) -> Indexer {
        let (done_tx, done_rx) = bounded(1);
        Indexer {
            cursor,
            dirs: Vec::new(),
            root_seen: false,
            finished: false,
            summary: IndexSummary::default(),
            done_tx,
            done_rx,
        }
    }

    /// Receiver for the one-shot "indexing finished" event.
    pub fn subscribe(&self) -> Receiver<IndexSummary> {
        self.done_rx.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn summary(&self) -> IndexSummary {
        self.summary
    }

    pub fn apply(&mut self, event: VisitEvent) -> Result<()> {
        debug_assert!(!self.finished, "event after the walk completed");
        match event {
            VisitEvent::EnterDir { name } => {
                if self.root_seen {
                    self.cursor.recurse_into(&name)?;
                } else {
                    self.root_seen = true;
                }
                self.summary.dirs_indexed += 1;
                self.dirs.push(name);
            }
            VisitEvent::Children(children) => {
                self.cursor.children_begin(children.len() as u32)?;
                for child in &children {
                    let entry = self.cursor.child_init();
                    entry.set_kind(child.kind);
                    entry.set_name(&child.name)?;
                    // Directory aggregates are computed by the cursor;
                    // whatever the walker stat'ed for the directory inode
                    // itself is not part of the tree's arithmetic.
                    if child.kind.is_dir() {
                        entry.set_sizes(0, 0);
                    } else {
                        entry.set_sizes(child.byte_count, child.block_count);
                    }
                    entry.set_mtime(child.mtime);
                    entry.set_inode(child.inode);
                    self.cursor.child_finish();
                }
                self.cursor.children_end();
                self.summary.entries_indexed += children.len() as u64;
            }
            VisitEvent::LeaveDir => {
                let left = self.dirs.pop();
                debug_assert!(left.is_some(), "LeaveDir without a matching EnterDir");
                match self.dirs.last() {
                    Some(parent) => self.cursor.backtrack(parent),
                    None => self.complete(),
                }
            }
        }
        Ok(())
    }

    /// Stops at the first cursor error; the published tree stays intact.
    pub fn run(&mut self, events: impl IntoIterator<Item = VisitEvent>) -> Result<()> {
        for event in events {
            self.apply(event)?;
        }
        Ok(())
    }

    fn complete(&mut self) {
        self.finished = true;
        info!(
            "indexing finished: {} entries in {} directories",
            self.summary.entries_indexed, self.summary.dirs_indexed
        );
        if self.done_tx.try_send(self.summary).is_err() {
            debug!("no observer for the completion event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::read_view::ReadStatus;
    use crate::tree::store::{StoreConfig, TreeStore};
    use std::path::Path;
    use std::sync::Arc;

    fn new_indexer() -> (Arc<TreeStore>, Indexer) {
        let store = TreeStore::init(
            Path::new("/scan"),
            StoreConfig {
                reserved_address_bytes: 64 << 20,
                ..Default::default()
            },
        )
        .unwrap();
        let cursor = store.new_cursor_at(Path::new("/scan")).unwrap();
        (store, Indexer::new(cursor))
    }

    fn file(name: &str, bytes: u64) -> ChildStat {
        ChildStat {
            name: name.to_string(),
            kind: Kind::File,
            byte_count: bytes,
            block_count: bytes.div_ceil(512),
            mtime: 1_700_000_000,
            inode: 0,
        }
    }

    fn dir(name: &str) -> ChildStat {
        ChildStat {
            name: name.to_string(),
            kind: Kind::Dir,
            byte_count: 0,
            block_count: 0,
            mtime: 1_700_000_000,
            inode: 0,
        }
    }

    fn enter(name: &str) -> VisitEvent {
        VisitEvent::EnterDir {
            name: name.to_string(),
        }
    }

    #[test]
    fn flat_tree() {
        let (store, mut indexer) = new_indexer();
        indexer
            .run([
                enter("scan"),
                VisitEvent::Children(vec![file("a", 100), file("b", 200), file("c", 300)]),
                VisitEvent::LeaveDir,
            ])
            .unwrap();

        assert!(indexer.is_finished());
        assert_eq!(store.root().byte_count(), 600);
        store.check_integrity();

        let view = store.read_view();
        let mut out = Vec::new();
        assert_eq!(view.children_of(view.root(), &mut out), ReadStatus::Ready);
        let sizes: Vec<u64> = out.iter().map(|c| c.byte_count).collect();
        assert_eq!(sizes, vec![300, 200, 100]);
    }

    #[test]
    fn nested_tree() {
        let (store, mut indexer) = new_indexer();
        indexer
            .run([
                enter("scan"),
                VisitEvent::Children(vec![dir("a"), dir("b")]),
                enter("a"),
                VisitEvent::Children(vec![file("x", 10), file("y", 20)]),
                VisitEvent::LeaveDir,
                enter("b"),
                VisitEvent::Children(vec![file("z", 70)]),
                VisitEvent::LeaveDir,
                VisitEvent::LeaveDir,
            ])
            .unwrap();

        assert_eq!(store.root().byte_count(), 100);
        store.check_integrity();

        let view = store.read_view();
        let mut out = Vec::new();
        assert_eq!(view.children_of(view.root(), &mut out), ReadStatus::Ready);
        assert_eq!(out[0].name, "b");
        assert_eq!(out[0].byte_count, 70);
        assert_eq!(out[1].name, "a");
        assert_eq!(out[1].byte_count, 30);

        let summary = indexer.summary();
        assert_eq!(summary.dirs_indexed, 3);
        assert_eq!(summary.entries_indexed, 5);
    }

    #[test]
    fn unreadable_child_is_recorded_as_unknown() {
        let (store, mut indexer) = new_indexer();
        indexer
            .run([
                enter("scan"),
                VisitEvent::Children(vec![
                    file("ok", 40),
                    ChildStat::unknown("denied".to_string()),
                    ChildStat {
                        kind: Kind::LinkSoft,
                        ..ChildStat::unknown("dangling".to_string())
                    },
                ]),
                VisitEvent::LeaveDir,
            ])
            .unwrap();

        assert_eq!(store.root().byte_count(), 40);

        let view = store.read_view();
        let mut out = Vec::new();
        view.children_of(view.root(), &mut out);
        let denied = out.iter().find(|c| c.name == "denied").unwrap();
        assert_eq!(denied.kind, Kind::Unknown);
        assert_eq!(denied.byte_count, 0);
        let dangling = out.iter().find(|c| c.name == "dangling").unwrap();
        assert_eq!(dangling.kind, Kind::LinkSoft);
        assert_eq!(dangling.byte_count, 0);
    }

    #[test]
    fn completion_event_fires_once_at_root_leave() {
        let (_store, mut indexer) = new_indexer();
        let done = indexer.subscribe();

        indexer.apply(enter("scan")).unwrap();
        indexer
            .apply(VisitEvent::Children(vec![dir("sub")]))
            .unwrap();
        indexer.apply(enter("sub")).unwrap();
        indexer.apply(VisitEvent::Children(vec![])).unwrap();
        assert!(done.is_empty());

        indexer.apply(VisitEvent::LeaveDir).unwrap();
        assert!(done.is_empty());
        assert!(!indexer.is_finished());

        indexer.apply(VisitEvent::LeaveDir).unwrap();
        assert!(indexer.is_finished());
        let summary = done.recv().unwrap();
        assert_eq!(summary.dirs_indexed, 2);
        assert_eq!(summary.entries_indexed, 1);
    }

    #[test]
    fn over_long_child_name_aborts_the_walk() {
        let (store, mut indexer) = new_indexer();
        indexer.apply(enter("scan")).unwrap();

        let events = VisitEvent::Children(vec![file("ok", 1), file(&"x".repeat(300), 2)]);
        match indexer.apply(events) {
            Err(crate::error::StoreError::NameTooLong { len, .. }) => assert_eq!(len, 300),
            other => panic!("expected NameTooLong, got {:?}", other),
        }
        assert!(!indexer.is_finished());
        // The aborted walk leaves the root unpublished but intact.
        assert!(!store.root().is_published());
    }

    #[test]
    fn directory_sizes_from_the_walker_are_ignored() {
        let (store, mut indexer) = new_indexer();
        indexer
            .run([
                enter("scan"),
                VisitEvent::Children(vec![ChildStat {
                    // Walkers on some filesystems report a nonzero length
                    // for the directory inode; the tree must not count it.
                    byte_count: 4096,
                    block_count: 8,
                    ..dir("d")
                }]),
                enter("d"),
                VisitEvent::Children(vec![file("f", 5)]),
                VisitEvent::LeaveDir,
                VisitEvent::LeaveDir,
            ])
            .unwrap();

        assert_eq!(store.root().byte_count(), 5);
        store.check_integrity();
    }
}
