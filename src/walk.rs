//! Filesystem walker: turns a real directory tree into visit events.
//! Symlinks are never followed; unreadable children become
//! `Kind::Unknown` records with zero sizes and the walk continues.
//! Cancellation is polled between directory events, and the open
//! directory chain unwinds normally so every visited directory publishes.

use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crossbeam::channel::Receiver;
use log::{debug, info, warn};

use crate::error::{Result, StoreError};
use crate::indexer::{ChildStat, IndexSummary, Indexer, VisitEvent};
use crate::scratch::PathScratch;
use crate::tree::entry::{Kind, MAX_NAME_LEN};
use crate::tree::store::TreeStore;

pub struct WalkHandle {
    cancelled: Arc<AtomicBool>,
    done: Receiver<IndexSummary>,
}

impl WalkHandle {
    /// Everything already published stays readable after a cancel.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// The one-shot completion event.
    pub fn finished(&self) -> &Receiver<IndexSummary> {
        &self.done
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkSummary {
    pub entries_indexed: u64,
    pub dirs_indexed: u64,
    pub duration_ms: u64,
    pub was_cancelled: bool,
}

/// Walk the store's root path on the calling thread.
pub fn run(store: &Arc<TreeStore>, cancelled: &AtomicBool) -> Result<WalkSummary> {
    let cursor = store.new_cursor_at(store.root_path())?;
    let indexer = Indexer::new(cursor);
    run_with(store, indexer, cancelled)
}

/// Walk the store's root path on a background thread.
pub fn scan(
    store: Arc<TreeStore>,
) -> Result<(WalkHandle, thread::JoinHandle<Result<WalkSummary>>)> {
    let cursor = store.new_cursor_at(store.root_path())?;
    let indexer = Indexer::new(cursor);

    let cancelled = Arc::new(AtomicBool::new(false));
    let handle = WalkHandle {
        cancelled: Arc::clone(&cancelled),
        done: indexer.subscribe(),
    };

    let join = thread::Builder::new()
        .name("chonk-indexer".into())
        .spawn(move || run_with(&store, indexer, &cancelled))
        .map_err(|source| StoreError::ThreadSpawn { source })?;

    Ok((handle, join))
}

fn run_with(
    store: &Arc<TreeStore>,
    mut indexer: Indexer,
    cancelled: &AtomicBool,
) -> Result<WalkSummary> {
    let start = Instant::now();
    let root_path = store.root_path().to_path_buf();
    let root_name = store.root().name().to_string();
    info!("walk starting at {:?}", root_path);

    let mut scratch = PathScratch::new(&root_path);
    if !cancelled.load(Ordering::Relaxed) {
        walk_dir(&mut indexer, &mut scratch, root_name, cancelled)?;
    }

    let was_cancelled = cancelled.load(Ordering::Relaxed);
    let IndexSummary {
        entries_indexed,
        dirs_indexed,
    } = indexer.summary();
    let summary = WalkSummary {
        entries_indexed,
        dirs_indexed,
        duration_ms: start.elapsed().as_millis() as u64,
        was_cancelled,
    };
    info!(
        "walk {} after {} ms: {} entries in {} directories",
        if was_cancelled { "cancelled" } else { "done" },
        summary.duration_ms,
        summary.entries_indexed,
        summary.dirs_indexed
    );
    Ok(summary)
}

// `name` is the stored (clamped, lossy) form; the scratch path already
// points at the directory itself.
fn walk_dir(
    indexer: &mut Indexer,
    scratch: &mut PathScratch,
    name: String,
    cancelled: &AtomicBool,
) -> Result<()> {
    indexer.apply(VisitEvent::EnterDir { name })?;

    let (children, subdirs) = enumerate(scratch.path());
    indexer.apply(VisitEvent::Children(children))?;

    for (real_name, stored_name) in subdirs {
        if cancelled.load(Ordering::Relaxed) {
            break;
        }
        scratch.descend(&real_name, |scratch| {
            walk_dir(indexer, scratch, stored_name, cancelled)
        })?;
    }

    indexer.apply(VisitEvent::LeaveDir)
}

// Returns the child records in filesystem order plus the subdirectories
// to recurse into, keyed by their real on-disk name.
fn enumerate(dir: &Path) -> (Vec<ChildStat>, Vec<(OsString, String)>) {
    let read_dir = match fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(err) => {
            // The directory was already recorded by its parent; it simply
            // publishes with no children.
            debug!("read_dir failed for {:?}: {}", dir, err);
            return (Vec::new(), Vec::new());
        }
    };

    let mut children = Vec::new();
    let mut subdirs = Vec::new();
    let mut seen_dir_names = HashSet::new();

    for dent in read_dir {
        let dent = match dent {
            Ok(dent) => dent,
            Err(err) => {
                debug!("readdir entry error in {:?}: {}", dir, err);
                continue;
            }
        };
        let name = clamp_name(dent.file_name().to_string_lossy().into_owned());
        let child = stat_child(&dent, name);

        if child.kind.is_dir() {
            // Lossy renderings of distinct byte names can collide; only
            // the first of a colliding pair is descended into, since name
            // lookup in the tree would resolve to it anyway.
            if seen_dir_names.insert(child.name.clone()) {
                subdirs.push((dent.file_name(), child.name.clone()));
            } else {
                warn!("duplicate stored name {:?} in {:?}, not descending", child.name, dir);
            }
        }
        children.push(child);
    }

    (children, subdirs)
}

fn stat_child(dent: &fs::DirEntry, name: String) -> ChildStat {
    // DirEntry::metadata has lstat semantics: the link itself, never the
    // target.
    let meta = match dent.metadata() {
        Ok(meta) => meta,
        Err(err) => {
            debug!("stat failed for {:?}: {}", dent.path(), err);
            // Keep whatever classification the dirent itself offers so a
            // stat-racing unlink still shows up with a sensible kind.
            let kind = match dent.file_type() {
                Ok(ft) if ft.is_symlink() => Kind::LinkSoft,
                _ => Kind::Unknown,
            };
            return ChildStat {
                kind,
                ..ChildStat::unknown(name)
            };
        }
    };

    let ft = meta.file_type();
    let kind = if ft.is_dir() {
        Kind::Dir
    } else if ft.is_symlink() {
        Kind::LinkSoft
    } else if ft.is_file() {
        if meta.nlink() > 1 {
            Kind::LinkHard
        } else {
            Kind::File
        }
    } else {
        // Sockets, fifos, device nodes.
        Kind::Unknown
    };

    let (byte_count, block_count) = if kind.is_dir() {
        (0, 0)
    } else {
        (meta.len(), meta.blocks())
    };

    ChildStat {
        name,
        kind,
        byte_count,
        block_count,
        mtime: meta.mtime().max(0) as u64,
        inode: meta.ino() as u32,
    }
}

// A lossy rendering of a non-UTF-8 basename can be up to three times
// longer than its byte form; clamp at a char boundary.
fn clamp_name(mut name: String) -> String {
    if name.len() > MAX_NAME_LEN {
        let mut end = MAX_NAME_LEN;
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        name.truncate(end);
    }
    name
}
