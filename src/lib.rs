//! chonk-core: a packed in-memory tree store for a disk-usage viewer.
//!
//! A background writer walks a filesystem subtree depth-first and records
//! every directory, file, and link as a fixed 512-byte entry in a
//! page-backed arena, aggregating sizes from leaves to ancestors as it
//! goes. UI threads read concurrently through [`tree::ReadView`]: any
//! directory whose children are fully published can be listed and sorted
//! while the walk is still deep in other subtrees.
//!
//! ```no_run
//! use std::path::Path;
//!
//! use chonk_core::tree::{ReadStatus, StoreConfig, TreeStore};
//!
//! let store = TreeStore::init(Path::new("/home"), StoreConfig::default()).unwrap();
//! let (handle, join) = chonk_core::walk::scan(store.clone()).unwrap();
//!
//! let view = store.read_view();
//! let mut rows = Vec::new();
//! while view.children_of(view.root(), &mut rows) == ReadStatus::NotReady {
//!     std::thread::yield_now();
//! }
//! for row in &rows {
//!     println!("{:>12}  {}", row.byte_count, row.name);
//! }
//!
//! drop(handle);
//! join.join().unwrap().unwrap();
//! ```

pub mod error;
pub mod indexer;
pub mod scratch;
pub mod tree;
pub mod walk;

pub use error::{Result, StoreError};
pub use indexer::{ChildStat, IndexSummary, Indexer, VisitEvent};
pub use tree::{
    ChildRecord, Cursor, EntryRef, Kind, ReadStatus, ReadView, StoreConfig, StoreStats, TreeStore,
};
pub use walk::{WalkHandle, WalkSummary};
