//! The packed tree store: page-backed arena, entry records, the writer
//! cursor, and the concurrent read view.

pub mod cursor;
pub mod entry;
pub mod entry_pool;
pub mod page_store;
pub mod read_view;
pub mod store;

pub use cursor::Cursor;
pub use entry::{Entry, Kind, ENTRY_SIZE, MAX_NAME_LEN, ROOT_PARENT};
pub use read_view::{ChildRecord, EntryRef, ReadStatus, ReadView};
pub use store::{StoreConfig, StoreStats, TreeStore};
