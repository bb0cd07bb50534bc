use std::io;

use thiserror::Error;

/// Errors surfaced by the store and the cursor protocol.
///
/// Capacity errors abandon the current walk but leave every published
/// subtree readable. `NotDirectory` and `ChildNotFound` indicate a
/// mis-driven cursor; protocol-order violations beyond these are debug
/// assertions, not error values.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("address space reservation failed: {source}")]
    AddressSpaceReservationFailed { source: io::Error },

    #[error("reservation exhausted: need {requested_pages} pages, reserved {reserved_pages}")]
    OutOfCapacity {
        requested_pages: u64,
        reserved_pages: u32,
    },

    #[error("name is {len} bytes, limit is {limit}")]
    NameTooLong { len: usize, limit: usize },

    #[error("entry \"{name}\" is not a directory")]
    NotDirectory { name: String },

    #[error("no child named \"{name}\" in the current directory")]
    ChildNotFound { name: String },

    #[error("a cursor has already been taken for this store")]
    CursorActive,

    #[error("indexer thread failed to start: {source}")]
    ThreadSpawn { source: io::Error },

    #[error("not supported: {0}")]
    NotSupported(&'static str),
}

pub type Result<T> = std::result::Result<T, StoreError>;
