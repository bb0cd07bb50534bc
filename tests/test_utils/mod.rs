#![allow(dead_code)]

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use rand::prelude::*;

use chonk_core::tree::{StoreConfig, TreeStore};

/// Set up log configuration. Safe to call from every test.
pub fn setup() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A store with a test-sized reservation over the given root.
pub fn new_store(root: &Path) -> Arc<TreeStore> {
    new_store_with_reserve(root, 256 << 20)
}

pub fn new_store_with_reserve(root: &Path, reserved_address_bytes: usize) -> Arc<TreeStore> {
    TreeStore::init(
        root,
        StoreConfig {
            reserved_address_bytes,
            ..Default::default()
        },
    )
    .unwrap()
}

pub fn write_file(path: &Path, len: usize) {
    let mut f = File::create(path).unwrap();
    f.write_all(&vec![0u8; len]).unwrap();
}

/// Populate `root` with a random directory tree and return the total byte
/// count of all files created.
///
/// Fan-out shrinks with depth so the tree stays test-sized but still has
/// empty directories, nested directories, and files of varying sizes.
pub fn build_random_tree(root: &Path, rng: &mut StdRng, depth: usize) -> u64 {
    let mut total = 0u64;

    let file_count = rng.gen_range(0..5);
    for i in 0..file_count {
        let len = rng.gen_range(0..8192);
        write_file(&root.join(format!("f{}_{}", depth, i)), len);
        total += len as u64;
    }

    if depth > 0 {
        let dir_count = rng.gen_range(0..4);
        for i in 0..dir_count {
            let dir = root.join(format!("d{}_{}", depth, i));
            fs::create_dir(&dir).unwrap();
            total += build_random_tree(&dir, rng, depth - 1);
        }
    }

    total
}
