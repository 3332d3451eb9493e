//! # hcstore core
//!
//! A deduplicating, Huffman-compressed content store.
//!
//! Files are compressed with a static per-file Huffman code and appended once to
//! a blob pool. Two text indexes describe the pool: a name catalog mapping logical
//! names to blob locations, and a hash ledger mapping content hashes to blob
//! locations and reference counts. Byte-identical inputs share one blob.
//!
//! ## Features
//!
//! - Deterministic Huffman codes (identical input, identical blob bytes)
//! - Append-only blob pool addressed by byte offset
//! - Content-hash deduplication with reference counting
//! - Atomic rewrite of the catalog and ledger on removal
//! - Consistency checking across catalog, ledger and pool
//!
//! ## Example
//!
//! ```no_run
//! use hcstore_core::Store;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Store::init("./my-store")?;
//!
//! let outcome = store.compress(b"aaaa bbb cc d", "notes.txt")?;
//! println!("stored at offset {}", outcome.record.offset);
//!
//! let restored = store.decompress("notes.txt")?;
//! assert_eq!(restored, b"aaaa bbb cc d");
//!
//! store.delete("notes.txt")?;
//! # Ok(())
//! # }
//! ```
//!
//! There is no locking: run at most one mutating operation against a store at a
//! time.

mod atomic;
pub mod bits;
pub mod blob;
mod catalog;
mod error;
mod hash;
pub mod huffman;
mod ledger;
mod pool;
mod store;
mod verify;

pub use blob::{Blob, BlobHeader};
pub use catalog::{CatalogRecord, NameCatalog, validate_name};
pub use error::{Error, Result};
pub use hash::{HASH_SIZE, Hash};
pub use ledger::{HashLedger, LedgerRecord, Release};
pub use pool::BlobPool;
pub use store::{
    BlobStat, CATALOG_FILE, CompressOutcome, DeleteOutcome, LEDGER_FILE, POOL_FILE, Store,
    StorePaths,
};
pub use verify::{Problem, StoreStats, VerifyReport};
