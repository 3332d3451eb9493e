//! Store handle and the compress / decompress / delete operations.

use crate::blob::{Blob, BlobHeader, HEADER_SIZE};
use crate::catalog::{CatalogRecord, NameCatalog, validate_name};
use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::ledger::{HashLedger, Release};
use crate::pool::BlobPool;
use log::{info, warn};
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Default catalog file name inside a store directory.
pub const CATALOG_FILE: &str = "catalog.txt";

/// Default pool file name inside a store directory.
pub const POOL_FILE: &str = "pool.bin";

/// Default ledger file name inside a store directory.
pub const LEDGER_FILE: &str = "hash_index.txt";

/// Locations of the three store files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    /// Name catalog (text).
    pub catalog: PathBuf,
    /// Blob pool (binary).
    pub pool: PathBuf,
    /// Hash ledger (text).
    pub ledger: PathBuf,
}

impl StorePaths {
    /// Default layout under `root`.
    pub fn in_dir<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref();
        Self {
            catalog: root.join(CATALOG_FILE),
            pool: root.join(POOL_FILE),
            ledger: root.join(LEDGER_FILE),
        }
    }
}

/// Outcome of a compress operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompressOutcome {
    /// The catalog record that was appended.
    pub record: CatalogRecord,
    /// Input length in bytes.
    pub original_size: u64,
    /// Ledger refcount for the content hash after the operation.
    pub refcount: u64,
}

/// Outcome of a delete operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// The catalog record that was removed.
    pub record: CatalogRecord,
    /// What happened to the ledger entry.
    pub release: Release,
}

/// Header-level facts about one stored name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlobStat {
    /// The catalog record.
    pub record: CatalogRecord,
    /// Uncompressed length in bytes.
    pub original_size: u64,
    /// Number of codebook entries.
    pub code_count: u64,
    /// Meaningful payload bits.
    pub payload_bits: u64,
    /// Blob length divided by original length (0 for empty input).
    pub ratio: f64,
}

/// A deduplicating Huffman-compressed store.
#[derive(Debug, Clone)]
pub struct Store {
    paths: StorePaths,
    catalog: NameCatalog,
    pool: BlobPool,
    ledger: HashLedger,
}

impl Store {
    /// Initialize a store in `root`, creating the directory and empty files.
    ///
    /// Existing files are left as they are.
    pub fn init<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        fs::create_dir_all(root)?;
        Self::create(StorePaths::in_dir(root))
    }

    /// Create empty files (and parent directories) at explicit locations.
    ///
    /// Existing files are left as they are.
    pub fn create(paths: StorePaths) -> Result<Self> {
        for path in [&paths.catalog, &paths.pool, &paths.ledger] {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent)?;
            }
            OpenOptions::new().create(true).append(true).open(path)?;
        }

        info!(
            "initialized store: catalog {}, pool {}, ledger {}",
            paths.catalog.display(),
            paths.pool.display(),
            paths.ledger.display()
        );
        Ok(Self::with_paths(paths))
    }

    /// Open the store in `root`. Missing files read as empty.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(Error::invalid_store(root, "directory does not exist"));
        }
        Ok(Self::with_paths(StorePaths::in_dir(root)))
    }

    /// Use explicit file locations.
    pub fn with_paths(paths: StorePaths) -> Self {
        Self {
            catalog: NameCatalog::new(&paths.catalog),
            pool: BlobPool::new(&paths.pool),
            ledger: HashLedger::new(&paths.ledger),
            paths,
        }
    }

    /// File locations of this store.
    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    /// The name catalog.
    pub fn catalog(&self) -> &NameCatalog {
        &self.catalog
    }

    /// The blob pool.
    pub fn pool(&self) -> &BlobPool {
        &self.pool
    }

    /// The hash ledger.
    pub fn ledger(&self) -> &HashLedger {
        &self.ledger
    }

    /// Compress the file at `input` under `name` (defaults to the path as given).
    pub fn compress_file(&self, input: &Path, name: Option<&str>) -> Result<CompressOutcome> {
        let data = fs::read(input)?;
        let name = match name {
            Some(name) => name.to_string(),
            None => input.to_string_lossy().into_owned(),
        };
        self.compress(&data, &name)
    }

    /// Store `data` under `name`.
    ///
    /// Content already in the ledger is not written again: the new catalog
    /// record points at the existing blob and the refcount goes up by one.
    pub fn compress(&self, data: &[u8], name: &str) -> Result<CompressOutcome> {
        validate_name(name)?;
        let hash = Hash::hash_bytes(data);

        if let Some(existing) = self.ledger.lookup(&hash)? {
            let updated = self.ledger.increment(&hash)?;
            let record = CatalogRecord {
                name: name.to_string(),
                compressed_size: existing.length,
                offset: existing.offset,
                hash,
                duplicate: true,
            };
            self.catalog.append(&record)?;

            info!(
                "{}: duplicate of blob at offset {}, refcount {}",
                name, existing.offset, updated.refcount
            );
            return Ok(CompressOutcome {
                record,
                original_size: data.len() as u64,
                refcount: updated.refcount,
            });
        }

        let bytes = Blob::compress(data)?.to_bytes();
        let offset = self.pool.append(&bytes)?;
        let entry = self.ledger.record_new(&hash, offset, bytes.len() as u64)?;
        let record = CatalogRecord {
            name: name.to_string(),
            compressed_size: entry.length,
            offset,
            hash,
            duplicate: false,
        };
        self.catalog.append(&record)?;

        info!(
            "{}: {} -> {} bytes at offset {}",
            name,
            data.len(),
            entry.length,
            offset
        );
        Ok(CompressOutcome {
            record,
            original_size: data.len() as u64,
            refcount: entry.refcount,
        })
    }

    /// Restore the bytes stored under `name`.
    pub fn decompress(&self, name: &str) -> Result<Vec<u8>> {
        let record = self.catalog.find_exact(name)?;
        let bytes = self.pool.read_at(record.offset, record.compressed_size)?;
        let data = Blob::from_bytes(&bytes)?.decompress()?;

        if Hash::hash_bytes(&data) != record.hash {
            return Err(Error::format(format!(
                "Blob at offset {} does not restore content {}",
                record.offset, record.hash
            )));
        }
        Ok(data)
    }

    /// Restore `name` into `writer`, returning the number of bytes written.
    pub fn decompress_to<W: Write>(&self, name: &str, mut writer: W) -> Result<u64> {
        let data = self.decompress(name)?;
        writer.write_all(&data)?;
        writer.flush()?;
        Ok(data.len() as u64)
    }

    /// Remove `name` from the catalog and release its ledger reference.
    ///
    /// The two updates are not atomic together. A hash missing from the ledger
    /// is logged and reported in the outcome; the catalog removal still stands.
    pub fn delete(&self, name: &str) -> Result<DeleteOutcome> {
        let record = self.catalog.remove_exact(name)?;
        let release = self.ledger.decrement_or_free(&record.hash)?;

        if release == Release::Missing {
            warn!(
                "{} referenced {} which has no ledger entry",
                record.name, record.hash
            );
        }
        Ok(DeleteOutcome { record, release })
    }

    /// Every catalog record in append order.
    pub fn list(&self) -> Result<Vec<CatalogRecord>> {
        self.catalog.load()
    }

    /// Read only the blob header for `name`.
    pub fn stat(&self, name: &str) -> Result<BlobStat> {
        let record = self.catalog.find_exact(name)?;
        let bytes = self.pool.read_at(record.offset, HEADER_SIZE as u64)?;
        let header = BlobHeader::decode(&bytes)?;

        Ok(BlobStat {
            original_size: header.original_size,
            code_count: header.code_count,
            payload_bits: header.payload_bits,
            ratio: header.ratio(record.compressed_size),
            record,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use tempfile::TempDir;

    fn new_store() -> (TempDir, Store) {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::init(temp_dir.path().join("store")).unwrap();
        (temp_dir, store)
    }

    #[test]
    fn test_init_creates_files() {
        let (temp_dir, store) = new_store();
        let root = temp_dir.path().join("store");
        assert!(root.join(CATALOG_FILE).exists());
        assert!(root.join(POOL_FILE).exists());
        assert!(root.join(LEDGER_FILE).exists());
        assert_eq!(store.paths(), &StorePaths::in_dir(&root));
    }

    #[test]
    fn test_create_with_nested_paths() {
        let temp_dir = TempDir::new().unwrap();
        let paths = StorePaths {
            catalog: temp_dir.path().join("meta/catalog.txt"),
            pool: temp_dir.path().join("blobs/deep/pool.bin"),
            ledger: temp_dir.path().join("meta/ledger.txt"),
        };
        let store = Store::create(paths.clone()).unwrap();
        assert!(paths.pool.exists());
        assert!(paths.catalog.exists());
        assert_eq!(store.compress(b"x", "x").unwrap().record.offset, 0);
    }

    #[test]
    fn test_open_nonexistent() {
        let temp_dir = TempDir::new().unwrap();
        assert!(matches!(
            Store::open(temp_dir.path().join("missing")),
            Err(Error::InvalidStore { .. })
        ));
    }

    #[test]
    fn test_open_without_files() {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::open(temp_dir.path()).unwrap();
        assert!(store.list().unwrap().is_empty());

        let outcome = store.compress(b"fresh", "fresh.txt").unwrap();
        assert_eq!(outcome.record.offset, 0);
    }

    #[test]
    fn test_compress_decompress() {
        let (_temp_dir, store) = new_store();
        let outcome = store.compress(b"aaaa bbb cc d", "sample.txt").unwrap();
        assert!(!outcome.record.duplicate);
        assert_eq!(outcome.record.offset, 0);
        assert_eq!(outcome.record.compressed_size, 52);
        assert_eq!(outcome.original_size, 13);
        assert_eq!(outcome.refcount, 1);

        assert_eq!(store.decompress("sample.txt").unwrap(), b"aaaa bbb cc d");
    }

    #[test]
    fn test_duplicate_reuses_blob() {
        let (_temp_dir, store) = new_store();
        let first = store.compress(b"same bytes", "one").unwrap();
        let pool_len = store.pool().len().unwrap();

        let second = store.compress(b"same bytes", "two").unwrap();
        assert!(second.record.duplicate);
        assert_eq!(second.record.offset, first.record.offset);
        assert_eq!(second.record.compressed_size, first.record.compressed_size);
        assert_eq!(second.refcount, 2);
        assert_eq!(store.pool().len().unwrap(), pool_len);

        assert_eq!(store.decompress("two").unwrap(), b"same bytes");
    }

    #[test]
    fn test_compress_rejects_bad_name_before_writing() {
        let (_temp_dir, store) = new_store();
        assert!(store.compress(b"data", "a|b").is_err());
        assert_eq!(store.pool().len().unwrap(), 0);
        assert!(store.ledger().load().unwrap().is_empty());
    }

    #[test]
    fn test_compress_file_defaults_name_to_path() {
        let (temp_dir, store) = new_store();
        let input = temp_dir.path().join("input.txt");
        fs::write(&input, b"file contents").unwrap();

        let outcome = store.compress_file(&input, None).unwrap();
        assert_eq!(outcome.record.name, input.to_string_lossy());

        let named = store.compress_file(&input, Some("alias")).unwrap();
        assert!(named.record.duplicate);
        assert_eq!(store.decompress("alias").unwrap(), b"file contents");
    }

    #[test]
    fn test_compress_missing_input() {
        let (temp_dir, store) = new_store();
        let err = store
            .compress_file(&temp_dir.path().join("nope"), None)
            .unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn test_decompress_to_writer() {
        let (_temp_dir, store) = new_store();
        store.compress(b"stream me", "s").unwrap();
        let mut out = Vec::new();
        assert_eq!(store.decompress_to("s", &mut out).unwrap(), 9);
        assert_eq!(out, b"stream me");
    }

    #[test]
    fn test_decompress_unknown_name() {
        let (_temp_dir, store) = new_store();
        assert!(store.decompress("ghost").unwrap_err().is_not_found());
    }

    #[test]
    fn test_decompress_bad_magic() {
        let (_temp_dir, store) = new_store();
        store.compress(b"victim", "v").unwrap();
        let mut pool = fs::read(&store.paths().pool).unwrap();
        pool[0] = b'X';
        fs::write(&store.paths().pool, pool).unwrap();

        assert!(matches!(store.decompress("v"), Err(Error::Format { .. })));
    }

    #[test]
    fn test_decompress_truncated_pool() {
        let (_temp_dir, store) = new_store();
        store.compress(b"some longer content here", "v").unwrap();
        let pool = fs::read(&store.paths().pool).unwrap();
        fs::write(&store.paths().pool, &pool[..pool.len() - 3]).unwrap();

        assert!(matches!(store.decompress("v"), Err(Error::Truncated { .. })));
    }

    #[test]
    fn test_decompress_detects_corrupted_payload() {
        let (_temp_dir, store) = new_store();
        store.compress(b"abababababab", "v").unwrap();
        let mut pool = fs::read(&store.paths().pool).unwrap();
        let last = pool.len() - 1;
        // a = 0, b = 1: flipping payload bits swaps symbols without breaking the code.
        pool[last] ^= 0b1100_0000;
        fs::write(&store.paths().pool, pool).unwrap();

        assert!(matches!(store.decompress("v"), Err(Error::Format { .. })));
    }

    #[test]
    fn test_delete_decrements_then_frees() {
        let (_temp_dir, store) = new_store();
        store.compress(b"shared", "a").unwrap();
        store.compress(b"shared", "b").unwrap();
        let hash = Hash::hash_bytes(b"shared");

        let outcome = store.delete("a").unwrap();
        assert_eq!(outcome.record.name, "a");
        assert!(matches!(outcome.release, Release::Decremented(ref r) if r.refcount == 1));
        assert_eq!(store.decompress("b").unwrap(), b"shared");

        let outcome = store.delete("b").unwrap();
        assert!(matches!(outcome.release, Release::Freed(_)));
        assert_eq!(store.ledger().lookup(&hash).unwrap(), None);
        assert!(store.pool().len().unwrap() > 0);
    }

    #[test]
    fn test_delete_then_lookup() {
        let (_temp_dir, store) = new_store();
        store.compress(b"short lived", "tmp").unwrap();
        store.delete("tmp").unwrap();
        assert!(store.decompress("tmp").unwrap_err().is_not_found());
        assert!(store.delete("tmp").unwrap_err().is_not_found());
    }

    #[test]
    fn test_delete_with_missing_ledger_entry() {
        let (_temp_dir, store) = new_store();
        store.compress(b"orphan", "o").unwrap();
        fs::write(&store.paths().ledger, "").unwrap();

        let outcome = store.delete("o").unwrap();
        assert_eq!(outcome.release, Release::Missing);
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_recompress_after_free_writes_new_blob() {
        let (_temp_dir, store) = new_store();
        let first = store.compress(b"again", "x").unwrap();
        store.delete("x").unwrap();

        let second = store.compress(b"again", "x").unwrap();
        assert!(!second.record.duplicate);
        assert!(second.record.offset > first.record.offset);
        assert_eq!(store.decompress("x").unwrap(), b"again");
    }

    #[test]
    fn test_stat() {
        let (_temp_dir, store) = new_store();
        store.compress(b"aaaa bbb cc d", "sample").unwrap();
        let stat = store.stat("sample").unwrap();
        assert_eq!(stat.original_size, 13);
        assert_eq!(stat.code_count, 5);
        assert_eq!(stat.payload_bits, 29);
        assert!((stat.ratio - 52.0 / 13.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_input() {
        let (_temp_dir, store) = new_store();
        let outcome = store.compress(b"", "empty").unwrap();
        assert_eq!(outcome.record.compressed_size, HEADER_SIZE as u64);

        let stat = store.stat("empty").unwrap();
        assert_eq!(stat.code_count, 0);
        assert_eq!(stat.payload_bits, 0);
        assert_eq!(store.decompress("empty").unwrap(), Vec::<u8>::new());
    }
}
