//! Hash ledger: content hash to blob location and reference count.
//!
//! One record per line, whitespace separated:
//!
//! ```text
//! <hex-hash> <offset> <length> <refcount>
//! ```
//!
//! Lines lacking the refcount field are read as refcount 1. The whole file is
//! rewritten atomically on every mutation.

use crate::atomic::write_atomic;
use crate::error::{Error, Result};
use crate::hash::Hash;
use log::{info, warn};
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// One ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerRecord {
    /// Content hash of the original bytes.
    pub hash: Hash,
    /// Blob offset in the pool.
    pub offset: u64,
    /// Blob length in bytes.
    pub length: u64,
    /// Number of catalog records referencing this blob.
    pub refcount: u64,
}

impl LedgerRecord {
    /// Serialize the record to a line (without newline).
    pub fn to_line(&self) -> String {
        format!(
            "{} {} {} {}",
            self.hash, self.offset, self.length, self.refcount
        )
    }

    /// Parse a record from a line.
    pub fn from_line(line: &str) -> Result<Self> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() != 3 && parts.len() != 4 {
            return Err(Error::format(format!(
                "Invalid ledger record: expected 4 fields, got {}",
                parts.len()
            )));
        }

        let hash = Hash::from_hex(parts[0])
            .map_err(|_| Error::format(format!("Invalid hash in ledger record: {}", parts[0])))?;
        let offset = parse_field(parts[1], "offset")?;
        let length = parse_field(parts[2], "length")?;
        let refcount = match parts.get(3) {
            Some(field) => parse_field(field, "refcount")?,
            None => {
                warn!("ledger record for {} has no refcount, assuming 1", hash);
                1
            }
        };

        Ok(Self {
            hash,
            offset,
            length,
            refcount,
        })
    }
}

fn parse_field(value: &str, label: &str) -> Result<u64> {
    value
        .parse::<u64>()
        .map_err(|_| Error::format(format!("Invalid {} in ledger record: {}", label, value)))
}

/// Result of releasing one reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Release {
    /// The entry is still referenced.
    Decremented(LedgerRecord),
    /// The last reference went away and the entry was removed.
    Freed(LedgerRecord),
    /// The hash had no entry; nothing changed.
    Missing,
}

/// Handle to a ledger file.
#[derive(Debug, Clone)]
pub struct HashLedger {
    path: PathBuf,
}

impl HashLedger {
    /// Create a handle; a missing file reads as an empty ledger.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Path of the ledger file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record in file order.
    pub fn load(&self) -> Result<Vec<LedgerRecord>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(LedgerRecord::from_line)
            .collect()
    }

    fn save(&self, records: &[LedgerRecord]) -> Result<()> {
        let mut content = String::new();
        for record in records {
            content.push_str(&record.to_line());
            content.push('\n');
        }
        write_atomic(&self.path, content.as_bytes())
    }

    /// Find the entry for `hash`.
    pub fn lookup(&self, hash: &Hash) -> Result<Option<LedgerRecord>> {
        Ok(self.load()?.into_iter().find(|r| r.hash == *hash))
    }

    /// Insert a new entry with refcount 1.
    pub fn record_new(&self, hash: &Hash, offset: u64, length: u64) -> Result<LedgerRecord> {
        let mut records = self.load()?;
        if records.iter().any(|r| r.hash == *hash) {
            return Err(Error::inconsistency(format!(
                "Ledger already has an entry for {}",
                hash
            )));
        }

        let record = LedgerRecord {
            hash: *hash,
            offset,
            length,
            refcount: 1,
        };
        records.push(record.clone());
        self.save(&records)?;

        info!("ledger: new entry {} at offset {} ({} bytes)", hash, offset, length);
        Ok(record)
    }

    /// Add one reference to an existing entry.
    pub fn increment(&self, hash: &Hash) -> Result<LedgerRecord> {
        let mut records = self.load()?;
        let record = records
            .iter_mut()
            .find(|r| r.hash == *hash)
            .ok_or_else(|| Error::hash_not_found(hash.to_hex()))?;
        record.refcount += 1;
        let updated = record.clone();
        self.save(&records)?;

        info!("ledger: {} refcount -> {}", hash, updated.refcount);
        Ok(updated)
    }

    /// Drop one reference, removing the entry when none remain.
    ///
    /// A hash without an entry is reported as [`Release::Missing`] rather than
    /// an error; the pool bytes of a freed entry are not reclaimed.
    pub fn decrement_or_free(&self, hash: &Hash) -> Result<Release> {
        let mut records = self.load()?;
        let Some(index) = records.iter().position(|r| r.hash == *hash) else {
            warn!("ledger: no entry for {}, nothing to release", hash);
            return Ok(Release::Missing);
        };

        let record = &mut records[index];
        record.refcount = record.refcount.saturating_sub(1);

        let release = if record.refcount == 0 {
            let freed = records.remove(index);
            info!(
                "ledger: freed {} (offset {}, {} bytes)",
                hash, freed.offset, freed.length
            );
            Release::Freed(freed)
        } else {
            info!("ledger: {} refcount -> {}", hash, record.refcount);
            Release::Decremented(record.clone())
        };

        self.save(&records)?;
        Ok(release)
    }
}
