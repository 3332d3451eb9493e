//! Store statistics and consistency checking.

use crate::error::Result;
use crate::hash::Hash;
use crate::store::Store;
use log::warn;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Space and record counts for a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    /// Pool size in bytes.
    pub pool_bytes: u64,
    /// Number of catalog records.
    pub catalog_records: usize,
    /// Number of ledger entries (distinct stored blobs).
    pub ledger_entries: usize,
    /// Bytes held by blobs that still have a ledger entry.
    pub live_bytes: u64,
    /// Pool bytes not covered by any ledger entry.
    pub dead_bytes: u64,
}

/// A single inconsistency found by [`Store::verify`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Problem {
    /// Ledger refcount differs from the number of catalog records for the hash.
    RefcountMismatch {
        hash: Hash,
        catalog_refs: u64,
        ledger_refcount: u64,
    },
    /// A catalog record's hash has no ledger entry.
    MissingLedgerEntry { name: String, hash: Hash },
    /// A catalog record points somewhere other than its ledger entry.
    LocationMismatch {
        name: String,
        hash: Hash,
        catalog_offset: u64,
        ledger_offset: u64,
    },
    /// A ledger entry extends past the end of the pool.
    OutsidePool {
        hash: Hash,
        offset: u64,
        length: u64,
        pool_bytes: u64,
    },
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Problem::RefcountMismatch {
                hash,
                catalog_refs,
                ledger_refcount,
            } => write!(
                f,
                "{}: ledger refcount {} but {} catalog records",
                hash, ledger_refcount, catalog_refs
            ),
            Problem::MissingLedgerEntry { name, hash } => {
                write!(f, "{}: hash {} has no ledger entry", name, hash)
            }
            Problem::LocationMismatch {
                name,
                hash,
                catalog_offset,
                ledger_offset,
            } => write!(
                f,
                "{}: catalog offset {} but ledger has {} at offset {}",
                name, catalog_offset, hash, ledger_offset
            ),
            Problem::OutsidePool {
                hash,
                offset,
                length,
                pool_bytes,
            } => write!(
                f,
                "{}: {} bytes at offset {} extend past pool end ({} bytes)",
                hash, length, offset, pool_bytes
            ),
        }
    }
}

/// Result of a consistency check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    /// Number of catalog records examined.
    pub records_checked: usize,
    /// Number of ledger entries examined.
    pub entries_checked: usize,
    /// Every problem found, catalog problems first.
    pub problems: Vec<Problem>,
}

impl VerifyReport {
    /// True when no problems were found.
    pub fn is_consistent(&self) -> bool {
        self.problems.is_empty()
    }
}

impl Store {
    /// Summarize pool usage.
    pub fn stats(&self) -> Result<StoreStats> {
        let pool_bytes = self.pool().len()?;
        let entries = self.ledger().load()?;
        let records = self.catalog().load()?;

        let live_bytes: u64 = entries.iter().map(|e| e.length).sum();
        Ok(StoreStats {
            pool_bytes,
            catalog_records: records.len(),
            ledger_entries: entries.len(),
            live_bytes,
            dead_bytes: pool_bytes.saturating_sub(live_bytes),
        })
    }

    /// Check that catalog, ledger and pool agree. Read-only.
    ///
    /// For every hash, the ledger refcount must equal the number of catalog
    /// records carrying that hash, and each record must point at the blob the
    /// ledger records for it.
    pub fn verify(&self) -> Result<VerifyReport> {
        let pool_bytes = self.pool().len()?;
        let entries = self.ledger().load()?;
        let records = self.catalog().load()?;

        let mut report = VerifyReport {
            records_checked: records.len(),
            entries_checked: entries.len(),
            problems: Vec::new(),
        };

        let by_hash: BTreeMap<Hash, _> = entries.iter().map(|e| (e.hash, e)).collect();
        let mut refs: BTreeMap<Hash, u64> = BTreeMap::new();

        for record in &records {
            *refs.entry(record.hash).or_insert(0) += 1;
            match by_hash.get(&record.hash) {
                None => report.problems.push(Problem::MissingLedgerEntry {
                    name: record.name.clone(),
                    hash: record.hash,
                }),
                Some(entry) if entry.offset != record.offset => {
                    report.problems.push(Problem::LocationMismatch {
                        name: record.name.clone(),
                        hash: record.hash,
                        catalog_offset: record.offset,
                        ledger_offset: entry.offset,
                    })
                }
                Some(_) => {}
            }
        }

        for entry in &entries {
            let catalog_refs = refs.get(&entry.hash).copied().unwrap_or(0);
            if catalog_refs != entry.refcount {
                report.problems.push(Problem::RefcountMismatch {
                    hash: entry.hash,
                    catalog_refs,
                    ledger_refcount: entry.refcount,
                });
            }
            if entry.offset.saturating_add(entry.length) > pool_bytes {
                report.problems.push(Problem::OutsidePool {
                    hash: entry.hash,
                    offset: entry.offset,
                    length: entry.length,
                    pool_bytes,
                });
            }
        }

        for problem in &report.problems {
            warn!("verify: {:?}", problem);
        }
        Ok(report)
    }
}
