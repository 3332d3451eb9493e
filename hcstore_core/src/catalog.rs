//! Name catalog: logical file name to blob location and content hash.
//!
//! One record per line, fields separated by `|` and identified by label:
//!
//! ```text
//! <name> | Compressed Size: <N> bytes | Offset: <N> | Compressed: yes | Duplicate: <yes|no> | Hash: <hex>
//! ```
//!
//! The name is always the first field. The remaining fields may appear in any
//! order; unknown labels are skipped and a missing `Duplicate` field reads as
//! `no`. Names are matched exactly, never by substring.

use crate::atomic::write_atomic;
use crate::error::{Error, Result};
use crate::hash::Hash;
use log::info;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// One catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogRecord {
    /// Logical file name.
    pub name: String,
    /// Blob length in bytes.
    pub compressed_size: u64,
    /// Blob offset in the pool.
    pub offset: u64,
    /// Content hash of the original bytes.
    pub hash: Hash,
    /// True when this record reuses a blob written for an earlier record.
    pub duplicate: bool,
}

impl CatalogRecord {
    /// Serialize the record to a line (without newline).
    pub fn to_line(&self) -> String {
        format!(
            "{} | Compressed Size: {} bytes | Offset: {} | Compressed: yes | Duplicate: {} | Hash: {}",
            self.name,
            self.compressed_size,
            self.offset,
            yes_no(self.duplicate),
            self.hash
        )
    }

    /// Parse a record from a line.
    pub fn from_line(line: &str) -> Result<Self> {
        let mut fields = line.split('|');
        let name = fields.next().unwrap_or_default().trim();
        if name.is_empty() {
            return Err(Error::format(format!("Catalog record has no name: {}", line)));
        }

        let mut compressed_size = None;
        let mut offset = None;
        let mut hash = None;
        let mut duplicate = false;

        for field in fields {
            let Some((label, value)) = field.split_once(':') else {
                return Err(Error::format(format!("Catalog field without label: {}", field)));
            };
            let value = value.trim();
            match label.trim() {
                "Compressed Size" => {
                    let number = value.strip_suffix("bytes").unwrap_or(value).trim();
                    compressed_size = Some(parse_number(number, "Compressed Size")?);
                }
                "Offset" => offset = Some(parse_number(value, "Offset")?),
                "Duplicate" => duplicate = parse_yes_no(value)?,
                "Hash" => {
                    hash = Some(Hash::from_hex(value).map_err(|_| {
                        Error::format(format!("Invalid hash in catalog record: {}", value))
                    })?)
                }
                _ => {}
            }
        }

        let missing = |label: &str| Error::format(format!("Catalog record for {} lacks {}", name, label));
        Ok(Self {
            name: name.to_string(),
            compressed_size: compressed_size.ok_or_else(|| missing("Compressed Size"))?,
            offset: offset.ok_or_else(|| missing("Offset"))?,
            hash: hash.ok_or_else(|| missing("Hash"))?,
            duplicate,
        })
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

fn parse_yes_no(value: &str) -> Result<bool> {
    match value {
        "yes" => Ok(true),
        "no" => Ok(false),
        other => Err(Error::format(format!("Expected yes or no, got {}", other))),
    }
}

fn parse_number(value: &str, label: &str) -> Result<u64> {
    value
        .parse::<u64>()
        .map_err(|_| Error::format(format!("Invalid {} in catalog record: {}", label, value)))
}

/// Check that `name` survives a write/parse cycle unchanged.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_name("Name cannot be empty"));
    }
    if name.contains(['|', '\n', '\r']) {
        return Err(Error::invalid_name(format!(
            "Name must not contain '|' or line breaks: {:?}",
            name
        )));
    }
    if name.trim() != name {
        return Err(Error::invalid_name(format!(
            "Name must not start or end with whitespace: {:?}",
            name
        )));
    }
    Ok(())
}

/// Handle to a catalog file.
#[derive(Debug, Clone)]
pub struct NameCatalog {
    path: PathBuf,
}

impl NameCatalog {
    /// Create a handle; a missing file reads as an empty catalog.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Path of the catalog file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record in append order.
    pub fn load(&self) -> Result<Vec<CatalogRecord>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(CatalogRecord::from_line)
            .collect()
    }

    /// Append a record. Duplicates get their own record too.
    pub fn append(&self, record: &CatalogRecord) -> Result<()> {
        validate_name(&record.name)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", record.to_line())?;
        file.flush()?;
        Ok(())
    }

    /// Find the record named exactly `name`.
    ///
    /// If the name was stored more than once, the most recent record wins.
    pub fn find_exact(&self, name: &str) -> Result<CatalogRecord> {
        self.load()?
            .into_iter()
            .rev()
            .find(|r| r.name == name)
            .ok_or_else(|| Error::name_not_found(name))
    }

    /// Remove the record [`find_exact`](Self::find_exact) would return.
    ///
    /// The catalog is rewritten atomically with the remaining records in their
    /// original order.
    pub fn remove_exact(&self, name: &str) -> Result<CatalogRecord> {
        let mut records = self.load()?;
        let index = records
            .iter()
            .rposition(|r| r.name == name)
            .ok_or_else(|| Error::name_not_found(name))?;
        let removed = records.remove(index);

        let mut content = String::new();
        for record in &records {
            content.push_str(&record.to_line());
            content.push('\n');
        }
        write_atomic(&self.path, content.as_bytes())?;

        info!("catalog: removed {} (hash {})", removed.name, removed.hash);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(name: &str, offset: u64) -> CatalogRecord {
        CatalogRecord {
            name: name.to_string(),
            compressed_size: 52,
            offset,
            hash: Hash::hash_bytes(name.as_bytes()),
            duplicate: false,
        }
    }

    fn catalog(temp_dir: &TempDir) -> NameCatalog {
        NameCatalog::new(temp_dir.path().join("catalog.txt"))
    }

    #[test]
    fn test_line_format() {
        let rec = record("notes.txt", 0);
        assert_eq!(
            rec.to_line(),
            format!(
                "notes.txt | Compressed Size: 52 bytes | Offset: 0 | Compressed: yes | Duplicate: no | Hash: {}",
                rec.hash
            )
        );
        assert_eq!(CatalogRecord::from_line(&rec.to_line()).unwrap(), rec);
    }

    #[test]
    fn test_parse_by_label_not_position() {
        let hash = Hash::hash_bytes(b"x");
        let line = format!(
            "dir/x.bin | Hash: {} | Offset: 7 | Duplicate: yes | Compressed Size: 40 bytes",
            hash
        );
        let rec = CatalogRecord::from_line(&line).unwrap();
        assert_eq!(rec.name, "dir/x.bin");
        assert_eq!(rec.offset, 7);
        assert_eq!(rec.compressed_size, 40);
        assert!(rec.duplicate);
        assert_eq!(rec.hash, hash);
    }

    #[test]
    fn test_parse_without_duplicate_field() {
        let hash = Hash::hash_bytes(b"old");
        let line = format!(
            "old.txt | Compressed Size: 9 bytes | Offset: 3 | Compressed: yes | Hash: {}",
            hash
        );
        assert!(!CatalogRecord::from_line(&line).unwrap().duplicate);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(CatalogRecord::from_line("just a name").is_err());
        assert!(CatalogRecord::from_line(" | Offset: 1").is_err());
        assert!(CatalogRecord::from_line("a | Offset: x").is_err());
        assert!(CatalogRecord::from_line("a | nonsense").is_err());
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("report 2024.pdf").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("a|b").is_err());
        assert!(validate_name("a\nb").is_err());
        assert!(validate_name(" padded").is_err());
    }

    #[test]
    fn test_append_and_find_exact() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = catalog(&temp_dir);
        catalog.append(&record("file.txt", 0)).unwrap();
        catalog.append(&record("file.txt.bak", 52)).unwrap();

        assert_eq!(catalog.find_exact("file.txt").unwrap().offset, 0);
        assert_eq!(catalog.find_exact("file.txt.bak").unwrap().offset, 52);
        assert!(catalog.find_exact("file").unwrap_err().is_not_found());
        assert!(catalog.find_exact("txt").unwrap_err().is_not_found());
    }

    #[test]
    fn test_remove_exact_ignores_substring_names() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = catalog(&temp_dir);
        catalog.append(&record("a.txt.bak", 0)).unwrap();
        catalog.append(&record("a.txt", 52)).unwrap();
        catalog.append(&record("b.txt", 104)).unwrap();

        let removed = catalog.remove_exact("a.txt").unwrap();
        assert_eq!(removed.offset, 52);

        let names: Vec<String> = catalog.load().unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["a.txt.bak", "b.txt"]);
    }

    #[test]
    fn test_remove_twice_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = catalog(&temp_dir);
        catalog.append(&record("keep.txt", 0)).unwrap();
        catalog.append(&record("gone.txt", 52)).unwrap();

        catalog.remove_exact("gone.txt").unwrap();
        let before = fs::read_to_string(catalog.path()).unwrap();

        assert!(catalog.remove_exact("gone.txt").unwrap_err().is_not_found());
        assert_eq!(fs::read_to_string(catalog.path()).unwrap(), before);
        assert_eq!(catalog.load().unwrap(), vec![record("keep.txt", 0)]);
    }

    #[test]
    fn test_repeated_name_latest_wins() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = catalog(&temp_dir);
        catalog.append(&record("same", 0)).unwrap();
        catalog.append(&record("same", 99)).unwrap();

        assert_eq!(catalog.find_exact("same").unwrap().offset, 99);
        assert_eq!(catalog.remove_exact("same").unwrap().offset, 99);
        assert_eq!(catalog.find_exact("same").unwrap().offset, 0);
    }

    #[test]
    fn test_remove_from_missing_catalog() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = catalog(&temp_dir);
        assert!(catalog.remove_exact("x").unwrap_err().is_not_found());
        assert!(!catalog.path().exists());
    }

    #[test]
    fn test_append_rejects_bad_name() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = catalog(&temp_dir);
        assert!(matches!(
            catalog.append(&record("bad|name", 0)),
            Err(Error::InvalidName { .. })
        ));
    }

    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            max_shrink_iters: 10000,
            ..ProptestConfig::default()
        })]

        /// Any valid name survives a write/parse cycle
        #[test]
        fn prop_valid_names_roundtrip(
            name in "[a-zA-Z0-9_./ -]{1,40}"
                .prop_filter("no surrounding whitespace", |n| n.trim() == n)
        ) {
            let rec = CatalogRecord {
                name: name.clone(),
                compressed_size: 1,
                offset: 2,
                hash: Hash::hash_bytes(name.as_bytes()),
                duplicate: true,
            };
            prop_assert_eq!(CatalogRecord::from_line(&rec.to_line())?, rec);
        }
    }
}
