//! Append-only blob pool.
//!
//! The pool is a single file of concatenated blobs addressed by byte offset.
//! Nothing is ever removed from it; blobs whose last reference is deleted stay
//! in place as dead bytes.

use crate::error::{Error, Result};
use log::info;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Handle to a pool file.
#[derive(Debug, Clone)]
pub struct BlobPool {
    path: PathBuf,
}

impl BlobPool {
    /// Create a handle; the file itself is created on first append.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Path of the pool file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current pool size in bytes (0 if the file does not exist yet).
    pub fn len(&self) -> Result<u64> {
        match fs::metadata(&self.path) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    /// Append `bytes` at the end of the pool and return their offset.
    pub fn append(&self, bytes: &[u8]) -> Result<u64> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?;

        let offset = file.seek(SeekFrom::End(0))?;
        file.write_all(bytes)?;
        file.flush()?;

        info!(
            "appended {} bytes to {} at offset {}",
            bytes.len(),
            self.path.display(),
            offset
        );
        Ok(offset)
    }

    /// Read exactly `len` bytes starting at `offset`.
    pub fn read_at(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        let mut file = File::open(&self.path)?;
        let size = file.metadata()?.len();

        let available = size.saturating_sub(offset);
        if available < len {
            return Err(Error::truncated(len, available));
        }

        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len as usize];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }
}
