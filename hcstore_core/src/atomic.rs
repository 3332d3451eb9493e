//! Write-to-temporary-then-rename file replacement.

use crate::error::Result;
use std::io::Write;
use std::path::Path;

/// Replace `path` with `contents` atomically.
///
/// The temporary file lives in the target's directory so the final rename never
/// crosses filesystems. Until `persist` succeeds the previous file is untouched.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp_file = tempfile::NamedTempFile::new_in(dir)?;
    temp_file.write_all(contents)?;
    temp_file.flush()?;
    temp_file.as_file().sync_all()?;

    temp_file.persist(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_atomic_replaces_content() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("index.txt");
        std::fs::write(&path, "old\n").unwrap();

        write_atomic(&path, b"new\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new\n");

        // No temporary files are left behind.
        let entries = std::fs::read_dir(temp_dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_write_atomic_missing_dir_keeps_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("no-such-dir").join("index.txt");
        assert!(write_atomic(&path, b"data").is_err());
        assert!(!path.exists());
    }
}
