//! SHA-256 fingerprints of files.
//!
//! Used for backup checksums and to recognize a spreadsheet that was
//! already imported.

use crate::error::Result;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io;
use std::path::Path;

/// Hex SHA-256 of a file's contents, streamed.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn file_sha256(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Hex SHA-256 of an in-memory buffer.
#[must_use]
pub fn bytes_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_file_and_bytes_agree() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"OR 0000001").unwrap();
        let from_file = file_sha256(file.path()).unwrap();
        assert_eq!(from_file, bytes_sha256(b"OR 0000001"));
        assert_eq!(from_file.len(), 64);
    }

    #[test]
    fn test_different_content_differs() {
        assert_ne!(bytes_sha256(b"a"), bytes_sha256(b"b"));
    }
}
