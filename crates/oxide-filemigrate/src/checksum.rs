//! Content checksums recorded in the ledger.
//!
//! Checksums are lowercase hex MD5 digests, which fit the `CHAR(32)` ledger
//! column on every dialect.

use std::path::Path;

use crate::error::Result;

/// Returns the checksum of a migration file's content.
#[must_use]
pub fn checksum(content: &[u8]) -> String {
    format!("{:x}", md5::compute(content))
}

/// Reads a file and returns the checksum of its bytes.
pub async fn file_checksum(path: &Path) -> Result<String> {
    let content = tokio::fs::read(path).await?;
    Ok(checksum(&content))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_is_md5_hex() {
        assert_eq!(checksum(b""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(
            checksum(b"CREATE TABLE users (id INTEGER);"),
            checksum("CREATE TABLE users (id INTEGER);".as_bytes())
        );
        assert_eq!(checksum(b"a").len(), 32);
    }

    #[tokio::test]
    async fn test_file_checksum_matches_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2024-01-01_10_00_00-users.sql");
        std::fs::write(&path, "CREATE TABLE users (id INTEGER);\n").unwrap();

        let from_file = file_checksum(&path).await.unwrap();
        assert_eq!(from_file, checksum(b"CREATE TABLE users (id INTEGER);\n"));
    }
}
