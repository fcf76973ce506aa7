//! Metadata content hash.
//!
//! The upstream metadata document changes whenever a region is added or a
//! source file moves. Its SHA-256 is persisted next to the global table so a
//! restart can tell whether the table is still current.

use std::path::Path;

use sha2::{Digest as _, Sha256};

use crate::{StoreError, tables::write_atomic};

/// Hex-encoded SHA-256 of the raw metadata bytes.
#[must_use]
pub fn metadata_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Reads the last persisted hash, if any.
///
/// A missing or unreadable file is treated as "no hash".
#[must_use]
pub fn read_stored_hash(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            let hash = contents.trim();
            (!hash.is_empty()).then(|| hash.to_string())
        }
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("Unable to read {}: {e}", path.display());
            }
            None
        }
    }
}

/// Persists `hash`.
///
/// # Errors
///
/// Returns [`StoreError`] if the file cannot be written.
pub fn write_stored_hash(path: &Path, hash: &str) -> Result<(), StoreError> {
    write_atomic(path, format!("{hash}\n").as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digest() {
        assert_eq!(
            metadata_hash(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn stored_hash_round_trip() {
        let dir = std::env::temp_dir().join(format!("similarity-store-{}", uuid::Uuid::new_v4()));
        let path = dir.join(".metadata.sha256");
        assert_eq!(read_stored_hash(&path), None);

        write_stored_hash(&path, "deadbeef").unwrap();
        assert_eq!(read_stored_hash(&path).as_deref(), Some("deadbeef"));
        std::fs::remove_dir_all(dir).ok();
    }
}
