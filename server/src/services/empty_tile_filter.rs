//! Recognises the blank placeholder images some imagery providers (notably
//! Esri World Imagery) serve instead of a 404 where they have no coverage.

use std::collections::HashSet;

use sha2::{Digest, Sha256};
use tracing::warn;

#[derive(Debug, Default, Clone)]
pub struct EmptyTileFilter {
    hashes: HashSet<[u8; 32]>,
}

impl EmptyTileFilter {
    pub fn new(hashes: impl IntoIterator<Item = [u8; 32]>) -> Self {
        Self {
            hashes: hashes.into_iter().collect(),
        }
    }

    /// Parse comma-separated hex digests, skipping (and logging) malformed entries.
    pub fn from_hex_list(list: &str) -> Self {
        let hashes = list
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .filter_map(|entry| {
                let mut digest = [0u8; 32];
                match hex::decode_to_slice(entry, &mut digest) {
                    Ok(()) => Some(digest),
                    Err(e) => {
                        warn!(error = %e, entry, "ignoring malformed empty-tile digest");
                        None
                    }
                }
            });
        Self::new(hashes)
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty_tile(&self, payload: &[u8]) -> bool {
        if self.hashes.is_empty() {
            return false;
        }
        let digest: [u8; 32] = Sha256::digest(payload).into();
        self.hashes.contains(&digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest_hex(payload: &[u8]) -> String {
        hex::encode(Sha256::digest(payload))
    }

    #[test]
    fn matches_only_listed_payloads() {
        let blank = b"placeholder image bytes";
        let filter = EmptyTileFilter::from_hex_list(&digest_hex(blank));
        assert_eq!(filter.len(), 1);
        assert!(filter.is_empty_tile(blank));
        assert!(!filter.is_empty_tile(b"real imagery"));
    }

    #[test]
    fn skips_malformed_entries() {
        let list = format!("nothex, {} ,,abcd", digest_hex(b"a"));
        let filter = EmptyTileFilter::from_hex_list(&list);
        assert_eq!(filter.len(), 1);
        assert!(filter.is_empty_tile(b"a"));
    }

    #[test]
    fn empty_list_matches_nothing() {
        let filter = EmptyTileFilter::from_hex_list("");
        assert_eq!(filter.len(), 0);
        assert!(!filter.is_empty_tile(b""));
    }

    #[test]
    fn digest_case_is_ignored() {
        let upper = digest_hex(b"tile").to_ascii_uppercase();
        assert!(EmptyTileFilter::from_hex_list(&upper).is_empty_tile(b"tile"));
    }
}
