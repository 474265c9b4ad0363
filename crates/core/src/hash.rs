//! Content hashing
//!
//! SHA-256 is used for file digests, example ids and run ids. None of these
//! are security boundaries; the hash only has to be collision-resistant
//! enough that two different inputs never share an identity in practice.

use sha2::{Digest, Sha256};
use std::fmt::Write;

/// Hex-encoded SHA-256 of `bytes`
pub fn hex_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    to_hex(&hasher.finalize())
}

/// Hex-encoded SHA-256 of the canonical JSON rendering of the sorted ids
///
/// Used as the run id: it changes whenever the example population changes.
pub fn population_digest<'a, I>(ids: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut ids: Vec<&str> = ids.into_iter().collect();
    ids.sort_unstable();
    ids.dedup();
    let payload = serde_json::to_vec(&ids).unwrap_or_default();
    hex_digest(&payload)
}

fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_digest_known_value() {
        assert_eq!(
            hex_digest(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_hex_digest_differs_for_different_inputs() {
        assert_ne!(hex_digest(b"puts 1\n"), hex_digest(b"puts 2\n"));
        assert_eq!(hex_digest(b"abc").len(), 64);
    }

    #[test]
    fn test_population_digest_is_order_independent() {
        let a = population_digest(["b", "a", "c"]);
        let b = population_digest(["c", "b", "a"]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_population_digest_changes_with_population() {
        let a = population_digest(["a", "b"]);
        let b = population_digest(["a", "b", "c"]);
        assert_ne!(a, b);
    }

    proptest::proptest! {
        #[test]
        fn test_population_digest_ignores_order_and_repeats(mut ids in proptest::collection::vec("[a-f0-9]{1,8}", 0..16)) {
            let forward = population_digest(ids.iter().map(String::as_str));
            ids.reverse();
            let doubled: Vec<&str> = ids.iter().chain(ids.iter()).map(String::as_str).collect();
            proptest::prop_assert_eq!(forward, population_digest(doubled));
        }
    }
}
