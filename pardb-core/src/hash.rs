//! Streaming file digests with a truncatable hex width and a length-tolerant
//! comparison, since a digest read back from an older or partially written
//! record may be shorter than the one just computed.

use anyhow::{Context, Result};
use sha2::Digest;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Hashes are never trusted below this many hex characters (64 bits).
pub const MIN_HASH: usize = 16;

/// Default truncation width in hex characters (256 bits).
pub const DEFAULT_TRUNCATE: usize = 64;

const CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Sentinel digest recorded when a file could not be read. Never valid hex
/// of the configured width, so it can't collide with a real digest.
pub const IO_ERROR_SENTINEL: &str = "io-error";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgo {
    Sha512,
    Blake3,
}

impl HashAlgo {
    pub fn name(self) -> &'static str {
        match self {
            HashAlgo::Sha512 => "sha512",
            HashAlgo::Blake3 => "blake3",
        }
    }

    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "sha512" => Ok(HashAlgo::Sha512),
            "blake3" => Ok(HashAlgo::Blake3),
            other => anyhow::bail!("unknown hash algorithm: {other} (expected sha512 or blake3)"),
        }
    }
}

/// Digest `path` in fixed-size chunks and return a lowercase hex string
/// truncated to `truncate_width`. Read failures return [`IO_ERROR_SENTINEL`]
/// rather than propagating, since a single unreadable file must not abort a
/// whole scan.
pub fn hash_file(path: &Path, algo: HashAlgo, truncate_width: usize) -> String {
    assert!(truncate_width >= MIN_HASH, "truncate_width below MIN_HASH");
    match hash_file_inner(path, algo) {
        Ok(full_hex) => full_hex.chars().take(truncate_width).collect(),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "io error while hashing");
            IO_ERROR_SENTINEL.to_string()
        }
    }
}

fn hash_file_inner(path: &Path, algo: HashAlgo) -> Result<String> {
    let mut f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut buf = vec![0u8; CHUNK_SIZE];
    match algo {
        HashAlgo::Sha512 => {
            let mut hasher = sha2::Sha512::new();
            loop {
                let n = f.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
            }
            Ok(hex::encode(hasher.finalize()))
        }
        HashAlgo::Blake3 => {
            let mut hasher = blake3::Hasher::new();
            loop {
                let n = f.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
            }
            Ok(hasher.finalize().to_hex().to_string())
        }
    }
}

/// Compare two digests over their shared prefix length. Either side being
/// shorter than [`MIN_HASH`] (an empty digest, the io-error sentinel, or a
/// truncated/corrupt record) compares unequal rather than panicking.
pub fn hash_cmp(a: &str, b: &str) -> bool {
    let length = a.len().min(b.len());
    if length < MIN_HASH {
        return false;
    }
    a[..length] == b[..length]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn hashes_match_across_algorithms_are_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, b"hello world").unwrap();
        let sha = hash_file(&path, HashAlgo::Sha512, DEFAULT_TRUNCATE);
        let b3 = hash_file(&path, HashAlgo::Blake3, DEFAULT_TRUNCATE);
        assert_ne!(sha, b3);
        assert_eq!(sha.len(), DEFAULT_TRUNCATE);
    }

    #[test]
    fn truncation_is_a_prefix_of_the_full_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, b"some content").unwrap();
        let long = hash_file(&path, HashAlgo::Sha512, 128);
        let short = hash_file(&path, HashAlgo::Sha512, 32);
        assert!(long.starts_with(&short));
    }

    #[test]
    fn missing_file_hashes_to_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.txt");
        assert_eq!(hash_file(&path, HashAlgo::Sha512, DEFAULT_TRUNCATE), IO_ERROR_SENTINEL);
    }

    #[test]
    fn hash_cmp_is_length_tolerant() {
        assert!(hash_cmp("abcdefabcdefabcdef", "abcdefabcdefabcdefghijk"));
        assert!(!hash_cmp("abcdefabcdefabcdef", "zzzzzzzzzzzzzzzzzz"));
    }

    #[test]
    fn hash_cmp_rejects_short_inputs_instead_of_panicking() {
        assert!(!hash_cmp("", ""));
        assert!(!hash_cmp("abc", "abc"));
        assert!(!hash_cmp(IO_ERROR_SENTINEL, IO_ERROR_SENTINEL));
    }

    #[test]
    fn large_file_hashes_in_multiple_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        let mut f = File::create(&path).unwrap();
        let chunk = vec![0x5au8; CHUNK_SIZE];
        f.write_all(&chunk).unwrap();
        f.write_all(&[1, 2, 3]).unwrap();
        let digest = hash_file(&path, HashAlgo::Sha512, DEFAULT_TRUNCATE);
        assert_eq!(digest.len(), DEFAULT_TRUNCATE);
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn hash_cmp_never_panics_on_arbitrary_hex(a in "[0-9a-f]{0,80}", b in "[0-9a-f]{0,80}") {
            let _ = hash_cmp(&a, &b);
        }

        #[test]
        fn hash_cmp_is_symmetric(a in "[0-9a-f]{0,80}", b in "[0-9a-f]{0,80}") {
            prop_assert_eq!(hash_cmp(&a, &b), hash_cmp(&b, &a));
        }

        #[test]
        fn hash_cmp_matches_self_above_min_hash(s in "[0-9a-f]{16,80}") {
            prop_assert!(hash_cmp(&s, &s));
        }
    }
}
