//! File hashing with an mtime-keyed cache for md5 digests.

use crate::error::ModError;
use md5::Md5;
use parking_lot::Mutex;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::debug;

/// Hash algorithms a manifest may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    /// Parses an algorithm name as written in a `HASH` line (case-insensitive).
    pub fn parse(name: &str) -> Result<Self, ModError> {
        match name.to_ascii_lowercase().as_str() {
            "md5" => Ok(HashAlgorithm::Md5),
            "sha1" => Ok(HashAlgorithm::Sha1),
            "sha256" => Ok(HashAlgorithm::Sha256),
            "sha512" => Ok(HashAlgorithm::Sha512),
            _ => Err(ModError::UnsupportedAlgorithm(name.to_string())),
        }
    }
}

/// Digests keyed by absolute path, valid while the file's mtime is unchanged.
///
/// Shared between installs through an `Arc`; lookups and inserts are locked.
#[derive(Debug, Default)]
pub struct HashCache {
    entries: Mutex<HashMap<PathBuf, (String, SystemTime)>>,
}

impl HashCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lookup(&self, path: &Path, mtime: SystemTime) -> Option<String> {
        let entries = self.entries.lock();
        match entries.get(path) {
            Some((digest, cached)) if *cached == mtime => Some(digest.clone()),
            _ => None,
        }
    }

    fn store(&self, path: PathBuf, digest: String, mtime: SystemTime) {
        self.entries.lock().insert(path, (digest, mtime));
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn hash_reader<D: Digest>(reader: &mut impl Read) -> Result<String, ModError> {
    let mut hasher = D::new();
    let mut buffer = vec![0u8; 1024 * 1024];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    let digest = hasher.finalize();
    Ok(digest.iter().map(|b| format!("{:02x}", b)).collect())
}

/// Computes the hex digest of a file, reading it in chunks.
///
/// md5 results are served from and stored into `cache`; other algorithms
/// are always recomputed.
pub fn compute_file_hash(
    path: &Path,
    algorithm: HashAlgorithm,
    cache: &HashCache,
) -> Result<String, ModError> {
    let path = std::path::absolute(path)?;
    let mtime = std::fs::metadata(&path)?.modified()?;

    if algorithm == HashAlgorithm::Md5 {
        if let Some(digest) = cache.lookup(&path, mtime) {
            debug!("Hash cache hit for {}", path.display());
            return Ok(digest);
        }
    }

    let file = std::fs::File::open(&path)?;
    let mut reader = std::io::BufReader::with_capacity(1024 * 1024, file);

    let digest = match algorithm {
        HashAlgorithm::Md5 => hash_reader::<Md5>(&mut reader)?,
        HashAlgorithm::Sha1 => hash_reader::<Sha1>(&mut reader)?,
        HashAlgorithm::Sha256 => hash_reader::<Sha256>(&mut reader)?,
        HashAlgorithm::Sha512 => hash_reader::<Sha512>(&mut reader)?,
    };

    if algorithm == HashAlgorithm::Md5 {
        cache.store(path, digest.clone(), mtime);
    }

    Ok(digest)
}

/// Async wrapper running [`compute_file_hash`] on the blocking pool.
pub async fn compute_file_hash_async(
    path: PathBuf,
    algorithm: HashAlgorithm,
    cache: Arc<HashCache>,
) -> Result<String, ModError> {
    tokio::task::spawn_blocking(move || compute_file_hash(&path, algorithm, &cache))
        .await
        .map_err(|e| ModError::IoError(std::io::Error::other(format!("Task join error: {}", e))))?
}

/// Compares a computed digest with the manifest's expected value, ignoring case.
pub fn digest_matches(computed: &str, expected: &str) -> bool {
    computed.eq_ignore_ascii_case(expected.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_known_digests() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("abc.txt");
        std::fs::write(&path, "abc").unwrap();
        let cache = HashCache::default();

        assert_eq!(
            compute_file_hash(&path, HashAlgorithm::Md5, &cache).unwrap(),
            "900150983cd24fb0d6963f7d28e17f72"
        );
        assert_eq!(
            compute_file_hash(&path, HashAlgorithm::Sha1, &cache).unwrap(),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
        assert_eq!(
            compute_file_hash(&path, HashAlgorithm::Sha256, &cache).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_only_md5_is_cached() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("data.bin");
        std::fs::write(&path, "abc").unwrap();
        let cache = HashCache::default();

        compute_file_hash(&path, HashAlgorithm::Sha1, &cache).unwrap();
        assert!(cache.is_empty());
        compute_file_hash(&path, HashAlgorithm::Md5, &cache).unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_invalidated_by_mtime() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("data.bin");
        std::fs::write(&path, "abc").unwrap();
        let cache = HashCache::default();
        let first = compute_file_hash(&path, HashAlgorithm::Md5, &cache).unwrap();

        std::fs::write(&path, "abcd").unwrap();
        let file = std::fs::File::options().write(true).open(&path).unwrap();
        file.set_modified(SystemTime::now() + std::time::Duration::from_secs(10))
            .unwrap();
        drop(file);

        let second = compute_file_hash(&path, HashAlgorithm::Md5, &cache).unwrap();
        assert_ne!(first, second);
        assert_eq!(second, "e2fc714c4727ee9395f324cd2e7f331f");
    }

    #[test]
    fn test_algorithm_parse_and_compare() {
        assert_eq!(HashAlgorithm::parse("MD5").unwrap(), HashAlgorithm::Md5);
        assert!(matches!(
            HashAlgorithm::parse("crc32"),
            Err(ModError::UnsupportedAlgorithm(_))
        ));
        assert!(digest_matches("abcdef", "ABCDEF"));
        assert!(!digest_matches("abcdef", "ABCDE0"));
    }
}
