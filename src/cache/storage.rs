//! Named buckets of request → response entries.
//!
//! `CacheStorage` is a cheap handle shared by the registration, every worker
//! and every background revalidation thread. With a directory attached, the
//! store is mirrored on disk:
//!
//! ```text
//! <dir>/<hex(bucket name)>.bucket/        one directory per bucket
//!     <sha256(method url)>.entry          bincode (request key, response), zstd
//! ```
//!
//! Lookups only take the in-memory lock. Disk writes are serialized on a
//! separate lock and land on disk before they become visible in memory.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, info, warn};
use sha2::{Digest, Sha256};

use super::error::StorageError;
use super::request::{RequestKey, Response};

const BUCKET_EXT: &str = "bucket";
const ENTRY_EXT: &str = "entry";
const ZSTD_LEVEL: i32 = 3;

type Bucket = BTreeMap<RequestKey, Response>;

struct Disk {
    dir: PathBuf,
    write: Mutex<()>,
}

#[derive(Clone)]
pub struct CacheStorage {
    buckets: Arc<Mutex<BTreeMap<String, Bucket>>>,
    disk: Option<Arc<Disk>>,
}

impl CacheStorage {
    pub fn in_memory() -> Self {
        Self {
            buckets: Arc::new(Mutex::new(BTreeMap::new())),
            disk: None,
        }
    }

    /// Open (creating if needed) a persistent store and load its buckets.
    ///
    /// Unreadable bucket directories and entry files are skipped with a
    /// warning rather than failing the whole store.
    pub fn open_dir(dir: &Path) -> Result<Self, StorageError> {
        fs::create_dir_all(dir)?;
        let mut buckets = BTreeMap::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_dir() || path.extension().and_then(|e| e.to_str()) != Some(BUCKET_EXT) {
                continue;
            }
            let Some(name) = bucket_name(&path) else {
                warn!("storage: skipping {}: not a bucket name", path.display());
                continue;
            };
            let bucket = match load_bucket(&path) {
                Ok(bucket) => bucket,
                Err(e) => {
                    warn!("storage: skipping {}: {e}", path.display());
                    continue;
                }
            };
            debug!(
                "storage: loaded bucket {name} ({} entries) from {}",
                bucket.len(),
                path.display()
            );
            buckets.insert(name, bucket);
        }
        info!(
            "storage: opened {} with {} bucket(s)",
            dir.display(),
            buckets.len()
        );
        Ok(Self {
            buckets: Arc::new(Mutex::new(buckets)),
            disk: Some(Arc::new(Disk {
                dir: dir.to_path_buf(),
                write: Mutex::new(()),
            })),
        })
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Bucket>> {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The store directory plus the guard serializing writes to it.
    fn disk(&self) -> Option<(&Path, MutexGuard<'_, ()>)> {
        let disk = self.disk.as_deref()?;
        let guard = disk.write.lock().unwrap_or_else(PoisonError::into_inner);
        Some((disk.dir.as_path(), guard))
    }

    /// Ensure a bucket exists. Returns true if it was created.
    pub fn open(&self, name: &str) -> Result<bool, StorageError> {
        let disk = self.disk();
        if self.has(name) {
            return Ok(false);
        }
        if let Some((dir, _)) = &disk {
            fs::create_dir_all(bucket_dir(dir, name))?;
        }
        let mut buckets = self.lock();
        if buckets.contains_key(name) {
            return Ok(false);
        }
        buckets.insert(name.to_string(), Bucket::new());
        debug!("storage: created bucket {name}");
        Ok(true)
    }

    pub fn has(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    /// Bucket names in sorted order.
    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// Returns true if the bucket existed.
    pub fn delete(&self, name: &str) -> Result<bool, StorageError> {
        let disk = self.disk();
        if !self.has(name) {
            return Ok(false);
        }
        if let Some((dir, _)) = &disk {
            match fs::remove_dir_all(bucket_dir(dir, name)) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        let removed = self.lock().remove(name).is_some();
        debug!("storage: deleted bucket {name}");
        Ok(removed)
    }

    pub fn match_request(&self, name: &str, key: &RequestKey) -> Option<Response> {
        self.lock().get(name)?.get(key).cloned()
    }

    /// Store one entry. Writing into a bucket that no longer exists is a
    /// no-op and returns `Ok(false)`. A failed write leaves the bucket as it
    /// was.
    pub fn put(&self, name: &str, key: RequestKey, response: Response) -> Result<bool, StorageError> {
        let disk = self.disk();
        if !self.has(name) {
            debug!("storage: bucket {name} gone, dropping write of {key}");
            return Ok(false);
        }
        if let Some((dir, _)) = &disk {
            let bytes = encode_entry(name, &key, &response)?;
            write_entry(&bucket_dir(dir, name), &key, &bytes)?;
        }
        let mut buckets = self.lock();
        let Some(bucket) = buckets.get_mut(name) else {
            debug!("storage: bucket {name} gone, dropping write of {key}");
            return Ok(false);
        };
        bucket.insert(key, response);
        Ok(true)
    }

    /// Create-or-extend a bucket with several entries in one step.
    ///
    /// If a write fails, a bucket created by this call is removed again; an
    /// existing bucket keeps the entries that were written.
    pub fn put_all(
        &self,
        name: &str,
        entries: Vec<(RequestKey, Response)>,
    ) -> Result<(), StorageError> {
        let disk = self.disk();
        if let Some((dir, _)) = &disk {
            let bucket = bucket_dir(dir, name);
            let created = !self.has(name);
            let mut written = 0;
            let result = fs::create_dir_all(&bucket)
                .map_err(StorageError::from)
                .and_then(|()| {
                    for (key, response) in &entries {
                        let bytes = encode_entry(name, key, response)?;
                        write_entry(&bucket, key, &bytes)?;
                        written += 1;
                    }
                    Ok(())
                });
            if let Err(e) = result {
                if created {
                    if let Err(cleanup) = fs::remove_dir_all(&bucket) {
                        warn!("storage: could not remove partial bucket {name}: {cleanup}");
                    }
                } else {
                    let landed = entries.into_iter().take(written);
                    if let Some(existing) = self.lock().get_mut(name) {
                        existing.extend(landed);
                    }
                }
                return Err(e);
            }
        }
        self.lock()
            .entry(name.to_string())
            .or_default()
            .extend(entries);
        Ok(())
    }

    pub fn entry_keys(&self, name: &str) -> Vec<RequestKey> {
        self.lock()
            .get(name)
            .map(|b| b.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of entries and total body bytes of a bucket.
    pub fn usage(&self, name: &str) -> Option<(usize, usize)> {
        let buckets = self.lock();
        let bucket = buckets.get(name)?;
        let bytes = bucket.values().map(|r| r.body.len()).sum();
        Some((bucket.len(), bytes))
    }
}

/// Hex keeps every bucket name distinct on disk, whatever characters it holds.
fn bucket_dir(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.{BUCKET_EXT}", hex::encode(name)))
}

fn bucket_name(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    String::from_utf8(hex::decode(stem).ok()?).ok()
}

fn entry_path(bucket: &Path, key: &RequestKey) -> PathBuf {
    let mut hasher = Sha256::new();
    hasher.update(key.method.as_bytes());
    hasher.update(b" ");
    hasher.update(key.url.as_bytes());
    bucket.join(format!("{}.{ENTRY_EXT}", hex::encode(hasher.finalize())))
}

fn encode_entry(bucket: &str, key: &RequestKey, response: &Response) -> Result<Vec<u8>, StorageError> {
    let encoded = bincode::serde::encode_to_vec((key, response), bincode::config::standard())
        .map_err(|e| StorageError::Encode {
            bucket: bucket.to_string(),
            reason: e.to_string(),
        })?;
    Ok(zstd::encode_all(encoded.as_slice(), ZSTD_LEVEL)?)
}

fn write_entry(bucket: &Path, key: &RequestKey, bytes: &[u8]) -> Result<(), StorageError> {
    // Write-then-rename so a crash never leaves a truncated entry.
    let path = entry_path(bucket, key);
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, &path)?;
    Ok(())
}

fn load_bucket(path: &Path) -> Result<Bucket, StorageError> {
    let mut bucket = Bucket::new();
    for entry in fs::read_dir(path)? {
        let file = entry?.path();
        if file.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXT) {
            continue;
        }
        match read_entry(&file) {
            Ok((key, response)) => {
                bucket.insert(key, response);
            }
            Err(e) => warn!("storage: skipping {}: {e}", file.display()),
        }
    }
    Ok(bucket)
}

fn read_entry(path: &Path) -> Result<(RequestKey, Response), StorageError> {
    let decode_err = |reason: String| StorageError::Decode {
        path: path.display().to_string(),
        reason,
    };
    let compressed = fs::read(path)?;
    let encoded = zstd::decode_all(compressed.as_slice()).map_err(|e| decode_err(e.to_string()))?;
    let (entry, _) = bincode::serde::decode_from_slice::<(RequestKey, Response), _>(
        &encoded,
        bincode::config::standard(),
    )
    .map_err(|e| decode_err(e.to_string()))?;
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(url: &str) -> RequestKey {
        RequestKey {
            method: "GET".into(),
            url: url.into(),
        }
    }

    #[test]
    fn test_put_into_missing_bucket_is_noop() {
        let s = CacheStorage::in_memory();
        assert!(!s.put("gone", key("https://h.invalid/a.png"), Response::ok("x")).unwrap());
        assert!(!s.has("gone"));
    }

    #[test]
    fn test_open_put_match_delete() {
        let s = CacheStorage::in_memory();
        assert!(s.open("cache-v1").unwrap());
        assert!(!s.open("cache-v1").unwrap());
        s.put("cache-v1", key("https://h.invalid/a.png"), Response::ok("png")).unwrap();
        let hit = s.match_request("cache-v1", &key("https://h.invalid/a.png")).unwrap();
        assert_eq!(hit.body, b"png");
        assert!(s.match_request("cache-v1", &key("https://h.invalid/b.png")).is_none());
        assert_eq!(s.usage("cache-v1"), Some((1, 3)));
        assert!(s.delete("cache-v1").unwrap());
        assert!(!s.delete("cache-v1").unwrap());
        assert!(s.match_request("cache-v1", &key("https://h.invalid/a.png")).is_none());
    }

    #[test]
    fn test_last_writer_wins() {
        let s = CacheStorage::in_memory();
        s.open("b").unwrap();
        s.put("b", key("https://h.invalid/a.js"), Response::ok("one")).unwrap();
        s.put("b", key("https://h.invalid/a.js"), Response::ok("two")).unwrap();
        assert_eq!(s.entry_keys("b").len(), 1);
        assert_eq!(s.match_request("b", &key("https://h.invalid/a.js")).unwrap().body, b"two");
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let s = CacheStorage::open_dir(dir.path()).unwrap();
            s.put_all(
                "album-cache-v1.0.0",
                vec![
                    (key("https://h.invalid/a.js"), Response::ok("js")),
                    (key("https://h.invalid/b.css"), Response::ok("css")),
                ],
            )
            .unwrap();
            s.put("album-cache-v1.0.0", key("https://h.invalid/c.png"), Response::ok("png"))
                .unwrap();
            s.put("album-cache-v1.0.0", key("https://h.invalid/a.js"), Response::ok("js2"))
                .unwrap();
            s.open("old/bucket").unwrap();
            s.delete("old/bucket").unwrap();
        }
        let s = CacheStorage::open_dir(dir.path()).unwrap();
        assert_eq!(s.keys(), vec!["album-cache-v1.0.0".to_string()]);
        assert_eq!(s.entry_keys("album-cache-v1.0.0").len(), 3);
        assert_eq!(
            s.match_request("album-cache-v1.0.0", &key("https://h.invalid/a.js"))
                .unwrap()
                .body,
            b"js2"
        );
    }

    #[test]
    fn test_empty_bucket_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        CacheStorage::open_dir(dir.path()).unwrap().open("cache-v1").unwrap();
        let s = CacheStorage::open_dir(dir.path()).unwrap();
        assert!(s.has("cache-v1"));
        assert_eq!(s.usage("cache-v1"), Some((0, 0)));
    }

    #[test]
    fn test_lookalike_names_stay_separate() {
        let dir = tempfile::tempdir().unwrap();
        {
            let s = CacheStorage::open_dir(dir.path()).unwrap();
            s.put_all("album cache-v1", vec![(key("https://h.invalid/a.js"), Response::ok("space"))])
                .unwrap();
            s.put_all("album_cache-v1", vec![(key("https://h.invalid/a.js"), Response::ok("under"))])
                .unwrap();
            s.delete("album_cache-v1").unwrap();
        }
        let s = CacheStorage::open_dir(dir.path()).unwrap();
        assert_eq!(s.keys(), vec!["album cache-v1".to_string()]);
        assert_eq!(
            s.match_request("album cache-v1", &key("https://h.invalid/a.js"))
                .unwrap()
                .body,
            b"space"
        );
    }

    #[test]
    fn test_bucket_dir_names_round_trip() {
        for name in ["cache-v1", "a/b c", "..", "album_cache-v1", "アルバム-v2"] {
            let path = bucket_dir(Path::new("/tmp"), name);
            assert_eq!(path.parent(), Some(Path::new("/tmp")));
            assert_eq!(bucket_name(&path).as_deref(), Some(name));
        }
    }

    #[test]
    fn test_corrupt_entry_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        {
            let s = CacheStorage::open_dir(dir.path()).unwrap();
            s.put_all("cache-v1", vec![(key("https://h.invalid/a.js"), Response::ok("js"))])
                .unwrap();
        }
        let bucket = bucket_dir(dir.path(), "cache-v1");
        fs::write(bucket.join(format!("broken.{ENTRY_EXT}")), b"not zstd").unwrap();
        fs::write(dir.path().join("stray.bucket"), b"not a directory").unwrap();

        let s = CacheStorage::open_dir(dir.path()).unwrap();
        assert_eq!(s.keys(), vec!["cache-v1".to_string()]);
        assert_eq!(s.entry_keys("cache-v1"), vec![key("https://h.invalid/a.js")]);
    }

    #[test]
    fn test_put_writes_one_file_per_entry() {
        let dir = tempfile::tempdir().unwrap();
        let s = CacheStorage::open_dir(dir.path()).unwrap();
        s.open("cache-v1").unwrap();
        for i in 0..5 {
            s.put("cache-v1", key(&format!("https://h.invalid/{i}.png")), Response::ok("png"))
                .unwrap();
        }
        s.put("cache-v1", key("https://h.invalid/0.png"), Response::ok("again")).unwrap();
        let files = fs::read_dir(bucket_dir(dir.path(), "cache-v1")).unwrap().count();
        assert_eq!(files, 5);
    }

    #[test]
    fn test_lookup_does_not_wait_on_disk_writes() {
        let dir = tempfile::tempdir().unwrap();
        let s = CacheStorage::open_dir(dir.path()).unwrap();
        s.put_all("cache-v1", vec![(key("https://h.invalid/a.js"), Response::ok("js"))])
            .unwrap();
        // A writer in the middle of a disk write holds this guard.
        let _writing = s.disk();
        let hit = s.match_request("cache-v1", &key("https://h.invalid/a.js")).unwrap();
        assert_eq!(hit.body, b"js");
        assert_eq!(s.keys(), vec!["cache-v1".to_string()]);
    }

    #[test]
    fn test_failed_write_leaves_memory_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let s = CacheStorage::open_dir(dir.path()).unwrap();
        s.open("cache-v1").unwrap();
        // Replace the bucket directory with a plain file so writes fail.
        let bucket = bucket_dir(dir.path(), "cache-v1");
        fs::remove_dir_all(&bucket).unwrap();
        fs::write(&bucket, b"").unwrap();

        assert!(s.put("cache-v1", key("https://h.invalid/a.png"), Response::ok("png")).is_err());
        assert!(s.match_request("cache-v1", &key("https://h.invalid/a.png")).is_none());
        assert_eq!(s.usage("cache-v1"), Some((0, 0)));
    }

    #[test]
    fn test_failed_put_all_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let s = CacheStorage::open_dir(dir.path()).unwrap();
        fs::write(bucket_dir(dir.path(), "cache-v2"), b"").unwrap();

        let entries = vec![(key("https://h.invalid/a.js"), Response::ok("js"))];
        assert!(s.put_all("cache-v2", entries).is_err());
        assert!(!s.has("cache-v2"));
    }
}
