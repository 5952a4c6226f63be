//! Disk-persisted backend: every object and config blob becomes a file
//! under `<base_path>/<bucket>/...`.
//!
//! A `lazy_static` process-wide write lock, `OpenOptions`-based file
//! access, and `log::{info, warn}` narration of every write/read/delete.
//! Each object gets its own file rather than an offset/size index into one
//! big append-only log — this crate has no append-only-log requirement,
//! and a one-file-per-key layout makes the `resetOnClose == false` reload
//! (`load_all`) a plain directory walk.
//!
//! Object keys may contain `/`, which would otherwise turn into nested
//! directories and collide with sibling keys like `a` and `a/b`; keys are
//! percent-encoded (including the separator) into a single path segment to
//! sidestep that and any directory-traversal concern from a hostile key.

use super::backend::{Backend, PersistedBucket, PersistedObject};
use crate::error::{S3Error, S3ErrorCode, S3Result};
use lazy_static::lazy_static;
use log::{info, warn};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

lazy_static! {
    static ref DISK_WRITE_LOCK: Mutex<()> = Mutex::new(());
}

const ENCODE_SET: &AsciiSet = &CONTROLS.add(b'/').add(b'%').add(b'\\');

fn encode_key(key: &str) -> String {
    utf8_percent_encode(key, ENCODE_SET).to_string()
}

fn decode_key(encoded: &str) -> Option<String> {
    percent_encoding::percent_decode_str(encoded)
        .decode_utf8()
        .ok()
        .map(|s| s.to_string())
}

pub struct DiskBackend {
    base_path: PathBuf,
}

impl DiskBackend {
    pub fn new(base_path: impl Into<PathBuf>) -> S3Result<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    fn bucket_dir(&self, bucket: &str) -> PathBuf {
        self.base_path.join(bucket)
    }

    fn objects_dir(&self, bucket: &str) -> PathBuf {
        self.bucket_dir(bucket).join("objects")
    }

    fn config_dir(&self, bucket: &str) -> PathBuf {
        self.bucket_dir(bucket).join(".config")
    }

    fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.objects_dir(bucket).join(encode_key(key))
    }

    fn config_path(&self, bucket: &str, kind: &str) -> PathBuf {
        self.config_dir(bucket).join(kind)
    }
}

impl Backend for DiskBackend {
    fn write_object(&self, bucket: &str, key: &str, content: &[u8]) -> S3Result<()> {
        let _lock = DISK_WRITE_LOCK.lock().unwrap();
        let dir = self.objects_dir(bucket);
        fs::create_dir_all(&dir)?;
        fs::write(self.object_path(bucket, key), content)?;
        info!("wrote {} bytes for {}/{}", content.len(), bucket, key);
        Ok(())
    }

    fn read_object(&self, bucket: &str, key: &str) -> S3Result<Vec<u8>> {
        fs::read(self.object_path(bucket, key)).map_err(|e| {
            warn!("failed to read {}/{} from disk: {}", bucket, key, e);
            S3Error::new(S3ErrorCode::NoSuchKey)
        })
    }

    fn delete_object(&self, bucket: &str, key: &str) -> S3Result<()> {
        let _lock = DISK_WRITE_LOCK.lock().unwrap();
        match fs::remove_file(self.object_path(bucket, key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_config(&self, bucket: &str, kind: &str, bytes: &[u8]) -> S3Result<()> {
        let _lock = DISK_WRITE_LOCK.lock().unwrap();
        fs::create_dir_all(self.config_dir(bucket))?;
        fs::write(self.config_path(bucket, kind), bytes)?;
        Ok(())
    }

    fn delete_config(&self, bucket: &str, kind: &str) -> S3Result<()> {
        let _lock = DISK_WRITE_LOCK.lock().unwrap();
        match fs::remove_file(self.config_path(bucket, kind)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn delete_bucket(&self, bucket: &str) -> S3Result<()> {
        let _lock = DISK_WRITE_LOCK.lock().unwrap();
        match fs::remove_dir_all(self.bucket_dir(bucket)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn load_all(&self) -> S3Result<Vec<PersistedBucket>> {
        if !self.base_path.exists() {
            return Ok(Vec::new());
        }
        let mut buckets = Vec::new();
        for entry in fs::read_dir(&self.base_path)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            let objects = load_objects(&self.objects_dir(&name))?;
            let configs = load_configs(&self.config_dir(&name))?;
            buckets.push(PersistedBucket { name, objects, configs });
        }
        Ok(buckets)
    }

    fn reset(&self) -> S3Result<()> {
        let _lock = DISK_WRITE_LOCK.lock().unwrap();
        match fs::remove_dir_all(&self.base_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn load_objects(dir: &Path) -> S3Result<Vec<PersistedObject>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut objects = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let encoded = entry.file_name().to_string_lossy().to_string();
        let Some(key) = decode_key(&encoded) else { continue };
        let content = fs::read(entry.path())?;
        objects.push(PersistedObject { key, content });
    }
    Ok(objects)
}

fn load_configs(dir: &Path) -> S3Result<Vec<(String, Vec<u8>)>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut configs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let kind = entry.file_name().to_string_lossy().to_string();
        let bytes = fs::read(entry.path())?;
        configs.push((kind, bytes));
    }
    Ok(configs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::tempdir;

    #[test]
    #[serial]
    fn roundtrips_an_object_through_disk() {
        let dir = tempdir().unwrap();
        let backend = DiskBackend::new(dir.path()).unwrap();
        backend.write_object("bucket1", "a/b/c", b"hello").unwrap();
        assert_eq!(backend.read_object("bucket1", "a/b/c").unwrap(), b"hello");
        backend.delete_object("bucket1", "a/b/c").unwrap();
        assert!(backend.read_object("bucket1", "a/b/c").is_err());
    }

    #[test]
    #[serial]
    fn load_all_rebuilds_persisted_buckets() {
        let dir = tempdir().unwrap();
        {
            let backend = DiskBackend::new(dir.path()).unwrap();
            backend.write_object("bucket1", "key1", b"v1").unwrap();
            backend.write_config("bucket1", "cors", b"<CORSConfiguration/>").unwrap();
        }
        let backend = DiskBackend::new(dir.path()).unwrap();
        let buckets = backend.load_all().unwrap();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].name, "bucket1");
        assert_eq!(buckets[0].objects[0].key, "key1");
        assert_eq!(buckets[0].configs[0].0, "cors");
    }
}
