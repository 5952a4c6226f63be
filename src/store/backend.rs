//! Pluggable persistence for object content bytes and config blobs.
//!
//! The in-memory index in `store::mod` owns bucket/object *metadata*
//! unconditionally, while a `Backend` decides whether the actual bytes
//! outlive the process.

use crate::error::S3Result;

/// A durable (or not) place to stash the bytes behind a bucket/key pair and
/// a bucket's configuration blobs.
///
/// Implementors need not be transactional: the `Store` above this trait
/// already serializes writes to the same bucket under its own lock (see
/// spec's concurrency model), so a `Backend` only has to make a single
/// `write_object`/`write_config` call atomic with respect to a concurrent
/// `read_object` of the same key.
pub trait Backend: Send + Sync {
    fn write_object(&self, bucket: &str, key: &str, content: &[u8]) -> S3Result<()>;
    fn read_object(&self, bucket: &str, key: &str) -> S3Result<Vec<u8>>;
    fn delete_object(&self, bucket: &str, key: &str) -> S3Result<()>;

    fn write_config(&self, bucket: &str, kind: &str, bytes: &[u8]) -> S3Result<()>;
    fn delete_config(&self, bucket: &str, kind: &str) -> S3Result<()>;

    fn delete_bucket(&self, bucket: &str) -> S3Result<()>;

    /// Load the full persisted state on startup, used to rebuild the
    /// in-memory index when `resetOnClose == false`. Implementations with
    /// no persistence (e.g. the memory backend) return an empty list.
    fn load_all(&self) -> S3Result<Vec<PersistedBucket>>;

    /// Wipe everything this backend holds. Called on shutdown when
    /// `resetOnClose == true`.
    fn reset(&self) -> S3Result<()>;
}

pub struct PersistedBucket {
    pub name: String,
    pub objects: Vec<PersistedObject>,
    pub configs: Vec<(String, Vec<u8>)>,
}

pub struct PersistedObject {
    pub key: String,
    pub content: Vec<u8>,
}
