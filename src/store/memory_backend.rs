//! No-op backend: content lives only in the in-memory index.
//!
//! Used by tests (`app_state::new_for_testing`) and by any configuration
//! that leaves `directory` unset.

use super::backend::{Backend, PersistedBucket};
use crate::error::S3Result;

#[derive(Default)]
pub struct MemoryBackend;

impl MemoryBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Backend for MemoryBackend {
    fn write_object(&self, _bucket: &str, _key: &str, _content: &[u8]) -> S3Result<()> {
        Ok(())
    }

    fn read_object(&self, _bucket: &str, _key: &str) -> S3Result<Vec<u8>> {
        Ok(Vec::new())
    }

    fn delete_object(&self, _bucket: &str, _key: &str) -> S3Result<()> {
        Ok(())
    }

    fn write_config(&self, _bucket: &str, _kind: &str, _bytes: &[u8]) -> S3Result<()> {
        Ok(())
    }

    fn delete_config(&self, _bucket: &str, _kind: &str) -> S3Result<()> {
        Ok(())
    }

    fn delete_bucket(&self, _bucket: &str) -> S3Result<()> {
        Ok(())
    }

    fn load_all(&self) -> S3Result<Vec<PersistedBucket>> {
        Ok(Vec::new())
    }

    fn reset(&self) -> S3Result<()> {
        Ok(())
    }
}
