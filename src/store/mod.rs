//! Bucket/object data model and the high-level store contract.
//!
//! A thin `Store` facade in front of a swappable `Backend`, with per-bucket
//! state guarded independently so operations on different buckets never
//! contend with each other.

pub mod backend;
pub mod disk_backend;
pub mod listing;
pub mod memory_backend;
pub mod multipart;

use crate::error::{S3Error, S3ErrorCode, S3Result};
use backend::Backend;
use chrono::{DateTime, Utc};
pub use multipart::{MultipartUpload, StagedAttributes, UploadedPart};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct ObjectRecord {
    pub content: Vec<u8>,
    pub content_type: String,
    pub etag: String,
    pub last_modified: DateTime<Utc>,
    pub user_metadata: BTreeMap<String, String>,
    pub website_redirect_location: Option<String>,
    pub tags: Vec<Tag>,
}

impl Default for ObjectRecord {
    fn default() -> Self {
        Self {
            content: Vec::new(),
            content_type: "binary/octet-stream".to_string(),
            etag: hex::encode(md5::compute(b"").0),
            last_modified: Utc::now(),
            user_metadata: BTreeMap::new(),
            website_redirect_location: None,
            tags: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKind {
    Cors,
    Website,
    Policy,
    Lifecycle,
    Acl,
    Tagging,
}

impl ConfigKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ConfigKind::Cors => "cors",
            ConfigKind::Website => "website",
            ConfigKind::Policy => "policy",
            ConfigKind::Lifecycle => "lifecycle",
            ConfigKind::Acl => "acl",
            ConfigKind::Tagging => "tagging",
        }
    }

    /// The error a GET of an unset config of this kind fails with. `Acl`
    /// has no real analogue (the real service always answers a bucket ACL
    /// request with the default owner grant) and is handled specially by
    /// `Store::get_bucket_config`.
    pub fn not_found_error(self) -> S3ErrorCode {
        match self {
            ConfigKind::Cors => S3ErrorCode::NoSuchCORSConfiguration,
            ConfigKind::Website => S3ErrorCode::NoSuchWebsiteConfiguration,
            ConfigKind::Policy => S3ErrorCode::NoSuchBucketPolicy,
            ConfigKind::Lifecycle => S3ErrorCode::NoSuchLifecycleConfiguration,
            ConfigKind::Tagging => S3ErrorCode::NoSuchTagSet,
            ConfigKind::Acl => S3ErrorCode::AccessDenied,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataDirective {
    Copy,
    Replace,
}

#[derive(Debug, Clone, Default)]
pub struct PutAttributes {
    pub content_type: Option<String>,
    pub user_metadata: BTreeMap<String, String>,
    pub website_redirect_location: Option<String>,
    pub content_md5_base64: Option<String>,
    pub declared_length: Option<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct CopyOverrides {
    pub directive: MetadataDirective,
    pub content_type: Option<String>,
    pub user_metadata: BTreeMap<String, String>,
    pub website_redirect_location: Option<String>,
}

impl Default for MetadataDirective {
    fn default() -> Self {
        MetadataDirective::Copy
    }
}

#[derive(Debug, Clone)]
pub struct BucketSummary {
    pub name: String,
    pub creation_date: DateTime<Utc>,
}

struct BucketData {
    name: String,
    creation_date: DateTime<Utc>,
    objects: BTreeMap<String, ObjectRecord>,
    uploads: HashMap<String, MultipartUpload>,
    configs: HashMap<ConfigKind, Vec<u8>>,
}

impl BucketData {
    fn new(name: String, creation_date: DateTime<Utc>) -> Self {
        Self {
            name,
            creation_date,
            objects: BTreeMap::new(),
            uploads: HashMap::new(),
            configs: HashMap::new(),
        }
    }
}

pub struct Store {
    buckets: RwLock<HashMap<String, Arc<RwLock<BucketData>>>>,
    creation_order: RwLock<Vec<String>>,
    backend: Arc<dyn Backend>,
}

/// Bucket name validation.
pub fn validate_bucket_name(name: &str) -> S3Result<()> {
    let invalid = || S3Error::new(S3ErrorCode::InvalidBucketName);

    if name.len() < 3 || name.len() > 63 {
        return Err(invalid());
    }
    if name.contains("..") {
        return Err(invalid());
    }
    let is_allowed_char = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.';
    if !name.chars().all(is_allowed_char) {
        return Err(invalid());
    }
    let first = name.chars().next().unwrap();
    let last = name.chars().last().unwrap();
    if !(first.is_ascii_lowercase() || first.is_ascii_digit()) {
        return Err(invalid());
    }
    if !(last.is_ascii_lowercase() || last.is_ascii_digit()) {
        return Err(invalid());
    }
    for label in name.split('.') {
        if label.is_empty() {
            return Err(invalid());
        }
    }
    if looks_like_ip_address(name) {
        return Err(invalid());
    }
    Ok(())
}

fn looks_like_ip_address(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() == 4
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()) && p.parse::<u16>().map_or(false, |n| n <= 255))
}

impl Store {
    pub fn new(backend: Arc<dyn Backend>) -> S3Result<Self> {
        let store = Self {
            buckets: RwLock::new(HashMap::new()),
            creation_order: RwLock::new(Vec::new()),
            backend,
        };
        store.reload_from_backend()?;
        Ok(store)
    }

    fn reload_from_backend(&self) -> S3Result<()> {
        let persisted = self.backend.load_all()?;
        let mut buckets = self.buckets.write().unwrap();
        let mut order = self.creation_order.write().unwrap();
        for bucket in persisted {
            let now = Utc::now();
            let mut data = BucketData::new(bucket.name.clone(), now);
            for object in bucket.objects {
                let etag = hex::encode(md5::compute(&object.content).0);
                data.objects.insert(
                    object.key,
                    ObjectRecord {
                        content: object.content,
                        etag,
                        last_modified: now,
                        ..Default::default()
                    },
                );
            }
            for (kind_str, bytes) in bucket.configs {
                if let Some(kind) = config_kind_from_str(&kind_str) {
                    data.configs.insert(kind, bytes);
                }
            }
            order.push(bucket.name.clone());
            buckets.insert(bucket.name, Arc::new(RwLock::new(data)));
        }
        Ok(())
    }

    fn bucket_handle(&self, name: &str) -> S3Result<Arc<RwLock<BucketData>>> {
        self.buckets
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| S3Error::new(S3ErrorCode::NoSuchBucket))
    }

    pub fn bucket_exists(&self, name: &str) -> bool {
        self.buckets.read().unwrap().contains_key(name)
    }

    pub fn list_buckets(&self) -> Vec<BucketSummary> {
        let buckets = self.buckets.read().unwrap();
        let order = self.creation_order.read().unwrap();
        order
            .iter()
            .filter_map(|name| buckets.get(name))
            .map(|b| {
                let data = b.read().unwrap();
                BucketSummary {
                    name: data.name.clone(),
                    creation_date: data.creation_date,
                }
            })
            .collect()
    }

    pub fn create_bucket(&self, name: &str) -> S3Result<()> {
        validate_bucket_name(name)?;
        let mut buckets = self.buckets.write().unwrap();
        if buckets.contains_key(name) {
            return Err(S3Error::new(S3ErrorCode::BucketAlreadyOwnedByYou));
        }
        let mut order = self.creation_order.write().unwrap();
        buckets.insert(
            name.to_string(),
            Arc::new(RwLock::new(BucketData::new(name.to_string(), Utc::now()))),
        );
        order.push(name.to_string());
        Ok(())
    }

    pub fn delete_bucket(&self, name: &str) -> S3Result<()> {
        let mut buckets = self.buckets.write().unwrap();
        let handle = buckets
            .get(name)
            .ok_or_else(|| S3Error::new(S3ErrorCode::NoSuchBucket))?;
        if !handle.read().unwrap().objects.is_empty() {
            return Err(S3Error::new(S3ErrorCode::BucketNotEmpty));
        }
        buckets.remove(name);
        self.creation_order.write().unwrap().retain(|n| n != name);
        self.backend.delete_bucket(name)?;
        Ok(())
    }

    pub fn put_object(&self, bucket: &str, key: &str, content: Vec<u8>, attrs: PutAttributes) -> S3Result<ObjectRecord> {
        if let Some(declared) = attrs.declared_length {
            if declared != content.len() as u64 {
                return Err(S3Error::new(S3ErrorCode::IncompleteBody));
            }
        }
        let digest = md5::compute(&content);
        if let Some(expected_b64) = &attrs.content_md5_base64 {
            use base64::{engine::general_purpose::STANDARD, Engine};
            let expected = STANDARD
                .decode(expected_b64)
                .map_err(|_| S3Error::new(S3ErrorCode::InvalidDigest))?;
            if expected != digest.0 {
                return Err(S3Error::new(S3ErrorCode::BadDigest));
            }
        }

        let handle = self.bucket_handle(bucket)?;
        self.backend.write_object(bucket, key, &content)?;

        let mut data = handle.write().unwrap();
        let record = ObjectRecord {
            content,
            content_type: attrs.content_type.unwrap_or_else(|| "binary/octet-stream".to_string()),
            etag: hex::encode(digest.0),
            last_modified: Utc::now(),
            user_metadata: attrs.user_metadata,
            website_redirect_location: attrs.website_redirect_location,
            tags: Vec::new(),
        };
        data.objects.insert(key.to_string(), record.clone());
        Ok(record)
    }

    pub fn get_object(&self, bucket: &str, key: &str) -> S3Result<ObjectRecord> {
        let handle = self.bucket_handle(bucket)?;
        let data = handle.read().unwrap();
        data.objects
            .get(key)
            .cloned()
            .ok_or_else(|| S3Error::new(S3ErrorCode::NoSuchKey))
    }

    pub fn head_object(&self, bucket: &str, key: &str) -> S3Result<ObjectRecord> {
        self.get_object(bucket, key)
    }

    pub fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
        overrides: CopyOverrides,
    ) -> S3Result<ObjectRecord> {
        let source = self.get_object(src_bucket, src_key)?;

        let is_self_copy = src_bucket == dst_bucket && src_key == dst_key;
        if is_self_copy && overrides.directive == MetadataDirective::Copy {
            return Err(S3Error::with_message(
                S3ErrorCode::InvalidRequest,
                "This copy request is illegal because it is trying to copy an object to itself without changing the object's metadata.",
            ));
        }

        let (content_type, user_metadata, website_redirect_location) = match overrides.directive {
            MetadataDirective::Copy => (
                source.content_type.clone(),
                source.user_metadata.clone(),
                source.website_redirect_location.clone(),
            ),
            MetadataDirective::Replace => (
                overrides.content_type.unwrap_or_else(|| "application/octet-stream".to_string()),
                overrides.user_metadata,
                overrides.website_redirect_location,
            ),
        };

        let handle = self.bucket_handle(dst_bucket)?;
        self.backend.write_object(dst_bucket, dst_key, &source.content)?;
        let mut data = handle.write().unwrap();
        let record = ObjectRecord {
            content: source.content,
            content_type,
            etag: source.etag,
            last_modified: Utc::now(),
            user_metadata,
            website_redirect_location,
            tags: Vec::new(),
        };
        data.objects.insert(dst_key.to_string(), record.clone());
        Ok(record)
    }

    pub fn delete_object(&self, bucket: &str, key: &str) -> S3Result<()> {
        let handle = self.bucket_handle(bucket)?;
        handle.write().unwrap().objects.remove(key);
        self.backend.delete_object(bucket, key)?;
        Ok(())
    }

    pub fn delete_objects(&self, bucket: &str, keys: &[String]) -> S3Result<Vec<String>> {
        if keys.is_empty() {
            return Err(S3Error::new(S3ErrorCode::MalformedXML));
        }
        let handle = self.bucket_handle(bucket)?;
        for key in keys {
            handle.write().unwrap().objects.remove(key);
            self.backend.delete_object(bucket, key)?;
        }
        Ok(keys.to_vec())
    }

    pub fn put_object_tagging(&self, bucket: &str, key: &str, tags: Vec<Tag>) -> S3Result<()> {
        let handle = self.bucket_handle(bucket)?;
        let mut data = handle.write().unwrap();
        let object = data
            .objects
            .get_mut(key)
            .ok_or_else(|| S3Error::new(S3ErrorCode::NoSuchKey))?;
        object.tags = tags;
        Ok(())
    }

    pub fn get_object_tagging(&self, bucket: &str, key: &str) -> S3Result<Vec<Tag>> {
        Ok(self.get_object(bucket, key)?.tags)
    }

    pub fn delete_object_tagging(&self, bucket: &str, key: &str) -> S3Result<()> {
        let handle = self.bucket_handle(bucket)?;
        let mut data = handle.write().unwrap();
        let object = data
            .objects
            .get_mut(key)
            .ok_or_else(|| S3Error::new(S3ErrorCode::NoSuchKey))?;
        object.tags.clear();
        Ok(())
    }

    pub fn get_bucket_config(&self, bucket: &str, kind: ConfigKind) -> S3Result<Vec<u8>> {
        let handle = self.bucket_handle(bucket)?;
        let data = handle.read().unwrap();
        match data.configs.get(&kind) {
            Some(bytes) => Ok(bytes.clone()),
            None if kind == ConfigKind::Acl => Ok(default_acl_xml()),
            None => Err(S3Error::new(kind.not_found_error())),
        }
    }

    pub fn put_bucket_config(&self, bucket: &str, kind: ConfigKind, bytes: Vec<u8>) -> S3Result<()> {
        let handle = self.bucket_handle(bucket)?;
        self.backend.write_config(bucket, kind.as_str(), &bytes)?;
        handle.write().unwrap().configs.insert(kind, bytes);
        Ok(())
    }

    pub fn delete_bucket_config(&self, bucket: &str, kind: ConfigKind) -> S3Result<()> {
        let handle = self.bucket_handle(bucket)?;
        self.backend.delete_config(bucket, kind.as_str())?;
        handle.write().unwrap().configs.remove(&kind);
        Ok(())
    }

    pub fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
        start_after_exclusive: Option<&str>,
        max_keys: usize,
    ) -> S3Result<listing::ListingResult> {
        let handle = self.bucket_handle(bucket)?;
        let data = handle.read().unwrap();
        Ok(listing::list(&data.objects, prefix, delimiter, start_after_exclusive, max_keys))
    }

    pub fn create_multipart_upload(&self, bucket: &str, key: &str, attrs: StagedAttributes) -> S3Result<String> {
        let handle = self.bucket_handle(bucket)?;
        let mut data = handle.write().unwrap();
        let upload = MultipartUpload::new(bucket.to_string(), key.to_string(), attrs, Utc::now());
        let upload_id = upload.upload_id.clone();
        data.uploads.insert(upload_id.clone(), upload);
        Ok(upload_id)
    }

    pub fn upload_part(&self, bucket: &str, upload_id: &str, part_number: u32, content: Vec<u8>) -> S3Result<String> {
        let handle = self.bucket_handle(bucket)?;
        let mut data = handle.write().unwrap();
        let upload = data
            .uploads
            .get_mut(upload_id)
            .ok_or_else(|| S3Error::new(S3ErrorCode::NoSuchUpload))?;
        upload.put_part(part_number, content, Utc::now())
    }

    pub fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        requested_parts: &[(u32, String)],
    ) -> S3Result<ObjectRecord> {
        let handle = self.bucket_handle(bucket)?;
        let mut data = handle.write().unwrap();
        let upload = data
            .uploads
            .get(upload_id)
            .ok_or_else(|| S3Error::new(S3ErrorCode::NoSuchUpload))?;
        let (content, etag) = upload.complete(requested_parts)?;
        let attributes = upload.attributes.clone();

        self.backend.write_object(bucket, key, &content)?;
        let record = ObjectRecord {
            content,
            content_type: if attributes.content_type.is_empty() {
                "binary/octet-stream".to_string()
            } else {
                attributes.content_type
            },
            etag,
            last_modified: Utc::now(),
            user_metadata: attributes.user_metadata,
            website_redirect_location: attributes.website_redirect_location,
            tags: Vec::new(),
        };
        data.objects.insert(key.to_string(), record.clone());
        data.uploads.remove(upload_id);
        Ok(record)
    }

    pub fn abort_multipart_upload(&self, bucket: &str, upload_id: &str) -> S3Result<()> {
        let handle = self.bucket_handle(bucket)?;
        let mut data = handle.write().unwrap();
        data.uploads
            .remove(upload_id)
            .ok_or_else(|| S3Error::new(S3ErrorCode::NoSuchUpload))?;
        Ok(())
    }

    pub fn list_multipart_uploads(
        &self,
        bucket: &str,
        key_marker: Option<&str>,
        upload_id_marker: Option<&str>,
        max_uploads: usize,
    ) -> S3Result<(Vec<(String, String, DateTime<Utc>)>, bool)> {
        let handle = self.bucket_handle(bucket)?;
        let data = handle.read().unwrap();
        let mut entries: Vec<(String, String, DateTime<Utc>)> = data
            .uploads
            .values()
            .map(|u| (u.key.clone(), u.upload_id.clone(), u.initiated))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

        let start = match (key_marker, upload_id_marker) {
            (Some(k), Some(id)) => entries
                .iter()
                .position(|(key, upload_id, _)| (key.as_str(), upload_id.as_str()) > (k, id))
                .unwrap_or(entries.len()),
            (Some(k), None) => entries.iter().position(|(key, _, _)| key.as_str() > k).unwrap_or(entries.len()),
            _ => 0,
        };
        let remaining = &entries[start.min(entries.len())..];
        let truncated = remaining.len() > max_uploads;
        let page = remaining.iter().take(max_uploads).cloned().collect();
        Ok((page, truncated))
    }

    pub fn list_parts(
        &self,
        bucket: &str,
        upload_id: &str,
        part_number_marker: u32,
        max_parts: usize,
    ) -> S3Result<(Vec<(u32, UploadedPart)>, bool)> {
        let handle = self.bucket_handle(bucket)?;
        let data = handle.read().unwrap();
        let upload = data
            .uploads
            .get(upload_id)
            .ok_or_else(|| S3Error::new(S3ErrorCode::NoSuchUpload))?;
        let remaining: Vec<(u32, UploadedPart)> = upload
            .parts
            .range((part_number_marker + 1)..)
            .map(|(n, p)| (*n, p.clone()))
            .collect();
        let truncated = remaining.len() > max_parts;
        let page = remaining.into_iter().take(max_parts).collect();
        Ok((page, truncated))
    }

    pub fn reset(&self) -> S3Result<()> {
        self.buckets.write().unwrap().clear();
        self.creation_order.write().unwrap().clear();
        self.backend.reset()
    }
}

fn config_kind_from_str(s: &str) -> Option<ConfigKind> {
    match s {
        "cors" => Some(ConfigKind::Cors),
        "website" => Some(ConfigKind::Website),
        "policy" => Some(ConfigKind::Policy),
        "lifecycle" => Some(ConfigKind::Lifecycle),
        "acl" => Some(ConfigKind::Acl),
        "tagging" => Some(ConfigKind::Tagging),
        _ => None,
    }
}

fn default_acl_xml() -> Vec<u8> {
    b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<AccessControlPolicy xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\"><Owner><ID>local</ID><DisplayName>local</DisplayName></Owner><AccessControlList><Grant><Grantee xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\" xsi:type=\"CanonicalUser\"><ID>local</ID><DisplayName>local</DisplayName></Grantee><Permission>FULL_CONTROL</Permission></Grant></AccessControlList></AccessControlPolicy>".to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use memory_backend::MemoryBackend;

    fn store() -> Store {
        Store::new(Arc::new(MemoryBackend::new())).unwrap()
    }

    #[test]
    fn bucket_name_validation_rejects_ip_like_and_dotted_edges() {
        assert!(validate_bucket_name("my-bucket").is_ok());
        assert!(validate_bucket_name("ab").is_err());
        assert!(validate_bucket_name("192.168.1.1").is_err());
        assert!(validate_bucket_name(".leading-dot").is_err());
        assert!(validate_bucket_name("trailing-dot.").is_err());
        assert!(validate_bucket_name("double..dot").is_err());
        assert!(validate_bucket_name("Has-Upper-Case").is_err());
    }

    #[test]
    fn delete_bucket_requires_empty_object_set() {
        let s = store();
        s.create_bucket("b").unwrap();
        s.put_object("b", "dir/file", b"x".to_vec(), PutAttributes::default()).unwrap();
        assert_eq!(s.delete_bucket("b").unwrap_err().code, S3ErrorCode::BucketNotEmpty);
        s.delete_object("b", "dir/file").unwrap();
        assert!(s.delete_bucket("b").is_ok());
    }

    #[test]
    fn put_object_validates_content_md5_and_length() {
        let s = store();
        s.create_bucket("b").unwrap();
        let err = s
            .put_object(
                "b",
                "k",
                b"hello".to_vec(),
                PutAttributes {
                    declared_length: Some(999),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert_eq!(err.code, S3ErrorCode::IncompleteBody);

        use base64::{engine::general_purpose::STANDARD, Engine};
        let good_md5 = STANDARD.encode(md5::compute(b"hello").0);
        let record = s
            .put_object(
                "b",
                "k",
                b"hello".to_vec(),
                PutAttributes {
                    content_md5_base64: Some(good_md5),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(record.etag, hex::encode(md5::compute(b"hello").0));
    }

    #[test]
    fn self_copy_without_metadata_change_is_rejected() {
        let s = store();
        s.create_bucket("b").unwrap();
        s.put_object("b", "k", b"hello".to_vec(), PutAttributes::default()).unwrap();
        let err = s
            .copy_object("b", "k", "b", "k", CopyOverrides::default())
            .unwrap_err();
        assert_eq!(err.code, S3ErrorCode::InvalidRequest);

        let ok = s.copy_object(
            "b",
            "k",
            "b",
            "k",
            CopyOverrides {
                directive: MetadataDirective::Replace,
                content_type: Some("text/plain".into()),
                ..Default::default()
            },
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn delete_objects_rejects_empty_list() {
        let s = store();
        s.create_bucket("b").unwrap();
        assert_eq!(s.delete_objects("b", &[]).unwrap_err().code, S3ErrorCode::MalformedXML);
    }

    #[test]
    fn get_bucket_config_acl_has_a_default_instead_of_erroring() {
        let s = store();
        s.create_bucket("b").unwrap();
        assert!(s.get_bucket_config("b", ConfigKind::Acl).is_ok());
        assert_eq!(
            s.get_bucket_config("b", ConfigKind::Cors).unwrap_err().code,
            S3ErrorCode::NoSuchCORSConfiguration
        );
    }
}
