//! Multipart upload staging and assembly.

use crate::error::{S3Error, S3ErrorCode, S3Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

pub const MIN_PART_NUMBER: u32 = 1;
pub const MAX_PART_NUMBER: u32 = 10_000;

#[derive(Debug, Clone)]
pub struct UploadedPart {
    pub etag: String,
    pub size: u64,
    pub content: Vec<u8>,
    pub last_modified: DateTime<Utc>,
}

/// Metadata captured at `initiateMultipartUpload`, applied to the object
/// once the upload completes.
#[derive(Debug, Clone, Default)]
pub struct StagedAttributes {
    pub content_type: String,
    pub user_metadata: BTreeMap<String, String>,
    pub website_redirect_location: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MultipartUpload {
    pub upload_id: String,
    pub bucket: String,
    pub key: String,
    pub initiated: DateTime<Utc>,
    pub attributes: StagedAttributes,
    pub parts: BTreeMap<u32, UploadedPart>,
}

impl MultipartUpload {
    pub fn new(bucket: String, key: String, attributes: StagedAttributes, now: DateTime<Utc>) -> Self {
        Self {
            upload_id: uuid::Uuid::new_v4().simple().to_string(),
            bucket,
            key,
            initiated: now,
            attributes,
            parts: BTreeMap::new(),
        }
    }

    pub fn put_part(&mut self, part_number: u32, content: Vec<u8>, now: DateTime<Utc>) -> S3Result<String> {
        if !(MIN_PART_NUMBER..=MAX_PART_NUMBER).contains(&part_number) {
            return Err(S3Error::with_message(
                S3ErrorCode::InvalidArgument,
                format!("part number must be between {MIN_PART_NUMBER} and {MAX_PART_NUMBER}"),
            ));
        }
        let digest = md5::compute(&content);
        let etag = hex::encode(digest.0);
        let size = content.len() as u64;
        self.parts.insert(
            part_number,
            UploadedPart {
                etag: etag.clone(),
                size,
                content,
                last_modified: now,
            },
        );
        Ok(etag)
    }

    /// Assemble the requested parts in ascending order, validating
    /// presence and client-supplied ETags, and compute the composite
    /// `md5(concat(part md5s))-N` ETag.
    pub fn complete(&self, requested_parts: &[(u32, String)]) -> S3Result<(Vec<u8>, String)> {
        if requested_parts.is_empty() {
            return Err(S3Error::new(S3ErrorCode::MalformedXML));
        }

        let mut previous = 0u32;
        for (number, _) in requested_parts {
            if *number <= previous && previous != 0 {
                return Err(S3Error::new(S3ErrorCode::InvalidPartOrder));
            }
            previous = *number;
        }

        let mut assembled = Vec::new();
        let mut digest_concat = Vec::new();
        for (number, client_etag) in requested_parts {
            let part = self
                .parts
                .get(number)
                .ok_or_else(|| S3Error::new(S3ErrorCode::InvalidPart))?;
            let normalized_client = client_etag.trim_matches('"');
            if normalized_client != part.etag {
                return Err(S3Error::new(S3ErrorCode::InvalidPart));
            }
            assembled.extend_from_slice(&part.content);
            digest_concat.extend_from_slice(&md5::compute(&part.content).0);
        }

        let final_etag = format!(
            "{}-{}",
            hex::encode(md5::compute(&digest_concat).0),
            requested_parts.len()
        );
        Ok((assembled, final_etag))
    }
}
