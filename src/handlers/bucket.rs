//! Bucket-level operations: CRUD, listing, and bucket configuration
//! (cors/website/policy/lifecycle/acl/tagging/location) GET/PUT/DELETE.

use super::QueryFlags;
use crate::app_state::AppState;
use crate::auth::RequestParts;
use crate::cors;
use crate::error::{S3Error, S3ErrorCode, S3Result};
use crate::router::ResolvedRequest;
use crate::store::{listing, ConfigKind};
use crate::website;
use crate::xml_util::escape;
use actix_web::HttpResponse;
use chrono::{DateTime, Utc};

pub fn iso8601(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

pub fn config_kind_from_query(query: &QueryFlags) -> Option<ConfigKind> {
    if query.has("cors") {
        Some(ConfigKind::Cors)
    } else if query.has("website") {
        Some(ConfigKind::Website)
    } else if query.has("policy") {
        Some(ConfigKind::Policy)
    } else if query.has("lifecycle") {
        Some(ConfigKind::Lifecycle)
    } else if query.has("acl") {
        Some(ConfigKind::Acl)
    } else if query.has("tagging") {
        Some(ConfigKind::Tagging)
    } else {
        None
    }
}

pub fn list_buckets(state: &AppState) -> S3Result<HttpResponse> {
    let buckets = state.store.list_buckets();
    let entries: String = buckets
        .iter()
        .map(|b| {
            format!(
                "<Bucket><Name>{}</Name><CreationDate>{}</CreationDate></Bucket>",
                escape(&b.name),
                iso8601(b.creation_date)
            )
        })
        .collect();
    let xml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<ListAllMyBucketsResult xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\"><Owner><ID>local</ID><DisplayName>local</DisplayName></Owner><Buckets>{entries}</Buckets></ListAllMyBucketsResult>"
    );
    Ok(HttpResponse::Ok().content_type("application/xml").body(xml))
}

pub fn create_bucket(state: &AppState, bucket: &str) -> S3Result<HttpResponse> {
    state.store.create_bucket(bucket)?;
    Ok(HttpResponse::Ok().insert_header(("Location", format!("/{bucket}"))).finish())
}

pub fn delete_bucket(state: &AppState, bucket: &str) -> S3Result<HttpResponse> {
    state.store.delete_bucket(bucket)?;
    Ok(HttpResponse::NoContent().finish())
}

pub fn head_bucket(state: &AppState, bucket: &str) -> S3Result<HttpResponse> {
    if state.store.bucket_exists(bucket) {
        Ok(HttpResponse::Ok().finish())
    } else {
        Err(S3Error::new(S3ErrorCode::NoSuchBucket))
    }
}

pub fn list_objects(state: &AppState, query: &QueryFlags, bucket: &str) -> S3Result<HttpResponse> {
    if !state.store.bucket_exists(bucket) {
        return Err(S3Error::new(S3ErrorCode::NoSuchBucket));
    }

    let prefix = query.get("prefix").unwrap_or("").to_string();
    let delimiter = query.get("delimiter").map(|s| s.to_string());
    let requested_max_keys = query.get("max-keys").and_then(|s| s.parse::<usize>().ok());
    let max_keys = listing::clamp_max_keys(requested_max_keys);
    let is_v2 = query.get("list-type") == Some("2");

    let start_after = if is_v2 {
        query
            .get("continuation-token")
            .and_then(listing::decode_continuation_token)
            .or_else(|| query.get("start-after").map(|s| s.to_string()))
    } else {
        query.get("marker").map(|s| s.to_string())
    };

    let result = state
        .store
        .list_objects(bucket, &prefix, delimiter.as_deref(), start_after.as_deref(), max_keys)?;

    let contents: String = result
        .contents
        .iter()
        .map(|e| {
            format!(
                "<Contents><Key>{}</Key><LastModified>{}</LastModified><ETag>&quot;{}&quot;</ETag><Size>{}</Size><StorageClass>STANDARD</StorageClass></Contents>",
                escape(&e.key),
                iso8601(e.last_modified),
                e.etag,
                e.size,
            )
        })
        .collect();
    let common_prefixes: String = result
        .common_prefixes
        .iter()
        .map(|p| format!("<CommonPrefixes><Prefix>{}</Prefix></CommonPrefixes>", escape(p)))
        .collect();

    let xml = if is_v2 {
        let key_count = result.contents.len() + result.common_prefixes.len();
        let continuation_echo = query
            .get("continuation-token")
            .map(|t| format!("<ContinuationToken>{}</ContinuationToken>", escape(t)))
            .unwrap_or_default();
        let next_token = if result.is_truncated {
            result
                .last_emitted
                .as_deref()
                .map(|k| format!("<NextContinuationToken>{}</NextContinuationToken>", listing::encode_continuation_token(k)))
                .unwrap_or_default()
        } else {
            String::new()
        };
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<ListBucketResult xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\"><Name>{}</Name><Prefix>{}</Prefix><KeyCount>{}</KeyCount><MaxKeys>{}</MaxKeys><IsTruncated>{}</IsTruncated>{continuation_echo}{next_token}{contents}{common_prefixes}</ListBucketResult>",
            escape(bucket), escape(&prefix), key_count, requested_max_keys.unwrap_or(max_keys), result.is_truncated,
        )
    } else {
        let next_marker = if delimiter.is_some() {
            result
                .last_emitted
                .as_deref()
                .map(|k| format!("<NextMarker>{}</NextMarker>", escape(k)))
                .unwrap_or_default()
        } else {
            String::new()
        };
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<ListBucketResult xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\"><Name>{}</Name><Prefix>{}</Prefix><Marker>{}</Marker><MaxKeys>{}</MaxKeys><IsTruncated>{}</IsTruncated>{next_marker}{contents}{common_prefixes}</ListBucketResult>",
            escape(bucket), escape(&prefix), escape(start_after.as_deref().unwrap_or("")), requested_max_keys.unwrap_or(max_keys), result.is_truncated,
        )
    };

    Ok(HttpResponse::Ok().content_type("application/xml").body(xml))
}

pub fn get_config(state: &AppState, bucket: &str, kind: ConfigKind) -> S3Result<HttpResponse> {
    if kind == ConfigKind::Tagging {
        let bytes = state.store.get_bucket_config(bucket, kind)?;
        return Ok(HttpResponse::Ok().content_type("application/xml").body(bytes));
    }
    let bytes = state.store.get_bucket_config(bucket, kind)?;
    Ok(HttpResponse::Ok().content_type("application/xml").body(bytes))
}

pub fn put_config(state: &AppState, bucket: &str, kind: ConfigKind, body: Vec<u8>) -> S3Result<HttpResponse> {
    match kind {
        ConfigKind::Cors => {
            cors::parse(&body)?;
        }
        ConfigKind::Website => {
            website::parse(&body)?;
        }
        _ => {}
    }
    state.store.put_bucket_config(bucket, kind, body)?;
    Ok(HttpResponse::Ok().finish())
}

pub fn delete_config(state: &AppState, bucket: &str, kind: ConfigKind) -> S3Result<HttpResponse> {
    state.store.delete_bucket_config(bucket, kind)?;
    Ok(HttpResponse::NoContent().finish())
}

/// CORS preflight (`OPTIONS`), handled ahead of authentication since a
/// preflight request is never signed.
pub fn preflight(state: &AppState, resolved: &ResolvedRequest, parts: &RequestParts) -> S3Result<HttpResponse> {
    let Some(bucket) = &resolved.bucket else {
        return Err(S3Error::new(S3ErrorCode::AccessDenied));
    };
    let origin = parts.header("origin").unwrap_or("");
    let requested_method = parts.header("access-control-request-method").unwrap_or("");
    let requested_headers: Vec<String> = parts
        .header("access-control-request-headers")
        .map(|h| h.split(',').map(|s| s.trim().to_ascii_lowercase()).collect())
        .unwrap_or_default();

    let config_bytes = state
        .store
        .get_bucket_config(bucket, ConfigKind::Cors)
        .map_err(|_| S3Error::with_message(S3ErrorCode::AccessDenied, "CORS Rules are not supported for this origin"))?;
    let config = cors::parse(&config_bytes)?;
    let resp = cors::match_preflight(&config, origin, requested_method, &requested_headers)?;

    Ok(HttpResponse::Ok()
        .insert_header(("Access-Control-Allow-Origin", resp.allow_origin))
        .insert_header(("Access-Control-Allow-Methods", resp.allow_methods.join(", ")))
        .insert_header(("Access-Control-Allow-Headers", resp.allow_headers.join(", ")))
        .insert_header(("Access-Control-Max-Age", resp.max_age_seconds.unwrap_or(0).to_string()))
        .finish())
}
