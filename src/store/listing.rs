//! The paged, delimited, prefix-filtered listing algorithm.
//!
//! Shared by both `listObjects` (v1, marker-based) and `listObjectsV2`
//! (token-based) — the two differ only in how the handlers in
//! `handlers::bucket` resolve their starting point and label the result,
//! not in the traversal itself. `MaxKeys` counts against the sum of
//! Contents + CommonPrefixes for both versions.

use super::ObjectRecord;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

pub const MAX_MAX_KEYS: usize = 1000;

#[derive(Debug, Clone)]
pub struct ListingEntry {
    pub key: String,
    pub etag: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct ListingResult {
    pub contents: Vec<ListingEntry>,
    pub common_prefixes: Vec<String>,
    pub is_truncated: bool,
    /// The last key or common prefix emitted, used by callers to build
    /// `NextMarker` (v1, delimiter-only) or `NextContinuationToken` (v2).
    pub last_emitted: Option<String>,
}

/// Clamp a client-supplied `max-keys` to the server's ceiling. A value
/// above 1000 is clamped to 1000 internally but still echoed back as the
/// client's originally requested value in the response body.
pub fn clamp_max_keys(requested: Option<usize>) -> usize {
    requested.unwrap_or(MAX_MAX_KEYS).min(MAX_MAX_KEYS)
}

/// Run the listing algorithm over a snapshot of a bucket's key space.
///
/// `start_after_exclusive` is the already-resolved starting point: `Marker`
/// for v1, `ContinuationToken` (decoded) or `StartAfter` for v2.
pub fn list(
    objects: &BTreeMap<String, ObjectRecord>,
    prefix: &str,
    delimiter: Option<&str>,
    start_after_exclusive: Option<&str>,
    max_keys: usize,
) -> ListingResult {
    let candidates: Vec<&String> = objects
        .keys()
        .filter(|k| k.starts_with(prefix))
        .filter(|k| start_after_exclusive.map_or(true, |after| k.as_str() > after))
        .collect();

    let mut result = ListingResult::default();
    if max_keys == 0 {
        return result;
    }

    let mut idx = 0;
    while idx < candidates.len() {
        if result.contents.len() + result.common_prefixes.len() >= max_keys {
            result.is_truncated = true;
            break;
        }

        let key = candidates[idx];
        if let Some(delim) = delimiter {
            if !delim.is_empty() {
                let rest = &key[prefix.len()..];
                if let Some(pos) = rest.find(delim) {
                    let common_prefix = format!("{prefix}{}{delim}", &rest[..pos]);
                    if result.common_prefixes.last() != Some(&common_prefix) {
                        result.common_prefixes.push(common_prefix.clone());
                        result.last_emitted = Some(common_prefix);
                    }
                    idx += 1;
                    continue;
                }
            }
        }

        let record = objects.get(key).expect("key came from this map");
        result.contents.push(ListingEntry {
            key: key.clone(),
            etag: record.etag.clone(),
            size: record.content.len() as u64,
            last_modified: record.last_modified,
        });
        result.last_emitted = Some(key.clone());
        idx += 1;
    }

    result
}

/// Encode a continuation token. Opaque to clients, but a deterministic,
/// reversible encoding of the last emitted key (see SPEC_FULL.md's Open
/// Question resolution).
pub fn encode_continuation_token(last_key: &str) -> String {
    BASE64.encode(last_key.as_bytes())
}

/// Decode a continuation token back into the key it was derived from.
pub fn decode_continuation_token(token: &str) -> Option<String> {
    let bytes = BASE64.decode(token).ok()?;
    String::from_utf8(bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ObjectRecord;

    fn obj() -> ObjectRecord {
        ObjectRecord {
            content: b"x".to_vec(),
            ..Default::default()
        }
    }

    fn bucket(keys: &[&str]) -> BTreeMap<String, ObjectRecord> {
        keys.iter().map(|k| (k.to_string(), obj())).collect()
    }

    #[test]
    fn prefix_and_delimiter_collapse_to_one_common_prefix() {
        let objects = bucket(&["akey1", "akey2", "akey3", "key/key1", "key1", "key2", "key3"]);
        let result = list(&objects, "key", None, None, MAX_MAX_KEYS);
        assert_eq!(result.contents.len(), 4);
        assert!(result.contents.iter().all(|c| !c.key.starts_with("akey")));

        let result = list(&objects, "", Some("/"), None, MAX_MAX_KEYS);
        assert_eq!(result.contents.len(), 6);
        assert_eq!(result.common_prefixes, vec!["key/".to_string()]);
    }

    #[test]
    fn max_keys_zero_is_empty_and_not_truncated() {
        let objects = bucket(&["a", "b"]);
        let result = list(&objects, "", None, None, 0);
        assert!(result.contents.is_empty());
        assert!(!result.is_truncated);
    }

    #[test]
    fn continuation_roundtrips_across_a_truncated_listing() {
        let keys: Vec<String> = (0..500).map(|i| format!("key{i:03}")).collect();
        let refs: Vec<&str> = keys.iter().map(|s| s.as_str()).collect();
        let objects = bucket(&refs);

        let first = list(&objects, "", None, None, 400);
        assert!(first.is_truncated);
        assert_eq!(first.contents.len(), 400);
        let token = encode_continuation_token(first.last_emitted.as_ref().unwrap());

        let decoded = decode_continuation_token(&token).unwrap();
        let second = list(&objects, "", None, Some(&decoded), MAX_MAX_KEYS);
        assert!(!second.is_truncated);
        assert_eq!(second.contents.len(), 100);
    }

    #[test]
    fn lexicographic_ordering_surfaces_common_prefix_after_dotted_key() {
        let objects = bucket(&["prefix.foo", "prefix/bar", "prefix/baz"]);
        let result = list(&objects, "", Some("/"), Some("prefix.foo"), MAX_MAX_KEYS);
        assert_eq!(result.common_prefixes, vec!["prefix/".to_string()]);
        assert!(result.contents.is_empty());
    }
}
