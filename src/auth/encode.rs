//! URI/query percent-encoding rules shared by SigV2 and SigV4 canonicalization.
//!
//! The `FRAGMENT`/`FRAGMENT_SLASH` AWS-specific character sets and
//! `uri_encode` build the same canonical encoding AWS clients sign against,
//! used here in the verify direction rather than the sign direction.

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

pub const FRAGMENT: &AsciiSet = &CONTROLS
    .add(b':')
    .add(b'?')
    .add(b'#')
    .add(b'[')
    .add(b']')
    .add(b'@')
    .add(b'!')
    .add(b'$')
    .add(b'&')
    .add(b'\'')
    .add(b'(')
    .add(b')')
    .add(b'*')
    .add(b'+')
    .add(b',')
    .add(b';')
    .add(b'=')
    .add(b'"')
    .add(b' ')
    .add(b'<')
    .add(b'>')
    .add(b'%')
    .add(b'{')
    .add(b'}')
    .add(b'|')
    .add(b'\\')
    .add(b'^')
    .add(b'`');

pub const FRAGMENT_SLASH: &AsciiSet = &FRAGMENT.add(b'/');

/// Encode following AWS's rules: normal characters pass through, `/` is
/// preserved unless `encode_slash` is set (used for path segments vs query
/// values).
pub fn uri_encode(s: &str, encode_slash: bool) -> String {
    if encode_slash {
        utf8_percent_encode(s, FRAGMENT_SLASH).to_string()
    } else {
        utf8_percent_encode(s, FRAGMENT).to_string()
    }
}

/// Re-encode an already-decoded request path per AWS's canonical URI rules.
pub fn canonical_uri_string(decoded_path: &str) -> String {
    uri_encode(decoded_path, false)
}

/// Parse a raw query string (`a=b&c=d`) into decoded key/value pairs,
/// preserving duplicates and original order.
pub fn parse_query_pairs(query: &str) -> Vec<(String, String)> {
    if query.is_empty() {
        return Vec::new();
    }
    query
        .split('&')
        .filter(|s| !s.is_empty())
        .map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let key = parts.next().unwrap_or("");
            let value = parts.next().unwrap_or("");
            (decode_query_component(key), decode_query_component(value))
        })
        .collect()
}

fn decode_query_component(s: &str) -> String {
    let plus_decoded = s.replace('+', " ");
    percent_encoding::percent_decode_str(&plus_decoded)
        .decode_utf8()
        .map(|cow| cow.to_string())
        .unwrap_or(plus_decoded)
}

/// Canonical query string per SigV4: sorted by key then value, each
/// component re-encoded, optionally excluding one key (the signature
/// parameter itself, which isn't part of what it signs).
pub fn canonical_query_string(pairs: &[(String, String)], exclude_key: Option<&str>) -> String {
    let mut filtered: Vec<(String, String)> = pairs
        .iter()
        .filter(|(k, _)| exclude_key.map_or(true, |ex| !k.eq_ignore_ascii_case(ex)))
        .cloned()
        .collect();
    filtered.sort();
    filtered
        .iter()
        .map(|(k, v)| format!("{}={}", uri_encode(k, true), uri_encode(v, true)))
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_pairs_roundtrip_with_sorting() {
        let pairs = parse_query_pairs("marker=someMarker&max-keys=20&prefix=somePrefix");
        let canonical = canonical_query_string(&pairs, None);
        assert_eq!(canonical, "marker=someMarker&max-keys=20&prefix=somePrefix");
    }

    #[test]
    fn excluded_key_is_dropped() {
        let pairs = parse_query_pairs("X-Amz-Signature=abc&X-Amz-Date=20240101T000000Z");
        let canonical = canonical_query_string(&pairs, Some("X-Amz-Signature"));
        assert_eq!(canonical, "X-Amz-Date=20240101T000000Z");
    }

    #[test]
    fn uri_encode_matches_documented_example() {
        assert_eq!(
            uri_encode("Filename (xx)%=", false),
            "Filename%20%28xx%29%25%3D"
        );
    }
}
