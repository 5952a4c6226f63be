//! AWS Signature Version 4 verification (header and presigned-query forms).
//!
//! Uses the standard SigV4 canonicalization rules (`canonical_uri_string`,
//! `canonical_query_string`, the
//! `kSecret -> kDate -> kRegion -> kService -> kSigning` key-derivation
//! chain) in the verify direction: rebuild the string the *client* must
//! have signed and compare it against the signature they sent, instead of
//! attaching one to an outgoing request.

use super::encode::{canonical_query_string, canonical_uri_string};
use super::{Credentials, RequestParts};
use crate::error::{S3Error, S3ErrorCode, S3Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const LONG_DATETIME: &str = "%Y%m%dT%H%M%SZ";
const SHORT_DATE: &str = "%Y%m%d";

pub struct ParsedCredential {
    pub access_key: String,
    pub date: String,
    pub region: String,
    pub service: String,
}

/// Parse `ACCESS/20240101/us-east-1/s3/aws4_request`.
pub fn parse_credential_scope(raw: &str) -> Option<ParsedCredential> {
    let parts: Vec<&str> = raw.splitn(5, '/').collect();
    if parts.len() != 5 || parts[4] != "aws4_request" {
        return None;
    }
    Some(ParsedCredential {
        access_key: parts[0].to_string(),
        date: parts[1].to_string(),
        region: parts[2].to_string(),
        service: parts[3].to_string(),
    })
}

pub fn scope_string(date_short: &str, region: &str) -> String {
    format!("{date_short}/{region}/s3/aws4_request")
}

fn canonical_header_string(parts: &RequestParts, signed_headers: &[String]) -> S3Result<String> {
    let mut lines = Vec::new();
    for name in signed_headers {
        let value = parts
            .header(name)
            .ok_or_else(|| S3Error::new(S3ErrorCode::AuthorizationHeaderMalformed))?;
        lines.push(format!("{name}:{}", value.trim()));
    }
    lines.sort();
    Ok(lines.join("\n"))
}

fn canonical_request(
    method: &str,
    uri: &str,
    query: &str,
    headers: &str,
    signed_headers: &str,
    payload_hash: &str,
) -> String {
    format!("{method}\n{uri}\n{query}\n{headers}\n\n{signed_headers}\n{payload_hash}")
}

fn string_to_sign(long_datetime: &str, scope: &str, canonical_req: &str) -> String {
    use sha2::Digest;
    let hash = hex::encode(Sha256::digest(canonical_req.as_bytes()));
    format!("{ALGORITHM}\n{long_datetime}\n{scope}\n{hash}")
}

fn signing_key(secret_key: &str, date_short: &str, region: &str, service: &str) -> S3Result<Vec<u8>> {
    let secret = format!("AWS4{secret_key}");
    let mac_err = |_| S3Error::new(S3ErrorCode::InternalError);

    let mut date_hmac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(mac_err)?;
    date_hmac.update(date_short.as_bytes());
    let date_key = date_hmac.finalize().into_bytes();

    let mut region_hmac = HmacSha256::new_from_slice(&date_key).map_err(mac_err)?;
    region_hmac.update(region.as_bytes());
    let region_key = region_hmac.finalize().into_bytes();

    let mut service_hmac = HmacSha256::new_from_slice(&region_key).map_err(mac_err)?;
    service_hmac.update(service.as_bytes());
    let service_key = service_hmac.finalize().into_bytes();

    let mut signing_hmac = HmacSha256::new_from_slice(&service_key).map_err(mac_err)?;
    signing_hmac.update(b"aws4_request");
    Ok(signing_hmac.finalize().into_bytes().to_vec())
}

fn sign(secret_key: &str, date_short: &str, region: &str, service: &str, string_to_sign: &str) -> S3Result<String> {
    let key = signing_key(secret_key, date_short, region, service)?;
    let mut mac = HmacSha256::new_from_slice(&key).map_err(|_| S3Error::new(S3ErrorCode::InternalError))?;
    mac.update(string_to_sign.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn parse_amz_datetime(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, LONG_DATETIME)
        .ok()
        .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
}

fn check_skew(request_time: DateTime<Utc>, now: DateTime<Utc>) -> S3Result<()> {
    let diff = (now - request_time).num_seconds().abs();
    if diff > 15 * 60 {
        return Err(S3Error::new(S3ErrorCode::RequestTimeTooSkewed));
    }
    Ok(())
}

/// `Authorization: AWS4-HMAC-SHA256 Credential=..., SignedHeaders=..., Signature=...`
pub fn verify_header(parts: &RequestParts, now: DateTime<Utc>, creds: &Credentials) -> S3Result<()> {
    let header = parts
        .header("authorization")
        .ok_or_else(|| S3Error::new(S3ErrorCode::AuthorizationHeaderMalformed))?;
    let rest = header
        .strip_prefix("AWS4-HMAC-SHA256 ")
        .ok_or_else(|| S3Error::new(S3ErrorCode::AuthorizationHeaderMalformed))?;

    let mut credential = None;
    let mut signed_headers_raw = None;
    let mut signature = None;
    for field in rest.split(',') {
        let field = field.trim();
        if let Some(v) = field.strip_prefix("Credential=") {
            credential = Some(v);
        } else if let Some(v) = field.strip_prefix("SignedHeaders=") {
            signed_headers_raw = Some(v);
        } else if let Some(v) = field.strip_prefix("Signature=") {
            signature = Some(v);
        }
    }
    let (credential, signed_headers_raw, signature) = match (credential, signed_headers_raw, signature) {
        (Some(c), Some(s), Some(sig)) => (c, s, sig),
        _ => return Err(S3Error::new(S3ErrorCode::AuthorizationHeaderMalformed)),
    };

    let scope = parse_credential_scope(credential).ok_or_else(|| S3Error::new(S3ErrorCode::AuthorizationHeaderMalformed))?;

    let amz_date = parts
        .header("x-amz-date")
        .ok_or_else(|| S3Error::new(S3ErrorCode::AuthorizationHeaderMalformed))?;
    let request_time = parse_amz_datetime(amz_date).ok_or_else(|| S3Error::new(S3ErrorCode::AuthorizationHeaderMalformed))?;
    check_skew(request_time, now)?;

    let signed_headers: Vec<String> = signed_headers_raw.split(';').map(|s| s.to_string()).collect();
    let headers_str = canonical_header_string(parts, &signed_headers)?;
    let payload_hash = parts.header("x-amz-content-sha256").unwrap_or("UNSIGNED-PAYLOAD");

    let canonical_req = canonical_request(
        &parts.method,
        &canonical_uri_string(&parts.path),
        &canonical_query_string(&parts.query_pairs, None),
        &headers_str,
        &signed_headers_raw.to_string(),
        payload_hash,
    );
    let to_sign = string_to_sign(amz_date, &scope_string(&scope.date, &scope.region), &canonical_req);
    let expected = sign(&creds.secret_key, &scope.date, &scope.region, &scope.service, &to_sign)?;

    if scope.access_key != creds.access_key || !constant_time_eq(expected.as_bytes(), signature.as_bytes()) {
        return Err(S3Error::new(S3ErrorCode::SignatureDoesNotMatch));
    }
    Ok(())
}

/// `?X-Amz-Algorithm=AWS4-HMAC-SHA256&X-Amz-Credential=...&...`
pub fn verify_query(parts: &RequestParts, now: DateTime<Utc>, creds: &Credentials) -> S3Result<()> {
    let algorithm = parts
        .query("X-Amz-Algorithm")
        .ok_or_else(|| S3Error::new(S3ErrorCode::AuthorizationQueryParametersError))?;
    if algorithm != ALGORITHM {
        return Err(S3Error::new(S3ErrorCode::AuthorizationQueryParametersError));
    }
    let credential = parts
        .query("X-Amz-Credential")
        .ok_or_else(|| S3Error::new(S3ErrorCode::AuthorizationQueryParametersError))?;
    let signed_headers_raw = parts
        .query("X-Amz-SignedHeaders")
        .ok_or_else(|| S3Error::new(S3ErrorCode::AuthorizationQueryParametersError))?;
    let signature = parts
        .query("X-Amz-Signature")
        .ok_or_else(|| S3Error::new(S3ErrorCode::AuthorizationQueryParametersError))?;
    let amz_date = parts
        .query("X-Amz-Date")
        .ok_or_else(|| S3Error::new(S3ErrorCode::AuthorizationQueryParametersError))?;
    let expires: i64 = parts
        .query("X-Amz-Expires")
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| S3Error::new(S3ErrorCode::AuthorizationQueryParametersError))?;

    let scope = parse_credential_scope(credential).ok_or_else(|| S3Error::new(S3ErrorCode::AuthorizationQueryParametersError))?;
    let request_time = parse_amz_datetime(amz_date).ok_or_else(|| S3Error::new(S3ErrorCode::AuthorizationQueryParametersError))?;
    check_skew(request_time, now)?;

    if request_time + chrono::Duration::seconds(expires) < now {
        return Err(S3Error::new(S3ErrorCode::AccessDenied));
    }

    let signed_headers: Vec<String> = signed_headers_raw.split(';').map(|s| s.to_string()).collect();
    let headers_str = canonical_header_string(parts, &signed_headers)?;
    let payload_hash = "UNSIGNED-PAYLOAD";

    let canonical_req = canonical_request(
        &parts.method,
        &canonical_uri_string(&parts.path),
        &canonical_query_string(&parts.query_pairs, Some("X-Amz-Signature")),
        &headers_str,
        signed_headers_raw,
        payload_hash,
    );
    let to_sign = string_to_sign(amz_date, &scope_string(&scope.date, &scope.region), &canonical_req);
    let expected = sign(&creds.secret_key, &scope.date, &scope.region, &scope.service, &to_sign)?;

    if scope.access_key != creds.access_key || !constant_time_eq(expected.as_bytes(), signature.as_bytes()) {
        return Err(S3Error::new(S3ErrorCode::SignatureDoesNotMatch));
    }
    Ok(())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signing_key_matches_documented_test_vector() {
        let key = signing_key("wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY", "20150830", "us-east-1", "iam").unwrap();
        assert_eq!(hex::encode(key), "c4afb1cc5771d871763a393e44b703571b55cc28424d1a5e86da6ed3c154a4b9");
    }

    #[test]
    fn credential_scope_parses_five_slash_separated_fields() {
        let scope = parse_credential_scope("AKIAEXAMPLE/20240101/us-east-1/s3/aws4_request").unwrap();
        assert_eq!(scope.access_key, "AKIAEXAMPLE");
        assert_eq!(scope.date, "20240101");
        assert_eq!(scope.region, "us-east-1");
        assert_eq!(scope.service, "s3");
    }

    #[test]
    fn malformed_credential_scope_is_rejected() {
        assert!(parse_credential_scope("not-enough-parts").is_none());
        assert!(parse_credential_scope("a/b/c/d/not_aws4_request").is_none());
    }
}
