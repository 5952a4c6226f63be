//! Operation handlers: the single entry point actix-web calls for
//! every request, plus the per-domain handler modules it dispatches into.
//!
//! Payload collection uses `futures::StreamExt` and `web::Data<AppState>`
//! access, but instead of one function per fixed route, a single catch-all
//! matches on the `(method, sub_resource)` tuple the router resolves, since
//! addressing mode depends on the `Host` header and can't be expressed as a
//! static path template.

pub mod bucket;
pub mod multipart;
pub mod object;
pub mod website;

use crate::app_state::AppState;
use crate::auth::{self, RequestParts};
use crate::cors;
use crate::error::{S3Error, S3ErrorCode, S3Result};
use crate::router;
use actix_web::{web, HttpRequest, HttpResponse};
use bytes::BytesMut;
use chrono::Utc;
use futures::StreamExt;

pub async fn collect_body(mut payload: web::Payload) -> S3Result<Vec<u8>> {
    let mut bytes = BytesMut::new();
    while let Some(chunk) = payload.next().await {
        let chunk = chunk.map_err(|e| S3Error::with_message(S3ErrorCode::IncompleteBody, e.to_string()))?;
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes.to_vec())
}

fn host_header(req: &HttpRequest) -> &str {
    req.headers().get("host").and_then(|v| v.to_str().ok()).unwrap_or_default()
}

/// Every query parameter this handler table inspects to select a
/// sub-operation.
pub struct QueryFlags<'a> {
    pairs: &'a [(String, String)],
}

impl<'a> QueryFlags<'a> {
    fn new(pairs: &'a [(String, String)]) -> Self {
        Self { pairs }
    }

    pub fn has(&self, name: &str) -> bool {
        self.pairs.iter().any(|(k, _)| k == name)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }
}

pub async fn dispatch(req: HttpRequest, payload: web::Payload, state: web::Data<AppState>) -> S3Result<HttpResponse> {
    let parts = RequestParts::from_http_request(&req);
    let host = host_header(&req);
    let resolved = router::resolve(host, req.path(), &state.config.service_endpoint, state.config.vhost_buckets, |h| {
        state.store.bucket_exists(h)
    });
    let query = QueryFlags::new(&parts.query_pairs);
    let method = req.method().as_str();

    if method == "OPTIONS" {
        return bucket::preflight(&state, &resolved, &parts);
    }

    let resource_path = match (&resolved.bucket, &resolved.key) {
        (Some(b), Some(k)) => format!("/{b}/{k}"),
        (Some(b), None) => format!("/{b}"),
        (None, _) => "/".to_string(),
    };
    log_mdc::insert("method", method);
    if let Some(bucket) = &resolved.bucket {
        log_mdc::insert("bucket", bucket.clone());
    }

    let auth_outcome = auth::authenticate(
        &parts,
        Utc::now(),
        &state.credentials,
        state.config.allow_mismatched_signatures,
        &resource_path,
    )?;
    if auth_outcome.signed {
        log_mdc::insert("user", state.credentials.access_key.clone());
    }

    if resolved.is_website && (method == "GET" || method == "HEAD") {
        return website::serve(&state, &resolved, &parts, method == "HEAD");
    }

    let result = match (&resolved.bucket, &resolved.key) {
        (None, _) => match method {
            "GET" => bucket::list_buckets(&state),
            _ => Err(S3Error::new(S3ErrorCode::MethodNotAllowed)),
        },
        (Some(b), None) => bucket_level(&state, &parts, &query, method, b, payload).await,
        (Some(b), Some(k)) => object_level(&state, &parts, &query, method, b, k, payload, auth_outcome.signed).await,
    };

    Ok(augment_with_cors(&state, &resolved, &parts, method, result))
}

/// Simple (non-preflight) CORS response augmentation: applies to every
/// response for a bucket-scoped request carrying an `Origin` header,
/// success or error alike, when a rule matches; otherwise no CORS headers
/// are added.
fn augment_with_cors(
    state: &AppState,
    resolved: &router::ResolvedRequest,
    parts: &RequestParts,
    method: &str,
    result: S3Result<HttpResponse>,
) -> HttpResponse {
    use actix_web::ResponseError;

    let mut response = match result {
        Ok(r) => r,
        Err(e) => e.error_response(),
    };

    let (Some(bucket), Some(origin)) = (&resolved.bucket, parts.header("origin")) else {
        return response;
    };
    let Ok(config_bytes) = state.store.get_bucket_config(bucket, crate::store::ConfigKind::Cors) else {
        return response;
    };
    let Ok(config) = cors::parse(&config_bytes) else {
        return response;
    };
    let is_partial_content = response.status() == actix_web::http::StatusCode::PARTIAL_CONTENT;
    if let Some(headers) = cors::match_simple_request(&config, origin, method) {
        let response_headers = response.headers_mut();
        if let Ok(value) = actix_web::http::header::HeaderValue::from_str(&headers.allow_origin) {
            response_headers.insert(actix_web::http::header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
        }
        if headers.allow_credentials {
            response_headers.insert(
                actix_web::http::header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                actix_web::http::header::HeaderValue::from_static("true"),
            );
        }
        // A 206 from a Range GET exposes Accept-Ranges/Content-Range too,
        // even if the bucket's CORS rule never names them.
        let mut expose_headers = headers.expose_headers.clone();
        if is_partial_content {
            for name in ["Accept-Ranges", "Content-Range"] {
                if !expose_headers.iter().any(|h| h.eq_ignore_ascii_case(name)) {
                    expose_headers.push(name.to_string());
                }
            }
        }
        if !expose_headers.is_empty() {
            if let Ok(value) = actix_web::http::header::HeaderValue::from_str(&expose_headers.join(", ")) {
                response_headers.insert(actix_web::http::header::ACCESS_CONTROL_EXPOSE_HEADERS, value);
            }
        }
    }
    response
}

async fn bucket_level(
    state: &AppState,
    parts: &RequestParts,
    query: &QueryFlags<'_>,
    method: &str,
    bucket: &str,
    payload: web::Payload,
) -> S3Result<HttpResponse> {
    if let Some(kind) = bucket::config_kind_from_query(query) {
        return match method {
            "GET" => bucket::get_config(state, bucket, kind),
            "PUT" => {
                let body = collect_body(payload).await?;
                bucket::put_config(state, bucket, kind, body)
            }
            "DELETE" => bucket::delete_config(state, bucket, kind),
            _ => Err(S3Error::new(S3ErrorCode::MethodNotAllowed)),
        };
    }

    if query.has("uploads") && method == "GET" {
        return multipart::list_multipart_uploads(state, parts, query, bucket);
    }

    if query.has("delete") && method == "POST" {
        let body = collect_body(payload).await?;
        return object::delete_objects(state, bucket, &body);
    }

    if method == "POST" {
        let body = collect_body(payload).await?;
        return object::post_upload(state, bucket, parts, body);
    }

    match method {
        "PUT" => bucket::create_bucket(state, bucket),
        "DELETE" => bucket::delete_bucket(state, bucket),
        "GET" => bucket::list_objects(state, query, bucket),
        "HEAD" => bucket::head_bucket(state, bucket),
        _ => Err(S3Error::new(S3ErrorCode::MethodNotAllowed)),
    }
}

async fn object_level(
    state: &AppState,
    parts: &RequestParts,
    query: &QueryFlags<'_>,
    method: &str,
    bucket: &str,
    key: &str,
    payload: web::Payload,
    signed: bool,
) -> S3Result<HttpResponse> {
    if query.has("tagging") {
        return match method {
            "GET" => object::get_tagging(state, bucket, key),
            "PUT" => {
                let body = collect_body(payload).await?;
                object::put_tagging(state, bucket, key, &body)
            }
            "DELETE" => object::delete_tagging(state, bucket, key),
            _ => Err(S3Error::new(S3ErrorCode::MethodNotAllowed)),
        };
    }

    if let Some(upload_id) = query.get("uploadId") {
        return match method {
            "PUT" => {
                let part_number: u32 = query
                    .get("partNumber")
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| S3Error::new(S3ErrorCode::InvalidArgument))?;
                let body = collect_body(payload).await?;
                multipart::upload_part(state, bucket, upload_id, part_number, body)
            }
            "POST" => {
                let body = collect_body(payload).await?;
                multipart::complete(state, bucket, key, upload_id, &body)
            }
            "DELETE" => multipart::abort(state, bucket, upload_id),
            "GET" => multipart::list_parts(state, query, bucket, upload_id),
            _ => Err(S3Error::new(S3ErrorCode::MethodNotAllowed)),
        };
    }

    if query.has("uploads") && method == "POST" {
        return multipart::initiate(state, parts, bucket, key);
    }

    match method {
        "PUT" if parts.header("x-amz-copy-source").is_some() => object::copy_object(state, parts, bucket, key),
        "PUT" => {
            let body = collect_body(payload).await?;
            object::put_object(state, parts, bucket, key, body)
        }
        "GET" => object::get_object(state, parts, query, bucket, key, signed, false),
        "HEAD" => object::get_object(state, parts, query, bucket, key, signed, true),
        "DELETE" => object::delete_object(state, bucket, key),
        _ => Err(S3Error::new(S3ErrorCode::MethodNotAllowed)),
    }
}
