//! Request addressing resolution.
//!
//! `resolve` is a pure function over a request's `Host` header and path; it
//! never touches the store or the HTTP body. The handler dispatch itself
//! (matching method + sub-resource query params onto the handler table)
//! lives in `handlers::dispatch`, which calls `resolve` first.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRequest {
    pub bucket: Option<String>,
    pub key: Option<String>,
    pub is_website: bool,
    /// True when the bucket came from the path (`/bucket/key`) rather than
    /// the `Host` header (virtual-hosted or CNAME addressing). Website
    /// redirects must repeat the bucket segment for the former but not the
    /// latter, since a vhost/CNAME request never had it in the path to begin
    /// with.
    pub addressed_path_style: bool,
}

fn strip_port(host: &str) -> &str {
    host.rsplit_once(':').map(|(h, _)| h).unwrap_or(host)
}

fn looks_like_ip(host: &str) -> bool {
    let parts: Vec<&str> = host.split('.').collect();
    parts.len() == 4 && parts.iter().all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

fn split_path(path: &str) -> (Option<String>, Option<String>) {
    let trimmed = path.trim_start_matches('/');
    if trimmed.is_empty() {
        return (None, None);
    }
    match trimmed.split_once('/') {
        Some((bucket, rest)) if !rest.is_empty() => (Some(bucket.to_string()), Some(rest.to_string())),
        Some((bucket, _)) => (Some(bucket.to_string()), None),
        None => (Some(trimmed.to_string()), None),
    }
}

/// `bucket_exists` backs the CNAME addressing case: a `Host` that is
/// neither the service endpoint nor a `<bucket>.<service_endpoint>` vhost
/// is treated as a literal bucket name only if it actually names one.
pub fn resolve(host: &str, path: &str, service_endpoint: &str, vhost_buckets: bool, bucket_exists: impl Fn(&str) -> bool) -> ResolvedRequest {
    let host = strip_port(host.trim());
    let is_website = host.contains("s3-website");

    if host.is_empty() || host.eq_ignore_ascii_case(service_endpoint) || looks_like_ip(host) {
        let (bucket, key) = split_path(path);
        return ResolvedRequest { bucket, key, is_website, addressed_path_style: true };
    }

    let vhost_suffix = format!(".{service_endpoint}");
    if let Some(bucket) = host.strip_suffix(&vhost_suffix) {
        let key = path.trim_start_matches('/');
        let key = if key.is_empty() { None } else { Some(key.to_string()) };
        return ResolvedRequest {
            bucket: Some(bucket.to_string()),
            key,
            is_website,
            addressed_path_style: false,
        };
    }

    if vhost_buckets && bucket_exists(host) {
        let key = path.trim_start_matches('/');
        let key = if key.is_empty() { None } else { Some(key.to_string()) };
        return ResolvedRequest {
            bucket: Some(host.to_string()),
            key,
            is_website,
            addressed_path_style: false,
        };
    }

    let (bucket, key) = split_path(path);
    ResolvedRequest { bucket, key, is_website, addressed_path_style: true }
}
