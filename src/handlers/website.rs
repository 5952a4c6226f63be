//! Static-website request serving: index/error document resolution,
//! directory-prefix redirects, and routing-rule evaluation. Orchestrates
//! the pure functions in `crate::website` against the store; only reached
//! from `dispatch` for GET/HEAD requests whose `Host` names the website
//! endpoint — ordinary SDK requests to the same bucket still get the
//! XML `<Error>` envelope via the regular object handlers.

use crate::app_state::AppState;
use crate::auth::RequestParts;
use crate::error::{S3Error, S3ErrorCode, S3Result};
use crate::router::ResolvedRequest;
use crate::store::ConfigKind;
use crate::website;
use actix_web::HttpResponse;

fn default_404_page() -> String {
    "<html><head><title>404 Not Found</title></head><body><h1>404 Not Found</h1></body></html>".to_string()
}

fn html_response(status: actix_web::http::StatusCode, body: String) -> HttpResponse {
    HttpResponse::build(status).content_type("text/html; charset=utf-8").body(body)
}

pub fn serve(state: &AppState, resolved: &ResolvedRequest, parts: &RequestParts, head_only: bool) -> S3Result<HttpResponse> {
    let Some(bucket) = &resolved.bucket else {
        return Err(S3Error::new(S3ErrorCode::NoSuchBucket));
    };

    let config_bytes = match state.store.get_bucket_config(bucket, ConfigKind::Website) {
        Ok(bytes) => bytes,
        Err(_) => {
            return Ok(html_response(
                actix_web::http::StatusCode::NOT_FOUND,
                "<Error><Code>NoSuchWebsiteConfiguration</Code></Error>".to_string(),
            ));
        }
    };
    let config = website::parse(&config_bytes)?;

    let request_path = resolved.key.clone().unwrap_or_default();
    let default_protocol = "http";
    let default_host = parts.header("host").unwrap_or_default();

    if let Some(redirect_all) = &config.redirect_all_requests_to {
        let host = redirect_all.host_name.as_deref().unwrap_or(default_host);
        let protocol = redirect_all.protocol.as_deref().unwrap_or(default_protocol);
        return Ok(HttpResponse::Found()
            .insert_header(("Location", format!("{protocol}://{host}/{request_path}")))
            .finish());
    }

    // Path-style requests keep the bucket segment in redirect locations;
    // vhost/CNAME requests never had one in the path to begin with.
    let path_style_bucket = resolved.addressed_path_style.then(|| bucket.as_str());

    let ends_with_slash = request_path.is_empty() || request_path.ends_with('/');
    let candidate_key = if ends_with_slash {
        format!("{request_path}{}", config.index_document)
    } else {
        // Directory-like prefix: an index object exists one level down but
        // nothing names the bare path itself — redirect to the slash form.
        let directory_index = format!("{request_path}/{}", config.index_document);
        if state.store.get_object(bucket, &request_path).is_err() && state.store.get_object(bucket, &directory_index).is_ok() {
            let location = match path_style_bucket {
                Some(b) => format!("/{b}/{request_path}/"),
                None => format!("/{request_path}/"),
            };
            return Ok(HttpResponse::Found().insert_header(("Location", location)).finish());
        }
        request_path.clone()
    };

    match state.store.get_object(bucket, &candidate_key) {
        Ok(record) => {
            if let Some(redirect) = &record.website_redirect_location {
                return Ok(HttpResponse::MovedPermanently().insert_header(("Location", redirect.clone())).finish());
            }
            let mut builder = HttpResponse::Ok();
            builder.content_type(record.content_type.clone());
            builder.insert_header(("ETag", format!("\"{}\"", record.etag)));
            builder.insert_header(("Last-Modified", record.last_modified.to_rfc2822()));
            if head_only {
                return Ok(builder.finish());
            }
            Ok(builder.body(record.content))
        }
        Err(_) => {
            let would_be_status = 404u16;
            if let Some(redirect) = website::evaluate_routing_rules(
                &config,
                &request_path,
                Some(would_be_status),
                default_protocol,
                default_host,
                path_style_bucket,
            ) {
                let status = actix_web::http::StatusCode::from_u16(redirect.status).unwrap_or(actix_web::http::StatusCode::MOVED_PERMANENTLY);
                return Ok(HttpResponse::build(status).insert_header(("Location", redirect.location)).finish());
            }

            if let Some(error_doc_key) = &config.error_document {
                if let Ok(record) = state.store.get_object(bucket, error_doc_key) {
                    if let Some(redirect) = &record.website_redirect_location {
                        return Ok(HttpResponse::MovedPermanently().insert_header(("Location", redirect.clone())).finish());
                    }
                    if head_only {
                        return Ok(HttpResponse::NotFound().content_type("text/html; charset=utf-8").finish());
                    }
                    return Ok(HttpResponse::NotFound().content_type("text/html; charset=utf-8").body(record.content));
                }
            }

            if head_only {
                return Ok(HttpResponse::NotFound().content_type("text/html; charset=utf-8").finish());
            }
            Ok(html_response(actix_web::http::StatusCode::NOT_FOUND, default_404_page()))
        }
    }
}
