//! Object-level operations: PUT/GET/HEAD/DELETE, COPY, bulk delete,
//! tagging, and the browser-based POST form upload.

use super::bucket::iso8601;
use super::QueryFlags;
use crate::app_state::AppState;
use crate::auth::RequestParts;
use crate::error::{S3Error, S3ErrorCode, S3Result};
use crate::events::{Event, EventName, EventObject};
use crate::store::{CopyOverrides, MetadataDirective, ObjectRecord, PutAttributes, Tag};
use crate::xml_util::escape;
use actix_web::HttpResponse;
use quick_xml::events::Event as XmlEvent;
use quick_xml::reader::Reader;
use std::collections::BTreeMap;

const RESPONSE_OVERRIDE_PARAMS: &[(&str, &str)] = &[
    ("response-content-type", "content-type"),
    ("response-content-disposition", "content-disposition"),
    ("response-content-encoding", "content-encoding"),
    ("response-cache-control", "cache-control"),
    ("response-content-language", "content-language"),
    ("response-expires", "expires"),
];

fn user_metadata_from_headers(parts: &RequestParts) -> BTreeMap<String, String> {
    parts
        .headers
        .iter()
        .filter_map(|(k, v)| k.strip_prefix("x-amz-meta-").map(|name| (name.to_string(), v.clone())))
        .collect()
}

fn record_headers(builder: &mut actix_web::HttpResponseBuilder, record: &ObjectRecord) {
    builder
        .content_type(record.content_type.clone())
        .insert_header(("ETag", format!("\"{}\"", record.etag)))
        .insert_header(("Last-Modified", record.last_modified.to_rfc2822()))
        .insert_header(("Accept-Ranges", "bytes"));
    for (k, v) in &record.user_metadata {
        builder.insert_header((format!("x-amz-meta-{k}"), v.clone()));
    }
    if let Some(redirect) = &record.website_redirect_location {
        builder.insert_header(("x-amz-website-redirect-location", redirect.clone()));
    }
}

pub fn put_object(state: &AppState, parts: &RequestParts, bucket: &str, key: &str, body: Vec<u8>) -> S3Result<HttpResponse> {
    if !state.store.bucket_exists(bucket) {
        return Err(S3Error::new(S3ErrorCode::NoSuchBucket));
    }
    let attrs = PutAttributes {
        content_type: parts.header("content-type").map(|s| s.to_string()),
        user_metadata: user_metadata_from_headers(parts),
        website_redirect_location: parts.header("x-amz-website-redirect-location").map(|s| s.to_string()),
        content_md5_base64: parts.header("content-md5").map(|s| s.to_string()),
        declared_length: parts.header("content-length").and_then(|s| s.parse().ok()),
    };
    let record = state.store.put_object(bucket, key, body, attrs)?;
    state.events.publish(Event::new(
        EventName::ObjectCreatedPut,
        bucket,
        EventObject {
            key: key.to_string(),
            size: record.content.len() as u64,
            etag: record.etag.clone(),
        },
    ));
    Ok(HttpResponse::Ok().insert_header(("ETag", format!("\"{}\"", record.etag))).finish())
}

struct Range {
    start: u64,
    end: u64,
}

/// A `Range` header resolves to one of three outcomes: absent, a concrete
/// byte span, or unsatisfiable (start past EOF) — the last one still needs
/// to carry `size` through to the response so the 416 can set
/// `Content-Range: bytes */{size}`, so it can't just be folded into the
/// error path the way a malformed header is.
enum RangeOutcome {
    None,
    Range(Range),
    Unsatisfiable,
}

fn parse_range(header: &str, size: u64) -> S3Result<RangeOutcome> {
    let Some(spec) = header.strip_prefix("bytes=") else {
        return Ok(RangeOutcome::None);
    };
    let (start_str, end_str) = spec.split_once('-').ok_or_else(|| S3Error::new(S3ErrorCode::InvalidRange))?;
    if start_str.is_empty() {
        let suffix_len: u64 = end_str.parse().map_err(|_| S3Error::new(S3ErrorCode::InvalidRange))?;
        if suffix_len == 0 {
            return Err(S3Error::new(S3ErrorCode::InvalidRange));
        }
        let start = size.saturating_sub(suffix_len);
        return Ok(RangeOutcome::Range(Range { start, end: size.saturating_sub(1) }));
    }
    let start: u64 = start_str.parse().map_err(|_| S3Error::new(S3ErrorCode::InvalidRange))?;
    if start > size.saturating_sub(1) {
        return Ok(RangeOutcome::Unsatisfiable);
    }
    let end = if end_str.is_empty() {
        size.saturating_sub(1)
    } else {
        end_str.parse::<u64>().map_err(|_| S3Error::new(S3ErrorCode::InvalidRange))?.min(size.saturating_sub(1))
    };
    Ok(RangeOutcome::Range(Range { start, end }))
}

pub fn get_object(
    state: &AppState,
    parts: &RequestParts,
    query: &QueryFlags,
    bucket: &str,
    key: &str,
    signed: bool,
    head_only: bool,
) -> S3Result<HttpResponse> {
    let has_override = RESPONSE_OVERRIDE_PARAMS.iter().any(|(param, _)| query.has(param));
    if has_override && !signed {
        return Err(S3Error::with_message(
            S3ErrorCode::InvalidRequest,
            "Signed response header overrides require a signed request.",
        ));
    }

    let record = state.store.get_object(bucket, key)?;
    let size = record.content.len() as u64;
    let range = match parts.header("range") {
        Some(h) => parse_range(h, size)?,
        None => RangeOutcome::None,
    };

    if matches!(range, RangeOutcome::Unsatisfiable) {
        return Ok(HttpResponse::RangeNotSatisfiable()
            .insert_header(("Content-Range", format!("bytes */{size}")))
            .finish());
    }
    let range = match range {
        RangeOutcome::Range(r) => Some(r),
        RangeOutcome::None => None,
        RangeOutcome::Unsatisfiable => unreachable!("handled above"),
    };

    let mut builder = match &range {
        Some(_) => HttpResponse::PartialContent(),
        None => HttpResponse::Ok(),
    };
    record_headers(&mut builder, &record);
    builder.insert_header(("Content-Length", size.to_string()));

    if let Some(r) = &range {
        builder.insert_header(("Content-Range", format!("bytes {}-{}/{}", r.start, r.end, size)));
        builder.insert_header(("Content-Length", (r.end - r.start + 1).to_string()));
    }

    if signed {
        for (param, header) in RESPONSE_OVERRIDE_PARAMS {
            if let Some(value) = query.get(param) {
                builder.insert_header((*header, value.to_string()));
            }
        }
    }

    if head_only {
        return Ok(builder.finish());
    }

    let body = match range {
        Some(r) => record.content[r.start as usize..=r.end as usize].to_vec(),
        None => record.content,
    };
    Ok(builder.body(body))
}

pub fn delete_object(state: &AppState, bucket: &str, key: &str) -> S3Result<HttpResponse> {
    state.store.delete_object(bucket, key)?;
    state.events.publish(Event::new(
        EventName::ObjectRemovedDelete,
        bucket,
        EventObject { key: key.to_string(), size: 0, etag: String::new() },
    ));
    Ok(HttpResponse::NoContent().finish())
}

pub fn delete_objects(state: &AppState, bucket: &str, body: &[u8]) -> S3Result<HttpResponse> {
    let keys = parse_delete_keys(body)?;
    let deleted = state.store.delete_objects(bucket, &keys)?;
    for key in &deleted {
        state.events.publish(Event::new(
            EventName::ObjectRemovedDelete,
            bucket,
            EventObject { key: key.clone(), size: 0, etag: String::new() },
        ));
    }
    let entries: String = deleted.iter().map(|k| format!("<Deleted><Key>{}</Key></Deleted>", escape(k))).collect();
    let xml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<DeleteResult xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">{entries}</DeleteResult>"
    );
    Ok(HttpResponse::Ok().content_type("application/xml").body(xml))
}

fn parse_delete_keys(body: &[u8]) -> S3Result<Vec<String>> {
    let mut reader = Reader::from_reader(body);
    let cfg = reader.config_mut();
    cfg.trim_text_start = true;
    cfg.trim_text_end = true;

    let mut keys = Vec::new();
    let mut in_key = false;
    let mut buf = Vec::new();
    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(|e| S3Error::with_message(S3ErrorCode::MalformedXML, e.to_string()))?
        {
            XmlEvent::Start(e) if e.name().as_ref() == b"Key" => in_key = true,
            XmlEvent::Text(t) if in_key => {
                keys.push(t.unescape().map_err(|e| S3Error::with_message(S3ErrorCode::MalformedXML, e.to_string()))?.to_string());
                in_key = false;
            }
            XmlEvent::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    if keys.is_empty() {
        return Err(S3Error::new(S3ErrorCode::MalformedXML));
    }
    Ok(keys)
}

pub fn copy_object(state: &AppState, parts: &RequestParts, bucket: &str, key: &str) -> S3Result<HttpResponse> {
    let copy_source = parts.header("x-amz-copy-source").ok_or_else(|| S3Error::new(S3ErrorCode::InvalidArgument))?;
    let decoded = percent_encoding::percent_decode_str(copy_source.trim_start_matches('/')).decode_utf8_lossy();
    let (src_bucket, src_key) = decoded.split_once('/').ok_or_else(|| S3Error::new(S3ErrorCode::InvalidArgument))?;

    let directive = match parts.header("x-amz-metadata-directive") {
        Some("REPLACE") => MetadataDirective::Replace,
        _ => MetadataDirective::Copy,
    };
    let overrides = CopyOverrides {
        directive,
        content_type: parts.header("content-type").map(|s| s.to_string()),
        user_metadata: user_metadata_from_headers(parts),
        website_redirect_location: parts.header("x-amz-website-redirect-location").map(|s| s.to_string()),
    };

    let record = state.store.copy_object(src_bucket, src_key, bucket, key, overrides)?;
    state.events.publish(Event::new(
        EventName::ObjectCreatedCopy,
        bucket,
        EventObject { key: key.to_string(), size: record.content.len() as u64, etag: record.etag.clone() },
    ));
    let xml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<CopyObjectResult xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\"><ETag>&quot;{}&quot;</ETag><LastModified>{}</LastModified></CopyObjectResult>",
        record.etag,
        iso8601(record.last_modified),
    );
    Ok(HttpResponse::Ok().content_type("application/xml").body(xml))
}

pub fn get_tagging(state: &AppState, bucket: &str, key: &str) -> S3Result<HttpResponse> {
    let tags = state.store.get_object_tagging(bucket, key)?;
    Ok(HttpResponse::Ok().content_type("application/xml").body(tag_set_xml(&tags)))
}

pub fn put_tagging(state: &AppState, bucket: &str, key: &str, body: &[u8]) -> S3Result<HttpResponse> {
    let tags = parse_tag_set(body)?;
    state.store.put_object_tagging(bucket, key, tags)?;
    Ok(HttpResponse::Ok().finish())
}

pub fn delete_tagging(state: &AppState, bucket: &str, key: &str) -> S3Result<HttpResponse> {
    state.store.delete_object_tagging(bucket, key)?;
    Ok(HttpResponse::NoContent().finish())
}

fn tag_set_xml(tags: &[Tag]) -> String {
    let entries: String = tags
        .iter()
        .map(|t| format!("<Tag><Key>{}</Key><Value>{}</Value></Tag>", escape(&t.key), escape(&t.value)))
        .collect();
    format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Tagging xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\"><TagSet>{entries}</TagSet></Tagging>")
}

fn parse_tag_set(body: &[u8]) -> S3Result<Vec<Tag>> {
    let mut reader = Reader::from_reader(body);
    let cfg = reader.config_mut();
    cfg.trim_text_start = true;
    cfg.trim_text_end = true;

    let mut tags = Vec::new();
    let mut field = String::new();
    let mut key = None;
    let mut value = None;
    let mut buf = Vec::new();
    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(|e| S3Error::with_message(S3ErrorCode::MalformedXML, e.to_string()))?
        {
            XmlEvent::Start(e) => field = String::from_utf8_lossy(e.name().as_ref()).to_string(),
            XmlEvent::Text(t) => {
                let text = t.unescape().map_err(|e| S3Error::with_message(S3ErrorCode::MalformedXML, e.to_string()))?.to_string();
                match field.as_str() {
                    "Key" => key = Some(text),
                    "Value" => value = Some(text),
                    _ => {}
                }
            }
            XmlEvent::End(e) if e.name().as_ref() == b"Tag" => {
                let k = key.take().ok_or_else(|| S3Error::new(S3ErrorCode::MalformedXML))?;
                let v = value.take().unwrap_or_default();
                tags.push(Tag { key: k, value: v });
            }
            XmlEvent::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(tags)
}

struct FormPart {
    name: String,
    filename: Option<String>,
    content_type: Option<String>,
    content: Vec<u8>,
}

fn extract_quoted<'a>(haystack: &'a str, key: &str) -> Option<&'a str> {
    let marker = format!("{key}=\"");
    let start = haystack.find(&marker)? + marker.len();
    let end = haystack[start..].find('"')? + start;
    Some(&haystack[start..end])
}

fn find_all(haystack: &[u8], needle: &[u8]) -> Vec<usize> {
    let mut positions = Vec::new();
    let mut start = 0;
    while start + needle.len() <= haystack.len() {
        if &haystack[start..start + needle.len()] == needle {
            positions.push(start);
            start += needle.len();
        } else {
            start += 1;
        }
    }
    positions
}

fn parse_multipart_form(content_type: &str, body: &[u8]) -> S3Result<Vec<FormPart>> {
    let boundary = content_type
        .split(';')
        .find_map(|seg| seg.trim().strip_prefix("boundary=").map(|b| b.trim_matches('"').to_string()))
        .ok_or_else(|| S3Error::new(S3ErrorCode::MalformedPOSTRequest))?;
    let delim = format!("--{boundary}").into_bytes();
    let positions = find_all(body, &delim);
    if positions.len() < 2 {
        return Err(S3Error::new(S3ErrorCode::MalformedPOSTRequest));
    }

    let mut parts = Vec::new();
    for window in positions.windows(2) {
        let start = window[0] + delim.len();
        let end = window[1];
        if start >= end {
            continue;
        }
        let mut segment = &body[start..end];
        if segment.starts_with(b"\r\n") {
            segment = &segment[2..];
        }
        if segment.ends_with(b"\r\n") {
            segment = &segment[..segment.len() - 2];
        }
        if segment.is_empty() {
            continue;
        }
        let Some(header_end) = find_all(segment, b"\r\n\r\n").into_iter().next() else {
            continue;
        };
        let headers_text = String::from_utf8_lossy(&segment[..header_end]).to_string();
        let content = segment[header_end + 4..].to_vec();

        let mut name = None;
        let mut filename = None;
        let mut part_content_type = None;
        for line in headers_text.split("\r\n") {
            let lower = line.to_ascii_lowercase();
            if lower.starts_with("content-disposition:") {
                name = extract_quoted(line, "name").map(|s| s.to_string());
                filename = extract_quoted(line, "filename").map(|s| s.to_string());
            } else if lower.starts_with("content-type:") {
                part_content_type = line.splitn(2, ':').nth(1).map(|s| s.trim().to_string());
            }
        }
        parts.push(FormPart {
            name: name.unwrap_or_default(),
            filename,
            content_type: part_content_type,
            content,
        });
    }
    Ok(parts)
}

/// Browser-based POST form upload (an HTML form targeting the bucket
/// endpoint directly).
pub fn post_upload(state: &AppState, bucket: &str, parts: &RequestParts, body: Vec<u8>) -> S3Result<HttpResponse> {
    let content_type = parts.header("content-type").ok_or_else(|| S3Error::new(S3ErrorCode::MalformedPOSTRequest))?;
    let form_parts = parse_multipart_form(content_type, &body)?;

    let mut key_template = None;
    let mut success_action_status: u16 = 201;
    let mut user_metadata = BTreeMap::new();
    let mut file_part = None;

    for part in form_parts {
        if part.filename.is_some() {
            file_part = Some(part);
            continue;
        }
        match part.name.as_str() {
            "key" => key_template = Some(String::from_utf8_lossy(&part.content).to_string()),
            "success_action_status" => {
                success_action_status = String::from_utf8_lossy(&part.content).parse().unwrap_or(201);
            }
            name => {
                if let Some(meta_name) = name.strip_prefix("x-amz-meta-") {
                    user_metadata.insert(meta_name.to_string(), String::from_utf8_lossy(&part.content).to_string());
                }
            }
        }
    }

    let file_part = file_part.ok_or_else(|| S3Error::new(S3ErrorCode::MalformedPOSTRequest))?;
    let filename = file_part.filename.clone().unwrap_or_default();
    let key = key_template
        .ok_or_else(|| S3Error::new(S3ErrorCode::MalformedPOSTRequest))?
        .replace("${filename}", &filename);

    let attrs = PutAttributes {
        content_type: Some(file_part.content_type.clone().unwrap_or_else(|| "binary/octet-stream".to_string())),
        user_metadata,
        website_redirect_location: None,
        content_md5_base64: None,
        declared_length: None,
    };
    let record = state.store.put_object(bucket, &key, file_part.content, attrs)?;
    state.events.publish(Event::new(
        EventName::ObjectCreatedPost,
        bucket,
        EventObject { key: key.clone(), size: record.content.len() as u64, etag: record.etag.clone() },
    ));

    let status = actix_web::http::StatusCode::from_u16(success_action_status).unwrap_or(actix_web::http::StatusCode::CREATED);
    if status == actix_web::http::StatusCode::CREATED {
        let xml = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<PostResponse><Location>/{bucket}/{key}</Location><Bucket>{bucket}</Bucket><Key>{}</Key><ETag>&quot;{}&quot;</ETag></PostResponse>",
            escape(&key),
            record.etag,
        );
        Ok(HttpResponse::build(status).content_type("application/xml").body(xml))
    } else {
        Ok(HttpResponse::build(status)
            .insert_header(("ETag", format!("\"{}\"", record.etag)))
            .insert_header(("Location", format!("/{bucket}/{key}")))
            .finish())
    }
}
