//! Multipart upload operations: initiate/upload-part/complete/abort plus
//! the two listing endpoints (`listMultipartUploads`, `listParts`), which
//! follow the same pagination discipline as object listing.

use super::bucket::iso8601;
use super::QueryFlags;
use crate::app_state::AppState;
use crate::auth::RequestParts;
use crate::error::{S3Error, S3ErrorCode, S3Result};
use crate::events::{Event, EventName, EventObject};
use crate::store::{listing, StagedAttributes};
use crate::xml_util::escape;
use actix_web::HttpResponse;
use quick_xml::events::Event as XmlEvent;
use quick_xml::reader::Reader;
use std::collections::BTreeMap;

fn user_metadata_from_headers(parts: &RequestParts) -> BTreeMap<String, String> {
    parts
        .headers
        .iter()
        .filter_map(|(k, v)| k.strip_prefix("x-amz-meta-").map(|name| (name.to_string(), v.clone())))
        .collect()
}

pub fn initiate(state: &AppState, parts: &RequestParts, bucket: &str, key: &str) -> S3Result<HttpResponse> {
    if !state.store.bucket_exists(bucket) {
        return Err(S3Error::new(S3ErrorCode::NoSuchBucket));
    }
    let attrs = StagedAttributes {
        content_type: parts.header("content-type").unwrap_or("binary/octet-stream").to_string(),
        user_metadata: user_metadata_from_headers(parts),
        website_redirect_location: parts.header("x-amz-website-redirect-location").map(|s| s.to_string()),
    };
    let upload_id = state.store.create_multipart_upload(bucket, key, attrs)?;
    let xml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<InitiateMultipartUploadResult xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\"><Bucket>{}</Bucket><Key>{}</Key><UploadId>{}</UploadId></InitiateMultipartUploadResult>",
        escape(bucket), escape(key), upload_id,
    );
    Ok(HttpResponse::Ok().content_type("application/xml").body(xml))
}

pub fn upload_part(state: &AppState, bucket: &str, upload_id: &str, part_number: u32, body: Vec<u8>) -> S3Result<HttpResponse> {
    let etag = state.store.upload_part(bucket, upload_id, part_number, body)?;
    Ok(HttpResponse::Ok().insert_header(("ETag", format!("\"{etag}\""))).finish())
}

fn parse_requested_parts(body: &[u8]) -> S3Result<Vec<(u32, String)>> {
    let mut reader = Reader::from_reader(body);
    let cfg = reader.config_mut();
    cfg.trim_text_start = true;
    cfg.trim_text_end = true;

    let mut parts = Vec::new();
    let mut field = String::new();
    let mut number: Option<u32> = None;
    let mut etag: Option<String> = None;
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
                    "PartNumber" => number = text.parse().ok(),
                    "ETag" => etag = Some(text),
                    _ => {}
                }
            }
            XmlEvent::End(e) if e.name().as_ref() == b"Part" => {
                let n = number.take().ok_or_else(|| S3Error::new(S3ErrorCode::MalformedXML))?;
                let t = etag.take().ok_or_else(|| S3Error::new(S3ErrorCode::MalformedXML))?;
                parts.push((n, t));
            }
            XmlEvent::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(parts)
}

pub fn complete(state: &AppState, bucket: &str, key: &str, upload_id: &str, body: &[u8]) -> S3Result<HttpResponse> {
    let requested = parse_requested_parts(body)?;
    let record = state.store.complete_multipart_upload(bucket, key, upload_id, &requested)?;
    state.events.publish(Event::new(
        EventName::ObjectCreatedCompleteMultipartUpload,
        bucket,
        EventObject { key: key.to_string(), size: record.content.len() as u64, etag: record.etag.clone() },
    ));
    let xml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<CompleteMultipartUploadResult xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\"><Location>/{}/{}</Location><Bucket>{}</Bucket><Key>{}</Key><ETag>&quot;{}&quot;</ETag></CompleteMultipartUploadResult>",
        bucket, escape(key), escape(bucket), escape(key), record.etag,
    );
    Ok(HttpResponse::Ok().content_type("application/xml").body(xml))
}

pub fn abort(state: &AppState, bucket: &str, upload_id: &str) -> S3Result<HttpResponse> {
    state.store.abort_multipart_upload(bucket, upload_id)?;
    Ok(HttpResponse::NoContent().finish())
}

pub fn list_multipart_uploads(state: &AppState, _parts: &RequestParts, query: &QueryFlags, bucket: &str) -> S3Result<HttpResponse> {
    if !state.store.bucket_exists(bucket) {
        return Err(S3Error::new(S3ErrorCode::NoSuchBucket));
    }
    let max_uploads = query.get("max-uploads").and_then(|s| s.parse().ok()).map(|n: usize| n.min(1000)).unwrap_or(1000);
    let key_marker = query.get("key-marker");
    let upload_id_marker = query.get("upload-id-marker");
    let (page, truncated) = state.store.list_multipart_uploads(bucket, key_marker, upload_id_marker, max_uploads)?;

    let entries: String = page
        .iter()
        .map(|(key, upload_id, initiated)| {
            format!(
                "<Upload><Key>{}</Key><UploadId>{}</UploadId><Initiated>{}</Initiated></Upload>",
                escape(key), upload_id, iso8601(*initiated),
            )
        })
        .collect();
    let xml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<ListMultipartUploadsResult xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\"><Bucket>{}</Bucket><MaxUploads>{}</MaxUploads><IsTruncated>{}</IsTruncated>{}</ListMultipartUploadsResult>",
        escape(bucket), max_uploads, truncated, entries,
    );
    Ok(HttpResponse::Ok().content_type("application/xml").body(xml))
}

pub fn list_parts(state: &AppState, query: &QueryFlags, bucket: &str, upload_id: &str) -> S3Result<HttpResponse> {
    let max_parts = query.get("max-parts").and_then(|s| s.parse().ok()).map(|n: usize| n.min(1000)).unwrap_or(1000);
    let marker: u32 = query.get("part-number-marker").and_then(|s| s.parse().ok()).unwrap_or(0);
    let (page, truncated) = state.store.list_parts(bucket, upload_id, marker, max_parts)?;

    let entries: String = page
        .iter()
        .map(|(number, part)| {
            format!(
                "<Part><PartNumber>{}</PartNumber><LastModified>{}</LastModified><ETag>&quot;{}&quot;</ETag><Size>{}</Size></Part>",
                number, iso8601(part.last_modified), part.etag, part.size,
            )
        })
        .collect();
    let xml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<ListPartsResult xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\"><Bucket>{}</Bucket><UploadId>{}</UploadId><MaxParts>{}</MaxParts><IsTruncated>{}</IsTruncated>{}</ListPartsResult>",
        escape(bucket), upload_id, max_parts, truncated, entries,
    );
    Ok(HttpResponse::Ok().content_type("application/xml").body(xml))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_requested_parts_in_document_order() {
        let xml = br#"<CompleteMultipartUpload><Part><PartNumber>1</PartNumber><ETag>"a"</ETag></Part><Part><PartNumber>2</PartNumber><ETag>"b"</ETag></Part></CompleteMultipartUpload>"#;
        let parts = parse_requested_parts(xml).unwrap();
        assert_eq!(parts, vec![(1, "\"a\"".to_string()), (2, "\"b\"".to_string())]);
    }
}
