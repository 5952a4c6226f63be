//! CORS rule matching and preflight/simple-request augmentation.
//!
//! Config parsing uses a small hand-rolled `quick-xml` reader rather than a
//! DOM walk or a generic derive-based deserializer, since this crate owns
//! the wire document end to end.

use crate::error::{S3Error, S3ErrorCode, S3Result};
use quick_xml::events::Event;
use quick_xml::reader::Reader;

const ALLOWED_METHODS: &[&str] = &["GET", "PUT", "POST", "DELETE", "HEAD"];

#[derive(Debug, Clone, Default)]
pub struct CorsRule {
    pub allowed_methods: Vec<String>,
    pub allowed_origins: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub expose_headers: Vec<String>,
    pub max_age_seconds: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct CorsConfiguration {
    pub rules: Vec<CorsRule>,
}

fn validate_at_most_one_wildcard(value: &str) -> S3Result<()> {
    if value.matches('*').count() > 1 {
        return Err(S3Error::with_message(
            S3ErrorCode::MalformedXML,
            "CORSRule entries may contain at most one wildcard character in AllowedOrigin/AllowedHeader.",
        ));
    }
    Ok(())
}

/// Parse and validate a `<CORSConfiguration>` document.
pub fn parse(xml: &[u8]) -> S3Result<CorsConfiguration> {
    let mut reader = Reader::from_reader(xml);
    let cfg = reader.config_mut();
    cfg.trim_text_start = true;
    cfg.trim_text_end = true;

    let mut config = CorsConfiguration::default();
    let mut current: Option<CorsRule> = None;
    let mut field_stack: Vec<String> = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf).map_err(|e| S3Error::with_message(S3ErrorCode::MalformedXML, e.to_string()))? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if name == "CORSRule" {
                    current = Some(CorsRule::default());
                }
                field_stack.push(name);
            }
            Event::Text(t) => {
                let text = t.unescape().map_err(|e| S3Error::with_message(S3ErrorCode::MalformedXML, e.to_string()))?.to_string();
                if let (Some(field), Some(rule)) = (field_stack.last(), current.as_mut()) {
                    match field.as_str() {
                        "AllowedMethod" => {
                            if !ALLOWED_METHODS.contains(&text.as_str()) {
                                return Err(S3Error::with_message(
                                    S3ErrorCode::InvalidRequest,
                                    "Found unsupported HTTP method in CORS config.",
                                ));
                            }
                            rule.allowed_methods.push(text);
                        }
                        "AllowedOrigin" => {
                            validate_at_most_one_wildcard(&text)?;
                            rule.allowed_origins.push(text);
                        }
                        "AllowedHeader" => {
                            validate_at_most_one_wildcard(&text)?;
                            rule.allowed_headers.push(text);
                        }
                        "ExposeHeader" => rule.expose_headers.push(text),
                        "MaxAgeSeconds" => {
                            rule.max_age_seconds = text
                                .parse()
                                .map_err(|_| S3Error::new(S3ErrorCode::MalformedXML))
                                .map(Some)?
                        }
                        _ => {}
                    }
                }
            }
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if name == "CORSRule" {
                    let rule = current.take().ok_or_else(|| S3Error::new(S3ErrorCode::MalformedXML))?;
                    if rule.allowed_methods.is_empty() || rule.allowed_origins.is_empty() {
                        return Err(S3Error::new(S3ErrorCode::MalformedXML));
                    }
                    config.rules.push(rule);
                }
                field_stack.pop();
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(config)
}

fn glob_matches(pattern: &str, value: &str) -> bool {
    match pattern.find('*') {
        None => pattern == value,
        Some(idx) => {
            let (prefix, rest) = pattern.split_at(idx);
            let suffix = &rest[1..];
            value.len() >= prefix.len() + suffix.len() && value.starts_with(prefix) && value.ends_with(suffix)
        }
    }
}

fn find_matching_rule<'a>(
    config: &'a CorsConfiguration,
    origin: &str,
    method: &str,
    requested_headers: &[String],
) -> Option<&'a CorsRule> {
    config.rules.iter().find(|rule| {
        rule.allowed_origins.iter().any(|o| glob_matches(o, origin))
            && rule.allowed_methods.iter().any(|m| m == method)
            && requested_headers
                .iter()
                .all(|h| rule.allowed_headers.iter().any(|allowed| glob_matches(&allowed.to_ascii_lowercase(), h)))
    })
}

pub struct SimpleResponseHeaders {
    pub allow_origin: String,
    pub allow_credentials: bool,
    pub expose_headers: Vec<String>,
}

/// A simple (non-preflight) request. Returns `None` when no rule matches —
/// callers must emit no CORS headers at all in that case.
pub fn match_simple_request(config: &CorsConfiguration, origin: &str, method: &str) -> Option<SimpleResponseHeaders> {
    let rule = find_matching_rule(config, origin, method, &[])?;
    let bare_wildcard = rule.allowed_origins.iter().any(|o| o == "*");
    Some(SimpleResponseHeaders {
        allow_origin: if bare_wildcard { "*".to_string() } else { origin.to_string() },
        allow_credentials: !bare_wildcard,
        expose_headers: rule.expose_headers.clone(),
    })
}

pub struct PreflightResponse {
    pub allow_origin: String,
    pub allow_methods: Vec<String>,
    pub allow_headers: Vec<String>,
    pub max_age_seconds: Option<u32>,
}

/// An OPTIONS preflight request. `Err` means: reply 403 with an XML error.
pub fn match_preflight(
    config: &CorsConfiguration,
    origin: &str,
    requested_method: &str,
    requested_headers: &[String],
) -> S3Result<PreflightResponse> {
    let rule = find_matching_rule(config, origin, requested_method, requested_headers)
        .ok_or_else(|| S3Error::with_message(S3ErrorCode::AccessDenied, "CORS Rules are not supported for this origin"))?;
    let bare_wildcard = rule.allowed_origins.iter().any(|o| o == "*");
    Ok(PreflightResponse {
        allow_origin: if bare_wildcard { "*".to_string() } else { origin.to_string() },
        allow_methods: rule.allowed_methods.clone(),
        allow_headers: requested_headers.iter().map(|h| h.to_ascii_lowercase()).collect(),
        max_age_seconds: rule.max_age_seconds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<CORSConfiguration>
  <CORSRule>
    <AllowedOrigin>http://example.com</AllowedOrigin>
    <AllowedMethod>GET</AllowedMethod>
    <AllowedMethod>PUT</AllowedMethod>
    <AllowedHeader>*</AllowedHeader>
    <ExposeHeader>ETag</ExposeHeader>
    <MaxAgeSeconds>3000</MaxAgeSeconds>
  </CORSRule>
</CORSConfiguration>"#;

    #[test]
    fn parses_a_well_formed_config() {
        let config = parse(CONFIG_XML.as_bytes()).unwrap();
        assert_eq!(config.rules.len(), 1);
        assert_eq!(config.rules[0].allowed_methods, vec!["GET", "PUT"]);
        assert_eq!(config.rules[0].max_age_seconds, Some(3000));
    }

    #[test]
    fn rejects_unsupported_method() {
        let xml = CONFIG_XML.replace("GET", "PATCH");
        let err = parse(xml.as_bytes()).unwrap_err();
        assert_eq!(err.code, S3ErrorCode::InvalidRequest);
    }

    #[test]
    fn rejects_multiple_wildcards() {
        let xml = CONFIG_XML.replace("http://example.com", "http://*.*.com");
        let err = parse(xml.as_bytes()).unwrap_err();
        assert_eq!(err.code, S3ErrorCode::MalformedXML);
    }

    #[test]
    fn no_match_yields_no_headers() {
        let config = parse(CONFIG_XML.as_bytes()).unwrap();
        assert!(match_simple_request(&config, "http://other.com", "GET").is_none());
        let headers = match_simple_request(&config, "http://example.com", "GET").unwrap();
        assert_eq!(headers.allow_origin, "http://example.com");
        assert!(headers.allow_credentials);
    }

    #[test]
    fn preflight_without_match_is_an_error() {
        let config = parse(CONFIG_XML.as_bytes()).unwrap();
        assert!(match_preflight(&config, "http://other.com", "GET", &[]).is_err());
        let resp = match_preflight(&config, "http://example.com", "PUT", &["content-type".to_string()]).unwrap();
        assert_eq!(resp.allow_methods, vec!["GET", "PUT"]);
    }

    #[test]
    fn wildcard_origin_rule_disables_credentials() {
        let xml = CONFIG_XML.replace("http://example.com", "*");
        let config = parse(xml.as_bytes()).unwrap();
        let headers = match_simple_request(&config, "http://anything.example", "GET").unwrap();
        assert_eq!(headers.allow_origin, "*");
        assert!(!headers.allow_credentials);
    }
}
