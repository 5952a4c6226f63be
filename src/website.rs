//! Static-website configuration model, parsing, and routing-rule
//! evaluation.
//!
//! Parsing follows the same hand-rolled `quick-xml` reader style as
//! `cors.rs`. The actual request flow (index/error document resolution,
//! directory-prefix redirects, `WebsiteRedirectLocation`) is orchestrated
//! by `handlers::website`, which calls into the pure functions here.

use crate::error::{S3Error, S3ErrorCode, S3Result};
use quick_xml::events::Event;
use quick_xml::reader::Reader;

#[derive(Debug, Clone, Default)]
pub struct Redirect {
    pub protocol: Option<String>,
    pub host_name: Option<String>,
    pub replace_key_prefix_with: Option<String>,
    pub replace_key_with: Option<String>,
    pub http_redirect_code: Option<u16>,
}

#[derive(Debug, Clone, Default)]
pub struct Condition {
    pub key_prefix_equals: Option<String>,
    pub http_error_code_returned_equals: Option<u16>,
}

#[derive(Debug, Clone)]
pub struct RoutingRule {
    pub condition: Option<Condition>,
    pub redirect: Redirect,
}

#[derive(Debug, Clone, Default)]
pub struct WebsiteConfiguration {
    pub index_document: String,
    pub error_document: Option<String>,
    pub redirect_all_requests_to: Option<Redirect>,
    pub routing_rules: Vec<RoutingRule>,
}

#[derive(Default)]
struct PartialRedirect {
    protocol: Option<String>,
    host_name: Option<String>,
    replace_key_prefix_with: Option<String>,
    replace_key_with: Option<String>,
    http_redirect_code: Option<u16>,
}

impl PartialRedirect {
    fn finish(self) -> S3Result<Redirect> {
        if self.replace_key_with.is_some() && self.replace_key_prefix_with.is_some() {
            return Err(S3Error::with_message(
                S3ErrorCode::MalformedXML,
                "ReplaceKeyPrefixWith and ReplaceKeyWith are mutually exclusive.",
            ));
        }
        Ok(Redirect {
            protocol: self.protocol,
            host_name: self.host_name,
            replace_key_prefix_with: self.replace_key_prefix_with,
            replace_key_with: self.replace_key_with,
            http_redirect_code: self.http_redirect_code,
        })
    }
}

pub fn parse(xml: &[u8]) -> S3Result<WebsiteConfiguration> {
    let mut reader = Reader::from_reader(xml);
    let cfg = reader.config_mut();
    cfg.trim_text_start = true;
    cfg.trim_text_end = true;

    let mut config = WebsiteConfiguration::default();
    let mut stack: Vec<String> = Vec::new();

    let mut current_rule_condition: Option<Condition> = None;
    let mut current_rule_redirect: Option<PartialRedirect> = None;
    let mut current_top_redirect: Option<PartialRedirect> = None;
    let mut in_routing_rule = false;

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf).map_err(|e| S3Error::with_message(S3ErrorCode::MalformedXML, e.to_string()))? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match name.as_str() {
                    "RoutingRule" => {
                        in_routing_rule = true;
                        current_rule_condition = None;
                        current_rule_redirect = Some(PartialRedirect::default());
                    }
                    "Condition" => current_rule_condition = Some(Condition::default()),
                    "Redirect" if !in_routing_rule => current_top_redirect = Some(PartialRedirect::default()),
                    _ => {}
                }
                stack.push(name);
            }
            Event::Text(t) => {
                let text = t.unescape().map_err(|e| S3Error::with_message(S3ErrorCode::MalformedXML, e.to_string()))?.to_string();
                match stack.last().map(|s| s.as_str()) {
                    Some("Suffix") => config.index_document = text,
                    Some("Key") if stack.iter().any(|s| s == "ErrorDocument") => config.error_document = Some(text),
                    Some("KeyPrefixEquals") => {
                        if let Some(c) = current_rule_condition.as_mut() {
                            c.key_prefix_equals = Some(text);
                        }
                    }
                    Some("HttpErrorCodeReturnedEquals") => {
                        if let Some(c) = current_rule_condition.as_mut() {
                            c.http_error_code_returned_equals =
                                Some(text.parse().map_err(|_| S3Error::new(S3ErrorCode::MalformedXML))?);
                        }
                    }
                    Some("Protocol") => {
                        if text != "http" && text != "https" {
                            return Err(S3Error::with_message(S3ErrorCode::InvalidRequest, "Protocol must be http or https."));
                        }
                        set_redirect_field(&mut current_rule_redirect, &mut current_top_redirect, in_routing_rule, |r| r.protocol = Some(text.clone()));
                    }
                    Some("HostName") => {
                        set_redirect_field(&mut current_rule_redirect, &mut current_top_redirect, in_routing_rule, |r| r.host_name = Some(text.clone()));
                    }
                    Some("ReplaceKeyPrefixWith") => {
                        set_redirect_field(&mut current_rule_redirect, &mut current_top_redirect, in_routing_rule, |r| r.replace_key_prefix_with = Some(text.clone()));
                    }
                    Some("ReplaceKeyWith") => {
                        set_redirect_field(&mut current_rule_redirect, &mut current_top_redirect, in_routing_rule, |r| r.replace_key_with = Some(text.clone()));
                    }
                    Some("HttpRedirectCode") => {
                        let code: u16 = text.parse().map_err(|_| S3Error::new(S3ErrorCode::MalformedXML))?;
                        set_redirect_field(&mut current_rule_redirect, &mut current_top_redirect, in_routing_rule, |r| r.http_redirect_code = Some(code));
                    }
                    _ => {}
                }
            }
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match name.as_str() {
                    "RoutingRule" => {
                        if let Some(cond) = &current_rule_condition {
                            if cond.key_prefix_equals.is_none() && cond.http_error_code_returned_equals.is_none() {
                                return Err(S3Error::with_message(
                                    S3ErrorCode::MalformedXML,
                                    "Condition requires at least one of KeyPrefixEquals or HttpErrorCodeReturnedEquals.",
                                ));
                            }
                        }
                        let redirect = current_rule_redirect.take().unwrap_or_default().finish()?;
                        config.routing_rules.push(RoutingRule {
                            condition: current_rule_condition.take(),
                            redirect,
                        });
                        in_routing_rule = false;
                    }
                    "Redirect" if !in_routing_rule => {
                        if let Some(partial) = current_top_redirect.take() {
                            config.redirect_all_requests_to = Some(partial.finish()?);
                        }
                    }
                    _ => {}
                }
                stack.pop();
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(config)
}

fn set_redirect_field(
    rule_redirect: &mut Option<PartialRedirect>,
    top_redirect: &mut Option<PartialRedirect>,
    in_routing_rule: bool,
    apply: impl FnOnce(&mut PartialRedirect),
) {
    let target = if in_routing_rule { rule_redirect.as_mut() } else { top_redirect.as_mut() };
    if let Some(r) = target {
        apply(r);
    }
}

fn condition_matches(condition: &Condition, key: &str, would_be_status: Option<u16>) -> bool {
    let prefix_ok = condition.key_prefix_equals.as_deref().map_or(true, |p| key.starts_with(p));
    let status_ok = condition
        .http_error_code_returned_equals
        .map_or(true, |code| would_be_status == Some(code));
    prefix_ok && status_ok
}

fn transform_key(rule: &RoutingRule, key: &str) -> String {
    if let Some(replacement) = &rule.redirect.replace_key_with {
        return replacement.clone();
    }
    let prefix = rule
        .condition
        .as_ref()
        .and_then(|c| c.key_prefix_equals.as_deref())
        .unwrap_or("");
    let replace_with = rule.redirect.replace_key_prefix_with.as_deref().unwrap_or("");
    format!("{replace_with}{}", &key[prefix.len().min(key.len())..])
}

pub struct RoutingRedirect {
    pub location: String,
    pub status: u16,
}

/// Evaluate routing rules in order against the current key and the status
/// that would otherwise be returned; the first matching rule wins.
///
/// `path_style_bucket` is the bucket name when the original request was
/// addressed path-style, `None` for vhost/CNAME addressing — the former
/// must repeat the bucket segment in the redirect location, the latter
/// never had one in the path to begin with.
pub fn evaluate_routing_rules(
    config: &WebsiteConfiguration,
    key: &str,
    would_be_status: Option<u16>,
    default_protocol: &str,
    default_host: &str,
    path_style_bucket: Option<&str>,
) -> Option<RoutingRedirect> {
    let rule = config
        .routing_rules
        .iter()
        .find(|rule| rule.condition.as_ref().map_or(true, |c| condition_matches(c, key, would_be_status)))?;

    let protocol = rule.redirect.protocol.as_deref().unwrap_or(default_protocol);
    let host = rule.redirect.host_name.as_deref().unwrap_or(default_host);
    let transformed_key = transform_key(rule, key);
    let location = match path_style_bucket {
        Some(bucket) => format!("{protocol}://{host}/{bucket}/{transformed_key}"),
        None => format!("{protocol}://{host}/{transformed_key}"),
    };
    Some(RoutingRedirect {
        location,
        status: rule.redirect.http_redirect_code.unwrap_or(301),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<WebsiteConfiguration>
  <IndexDocument><Suffix>index.html</Suffix></IndexDocument>
  <ErrorDocument><Key>error.html</Key></ErrorDocument>
  <RoutingRules>
    <RoutingRule>
      <Condition>
        <KeyPrefixEquals>test</KeyPrefixEquals>
      </Condition>
      <Redirect>
        <ReplaceKeyPrefixWith>replacement</ReplaceKeyPrefixWith>
      </Redirect>
    </RoutingRule>
  </RoutingRules>
</WebsiteConfiguration>"#;

    #[test]
    fn parses_index_error_and_routing_rules() {
        let config = parse(CONFIG_XML.as_bytes()).unwrap();
        assert_eq!(config.index_document, "index.html");
        assert_eq!(config.error_document.as_deref(), Some("error.html"));
        assert_eq!(config.routing_rules.len(), 1);
    }

    #[test]
    fn routing_rule_replaces_key_prefix() {
        let config = parse(CONFIG_XML.as_bytes()).unwrap();
        let redirect = evaluate_routing_rules(&config, "test/key", None, "http", "example.com", None).unwrap();
        assert_eq!(redirect.location, "http://example.com/replacement/key");
        assert_eq!(redirect.status, 301);
    }

    #[test]
    fn routing_rule_keeps_bucket_segment_for_path_style_requests() {
        let config = parse(CONFIG_XML.as_bytes()).unwrap();
        let redirect = evaluate_routing_rules(&config, "test/key", None, "http", "example.com", Some("site")).unwrap();
        assert_eq!(redirect.location, "http://example.com/site/replacement/key");
    }

    #[test]
    fn condition_requires_at_least_one_field() {
        let xml = CONFIG_XML.replace("<KeyPrefixEquals>test</KeyPrefixEquals>", "");
        assert!(parse(xml.as_bytes()).is_err());
    }

    #[test]
    fn mutually_exclusive_replace_fields_rejected() {
        let xml = CONFIG_XML.replace(
            "<ReplaceKeyPrefixWith>replacement</ReplaceKeyPrefixWith>",
            "<ReplaceKeyPrefixWith>replacement</ReplaceKeyPrefixWith><ReplaceKeyWith>other</ReplaceKeyWith>",
        );
        assert!(parse(xml.as_bytes()).is_err());
    }
}
