//! Cookie extraction.
//!
//! # Responsibilities
//! - Parse every `Cookie` request header into individual cookies
//! - Turn each cookie into a field bag, omitting unset attributes
//!
//! # Design Decisions
//! - Duplicate names: the last cookie wins, at the position the name first
//!   appeared
//! - Malformed pairs are skipped, they never fail the snapshot

use axum::http::{header, HeaderMap};
use cookie::Cookie;

use crate::snapshot::FieldBag;

/// A cookie as seen by the server.
///
/// Request cookies only carry a name and value; the remaining attributes
/// keep their "unset" values (`max_age = -1`, `version = 0`).
#[derive(Debug, Clone, PartialEq)]
pub struct RequestCookie {
    pub name: String,
    pub value: Option<String>,
    pub comment: Option<String>,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub max_age: i64,
    pub secure: bool,
    pub version: i32,
}

impl RequestCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
            comment: None,
            domain: None,
            path: None,
            max_age: -1,
            secure: false,
            version: 0,
        }
    }

    /// Structured form of this cookie.
    pub fn to_field_bag(&self) -> FieldBag {
        FieldBag::new()
            .with_field_if_value("value", self.value.clone(), Option::is_some)
            .with_field_if_value("comment", self.comment.clone(), Option::is_some)
            .with_field_if_value("domain", self.domain.clone(), Option::is_some)
            .with_field_if_value("max-age", self.max_age, |age| *age >= 0)
            .with_field_if_value("path", self.path.clone(), Option::is_some)
            .with_field_if_value("secure", self.secure, |secure| *secure)
            .with_field_if_value("version", self.version, |version| *version > 0)
    }
}

impl From<Cookie<'_>> for RequestCookie {
    fn from(c: Cookie<'_>) -> Self {
        Self {
            name: c.name().to_string(),
            value: Some(c.value().to_string()),
            comment: None,
            domain: c.domain().map(str::to_string),
            path: c.path().map(str::to_string),
            max_age: c.max_age().map(|d| d.whole_seconds()).unwrap_or(-1),
            secure: c.secure().unwrap_or(false),
            version: 0,
        }
    }
}

/// Parse all cookies carried by `headers`, in header order.
pub fn parse(headers: &HeaderMap) -> Vec<RequestCookie> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .flat_map(|value| {
            let raw = String::from_utf8_lossy(value.as_bytes()).into_owned();
            Cookie::split_parse(raw)
                .filter_map(|parsed| match parsed {
                    Ok(c) => Some(RequestCookie::from(c)),
                    Err(e) => {
                        tracing::debug!(error = %e, "Skipping malformed cookie");
                        None
                    }
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Build the cookie map, or `None` when the request carries no cookies.
pub fn extract(headers: &HeaderMap) -> Option<FieldBag> {
    let cookies = parse(headers);
    if cookies.is_empty() {
        return None;
    }

    Some(
        cookies
            .iter()
            .fold(FieldBag::new(), |bag, c| bag.with_field(c.name.clone(), c.to_field_bag())),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde_json::json;

    fn headers_with(cookies: &[&'static str]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for c in cookies {
            headers.append(header::COOKIE, HeaderValue::from_static(c));
        }
        headers
    }

    #[test]
    fn test_no_cookies_is_absent() {
        assert!(extract(&HeaderMap::new()).is_none());
    }

    #[test]
    fn test_extracts_name_value_pairs() {
        let bag = extract(&headers_with(&["theme=dark; lang=en"])).unwrap();
        assert_eq!(
            serde_json::to_value(&bag).unwrap(),
            json!({
                "theme": {"value": "dark"},
                "lang": {"value": "en"},
            })
        );
    }

    #[test]
    fn test_duplicate_names_last_wins() {
        let bag = extract(&headers_with(&["session=one", "other=x; session=two"])).unwrap();
        assert_eq!(bag.get("session"), Some(&json!({"value": "two"})));
        let keys: Vec<_> = bag.keys().collect();
        assert_eq!(keys, vec!["session", "other"]);
    }

    #[test]
    fn test_empty_value_is_reported() {
        let bag = extract(&headers_with(&["flag="])).unwrap();
        assert_eq!(bag.get("flag"), Some(&json!({"value": ""})));
    }

    #[test]
    fn test_attribute_gating() {
        let cookie = RequestCookie {
            name: "full".into(),
            value: Some("v".into()),
            comment: Some("note".into()),
            domain: Some("example.com".into()),
            path: Some("/".into()),
            max_age: 0,
            secure: true,
            version: 1,
        };
        assert_eq!(
            serde_json::to_value(cookie.to_field_bag()).unwrap(),
            json!({
                "value": "v",
                "comment": "note",
                "domain": "example.com",
                "max-age": 0,
                "path": "/",
                "secure": true,
                "version": 1,
            })
        );

        let bare = RequestCookie::new("bare", "v");
        let keys: Vec<_> = bare.to_field_bag().keys().map(str::to_string).collect();
        assert_eq!(keys, vec!["value"]);
    }
}
