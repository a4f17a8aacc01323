//! Shared XML helpers.
//!
//! Attribute extraction for the streaming readers (worksheet cells, the sheet
//! patcher) and serde adapters for values that the record mapper leaves as
//! text, such as `<xdr:col>3</xdr:col>`.

use quick_xml::events::BytesStart;
use serde::{Deserialize, Deserializer};

/// Extract a string attribute value by key.
///
/// Returns `None` if the attribute is missing or not valid UTF-8.
pub fn attr_string(e: &BytesStart, key: &[u8]) -> Option<String> {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == key {
            return attr.unescape_value().ok().map(|s| s.into_owned());
        }
    }
    None
}

/// Extract a `u32` attribute value by key.
pub fn attr_u32(e: &BytesStart, key: &[u8]) -> Option<u32> {
    attr_string(e, key).and_then(|s| s.parse().ok())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TextOrNumber {
    Text(String),
    Number(u64),
}

/// Deserialize a `u32` held either as text or as a number.
pub fn u32_from_text<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    match TextOrNumber::deserialize(deserializer)? {
        TextOrNumber::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
        TextOrNumber::Number(n) => u32::try_from(n).map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;

    fn make_start(xml: &str) -> BytesStart<'_> {
        // Strip < and > / /> to get just the tag content
        let content = xml
            .trim_start_matches('<')
            .trim_end_matches('>')
            .trim_end_matches('/')
            .trim_end();
        BytesStart::from_content(content, content.find(' ').unwrap_or(content.len()))
    }

    #[test]
    fn test_attr_string() {
        let e = make_start(r#"<c r="B3" t="s" />"#);
        assert_eq!(attr_string(&e, b"r"), Some("B3".to_string()));
        assert_eq!(attr_string(&e, b"missing"), None);
    }

    #[test]
    fn test_attr_string_unescapes() {
        let e = make_start(r#"<sheet name="A &amp; B" />"#);
        assert_eq!(attr_string(&e, b"name"), Some("A & B".to_string()));
    }

    #[test]
    fn test_attr_u32() {
        let e = make_start(r#"<row r="42" />"#);
        assert_eq!(attr_u32(&e, b"r"), Some(42));
        assert_eq!(attr_u32(&e, b"missing"), None);
    }

    #[test]
    fn test_u32_from_text() {
        #[derive(Deserialize)]
        struct Pair {
            #[serde(deserialize_with = "u32_from_text")]
            col: u32,
        }

        let p: Pair = serde_json::from_str(r#"{"col": " 12 "}"#).unwrap();
        assert_eq!(p.col, 12);
        let p: Pair = serde_json::from_str(r#"{"col": 7}"#).unwrap();
        assert_eq!(p.col, 7);
        assert!(serde_json::from_str::<Pair>(r#"{"col": "x"}"#).is_err());
    }
}
