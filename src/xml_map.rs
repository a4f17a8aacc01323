//! Generic XML-to-record mapping.
//!
//! A part's XML is first read into a small element tree and then flattened
//! into a `serde_json::Value` where each element becomes one record:
//!
//! - attributes are copied onto the record under their local name
//!   (`r:id` becomes `id`, namespace declarations are dropped);
//! - child elements become nested keys, holding a single record or, when the
//!   element occurs more than once, an array of records;
//! - element names in the mapper's list set always map to an array, even for
//!   a single occurrence;
//! - an element with only text maps to that text; text alongside attributes or
//!   children is stored under [`TEXT_KEY`];
//! - an element with nothing in it maps to an empty record.
//!
//! The flattened document is then narrowed once into a typed record with
//! [`narrow`], so callers never walk untyped values.

use std::collections::HashSet;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::de::DeserializeOwned;
use serde_json::map::Entry;
use serde_json::{Map, Value};

use crate::error::{Result, XlimagesError};

/// Key holding an element's text when it also has attributes or children.
pub const TEXT_KEY: &str = "_";

/// Element names every OOXML part consumer expects as lists.
pub const DEFAULT_LIST_ELEMENTS: [&str; 4] =
    ["sheet", "Relationship", "oneCellAnchor", "twoCellAnchor"];

/// One parsed element before flattening.
#[derive(Debug, Default)]
struct XmlNode {
    name: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<XmlNode>,
}

/// Maps XML documents to nested records.
#[derive(Debug, Clone)]
pub struct XmlMapper {
    always_list: HashSet<String>,
}

impl Default for XmlMapper {
    fn default() -> Self {
        Self::new(DEFAULT_LIST_ELEMENTS)
    }
}

impl XmlMapper {
    /// Create a mapper that always represents the given element names as lists.
    pub fn new<I, S>(always_list: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            always_list: always_list.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether `name` is always mapped to a list.
    #[must_use]
    pub fn is_list_element(&self, name: &str) -> bool {
        self.always_list.contains(name)
    }

    /// Map an XML document to `{ rootName: record }`.
    ///
    /// # Errors
    /// Returns [`XlimagesError::XmlParse`] carrying `path` and the raw text if
    /// the document is malformed.
    pub fn map_document(&self, path: &str, xml: &str) -> Result<Map<String, Value>> {
        self.map_document_pruned(path, xml, &[])
    }

    /// Like [`XmlMapper::map_document`], but elements named in `pruned` keep
    /// only their attributes. Their content is still checked for
    /// well-formedness but never materialized.
    ///
    /// # Errors
    /// Returns [`XlimagesError::XmlParse`] if the document is malformed.
    pub fn map_document_pruned(
        &self,
        path: &str,
        xml: &str,
        pruned: &[&str],
    ) -> Result<Map<String, Value>> {
        let root = parse_tree(path, xml, pruned)?;
        let mut document = Map::new();
        let name = root.name.clone();
        document.insert(name, self.flatten(root));
        Ok(document)
    }

    /// Map an XML document and narrow it into a typed record.
    ///
    /// # Errors
    /// Returns [`XlimagesError::XmlParse`] for malformed XML and
    /// [`XlimagesError::Schema`] when the document does not fit `T`.
    pub fn map_as<T: DeserializeOwned>(&self, path: &str, xml: &str) -> Result<T> {
        let document = self.map_document(path, xml)?;
        narrow(path, document)
    }

    /// Map a document with `pruned` elements emptied, then narrow it.
    ///
    /// # Errors
    /// See [`XmlMapper::map_as`].
    pub fn map_as_pruned<T: DeserializeOwned>(
        &self,
        path: &str,
        xml: &str,
        pruned: &[&str],
    ) -> Result<T> {
        let document = self.map_document_pruned(path, xml, pruned)?;
        narrow(path, document)
    }

    fn flatten(&self, node: XmlNode) -> Value {
        let XmlNode {
            attributes,
            text,
            children,
            ..
        } = node;

        if attributes.is_empty() && children.is_empty() {
            return if text.is_empty() {
                Value::Object(Map::new())
            } else {
                Value::String(text)
            };
        }

        let mut record = Map::new();
        for (key, value) in attributes {
            record.entry(key).or_insert(Value::String(value));
        }

        for child in children {
            let key = child.name.clone();
            let value = self.flatten(child);
            self.insert_child(&mut record, key, value);
        }

        if !text.is_empty() {
            record.insert(TEXT_KEY.to_string(), Value::String(text));
        }

        Value::Object(record)
    }

    fn insert_child(&self, record: &mut Map<String, Value>, key: String, value: Value) {
        let forced = self.always_list.contains(&key);
        match record.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(if forced {
                    Value::Array(vec![value])
                } else {
                    value
                });
            }
            Entry::Occupied(mut slot) => match slot.get_mut() {
                Value::Array(items) => items.push(value),
                existing => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
            },
        }
    }
}

/// Narrow a mapped document into its typed record.
///
/// # Errors
/// Returns [`XlimagesError::Schema`] naming `path` when the shape does not fit.
pub fn narrow<T: DeserializeOwned>(path: &str, document: Map<String, Value>) -> Result<T> {
    serde_json::from_value(Value::Object(document)).map_err(|e| XlimagesError::Schema {
        path: path.to_string(),
        message: e.to_string(),
    })
}

fn parse_error(path: &str, xml: &str, message: impl Into<String>) -> XlimagesError {
    XlimagesError::XmlParse {
        path: path.to_string(),
        content: xml.to_string(),
        message: message.into(),
    }
}

fn parse_tree(path: &str, xml: &str, pruned: &[&str]) -> Result<XmlNode> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;
    // Depth inside a pruned element; its content is checked but not kept.
    let mut skip_depth = 0usize;

    loop {
        let event = reader.read_event().map_err(|e| {
            parse_error(
                path,
                xml,
                format!("at byte {}: {e}", reader.buffer_position()),
            )
        })?;

        if skip_depth > 0 {
            match event {
                Event::Start(_) => skip_depth += 1,
                Event::End(_) => {
                    skip_depth -= 1;
                    if skip_depth == 0 {
                        close_element(path, xml, &mut stack, &mut root)?;
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            continue;
        }

        match event {
            Event::Start(ref e) => {
                let node = start_node(e).map_err(|m| parse_error(path, xml, m))?;
                if pruned.contains(&node.name.as_str()) {
                    skip_depth = 1;
                }
                stack.push(node);
            }
            Event::Empty(ref e) => {
                let node = start_node(e).map_err(|m| parse_error(path, xml, m))?;
                attach(&mut stack, &mut root, node).map_err(|m| parse_error(path, xml, m))?;
            }
            Event::End(_) => close_element(path, xml, &mut stack, &mut root)?,
            Event::Text(ref t) => {
                let text = t
                    .unescape()
                    .map_err(|e| parse_error(path, xml, e.to_string()))?;
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text);
                }
            }
            Event::CData(ref c) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(c));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(parse_error(
            path,
            xml,
            format!("unexpected end of document inside <{}>", open.name),
        ));
    }

    root.ok_or_else(|| parse_error(path, xml, "document has no root element"))
}

fn close_element(
    path: &str,
    xml: &str,
    stack: &mut Vec<XmlNode>,
    root: &mut Option<XmlNode>,
) -> Result<()> {
    let node = stack
        .pop()
        .ok_or_else(|| parse_error(path, xml, "closing tag without an open element"))?;
    attach(stack, root, node).map_err(|m| parse_error(path, xml, m))
}

fn start_node(e: &BytesStart) -> std::result::Result<XmlNode, String> {
    let name = std::str::from_utf8(e.local_name().as_ref())
        .map_err(|err| err.to_string())?
        .to_string();

    let mut attributes = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| err.to_string())?;
        let key = attr.key.as_ref();
        if key == b"xmlns" || key.starts_with(b"xmlns:") {
            continue;
        }
        let local = std::str::from_utf8(attr.key.local_name().as_ref())
            .map_err(|err| err.to_string())?
            .to_string();
        let value = attr.unescape_value().map_err(|err| err.to_string())?;
        attributes.push((local, value.into_owned()));
    }

    Ok(XmlNode {
        name,
        attributes,
        ..XmlNode::default()
    })
}

fn attach(
    stack: &mut [XmlNode],
    root: &mut Option<XmlNode>,
    node: XmlNode,
) -> std::result::Result<(), String> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
        return Ok(());
    }
    if root.is_some() {
        return Err(format!("second root element <{}>", node.name));
    }
    *root = Some(node);
    Ok(())
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
    use serde_json::json;

    fn map(xml: &str) -> Value {
        Value::Object(XmlMapper::default().map_document("test.xml", xml).unwrap())
    }

    #[test]
    fn test_attributes_and_children_merge_into_one_record() {
        let value = map(r#"<root a="1"><child b="2"/></root>"#);
        assert_eq!(value, json!({"root": {"a": "1", "child": {"b": "2"}}}));
    }

    #[test]
    fn test_text_only_element_becomes_its_text() {
        let value = map("<from><col>3</col><row>7</row></from>");
        assert_eq!(value, json!({"from": {"col": "3", "row": "7"}}));
    }

    #[test]
    fn test_text_next_to_attributes_uses_text_key() {
        let value = map(r#"<root><t xml:space="preserve">hi</t></root>"#);
        assert_eq!(value, json!({"root": {"t": {"space": "preserve", "_": "hi"}}}));
    }

    #[test]
    fn test_repeated_elements_become_arrays() {
        let value = map("<root><item>a</item><item>b</item></root>");
        assert_eq!(value, json!({"root": {"item": ["a", "b"]}}));
    }

    #[test]
    fn test_list_elements_are_arrays_even_when_single() {
        let value = map(r#"<sheets><sheet name="Data" sheetId="1"/></sheets>"#);
        assert_eq!(
            value,
            json!({"sheets": {"sheet": [{"name": "Data", "sheetId": "1"}]}})
        );
    }

    #[test]
    fn test_custom_list_elements() {
        let mapper = XmlMapper::new(["item"]);
        assert!(mapper.is_list_element("item"));
        assert!(!mapper.is_list_element("sheet"));
        let value = Value::Object(mapper.map_document("x", "<root><item/></root>").unwrap());
        assert_eq!(value, json!({"root": {"item": [{}]}}));
    }

    #[test]
    fn test_prefixes_and_namespace_declarations_are_dropped() {
        let value = map(
            r#"<xdr:wsDr xmlns:xdr="urn:x" xmlns:r="urn:r"><xdr:pic><a:blip r:embed="rId4"/></xdr:pic></xdr:wsDr>"#,
        );
        assert_eq!(value, json!({"wsDr": {"pic": {"blip": {"embed": "rId4"}}}}));
    }

    #[test]
    fn test_entities_are_unescaped() {
        let value = map(r#"<sheet name="Fonts &amp; Colors">a &lt; b</sheet>"#);
        assert_eq!(
            value,
            json!({"sheet": {"name": "Fonts & Colors", "_": "a < b"}})
        );
    }

    #[test]
    fn test_malformed_xml_reports_path_and_content() {
        let xml = "<root><open></root>";
        let err = XmlMapper::default().map_document("xl/broken.xml", xml).unwrap_err();
        match err {
            XlimagesError::XmlParse { path, content, .. } => {
                assert_eq!(path, "xl/broken.xml");
                assert_eq!(content, xml);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unclosed_document_is_an_error() {
        let err = XmlMapper::default().map_document("x.xml", "<root><a>").unwrap_err();
        assert!(matches!(err, XlimagesError::XmlParse { .. }));
    }

    #[test]
    fn test_empty_document_is_an_error() {
        let err = XmlMapper::default().map_document("x.xml", "").unwrap_err();
        assert!(matches!(err, XlimagesError::XmlParse { .. }));
    }

    #[test]
    fn test_pruned_elements_keep_attributes_only() {
        let xml = r#"<worksheet><sheetData r="x"><row r="1"><c r="A1"><v>1</v></c></row></sheetData><drawing id="rId1"/></worksheet>"#;
        let value = Value::Object(
            XmlMapper::default()
                .map_document_pruned("s.xml", xml, &["sheetData"])
                .unwrap(),
        );
        assert_eq!(
            value,
            json!({"worksheet": {"sheetData": {"r": "x"}, "drawing": {"id": "rId1"}}})
        );
    }

    #[test]
    fn test_pruned_content_must_still_be_well_formed() {
        let xml = "<worksheet><sheetData><row></c></sheetData></worksheet>";
        let err = XmlMapper::default()
            .map_document_pruned("s.xml", xml, &["sheetData"])
            .unwrap_err();
        assert!(matches!(err, XlimagesError::XmlParse { .. }));
    }

    #[test]
    fn test_narrow_reports_schema_mismatch() {
        #[derive(Debug, serde::Deserialize)]
        struct Doc {
            #[allow(dead_code)]
            workbook: Map<String, Value>,
        }

        let mapper = XmlMapper::default();
        assert!(mapper.map_as::<Doc>("wb.xml", "<workbook a=\"1\"/>").is_ok());
        let err = mapper.map_as::<Doc>("wb.xml", "<other/>").unwrap_err();
        assert!(matches!(err, XlimagesError::Schema { ref path, .. } if path == "wb.xml"));
    }
}
