//! Resolution options.
//!
//! Every field has a default matching the usual XLSX layout, so an empty JSON
//! object (or no config at all) is valid.

use serde::Deserialize;

use crate::error::Result;
use crate::xml_map::{XmlMapper, DEFAULT_LIST_ELEMENTS};

/// Options controlling how a package is walked.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct ResolveOptions {
    /// Path of the workbook descriptor part.
    pub workbook_part: String,
    /// Element names always mapped as lists when reading parts.
    ///
    /// The built-in names are always included, so this only ever adds.
    pub list_elements: Vec<String>,
    /// Only image relationships of a drawing are joined against anchors.
    ///
    /// When false, every relationship a drawing declares must be matched by
    /// an anchor.
    pub image_relationships_only: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            workbook_part: "xl/workbook.xml".to_string(),
            list_elements: Vec::new(),
            image_relationships_only: true,
        }
    }
}

impl ResolveOptions {
    /// Parse options from JSON.
    ///
    /// # Errors
    /// Returns [`crate::error::XlimagesError::Json`] for invalid JSON or unknown keys.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Build the record mapper these options describe.
    #[must_use]
    pub fn mapper(&self) -> XmlMapper {
        XmlMapper::new(
            DEFAULT_LIST_ELEMENTS
                .iter()
                .map(ToString::to_string)
                .chain(self.list_elements.iter().cloned()),
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_is_default() {
        assert_eq!(ResolveOptions::from_json("{}").unwrap(), ResolveOptions::default());
    }

    #[test]
    fn test_partial_override() {
        let options =
            ResolveOptions::from_json(r#"{"imageRelationshipsOnly": false}"#).unwrap();
        assert!(!options.image_relationships_only);
        assert_eq!(options.workbook_part, "xl/workbook.xml");
        assert!(options.mapper().is_list_element("twoCellAnchor"));
    }

    #[test]
    fn test_list_elements_extend_the_defaults() {
        let options = ResolveOptions::from_json(r#"{"listElements": ["si"]}"#).unwrap();
        let mapper = options.mapper();
        assert!(mapper.is_list_element("si"));
        assert!(mapper.is_list_element("oneCellAnchor"));
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(ResolveOptions::from_json(r#"{"workbookPath": "x"}"#).is_err());
    }
}
