//! Relationship parts (`_rels/*.rels`).
//!
//! A relationship part maps local ids (`rId1`, ...) declared by its source
//! part to target parts. Ids are only unique within one relationship part, so
//! a table is always tied to the part that declared it.

use serde::Deserialize;

use crate::error::Result;
use crate::package::{normalize_part_path, Package};
use crate::xml_map::XmlMapper;

#[derive(Debug, Deserialize)]
struct RelationshipsDocument {
    #[serde(rename = "Relationships")]
    relationships: RelationshipsRecord,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RelationshipsRecord {
    #[serde(rename = "Relationship")]
    relationship: Vec<RelationshipRecord>,
}

#[derive(Debug, Deserialize)]
struct RelationshipRecord {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Type", default)]
    rel_type: String,
    #[serde(rename = "Target")]
    target: String,
    #[serde(rename = "TargetMode", default)]
    target_mode: Option<String>,
}

/// One resolved relationship.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    /// Package path of the target, or the raw target for external links.
    pub target: String,
    pub external: bool,
}

/// Relationships declared by one source part, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationshipTable {
    /// Path of the `.rels` part the table was read from
    pub path: String,
    entries: Vec<Relationship>,
}

impl RelationshipTable {
    /// Look up a relationship by id. The comparison is exact.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Relationship> {
        self.entries.iter().find(|rel| rel.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Relationship> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keep only relationships matching `keep`.
    #[must_use]
    pub fn retain_type(mut self, keep: impl Fn(&str) -> bool) -> Self {
        self.entries.retain(|rel| keep(&rel.rel_type));
        self
    }
}

/// Read the relationship table declared by `source_part`.
///
/// Returns `Ok(None)` if the part has no relationship part.
///
/// # Errors
/// Returns an error if the relationship part is malformed.
pub fn read_relationships(
    package: &Package,
    mapper: &XmlMapper,
    source_part: &str,
) -> Result<Option<RelationshipTable>> {
    let rels_path = construct_rels_path(normalize_part_path(source_part));
    let Some(xml) = package.part_text(&rels_path)? else {
        return Ok(None);
    };

    let document: RelationshipsDocument = mapper.map_as(&rels_path, &xml)?;
    let base_dir = part_dir(normalize_part_path(source_part));

    let entries = document
        .relationships
        .relationship
        .into_iter()
        .map(|record| {
            let external = record
                .target_mode
                .as_deref()
                .is_some_and(|mode| mode.eq_ignore_ascii_case("External"));
            let target = if external {
                record.target
            } else {
                resolve_relative_path(base_dir, &record.target)
            };
            Relationship {
                id: record.id,
                rel_type: record.rel_type,
                target,
                external,
            }
        })
        .collect();

    Ok(Some(RelationshipTable {
        path: rels_path,
        entries,
    }))
}

/// Directory part of a package path ("xl/worksheets/sheet1.xml" -> "xl/worksheets").
pub fn part_dir(path: &str) -> &str {
    path.rfind('/').map_or("", |pos| &path[..pos])
}

/// Construct the relationships file path from a file path
/// e.g., "xl/drawings/drawing1.xml" -> "xl/drawings/_rels/drawing1.xml.rels"
pub fn construct_rels_path(file_path: &str) -> String {
    if let Some(pos) = file_path.rfind('/') {
        let dir = &file_path[..pos];
        let filename = &file_path[pos + 1..];
        format!("{dir}/_rels/{filename}.rels")
    } else {
        format!("_rels/{file_path}.rels")
    }
}

/// Resolve a relative path against a base directory
///
/// Handles paths like "../media/image1.png" relative to "xl/drawings"
pub fn resolve_relative_path(base_dir: &str, relative: &str) -> String {
    // If path is absolute (starts with /), just remove the leading slash
    if let Some(stripped) = relative.strip_prefix('/') {
        return stripped.to_string();
    }

    let mut components: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();

    for part in relative.split('/') {
        match part {
            ".." => {
                components.pop();
            }
            "." | "" => {}
            _ => components.push(part),
        }
    }

    components.join("/")
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
    use crate::namespaces::is_image_relationship;

    const DRAWING_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="../media/image2.png"/>
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="/xl/media/image1.png"/>
  <Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink" Target="https://example.com" TargetMode="External"/>
</Relationships>"#;

    fn package_with(path: &str, xml: &str) -> Package {
        let mut package = Package::in_memory();
        package.insert_part(path, xml);
        package
    }

    #[test]
    fn test_read_relationships_resolves_targets() {
        let package = package_with("xl/drawings/_rels/drawing1.xml.rels", DRAWING_RELS);
        let table = read_relationships(&package, &XmlMapper::default(), "xl/drawings/drawing1.xml")
            .unwrap()
            .unwrap();

        assert_eq!(table.path, "xl/drawings/_rels/drawing1.xml.rels");
        assert_eq!(table.len(), 3);
        let ids: Vec<&str> = table.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["rId2", "rId1", "rId3"]);

        assert_eq!(table.get("rId2").unwrap().target, "xl/media/image2.png");
        assert_eq!(table.get("rId1").unwrap().target, "xl/media/image1.png");
        let link = table.get("rId3").unwrap();
        assert!(link.external);
        assert_eq!(link.target, "https://example.com");
    }

    #[test]
    fn test_lookup_is_exact() {
        let package = package_with("xl/drawings/_rels/drawing1.xml.rels", DRAWING_RELS);
        let table = read_relationships(&package, &XmlMapper::default(), "xl/drawings/drawing1.xml")
            .unwrap()
            .unwrap();

        assert_eq!(table.get("rId1").unwrap().target, "xl/media/image1.png");
        assert!(table.get("rid1").is_none());
        assert!(table.get("rId").is_none());
        assert!(table.get("").is_none());
    }

    #[test]
    fn test_retain_type() {
        let package = package_with("xl/drawings/_rels/drawing1.xml.rels", DRAWING_RELS);
        let table = read_relationships(&package, &XmlMapper::default(), "xl/drawings/drawing1.xml")
            .unwrap()
            .unwrap()
            .retain_type(is_image_relationship);
        assert_eq!(table.len(), 2);
        assert!(table.get("rId3").is_none());
    }

    #[test]
    fn test_single_relationship_is_still_a_table() {
        let xml = r#"<Relationships><Relationship Id="rId1" Type="t" Target="x.xml"/></Relationships>"#;
        let package = package_with("_rels/root.xml.rels", xml);
        let table = read_relationships(&package, &XmlMapper::default(), "root.xml")
            .unwrap()
            .unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("rId1").unwrap().target, "x.xml");
    }

    #[test]
    fn test_empty_and_missing_tables() {
        let package = package_with("xl/_rels/workbook.xml.rels", "<Relationships/>");
        let mapper = XmlMapper::default();
        let table = read_relationships(&package, &mapper, "xl/workbook.xml").unwrap().unwrap();
        assert!(table.is_empty());
        assert!(read_relationships(&package, &mapper, "xl/other.xml").unwrap().is_none());
    }

    #[test]
    fn test_resolve_relative_path() {
        // Basic relative path
        assert_eq!(
            resolve_relative_path("xl/drawings", "image1.png"),
            "xl/drawings/image1.png"
        );

        // Parent directory
        assert_eq!(
            resolve_relative_path("xl/drawings", "../media/image1.png"),
            "xl/media/image1.png"
        );

        // Multiple parent directories
        assert_eq!(
            resolve_relative_path("xl/drawings/sub", "../../media/image1.png"),
            "xl/media/image1.png"
        );

        // Absolute path
        assert_eq!(
            resolve_relative_path("xl/drawings", "/xl/media/image1.png"),
            "xl/media/image1.png"
        );

        // Current directory
        assert_eq!(
            resolve_relative_path("xl/drawings", "./image1.png"),
            "xl/drawings/image1.png"
        );
    }

    #[test]
    fn test_construct_rels_path() {
        assert_eq!(
            construct_rels_path("xl/drawings/drawing1.xml"),
            "xl/drawings/_rels/drawing1.xml.rels"
        );

        assert_eq!(
            construct_rels_path("xl/worksheets/sheet1.xml"),
            "xl/worksheets/_rels/sheet1.xml.rels"
        );

        assert_eq!(
            construct_rels_path("workbook.xml"),
            "_rels/workbook.xml.rels"
        );
    }

    #[test]
    fn test_part_dir() {
        assert_eq!(part_dir("xl/worksheets/sheet1.xml"), "xl/worksheets");
        assert_eq!(part_dir("workbook.xml"), "");
    }
}
