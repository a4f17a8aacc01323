//! Drawing parts: locating a sheet's drawing and reading its anchors.
//!
//! # XLSX Drawing Structure
//!
//! A worksheet declares at most one drawing with `<drawing r:id="..."/>`. The
//! id resolves through the worksheet's relationships
//! (`xl/worksheets/_rels/sheet*.xml.rels`) to a drawing part such as
//! `xl/drawings/drawing1.xml`.
//!
//! The drawing holds anchor elements that tie objects to cells:
//! - `twoCellAnchor`: anchored to a `from` cell and a `to` cell
//! - `oneCellAnchor`: anchored to a `from` cell with an absolute size
//!
//! A picture inside an anchor references its bytes via `a:blip r:embed`, which
//! resolves through the drawing's own relationships
//! (`xl/drawings/_rels/drawing*.xml.rels`) to a media part in `xl/media/`.

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::{Result, XlimagesError};
use crate::namespaces::{is_drawing_relationship, is_image_relationship};
use crate::options::ResolveOptions;
use crate::package::Package;
use crate::parser::relationships::{read_relationships, RelationshipTable};
use crate::parser::worksheet::worksheet_drawing_id;
use crate::types::{Anchor, CellCoordinate, Sheet};
use crate::xml_helpers::u32_from_text;
use crate::xml_map::XmlMapper;

#[derive(Debug, Deserialize)]
struct DrawingDocument {
    #[serde(rename = "wsDr")]
    ws_dr: DrawingRecord,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DrawingRecord {
    #[serde(rename = "oneCellAnchor")]
    one_cell_anchors: Vec<OneCellAnchorRecord>,
    #[serde(rename = "twoCellAnchor")]
    two_cell_anchors: Vec<TwoCellAnchorRecord>,
}

#[derive(Debug, Deserialize)]
struct OneCellAnchorRecord {
    from: MarkerRecord,
    #[serde(default)]
    pic: Option<PictureRecord>,
}

#[derive(Debug, Deserialize)]
struct TwoCellAnchorRecord {
    from: MarkerRecord,
    to: MarkerRecord,
    #[serde(default)]
    pic: Option<PictureRecord>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct MarkerRecord {
    #[serde(deserialize_with = "u32_from_text")]
    col: u32,
    #[serde(deserialize_with = "u32_from_text")]
    row: u32,
}

impl From<MarkerRecord> for CellCoordinate {
    fn from(marker: MarkerRecord) -> Self {
        Self::new(marker.row, marker.col)
    }
}

#[derive(Debug, Deserialize)]
struct PictureRecord {
    #[serde(rename = "blipFill", default)]
    blip_fill: Option<BlipFillRecord>,
}

#[derive(Debug, Deserialize)]
struct BlipFillRecord {
    #[serde(default)]
    blip: Option<BlipRecord>,
}

#[derive(Debug, Deserialize)]
struct BlipRecord {
    #[serde(default)]
    embed: Option<String>,
}

impl PictureRecord {
    fn embed_id(&self) -> Option<&str> {
        self.blip_fill.as_ref()?.blip.as_ref()?.embed.as_deref()
    }
}

/// An anchor as declared, before the two shapes are unified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RawAnchor {
    OneCell {
        from: CellCoordinate,
    },
    TwoCell {
        from: CellCoordinate,
        to: CellCoordinate,
    },
}

impl From<RawAnchor> for Anchor {
    fn from(raw: RawAnchor) -> Self {
        match raw {
            RawAnchor::OneCell { from } => Anchor::single(from),
            RawAnchor::TwoCell { from, to } => Anchor { from, to },
        }
    }
}

/// A located drawing: its XML and the relationships it declares.
#[derive(Debug, Clone)]
pub struct DrawingParts {
    /// Package path of the drawing part
    pub path: String,
    pub xml: String,
    pub relationships: RelationshipTable,
}

/// Find the drawing a sheet declares.
///
/// Returns `Ok(None)` when the worksheet declares no drawing. Once a drawing
/// is declared, every part it links to must exist.
///
/// # Errors
/// Returns [`XlimagesError::DrawingResolution`] if the worksheet relationships,
/// the drawing part, or the drawing relationships are missing, and
/// [`XlimagesError::XmlParse`] if any of them is malformed.
pub fn locate_drawing(
    package: &Package,
    mapper: &XmlMapper,
    sheet: &Sheet,
    options: &ResolveOptions,
) -> Result<Option<DrawingParts>> {
    let Some(drawing_id) = worksheet_drawing_id(package, mapper, &sheet.path)? else {
        log::debug!("sheet '{}' declares no drawing", sheet.name);
        return Ok(None);
    };

    let sheet_rels = read_relationships(package, mapper, &sheet.path)?.ok_or_else(|| {
        XlimagesError::drawing(
            &sheet.name,
            format!("{} declares drawing {drawing_id} but has no relationships", sheet.path),
        )
    })?;

    let relationship = sheet_rels.get(&drawing_id).ok_or_else(|| {
        XlimagesError::drawing(
            &sheet.name,
            format!("relationship {drawing_id} is not declared in {}", sheet_rels.path),
        )
    })?;

    if relationship.external || !is_drawing_relationship(&relationship.rel_type) {
        return Err(XlimagesError::drawing(
            &sheet.name,
            format!("relationship {drawing_id} does not target a drawing part"),
        ));
    }

    let path = relationship.target.clone();
    log::debug!("sheet '{}': drawing {drawing_id} -> {path}", sheet.name);

    let xml = package.part_text(&path)?.ok_or_else(|| {
        XlimagesError::drawing(&sheet.name, format!("drawing part {path} is missing"))
    })?;

    let mut relationships = read_relationships(package, mapper, &path)?.ok_or_else(|| {
        XlimagesError::drawing(
            &sheet.name,
            format!("drawing part {path} has no relationships"),
        )
    })?;

    if options.image_relationships_only {
        relationships = relationships.retain_type(is_image_relationship);
    }
    log::debug!(
        "sheet '{}': {} media relationships in {}",
        sheet.name,
        relationships.len(),
        relationships.path
    );

    Ok(Some(DrawingParts {
        path,
        xml,
        relationships,
    }))
}

/// Anchors of one drawing, grouped by the relationship id of their picture.
///
/// One id may carry several anchors when an image is placed more than once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnchorIndex {
    by_id: HashMap<String, Vec<Anchor>>,
}

impl AnchorIndex {
    /// Anchors for `relationship_id`, in declaration order.
    #[must_use]
    pub fn get(&self, relationship_id: &str) -> Option<&[Anchor]> {
        self.by_id.get(relationship_id).map(Vec::as_slice)
    }

    /// Number of distinct relationship ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Total anchors across all ids.
    #[must_use]
    pub fn anchor_count(&self) -> usize {
        self.by_id.values().map(Vec::len).sum()
    }

    fn push(&mut self, relationship_id: String, anchor: Anchor) {
        self.by_id.entry(relationship_id).or_default().push(anchor);
    }
}

/// Read the picture anchors of a drawing.
///
/// One-cell anchors come first, then two-cell anchors, each in document
/// order. Anchors without an embedded picture (charts, shapes, linked images)
/// are skipped.
///
/// # Errors
/// Returns [`XlimagesError::XmlParse`] or [`XlimagesError::Schema`] if the
/// drawing cannot be read.
pub fn extract_anchors(mapper: &XmlMapper, drawing_path: &str, xml: &str) -> Result<AnchorIndex> {
    let document: DrawingDocument = mapper.map_as(drawing_path, xml)?;
    let DrawingRecord {
        one_cell_anchors,
        two_cell_anchors,
    } = document.ws_dr;

    let one_cell = one_cell_anchors.into_iter().map(|record| {
        let raw = RawAnchor::OneCell {
            from: record.from.into(),
        };
        (raw, record.pic)
    });
    let two_cell = two_cell_anchors.into_iter().map(|record| {
        let raw = RawAnchor::TwoCell {
            from: record.from.into(),
            to: record.to.into(),
        };
        (raw, record.pic)
    });

    let mut index = AnchorIndex::default();
    for (raw, pic) in one_cell.chain(two_cell) {
        let anchor = Anchor::from(raw);
        match pic.as_ref().and_then(PictureRecord::embed_id) {
            Some(id) => index.push(id.to_string(), anchor),
            None => log::warn!(
                "{drawing_path}: anchor at {} holds no embedded picture, skipping",
                anchor.from
            ),
        }
    }

    Ok(index)
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

    const DRAWING_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<xdr:wsDr xmlns:xdr="http://schemas.openxmlformats.org/drawingml/2006/spreadsheetDrawing" xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
  <xdr:twoCellAnchor editAs="oneCell">
    <xdr:from><xdr:col>1</xdr:col><xdr:colOff>0</xdr:colOff><xdr:row>2</xdr:row><xdr:rowOff>0</xdr:rowOff></xdr:from>
    <xdr:to><xdr:col>3</xdr:col><xdr:colOff>0</xdr:colOff><xdr:row>4</xdr:row><xdr:rowOff>0</xdr:rowOff></xdr:to>
    <xdr:pic>
      <xdr:nvPicPr><xdr:cNvPr id="2" name="Picture 1"/><xdr:cNvPicPr/></xdr:nvPicPr>
      <xdr:blipFill><a:blip r:embed="rId1"/><a:stretch><a:fillRect/></a:stretch></xdr:blipFill>
    </xdr:pic>
    <xdr:clientData/>
  </xdr:twoCellAnchor>
  <xdr:oneCellAnchor>
    <xdr:from><xdr:col>5</xdr:col><xdr:colOff>0</xdr:colOff><xdr:row>0</xdr:row><xdr:rowOff>0</xdr:rowOff></xdr:from>
    <xdr:ext cx="100" cy="100"/>
    <xdr:pic>
      <xdr:blipFill><a:blip r:embed="rId2"/></xdr:blipFill>
    </xdr:pic>
    <xdr:clientData/>
  </xdr:oneCellAnchor>
  <xdr:twoCellAnchor>
    <xdr:from><xdr:col>0</xdr:col><xdr:row>10</xdr:row></xdr:from>
    <xdr:to><xdr:col>2</xdr:col><xdr:row>12</xdr:row></xdr:to>
    <xdr:pic>
      <xdr:blipFill><a:blip r:embed="rId1"/></xdr:blipFill>
    </xdr:pic>
    <xdr:clientData/>
  </xdr:twoCellAnchor>
  <xdr:twoCellAnchor>
    <xdr:from><xdr:col>7</xdr:col><xdr:row>7</xdr:row></xdr:from>
    <xdr:to><xdr:col>9</xdr:col><xdr:row>9</xdr:row></xdr:to>
    <xdr:graphicFrame macro=""><a:graphic/></xdr:graphicFrame>
    <xdr:clientData/>
  </xdr:twoCellAnchor>
</xdr:wsDr>"#;

    const SHEET_XML: &str = r#"<worksheet xmlns:r="urn:r"><sheetData/><drawing r:id="rId2"/></worksheet>"#;

    const SHEET_RELS: &str = r#"<Relationships>
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink" Target="https://example.com" TargetMode="External"/>
  <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/drawing" Target="../drawings/drawing1.xml"/>
</Relationships>"#;

    const DRAWING_RELS: &str = r#"<Relationships>
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="../media/image1.png"/>
  <Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/chart" Target="../charts/chart1.xml"/>
</Relationships>"#;

    fn sheet() -> Sheet {
        Sheet {
            id: "1".to_string(),
            name: "Data".to_string(),
            path: "xl/worksheets/sheet1.xml".to_string(),
        }
    }

    fn full_package() -> Package {
        let mut package = Package::in_memory();
        package.insert_part("xl/worksheets/sheet1.xml", SHEET_XML);
        package.insert_part("xl/worksheets/_rels/sheet1.xml.rels", SHEET_RELS);
        package.insert_part("xl/drawings/drawing1.xml", DRAWING_XML);
        package.insert_part("xl/drawings/_rels/drawing1.xml.rels", DRAWING_RELS);
        package
    }

    fn expect_drawing_error(package: &Package) -> String {
        let err = locate_drawing(
            package,
            &XmlMapper::default(),
            &sheet(),
            &ResolveOptions::default(),
        )
        .unwrap_err();
        match err {
            XlimagesError::DrawingResolution { sheet, reason } => {
                assert_eq!(sheet, "Data");
                reason
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_extract_normalizes_both_anchor_shapes() {
        let index =
            extract_anchors(&XmlMapper::default(), "xl/drawings/drawing1.xml", DRAWING_XML)
                .unwrap();

        assert_eq!(index.len(), 2);
        assert_eq!(index.anchor_count(), 3);

        let single = index.get("rId2").unwrap();
        assert_eq!(single, &[Anchor::single(CellCoordinate::new(0, 5))]);

        let reused = index.get("rId1").unwrap();
        assert_eq!(
            reused,
            &[
                Anchor {
                    from: CellCoordinate::new(2, 1),
                    to: CellCoordinate::new(4, 3),
                },
                Anchor {
                    from: CellCoordinate::new(10, 0),
                    to: CellCoordinate::new(12, 2),
                },
            ]
        );
        assert!(index.get("rId3").is_none());
    }

    #[test]
    fn test_extract_single_anchor_is_still_listed() {
        let xml = r#"<wsDr><oneCellAnchor><from><col>0</col><row>0</row></from><pic><blipFill><blip embed="rId9"/></blipFill></pic></oneCellAnchor></wsDr>"#;
        let index = extract_anchors(&XmlMapper::default(), "d.xml", xml).unwrap();
        assert_eq!(index.get("rId9").unwrap().len(), 1);
    }

    #[test]
    fn test_extract_empty_drawing() {
        let index = extract_anchors(&XmlMapper::default(), "d.xml", "<wsDr/>").unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn test_extract_two_cell_anchor_without_to_is_schema_error() {
        let xml = r#"<wsDr><twoCellAnchor><from><col>0</col><row>0</row></from></twoCellAnchor></wsDr>"#;
        let err = extract_anchors(&XmlMapper::default(), "d.xml", xml).unwrap_err();
        assert!(matches!(err, XlimagesError::Schema { .. }));
    }

    #[test]
    fn test_raw_anchor_normalization() {
        let from = CellCoordinate::new(3, 4);
        let to = CellCoordinate::new(1, 1);
        assert_eq!(Anchor::from(RawAnchor::OneCell { from }), Anchor::single(from));
        // Two-cell ends are taken as declared, even when inverted.
        assert_eq!(Anchor::from(RawAnchor::TwoCell { from, to }), Anchor { from, to });
    }

    #[test]
    fn test_locate_drawing_follows_exact_relationship() {
        let package = full_package();
        let parts = locate_drawing(
            &package,
            &XmlMapper::default(),
            &sheet(),
            &ResolveOptions::default(),
        )
        .unwrap()
        .unwrap();

        assert_eq!(parts.path, "xl/drawings/drawing1.xml");
        assert_eq!(parts.xml, DRAWING_XML);
        assert_eq!(parts.relationships.path, "xl/drawings/_rels/drawing1.xml.rels");
        assert_eq!(parts.relationships.len(), 1);
        assert_eq!(
            parts.relationships.get("rId1").unwrap().target,
            "xl/media/image1.png"
        );
    }

    #[test]
    fn test_locate_drawing_keeps_all_relationships_when_configured() {
        let package = full_package();
        let options = ResolveOptions {
            image_relationships_only: false,
            ..ResolveOptions::default()
        };
        let parts = locate_drawing(&package, &XmlMapper::default(), &sheet(), &options)
            .unwrap()
            .unwrap();
        assert_eq!(parts.relationships.len(), 2);
    }

    #[test]
    fn test_locate_drawing_without_declaration() {
        let mut package = Package::in_memory();
        package.insert_part("xl/worksheets/sheet1.xml", "<worksheet><sheetData/></worksheet>");
        let located = locate_drawing(
            &package,
            &XmlMapper::default(),
            &sheet(),
            &ResolveOptions::default(),
        )
        .unwrap();
        assert!(located.is_none());
    }

    #[test]
    fn test_locate_drawing_missing_sheet_relationships() {
        let mut package = Package::in_memory();
        package.insert_part("xl/worksheets/sheet1.xml", SHEET_XML);
        let reason = expect_drawing_error(&package);
        assert!(reason.contains("no relationships"));
    }

    #[test]
    fn test_locate_drawing_undeclared_relationship_id() {
        let mut package = full_package();
        package.insert_part(
            "xl/worksheets/sheet1.xml",
            r#"<worksheet xmlns:r="urn:r"><drawing r:id="rId20"/></worksheet>"#,
        );
        let reason = expect_drawing_error(&package);
        assert!(reason.contains("rId20"));
    }

    #[test]
    fn test_locate_drawing_rejects_non_drawing_relationship() {
        let mut package = full_package();
        package.insert_part(
            "xl/worksheets/sheet1.xml",
            r#"<worksheet xmlns:r="urn:r"><drawing r:id="rId1"/></worksheet>"#,
        );
        let reason = expect_drawing_error(&package);
        assert!(reason.contains("does not target a drawing"));
    }

    #[test]
    fn test_locate_drawing_missing_drawing_part() {
        let mut package = Package::in_memory();
        package.insert_part("xl/worksheets/sheet1.xml", SHEET_XML);
        package.insert_part("xl/worksheets/_rels/sheet1.xml.rels", SHEET_RELS);
        let reason = expect_drawing_error(&package);
        assert!(reason.contains("xl/drawings/drawing1.xml is missing"));
    }

    #[test]
    fn test_locate_drawing_missing_drawing_relationships() {
        let mut package = Package::in_memory();
        package.insert_part("xl/worksheets/sheet1.xml", SHEET_XML);
        package.insert_part("xl/worksheets/_rels/sheet1.xml.rels", SHEET_RELS);
        package.insert_part("xl/drawings/drawing1.xml", DRAWING_XML);
        let reason = expect_drawing_error(&package);
        assert!(reason.contains("has no relationships"));
    }
}
