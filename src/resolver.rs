//! Image-to-cell resolution.
//!
//! For every sheet the resolver follows worksheet → drawing → drawing
//! relationships → media, reads the drawing's anchors, and joins the two by
//! relationship id. Nothing is cached between calls.

use std::collections::HashMap;
use std::sync::Arc;

use crate::drawings::{extract_anchors, locate_drawing, AnchorIndex, DrawingParts};
use crate::error::{Result, XlimagesError};
use crate::options::ResolveOptions;
use crate::package::Package;
use crate::parser::workbook::SheetRegistry;
use crate::types::{ImageLocation, ImageLocationMap, MediaFile};
use crate::xml_map::XmlMapper;

/// State for one resolution pass over a package.
///
/// Holds the sheet registry built from the workbook descriptor. A new context
/// is built for every pass.
#[derive(Debug)]
pub struct ResolutionContext<'a> {
    package: &'a Package,
    options: &'a ResolveOptions,
    mapper: XmlMapper,
    registry: SheetRegistry,
}

impl<'a> ResolutionContext<'a> {
    /// Build the context, reading the workbook descriptor.
    ///
    /// # Errors
    /// Returns [`XlimagesError::SheetRegistry`] if the workbook part is missing
    /// or malformed.
    pub fn new(package: &'a Package, options: &'a ResolveOptions) -> Result<Self> {
        let mapper = options.mapper();
        let registry = SheetRegistry::build(package, &mapper, &options.workbook_part)?;
        Ok(Self {
            package,
            options,
            mapper,
            registry,
        })
    }

    #[must_use]
    pub fn registry(&self) -> &SheetRegistry {
        &self.registry
    }

    /// Resolve every sheet in declared order.
    ///
    /// # Errors
    /// Fails on the first sheet that cannot be resolved.
    pub fn resolve_all(&self) -> Result<ImageLocationMap> {
        let mut map = ImageLocationMap::new();
        for name in self.registry.names() {
            let images = self.resolve_sheet(name)?;
            map.push(name, images);
        }
        log::debug!(
            "resolved {} images across {} sheets",
            map.total_images(),
            map.len()
        );
        Ok(map)
    }

    /// Resolve the images of one sheet.
    ///
    /// A sheet without a drawing has no images.
    ///
    /// # Errors
    /// Returns [`XlimagesError::SheetNotFound`] for an unknown sheet name,
    /// [`XlimagesError::DrawingResolution`] if a declared drawing's parts or
    /// media are missing, and [`XlimagesError::ImageAnchorNotFound`] if a media
    /// relationship has no anchor.
    pub fn resolve_sheet(&self, name: &str) -> Result<Vec<ImageLocation>> {
        let sheet = self
            .registry
            .get(name)
            .ok_or_else(|| XlimagesError::SheetNotFound(name.to_string()))?;

        let Some(drawing) = locate_drawing(self.package, &self.mapper, sheet, self.options)? else {
            return Ok(Vec::new());
        };

        let anchors = extract_anchors(&self.mapper, &drawing.path, &drawing.xml)?;
        let media = self.read_media(&sheet.name, &drawing)?;
        join_locations(&drawing.path, &media, &anchors)
    }

    /// Read the media part behind every relationship of a drawing, in table
    /// order. Relationships sharing a target share one buffer.
    fn read_media(&self, sheet: &str, drawing: &DrawingParts) -> Result<Vec<(String, MediaFile)>> {
        let mut by_target: HashMap<&str, MediaFile> = HashMap::new();
        let mut media = Vec::with_capacity(drawing.relationships.len());

        for rel in drawing.relationships.iter() {
            if rel.external {
                log::debug!("{}: {} links external {}, skipping", drawing.path, rel.id, rel.target);
                continue;
            }

            let file = if let Some(file) = by_target.get(rel.target.as_str()) {
                file.clone()
            } else {
                let bytes = self.package.part(&rel.target)?.ok_or_else(|| {
                    XlimagesError::drawing(
                        sheet,
                        format!("media part {} ({}) is missing", rel.target, rel.id),
                    )
                })?;
                log::debug!("{}: {} -> {} ({} bytes)", drawing.path, rel.id, rel.target, bytes.len());
                let file = MediaFile::new(rel.target.clone(), Arc::<[u8]>::from(bytes));
                by_target.insert(rel.target.as_str(), file.clone());
                file
            };

            media.push((rel.id.clone(), file));
        }

        Ok(media)
    }
}

/// Join media files to anchors by relationship id.
///
/// Emits one location per anchor: media in the given order, and each media
/// file's anchors in declaration order.
///
/// # Errors
/// Returns [`XlimagesError::ImageAnchorNotFound`] if a media relationship has
/// no anchor.
pub fn join_locations(
    drawing_path: &str,
    media: &[(String, MediaFile)],
    anchors: &AnchorIndex,
) -> Result<Vec<ImageLocation>> {
    let mut locations = Vec::with_capacity(anchors.anchor_count());

    for (relationship_id, file) in media {
        let placed = anchors
            .get(relationship_id)
            .ok_or_else(|| XlimagesError::ImageAnchorNotFound {
                drawing: drawing_path.to_string(),
                relationship_id: relationship_id.clone(),
            })?;

        locations.extend(placed.iter().map(|anchor| ImageLocation {
            file: file.clone(),
            from: anchor.from,
            to: anchor.to,
        }));
    }

    Ok(locations)
}

/// Resolve every embedded image in the package to the cells it is anchored to.
///
/// # Errors
/// See [`ResolutionContext::new`] and [`ResolutionContext::resolve_sheet`].
pub fn resolve(package: &Package, options: &ResolveOptions) -> Result<ImageLocationMap> {
    ResolutionContext::new(package, options)?.resolve_all()
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
    use crate::types::CellCoordinate;

    const WORKBOOK: &str = r#"<workbook xmlns:r="urn:r"><sheets>
  <sheet name="Data" sheetId="1" r:id="rId1"/>
  <sheet name="Plain" sheetId="2" r:id="rId2"/>
</sheets></workbook>"#;

    const WORKBOOK_RELS: &str = r#"<Relationships>
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
  <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet2.xml"/>
</Relationships>"#;

    const SHEET_RELS: &str = r#"<Relationships>
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/drawing" Target="../drawings/drawing1.xml"/>
</Relationships>"#;

    const DRAWING_RELS: &str = r#"<Relationships>
  <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="../media/image2.png"/>
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="../media/image1.png"/>
</Relationships>"#;

    fn anchor(id: &str, from: (u32, u32), to: Option<(u32, u32)>) -> String {
        let marker = |tag: &str, (row, col): (u32, u32)| {
            format!("<{tag}><col>{col}</col><row>{row}</row></{tag}>")
        };
        let pic = format!(r#"<pic><blipFill><blip embed="{id}"/></blipFill></pic>"#);
        match to {
            Some(to) => format!(
                "<twoCellAnchor>{}{}{pic}</twoCellAnchor>",
                marker("from", from),
                marker("to", to)
            ),
            None => format!("<oneCellAnchor>{}{pic}</oneCellAnchor>", marker("from", from)),
        }
    }

    fn package(drawing_body: &str) -> Package {
        let mut package = Package::in_memory();
        package.insert_part("xl/workbook.xml", WORKBOOK);
        package.insert_part("xl/_rels/workbook.xml.rels", WORKBOOK_RELS);
        package.insert_part(
            "xl/worksheets/sheet1.xml",
            r#"<worksheet xmlns:r="urn:r"><sheetData/><drawing r:id="rId1"/></worksheet>"#,
        );
        package.insert_part("xl/worksheets/_rels/sheet1.xml.rels", SHEET_RELS);
        package.insert_part("xl/worksheets/sheet2.xml", "<worksheet><sheetData/></worksheet>");
        package.insert_part(
            "xl/drawings/drawing1.xml",
            format!("<wsDr>{drawing_body}</wsDr>"),
        );
        package.insert_part("xl/drawings/_rels/drawing1.xml.rels", DRAWING_RELS);
        package.insert_part("xl/media/image1.png", b"image-one".to_vec());
        package.insert_part("xl/media/image2.png", b"image-two".to_vec());
        package
    }

    #[test]
    fn test_resolve_orders_by_relationship_table_then_anchor() {
        let body = [
            anchor("rId1", (2, 1), Some((4, 3))),
            anchor("rId2", (0, 0), None),
            anchor("rId1", (8, 8), Some((9, 9))),
        ]
        .concat();
        let map = resolve(&package(&body), &ResolveOptions::default()).unwrap();

        assert_eq!(map.sheet_names().collect::<Vec<_>>(), vec!["Data", "Plain"]);
        let data = map.get("Data").unwrap();
        assert_eq!(data.len(), 3);

        // rId2 is declared first in the drawing relationships.
        assert_eq!(data[0].file.path, "xl/media/image2.png");
        assert_eq!(data[0].from, CellCoordinate::new(0, 0));
        assert_eq!(data[0].to, data[0].from);

        // oneCellAnchor precedes twoCellAnchor; rId1's two-cell anchors keep order.
        assert_eq!(data[1].file.path, "xl/media/image1.png");
        assert_eq!(data[1].from, CellCoordinate::new(2, 1));
        assert_eq!(data[1].to, CellCoordinate::new(4, 3));
        assert_eq!(data[2].from, CellCoordinate::new(8, 8));
        assert!(data[1].file.shares_data_with(&data[2].file));
        assert_eq!(&*data[1].file.data, b"image-one");

        assert_eq!(map.get("Plain"), Some(&[][..]));
    }

    #[test]
    fn test_media_without_anchor_fails() {
        let body = anchor("rId1", (2, 1), Some((4, 3)));
        let err = resolve(&package(&body), &ResolveOptions::default()).unwrap_err();
        match err {
            XlimagesError::ImageAnchorNotFound {
                drawing,
                relationship_id,
            } => {
                assert_eq!(drawing, "xl/drawings/drawing1.xml");
                assert_eq!(relationship_id, "rId2");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_media_part_fails() {
        let body = [anchor("rId1", (0, 0), None), anchor("rId2", (1, 1), None)].concat();
        let mut package = package(&body);
        package.insert_part(
            "xl/drawings/_rels/drawing1.xml.rels",
            r#"<Relationships><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="../media/gone.png"/></Relationships>"#,
        );
        let err = resolve(&package, &ResolveOptions::default()).unwrap_err();
        assert!(matches!(err, XlimagesError::DrawingResolution { ref sheet, .. } if sheet == "Data"));
    }

    #[test]
    fn test_unknown_sheet_name() {
        let package = package(&anchor("rId1", (0, 0), None));
        let options = ResolveOptions::default();
        let context = ResolutionContext::new(&package, &options).unwrap();
        assert_eq!(context.registry().len(), 2);
        let err = context.resolve_sheet("Nope").unwrap_err();
        assert!(matches!(err, XlimagesError::SheetNotFound(ref name) if name == "Nope"));
    }

    #[test]
    fn test_repeated_resolution_is_fresh() {
        let body = [anchor("rId1", (0, 0), None), anchor("rId2", (1, 1), None)].concat();
        let package = package(&body);
        let options = ResolveOptions::default();
        let first = resolve(&package, &options).unwrap();
        let second = resolve(&package, &options).unwrap();
        assert_eq!(first, second);
        let a = &first.get("Data").unwrap()[0].file;
        let b = &second.get("Data").unwrap()[0].file;
        assert!(!a.shares_data_with(b));
    }

    #[test]
    fn test_join_fans_out_per_anchor() {
        let xml = format!(
            "<wsDr>{}{}</wsDr>",
            anchor("rIdA", (1, 1), None),
            anchor("rIdA", (5, 2), None)
        );
        let anchors = extract_anchors(&XmlMapper::default(), "d.xml", &xml).unwrap();
        let media = vec![("rIdA".to_string(), MediaFile::new("m.png", b"m".to_vec()))];

        let locations = join_locations("d.xml", &media, &anchors).unwrap();
        assert_eq!(locations.len(), 2);
        assert_eq!(locations[0].from, CellCoordinate::new(1, 1));
        assert_eq!(locations[1].from, CellCoordinate::new(5, 2));
        assert!(locations[0].file.shares_data_with(&locations[1].file));
    }
}
