//! Test fixtures for generating XLSX files with embedded images in memory.
//!
//! The builder writes the parts a spreadsheet application produces: content
//! types, workbook and worksheet relationships, shared strings, one drawing
//! per sheet with images, and the media parts. Markup uses the usual `xdr:`,
//! `a:` and `r:` prefixes so resolution is exercised against prefixed XML.
//!
//! # Example
//!
//! ```rust
//! use fixtures::{SheetBuilder, XlsxBuilder};
//!
//! let xlsx = XlsxBuilder::new()
//!     .sheet(
//!         SheetBuilder::new("Data")
//!             .text("A1", "name")
//!             .two_cell_image("rId1", "image1.png", b"png", (2, 1), (4, 3)),
//!     )
//!     .build();
//!
//! let images = xlimages::resolve_bytes(&xlsx).unwrap();
//! ```
#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use zip::write::FileOptions;
use zip::ZipWriter;

use xlimages::cell_ref::parse_cell_ref;

pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n fixture";
pub const JPEG_BYTES: &[u8] = b"\xFF\xD8\xFF\xE0 fixture";

const XDR_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/spreadsheetDrawing";
const A_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const R_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const REL_BASE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// Where an image sits on the grid, as zero-based (row, col) pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorKind {
    OneCell { from: (u32, u32) },
    TwoCell { from: (u32, u32), to: (u32, u32) },
}

/// One anchored picture.
#[derive(Debug, Clone)]
pub struct ImageEntry {
    pub rel_id: String,
    pub media_name: String,
    pub data: Vec<u8>,
    pub anchor: AnchorKind,
}

#[derive(Debug, Clone)]
enum CellEntry {
    Text(String),
    Number(f64),
}

/// Builder for one worksheet.
#[derive(Debug, Clone)]
pub struct SheetBuilder {
    pub name: String,
    cells: Vec<(String, CellEntry)>,
    images: Vec<ImageEntry>,
    styled: Vec<(String, u32)>,
}

impl SheetBuilder {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            cells: Vec::new(),
            images: Vec::new(),
            styled: Vec::new(),
        }
    }

    /// Add a shared-string cell.
    #[must_use]
    pub fn text(mut self, cell_ref: &str, value: &str) -> Self {
        self.cells
            .push((cell_ref.to_string(), CellEntry::Text(value.to_string())));
        self
    }

    /// Add a numeric cell.
    #[must_use]
    pub fn number(mut self, cell_ref: &str, value: f64) -> Self {
        self.cells.push((cell_ref.to_string(), CellEntry::Number(value)));
        self
    }

    /// Give an existing cell a style index.
    #[must_use]
    pub fn style(mut self, cell_ref: &str, style: u32) -> Self {
        self.styled.push((cell_ref.to_string(), style));
        self
    }

    /// Add a picture held by a `oneCellAnchor`.
    #[must_use]
    pub fn one_cell_image(self, rel_id: &str, media_name: &str, data: &[u8], from: (u32, u32)) -> Self {
        self.image(rel_id, media_name, data, AnchorKind::OneCell { from })
    }

    /// Add a picture held by a `twoCellAnchor`.
    #[must_use]
    pub fn two_cell_image(
        self,
        rel_id: &str,
        media_name: &str,
        data: &[u8],
        from: (u32, u32),
        to: (u32, u32),
    ) -> Self {
        self.image(rel_id, media_name, data, AnchorKind::TwoCell { from, to })
    }

    fn image(mut self, rel_id: &str, media_name: &str, data: &[u8], anchor: AnchorKind) -> Self {
        self.images.push(ImageEntry {
            rel_id: rel_id.to_string(),
            media_name: media_name.to_string(),
            data: data.to_vec(),
            anchor,
        });
        self
    }

    fn sheet_xml(&self, shared: &mut SharedStrings, has_drawing: bool) -> String {
        let mut cells: Vec<(u32, u32, String)> = self
            .cells
            .iter()
            .map(|(cell_ref, entry)| {
                let (col, row) = parse_cell_ref(cell_ref).expect("valid cell reference");
                let style = self
                    .styled
                    .iter()
                    .find(|(r, _)| r == cell_ref)
                    .map(|(_, s)| format!(r#" s="{s}""#))
                    .unwrap_or_default();
                let xml = match entry {
                    CellEntry::Text(text) => format!(
                        r#"<c r="{cell_ref}"{style} t="s"><v>{}</v></c>"#,
                        shared.index(text)
                    ),
                    CellEntry::Number(n) => format!(r#"<c r="{cell_ref}"{style}><v>{n}</v></c>"#),
                };
                (row, col, xml)
            })
            .collect();
        cells.sort_by_key(|(row, col, _)| (*row, *col));

        let mut rows: BTreeMap<u32, String> = BTreeMap::new();
        for (row, _, xml) in cells {
            rows.entry(row).or_default().push_str(&xml);
        }

        let mut sheet_data = String::new();
        for (row, body) in rows {
            sheet_data.push_str(&format!(r#"<row r="{}">{body}</row>"#, row + 1));
        }

        let drawing = if has_drawing {
            r#"<drawing r:id="rIdDrawing"/>"#
        } else {
            ""
        };

        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="{MAIN_NS}" xmlns:r="{R_NS}"><sheetData>{sheet_data}</sheetData><pageMargins left="0.7" right="0.7" top="0.75" bottom="0.75" header="0.3" footer="0.3"/>{drawing}</worksheet>"#
        )
    }

    fn drawing_xml(&self) -> String {
        let marker = |tag: &str, (row, col): (u32, u32)| {
            format!(
                "<xdr:{tag}><xdr:col>{col}</xdr:col><xdr:colOff>0</xdr:colOff><xdr:row>{row}</xdr:row><xdr:rowOff>0</xdr:rowOff></xdr:{tag}>"
            )
        };

        let mut body = String::new();
        for (i, image) in self.images.iter().enumerate() {
            let pic = format!(
                r#"<xdr:pic><xdr:nvPicPr><xdr:cNvPr id="{}" name="Picture {}"/><xdr:cNvPicPr/></xdr:nvPicPr><xdr:blipFill><a:blip r:embed="{}"/><a:stretch><a:fillRect/></a:stretch></xdr:blipFill><xdr:spPr/></xdr:pic><xdr:clientData/>"#,
                i + 2,
                i + 1,
                image.rel_id
            );
            match image.anchor {
                AnchorKind::OneCell { from } => body.push_str(&format!(
                    r#"<xdr:oneCellAnchor>{}<xdr:ext cx="952500" cy="952500"/>{pic}</xdr:oneCellAnchor>"#,
                    marker("from", from)
                )),
                AnchorKind::TwoCell { from, to } => body.push_str(&format!(
                    r#"<xdr:twoCellAnchor editAs="oneCell">{}{}{pic}</xdr:twoCellAnchor>"#,
                    marker("from", from),
                    marker("to", to)
                )),
            }
        }

        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<xdr:wsDr xmlns:xdr="{XDR_NS}" xmlns:a="{A_NS}" xmlns:r="{R_NS}">{body}</xdr:wsDr>"#
        )
    }

    /// Distinct relationships in first-use order.
    fn drawing_relationships(&self) -> Vec<(&str, &str)> {
        let mut seen: Vec<(&str, &str)> = Vec::new();
        for image in &self.images {
            if !seen.iter().any(|(id, _)| *id == image.rel_id.as_str()) {
                seen.push((image.rel_id.as_str(), image.media_name.as_str()));
            }
        }
        seen
    }
}

#[derive(Default)]
struct SharedStrings {
    strings: Vec<String>,
}

impl SharedStrings {
    fn index(&mut self, text: &str) -> usize {
        if let Some(i) = self.strings.iter().position(|s| s == text) {
            return i;
        }
        self.strings.push(text.to_string());
        self.strings.len() - 1
    }

    fn xml(&self) -> String {
        let items: String = self
            .strings
            .iter()
            .map(|s| format!("<si><t>{}</t></si>", escape(s)))
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="{MAIN_NS}" count="{n}" uniqueCount="{n}">{items}</sst>"#,
            n = self.strings.len()
        )
    }
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Builder for a complete XLSX package.
#[derive(Debug, Clone, Default)]
pub struct XlsxBuilder {
    sheets: Vec<SheetBuilder>,
    overrides: Vec<(String, Vec<u8>)>,
    removed: Vec<String>,
}

impl XlsxBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn sheet(mut self, sheet: SheetBuilder) -> Self {
        self.sheets.push(sheet);
        self
    }

    /// Replace (or add) a part after the generated ones are laid out.
    #[must_use]
    pub fn part(mut self, path: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.overrides.push((path.to_string(), bytes.into()));
        self
    }

    /// Leave a generated part out of the archive.
    #[must_use]
    pub fn without(mut self, path: &str) -> Self {
        self.removed.push(path.to_string());
        self
    }

    /// Generated parts in archive order.
    fn parts(&self) -> Vec<(String, Vec<u8>)> {
        let mut parts: Vec<(String, Vec<u8>)> = Vec::new();
        let mut shared = SharedStrings::default();
        let mut media: BTreeMap<String, Vec<u8>> = BTreeMap::new();
        let mut sheet_overrides = String::new();

        let mut workbook_sheets = String::new();
        let mut workbook_rels = String::new();
        for (i, sheet) in self.sheets.iter().enumerate() {
            let n = i + 1;
            workbook_sheets.push_str(&format!(
                r#"<sheet name="{}" sheetId="{n}" r:id="rId{n}"/>"#,
                escape(&sheet.name)
            ));
            workbook_rels.push_str(&format!(
                r#"<Relationship Id="rId{n}" Type="{REL_BASE}/worksheet" Target="worksheets/sheet{n}.xml"/>"#
            ));
            sheet_overrides.push_str(&format!(
                r#"<Override PartName="/xl/worksheets/sheet{n}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#
            ));

            let has_drawing = !sheet.images.is_empty();
            parts.push((
                format!("xl/worksheets/sheet{n}.xml"),
                sheet.sheet_xml(&mut shared, has_drawing).into_bytes(),
            ));
            if !has_drawing {
                continue;
            }

            parts.push((
                format!("xl/worksheets/_rels/sheet{n}.xml.rels"),
                format!(
                    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rIdDrawing" Type="{REL_BASE}/drawing" Target="../drawings/drawing{n}.xml"/></Relationships>"#
                )
                .into_bytes(),
            ));
            sheet_overrides.push_str(&format!(
                r#"<Override PartName="/xl/drawings/drawing{n}.xml" ContentType="application/vnd.openxmlformats-officedocument.drawing+xml"/>"#
            ));
            parts.push((
                format!("xl/drawings/drawing{n}.xml"),
                sheet.drawing_xml().into_bytes(),
            ));

            let rels: String = sheet
                .drawing_relationships()
                .iter()
                .map(|(id, media_name)| {
                    format!(
                        r#"<Relationship Id="{id}" Type="{REL_BASE}/image" Target="../media/{media_name}"/>"#
                    )
                })
                .collect();
            parts.push((
                format!("xl/drawings/_rels/drawing{n}.xml.rels"),
                format!(
                    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{rels}</Relationships>"#
                )
                .into_bytes(),
            ));

            for image in &sheet.images {
                media
                    .entry(format!("xl/media/{}", image.media_name))
                    .or_insert_with(|| image.data.clone());
            }
        }

        let sst_rel_id = self.sheets.len() + 1;
        workbook_rels.push_str(&format!(
            r#"<Relationship Id="rId{sst_rel_id}" Type="{REL_BASE}/sharedStrings" Target="sharedStrings.xml"/>"#
        ));

        let mut head = vec![
            (
                "[Content_Types].xml".to_string(),
                format!(
                    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Default Extension="png" ContentType="image/png"/><Default Extension="jpeg" ContentType="image/jpeg"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>{sheet_overrides}<Override PartName="/xl/sharedStrings.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml"/></Types>"#
                )
                .into_bytes(),
            ),
            (
                "_rels/.rels".to_string(),
                format!(
                    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="{REL_BASE}/officeDocument" Target="xl/workbook.xml"/></Relationships>"#
                )
                .into_bytes(),
            ),
            (
                "xl/workbook.xml".to_string(),
                format!(
                    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="{MAIN_NS}" xmlns:r="{R_NS}"><sheets>{workbook_sheets}</sheets></workbook>"#
                )
                .into_bytes(),
            ),
            (
                "xl/_rels/workbook.xml.rels".to_string(),
                format!(
                    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{workbook_rels}</Relationships>"#
                )
                .into_bytes(),
            ),
        ];

        head.append(&mut parts);
        head.push(("xl/sharedStrings.xml".to_string(), shared.xml().into_bytes()));
        head.extend(media);
        head
    }

    /// Write the package as ZIP bytes.
    #[must_use]
    pub fn build(&self) -> Vec<u8> {
        let mut parts = self.parts();
        parts.retain(|(name, _)| !self.removed.contains(name));
        for (name, bytes) in &self.overrides {
            match parts.iter_mut().find(|(n, _)| n == name) {
                Some(existing) => existing.1.clone_from(bytes),
                None => parts.push((name.clone(), bytes.clone())),
            }
        }

        let cursor = Cursor::new(Vec::new());
        let mut zip = ZipWriter::new(cursor);
        let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        for (name, bytes) in parts {
            zip.start_file(name, options).unwrap();
            zip.write_all(&bytes).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }
}

/// One image on sheet "Data", anchored from row 2 col 1 to row 4 col 3.
#[must_use]
pub fn data_sheet_xlsx() -> Vec<u8> {
    XlsxBuilder::new()
        .sheet(
            SheetBuilder::new("Data")
                .text("A1", "id")
                .text("B1", "photo")
                .number("A3", 7.0)
                .two_cell_image("rId1", "image1.png", PNG_BYTES, (2, 1), (4, 3)),
        )
        .build()
}

/// Read one part of an XLSX archive as text.
#[must_use]
pub fn read_part(xlsx: &[u8], name: &str) -> Option<String> {
    use std::io::Read;
    let mut archive = zip::ZipArchive::new(Cursor::new(xlsx)).unwrap();
    let mut file = archive.by_name(name).ok()?;
    let mut out = String::new();
    file.read_to_string(&mut out).unwrap();
    Some(out)
}
