//! Worksheet parts: the drawing reference, and cell values for the grid.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Deserialize;

use crate::cell_ref::parse_cell_ref_bytes;
use crate::error::{Result, XlimagesError};
use crate::package::Package;
use crate::types::{CellCoordinate, CellValue, SheetGrid};
use crate::xml_helpers::attr_u32;
use crate::xml_map::XmlMapper;

#[derive(Debug, Deserialize)]
struct WorksheetDocument {
    #[serde(alias = "chartsheet")]
    worksheet: WorksheetRecord,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WorksheetRecord {
    drawing: Option<DrawingReference>,
}

#[derive(Debug, Deserialize)]
struct DrawingReference {
    /// `r:id` of the drawing in the worksheet's relationships
    id: String,
}

/// Worksheet elements whose content is never needed to find the drawing.
/// Cell data is streamed separately by [`load_grid`].
const DRAWING_LOOKUP_PRUNED: &[&str] = &[
    "sheetData",
    "mergeCells",
    "conditionalFormatting",
    "dataValidations",
];

/// Relationship id of the drawing a worksheet declares, if any.
///
/// A worksheet part that does not exist declares nothing. Cell data is
/// skipped rather than mapped.
///
/// # Errors
/// Returns an error if the worksheet part is malformed.
pub fn worksheet_drawing_id(
    package: &Package,
    mapper: &XmlMapper,
    sheet_path: &str,
) -> Result<Option<String>> {
    let Some(xml) = package.part_text(sheet_path)? else {
        log::warn!("worksheet part {sheet_path} is missing");
        return Ok(None);
    };
    let document: WorksheetDocument =
        mapper.map_as_pruned(sheet_path, &xml, DRAWING_LOOKUP_PRUNED)?;
    Ok(document.worksheet.drawing.map(|d| d.id))
}

/// Cell type tag from the `t` attribute of a `<c>` element.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum CellTypeTag {
    Shared,
    Inline,
    Str,
    Bool,
    Error,
    Default,
}

fn parse_cell_type_tag(value: &[u8]) -> CellTypeTag {
    match value {
        b"s" => CellTypeTag::Shared,
        b"b" => CellTypeTag::Bool,
        b"e" => CellTypeTag::Error,
        b"str" => CellTypeTag::Str,
        b"inlineStr" => CellTypeTag::Inline,
        _ => CellTypeTag::Default,
    }
}

/// Read the shared string table.
///
/// Rich text runs are concatenated; phonetic runs (`rPh`) are skipped. A
/// missing part is an empty table.
///
/// # Errors
/// Returns [`XlimagesError::XmlParse`] if the part is malformed.
pub fn read_shared_strings(package: &Package, path: &str) -> Result<Vec<String>> {
    let Some(xml) = package.part_text(path)? else {
        return Ok(Vec::new());
    };

    let mut reader = Reader::from_str(&xml);
    reader.trim_text(false);

    let mut strings = Vec::new();
    let mut current_string = String::new();
    let mut in_si = false;
    let mut in_t = false;
    let mut in_rph = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"si" => {
                    in_si = true;
                    current_string.clear();
                }
                b"rPh" => in_rph = true,
                b"t" if in_si && !in_rph => in_t = true,
                _ => {}
            },
            Ok(Event::Empty(ref e)) => {
                if e.local_name().as_ref() == b"si" {
                    strings.push(String::new());
                }
            }
            Ok(Event::Text(ref e)) if in_t => {
                let text = e.unescape().map_err(|err| xml_error(path, &xml, &err))?;
                current_string.push_str(&text);
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"si" => {
                    strings.push(std::mem::take(&mut current_string));
                    in_si = false;
                }
                b"rPh" => in_rph = false,
                b"t" => in_t = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(err) => return Err(xml_error(path, &xml, &err)),
            _ => {}
        }
    }

    log::debug!("{} shared strings in {path}", strings.len());
    Ok(strings)
}

/// A `<c>` element whose value is still being read.
struct PendingCell {
    at: CellCoordinate,
    tag: CellTypeTag,
    raw: Option<String>,
}

/// Load the cell values of one worksheet into a grid.
///
/// Formulas and styles are not kept; only the cached value of each cell is.
/// A missing worksheet part loads as an empty grid.
///
/// # Errors
/// Returns [`XlimagesError::XmlParse`] if the worksheet is malformed.
pub fn load_grid(package: &Package, sheet_path: &str, shared_strings: &[String]) -> Result<SheetGrid> {
    let mut grid = SheetGrid::new();
    let Some(xml) = package.part_text(sheet_path)? else {
        log::warn!("worksheet part {sheet_path} is missing; loading an empty grid");
        return Ok(grid);
    };

    let mut reader = Reader::from_str(&xml);
    reader.trim_text(false);

    let mut current_row: Option<u32> = None;
    let mut next_col: u32 = 0;
    let mut pending: Option<PendingCell> = None;
    let mut in_value = false;
    let mut in_rph = false;

    loop {
        match reader.read_event() {
            Ok(ref event @ (Event::Start(_) | Event::Empty(_))) => {
                let (Event::Start(ref e) | Event::Empty(ref e)) = event else {
                    continue;
                };
                let is_start_event = matches!(event, Event::Start(_));

                match e.local_name().as_ref() {
                    b"row" => {
                        let row = attr_u32(e, b"r")
                            .and_then(|r| r.checked_sub(1))
                            .unwrap_or_else(|| current_row.map_or(0, |r| r.saturating_add(1)));
                        current_row = Some(row);
                        next_col = 0;
                    }
                    b"c" => {
                        let (at, tag) = cell_start(e, current_row.unwrap_or(0), next_col);
                        next_col = at.col.saturating_add(1);
                        if is_start_event {
                            pending = Some(PendingCell { at, tag, raw: None });
                        }
                    }
                    b"v" | b"t" if is_start_event && pending.is_some() && !in_rph => {
                        in_value = true;
                    }
                    b"rPh" if is_start_event => in_rph = true,
                    _ => {}
                }
            }
            Ok(Event::Text(ref t)) if in_value => {
                let text = t.unescape().map_err(|err| xml_error(sheet_path, &xml, &err))?;
                if let Some(cell) = pending.as_mut() {
                    cell.raw.get_or_insert_with(String::new).push_str(&text);
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"rPh" => in_rph = false,
                b"c" => {
                    if let Some(cell) = pending.take() {
                        if let Some(value) = cell_value(&cell, shared_strings) {
                            grid.load(cell.at, value);
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(err) => return Err(xml_error(sheet_path, &xml, &err)),
            _ => {}
        }
    }

    Ok(grid)
}

fn cell_start(e: &BytesStart, row: u32, next_col: u32) -> (CellCoordinate, CellTypeTag) {
    let mut at = CellCoordinate::new(row, next_col);
    let mut tag = CellTypeTag::Default;

    for attr in e.attributes().flatten() {
        match attr.key.as_ref() {
            b"r" => {
                if let Some((col, row)) = parse_cell_ref_bytes(&attr.value) {
                    at = CellCoordinate::new(row, col);
                }
            }
            b"t" => tag = parse_cell_type_tag(&attr.value),
            _ => {}
        }
    }

    (at, tag)
}

fn cell_value(cell: &PendingCell, shared_strings: &[String]) -> Option<CellValue> {
    let raw = cell.raw.as_deref()?;
    let value = match cell.tag {
        CellTypeTag::Shared => {
            let Some(text) = raw
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|idx| shared_strings.get(idx))
            else {
                log::warn!("cell {} references unknown shared string {raw}", cell.at);
                return None;
            };
            CellValue::Text(text.clone())
        }
        CellTypeTag::Inline | CellTypeTag::Str => CellValue::Text(raw.to_string()),
        CellTypeTag::Bool => CellValue::Bool(raw.trim() == "1"),
        CellTypeTag::Error => CellValue::Error(raw.to_string()),
        CellTypeTag::Default => match raw.trim().parse::<f64>() {
            Ok(n) => CellValue::Number(n),
            Err(_) => CellValue::Text(raw.to_string()),
        },
    };
    Some(value)
}

fn xml_error(path: &str, xml: &str, err: &quick_xml::Error) -> XlimagesError {
    XlimagesError::XmlParse {
        path: path.to_string(),
        content: xml.to_string(),
        message: err.to_string(),
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::float_cmp
)]
mod tests {
    use super::*;

    fn package_with(path: &str, xml: &str) -> Package {
        let mut package = Package::in_memory();
        package.insert_part(path, xml);
        package
    }

    #[test]
    fn test_drawing_id() {
        let xml = r#"<worksheet xmlns:r="urn:r"><sheetData/><drawing r:id="rId7"/></worksheet>"#;
        let package = package_with("xl/worksheets/sheet1.xml", xml);
        let id = worksheet_drawing_id(&package, &XmlMapper::default(), "xl/worksheets/sheet1.xml")
            .unwrap();
        assert_eq!(id.as_deref(), Some("rId7"));
    }

    #[test]
    fn test_no_drawing() {
        let xml = r#"<worksheet><sheetData><row r="1"><c r="A1"><v>1</v></c></row></sheetData></worksheet>"#;
        let package = package_with("xl/worksheets/sheet1.xml", xml);
        let mapper = XmlMapper::default();
        assert!(worksheet_drawing_id(&package, &mapper, "xl/worksheets/sheet1.xml")
            .unwrap()
            .is_none());
        assert!(worksheet_drawing_id(&package, &mapper, "xl/worksheets/sheet2.xml")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_drawing_id_after_large_sheet_data() {
        let mut xml = String::from(r#"<worksheet xmlns:r="urn:r"><sheetData>"#);
        for row in 1..=5000 {
            xml.push_str(&format!(
                r#"<row r="{row}"><c r="A{row}" t="inlineStr"><is><t>cell {row}</t></is></c></row>"#
            ));
        }
        xml.push_str(r#"</sheetData><mergeCells count="1"><mergeCell ref="A1:B2"/></mergeCells><drawing r:id="rId3"/></worksheet>"#);
        let package = package_with("xl/worksheets/sheet1.xml", &xml);

        let id = worksheet_drawing_id(&package, &XmlMapper::default(), "xl/worksheets/sheet1.xml")
            .unwrap();
        assert_eq!(id.as_deref(), Some("rId3"));
    }

    #[test]
    fn test_drawing_id_rejects_malformed_sheet_data() {
        let xml = r#"<worksheet xmlns:r="urn:r"><sheetData><row r="1"></c></sheetData><drawing r:id="rId1"/></worksheet>"#;
        let package = package_with("xl/worksheets/sheet1.xml", xml);
        let err = worksheet_drawing_id(&package, &XmlMapper::default(), "xl/worksheets/sheet1.xml")
            .unwrap_err();
        assert!(matches!(err, XlimagesError::XmlParse { .. }));
    }

    #[test]
    fn test_chartsheet_drawing_id() {
        let xml = r#"<chartsheet xmlns:r="urn:r"><drawing r:id="rId1"/></chartsheet>"#;
        let package = package_with("xl/chartsheets/sheet1.xml", xml);
        let id =
            worksheet_drawing_id(&package, &XmlMapper::default(), "xl/chartsheets/sheet1.xml")
                .unwrap();
        assert_eq!(id.as_deref(), Some("rId1"));
    }

    #[test]
    fn test_shared_strings_rich_text_and_phonetics() {
        let xml = r#"<sst>
  <si><t>plain</t></si>
  <si><r><t>bold </t></r><r><t xml:space="preserve">and more</t></r><rPh sb="0" eb="1"><t>skip</t></rPh></si>
  <si/>
  <si><t>a &amp; b</t></si>
</sst>"#;
        let package = package_with("xl/sharedStrings.xml", xml);
        let strings = read_shared_strings(&package, "xl/sharedStrings.xml").unwrap();
        assert_eq!(strings, vec!["plain", "bold and more", "", "a & b"]);
        assert!(read_shared_strings(&package, "xl/other.xml").unwrap().is_empty());
    }

    #[test]
    fn test_load_grid_cell_types() {
        let xml = r#"<worksheet><sheetData>
  <row r="1">
    <c r="A1" t="s"><v>1</v></c>
    <c r="B1"><v>2.5</v></c>
    <c r="C1" t="b"><v>1</v></c>
    <c r="D1" t="e"><v>#DIV/0!</v></c>
  </row>
  <row r="3">
    <c r="B3" t="inlineStr"><is><t>inline</t></is></c>
    <c r="C3" t="str"><f>A1</f><v>formula text</v></c>
    <c r="D3" s="1"/>
  </row>
</sheetData></worksheet>"#;
        let package = package_with("xl/worksheets/sheet1.xml", xml);
        let shared = vec!["zero".to_string(), "one".to_string()];
        let grid = load_grid(&package, "xl/worksheets/sheet1.xml", &shared).unwrap();

        assert_eq!(grid.get(CellCoordinate::new(0, 0)), Some(&CellValue::Text("one".into())));
        assert_eq!(grid.get(CellCoordinate::new(0, 1)), Some(&CellValue::Number(2.5)));
        assert_eq!(grid.get(CellCoordinate::new(0, 2)), Some(&CellValue::Bool(true)));
        assert_eq!(
            grid.get(CellCoordinate::new(0, 3)),
            Some(&CellValue::Error("#DIV/0!".into()))
        );
        assert_eq!(
            grid.get(CellCoordinate::new(2, 1)),
            Some(&CellValue::Text("inline".into()))
        );
        assert_eq!(
            grid.get(CellCoordinate::new(2, 2)),
            Some(&CellValue::Text("formula text".into()))
        );
        assert_eq!(grid.get(CellCoordinate::new(2, 3)), None);
        assert_eq!(grid.row_count(), 3);
        assert!(!grid.is_dirty());
    }

    #[test]
    fn test_load_grid_without_references() {
        let xml = r#"<worksheet><sheetData>
  <row><c><v>1</v></c><c><v>2</v></c></row>
  <row><c t="inlineStr"><is><t>x</t></is></c></row>
</sheetData></worksheet>"#;
        let package = package_with("s.xml", xml);
        let grid = load_grid(&package, "s.xml", &[]).unwrap();
        assert_eq!(grid.get(CellCoordinate::new(0, 1)), Some(&CellValue::Number(2.0)));
        assert_eq!(grid.get(CellCoordinate::new(1, 0)), Some(&CellValue::Text("x".into())));
    }

    #[test]
    fn test_load_grid_missing_part_is_empty() {
        let grid = load_grid(&Package::in_memory(), "xl/worksheets/sheet9.xml", &[]).unwrap();
        assert_eq!(grid.row_count(), 0);
    }

    #[test]
    fn test_load_grid_unknown_shared_string_is_skipped() {
        let xml = r#"<worksheet><sheetData><row r="1"><c r="A1" t="s"><v>5</v></c></row></sheetData></worksheet>"#;
        let package = package_with("s.xml", xml);
        let grid = load_grid(&package, "s.xml", &[]).unwrap();
        assert_eq!(grid.get(CellCoordinate::new(0, 0)), None);
    }
}
