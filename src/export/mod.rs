//! XLSX export pipeline.
//!
//! Produces a modified XLSX by patching the original ZIP archive. Only edited
//! sheets and directly inserted parts are re-written; everything else is
//! passed through byte-identical.

pub(crate) mod sheet_patcher;
pub(crate) mod zip_patcher;

use std::collections::BTreeMap;

use crate::error::Result;
use crate::package::Package;
use crate::types::SheetGrid;

const EMPTY_WORKSHEET: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData/></worksheet>"#;

/// Save a package to XLSX bytes, applying the edits of each `(path, grid)`.
///
/// Returns the original bytes when there is nothing to write.
pub(crate) fn save_xlsx<'a>(
    package: &Package,
    sheets: impl IntoIterator<Item = (&'a str, &'a SheetGrid)>,
) -> Result<Vec<u8>> {
    let mut replacements: BTreeMap<String, Vec<u8>> = BTreeMap::new();

    for name in package.part_names() {
        if package.is_direct(name) {
            if let Some(bytes) = package.part(name)? {
                replacements.insert(name.to_string(), bytes);
            }
        }
    }

    for (path, grid) in sheets {
        if !grid.is_dirty() {
            continue;
        }
        let xml = match replacements.get(path) {
            Some(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            None => package
                .part_text(path)?
                .unwrap_or_else(|| EMPTY_WORKSHEET.to_string()),
        };
        let patched = sheet_patcher::patch_sheet_xml(path, &xml, grid.edits())?;
        log::debug!("patched {} cells into {path}", grid.edits().len());
        replacements.insert(path.to_string(), patched);
    }

    if replacements.is_empty() && package.has_archive() {
        // Nothing changed, return original bytes
        return Ok(package.original_bytes().to_vec());
    }

    let original = package.has_archive().then(|| package.original_bytes());
    zip_patcher::patch_zip(original, &replacements)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::parser::worksheet::load_grid;
    use crate::types::{CellCoordinate, CellValue};

    #[test]
    fn test_edits_round_trip_through_save() {
        let mut source = Package::in_memory();
        source.insert_part(
            "xl/worksheets/sheet1.xml",
            r#"<worksheet><sheetData><row r="1"><c r="A1"><v>1</v></c></row></sheetData></worksheet>"#,
        );
        let bytes = save_xlsx(&source, std::iter::empty()).unwrap();
        let package = Package::open(&bytes).unwrap();

        let mut grid = load_grid(&package, "xl/worksheets/sheet1.xml", &[]).unwrap();
        grid.set(CellCoordinate::new(3, 2), "https://cdn/x.png");
        let saved = save_xlsx(&package, [("xl/worksheets/sheet1.xml", &grid)]).unwrap();

        let reopened = Package::open(&saved).unwrap();
        let reloaded = load_grid(&reopened, "xl/worksheets/sheet1.xml", &[]).unwrap();
        assert_eq!(reloaded.get(CellCoordinate::new(0, 0)), Some(&CellValue::Number(1.0)));
        assert_eq!(
            reloaded.get(CellCoordinate::new(3, 2)),
            Some(&CellValue::Text("https://cdn/x.png".into()))
        );
    }

    #[test]
    fn test_missing_sheet_part_is_created() {
        let mut grid = SheetGrid::new();
        grid.set(CellCoordinate::new(0, 0), "new");
        let saved = save_xlsx(&Package::in_memory(), [("xl/worksheets/sheet2.xml", &grid)]).unwrap();

        let package = Package::open(&saved).unwrap();
        let reloaded = load_grid(&package, "xl/worksheets/sheet2.xml", &[]).unwrap();
        assert_eq!(reloaded.get(CellCoordinate::new(0, 0)), Some(&CellValue::Text("new".into())));
    }

    #[test]
    fn test_unedited_package_keeps_original_bytes() {
        let mut source = Package::in_memory();
        source.insert_part("xl/workbook.xml", "<workbook/>");
        let bytes = save_xlsx(&source, std::iter::empty()).unwrap();

        let package = Package::open(&bytes).unwrap();
        let grid = SheetGrid::new();
        let saved = save_xlsx(&package, [("xl/worksheets/sheet1.xml", &grid)]).unwrap();
        assert_eq!(saved, bytes);
    }
}
