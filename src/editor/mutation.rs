//! Cell write mutations.
//!
//! Applies writes to the in-memory sheet grids, either one at a time or as a
//! batch that lands on one sheet together.

use crate::error::{Result, XlimagesError};
use crate::types::{CellCoordinate, SheetGrid};

use super::SheetState;

/// Writes collected for one sheet, applied together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetWrites {
    sheet: String,
    writes: Vec<(CellCoordinate, String)>,
}

impl SheetWrites {
    #[must_use]
    pub fn new(sheet: impl Into<String>) -> Self {
        Self {
            sheet: sheet.into(),
            writes: Vec::new(),
        }
    }

    #[must_use]
    pub fn sheet(&self) -> &str {
        &self.sheet
    }

    /// Queue a write. Later writes to the same cell win.
    pub fn push(&mut self, at: CellCoordinate, value: impl Into<String>) {
        self.writes.push((at, value.into()));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

/// Write one cell.
pub(crate) fn apply_cell_write(
    sheets: &mut [SheetState],
    sheet: &str,
    at: CellCoordinate,
    value: &str,
) -> Result<()> {
    grid_mut(sheets, sheet)?.set(at, value);
    Ok(())
}

/// Apply a batch of writes to its sheet. Returns the number of writes.
///
/// The sheet is checked before anything is written, so a batch for an
/// unknown sheet leaves every grid untouched.
pub(crate) fn apply_sheet_writes(sheets: &mut [SheetState], batch: SheetWrites) -> Result<usize> {
    let grid = grid_mut(sheets, &batch.sheet)?;
    let count = batch.writes.len();
    for (at, value) in batch.writes {
        grid.set(at, value);
    }
    Ok(count)
}

fn grid_mut<'a>(sheets: &'a mut [SheetState], name: &str) -> Result<&'a mut SheetGrid> {
    sheets
        .iter_mut()
        .find(|s| s.sheet.name == name)
        .map(|s| &mut s.grid)
        .ok_or_else(|| XlimagesError::SheetNotExist(name.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::types::{CellValue, Sheet};

    fn sheets() -> Vec<SheetState> {
        vec![SheetState {
            sheet: Sheet {
                id: "1".into(),
                name: "Data".into(),
                path: "xl/worksheets/sheet1.xml".into(),
            },
            grid: SheetGrid::new(),
        }]
    }

    #[test]
    fn test_batch_lands_together() {
        let mut sheets = sheets();
        let mut batch = SheetWrites::new("Data");
        batch.push(CellCoordinate::new(2, 1), "a");
        batch.push(CellCoordinate::new(7, 0), "b");
        batch.push(CellCoordinate::new(2, 1), "c");

        assert_eq!(apply_sheet_writes(&mut sheets, batch).unwrap(), 3);
        let grid = &sheets[0].grid;
        assert_eq!(grid.row_count(), 8);
        assert_eq!(grid.get(CellCoordinate::new(2, 1)), Some(&CellValue::Text("c".into())));
        assert_eq!(grid.edits().len(), 2);
    }

    #[test]
    fn test_unknown_sheet() {
        let mut sheets = sheets();
        let mut batch = SheetWrites::new("Other");
        batch.push(CellCoordinate::new(0, 0), "x");
        let err = apply_sheet_writes(&mut sheets, batch).unwrap_err();
        assert!(matches!(err, XlimagesError::SheetNotExist(ref name) if name == "Other"));
        assert!(!sheets[0].grid.is_dirty());

        let err = apply_cell_write(&mut sheets, "Other", CellCoordinate::new(0, 0), "x")
            .unwrap_err();
        assert!(matches!(err, XlimagesError::SheetNotExist(_)));
    }
}
