use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Zero-based cell position.
///
/// Ordering is row-major, which is also the order cells appear in worksheet XML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellCoordinate {
    pub row: u32,
    pub col: u32,
}

impl CellCoordinate {
    #[must_use]
    pub const fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }
}

impl fmt::Display for CellCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::cell_ref::cell_ref(self.row, self.col))
    }
}

/// A cell's value as loaded from the worksheet or written by the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Bool(bool),
    Error(String),
}

impl CellValue {
    /// The value as text, if it is a string cell.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) | Self::Error(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
            Self::Bool(true) => f.write_str("TRUE"),
            Self::Bool(false) => f.write_str("FALSE"),
        }
    }
}

/// In-memory cell grid for one sheet.
///
/// Rows and columns are sparse: they only exist up to the furthest cell that
/// was loaded or written. Writes grow the grid as needed and are recorded so
/// the sheet can be patched on save.
#[derive(Debug, Clone, Default)]
pub struct SheetGrid {
    rows: Vec<Vec<Option<CellValue>>>,
    edits: BTreeMap<CellCoordinate, String>,
}

impl SheetGrid {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Value at `at`, or `None` for an empty or out-of-bounds cell.
    #[must_use]
    pub fn get(&self, at: CellCoordinate) -> Option<&CellValue> {
        self.rows
            .get(at.row as usize)?
            .get(at.col as usize)?
            .as_ref()
    }

    /// Write a string into the cell, creating missing rows and columns.
    pub fn set(&mut self, at: CellCoordinate, value: impl Into<String>) {
        let value = value.into();
        self.place(at, CellValue::Text(value.clone()));
        self.edits.insert(at, value);
    }

    /// Number of rows currently materialized.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Materialized cells of one row.
    #[must_use]
    pub fn row(&self, row: u32) -> Option<&[Option<CellValue>]> {
        self.rows.get(row as usize).map(Vec::as_slice)
    }

    /// Cells written since load, in row-major order.
    #[must_use]
    pub fn edits(&self) -> &BTreeMap<CellCoordinate, String> {
        &self.edits
    }

    /// Whether any cell has been written since load.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        !self.edits.is_empty()
    }

    /// Store a loaded value without recording it as an edit.
    pub(crate) fn load(&mut self, at: CellCoordinate, value: CellValue) {
        self.place(at, value);
    }

    fn place(&mut self, at: CellCoordinate, value: CellValue) {
        let row_idx = at.row as usize;
        let col_idx = at.col as usize;

        if self.rows.len() <= row_idx {
            self.rows.resize_with(row_idx + 1, Vec::new);
        }
        if let Some(row) = self.rows.get_mut(row_idx) {
            if row.len() <= col_idx {
                row.resize(col_idx + 1, None);
            }
            if let Some(cell) = row.get_mut(col_idx) {
                *cell = Some(value);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_set_grows_missing_rows_and_columns() {
        let mut grid = SheetGrid::new();
        assert_eq!(grid.row_count(), 0);

        grid.set(CellCoordinate::new(4, 2), "x");

        assert_eq!(grid.row_count(), 5);
        assert_eq!(grid.row(0).unwrap().len(), 0);
        assert_eq!(grid.row(4).unwrap().len(), 3);
        assert_eq!(
            grid.get(CellCoordinate::new(4, 2)),
            Some(&CellValue::Text("x".into()))
        );
        assert_eq!(grid.get(CellCoordinate::new(4, 1)), None);
        assert_eq!(grid.get(CellCoordinate::new(40, 0)), None);
    }

    #[test]
    fn test_set_records_edits_but_load_does_not() {
        let mut grid = SheetGrid::new();
        grid.load(CellCoordinate::new(0, 0), CellValue::Number(1.5));
        assert!(!grid.is_dirty());

        grid.set(CellCoordinate::new(0, 0), "over");
        grid.set(CellCoordinate::new(0, 0), "again");
        assert!(grid.is_dirty());
        assert_eq!(grid.edits().len(), 1);
        assert_eq!(grid.edits()[&CellCoordinate::new(0, 0)], "again");
    }

    #[test]
    fn test_coordinates_order_row_major() {
        let mut coords = vec![
            CellCoordinate::new(1, 0),
            CellCoordinate::new(0, 5),
            CellCoordinate::new(0, 1),
        ];
        coords.sort();
        assert_eq!(
            coords,
            vec![
                CellCoordinate::new(0, 1),
                CellCoordinate::new(0, 5),
                CellCoordinate::new(1, 0)
            ]
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(CellCoordinate::new(2, 1).to_string(), "B3");
        assert_eq!(CellValue::Bool(true).to_string(), "TRUE");
        assert_eq!(CellValue::Number(42.0).to_string(), "42");
    }
}
