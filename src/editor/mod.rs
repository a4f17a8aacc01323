//! Workbook editing session.
//!
//! `Workbook` owns a loaded package together with one in-memory cell grid per
//! sheet, adding:
//! - image resolution against the loaded package
//! - cell writes with dirty tracking
//! - image-to-text rewriting via an async callback
//! - XLSX save (roundtrip via the export pipeline)

pub mod mutation;
pub mod transform;

use std::error::Error;
use std::future::Future;

use crate::error::{Result, XlimagesError};
use crate::options::ResolveOptions;
use crate::package::Package;
use crate::parser::workbook::{shared_strings_part, SheetRegistry};
use crate::parser::worksheet::{load_grid, read_shared_strings};
use crate::resolver;
use crate::types::{CellCoordinate, ImageLocationMap, MediaFile, Sheet, SheetGrid};

/// One sheet of a loaded workbook.
#[derive(Debug, Clone)]
pub(crate) struct SheetState {
    pub sheet: Sheet,
    pub grid: SheetGrid,
}

/// A loaded workbook: the package and the cell grids derived from it.
#[derive(Debug, Default)]
pub struct Workbook {
    options: ResolveOptions,
    package: Option<Package>,
    sheets: Vec<SheetState>,
}

impl Workbook {
    /// Create an empty session with default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_options(options: ResolveOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Open and load a workbook in one step.
    ///
    /// # Errors
    /// See [`Workbook::load`].
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut workbook = Self::new();
        workbook.load(data)?;
        Ok(workbook)
    }

    /// Load an XLSX file from bytes, replacing anything loaded before.
    ///
    /// Every sheet's cell values are read into a grid.
    ///
    /// # Errors
    /// Returns an error if the bytes are not a ZIP archive, the workbook
    /// descriptor is missing or malformed, or a worksheet is malformed.
    pub fn load(&mut self, data: &[u8]) -> Result<()> {
        let package = Package::open(data)?;
        let mapper = self.options.mapper();
        let workbook_part = self.options.workbook_part.as_str();

        let registry = SheetRegistry::build(&package, &mapper, workbook_part)?;
        let sst_path = shared_strings_part(&package, &mapper, workbook_part)?;
        let shared_strings = read_shared_strings(&package, &sst_path)?;

        let sheets = registry
            .sheets()
            .iter()
            .map(|sheet| {
                Ok(SheetState {
                    grid: load_grid(&package, &sheet.path, &shared_strings)?,
                    sheet: sheet.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        log::debug!("loaded workbook with {} sheets", sheets.len());
        self.package = Some(package);
        self.sheets = sheets;
        Ok(())
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.package.is_some()
    }

    #[must_use]
    pub fn options(&self) -> &ResolveOptions {
        &self.options
    }

    /// The loaded package.
    ///
    /// # Errors
    /// Returns [`XlimagesError::NotLoaded`] before [`Workbook::load`].
    pub fn package(&self) -> Result<&Package> {
        self.package.as_ref().ok_or(XlimagesError::NotLoaded)
    }

    /// Sheet names in declared order.
    ///
    /// # Errors
    /// Returns [`XlimagesError::NotLoaded`] before [`Workbook::load`].
    pub fn sheet_names(&self) -> Result<Vec<&str>> {
        self.package()?;
        Ok(self.sheets.iter().map(|s| s.sheet.name.as_str()).collect())
    }

    /// The cell grid of a sheet.
    ///
    /// # Errors
    /// Returns [`XlimagesError::NotLoaded`] before load and
    /// [`XlimagesError::SheetNotExist`] for an unknown sheet.
    pub fn grid(&self, sheet: &str) -> Result<&SheetGrid> {
        self.package()?;
        self.sheets
            .iter()
            .find(|s| s.sheet.name == sheet)
            .map(|s| &s.grid)
            .ok_or_else(|| XlimagesError::SheetNotExist(sheet.to_string()))
    }

    /// Write a string into a cell, growing the grid as needed.
    ///
    /// # Errors
    /// Returns [`XlimagesError::NotLoaded`] before load and
    /// [`XlimagesError::SheetNotExist`] for an unknown sheet.
    pub fn set_cell(&mut self, sheet: &str, at: CellCoordinate, value: &str) -> Result<()> {
        self.package()?;
        mutation::apply_cell_write(&mut self.sheets, sheet, at, value)
    }

    /// Resolve every embedded image to the cells it is anchored to.
    ///
    /// Resolution reads the package as loaded; cell writes do not affect it.
    ///
    /// # Errors
    /// Returns [`XlimagesError::NotLoaded`] before load, or any resolution error.
    pub fn resolve(&self) -> Result<ImageLocationMap> {
        resolver::resolve(self.package()?, &self.options)
    }

    /// Replace every anchored image with the text `callback` produces for it.
    ///
    /// The callback receives each image and its `from` cell, sheet by sheet
    /// in resolution order, one at a time. Its result is written into that
    /// cell. Returns the number of cells written.
    ///
    /// # Errors
    /// Fails with [`XlimagesError::Callback`] on the first callback error.
    /// Sheets already processed keep their writes.
    pub async fn transform<F, Fut, E>(&mut self, mut callback: F) -> Result<usize>
    where
        F: FnMut(MediaFile, CellCoordinate) -> Fut,
        Fut: Future<Output = std::result::Result<String, E>>,
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        transform::run(self, |_, file, at| callback(file, at)).await
    }

    /// Like [`Workbook::transform`], but the callback is also told which
    /// sheet the image sits on.
    ///
    /// # Errors
    /// See [`Workbook::transform`].
    pub async fn transform_sheets<F, Fut, E>(&mut self, callback: F) -> Result<usize>
    where
        F: FnMut(&str, MediaFile, CellCoordinate) -> Fut,
        Fut: Future<Output = std::result::Result<String, E>>,
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        transform::run(self, callback).await
    }

    /// Whether any cell has been written since load.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.sheets.iter().any(|s| s.grid.is_dirty())
    }

    /// Save the workbook to XLSX bytes.
    ///
    /// Returns the original bytes unchanged if nothing was written.
    ///
    /// # Errors
    /// Returns [`XlimagesError::NotLoaded`] before load, or an error from
    /// rewriting an edited worksheet.
    pub fn save(&self) -> Result<Vec<u8>> {
        let package = self.package()?;
        let dirty = self
            .sheets
            .iter()
            .filter(|s| s.grid.is_dirty())
            .map(|s| (s.sheet.path.as_str(), &s.grid));
        crate::export::save_xlsx(package, dirty)
    }

    pub(crate) fn sheets_mut(&mut self) -> &mut [SheetState] {
        &mut self.sheets
    }
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

    #[test]
    fn test_operations_before_load() {
        let mut workbook = Workbook::new();
        assert!(!workbook.is_loaded());
        assert!(matches!(workbook.resolve(), Err(XlimagesError::NotLoaded)));
        assert!(matches!(workbook.save(), Err(XlimagesError::NotLoaded)));
        assert!(matches!(workbook.grid("Data"), Err(XlimagesError::NotLoaded)));
        assert!(matches!(workbook.sheet_names(), Err(XlimagesError::NotLoaded)));
        assert!(matches!(
            workbook.set_cell("Data", CellCoordinate::new(0, 0), "x"),
            Err(XlimagesError::NotLoaded)
        ));
    }

    #[test]
    fn test_load_rejects_non_zip() {
        let mut workbook = Workbook::new();
        assert!(workbook.load(b"nope").is_err());
        assert!(!workbook.is_loaded());
    }

    #[test]
    fn test_with_options() {
        let options = ResolveOptions {
            image_relationships_only: false,
            ..ResolveOptions::default()
        };
        let workbook = Workbook::with_options(options.clone());
        assert_eq!(workbook.options(), &options);
    }
}
