//! Image-to-text rewriting.

use std::error::Error;
use std::future::Future;

use crate::error::{Result, XlimagesError};
use crate::types::{CellCoordinate, MediaFile};

use super::mutation::{apply_sheet_writes, SheetWrites};
use super::Workbook;

/// Run `callback` for every resolved image location and write its result into
/// the location's `from` cell. The callback also receives the sheet name.
///
/// Calls are strictly sequential: each result is awaited before the next
/// image is handed out. A sheet's writes are applied once all of its images
/// have been processed.
pub(crate) async fn run<F, Fut, E>(workbook: &mut Workbook, mut callback: F) -> Result<usize>
where
    F: FnMut(&str, MediaFile, CellCoordinate) -> Fut,
    Fut: Future<Output = std::result::Result<String, E>>,
    E: Into<Box<dyn Error + Send + Sync>>,
{
    let locations = workbook.resolve()?;
    let mut written = 0;

    for sheet in &locations {
        let mut batch = SheetWrites::new(sheet.sheet.as_str());

        for location in &sheet.images {
            let value = callback(sheet.sheet.as_str(), location.file.clone(), location.from)
                .await
                .map_err(|e| XlimagesError::Callback(e.into()))?;
            log::debug!("{}!{} <- {} ({})", sheet.sheet, location.from, value, location.file.path);
            batch.push(location.from, value);
        }

        if batch.is_empty() {
            continue;
        }
        let count = apply_sheet_writes(workbook.sheets_mut(), batch)?;
        log::info!("sheet '{}': rewrote {count} image cells", sheet.sheet);
        written += count;
    }

    Ok(written)
}
