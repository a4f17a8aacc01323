use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use super::ImageLocation;

/// A sheet as declared by the workbook descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sheet {
    /// Internal sheet identifier (`sheetId`)
    pub id: String,
    /// User-visible sheet name
    pub name: String,
    /// Package path of the worksheet part, e.g. "xl/worksheets/sheet1.xml"
    pub path: String,
}

/// Images found on one sheet, in resolution order.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetImages {
    pub sheet: String,
    pub images: Vec<ImageLocation>,
}

/// Sheet name to image locations, in the workbook's declared sheet order.
///
/// Serializes as a JSON object keyed by sheet name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageLocationMap {
    sheets: Vec<SheetImages>,
}

impl ImageLocationMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Images for `sheet`, or `None` if the sheet was not resolved.
    #[must_use]
    pub fn get(&self, sheet: &str) -> Option<&[ImageLocation]> {
        self.sheets
            .iter()
            .find(|s| s.sheet == sheet)
            .map(|s| s.images.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = &SheetImages> {
        self.sheets.iter()
    }

    /// Sheet names in declared order.
    pub fn sheet_names(&self) -> impl Iterator<Item = &str> {
        self.sheets.iter().map(|s| s.sheet.as_str())
    }

    /// Number of sheets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sheets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }

    /// Number of image locations across all sheets.
    #[must_use]
    pub fn total_images(&self) -> usize {
        self.sheets.iter().map(|s| s.images.len()).sum()
    }

    pub(crate) fn push(&mut self, sheet: impl Into<String>, images: Vec<ImageLocation>) {
        self.sheets.push(SheetImages {
            sheet: sheet.into(),
            images,
        });
    }
}

impl<'a> IntoIterator for &'a ImageLocationMap {
    type Item = &'a SheetImages;
    type IntoIter = std::slice::Iter<'a, SheetImages>;

    fn into_iter(self) -> Self::IntoIter {
        self.sheets.iter()
    }
}

impl Serialize for ImageLocationMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.sheets.len()))?;
        for sheet in &self.sheets {
            map.serialize_entry(&sheet.sheet, &sheet.images)?;
        }
        map.end()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::types::{CellCoordinate, MediaFile};

    #[test]
    fn test_map_keeps_declared_order() {
        let mut map = ImageLocationMap::new();
        map.push("Zeta", Vec::new());
        map.push("Alpha", Vec::new());

        assert_eq!(map.sheet_names().collect::<Vec<_>>(), vec!["Zeta", "Alpha"]);
        assert_eq!(map.get("Alpha"), Some(&[][..]));
        assert_eq!(map.get("Missing"), None);
        assert_eq!(map.total_images(), 0);
    }

    #[test]
    fn test_map_serializes_as_object() {
        let mut map = ImageLocationMap::new();
        let at = CellCoordinate::new(2, 1);
        map.push(
            "Data",
            vec![ImageLocation {
                file: MediaFile::new("xl/media/image1.png", b"png".to_vec()),
                from: at,
                to: CellCoordinate::new(4, 3),
            }],
        );

        let json = serde_json::to_value(&map).unwrap();
        let data = &json["Data"][0];
        assert_eq!(data["from"]["row"], 2);
        assert_eq!(data["from"]["col"], 1);
        assert_eq!(data["to"]["row"], 4);
        assert_eq!(data["file"]["path"], "xl/media/image1.png");
    }
}
