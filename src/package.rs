//! Access to the named parts of an XLSX package.
//!
//! A package is opened from the raw bytes of the ZIP container. Archived parts
//! are indexed up front and inflated only when asked for. Parts can also be
//! inserted directly as bytes, which shadow any archived part with the same
//! name. Both forms come back out of [`Package::part`] as plain bytes.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::sync::Arc;

use zip::result::ZipError;
use zip::ZipArchive;

use crate::error::{Result, XlimagesError};

type Archive = ZipArchive<Cursor<Arc<[u8]>>>;

/// Where a part's bytes live.
#[derive(Debug, Clone)]
enum PartEntry {
    /// Inflated on demand from the original archive.
    Archived,
    /// Held in memory.
    Direct(Arc<[u8]>),
}

/// An opened XLSX package.
pub struct Package {
    /// Original container bytes, kept for raw-copy on save.
    data: Arc<[u8]>,
    archive: Option<RefCell<Archive>>,
    entries: BTreeMap<String, PartEntry>,
    /// Archive entry names in their original order.
    order: Vec<String>,
}

impl Package {
    /// Open a package from the bytes of a ZIP container.
    ///
    /// # Errors
    /// Returns an error if the bytes are not a readable ZIP archive.
    pub fn open(data: &[u8]) -> Result<Self> {
        let data: Arc<[u8]> = Arc::from(data);
        let mut archive = ZipArchive::new(Cursor::new(Arc::clone(&data)))?;

        // Central directory order, so save can reproduce it.
        let mut order = Vec::with_capacity(archive.len());
        let mut entries = BTreeMap::new();
        for i in 0..archive.len() {
            let name = archive.by_index_raw(i)?.name().to_string();
            entries.insert(name.clone(), PartEntry::Archived);
            order.push(name);
        }

        log::debug!("opened package with {} parts", order.len());

        Ok(Self {
            data,
            archive: Some(RefCell::new(archive)),
            entries,
            order,
        })
    }

    /// Create an empty package with no backing archive.
    ///
    /// Parts are added with [`Package::insert_part`].
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            data: Arc::from(Vec::new()),
            archive: None,
            entries: BTreeMap::new(),
            order: Vec::new(),
        }
    }

    /// Store a part's bytes directly, replacing any part with the same name.
    pub fn insert_part(&mut self, path: &str, bytes: impl Into<Vec<u8>>) {
        let path = normalize_part_path(path);
        let bytes: Arc<[u8]> = Arc::from(bytes.into());
        self.entries.insert(path.to_string(), PartEntry::Direct(bytes));
    }

    /// Whether a part with this name exists.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(normalize_part_path(path))
    }

    /// Read a part's raw bytes.
    ///
    /// A missing part is `Ok(None)`; only an unreadable part is an error.
    ///
    /// # Errors
    /// Returns an error if the part exists but cannot be inflated.
    pub fn part(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let path = normalize_part_path(path);
        match self.entries.get(path) {
            None => Ok(None),
            Some(PartEntry::Direct(bytes)) => Ok(Some(bytes.to_vec())),
            Some(PartEntry::Archived) => self.read_archived(path),
        }
    }

    /// Read a part and decode it as UTF-8 text.
    ///
    /// # Errors
    /// Returns [`XlimagesError::XmlParse`] if the part is not valid UTF-8.
    pub fn part_text(&self, path: &str) -> Result<Option<String>> {
        let Some(bytes) = self.part(path)? else {
            return Ok(None);
        };

        match String::from_utf8(bytes) {
            Ok(text) => Ok(Some(text)),
            Err(e) => Err(XlimagesError::XmlParse {
                path: normalize_part_path(path).to_string(),
                content: String::from_utf8_lossy(e.as_bytes()).into_owned(),
                message: format!("part is not valid UTF-8: {}", e.utf8_error()),
            }),
        }
    }

    /// Names of every part: archive entries first, in archive order, then
    /// directly inserted parts that do not shadow an archive entry.
    #[must_use]
    pub fn part_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.order.iter().map(String::as_str).collect();
        for (name, entry) in &self.entries {
            if matches!(entry, PartEntry::Direct(_)) && !self.order.contains(name) {
                names.push(name.as_str());
            }
        }
        names
    }

    /// Bytes of the container this package was opened from.
    ///
    /// Empty for an in-memory package.
    #[must_use]
    pub fn original_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Whether a part was inserted directly rather than read from the archive.
    pub(crate) fn is_direct(&self, path: &str) -> bool {
        matches!(
            self.entries.get(normalize_part_path(path)),
            Some(PartEntry::Direct(_))
        )
    }

    pub(crate) fn has_archive(&self) -> bool {
        self.archive.is_some()
    }

    fn read_archived(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let Some(archive) = &self.archive else {
            return Ok(None);
        };
        let mut archive = archive.borrow_mut();

        let mut file = match archive.by_name(path) {
            Ok(file) => file,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        Ok(Some(data))
    }
}

impl std::fmt::Debug for Package {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Package")
            .field("bytes", &self.data.len())
            .field("archived", &self.archive.is_some())
            .field("parts", &self.entries.len())
            .finish()
    }
}

/// Strip a leading `/` from a part name.
///
/// Relationship targets may be written absolute (`/xl/media/image1.png`) while
/// ZIP entry names never carry the leading slash.
pub fn normalize_part_path(path: &str) -> &str {
    path.trim_start_matches('/')
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
    use std::io::Write;
    use zip::write::FileOptions;
    use zip::ZipWriter;

    fn zip_with(parts: &[(&str, &[u8])]) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut zip = ZipWriter::new(&mut buffer);
            let options =
                FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
            for (name, data) in parts {
                zip.start_file(*name, options).unwrap();
                zip.write_all(data).unwrap();
            }
            zip.finish().unwrap();
        }
        buffer.into_inner()
    }

    #[test]
    fn test_archived_part_is_read_lazily() {
        let data = zip_with(&[("xl/workbook.xml", b"<workbook/>"), ("xl/media/a.png", b"PNG")]);
        let package = Package::open(&data).unwrap();

        assert_eq!(package.part("xl/media/a.png").unwrap(), Some(b"PNG".to_vec()));
        assert_eq!(
            package.part_text("/xl/workbook.xml").unwrap().as_deref(),
            Some("<workbook/>")
        );
    }

    #[test]
    fn test_missing_part_is_none() {
        let data = zip_with(&[("xl/workbook.xml", b"<workbook/>")]);
        let package = Package::open(&data).unwrap();
        assert_eq!(package.part("xl/drawings/drawing1.xml").unwrap(), None);
        assert!(!package.contains("xl/drawings/drawing1.xml"));
    }

    #[test]
    fn test_direct_part_shadows_archive() {
        let data = zip_with(&[("xl/workbook.xml", b"<old/>")]);
        let mut package = Package::open(&data).unwrap();
        package.insert_part("xl/workbook.xml", b"<new/>".to_vec());
        package.insert_part("/xl/extra.xml", b"<extra/>".to_vec());

        assert_eq!(package.part("xl/workbook.xml").unwrap(), Some(b"<new/>".to_vec()));
        assert!(package.is_direct("xl/workbook.xml"));
        assert_eq!(package.part_names(), vec!["xl/workbook.xml", "xl/extra.xml"]);
    }

    #[test]
    fn test_in_memory_package() {
        let mut package = Package::in_memory();
        assert!(!package.has_archive());
        assert_eq!(package.part("anything").unwrap(), None);

        package.insert_part("xl/workbook.xml", "<workbook/>");
        assert!(package.contains("xl/workbook.xml"));
        assert!(package.original_bytes().is_empty());
    }

    #[test]
    fn test_invalid_utf8_is_xml_parse_error() {
        let mut package = Package::in_memory();
        package.insert_part("xl/workbook.xml", vec![0xFF, 0xFE, 0x00]);
        let err = package.part_text("xl/workbook.xml").unwrap_err();
        assert!(matches!(err, XlimagesError::XmlParse { ref path, .. } if path == "xl/workbook.xml"));
    }

    #[test]
    fn test_not_a_zip() {
        assert!(Package::open(b"definitely not a zip").is_err());
    }
}
