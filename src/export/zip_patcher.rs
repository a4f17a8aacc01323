//! Patch an XLSX ZIP archive with replaced parts.
//!
//! Unmodified entries are copied via `raw_copy_file` (zero recompression cost).
//! Only replaced parts are written fresh.

use std::collections::{BTreeMap, HashSet};
use std::io::{Cursor, Write};
use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::error::Result;

/// Rebuild the archive in `original_data`, swapping in `replacements`.
///
/// Entries keep their original order; replacement parts the archive did not
/// have are appended in name order. With no original archive the result
/// holds only the replacements.
pub(crate) fn patch_zip(
    original_data: Option<&[u8]>,
    replacements: &BTreeMap<String, Vec<u8>>,
) -> Result<Vec<u8>> {
    let capacity = original_data.map_or(0, <[u8]>::len);
    let mut writer = ZipWriter::new(Cursor::new(Vec::with_capacity(capacity)));
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    let mut replaced: HashSet<&str> = HashSet::new();

    if let Some(original_data) = original_data {
        let mut archive = ZipArchive::new(Cursor::new(original_data))?;

        for i in 0..archive.len() {
            let entry = archive.by_index_raw(i)?;
            let name = entry.name().to_string();

            if let Some((key, bytes)) = replacements.get_key_value(&name) {
                writer.start_file(name, options)?;
                writer.write_all(bytes)?;
                replaced.insert(key.as_str());
                continue;
            }

            // Pass through unmodified entry (raw copy, no re-compression)
            writer.raw_copy_file(entry)?;
        }
    }

    for (name, bytes) in replacements {
        if replaced.contains(name.as_str()) {
            continue;
        }
        writer.start_file(name.as_str(), options)?;
        writer.write_all(bytes)?;
    }

    let cursor = writer.finish()?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use std::io::Read;

    fn zip_with(parts: &[(&str, &[u8])]) -> Vec<u8> {
        let replacements = parts
            .iter()
            .map(|(name, data)| ((*name).to_string(), data.to_vec()))
            .collect();
        patch_zip(None, &replacements).unwrap()
    }

    fn read_entry(data: &[u8], name: &str) -> Vec<u8> {
        let mut archive = ZipArchive::new(Cursor::new(data)).unwrap();
        let mut file = archive.by_name(name).unwrap();
        let mut out = Vec::new();
        file.read_to_end(&mut out).unwrap();
        out
    }

    fn names(data: &[u8]) -> Vec<String> {
        let archive = ZipArchive::new(Cursor::new(data)).unwrap();
        archive.file_names().map(ToString::to_string).collect::<Vec<_>>()
    }

    #[test]
    fn test_replaces_in_place_and_appends_new_parts() {
        let original = zip_with(&[("b.xml", b"<b/>"), ("a.xml", b"<a/>")]);
        let mut replacements = BTreeMap::new();
        replacements.insert("a.xml".to_string(), b"<a2/>".to_vec());
        replacements.insert("c.xml".to_string(), b"<c/>".to_vec());

        let patched = patch_zip(Some(original.as_slice()), &replacements).unwrap();

        assert_eq!(read_entry(&patched, "a.xml"), b"<a2/>");
        assert_eq!(read_entry(&patched, "b.xml"), b"<b/>");
        assert_eq!(read_entry(&patched, "c.xml"), b"<c/>");

        let mut listed = names(&patched);
        listed.sort();
        assert_eq!(listed, vec!["a.xml", "b.xml", "c.xml"]);
    }

    #[test]
    fn test_without_archive_writes_only_replacements() {
        let patched = zip_with(&[("x.xml", b"<x/>")]);
        assert_eq!(names(&patched), vec!["x.xml"]);
    }
}
