use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::sync::Arc;

use super::CellCoordinate;

/// Cell range an image is anchored to.
///
/// For a one-cell anchor `to == from`. For a two-cell anchor both ends come
/// straight from the drawing and are not checked against each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchor {
    pub from: CellCoordinate,
    pub to: CellCoordinate,
}

impl Anchor {
    /// Anchor covering a single cell.
    #[must_use]
    pub const fn single(at: CellCoordinate) -> Self {
        Self { from: at, to: at }
    }
}

/// Bytes of a media part, shared between every location that shows it.
#[derive(Debug, Clone)]
pub struct MediaFile {
    /// Package path, e.g. "xl/media/image1.png"
    pub path: String,
    /// Raw image bytes
    pub data: Arc<[u8]>,
}

impl MediaFile {
    #[must_use]
    pub fn new(path: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            path: path.into(),
            data: data.into(),
        }
    }

    /// File name without directories.
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Format from magic bytes, falling back to the extension.
    #[must_use]
    pub fn format(&self) -> ImageFormat {
        let format = ImageFormat::from_magic_bytes(&self.data);
        if format == ImageFormat::Unknown {
            let ext = self.path.rsplit('.').next().unwrap_or("");
            ImageFormat::from_extension(ext)
        } else {
            format
        }
    }

    /// Whether both handles point at the same buffer.
    #[must_use]
    pub fn shares_data_with(&self, other: &MediaFile) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl PartialEq for MediaFile {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path && self.data == other.data
    }
}

impl Serialize for MediaFile {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("MediaFile", 4)?;
        state.serialize_field("path", &self.path)?;
        state.serialize_field("mimeType", self.format().mime_type())?;
        state.serialize_field("size", &self.data.len())?;
        state.serialize_field("data", &BASE64.encode(&self.data))?;
        state.end()
    }
}

/// One anchored occurrence of an embedded image.
///
/// An image anchored in several places yields one location per anchor, all
/// sharing the same [`MediaFile`] buffer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageLocation {
    pub file: MediaFile,
    pub from: CellCoordinate,
    pub to: CellCoordinate,
}

/// Image format/MIME type detection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Bmp,
    Tiff,
    Webp,
    Emf,
    Wmf,
    Unknown,
}

impl ImageFormat {
    /// Detect image format from file extension
    #[must_use]
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "png" => Self::Png,
            "jpg" | "jpeg" => Self::Jpeg,
            "gif" => Self::Gif,
            "bmp" => Self::Bmp,
            "tif" | "tiff" => Self::Tiff,
            "webp" => Self::Webp,
            "emf" => Self::Emf,
            "wmf" => Self::Wmf,
            _ => Self::Unknown,
        }
    }

    /// Detect image format from magic bytes
    #[must_use]
    pub fn from_magic_bytes(data: &[u8]) -> Self {
        if data.len() < 4 {
            return Self::Unknown;
        }

        // PNG: 89 50 4E 47
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
            return Self::Png;
        }

        // JPEG: FF D8 FF
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Self::Jpeg;
        }

        // GIF: GIF87a or GIF89a
        if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
            return Self::Gif;
        }

        // BMP: BM
        if data.starts_with(b"BM") {
            return Self::Bmp;
        }

        // TIFF: II or MM
        if data.starts_with(&[0x49, 0x49, 0x2A, 0x00])
            || data.starts_with(&[0x4D, 0x4D, 0x00, 0x2A])
        {
            return Self::Tiff;
        }

        // WebP: RIFF....WEBP
        if data.len() >= 12 && data.starts_with(b"RIFF") && data.get(8..12) == Some(b"WEBP") {
            return Self::Webp;
        }

        // EMF: 01 00 00 00
        if data.starts_with(&[0x01, 0x00, 0x00, 0x00]) && data.len() >= 40 {
            return Self::Emf;
        }

        // WMF: D7 CD C6 9A
        if data.starts_with(&[0xD7, 0xCD, 0xC6, 0x9A]) {
            return Self::Wmf;
        }

        Self::Unknown
    }

    /// Get MIME type for this image format
    #[must_use]
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Gif => "image/gif",
            Self::Bmp => "image/bmp",
            Self::Tiff => "image/tiff",
            Self::Webp => "image/webp",
            Self::Emf => "image/x-emf",
            Self::Wmf => "image/x-wmf",
            Self::Unknown => "application/octet-stream",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_image_format_detection() {
        let png_data = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        assert_eq!(ImageFormat::from_magic_bytes(&png_data), ImageFormat::Png);

        let jpeg_data = [0xFF, 0xD8, 0xFF, 0xE0];
        assert_eq!(ImageFormat::from_magic_bytes(&jpeg_data), ImageFormat::Jpeg);

        assert_eq!(ImageFormat::from_extension("PNG"), ImageFormat::Png);
        assert_eq!(ImageFormat::from_extension("jpeg"), ImageFormat::Jpeg);
        assert_eq!(ImageFormat::from_extension("unknown"), ImageFormat::Unknown);
    }

    #[test]
    fn test_media_file_format_falls_back_to_extension() {
        let file = MediaFile::new("xl/media/image3.gif", b"??".to_vec());
        assert_eq!(file.format(), ImageFormat::Gif);
        assert_eq!(file.file_name(), "image3.gif");

        let file = MediaFile::new("xl/media/pic.bin", vec![0x89, 0x50, 0x4E, 0x47, 0x00]);
        assert_eq!(file.format().mime_type(), "image/png");
    }

    #[test]
    fn test_media_file_serializes_base64() {
        let file = MediaFile::new("xl/media/a.png", b"abc".to_vec());
        let json = serde_json::to_value(&file).unwrap();
        assert_eq!(json["path"], "xl/media/a.png");
        assert_eq!(json["mimeType"], "image/png");
        assert_eq!(json["size"], 3);
        assert_eq!(json["data"], "YWJj");
    }

    #[test]
    fn test_shared_buffers() {
        let a = MediaFile::new("xl/media/a.png", b"abc".to_vec());
        let b = a.clone();
        let c = MediaFile::new("xl/media/a.png", b"abc".to_vec());
        assert!(a.shares_data_with(&b));
        assert!(!a.shares_data_with(&c));
        assert_eq!(a, c);
    }

    #[test]
    fn test_single_anchor() {
        let at = CellCoordinate::new(3, 4);
        let anchor = Anchor::single(at);
        assert_eq!(anchor.from, anchor.to);
    }
}
