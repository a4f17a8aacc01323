//! Structured error types for xlimages.
//!
//! Every failure is fatal to the operation that raised it; nothing is retried.

/// All errors that can occur while resolving or rewriting embedded images.
#[derive(Debug, thiserror::Error)]
pub enum XlimagesError {
    /// An operation was invoked before a package was loaded.
    #[error("No workbook loaded")]
    NotLoaded,

    /// A sheet name used during resolution has no registry entry.
    #[error("Sheet not found in registry: {0}")]
    SheetNotFound(String),

    /// A write targeted a sheet the workbook does not have.
    #[error("Sheet does not exist: {0}")]
    SheetNotExist(String),

    /// The workbook descriptor is missing or unusable.
    #[error("Sheet registry: {reason}")]
    SheetRegistry {
        reason: String,
        #[source]
        source: Option<Box<XlimagesError>>,
    },

    /// A worksheet declares a drawing but a linked part is missing.
    #[error("Drawing resolution failed for sheet '{sheet}': {reason}")]
    DrawingResolution { sheet: String, reason: String },

    /// A media relationship in a drawing has no anchor pointing at it.
    #[error("No anchor references relationship '{relationship_id}' in {drawing}")]
    ImageAnchorNotFound {
        drawing: String,
        relationship_id: String,
    },

    /// Malformed XML in a consumed part.
    #[error("XML parsing in {path}: {message}")]
    XmlParse {
        path: String,
        content: String,
        message: String,
    },

    /// Well-formed XML whose shape does not match the expected part record.
    #[error("Unexpected structure in {path}: {message}")]
    Schema { path: String, message: String },

    /// XML error from quick-xml outside of a specific part.
    #[error("XML: {0}")]
    Xml(#[from] quick_xml::Error),

    /// ZIP archive error.
    #[error("ZIP archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be decoded.
    #[error("Configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// The transform callback rejected.
    #[error("Transform callback failed: {0}")]
    Callback(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, XlimagesError>;

impl XlimagesError {
    pub(crate) fn drawing(sheet: &str, reason: impl Into<String>) -> Self {
        Self::DrawingResolution {
            sheet: sheet.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(target_arch = "wasm32")]
impl From<XlimagesError> for wasm_bindgen::JsValue {
    fn from(e: XlimagesError) -> Self {
        wasm_bindgen::JsValue::from_str(&e.to_string())
    }
}
