//! xlimages - find the images embedded in an XLSX file and the cells they sit on
//!
//! Walks a workbook's package the way a spreadsheet application does:
//! - workbook → sheet names and worksheet parts
//! - worksheet → drawing (via the worksheet relationships)
//! - drawing → anchors and media parts (via the drawing relationships)
//!
//! Each anchored picture becomes an [`ImageLocation`]. A [`Workbook`] session
//! can then hand every image to an async callback and write the text it
//! returns (typically an upload URL) into the picture's cell, and save the
//! result as a new XLSX.
//!
//! # Usage (Rust)
//!
//! ```no_run
//! # async fn run(data: &[u8]) -> xlimages::Result<Vec<u8>> {
//! let mut workbook = xlimages::Workbook::from_bytes(data)?;
//! let images = workbook.resolve()?;
//! println!("{} images", images.total_images());
//!
//! workbook
//!     .transform(|file, at| async move {
//!         Ok::<_, std::io::Error>(format!("https://cdn.example/{}#{at}", file.file_name()))
//!     })
//!     .await?;
//! workbook.save()
//! # }
//! ```
//!
//! # Usage (JavaScript)
//!
//! ```javascript
//! import init, { resolve_images, transform_images } from 'xlimages';
//! await init();
//! const images = resolve_images(data);
//! const rewritten = await transform_images(data, async (bytes, { row, col }) => upload(bytes));
//! ```

pub mod cell_ref;
pub mod drawings;
pub mod editor;
pub mod error;
pub(crate) mod export;
pub mod namespaces;
pub mod options;
pub mod package;
pub mod parser;
pub mod resolver;
pub mod types;
pub mod xml_helpers;
pub mod xml_map;

use serde::Serialize;
use wasm_bindgen::prelude::*;

pub use drawings::{extract_anchors, locate_drawing, AnchorIndex, DrawingParts};
pub use editor::Workbook;
pub use error::{Result, XlimagesError};
pub use options::ResolveOptions;
pub use package::Package;
pub use parser::SheetRegistry;
pub use resolver::{resolve, ResolutionContext};
pub use types::*;
pub use xml_map::XmlMapper;

/// Resolve the images of an XLSX file and return them as a JSON string
///
/// Media bytes are base64-encoded.
///
/// # Errors
/// Returns an error if the XLSX file is invalid or cannot be resolved.
#[wasm_bindgen]
pub fn resolve_images_json(data: &[u8]) -> std::result::Result<String, JsValue> {
    let map = resolve_bytes(data).map_err(|e| JsValue::from_str(&e.to_string()))?;

    serde_json::to_string(&map)
        .map_err(|e| JsValue::from_str(&format!("JSON serialization error: {e}")))
}

/// Resolve the images of an XLSX file and return them as a `JsValue`
///
/// The result is a plain object keyed by sheet name.
///
/// # Errors
/// Returns an error if the XLSX file is invalid or cannot be resolved.
#[wasm_bindgen]
pub fn resolve_images(data: &[u8]) -> std::result::Result<JsValue, JsValue> {
    let map = resolve_bytes(data).map_err(|e| JsValue::from_str(&e.to_string()))?;

    map.serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| JsValue::from_str(&format!("Serialization error: {e}")))
}

/// Replace every image in an XLSX file with the string a JS callback returns
/// for it, and return the rewritten file.
///
/// The callback is called as `callback(bytes: Uint8Array, { row, col })`, one
/// image at a time, and may return a string or a promise of one.
///
/// # Errors
/// Rejects if the file cannot be resolved, or if the callback throws, rejects
/// or produces something other than a string.
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub async fn transform_images(
    data: Vec<u8>,
    callback: js_sys::Function,
) -> std::result::Result<Vec<u8>, JsValue> {
    console_error_panic_hook::set_once();

    let mut workbook = Workbook::from_bytes(&data)?;
    workbook
        .transform(|file, at| {
            let call = js_bridge::call_transform(&callback, &file, at);
            async move {
                let value = wasm_bindgen_futures::JsFuture::from(call?)
                    .await
                    .map_err(|e| js_bridge::error_text(&e))?;
                value
                    .as_string()
                    .ok_or_else(|| "transform callback returned a non-string value".to_string())
            }
        })
        .await?;

    Ok(workbook.save()?)
}

#[cfg(target_arch = "wasm32")]
mod js_bridge {
    use wasm_bindgen::JsValue;

    use crate::types::{CellCoordinate, MediaFile};

    pub(crate) fn call_transform(
        callback: &js_sys::Function,
        file: &MediaFile,
        at: CellCoordinate,
    ) -> Result<js_sys::Promise, String> {
        let bytes = js_sys::Uint8Array::from(file.data.as_ref());
        let coordinate = serde_wasm_bindgen::to_value(&at).map_err(|e| e.to_string())?;
        let result = callback
            .call2(&JsValue::NULL, &bytes.into(), &coordinate)
            .map_err(|e| error_text(&e))?;
        Ok(js_sys::Promise::resolve(&result))
    }

    pub(crate) fn error_text(value: &JsValue) -> String {
        value
            .as_string()
            .or_else(|| {
                js_sys::Reflect::get(value, &JsValue::from_str("message"))
                    .ok()
                    .and_then(|m| m.as_string())
            })
            .unwrap_or_else(|| format!("{value:?}"))
    }
}

/// Get the library version
#[must_use]
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Open a package and resolve it with default options.
///
/// # Errors
/// Returns an error if the bytes are not a readable XLSX package or
/// resolution fails.
pub fn resolve_bytes(data: &[u8]) -> Result<ImageLocationMap> {
    let package = Package::open(data)?;
    resolve(&package, &ResolveOptions::default())
}
