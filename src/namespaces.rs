//! Relationship type constants and matchers.
//!
//! Transitional and Strict conformance packages use different relationship
//! type URIs for the same link. The matchers accept both, plus any URI ending
//! in the same path segment, since some writers emit their own prefixes.

// =============================================================================
// Transitional relationship types
// =============================================================================

/// Relationship type for worksheets
pub const REL_WORKSHEET: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";

/// Relationship type for a worksheet's drawing part
pub const REL_DRAWING: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/drawing";

/// Relationship type for an image referenced by a drawing
pub const REL_IMAGE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";

// =============================================================================
// Strict OOXML relationship types (Office 2013+)
// =============================================================================

/// Strict relationship type for worksheets
pub const REL_WORKSHEET_STRICT: &str =
    "http://purl.oclc.org/ooxml/officeDocument/relationships/worksheet";

/// Strict relationship type for drawings
pub const REL_DRAWING_STRICT: &str =
    "http://purl.oclc.org/ooxml/officeDocument/relationships/drawing";

/// Strict relationship type for images
pub const REL_IMAGE_STRICT: &str = "http://purl.oclc.org/ooxml/officeDocument/relationships/image";

/// Check if a relationship type is for a worksheet.
pub fn is_worksheet_relationship(rel_type: &str) -> bool {
    rel_type == REL_WORKSHEET || rel_type == REL_WORKSHEET_STRICT || rel_type.ends_with("/worksheet")
}

/// Check if a relationship type is for a drawing.
pub fn is_drawing_relationship(rel_type: &str) -> bool {
    rel_type == REL_DRAWING || rel_type == REL_DRAWING_STRICT || rel_type.ends_with("/drawing")
}

/// Check if a relationship type is for an image.
pub fn is_image_relationship(rel_type: &str) -> bool {
    rel_type == REL_IMAGE || rel_type == REL_IMAGE_STRICT || rel_type.ends_with("/image")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relationship_type_matching() {
        // Transitional conformance
        assert!(is_worksheet_relationship(REL_WORKSHEET));
        assert!(is_drawing_relationship(REL_DRAWING));
        assert!(is_image_relationship(REL_IMAGE));

        // Strict conformance
        assert!(is_worksheet_relationship(REL_WORKSHEET_STRICT));
        assert!(is_drawing_relationship(REL_DRAWING_STRICT));
        assert!(is_image_relationship(REL_IMAGE_STRICT));

        // Neighbouring types must not match
        assert!(!is_image_relationship(REL_DRAWING));
        assert!(!is_drawing_relationship(
            "http://schemas.openxmlformats.org/officeDocument/2006/relationships/vmlDrawing"
        ));
        assert!(!is_image_relationship(
            "http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink"
        ));
    }
}
