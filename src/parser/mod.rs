//! Readers for the package parts the resolver walks.
//!
//! Structural parts (workbook, relationships, worksheet drawing reference)
//! go through the record mapper; cell data and shared strings are streamed.

pub mod relationships;
pub mod workbook;
pub mod worksheet;

pub use relationships::{read_relationships, Relationship, RelationshipTable};
pub use workbook::{shared_strings_part, SheetRegistry};
pub use worksheet::{load_grid, read_shared_strings, worksheet_drawing_id};
