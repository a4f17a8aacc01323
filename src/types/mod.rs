//! Data types shared across the resolver and the rewrite engine.

mod cell;
mod drawing;
mod workbook;

pub use cell::*;
pub use drawing::*;
pub use workbook::*;
