//! Watermarks carried between runs
//!
//! Tables are keyed by source id and remember the last import date. Files
//! are keyed by the normalized tag set of a mapping and remember the biggest
//! file id seen. Lookups of missing keys fail with
//! [`InputMappingError::NotFound`](crate::error::InputMappingError::NotFound).

pub mod file;
pub mod table;

pub use file::{FileTag, InputFileState, InputFileStateList};
pub use table::{InputTableState, InputTableStateList};
