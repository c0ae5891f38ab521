use serde::Serialize;
use std::path::PathBuf;

/// Where a resource was declared, filled in after the resource decoded successfully
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResourceMetadata {
    pub resource_name: String,
    pub file_name: Option<PathBuf>,
    pub start_line_number: usize,
    pub end_line_number: usize,
    /// created from a content file instead of a declaration block
    pub is_auto_generated: bool,
    /// source text of the declaring block
    pub source_definition: String,
    pub mod_name: String,
    pub mod_full_name: String,
    pub anonymous: bool,
}
