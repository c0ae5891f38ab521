use super::diff::{DiffBuilder, ResourceDiff};
use super::{BlockType, HclResource, ResourceMetadata};
use crate::diagnostics::SourceRange;
use serde::Serialize;

/// One attribute of a `locals` block
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Local {
    pub short_name: String,
    pub full_name: String,
    pub value: hcl::Value,

    #[serde(skip)]
    pub decl_range: SourceRange,
    pub metadata: Option<ResourceMetadata>,
}

impl Local {
    pub fn new(mod_name: &str, short_name: &str, value: hcl::Value, decl_range: SourceRange) -> Self {
        Self {
            short_name: short_name.to_string(),
            full_name: format!("{mod_name}.local.{short_name}"),
            value,
            decl_range,
            metadata: None,
        }
    }

    pub fn diff(&self, other: &Local) -> ResourceDiff {
        DiffBuilder::new(&self.full_name, BlockType::Locals)
            .check("value", &self.value, &other.value)
            .build()
    }
}

impl HclResource for Local {
    fn name(&self) -> &str {
        &self.full_name
    }

    fn short_name(&self) -> &str {
        &self.short_name
    }

    fn block_type(&self) -> BlockType {
        BlockType::Locals
    }

    fn decl_range(&self) -> &SourceRange {
        &self.decl_range
    }

    fn metadata(&self) -> Option<&ResourceMetadata> {
        self.metadata.as_ref()
    }

    fn set_metadata(&mut self, metadata: ResourceMetadata) {
        self.metadata = Some(metadata);
    }

    fn to_value(&self) -> hcl::Value {
        self.value.clone()
    }
}
