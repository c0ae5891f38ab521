use super::diff::{DiffBuilder, ResourceDiff};
use super::query_provider::{QueryProvider, QuerySource};
use super::{BlockType, HclResource, ModTreeItem, ResourceMetadata, TreeError, ValueBuilder};
use crate::diagnostics::SourceRange;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Control {
    pub short_name: String,
    pub full_name: String,

    pub title: Option<String>,
    pub description: Option<String>,
    pub documentation: Option<String>,
    pub severity: Option<String>,
    pub search_path: Option<String>,
    pub search_path_prefix: Option<String>,
    pub width: Option<i64>,
    pub tags: BTreeMap<String, String>,
    #[serde(flatten)]
    pub source: QuerySource,
    /// fully-qualified name of the base control
    pub base: Option<String>,

    pub parents: Vec<String>,
    #[serde(skip)]
    pub decl_range: SourceRange,
    pub metadata: Option<ResourceMetadata>,
}

impl Control {
    pub fn new(mod_name: &str, short_name: &str, decl_range: SourceRange) -> Self {
        Self {
            short_name: short_name.to_string(),
            full_name: format!("{mod_name}.control.{short_name}"),
            decl_range,
            ..Default::default()
        }
    }

    pub fn inherit(&mut self, base: &Control) {
        inherit_opt(&mut self.title, &base.title);
        inherit_opt(&mut self.description, &base.description);
        inherit_opt(&mut self.documentation, &base.documentation);
        inherit_opt(&mut self.severity, &base.severity);
        inherit_opt(&mut self.search_path, &base.search_path);
        inherit_opt(&mut self.search_path_prefix, &base.search_path_prefix);
        inherit_opt(&mut self.width, &base.width);
        if self.tags.is_empty() {
            self.tags = base.tags.clone();
        }
        self.source.inherit(&base.source);
    }

    pub fn diff(&self, other: &Control) -> ResourceDiff {
        let mut builder = DiffBuilder::new(&self.full_name, BlockType::Control);
        builder
            .check("title", &self.title, &other.title)
            .check("description", &self.description, &other.description)
            .check("documentation", &self.documentation, &other.documentation)
            .check("severity", &self.severity, &other.severity)
            .check("search_path", &self.search_path, &other.search_path)
            .check(
                "search_path_prefix",
                &self.search_path_prefix,
                &other.search_path_prefix,
            )
            .check("width", &self.width, &other.width)
            .check("tags", &self.tags, &other.tags)
            .check("base", &self.base, &other.base);
        self.source.diff_into(&other.source, &mut builder);
        builder.build()
    }
}

pub(crate) fn inherit_opt<T: Clone>(value: &mut Option<T>, base: &Option<T>) {
    if value.is_none() {
        value.clone_from(base);
    }
}

impl HclResource for Control {
    fn name(&self) -> &str {
        &self.full_name
    }

    fn short_name(&self) -> &str {
        &self.short_name
    }

    fn block_type(&self) -> BlockType {
        BlockType::Control
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

    fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    fn to_value(&self) -> hcl::Value {
        let mut builder = ValueBuilder::new(self);
        builder
            .opt("title", &self.title)
            .opt("description", &self.description)
            .opt("documentation", &self.documentation)
            .opt("severity", &self.severity)
            .opt("width", &self.width)
            .string_map("tags", &self.tags);
        self.source.add_to_value(&mut builder);
        builder.build()
    }
}

impl ModTreeItem for Control {
    fn add_child(&mut self, _child: &str, _child_type: BlockType) -> Result<(), TreeError> {
        Err(TreeError::ChildrenNotSupported {
            name: self.full_name.clone(),
            block_type: BlockType::Control,
        })
    }

    fn add_parent(&mut self, parent: &str) {
        if !self.parents.iter().any(|p| p == parent) {
            self.parents.push(parent.to_string());
        }
    }

    fn parents(&self) -> &[String] {
        &self.parents
    }

    fn children(&self) -> &[String] {
        &[]
    }
}

impl QueryProvider for Control {
    fn query_source(&self) -> &QuerySource {
        &self.source
    }

    fn query_source_mut(&mut self) -> &mut QuerySource {
        &mut self.source
    }
}
