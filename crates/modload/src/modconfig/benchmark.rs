use super::control::inherit_opt;
use super::diff::{DiffBuilder, ResourceDiff};
use super::{BlockType, HclResource, ModTreeItem, ResourceMetadata, TreeError, ValueBuilder};
use crate::diagnostics::SourceRange;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Benchmark {
    pub short_name: String,
    pub full_name: String,

    pub title: Option<String>,
    pub description: Option<String>,
    pub documentation: Option<String>,
    pub display: Option<String>,
    #[serde(rename = "type")]
    pub display_type: Option<String>,
    pub width: Option<i64>,
    pub tags: BTreeMap<String, String>,
    pub base: Option<String>,

    /// children as declared, e.g. `control.c1`
    pub child_names: Vec<String>,
    /// fully-qualified names of the resolved children
    pub children: Vec<String>,
    pub parents: Vec<String>,

    #[serde(skip)]
    pub decl_range: SourceRange,
    pub metadata: Option<ResourceMetadata>,
}

impl Benchmark {
    pub fn new(mod_name: &str, short_name: &str, decl_range: SourceRange) -> Self {
        Self {
            short_name: short_name.to_string(),
            full_name: format!("{mod_name}.benchmark.{short_name}"),
            decl_range,
            ..Default::default()
        }
    }

    pub fn inherit(&mut self, base: &Benchmark) {
        inherit_opt(&mut self.title, &base.title);
        inherit_opt(&mut self.description, &base.description);
        inherit_opt(&mut self.documentation, &base.documentation);
        inherit_opt(&mut self.display, &base.display);
        inherit_opt(&mut self.display_type, &base.display_type);
        inherit_opt(&mut self.width, &base.width);
        if self.tags.is_empty() {
            self.tags = base.tags.clone();
        }
        if self.child_names.is_empty() {
            self.child_names = base.child_names.clone();
            self.children = base.children.clone();
        }
    }

    pub fn diff(&self, other: &Benchmark) -> ResourceDiff {
        DiffBuilder::new(&self.full_name, BlockType::Benchmark)
            .check("title", &self.title, &other.title)
            .check("description", &self.description, &other.description)
            .check("documentation", &self.documentation, &other.documentation)
            .check("display", &self.display, &other.display)
            .check("type", &self.display_type, &other.display_type)
            .check("width", &self.width, &other.width)
            .check("tags", &self.tags, &other.tags)
            .check("base", &self.base, &other.base)
            .children(&self.children, &other.children)
            .build()
    }
}

impl HclResource for Benchmark {
    fn name(&self) -> &str {
        &self.full_name
    }

    fn short_name(&self) -> &str {
        &self.short_name
    }

    fn block_type(&self) -> BlockType {
        BlockType::Benchmark
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
        ValueBuilder::new(self)
            .opt("title", &self.title)
            .opt("description", &self.description)
            .opt("documentation", &self.documentation)
            .opt("width", &self.width)
            .string_map("tags", &self.tags)
            .strings("children", &self.children)
            .build()
    }
}

impl ModTreeItem for Benchmark {
    fn add_child(&mut self, child: &str, child_type: BlockType) -> Result<(), TreeError> {
        if !BlockType::BENCHMARK_CHILDREN.contains(&child_type) {
            return Err(TreeError::IllegalChild {
                parent: self.full_name.clone(),
                child_type,
            });
        }
        if !self.children.iter().any(|c| c == child) {
            self.children.push(child.to_string());
        }
        Ok(())
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
        &self.children
    }
}
