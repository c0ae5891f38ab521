use super::control::inherit_opt;
use super::diff::{DiffBuilder, ResourceDiff};
use super::{BlockType, HclResource, ModTreeItem, ResourceMetadata, TreeError, ValueBuilder};
use crate::diagnostics::SourceRange;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerKind {
    #[default]
    Dashboard,
    Container,
}

impl ContainerKind {
    pub fn block_type(&self) -> BlockType {
        match self {
            ContainerKind::Dashboard => BlockType::Dashboard,
            ContainerKind::Container => BlockType::Container,
        }
    }
}

/// A `dashboard` or a `container` nested in one
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Dashboard {
    pub kind: ContainerKind,
    pub short_name: String,
    pub full_name: String,

    pub title: Option<String>,
    pub description: Option<String>,
    pub documentation: Option<String>,
    pub display: Option<String>,
    pub width: Option<i64>,
    pub tags: BTreeMap<String, String>,
    pub base: Option<String>,

    pub child_names: Vec<String>,
    pub children: Vec<String>,
    /// inputs declared inside the container
    pub inputs: Vec<String>,
    pub parents: Vec<String>,

    #[serde(skip)]
    pub decl_range: SourceRange,
    pub metadata: Option<ResourceMetadata>,
}

impl Dashboard {
    pub fn new(
        kind: ContainerKind,
        mod_name: &str,
        short_name: &str,
        decl_range: SourceRange,
    ) -> Self {
        Self {
            kind,
            short_name: short_name.to_string(),
            full_name: format!("{mod_name}.{}.{short_name}", kind.block_type()),
            decl_range,
            ..Default::default()
        }
    }

    pub fn inherit(&mut self, base: &Dashboard) {
        inherit_opt(&mut self.title, &base.title);
        inherit_opt(&mut self.description, &base.description);
        inherit_opt(&mut self.documentation, &base.documentation);
        inherit_opt(&mut self.display, &base.display);
        inherit_opt(&mut self.width, &base.width);
        if self.tags.is_empty() {
            self.tags = base.tags.clone();
        }
        if self.children.is_empty() {
            self.child_names = base.child_names.clone();
            self.children = base.children.clone();
            self.inputs = base.inputs.clone();
        }
    }

    pub fn diff(&self, other: &Dashboard) -> ResourceDiff {
        DiffBuilder::new(&self.full_name, self.kind.block_type())
            .check("title", &self.title, &other.title)
            .check("description", &self.description, &other.description)
            .check("documentation", &self.documentation, &other.documentation)
            .check("display", &self.display, &other.display)
            .check("width", &self.width, &other.width)
            .check("tags", &self.tags, &other.tags)
            .check("base", &self.base, &other.base)
            .check("inputs", &self.inputs, &other.inputs)
            .children(&self.children, &other.children)
            .build()
    }
}

impl HclResource for Dashboard {
    fn name(&self) -> &str {
        &self.full_name
    }

    fn short_name(&self) -> &str {
        &self.short_name
    }

    fn block_type(&self) -> BlockType {
        self.kind.block_type()
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

impl ModTreeItem for Dashboard {
    fn add_child(&mut self, child: &str, child_type: BlockType) -> Result<(), TreeError> {
        if child_type == BlockType::Input {
            if !self.inputs.iter().any(|c| c == child) {
                self.inputs.push(child.to_string());
            }
            return Ok(());
        }
        if !BlockType::CONTAINER_CHILDREN.contains(&child_type) {
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
