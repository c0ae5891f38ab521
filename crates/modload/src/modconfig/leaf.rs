use super::control::inherit_opt;
use super::diff::{DiffBuilder, ResourceDiff};
use super::query_provider::{QueryProvider, QuerySource};
use super::{BlockType, HclResource, ModTreeItem, ResourceMetadata, TreeError, ValueBuilder};
use crate::diagnostics::SourceRange;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LeafKind {
    #[default]
    Card,
    Chart,
    Counter,
    Hierarchy,
    Image,
    Input,
    Table,
    Text,
}

impl LeafKind {
    pub const ALL: [LeafKind; 8] = [
        LeafKind::Card,
        LeafKind::Chart,
        LeafKind::Counter,
        LeafKind::Hierarchy,
        LeafKind::Image,
        LeafKind::Input,
        LeafKind::Table,
        LeafKind::Text,
    ];

    pub fn block_type(&self) -> BlockType {
        match self {
            LeafKind::Card => BlockType::Card,
            LeafKind::Chart => BlockType::Chart,
            LeafKind::Counter => BlockType::Counter,
            LeafKind::Hierarchy => BlockType::Hierarchy,
            LeafKind::Image => BlockType::Image,
            LeafKind::Input => BlockType::Input,
            LeafKind::Table => BlockType::Table,
            LeafKind::Text => BlockType::Text,
        }
    }

    pub fn from_block_type(block_type: BlockType) -> Option<LeafKind> {
        LeafKind::ALL
            .into_iter()
            .find(|kind| kind.block_type() == block_type)
    }

    /// Text blocks carry markdown instead of a query
    pub fn is_query_provider(&self) -> bool {
        *self != LeafKind::Text
    }

    /// Attributes only this kind of leaf accepts, stored verbatim in [DashboardLeaf::options]
    pub fn option_attributes(&self) -> &'static [&'static str] {
        match self {
            LeafKind::Card => &["label", "value"],
            LeafKind::Chart => &["grouping"],
            LeafKind::Counter => &["style", "value"],
            LeafKind::Hierarchy => &[],
            LeafKind::Image => &["src", "alt"],
            LeafKind::Input => &["label", "placeholder"],
            LeafKind::Table => &[],
            LeafKind::Text => &["value"],
        }
    }
}

/// A leaf node of a dashboard: card, chart, counter, hierarchy, image, input, table or text
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardLeaf {
    pub kind: LeafKind,
    pub short_name: String,
    pub full_name: String,

    pub title: Option<String>,
    pub width: Option<i64>,
    #[serde(rename = "type")]
    pub display_type: Option<String>,
    pub icon: Option<String>,
    pub display: Option<String>,
    pub documentation: Option<String>,
    pub options: BTreeMap<String, hcl::Value>,
    #[serde(flatten)]
    pub source: QuerySource,
    pub base: Option<String>,

    pub parents: Vec<String>,
    #[serde(skip)]
    pub decl_range: SourceRange,
    pub metadata: Option<ResourceMetadata>,
}

impl DashboardLeaf {
    pub fn new(kind: LeafKind, mod_name: &str, short_name: &str, decl_range: SourceRange) -> Self {
        Self {
            kind,
            short_name: short_name.to_string(),
            full_name: format!("{mod_name}.{}.{short_name}", kind.block_type()),
            decl_range,
            ..Default::default()
        }
    }

    pub fn inherit(&mut self, base: &DashboardLeaf) {
        inherit_opt(&mut self.title, &base.title);
        inherit_opt(&mut self.width, &base.width);
        inherit_opt(&mut self.display_type, &base.display_type);
        inherit_opt(&mut self.icon, &base.icon);
        inherit_opt(&mut self.display, &base.display);
        inherit_opt(&mut self.documentation, &base.documentation);
        for (key, value) in &base.options {
            self.options
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        self.source.inherit(&base.source);
    }

    pub fn diff(&self, other: &DashboardLeaf) -> ResourceDiff {
        let mut builder = DiffBuilder::new(&self.full_name, self.kind.block_type());
        builder
            .check("title", &self.title, &other.title)
            .check("width", &self.width, &other.width)
            .check("type", &self.display_type, &other.display_type)
            .check("icon", &self.icon, &other.icon)
            .check("display", &self.display, &other.display)
            .check("documentation", &self.documentation, &other.documentation)
            .check("base", &self.base, &other.base);
        let keys: std::collections::BTreeSet<_> =
            self.options.keys().chain(other.options.keys()).collect();
        for key in keys {
            builder.check(key, &self.options.get(key), &other.options.get(key));
        }
        self.source.diff_into(&other.source, &mut builder);
        builder.build()
    }
}

impl HclResource for DashboardLeaf {
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
        let mut builder = ValueBuilder::new(self);
        builder
            .opt("title", &self.title)
            .opt("width", &self.width)
            .opt("type", &self.display_type)
            .opt("icon", &self.icon)
            .opt("display", &self.display);
        for (key, value) in &self.options {
            builder.set(key, value.clone());
        }
        self.source.add_to_value(&mut builder);
        builder.build()
    }
}

impl ModTreeItem for DashboardLeaf {
    fn add_child(&mut self, _child: &str, _child_type: BlockType) -> Result<(), TreeError> {
        Err(TreeError::ChildrenNotSupported {
            name: self.full_name.clone(),
            block_type: self.kind.block_type(),
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

impl QueryProvider for DashboardLeaf {
    fn query_source(&self) -> &QuerySource {
        &self.source
    }

    fn query_source_mut(&mut self) -> &mut QuerySource {
        &mut self.source
    }
}
