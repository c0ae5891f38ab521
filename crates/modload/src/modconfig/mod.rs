//! Resource model: the typed, decoded form of every block a mod can declare
//!
//! Resources never own each other. Parent/child edges are stored as fully-qualified names and resolved
//! through the typed maps of the owning [Mod], which acts as the arena for the whole tree.
mod benchmark;
mod control;
mod dashboard;
mod diff;
mod leaf;
mod local;
mod metadata;
mod mod_definition;
mod query;
mod query_provider;
pub mod reference;
mod require;
mod variable;
mod walk;

pub use benchmark::Benchmark;
pub use control::Control;
pub use dashboard::{ContainerKind, Dashboard};
pub use diff::{ModDiff, ResourceDiff};
pub use leaf::{DashboardLeaf, LeafKind};
pub use local::Local;
pub use metadata::ResourceMetadata;
pub use mod_definition::{Mod, ModVersion, OpenGraph, DEFAULT_MOD_NAME};
pub use query::Query;
pub use query_provider::{ParamDef, QueryArgs, QueryProvider, QuerySource};
pub use reference::{ReferenceTracker, ResourceReference};
pub use require::{ModVersionConstraint, PluginVersion, Require};
pub use variable::{InputValue, ParsingMode, RawValue, ValueSource, VarType, Variable};

use crate::diagnostics::SourceRange;
use std::fmt::{Display, Formatter};

/// Every block type the decoder knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    Mod,
    Query,
    Control,
    Benchmark,
    Dashboard,
    Container,
    Card,
    Chart,
    Counter,
    Hierarchy,
    Image,
    Input,
    Table,
    Text,
    Variable,
    Locals,
    Param,
    Require,
    LegacyRequire,
    OpenGraph,
}

impl BlockType {
    /// Block types that may appear at the root of a document
    pub const ROOT: [BlockType; 16] = [
        BlockType::Mod,
        BlockType::Query,
        BlockType::Control,
        BlockType::Benchmark,
        BlockType::Dashboard,
        BlockType::Container,
        BlockType::Card,
        BlockType::Chart,
        BlockType::Counter,
        BlockType::Hierarchy,
        BlockType::Image,
        BlockType::Input,
        BlockType::Table,
        BlockType::Text,
        BlockType::Variable,
        BlockType::Locals,
    ];

    /// Block types decoded through the shared query provider path
    pub const QUERY_PROVIDERS: [BlockType; 9] = [
        BlockType::Query,
        BlockType::Control,
        BlockType::Card,
        BlockType::Chart,
        BlockType::Counter,
        BlockType::Hierarchy,
        BlockType::Image,
        BlockType::Input,
        BlockType::Table,
    ];

    /// Children allowed in a benchmark
    pub const BENCHMARK_CHILDREN: [BlockType; 2] = [BlockType::Benchmark, BlockType::Control];

    /// Children allowed in a dashboard or container
    pub const CONTAINER_CHILDREN: [BlockType; 11] = [
        BlockType::Container,
        BlockType::Card,
        BlockType::Chart,
        BlockType::Counter,
        BlockType::Hierarchy,
        BlockType::Image,
        BlockType::Input,
        BlockType::Table,
        BlockType::Text,
        BlockType::Control,
        BlockType::Benchmark,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BlockType::Mod => "mod",
            BlockType::Query => "query",
            BlockType::Control => "control",
            BlockType::Benchmark => "benchmark",
            BlockType::Dashboard => "dashboard",
            BlockType::Container => "container",
            BlockType::Card => "card",
            BlockType::Chart => "chart",
            BlockType::Counter => "counter",
            BlockType::Hierarchy => "hierarchy",
            BlockType::Image => "image",
            BlockType::Input => "input",
            BlockType::Table => "table",
            BlockType::Text => "text",
            BlockType::Variable => "variable",
            BlockType::Locals => "locals",
            BlockType::Param => "param",
            BlockType::Require => "require",
            BlockType::LegacyRequire => "requires",
            BlockType::OpenGraph => "opengraph",
        }
    }

    pub fn parse(value: &str) -> Option<BlockType> {
        Some(match value {
            "mod" => BlockType::Mod,
            "query" => BlockType::Query,
            "control" => BlockType::Control,
            "benchmark" => BlockType::Benchmark,
            "dashboard" => BlockType::Dashboard,
            "container" => BlockType::Container,
            "card" => BlockType::Card,
            "chart" => BlockType::Chart,
            "counter" => BlockType::Counter,
            "hierarchy" => BlockType::Hierarchy,
            "image" => BlockType::Image,
            "input" => BlockType::Input,
            "table" => BlockType::Table,
            "text" => BlockType::Text,
            "variable" => BlockType::Variable,
            "locals" => BlockType::Locals,
            "param" => BlockType::Param,
            "require" => BlockType::Require,
            "requires" => BlockType::LegacyRequire,
            "opengraph" => BlockType::OpenGraph,
            _ => return None,
        })
    }

    /// Namespace used to reference resources of this type in expressions
    ///
    /// Variables are referenced as `var.<name>`, locals as `local.<name>`, everything else by its block type.
    pub fn namespace(&self) -> &'static str {
        match self {
            BlockType::Variable => "var",
            BlockType::Locals => "local",
            other => other.as_str(),
        }
    }

    /// Inverse of [BlockType::namespace] for namespaces that name resources
    pub fn from_namespace(namespace: &str) -> Option<BlockType> {
        match namespace {
            "var" => Some(BlockType::Variable),
            "local" => Some(BlockType::Locals),
            other => BlockType::parse(other).filter(|t| t.is_resource()),
        }
    }

    pub fn is_query_provider(&self) -> bool {
        Self::QUERY_PROVIDERS.contains(self)
    }

    /// Block types that produce named resources
    pub fn is_resource(&self) -> bool {
        !matches!(
            self,
            BlockType::Mod
                | BlockType::Param
                | BlockType::Require
                | BlockType::LegacyRequire
                | BlockType::OpenGraph
        )
    }

    pub fn leaf_kind(&self) -> Option<LeafKind> {
        LeafKind::from_block_type(*self)
    }
}

impl Display for BlockType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Splits a fully-qualified name `<mod>.<namespace>.<short>` into its parts
pub fn parse_full_name(name: &str) -> Option<(&str, BlockType, &str)> {
    let mut parts = name.splitn(3, '.');
    let mod_name = parts.next()?;
    let block_type = BlockType::from_namespace(parts.next()?)?;
    let short_name = parts.next()?;
    Some((mod_name, block_type, short_name))
}

/// A root-to-node path of fully-qualified names
pub type NodePath = Vec<String>;

/// Common behaviour of every decoded resource
pub trait HclResource {
    /// fully-qualified name: `<mod>.<type>.<short name>`
    fn name(&self) -> &str;
    fn short_name(&self) -> &str;
    fn block_type(&self) -> BlockType;
    fn decl_range(&self) -> &SourceRange;
    fn metadata(&self) -> Option<&ResourceMetadata>;
    fn set_metadata(&mut self, metadata: ResourceMetadata);

    /// name without the mod prefix, e.g. `query.my_query`
    fn unqualified_name(&self) -> String {
        format!("{}.{}", self.block_type().namespace(), self.short_name())
    }

    fn title(&self) -> Option<&str> {
        None
    }

    /// The value this resource exposes to expressions of other blocks
    fn to_value(&self) -> hcl::Value;
}

/// A resource that can take part in the mod tree
pub trait ModTreeItem: HclResource {
    /// Records `child` (a fully-qualified name) as the next child.
    /// Resource types that cannot have children return [TreeError::ChildrenNotSupported].
    fn add_child(&mut self, child: &str, child_type: BlockType) -> Result<(), TreeError>;
    fn add_parent(&mut self, parent: &str);
    fn parents(&self) -> &[String];
    fn children(&self) -> &[String];
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("cannot add child to a {block_type} ({name})")]
    ChildrenNotSupported { name: String, block_type: BlockType },
    #[error("{parent} cannot contain a {child_type}")]
    IllegalChild {
        parent: String,
        child_type: BlockType,
    },
    #[error("resource {0} not found")]
    NotFound(String),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("mod defines more than one resource named '{name}'")]
pub struct DuplicateNameError {
    pub name: String,
}

/// An owned, decoded resource
#[derive(Debug, Clone, PartialEq)]
pub enum Resource {
    Query(Query),
    Control(Control),
    Benchmark(Benchmark),
    Dashboard(Dashboard),
    Leaf(DashboardLeaf),
    Variable(Variable),
    Local(Local),
}

impl Resource {
    pub fn as_resource(&self) -> &dyn HclResource {
        match self {
            Resource::Query(r) => r,
            Resource::Control(r) => r,
            Resource::Benchmark(r) => r,
            Resource::Dashboard(r) => r,
            Resource::Leaf(r) => r,
            Resource::Variable(r) => r,
            Resource::Local(r) => r,
        }
    }

    pub fn as_resource_mut(&mut self) -> &mut dyn HclResource {
        match self {
            Resource::Query(r) => r,
            Resource::Control(r) => r,
            Resource::Benchmark(r) => r,
            Resource::Dashboard(r) => r,
            Resource::Leaf(r) => r,
            Resource::Variable(r) => r,
            Resource::Local(r) => r,
        }
    }

    pub fn name(&self) -> &str {
        self.as_resource().name()
    }
}

/// A borrowed resource, as handed out by [Mod::resource] and [Mod::walk_resources]
#[derive(Debug, Clone, Copy)]
pub enum ResourceRef<'a> {
    Query(&'a Query),
    Control(&'a Control),
    Benchmark(&'a Benchmark),
    Dashboard(&'a Dashboard),
    Leaf(&'a DashboardLeaf),
    Variable(&'a Variable),
    Local(&'a Local),
}

impl<'a> ResourceRef<'a> {
    pub fn as_resource(&self) -> &'a dyn HclResource {
        match *self {
            ResourceRef::Query(r) => r,
            ResourceRef::Control(r) => r,
            ResourceRef::Benchmark(r) => r,
            ResourceRef::Dashboard(r) => r,
            ResourceRef::Leaf(r) => r,
            ResourceRef::Variable(r) => r,
            ResourceRef::Local(r) => r,
        }
    }

    pub fn as_tree_item(&self) -> Option<&'a dyn ModTreeItem> {
        match *self {
            ResourceRef::Control(r) => Some(r),
            ResourceRef::Benchmark(r) => Some(r),
            ResourceRef::Dashboard(r) => Some(r),
            ResourceRef::Leaf(r) => Some(r),
            _ => None,
        }
    }

    pub fn name(&self) -> &'a str {
        self.as_resource().name()
    }

    pub fn block_type(&self) -> BlockType {
        self.as_resource().block_type()
    }
}

/// Builds the value map exposed to expressions
#[derive(Default)]
pub(crate) struct ValueBuilder(hcl::value::Map<String, hcl::Value>);

impl ValueBuilder {
    pub fn new(resource: &dyn HclResource) -> Self {
        let mut builder = Self::default();
        builder.set("name", resource.name());
        builder.set("short_name", resource.short_name());
        builder.set("unqualified_name", resource.unqualified_name());
        builder.set("resource_type", resource.block_type().as_str());
        builder
    }

    pub fn set(&mut self, key: &str, value: impl Into<hcl::Value>) -> &mut Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn opt<T: Into<hcl::Value> + Clone>(&mut self, key: &str, value: &Option<T>) -> &mut Self {
        let value = match value {
            Some(value) => value.clone().into(),
            None => hcl::Value::Null,
        };
        self.0.insert(key.to_string(), value);
        self
    }

    pub fn strings(&mut self, key: &str, values: &[String]) -> &mut Self {
        let values = values.iter().cloned().map(hcl::Value::from).collect();
        self.0.insert(key.to_string(), hcl::Value::Array(values));
        self
    }

    pub fn string_map(
        &mut self,
        key: &str,
        values: &std::collections::BTreeMap<String, String>,
    ) -> &mut Self {
        let mut map = hcl::value::Map::new();
        for (k, v) in values {
            map.insert(k.clone(), hcl::Value::from(v.clone()));
        }
        self.0.insert(key.to_string(), hcl::Value::Object(map));
        self
    }

    pub fn build(&mut self) -> hcl::Value {
        hcl::Value::Object(std::mem::take(&mut self.0))
    }
}

/// Treat `None` and `Some` of equal strings consistently when comparing optional properties
pub(crate) fn opt_str(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or_default()
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn block_types_round_trip_through_strings() {
        for block_type in BlockType::ROOT {
            assert_eq!(BlockType::parse(block_type.as_str()), Some(block_type));
        }
    }

    #[test]
    fn full_names_split_into_parts() {
        assert_eq!(
            parse_full_name("m.var.region"),
            Some(("m", BlockType::Variable, "region"))
        );
        assert_eq!(
            parse_full_name("m.control.c1"),
            Some(("m", BlockType::Control, "c1"))
        );
        assert_eq!(parse_full_name("m.unknown.c1"), None);
    }
}
