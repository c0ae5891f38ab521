use super::diff::{DiffBuilder, ResourceDiff};
use super::query_provider::{QueryProvider, QuerySource};
use super::{BlockType, HclResource, ResourceMetadata, ValueBuilder};
use crate::diagnostics::SourceRange;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Query {
    pub short_name: String,
    pub full_name: String,

    pub title: Option<String>,
    pub description: Option<String>,
    pub documentation: Option<String>,
    pub search_path: Option<String>,
    pub search_path_prefix: Option<String>,
    pub tags: BTreeMap<String, String>,
    #[serde(flatten)]
    pub source: QuerySource,

    #[serde(skip)]
    pub decl_range: SourceRange,
    pub metadata: Option<ResourceMetadata>,
}

impl Query {
    pub fn new(mod_name: &str, short_name: &str, decl_range: SourceRange) -> Self {
        Self {
            short_name: short_name.to_string(),
            full_name: format!("{mod_name}.query.{short_name}"),
            decl_range,
            ..Default::default()
        }
    }

    /// A query created from a `.sql` file
    pub fn pseudo(mod_name: &str, short_name: &str, sql: String) -> Self {
        let mut query = Self::new(mod_name, short_name, SourceRange::default());
        query.source.sql = Some(sql);
        query
    }

    pub fn diff(&self, other: &Query) -> ResourceDiff {
        let mut builder = DiffBuilder::new(&self.full_name, BlockType::Query);
        builder
            .check("title", &self.title, &other.title)
            .check("description", &self.description, &other.description)
            .check("documentation", &self.documentation, &other.documentation)
            .check("search_path", &self.search_path, &other.search_path)
            .check(
                "search_path_prefix",
                &self.search_path_prefix,
                &other.search_path_prefix,
            )
            .check("tags", &self.tags, &other.tags);
        self.source.diff_into(&other.source, &mut builder);
        builder.build()
    }
}

impl HclResource for Query {
    fn name(&self) -> &str {
        &self.full_name
    }

    fn short_name(&self) -> &str {
        &self.short_name
    }

    fn block_type(&self) -> BlockType {
        BlockType::Query
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
            .string_map("tags", &self.tags);
        self.source.add_to_value(&mut builder);
        builder.build()
    }
}

impl QueryProvider for Query {
    fn query_source(&self) -> &QuerySource {
        &self.source
    }

    fn query_source_mut(&mut self) -> &mut QuerySource {
        &mut self.source
    }
}
