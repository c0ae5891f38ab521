use super::diff::DiffBuilder;
use super::HclResource;
use crate::diagnostics::SourceRange;
use serde::Serialize;
use std::collections::BTreeMap;

/// A `param` block nested in a query provider
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamDef {
    pub name: String,
    /// `<parent full name>.param.<name>`
    pub full_name: String,
    pub description: Option<String>,
    /// default as a canonical Postgres literal
    pub default: Option<String>,
    #[serde(skip)]
    pub decl_range: SourceRange,
}

impl ParamDef {
    pub fn new(name: &str, parent: &str, decl_range: SourceRange) -> Self {
        Self {
            name: name.to_string(),
            full_name: format!("{parent}.param.{name}"),
            description: None,
            default: None,
            decl_range,
        }
    }
}

/// Arguments passed to the query of a query provider, already converted to Postgres literals
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum QueryArgs {
    Named(BTreeMap<String, String>),
    Positional(Vec<String>),
}

impl QueryArgs {
    pub fn is_empty(&self) -> bool {
        match self {
            QueryArgs::Named(args) => args.is_empty(),
            QueryArgs::Positional(args) => args.is_empty(),
        }
    }
}

/// The query-related properties shared by every query provider
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QuerySource {
    pub sql: Option<String>,
    /// fully-qualified name of the referenced query
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<QueryArgs>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<ParamDef>,
}

impl QuerySource {
    pub(crate) fn inherit(&mut self, base: &QuerySource) {
        if self.sql.is_none() && self.query.is_none() {
            self.sql = base.sql.clone();
            self.query = base.query.clone();
        }
        if self.args.is_none() {
            self.args = base.args.clone();
        }
        if self.params.is_empty() {
            self.params = base.params.clone();
        }
    }

    pub(crate) fn diff_into(&self, other: &QuerySource, builder: &mut DiffBuilder) {
        builder.check("sql", &self.sql, &other.sql);
        builder.check("query", &self.query, &other.query);
        builder.check("args", &self.args, &other.args);
        builder.check("params", &self.params, &other.params);
    }

    pub(crate) fn add_to_value(&self, builder: &mut super::ValueBuilder) {
        builder.opt("sql", &self.sql);
        builder.opt("query", &self.query);
    }
}

/// Capability of resources that execute SQL
pub trait QueryProvider: HclResource {
    fn query_source(&self) -> &QuerySource;
    fn query_source_mut(&mut self) -> &mut QuerySource;

    fn sql(&self) -> Option<&str> {
        self.query_source().sql.as_deref()
    }

    fn query(&self) -> Option<&str> {
        self.query_source().query.as_deref()
    }

    fn args(&self) -> Option<&QueryArgs> {
        self.query_source().args.as_ref()
    }

    fn params(&self) -> &[ParamDef] {
        &self.query_source().params
    }

    /// Name of the prepared statement created for this provider
    fn prepared_statement_name(&self) -> String {
        // postgres truncates identifiers to 63 characters
        self.name().replace('.', "_").chars().take(63).collect()
    }
}
