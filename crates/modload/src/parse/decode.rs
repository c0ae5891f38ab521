//! Decoding of pending blocks into resources
//!
//! Decoding runs in passes until a fixed point is reached. Each pass orders the pending blocks and decodes
//! them one by one against a snapshot of the symbol table. A block that references a name which is not
//! decoded yet is deferred to the next pass, a block with a hard error is dropped. When a pass makes no
//! progress every block still pending is reported with the names it is waiting for.
use super::eval::{EvalError, UnresolvedKind, UnresolvedSymbol};
use super::run_context::{PendingBlock, RunContext};
use super::schema::{require_item_schema, BlockSchema};
use crate::diagnostics::{Diagnostic, Diagnostics, SourceRange};
use crate::hcl_documents::HclDocuments;
use crate::modconfig::{
    parse_full_name, Benchmark, BlockType, ContainerKind, Control, Dashboard, DashboardLeaf,
    HclResource, Local, ModVersionConstraint, OpenGraph, ParamDef, ParsingMode, PluginVersion, Query,
    QuerySource, Require, Resource, ResourceMetadata, ResourceReference, ResourceRef, ValueSource,
    VarType, Variable,
};
use crate::util::{is_valid_identifier, qualify_name, TraversalExt, BAD_IDENTIFIER_DETAIL};
use crate::value::{to_postgres_literal, to_query_args};
use crate::visit::VisitTraversals;
use hcl::eval::Evaluate;
use hcl_edit::repr::Span;
use hcl_edit::structure::{Attribute, Block, Body};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

/// Outcome of decoding one block
#[derive(Debug, Default)]
pub struct DecodeResult {
    pub diags: Diagnostics,
    /// names the block is waiting for
    pub depends: BTreeSet<UnresolvedSymbol>,
}

/// A resource ready to be committed, with everything that is recorded alongside it
#[derive(Debug)]
struct Decoded {
    resource: Resource,
    metadata: ResourceMetadata,
    references: Vec<ResourceReference>,
}

/// Properties of the mod block
#[derive(Debug, Default)]
struct ModProperties {
    title: Option<String>,
    description: Option<String>,
    color: Option<String>,
    documentation: Option<String>,
    icon: Option<String>,
    categories: Option<Vec<String>>,
    tags: Option<BTreeMap<String, String>>,
    require: Option<Require>,
    open_graph: Option<OpenGraph>,
}

impl RunContext {
    /// Decodes `documents` into the current mod
    ///
    /// Problems are collected in [RunContext::diagnostics], decoding continues past failing blocks.
    #[tracing::instrument(skip_all)]
    pub fn decode(&mut self, documents: HclDocuments) {
        self.seed(documents);

        while self.pending_count() > 0 {
            let pass = self.start_pass();
            let before = self.pending_count();

            let order = match self.blocks_to_decode() {
                Ok(order) => order,
                Err(err) => {
                    for cycle in &err.cycles {
                        self.log(
                            Diagnostic::error("Dependency cycle")
                                .with_detail(format!("{} depend on each other", cycle.join(", "))),
                        );
                    }
                    err.order
                }
            };
            self.clear_dependencies();

            let mut progress = false;
            for key in order {
                progress |= self.decode_pending_block(&key);
            }

            tracing::debug!(
                pass,
                decoded = before - self.pending_count(),
                pending = self.pending_count(),
                "decode pass complete"
            );
            if !progress {
                break;
            }
        }

        self.report_unresolved();
    }

    /// Every block still pending at the fixed point is an error
    fn report_unresolved(&mut self) {
        let documents = self.documents();
        let unresolved: Vec<(String, PendingBlock)> = self
            .pending()
            .map(|(key, block)| (key.clone(), block.clone()))
            .collect();

        for (key, pending) in unresolved {
            let (source_index, _, block) = documents.get_block(pending.block_index);
            let range = documents.range(source_index, block.span());
            let failures: Vec<(String, String)> = match self.dependencies(&key) {
                [] => vec![(pending.name.clone(), String::new())],
                deps => deps
                    .iter()
                    .map(|d| {
                        let missing = d
                            .missing
                            .iter()
                            .map(|symbol| {
                                if self.is_cycle_name(&symbol.name) {
                                    format!("{} is part of a dependency cycle", symbol.name)
                                } else {
                                    symbol.to_string()
                                }
                            })
                            .collect::<Vec<_>>();
                        (d.resource_name.clone(), missing.join(", "))
                    })
                    .collect(),
            };
            for (resource_name, missing) in failures {
                self.log(
                    Diagnostic::error(format!("Failed to resolve dependencies for {resource_name}"))
                        .with_detail(missing)
                        .with_subject(range.clone()),
                );
            }
            self.complete_block(&key);
        }
    }

    /// Decodes one pending block, returns whether anything changed
    fn decode_pending_block(&mut self, key: &str) -> bool {
        let Some(pending) = self.pending_block(key).cloned() else {
            return false;
        };
        let documents = self.documents();
        let (source_index, _, block) = documents.get_block(pending.block_index);

        match pending.block_type {
            BlockType::Locals => self.decode_locals(key, &pending, &documents, source_index, block),
            BlockType::Mod => {
                let (result, properties) = {
                    let guard = self.push_decode_block(&pending.name);
                    let mut decoder = BlockDecoder::new(&guard, &documents, source_index);
                    let properties = decoder.decode_mod(block);
                    (decoder.result, properties)
                };
                if self.finish_block(key, &pending, result) {
                    self.apply_mod_properties(properties);
                    self.complete_block(key);
                    return true;
                }
                self.pending_block(key).is_none()
            }
            block_type => {
                let (result, decoded) = {
                    let guard = self.push_decode_block(&pending.name);
                    let mut decoder = BlockDecoder::new(&guard, &documents, source_index);
                    let short_name = block.labels.first().map(|l| l.as_str()).unwrap_or_default();
                    decoder.decode_resource(block_type, short_name, block, false);
                    (decoder.result, decoder.decoded)
                };
                if self.finish_block(key, &pending, result) {
                    for decoded in decoded {
                        self.commit(decoded);
                    }
                    self.complete_block(key);
                    return true;
                }
                self.pending_block(key).is_none()
            }
        }
    }

    /// Records the outcome of a block; `true` if its resources should be committed
    fn finish_block(&mut self, key: &str, pending: &PendingBlock, result: DecodeResult) -> bool {
        let failed = result.diags.has_errors();
        self.diagnostics_extend(result.diags);

        if failed {
            tracing::trace!(key, "block failed");
            self.complete_block(key);
            return false;
        }
        if !result.depends.is_empty() {
            tracing::trace!(key, depends = result.depends.len(), "block deferred");
            self.add_dependencies(key, &pending.name, result.depends);
            return false;
        }
        true
    }

    fn diagnostics_extend(&mut self, diags: Diagnostics) {
        for diagnostic in diags {
            self.log(diagnostic);
        }
    }

    /// Inherits from the base, records references and adds the resource to the mod
    fn commit(&mut self, decoded: Decoded) {
        let Decoded {
            mut resource,
            metadata,
            references,
        } = decoded;

        self.inherit_base(&mut resource);
        for reference in references {
            self.current_mod_mut().references.add(reference);
        }
        resource.as_resource_mut().set_metadata(metadata);

        let range = resource.as_resource().decl_range().clone();
        if let Err(err) = self.add_resource(resource) {
            self.log(
                Diagnostic::error("Duplicate resource")
                    .with_detail(err.to_string())
                    .with_subject(range),
            );
        }
    }

    /// Fills unset properties from the base resource, which is always decoded first
    fn inherit_base(&self, resource: &mut Resource) {
        let m = self.current_mod();
        match resource {
            Resource::Control(control) => {
                let base = control.base.clone();
                if let Some(ResourceRef::Control(base)) = base.and_then(|b| m.resource(&b)) {
                    control.inherit(base);
                }
            }
            Resource::Benchmark(benchmark) => {
                let base = benchmark.base.clone();
                if let Some(ResourceRef::Benchmark(base)) = base.and_then(|b| m.resource(&b)) {
                    benchmark.inherit(base);
                }
            }
            Resource::Dashboard(dashboard) => {
                let base = dashboard.base.clone();
                if let Some(ResourceRef::Dashboard(base)) = base.and_then(|b| m.resource(&b)) {
                    dashboard.inherit(base);
                }
            }
            Resource::Leaf(leaf) => {
                let base = leaf.base.clone();
                if let Some(ResourceRef::Leaf(base)) = base.and_then(|b| m.resource(&b)) {
                    leaf.inherit(base);
                }
            }
            Resource::Query(_) | Resource::Variable(_) | Resource::Local(_) => {}
        }
    }

    fn apply_mod_properties(&mut self, properties: ModProperties) {
        let m = self.current_mod_mut();
        m.title = properties.title;
        m.description = properties.description;
        m.color = properties.color;
        m.documentation = properties.documentation;
        m.icon = properties.icon;
        m.categories = properties.categories.unwrap_or_default();
        m.tags = properties.tags.unwrap_or_default();
        m.require = properties.require;
        m.open_graph = properties.open_graph;
    }

    /// Commits every attribute of a `locals` block that resolves; the block stays pending for the rest
    fn decode_locals(
        &mut self,
        key: &str,
        pending: &PendingBlock,
        documents: &HclDocuments,
        source_index: usize,
        block: &Block,
    ) -> bool {
        let mut progress = false;
        let mut remaining = 0;

        for attribute in block.body.attributes() {
            let name = attribute.key.value().as_str();
            if pending.decoded_attributes.contains(name) {
                continue;
            }

            let (result, value) = {
                let mut decoder = BlockDecoder::new(self, documents, source_index);
                let value = if is_valid_identifier(name) {
                    decoder.evaluate(attribute)
                } else {
                    decoder.error("Invalid local value name", BAD_IDENTIFIER_DETAIL, attribute.span());
                    None
                };
                (decoder.result, value)
            };

            let full_name = format!("{}.local.{name}", self.symbols().mod_name());
            let failed = result.diags.has_errors();
            self.diagnostics_extend(result.diags);
            if !failed && !result.depends.is_empty() {
                remaining += 1;
                self.add_dependencies(key, &full_name, result.depends);
                continue;
            }

            progress = true;
            if let Some(block) = self.pending_block_mut(key) {
                block.decoded_attributes.insert(name.to_string());
            }
            let Some(value) = value else {
                continue;
            };

            let range = documents.range(source_index, attribute.span());
            let mut local = Local::new(self.symbols().mod_name(), name, value, range.clone());
            local.metadata = Some(resource_metadata(
                self,
                documents,
                source_index,
                &full_name,
                attribute.span(),
                false,
            ));
            tracing::trace!(name = full_name, "local decoded");
            if let Err(err) = self.add_resource(Resource::Local(local)) {
                self.log(
                    Diagnostic::error("Duplicate local value")
                        .with_detail(err.to_string())
                        .with_subject(range),
                );
            }
        }

        if remaining == 0 {
            self.complete_block(key);
            progress = true;
        }
        progress
    }
}

fn resource_metadata(
    ctx: &RunContext,
    documents: &HclDocuments,
    source_index: usize,
    resource_name: &str,
    span: Option<Range<usize>>,
    anonymous: bool,
) -> ResourceMetadata {
    let range = documents.range(source_index, span.clone());
    ResourceMetadata {
        resource_name: resource_name.to_string(),
        file_name: range.file,
        start_line_number: range.start.line,
        end_line_number: range.end.line,
        is_auto_generated: false,
        source_definition: documents
            .text(source_index, span)
            .unwrap_or_default()
            .to_string(),
        mod_name: ctx.current_mod().short_name.clone(),
        mod_full_name: ctx.current_mod().full_name.clone(),
        anonymous,
    }
}

fn get_attribute<'b>(body: &'b Body, name: &str) -> Option<&'b Attribute> {
    body.attributes().find(|a| a.key.value().as_str() == name)
}

/// Name of the resource an evaluated reference points at: its `name` property, or a `type.name` string
fn resource_name(mod_name: &str, value: &hcl::Value) -> Option<String> {
    match value {
        hcl::Value::Object(map) => match map.get("name") {
            Some(hcl::Value::String(name)) => Some(name.clone()),
            _ => None,
        },
        hcl::Value::String(name) => qualify_name(mod_name, name).map(|r| r.full_name),
        _ => None,
    }
}

/// Decodes one root block and the blocks nested in it
///
/// The decoder only reads the [RunContext]. Resources are collected in [BlockDecoder::decoded] and
/// committed by the caller once the whole block succeeded.
struct BlockDecoder<'a> {
    run: &'a RunContext,
    documents: &'a HclDocuments,
    source_index: usize,
    eval_ctx: hcl::eval::Context<'static>,
    result: DecodeResult,
    decoded: Vec<Decoded>,
}

impl<'a> BlockDecoder<'a> {
    fn new(run: &'a RunContext, documents: &'a HclDocuments, source_index: usize) -> Self {
        Self {
            run,
            documents,
            source_index,
            eval_ctx: run.symbols().eval_context(),
            result: DecodeResult::default(),
            decoded: vec![],
        }
    }

    fn mod_name(&self) -> &'a str {
        self.run.symbols().mod_name()
    }

    fn range(&self, span: Option<Range<usize>>) -> SourceRange {
        self.documents.range(self.source_index, span)
    }

    fn error(&mut self, summary: impl Into<String>, detail: impl Into<String>, span: Option<Range<usize>>) {
        let diagnostic = Diagnostic::error(summary)
            .with_detail(detail)
            .with_subject(self.range(span));
        self.result.diags.log(diagnostic);
    }

    /// Rejects attributes and nested blocks `schema` does not allow
    fn check_schema(&mut self, schema: &BlockSchema, body: &Body) {
        for attribute in body.attributes() {
            let key = attribute.key.value().as_str();
            if !schema.allows_attribute(key) {
                self.error(
                    "Unsupported argument",
                    format!("An argument named \"{key}\" is not expected here."),
                    attribute.span(),
                );
            }
        }
        for block in body.blocks() {
            let ident = block.ident.value().as_str();
            if !BlockType::parse(ident).is_some_and(|t| schema.allows_block(t)) {
                self.error(
                    "Unsupported block type",
                    format!("Blocks of type \"{ident}\" are not expected here."),
                    block.span(),
                );
            }
        }
    }

    fn evaluate(&mut self, attribute: &Attribute) -> Option<hcl::Value> {
        let expr = hcl::Expression::from(attribute.value.clone());
        match self.run.symbols().evaluate(&expr, &self.eval_ctx) {
            Ok(value) => Some(value),
            Err(EvalError::Unresolved(symbols)) => {
                self.result.depends.extend(symbols);
                None
            }
            Err(EvalError::Invalid(err)) => {
                self.error("Invalid expression", err.to_string(), attribute.span());
                None
            }
        }
    }

    fn type_error(&mut self, attribute: &Attribute, expected: &str) {
        self.error(
            "Incorrect attribute value type",
            format!(
                "Inappropriate value for attribute \"{}\": {expected} required.",
                attribute.key.value()
            ),
            attribute.span(),
        );
    }

    fn string(&mut self, body: &Body, name: &str) -> Option<String> {
        let attribute = get_attribute(body, name)?;
        match self.evaluate(attribute)? {
            hcl::Value::Null => None,
            hcl::Value::String(s) => Some(s),
            hcl::Value::Number(n) => Some(n.to_string()),
            hcl::Value::Bool(b) => Some(b.to_string()),
            _ => {
                self.type_error(attribute, "string");
                None
            }
        }
    }

    fn integer(&mut self, body: &Body, name: &str) -> Option<i64> {
        let attribute = get_attribute(body, name)?;
        let value = match self.evaluate(attribute)? {
            hcl::Value::Null => return None,
            hcl::Value::Number(n) => n.as_i64(),
            hcl::Value::String(s) => s.parse().ok(),
            _ => None,
        };
        if value.is_none() {
            self.type_error(attribute, "whole number");
        }
        value
    }

    fn string_list(&mut self, body: &Body, name: &str) -> Option<Vec<String>> {
        let attribute = get_attribute(body, name)?;
        match self.evaluate(attribute)? {
            hcl::Value::Null => None,
            hcl::Value::Array(items) => {
                let mut strings = vec![];
                for item in items {
                    match item {
                        hcl::Value::String(s) => strings.push(s),
                        _ => {
                            self.type_error(attribute, "list of string");
                            return None;
                        }
                    }
                }
                Some(strings)
            }
            _ => {
                self.type_error(attribute, "list of string");
                None
            }
        }
    }

    fn string_map(&mut self, body: &Body, name: &str) -> Option<BTreeMap<String, String>> {
        let attribute = get_attribute(body, name)?;
        match self.evaluate(attribute)? {
            hcl::Value::Null => None,
            hcl::Value::Object(map) => {
                let mut strings = BTreeMap::new();
                for (key, value) in map {
                    match value {
                        hcl::Value::String(s) => {
                            strings.insert(key, s);
                        }
                        _ => {
                            self.type_error(attribute, "map of string");
                            return None;
                        }
                    }
                }
                Some(strings)
            }
            _ => {
                self.type_error(attribute, "map of string");
                None
            }
        }
    }

    fn metadata(&self, resource_name: &str, block: &Block, anonymous: bool) -> ResourceMetadata {
        resource_metadata(
            self.run,
            self.documents,
            self.source_index,
            resource_name,
            block.span(),
            anonymous,
        )
    }

    /// References made by the attributes of `body` and its `param` blocks
    fn references(&self, from: &str, body: &Body) -> Vec<ResourceReference> {
        let mut references = vec![];
        let mut attributes: Vec<&Attribute> = body.attributes().collect();
        for param in body
            .blocks()
            .filter(|b| b.ident.value().as_str() == BlockType::Param.as_str())
        {
            attributes.extend(param.body.attributes());
        }

        for attribute in attributes {
            let range = self.range(attribute.span());
            let mut add = |to: String| {
                let reference = ResourceReference {
                    from: from.to_string(),
                    to,
                    range: range.clone(),
                };
                if !references.contains(&reference) {
                    references.push(reference);
                }
            };

            let expr = hcl::Expression::from(attribute.value.clone());
            expr.visit_traversals(&mut |traversal: &hcl::Traversal| {
                if let Some(reference) = traversal.named_reference(self.mod_name()) {
                    add(reference.full_name);
                }
            });
            // children may also be named by strings
            let key = attribute.key.value().as_str();
            if let ("children", hcl::Expression::Array(items)) = (key, &expr) {
                for item in items {
                    if let hcl::Expression::String(name) = item {
                        if let Some(reference) = qualify_name(self.mod_name(), name) {
                            add(reference.full_name);
                        }
                    }
                }
            }
        }
        references
    }

    fn push(&mut self, resource: Resource, block: &Block, anonymous: bool) {
        let name = resource.name().to_string();
        let metadata = self.metadata(&name, block, anonymous);
        let references = self.references(&name, &block.body);
        self.decoded.push(Decoded {
            resource,
            metadata,
            references,
        });
    }

    /// Decodes a resource block and, for dashboards and containers, the blocks nested in it
    fn decode_resource(&mut self, block_type: BlockType, short_name: &str, block: &Block, anonymous: bool) {
        if !anonymous && !is_valid_identifier(short_name) {
            self.error("Invalid name", BAD_IDENTIFIER_DETAIL, block.span());
            return;
        }
        if block.labels.len() > 1 {
            self.error(
                format!("Extraneous label for {block_type}"),
                format!("Only 1 labels (name) are expected for {block_type} blocks."),
                block.span(),
            );
            return;
        }
        self.check_schema(&BlockSchema::for_block_type(block_type), &block.body);

        let range = self.range(block.span());
        let mod_name = self.mod_name();
        let resource = match block_type {
            BlockType::Query => {
                let mut query = Query::new(mod_name, short_name, range);
                self.decode_query(&mut query, block);
                Resource::Query(query)
            }
            BlockType::Control => {
                let mut control = Control::new(mod_name, short_name, range);
                self.decode_control(&mut control, block);
                Resource::Control(control)
            }
            BlockType::Benchmark => {
                let mut benchmark = Benchmark::new(mod_name, short_name, range);
                self.decode_benchmark(&mut benchmark, block);
                Resource::Benchmark(benchmark)
            }
            BlockType::Dashboard | BlockType::Container => {
                let kind = if block_type == BlockType::Dashboard {
                    ContainerKind::Dashboard
                } else {
                    ContainerKind::Container
                };
                let mut dashboard = Dashboard::new(kind, mod_name, short_name, range);
                self.decode_dashboard(&mut dashboard, block);
                Resource::Dashboard(dashboard)
            }
            BlockType::Variable => {
                let mut variable = Variable::new(mod_name, short_name, range);
                self.decode_variable(&mut variable, block);
                Resource::Variable(variable)
            }
            other => {
                let Some(kind) = other.leaf_kind() else {
                    self.error(
                        "Unsupported block type",
                        format!("Blocks of type \"{other}\" are not expected here."),
                        block.span(),
                    );
                    return;
                };
                let mut leaf = DashboardLeaf::new(kind, mod_name, short_name, range);
                self.decode_leaf(&mut leaf, block);
                Resource::Leaf(leaf)
            }
        };

        tracing::trace!(name = resource.name(), anonymous, "resource decoded");
        self.push(resource, block, anonymous);
    }

    fn decode_query(&mut self, query: &mut Query, block: &Block) {
        let body = &block.body;
        query.title = self.string(body, "title");
        query.description = self.string(body, "description");
        query.documentation = self.string(body, "documentation");
        query.search_path = self.string(body, "search_path");
        query.search_path_prefix = self.string(body, "search_path_prefix");
        query.tags = self.string_map(body, "tags").unwrap_or_default();
        self.decode_query_source(&query.full_name, body, &mut query.source);

        if get_attribute(body, "sql").is_none() {
            self.error(
                "Missing required argument",
                "The argument \"sql\" is required, but no definition was found.",
                block.span(),
            );
        }
    }

    fn decode_control(&mut self, control: &mut Control, block: &Block) {
        let body = &block.body;
        control.title = self.string(body, "title");
        control.description = self.string(body, "description");
        control.documentation = self.string(body, "documentation");
        control.severity = self.string(body, "severity");
        control.search_path = self.string(body, "search_path");
        control.search_path_prefix = self.string(body, "search_path_prefix");
        control.width = self.integer(body, "width");
        control.tags = self.string_map(body, "tags").unwrap_or_default();
        control.base = self.decode_base(BlockType::Control, body);
        self.decode_query_source(&control.full_name, body, &mut control.source);

        let has_query = get_attribute(body, "sql").is_some() || get_attribute(body, "query").is_some();
        if !has_query && get_attribute(body, "base").is_none() {
            self.error(
                "Missing required argument",
                format!(
                    "{} must define either a 'sql' property or a 'query' property",
                    control.full_name
                ),
                block.span(),
            );
        }
    }

    fn decode_benchmark(&mut self, benchmark: &mut Benchmark, block: &Block) {
        let body = &block.body;
        benchmark.title = self.string(body, "title");
        benchmark.description = self.string(body, "description");
        benchmark.documentation = self.string(body, "documentation");
        benchmark.display = self.string(body, "display");
        benchmark.display_type = self.string(body, "type");
        benchmark.width = self.integer(body, "width");
        benchmark.tags = self.string_map(body, "tags").unwrap_or_default();
        benchmark.base = self.decode_base(BlockType::Benchmark, body);
        let (child_names, children) =
            self.decode_children(&benchmark.full_name, BlockType::Benchmark, body, &BTreeSet::new());
        benchmark.child_names = child_names;
        benchmark.children = children;
    }

    fn decode_dashboard(&mut self, dashboard: &mut Dashboard, block: &Block) {
        let body = &block.body;
        dashboard.title = self.string(body, "title");
        dashboard.description = self.string(body, "description");
        dashboard.documentation = self.string(body, "documentation");
        dashboard.display = self.string(body, "display");
        dashboard.width = self.integer(body, "width");
        dashboard.tags = self.string_map(body, "tags").unwrap_or_default();
        dashboard.base = self.decode_base(dashboard.kind.block_type(), body);

        let nested = RunContext::nested_resources(dashboard.kind.block_type(), &dashboard.short_name, body);
        let declared_here: BTreeSet<String> = nested
            .iter()
            .map(|n| format!("{}.{}.{}", self.mod_name(), n.block_type, n.short_name))
            .collect();

        let (child_names, children) = self.decode_children(
            &dashboard.full_name,
            dashboard.kind.block_type(),
            body,
            &declared_here,
        );
        dashboard.child_names = child_names;
        dashboard.children = children;

        for nested in nested {
            let name = format!("{}.{}.{}", self.mod_name(), nested.block_type, nested.short_name);
            if nested.block_type == BlockType::Input {
                dashboard.inputs.push(name);
            } else if !dashboard.children.contains(&name) {
                dashboard.children.push(name);
            }
            self.decode_resource(nested.block_type, &nested.short_name, nested.block, nested.anonymous);
        }
    }

    fn decode_leaf(&mut self, leaf: &mut DashboardLeaf, block: &Block) {
        let body = &block.body;
        leaf.title = self.string(body, "title");
        leaf.width = self.integer(body, "width");
        leaf.display_type = self.string(body, "type");
        leaf.icon = self.string(body, "icon");
        leaf.display = self.string(body, "display");
        leaf.documentation = self.string(body, "documentation");
        leaf.base = self.decode_base(leaf.kind.block_type(), body);

        for option in leaf.kind.option_attributes() {
            if let Some(value) = get_attribute(body, option).and_then(|a| self.evaluate(a)) {
                leaf.options.insert(option.to_string(), value);
            }
        }

        if leaf.kind.is_query_provider() {
            self.decode_query_source(&leaf.full_name, body, &mut leaf.source);
        }
    }

    /// The `sql`, `query`, `args` and `param` part shared by every query provider
    fn decode_query_source(&mut self, name: &str, body: &Body, source: &mut QuerySource) {
        let sql = get_attribute(body, "sql");
        let query = get_attribute(body, "query");
        if let (Some(_), Some(query)) = (sql, query) {
            self.error(
                format!("{name} has both 'SQL' and 'query' property set - only 1 of these may be set"),
                "remove either the 'sql' or the 'query' property",
                query.span(),
            );
            return;
        }

        if sql.is_some() {
            source.sql = self.string(body, "sql");
        }
        if let Some(query) = query {
            source.query = self.query_reference(query);
        }

        let params: Vec<&Block> = body
            .blocks()
            .filter(|b| b.ident.value().as_str() == BlockType::Param.as_str())
            .collect();
        if let (Some(query), false) = (query, params.is_empty()) {
            self.error(
                format!("{name} has 'query' property set so cannot define param blocks"),
                "parameters of a referenced query are passed with 'args'",
                query.span(),
            );
        }

        if let Some(args) = get_attribute(body, "args") {
            if !params.is_empty() {
                self.error(
                    format!("{name} has param blocks so cannot define 'args'"),
                    "'args' pass values to the parameters of a referenced query",
                    args.span(),
                );
            } else if let Some(value) = self.evaluate(args) {
                match to_query_args(&value) {
                    Ok(query_args) => source.args = Some(query_args),
                    Err(err) => self.error(
                        "Invalid args",
                        format!("'params' property must be either a map or an array: {err}"),
                        args.span(),
                    ),
                }
            }
        }

        for param in params {
            if let Some(param) = self.decode_param(name, param) {
                source.params.push(param);
            }
        }
    }

    fn query_reference(&mut self, attribute: &Attribute) -> Option<String> {
        let value = self.evaluate(attribute)?;
        match resource_name(self.mod_name(), &value) {
            Some(name) if parse_full_name(&name).is_some_and(|(_, t, _)| t == BlockType::Query) => {
                Some(name)
            }
            _ => {
                self.error(
                    "Invalid query reference",
                    "'query' must reference a query resource, e.g. query.my_query",
                    attribute.span(),
                );
                None
            }
        }
    }

    fn decode_param(&mut self, parent: &str, block: &Block) -> Option<ParamDef> {
        let owner = self.run.current_decode_block().unwrap_or(parent);
        let [label] = block.labels.as_slice() else {
            self.error(
                "Missing name for param",
                format!("param blocks in {owner} must have 1 labels (name)."),
                block.span(),
            );
            return None;
        };
        let name = label.as_str();
        if !is_valid_identifier(name) {
            self.error(
                "Invalid name",
                format!("{BAD_IDENTIFIER_DETAIL} (param in {owner})"),
                block.span(),
            );
            return None;
        }
        self.check_schema(&BlockSchema::for_block_type(BlockType::Param), &block.body);

        let mut param = ParamDef::new(name, parent, self.range(block.span()));
        param.description = self.string(&block.body, "description");
        if let Some(default) = get_attribute(&block.body, "default") {
            if let Some(value) = self.evaluate(default) {
                match to_postgres_literal(&value) {
                    Ok(literal) => param.default = Some(literal),
                    Err(err) => self.error(
                        "Invalid param default",
                        format!("{err} (param {name} in {owner})"),
                        default.span(),
                    ),
                }
            }
        }
        Some(param)
    }

    /// Resolves `base` to the full name of a resource of the same type
    fn decode_base(&mut self, block_type: BlockType, body: &Body) -> Option<String> {
        let attribute = get_attribute(body, "base")?;
        let value = self.evaluate(attribute)?;
        match resource_name(self.mod_name(), &value) {
            Some(name) if parse_full_name(&name).is_some_and(|(_, t, _)| t == block_type) => Some(name),
            _ => {
                self.error(
                    "Invalid base",
                    format!("the base of a {block_type} must be a {block_type}"),
                    attribute.span(),
                );
                None
            }
        }
    }

    /// Returns the children as declared (`type.name`) and as fully-qualified names
    ///
    /// `declared_here` are names declared by blocks nested in the parent, they are committed with it.
    fn decode_children(
        &mut self,
        parent: &str,
        parent_type: BlockType,
        body: &Body,
        declared_here: &BTreeSet<String>,
    ) -> (Vec<String>, Vec<String>) {
        let Some(attribute) = get_attribute(body, "children") else {
            return (vec![], vec![]);
        };
        let allowed: &[BlockType] = if parent_type == BlockType::Benchmark {
            &BlockType::BENCHMARK_CHILDREN
        } else {
            &BlockType::CONTAINER_CHILDREN
        };

        let items = match hcl::Expression::from(attribute.value.clone()) {
            hcl::Expression::Array(items) => items,
            _ => {
                self.type_error(attribute, "list of resources");
                return (vec![], vec![]);
            }
        };

        let mut child_names = vec![];
        let mut children = vec![];
        for item in items {
            let name = match &item {
                hcl::Expression::String(name) => Some(name.clone()),
                hcl::Expression::Traversal(traversal) => traversal
                    .named_reference(self.mod_name())
                    .map(|r| format!("{}.{}", r.block_type.namespace(), r.short_name)),
                other => {
                    let value = self.run.symbols().evaluate(other, &self.eval_ctx);
                    match value {
                        Ok(value) => resource_name(self.mod_name(), &value),
                        Err(EvalError::Unresolved(symbols)) => {
                            self.result.depends.extend(symbols);
                            continue;
                        }
                        Err(EvalError::Invalid(err)) => {
                            self.error("Invalid expression", err.to_string(), attribute.span());
                            continue;
                        }
                    }
                }
            };

            let Some(reference) = name.as_deref().and_then(|n| qualify_name(self.mod_name(), n)) else {
                self.error(
                    "Invalid child",
                    format!(
                        "{parent}: children must be resource names such as control.my_control, got '{}'",
                        name.unwrap_or_default()
                    ),
                    attribute.span(),
                );
                continue;
            };

            if !allowed.contains(&reference.block_type) {
                self.error(
                    "Invalid child",
                    format!(
                        "{parent_type} {parent} cannot have children of type {}",
                        reference.block_type
                    ),
                    attribute.span(),
                );
                continue;
            }

            let full_name = reference.full_name;
            if !declared_here.contains(&full_name) && !self.run.current_mod().contains(&full_name) {
                if self.run.is_pending_name(&full_name) {
                    let kind = if self.run.symbols().has_namespace(reference.block_type) {
                        UnresolvedKind::UnsupportedAttribute
                    } else {
                        UnresolvedKind::UnknownVariable
                    };
                    self.result.depends.insert(UnresolvedSymbol {
                        name: full_name.clone(),
                        kind,
                    });
                } else {
                    self.error(
                        "Unknown child",
                        format!("{parent}: no resource named {full_name} is declared"),
                        attribute.span(),
                    );
                    continue;
                }
            }

            child_names.push(format!(
                "{}.{}",
                reference.block_type.namespace(),
                reference.short_name
            ));
            children.push(full_name);
        }

        (child_names, children)
    }

    fn decode_variable(&mut self, variable: &mut Variable, block: &Block) {
        let body = &block.body;
        if let Some(type_attribute) = get_attribute(body, "type") {
            let text = self.documents.text(self.source_index, type_attribute.value.span());
            match text.map(str::parse::<VarType>) {
                Some(Ok(var_type)) => variable.var_type = var_type,
                Some(Err(err)) => self.error("Invalid type specification", err, type_attribute.span()),
                None => self.error(
                    "Invalid type specification",
                    "type constraint source not available",
                    type_attribute.span(),
                ),
            }
        }
        variable.parsing_mode = ParsingMode::for_type(&variable.var_type);
        variable.description = self.string(body, "description");

        if let Some(default) = get_attribute(body, "default") {
            let expr = hcl::Expression::from(default.value.clone());
            match expr.evaluate(&hcl::eval::Context::new()) {
                Ok(value) => match variable.var_type.convert(value) {
                    Ok(value) => variable.default = Some(value),
                    Err(err) => self.error("Invalid default value for variable", err, default.span()),
                },
                Err(err) => self.error(
                    "Invalid default value for variable",
                    format!("defaults may not reference other values: {err}"),
                    default.span(),
                ),
            }
        }

        let input = self.run.options().input_variables.get(&variable.short_name);
        if let Some(input) = input {
            let value = input
                .resolve(variable.parsing_mode)
                .and_then(|value| variable.var_type.convert(value));
            match value {
                Ok(value) => variable.set_input_value(value, input.source.clone()),
                Err(err) => self.error(
                    "Invalid value for variable",
                    format!("{}: {err}", variable.short_name),
                    block.span(),
                ),
            }
        } else if let Some(default) = variable.default.clone() {
            variable.set_input_value(default, ValueSource::Default);
        } else {
            self.error(
                "No value for required variable",
                format!(
                    "The input variable \"{}\" is not set, and has no default value.",
                    variable.short_name
                ),
                block.span(),
            );
        }
    }

    fn decode_mod(&mut self, block: &Block) -> ModProperties {
        let body = &block.body;
        self.check_schema(&BlockSchema::for_block_type(BlockType::Mod), body);

        let mut properties = ModProperties {
            title: self.string(body, "title"),
            description: self.string(body, "description"),
            color: self.string(body, "color"),
            documentation: self.string(body, "documentation"),
            icon: self.string(body, "icon"),
            categories: self.string_list(body, "categories"),
            tags: self.string_map(body, "tags"),
            ..Default::default()
        };

        let mut require_blocks = body.blocks().filter(|b| {
            matches!(
                BlockType::parse(b.ident.value().as_str()),
                Some(BlockType::Require | BlockType::LegacyRequire)
            )
        });
        if let Some(require) = require_blocks.next() {
            properties.require = Some(self.decode_require(require));
        }
        for duplicate in require_blocks {
            self.error(
                "Duplicate require block",
                "a mod may only declare one 'require' block, legacy 'requires' included",
                duplicate.span(),
            );
        }

        if let Some(open_graph) = body
            .blocks()
            .find(|b| b.ident.value().as_str() == BlockType::OpenGraph.as_str())
        {
            self.check_schema(&BlockSchema::for_block_type(BlockType::OpenGraph), &open_graph.body);
            properties.open_graph = Some(OpenGraph {
                title: self.string(&open_graph.body, "title"),
                description: self.string(&open_graph.body, "description"),
                image: self.string(&open_graph.body, "image"),
            });
        }

        properties
    }

    fn decode_require(&mut self, block: &Block) -> Require {
        let body = &block.body;
        self.check_schema(&BlockSchema::for_block_type(BlockType::Require), body);

        let mut require = Require {
            steampipe: self.string(body, "steampipe"),
            decl_range: self.range(block.span()),
            ..Default::default()
        };

        for plugin in self.string_list(body, "plugins").unwrap_or_default() {
            let (name, version) = match plugin.split_once('@') {
                Some((name, version)) => (name.to_string(), Some(version.to_string())),
                None => (plugin, None),
            };
            require.plugins.push(PluginVersion { name, version });
        }

        let schema = require_item_schema();
        for item in body
            .blocks()
            .filter(|b| b.ident.value().as_str() == BlockType::Mod.as_str())
        {
            self.check_schema(&schema, &item.body);
            let [label] = item.labels.as_slice() else {
                self.error(
                    "Missing name for mod",
                    "mod requirements must have 1 labels (the mod path).",
                    item.span(),
                );
                continue;
            };
            let Some(version) = self.string(&item.body, "version") else {
                self.error(
                    "Missing required argument",
                    "The argument \"version\" is required, but no definition was found.",
                    item.span(),
                );
                continue;
            };
            require.mods.push(ModVersionConstraint {
                name: label.as_str().to_string(),
                version,
                decl_range: self.range(item.span()),
            });
        }

        require
    }
}
