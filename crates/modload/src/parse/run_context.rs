//! Per-load decode state
//!
//! A [RunContext] lives for exactly one load of a mod. It owns
//! - the documents being decoded and the blocks still waiting to be decoded
//! - the [SymbolTable] every block is evaluated against
//! - the dependencies that held back a block during the current pass
//!
//! Blocks are keyed by the fully-qualified name of the resource they declare (`locals#<index>` for `locals`
//! blocks, which declare many). Nothing in here outlives the load except the [Mod] it builds.
use super::eval::{SymbolTable, UnresolvedSymbol};
use super::ordering::{DependencyGraph, OrderingError};
use super::schema::{BlockSchema, LabelRule};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::hcl_documents::HclDocuments;
use crate::listing::ListOptions;
use crate::modconfig::{
    BlockType, DuplicateNameError, InputValue, Mod, Resource, DEFAULT_MOD_NAME,
};
use crate::util::{is_valid_identifier, qualify_name, TraversalExt, BAD_IDENTIFIER_DETAIL};
use crate::workspace_lock::WorkspaceLock;
use hcl_edit::repr::Span;
use hcl_edit::structure::{Block, Body};
use indexmap::IndexMap;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, derive_new::new)]
pub struct RunContextOptions {
    /// root directory of the mod
    pub root: PathBuf,
    pub list_options: ListOptions,
    /// turn `.sql` files into query resources
    #[new(value = "true")]
    pub create_pseudo_resources: bool,
    /// values for variables, keyed by short name
    #[new(default)]
    pub input_variables: BTreeMap<String, InputValue>,
    #[new(default)]
    pub workspace_lock: WorkspaceLock,
}

/// A root block that has not been decoded (completely) yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingBlock {
    /// index into [HclDocuments::blocks]
    pub block_index: usize,
    pub block_type: BlockType,
    /// fully-qualified name of the declared resource, empty for `locals`
    pub name: String,
    /// attributes of a `locals` block that were already committed
    pub decoded_attributes: BTreeSet<String>,
}

/// What held back a block in the current pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dependencies {
    /// the resource being decoded, synthetic for anonymous blocks
    pub resource_name: String,
    pub missing: BTreeSet<UnresolvedSymbol>,
}

/// A resource declared by a block nested in a dashboard or container
#[derive(Debug, Clone)]
pub(crate) struct NestedBlock<'b> {
    pub block_type: BlockType,
    pub short_name: String,
    pub anonymous: bool,
    pub block: &'b Block,
}

#[derive(Debug)]
pub struct RunContext {
    options: RunContextOptions,
    documents: Arc<HclDocuments>,
    current_mod: Mod,
    symbols: SymbolTable,

    pending: IndexMap<String, PendingBlock>,
    /// explicit dependencies (`children`, `base`) per block key, as fully-qualified names
    hints: BTreeMap<String, BTreeSet<String>>,
    /// which block key declares a fully-qualified name
    provided_by: BTreeMap<String, String>,
    /// per block key, one entry per resource of the block that could not be decoded
    wait_list: BTreeMap<String, Vec<Dependencies>>,
    /// block keys dropped as members of a dependency cycle
    in_cycle: BTreeSet<String>,

    decode_stack: Vec<String>,
    diagnostics: Diagnostics,
    passes: usize,
}

impl RunContext {
    pub fn new(options: RunContextOptions) -> Self {
        Self {
            current_mod: Mod::default_mod(&options.root),
            symbols: SymbolTable::new(DEFAULT_MOD_NAME),
            options,
            documents: Arc::default(),
            pending: IndexMap::new(),
            hints: BTreeMap::new(),
            provided_by: BTreeMap::new(),
            wait_list: BTreeMap::new(),
            in_cycle: BTreeSet::new(),
            decode_stack: vec![],
            diagnostics: Diagnostics::default(),
            passes: 0,
        }
    }

    pub fn options(&self) -> &RunContextOptions {
        &self.options
    }

    pub(crate) fn documents(&self) -> Arc<HclDocuments> {
        Arc::clone(&self.documents)
    }

    pub fn current_mod(&self) -> &Mod {
        &self.current_mod
    }

    pub(crate) fn current_mod_mut(&mut self) -> &mut Mod {
        &mut self.current_mod
    }

    /// Moves the mod out, leaving a fresh default mod behind
    pub(crate) fn take_mod(&mut self) -> Mod {
        std::mem::replace(&mut self.current_mod, Mod::default_mod(&self.options.root))
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn log(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.log(diagnostic);
    }

    /// Number of decode passes run so far
    pub fn passes(&self) -> usize {
        self.passes
    }

    pub(crate) fn start_pass(&mut self) -> usize {
        self.passes += 1;
        self.passes
    }

    pub fn pending(&self) -> impl Iterator<Item = (&String, &PendingBlock)> {
        self.pending.iter()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn pending_block(&self, key: &str) -> Option<&PendingBlock> {
        self.pending.get(key)
    }

    pub(crate) fn pending_block_mut(&mut self, key: &str) -> Option<&mut PendingBlock> {
        self.pending.get_mut(key)
    }

    /// Removes a block from the pending set, whether it succeeded or failed for good
    pub(crate) fn complete_block(&mut self, key: &str) {
        self.pending.shift_remove(key);
    }

    /// Whether `name` is declared by a block that is still pending
    pub(crate) fn is_pending_name(&self, name: &str) -> bool {
        self.provided_by
            .get(name)
            .is_some_and(|key| self.pending.contains_key(key))
    }

    /// Whether `name` is declared by a block that was dropped for being part of a dependency cycle
    pub(crate) fn is_cycle_name(&self, name: &str) -> bool {
        self.provided_by
            .get(name)
            .is_some_and(|key| self.in_cycle.contains(key))
    }

    /// Indexes the root blocks of `documents` and queues them for decoding
    #[tracing::instrument(skip_all)]
    pub fn seed(&mut self, documents: HclDocuments) {
        self.documents = Arc::new(documents);
        let documents = Arc::clone(&self.documents);

        for (source_index, _, attribute) in documents.attributes() {
            self.log(
                Diagnostic::error("Unsupported argument")
                    .with_detail(format!(
                        "An argument named \"{}\" is not expected here.",
                        attribute.key.value()
                    ))
                    .with_subject(documents.range(source_index, attribute.span())),
            );
        }

        self.seed_mod_block(&documents);

        for (index, (source_index, _, block)) in documents.blocks() {
            let range = documents.range(source_index, block.span());
            let ident = block.ident.value().as_str();
            let Some(block_type) = BlockType::parse(ident).filter(|t| BlockType::ROOT.contains(t))
            else {
                self.log(
                    Diagnostic::error("Unsupported block type")
                        .with_detail(format!("Blocks of type \"{ident}\" are not expected here."))
                        .with_subject(range),
                );
                continue;
            };
            if block_type == BlockType::Mod {
                continue;
            }

            let label = match (BlockSchema::for_block_type(block_type).labels, block.labels.as_slice()) {
                (LabelRule::None, []) => None,
                (LabelRule::None, _) => {
                    self.log(
                        Diagnostic::error(format!("Extraneous label for {block_type}"))
                            .with_detail(format!("No labels are expected for {block_type} blocks."))
                            .with_subject(range),
                    );
                    continue;
                }
                (_, [label]) => Some(label.as_str()),
                (_, []) => {
                    self.log(
                        Diagnostic::error(format!("Missing name for {block_type}"))
                            .with_detail(format!("All {block_type} blocks must have 1 labels (name)."))
                            .with_subject(range),
                    );
                    continue;
                }
                (_, _) => {
                    self.log(
                        Diagnostic::error(format!("Extraneous label for {block_type}"))
                            .with_detail(format!(
                                "Only 1 labels (name) are expected for {block_type} blocks."
                            ))
                            .with_subject(range),
                    );
                    continue;
                }
            };

            let Some(short_name) = label else {
                let key = format!("{block_type}#{index}");
                for attribute in block.body.attributes() {
                    let name = format!("{}.local.{}", self.symbols.mod_name(), attribute.key.value());
                    self.provided_by.entry(name).or_insert_with(|| key.clone());
                }
                self.queue(key, index, block_type, String::new());
                continue;
            };

            let full_name = format!(
                "{}.{}.{short_name}",
                self.symbols.mod_name(),
                block_type.namespace()
            );
            if self.pending.contains_key(&full_name) || self.current_mod.contains(&full_name) {
                self.log(
                    Diagnostic::error("Duplicate resource")
                        .with_detail(DuplicateNameError { name: full_name }.to_string())
                        .with_subject(range),
                );
                continue;
            }

            self.provided_by.insert(full_name.clone(), full_name.clone());
            self.index_nested_names(&full_name, block_type, short_name, &block.body);

            let mut hints = BTreeSet::new();
            collect_hints(self.symbols.mod_name(), &block.body, &mut hints);
            self.hints.insert(full_name.clone(), hints);

            self.queue(full_name.clone(), index, block_type, full_name);
        }

        tracing::debug!(pending = self.pending.len(), "seeded blocks");
    }

    /// Names the mod after the first mod block; any further mod block is an error
    fn seed_mod_block(&mut self, documents: &HclDocuments) {
        let mut mod_blocks = documents
            .blocks()
            .filter(|(_, (_, _, block))| block.ident.value().as_str() == BlockType::Mod.as_str());

        if let Some((index, (source_index, _, block))) = mod_blocks.next() {
            let range = documents.range(source_index, block.span());
            match block.labels.as_slice() {
                [label] if !is_valid_identifier(label.as_str()) => self.log(
                    Diagnostic::error("Invalid name")
                        .with_detail(BAD_IDENTIFIER_DETAIL)
                        .with_subject(range),
                ),
                [label] => {
                    let short_name = label.as_str();
                    tracing::debug!(short_name, "found mod block");
                    self.current_mod = Mod::new(short_name, self.options.root.clone(), range);
                    self.symbols.set_mod_name(short_name);
                    let key = self.current_mod.full_name.clone();
                    self.queue(key.clone(), index, BlockType::Mod, key);
                }
                _ => self.log(
                    Diagnostic::error("Missing name for mod")
                        .with_detail("All mod blocks must have 1 labels (name).")
                        .with_subject(range),
                ),
            }
        }

        for (_, (source_index, _, block)) in mod_blocks {
            self.log(
                Diagnostic::error("Duplicate mod block")
                    .with_detail("Only one mod block may be declared per workspace.")
                    .with_subject(documents.range(source_index, block.span())),
            );
        }
    }

    fn queue(&mut self, key: String, block_index: usize, block_type: BlockType, name: String) {
        tracing::trace!(key, %block_type, "queue block");
        self.pending.insert(
            key,
            PendingBlock {
                block_index,
                block_type,
                name,
                decoded_attributes: BTreeSet::new(),
            },
        );
    }

    /// Records the names declared by blocks nested in a dashboard or container as provided by `key`
    fn index_nested_names(&mut self, key: &str, parent_type: BlockType, parent_short_name: &str, body: &Body) {
        for nested in Self::nested_resources(parent_type, parent_short_name, body) {
            let name = format!(
                "{}.{}.{}",
                self.symbols.mod_name(),
                nested.block_type,
                nested.short_name
            );
            self.provided_by
                .entry(name)
                .or_insert_with(|| key.to_string());
            self.index_nested_names(key, nested.block_type, &nested.short_name, &nested.block.body);
        }
    }

    /// Resources declared by the blocks nested in `body`, in lexical order
    pub(crate) fn nested_resources<'b>(
        parent_type: BlockType,
        parent_short_name: &str,
        body: &'b Body,
    ) -> Vec<NestedBlock<'b>> {
        let schema = BlockSchema::for_block_type(parent_type);
        let mut ordinals: BTreeMap<BlockType, usize> = BTreeMap::new();
        let mut nested = vec![];

        for block in body.blocks() {
            let Some(block_type) = BlockType::parse(block.ident.value().as_str())
                .filter(|t| t.is_resource() && schema.allows_block(*t))
            else {
                continue;
            };

            if Self::is_block_anonymous(block) {
                let ordinal = ordinals.entry(block_type).or_default();
                nested.push(NestedBlock {
                    block_type,
                    short_name: Self::anonymous_resource_name(
                        parent_type,
                        parent_short_name,
                        block_type,
                        *ordinal,
                    ),
                    anonymous: true,
                    block,
                });
                *ordinal += 1;
            } else {
                nested.push(NestedBlock {
                    block_type,
                    short_name: block.labels[0].as_str().to_string(),
                    anonymous: false,
                    block,
                });
            }
        }

        nested
    }

    pub fn is_block_anonymous(block: &Block) -> bool {
        block.labels.is_empty()
    }

    /// `<parent type>_<parent short name>_anonymous_<block type>_<ordinal>`
    pub fn anonymous_resource_name(
        parent_type: BlockType,
        parent_short_name: &str,
        block_type: BlockType,
        ordinal: usize,
    ) -> String {
        format!("{parent_type}_{parent_short_name}_anonymous_{block_type}_{ordinal}")
    }

    /// Pending block keys in decode order
    ///
    /// Explicit dependencies always order the blocks. The dependencies recorded in the previous pass are
    /// added on top unless they introduce a cycle. Blocks in a cycle of explicit dependencies are dropped
    /// from the pending set and reported through the error, which still carries the order of the rest.
    #[tracing::instrument(skip(self), fields(pending = self.pending.len()))]
    pub fn blocks_to_decode(&mut self) -> Result<Vec<String>, OrderingError> {
        let explicit = self.dependency_graph(false);
        let explicit_order = match explicit.order() {
            Ok(order) => order,
            Err(err) => {
                for participant in err.participants() {
                    self.pending.shift_remove(participant);
                    self.in_cycle.insert(participant.clone());
                }
                return Err(err);
            }
        };

        if self.wait_list.is_empty() {
            return Ok(explicit_order);
        }
        match self.dependency_graph(true).order() {
            Ok(order) => Ok(order),
            Err(err) => {
                tracing::debug!(%err, "ignoring recorded dependencies");
                Ok(explicit_order)
            }
        }
    }

    fn dependency_graph(&self, with_wait_list: bool) -> DependencyGraph {
        let mut graph = DependencyGraph::default();
        for key in self.pending.keys() {
            graph.add_node(key);
        }

        for key in self.pending.keys() {
            for name in self.hints.get(key).into_iter().flatten() {
                if let Some(provider) = self.provided_by.get(name) {
                    // names nested in the block itself do not order it, naming the block itself does
                    if provider != key || name == key {
                        graph.add_edge(key, provider);
                    }
                }
            }

            if !with_wait_list {
                continue;
            }
            for symbol in self.wait_list.get(key).into_iter().flatten().flat_map(|d| &d.missing) {
                if let Some(provider) = self.provided_by.get(&symbol.name) {
                    if provider != key {
                        graph.add_edge(key, provider);
                    }
                }
            }
        }

        graph
    }

    /// Records that `resource_name`, declared by the block `block_key`, could not be decoded because of
    /// `missing`
    pub fn add_dependencies(
        &mut self,
        block_key: &str,
        resource_name: &str,
        missing: impl IntoIterator<Item = UnresolvedSymbol>,
    ) {
        let entries = self.wait_list.entry(block_key.to_string()).or_default();
        let index = match entries.iter().position(|d| d.resource_name == resource_name) {
            Some(index) => index,
            None => {
                entries.push(Dependencies {
                    resource_name: resource_name.to_string(),
                    missing: BTreeSet::new(),
                });
                entries.len() - 1
            }
        };
        entries[index].missing.extend(missing);
    }

    /// What held back the resources of `block_key` in the current pass, in the order they were recorded
    pub fn dependencies(&self, block_key: &str) -> &[Dependencies] {
        self.wait_list.get(block_key).map(Vec::as_slice).unwrap_or_default()
    }

    /// Forgets the dependencies of the previous pass
    pub fn clear_dependencies(&mut self) {
        self.wait_list.clear();
    }

    /// Marks `name` as the resource being decoded until the guard is dropped
    pub fn push_decode_block(&mut self, name: &str) -> DecodeBlockGuard<'_> {
        self.decode_stack.push(name.to_string());
        DecodeBlockGuard { ctx: self }
    }

    pub fn current_decode_block(&self) -> Option<&str> {
        self.decode_stack.last().map(String::as_str)
    }

    /// Adds a decoded resource to the mod and makes it visible to expressions
    pub fn add_resource(&mut self, resource: Resource) -> Result<(), DuplicateNameError> {
        let (block_type, short_name, value) = {
            let r = resource.as_resource();
            (r.block_type(), r.short_name().to_string(), r.to_value())
        };
        self.current_mod.add_resource(resource)?;
        self.symbols.insert(block_type, &short_name, value);
        Ok(())
    }
}

/// Pops the decode stack when dropped
pub struct DecodeBlockGuard<'a> {
    ctx: &'a mut RunContext,
}

impl Deref for DecodeBlockGuard<'_> {
    type Target = RunContext;

    fn deref(&self) -> &Self::Target {
        self.ctx
    }
}

impl DerefMut for DecodeBlockGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.ctx
    }
}

impl Drop for DecodeBlockGuard<'_> {
    fn drop(&mut self) {
        self.ctx.decode_stack.pop();
    }
}

/// Names in `children` and `base` attributes of `body` and every nested block
fn collect_hints(mod_name: &str, body: &Body, hints: &mut BTreeSet<String>) {
    for attribute in body.attributes() {
        let expr = hcl::Expression::from(attribute.value.clone());
        match (attribute.key.value().as_str(), &expr) {
            ("children", hcl::Expression::Array(items)) => {
                hints.extend(items.iter().filter_map(|item| name_hint(mod_name, item)));
            }
            ("base", expr) => hints.extend(name_hint(mod_name, expr)),
            _ => {}
        }
    }

    for block in body.blocks() {
        collect_hints(mod_name, &block.body, hints);
    }
}

fn name_hint(mod_name: &str, expr: &hcl::Expression) -> Option<String> {
    match expr {
        hcl::Expression::String(name) => qualify_name(mod_name, name).map(|r| r.full_name),
        hcl::Expression::Traversal(traversal) => {
            traversal.named_reference(mod_name).map(|r| r.full_name)
        }
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::hcl_documents;
    use crate::parse::eval::UnresolvedKind;
    use pretty_assertions::assert_eq;

    fn context(documents: HclDocuments) -> RunContext {
        let mut ctx = RunContext::new(RunContextOptions::new(
            PathBuf::from("/workspace/demo"),
            ListOptions::for_extensions(&["sp"], false),
        ));
        ctx.seed(documents);
        ctx
    }

    fn keys(ctx: &RunContext) -> Vec<String> {
        ctx.pending().map(|(key, _)| key.clone()).collect()
    }

    #[test]
    fn mod_block_names_the_mod() {
        let ctx = context(hcl_documents! {r#"
            query "q1" { sql = "select 1" }
            mod "demo" { title = "Demo" }
        "#});

        assert_eq!(ctx.current_mod().short_name, "demo");
        assert_eq!(keys(&ctx), vec!["mod.demo", "demo.query.q1"]);
        assert!(!ctx.diagnostics().has_errors());
    }

    #[test]
    fn invalid_mod_name_keeps_the_default_mod() {
        let ctx = context(hcl_documents! {r#"
            mod "1bad" {}
            query "q1" { sql = "select 1" }
        "#});

        let errors: Vec<_> = ctx.diagnostics().errors().collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].summary, "Invalid name");
        assert_eq!(errors[0].detail.as_deref(), Some(BAD_IDENTIFIER_DETAIL));
        assert_eq!(ctx.current_mod().short_name, "local");
        assert_eq!(keys(&ctx), vec!["local.query.q1"]);
    }

    #[test]
    fn seeding_errors() {
        let ctx = context(hcl_documents! {r#"
            mod "one" {}
            mod "two" {}
            stray = 1
            resource "x" {}
            query {}
            locals "named" {}
            query "q1" { sql = "select 1" }
            query "q1" { sql = "select 2" }
        "#});

        let summaries: Vec<&str> = ctx
            .diagnostics()
            .errors()
            .map(|d| d.summary.as_str())
            .collect();
        assert_eq!(
            summaries,
            vec![
                "Unsupported argument",
                "Duplicate mod block",
                "Unsupported block type",
                "Missing name for query",
                "Extraneous label for locals",
                "Duplicate resource",
            ]
        );
        assert_eq!(keys(&ctx), vec!["mod.one", "one.query.q1"]);
    }

    #[test]
    fn explicit_dependencies_order_blocks() {
        let mut ctx = context(hcl_documents! {r#"
            benchmark "b1" { children = [benchmark.b2, "control.c1"] }
            benchmark "b2" { children = ["control.c1"] }
            control "c1" { sql = "select 1" }
        "#});

        assert_eq!(
            ctx.blocks_to_decode().unwrap(),
            vec!["local.control.c1", "local.benchmark.b2", "local.benchmark.b1"]
        );
    }

    #[test]
    fn explicit_cycles_drop_their_participants() {
        let mut ctx = context(hcl_documents! {r#"
            benchmark "x" { children = [benchmark.y] }
            benchmark "y" { children = ["benchmark.x"] }
            query "q1" { sql = "select 1" }
        "#});

        let err = ctx.blocks_to_decode().unwrap_err();
        assert_eq!(
            err.cycles,
            vec![vec![
                "local.benchmark.x".to_string(),
                "local.benchmark.y".to_string()
            ]]
        );
        assert_eq!(err.order, vec!["local.query.q1"]);
        assert_eq!(keys(&ctx), vec!["local.query.q1"]);
    }

    #[test]
    fn recorded_dependencies_reorder_the_next_pass() {
        let mut ctx = context(hcl_documents! {r#"
            query "q1" { sql = query.q2.sql }
            query "q2" { sql = "select 2" }
        "#});
        assert_eq!(
            ctx.blocks_to_decode().unwrap(),
            vec!["local.query.q1", "local.query.q2"]
        );

        let missing = UnresolvedSymbol {
            name: "local.query.q2".to_string(),
            kind: UnresolvedKind::UnknownVariable,
        };
        ctx.add_dependencies("local.query.q1", "local.query.q1", [missing.clone()]);
        ctx.add_dependencies("local.query.q1", "local.query.q1", [missing]);
        assert_eq!(ctx.dependencies("local.query.q1").len(), 1);
        assert_eq!(ctx.dependencies("local.query.q1")[0].missing.len(), 1);

        assert_eq!(
            ctx.blocks_to_decode().unwrap(),
            vec!["local.query.q2", "local.query.q1"]
        );
        ctx.clear_dependencies();
        assert!(ctx.dependencies("local.query.q1").is_empty());
    }

    #[test]
    fn anonymous_names_follow_lexical_position() {
        let documents = hcl_documents! {r#"
            dashboard "d1" {
                card { sql = "select 1" }
                card "named" { sql = "select 2" }
                card { sql = "select 3" }
                container {
                    text { value = "hello" }
                }
                param "ignored" {}
            }
        "#};
        let (_, (_, _, block)) = documents.blocks().next().unwrap();
        let names: Vec<(String, bool)> =
            RunContext::nested_resources(BlockType::Dashboard, "d1", &block.body)
                .into_iter()
                .map(|nested| (nested.short_name, nested.anonymous))
                .collect();

        assert_eq!(
            names,
            vec![
                ("dashboard_d1_anonymous_card_0".to_string(), true),
                ("named".to_string(), false),
                ("dashboard_d1_anonymous_card_1".to_string(), true),
                ("dashboard_d1_anonymous_container_0".to_string(), true),
            ]
        );
    }

    #[test]
    fn decode_stack_pops_on_drop() {
        let mut ctx = context(HclDocuments::default());
        {
            let mut guard = ctx.push_decode_block("local.query.q1");
            assert_eq!(guard.current_decode_block(), Some("local.query.q1"));
            let nested = guard.push_decode_block("local.query.q1.param.p");
            assert_eq!(nested.current_decode_block(), Some("local.query.q1.param.p"));
        }
        assert_eq!(ctx.current_decode_block(), None);
    }
}
