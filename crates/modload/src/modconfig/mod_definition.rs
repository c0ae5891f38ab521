use super::diff::{DiffBuilder, ModDiff, ResourceDiff};
use super::{
    opt_str, parse_full_name, Benchmark, BlockType, ContainerKind, Control, Dashboard, DashboardLeaf,
    DuplicateNameError, HclResource, LeafKind, Local, ModTreeItem, NodePath, Query,
    QueryProvider, ReferenceTracker, Require, Resource, ResourceRef, TreeError, Variable,
};
use crate::diagnostics::SourceRange;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Name of the mod created for a workspace without a mod block
pub const DEFAULT_MOD_NAME: &str = "local";

/// Version of an installed mod, taken from its install path (`.../mod@v1.2.3`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ModVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub pre_release: Option<String>,
}

impl ModVersion {
    /// Accepts `1`, `1.2`, `1.2.3` and `1.2.3-rc.1`, with an optional leading `v`
    pub fn parse(value: &str) -> Option<ModVersion> {
        let value = value.strip_prefix('v').unwrap_or(value);
        let (core, pre_release) = match value.split_once('-') {
            Some((core, pre)) if !pre.is_empty() => (core, Some(pre.to_string())),
            Some(_) => return None,
            None => (value, None),
        };

        let mut parts = core.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next().map(str::parse).transpose().ok()?.unwrap_or(0);
        let patch = parts.next().map(str::parse).transpose().ok()?.unwrap_or(0);
        if parts.next().is_some() {
            return None;
        }

        Some(ModVersion {
            major,
            minor,
            patch,
            pre_release,
        })
    }
}

impl Display for ModVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.pre_release {
            write!(f, "-{pre}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OpenGraph {
    pub title: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
}

/// Root aggregate of a workspace
///
/// Owns every decoded resource in one map per type, keyed by fully-qualified name. Tree edges between
/// resources are names that resolve through these maps.
#[derive(Debug, Clone, Serialize)]
pub struct Mod {
    pub short_name: String,
    /// `mod.<short name>`
    pub full_name: String,

    pub title: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub documentation: Option<String>,
    pub icon: Option<String>,
    pub categories: Vec<String>,
    pub tags: BTreeMap<String, String>,
    pub require: Option<Require>,
    pub open_graph: Option<OpenGraph>,
    pub version: Option<ModVersion>,

    pub mod_path: PathBuf,
    #[serde(skip)]
    pub decl_range: SourceRange,

    pub queries: BTreeMap<String, Query>,
    pub controls: BTreeMap<String, Control>,
    pub benchmarks: BTreeMap<String, Benchmark>,
    pub dashboards: BTreeMap<String, Dashboard>,
    pub containers: BTreeMap<String, Dashboard>,
    pub cards: BTreeMap<String, DashboardLeaf>,
    pub charts: BTreeMap<String, DashboardLeaf>,
    pub counters: BTreeMap<String, DashboardLeaf>,
    pub hierarchies: BTreeMap<String, DashboardLeaf>,
    pub images: BTreeMap<String, DashboardLeaf>,
    pub inputs: BTreeMap<String, DashboardLeaf>,
    pub tables: BTreeMap<String, DashboardLeaf>,
    pub texts: BTreeMap<String, DashboardLeaf>,
    pub variables: BTreeMap<String, Variable>,
    pub locals: BTreeMap<String, Local>,

    /// direct children: tree resources that are not the child of another resource
    pub children: Vec<String>,
    #[serde(skip)]
    pub references: ReferenceTracker,

    #[serde(skip)]
    paths: OnceLock<BTreeMap<String, Vec<NodePath>>>,
}

impl Mod {
    pub fn new(short_name: &str, mod_path: impl Into<PathBuf>, decl_range: SourceRange) -> Self {
        let mod_path = mod_path.into();
        let version = version_from_path(&mod_path);
        Self {
            short_name: short_name.to_string(),
            full_name: format!("mod.{short_name}"),
            title: None,
            description: None,
            color: None,
            documentation: None,
            icon: None,
            categories: vec![],
            tags: BTreeMap::new(),
            require: None,
            open_graph: None,
            version,
            mod_path,
            decl_range,
            queries: BTreeMap::new(),
            controls: BTreeMap::new(),
            benchmarks: BTreeMap::new(),
            dashboards: BTreeMap::new(),
            containers: BTreeMap::new(),
            cards: BTreeMap::new(),
            charts: BTreeMap::new(),
            counters: BTreeMap::new(),
            hierarchies: BTreeMap::new(),
            images: BTreeMap::new(),
            inputs: BTreeMap::new(),
            tables: BTreeMap::new(),
            texts: BTreeMap::new(),
            variables: BTreeMap::new(),
            locals: BTreeMap::new(),
            children: vec![],
            references: ReferenceTracker::default(),
            paths: OnceLock::new(),
        }
    }

    /// Mod used for a workspace that does not declare one, titled after its folder
    pub fn default_mod(mod_path: impl Into<PathBuf>) -> Self {
        let mut m = Self::new(DEFAULT_MOD_NAME, mod_path, SourceRange::default());
        m.title = m
            .mod_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        m
    }

    pub fn is_default_mod(&self) -> bool {
        self.short_name == DEFAULT_MOD_NAME
    }

    /// `<short name>@<major>.<minor>` for versioned mods
    pub fn name_with_version(&self) -> String {
        match &self.version {
            Some(version) => format!("{}@{}.{}", self.short_name, version.major, version.minor),
            None => self.short_name.clone(),
        }
    }

    pub fn leaves(&self, kind: LeafKind) -> &BTreeMap<String, DashboardLeaf> {
        match kind {
            LeafKind::Card => &self.cards,
            LeafKind::Chart => &self.charts,
            LeafKind::Counter => &self.counters,
            LeafKind::Hierarchy => &self.hierarchies,
            LeafKind::Image => &self.images,
            LeafKind::Input => &self.inputs,
            LeafKind::Table => &self.tables,
            LeafKind::Text => &self.texts,
        }
    }

    fn leaves_mut(&mut self, kind: LeafKind) -> &mut BTreeMap<String, DashboardLeaf> {
        match kind {
            LeafKind::Card => &mut self.cards,
            LeafKind::Chart => &mut self.charts,
            LeafKind::Counter => &mut self.counters,
            LeafKind::Hierarchy => &mut self.hierarchies,
            LeafKind::Image => &mut self.images,
            LeafKind::Input => &mut self.inputs,
            LeafKind::Table => &mut self.tables,
            LeafKind::Text => &mut self.texts,
        }
    }

    /// Adds a decoded resource. The first resource with a given name wins.
    pub fn add_resource(&mut self, resource: Resource) -> Result<(), DuplicateNameError> {
        let name = resource.name().to_string();
        if self.contains(&name) {
            return Err(DuplicateNameError { name });
        }

        match resource {
            Resource::Query(r) => {
                self.queries.insert(name, r);
            }
            Resource::Control(r) => {
                self.controls.insert(name, r);
            }
            Resource::Benchmark(r) => {
                self.benchmarks.insert(name, r);
            }
            Resource::Dashboard(r) if r.kind == ContainerKind::Container => {
                self.containers.insert(name, r);
            }
            Resource::Dashboard(r) => {
                self.dashboards.insert(name, r);
            }
            Resource::Leaf(r) => {
                self.leaves_mut(r.kind).insert(name, r);
            }
            Resource::Variable(r) => {
                self.variables.insert(name, r);
            }
            Resource::Local(r) => {
                self.locals.insert(name, r);
            }
        }
        self.invalidate_paths();
        Ok(())
    }

    /// Adds a resource created from a content file, unless a resource of that name exists
    pub fn add_pseudo_resource(&mut self, query: Query) -> bool {
        if self.queries.contains_key(&query.full_name) {
            return false;
        }
        self.queries.insert(query.full_name.clone(), query);
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resource(name).is_some()
    }

    pub fn resource(&self, name: &str) -> Option<ResourceRef<'_>> {
        let (_, block_type, _) = parse_full_name(name)?;
        Some(match block_type {
            BlockType::Query => ResourceRef::Query(self.queries.get(name)?),
            BlockType::Control => ResourceRef::Control(self.controls.get(name)?),
            BlockType::Benchmark => ResourceRef::Benchmark(self.benchmarks.get(name)?),
            BlockType::Dashboard => ResourceRef::Dashboard(self.dashboards.get(name)?),
            BlockType::Container => ResourceRef::Dashboard(self.containers.get(name)?),
            BlockType::Variable => ResourceRef::Variable(self.variables.get(name)?),
            BlockType::Locals => ResourceRef::Local(self.locals.get(name)?),
            other => ResourceRef::Leaf(self.leaves(other.leaf_kind()?).get(name)?),
        })
    }

    pub fn tree_item_mut(&mut self, name: &str) -> Option<&mut dyn ModTreeItem> {
        let (_, block_type, _) = parse_full_name(name)?;
        let item: &mut dyn ModTreeItem = match block_type {
            BlockType::Control => self.controls.get_mut(name)?,
            BlockType::Benchmark => self.benchmarks.get_mut(name)?,
            BlockType::Dashboard => self.dashboards.get_mut(name)?,
            BlockType::Container => self.containers.get_mut(name)?,
            other => self.leaves_mut(other.leaf_kind()?).get_mut(name)?,
        };
        Some(item)
    }

    /// Records `child` as a child of `parent` and `parent` as a parent of `child`
    pub fn add_child(&mut self, parent: &str, child: &str) -> Result<(), TreeError> {
        let child_type = parse_full_name(child)
            .map(|(_, block_type, _)| block_type)
            .ok_or_else(|| TreeError::NotFound(child.to_string()))?;
        if !self.contains(child) {
            return Err(TreeError::NotFound(child.to_string()));
        }
        self.tree_item_mut(parent)
            .ok_or_else(|| TreeError::NotFound(parent.to_string()))?
            .add_child(child, child_type)?;
        if let Some(item) = self.tree_item_mut(child) {
            item.add_parent(parent);
        }
        self.invalidate_paths();
        Ok(())
    }

    /// Links parents to their children and collects the direct children of the mod
    pub fn build_resource_tree(&mut self) -> Vec<TreeError> {
        let mut edges = vec![];
        let _ = self.walk_resources(|resource| {
            if let Some(item) = resource.as_tree_item() {
                for child in item.children() {
                    edges.push((item.name().to_string(), child.clone()));
                }
                if let ResourceRef::Dashboard(dashboard) = resource {
                    for input in &dashboard.inputs {
                        edges.push((dashboard.full_name.clone(), input.clone()));
                    }
                }
            }
            std::ops::ControlFlow::Continue(())
        });

        let mut errors = vec![];
        for (parent, child) in edges {
            match self.tree_item_mut(&child) {
                Some(item) => item.add_parent(&parent),
                None => errors.push(TreeError::NotFound(child)),
            }
        }

        let mut children = vec![];
        let _ = self.walk_resources(|resource| {
            if let Some(item) = resource.as_tree_item() {
                if item.parents().is_empty() {
                    children.push(item.name().to_string());
                }
            }
            std::ops::ControlFlow::Continue(())
        });
        self.children = children;
        self.invalidate_paths();
        errors
    }

    fn invalidate_paths(&mut self) {
        self.paths = OnceLock::new();
    }

    /// Every root-to-node path of the tree resource `name`
    pub fn paths(&self, name: &str) -> &[NodePath] {
        self.paths
            .get_or_init(|| self.compute_paths())
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn compute_paths(&self) -> BTreeMap<String, Vec<NodePath>> {
        fn collect(
            m: &Mod,
            name: &str,
            visiting: &mut BTreeSet<String>,
            memo: &mut BTreeMap<String, Vec<NodePath>>,
        ) -> Vec<NodePath> {
            if let Some(paths) = memo.get(name) {
                return paths.clone();
            }
            let Some(item) = m.resource(name).and_then(|r| r.as_tree_item()) else {
                return vec![];
            };
            if !visiting.insert(name.to_string()) {
                return vec![];
            }

            let mut paths = vec![];
            if item.parents().is_empty() {
                paths.push(vec![m.full_name.clone(), name.to_string()]);
            }
            for parent in item.parents() {
                for mut path in collect(m, parent, visiting, memo) {
                    path.push(name.to_string());
                    paths.push(path);
                }
            }

            visiting.remove(name);
            memo.insert(name.to_string(), paths.clone());
            paths
        }

        let mut memo = BTreeMap::new();
        let mut names = vec![];
        let _ = self.walk_resources(|resource| {
            if resource.as_tree_item().is_some() {
                names.push(resource.name().to_string());
            }
            std::ops::ControlFlow::Continue(())
        });
        for name in names {
            collect(self, &name, &mut BTreeSet::new(), &mut memo);
        }
        memo
    }

    /// SQL of a query provider, following its `query` reference if it has no SQL of its own
    pub fn resolved_sql<'a>(&'a self, provider: &'a dyn QueryProvider) -> Option<&'a str> {
        if let Some(sql) = provider.sql() {
            return Some(sql);
        }
        self.queries.get(provider.query()?)?.sql()
    }

    fn changed_properties(&self, other: &Mod) -> Vec<String> {
        DiffBuilder::new(&self.full_name, BlockType::Mod)
            .check("short_name", &self.short_name, &other.short_name)
            .check("title", opt_str(&self.title), opt_str(&other.title))
            .check("description", opt_str(&self.description), opt_str(&other.description))
            .check("color", opt_str(&self.color), opt_str(&other.color))
            .check(
                "documentation",
                opt_str(&self.documentation),
                opt_str(&other.documentation),
            )
            .check("icon", opt_str(&self.icon), opt_str(&other.icon))
            .check("categories", &self.categories, &other.categories)
            .check("tags", &self.tags, &other.tags)
            .build()
            .changed_properties
    }

    /// Compares scalar properties and every resource, variables and locals by presence only
    pub fn equals(&self, other: &Mod) -> bool {
        if !self.changed_properties(other).is_empty() {
            return false;
        }

        let mut equal = true;
        let _ = self.walk_resources(|resource| {
            let same = match resource {
                ResourceRef::Variable(_) | ResourceRef::Local(_) => other.contains(resource.name()),
                _ => other
                    .resource(resource.name())
                    .and_then(|theirs| diff_resources(resource, theirs))
                    .is_some_and(|diff| !diff.has_changes()),
            };
            equal &= same;
            if same {
                std::ops::ControlFlow::Continue(())
            } else {
                std::ops::ControlFlow::Break(())
            }
        });
        if !equal {
            return false;
        }

        other
            .walk_resources(|resource| {
                if self.contains(resource.name()) {
                    std::ops::ControlFlow::Continue(())
                } else {
                    std::ops::ControlFlow::Break(())
                }
            })
            .is_continue()
    }

    /// Diff of `self` (old) against `other` (new)
    pub fn diff(&self, other: &Mod) -> ModDiff {
        let mut diff = ModDiff {
            changed_properties: self.changed_properties(other),
            ..Default::default()
        };

        let _ = self.walk_resources(|resource| {
            match other.resource(resource.name()) {
                None => diff.removed.push(resource.name().to_string()),
                Some(_) => {
                    if let Some(resource_diff) =
                        self.resource_diff(resource.name(), other, &mut BTreeSet::new())
                    {
                        diff.changed.push(resource_diff);
                    }
                }
            }
            std::ops::ControlFlow::Continue(())
        });
        let nested: BTreeSet<String> = diff
            .changed
            .iter()
            .flat_map(ResourceDiff::nested_names)
            .collect();
        diff.changed.retain(|d| !nested.contains(&d.name));

        let _ = other.walk_resources(|resource| {
            if !self.contains(resource.name()) {
                diff.added.push(resource.name().to_string());
            }
            std::ops::ControlFlow::Continue(())
        });

        diff
    }

    /// Diff of one resource including the diffs of its changed children
    fn resource_diff(
        &self,
        name: &str,
        other: &Mod,
        visiting: &mut BTreeSet<String>,
    ) -> Option<ResourceDiff> {
        let ours = self.resource(name)?;
        let theirs = other.resource(name)?;
        let mut diff = diff_resources(ours, theirs)?;

        if visiting.insert(name.to_string()) {
            if let Some(item) = ours.as_tree_item() {
                for child in item.children() {
                    if let Some(child_diff) = self.resource_diff(child, other, visiting) {
                        diff.child_diffs.push(child_diff);
                    }
                }
            }
            visiting.remove(name);
        }

        diff.has_changes().then_some(diff)
    }
}

/// `None` if the resources are of different types
fn diff_resources(ours: ResourceRef, theirs: ResourceRef) -> Option<ResourceDiff> {
    Some(match (ours, theirs) {
        (ResourceRef::Query(a), ResourceRef::Query(b)) => a.diff(b),
        (ResourceRef::Control(a), ResourceRef::Control(b)) => a.diff(b),
        (ResourceRef::Benchmark(a), ResourceRef::Benchmark(b)) => a.diff(b),
        (ResourceRef::Dashboard(a), ResourceRef::Dashboard(b)) => a.diff(b),
        (ResourceRef::Leaf(a), ResourceRef::Leaf(b)) => a.diff(b),
        (ResourceRef::Variable(a), ResourceRef::Variable(b)) => a.diff(b),
        (ResourceRef::Local(a), ResourceRef::Local(b)) => a.diff(b),
        _ => return None,
    })
}

fn version_from_path(mod_path: &Path) -> Option<ModVersion> {
    let path = mod_path.to_string_lossy();
    let (_, version) = path.rsplit_once('@')?;
    ModVersion::parse(version)
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn version_from_install_path() {
        let m = Mod::new("aws", "/mods/github.com/turbot/aws@v1.2.3", SourceRange::default());
        assert_eq!(
            m.version,
            Some(ModVersion {
                major: 1,
                minor: 2,
                patch: 3,
                pre_release: None
            })
        );
        assert_eq!(m.name_with_version(), "aws@1.2");

        let m = Mod::new("aws", "/mods/aws", SourceRange::default());
        assert_eq!(m.version, None);
        assert_eq!(m.name_with_version(), "aws");
    }

    #[test]
    fn default_mod_is_named_after_folder() {
        let m = Mod::default_mod("/work/my_mod");
        assert!(m.is_default_mod());
        assert_eq!(m.title.as_deref(), Some("my_mod"));
        assert_eq!(m.full_name, "mod.local");
    }

    #[test]
    fn duplicate_resources_keep_the_first() {
        let mut m = Mod::new("m", "/m", SourceRange::default());
        let mut first = Query::new("m", "q", SourceRange::default());
        first.title = Some("first".to_string());
        let mut second = Query::new("m", "q", SourceRange::default());
        second.title = Some("second".to_string());

        m.add_resource(Resource::Query(first)).unwrap();
        let err = m.add_resource(Resource::Query(second)).unwrap_err();

        assert_eq!(err.name, "m.query.q");
        assert_eq!(m.queries["m.query.q"].title.as_deref(), Some("first"));
    }

    #[test]
    fn paths_follow_parents() {
        let mut m = Mod::new("m", "/m", SourceRange::default());
        m.add_resource(Resource::Benchmark(Benchmark::new("m", "outer", SourceRange::default())))
            .unwrap();
        m.add_resource(Resource::Benchmark(Benchmark::new("m", "inner", SourceRange::default())))
            .unwrap();
        m.add_resource(Resource::Control(Control::new("m", "c", SourceRange::default())))
            .unwrap();
        m.add_child("m.benchmark.outer", "m.benchmark.inner").unwrap();
        m.add_child("m.benchmark.inner", "m.control.c").unwrap();
        m.add_child("m.benchmark.outer", "m.control.c").unwrap();

        assert_eq!(
            m.paths("m.control.c"),
            &[
                vec!["mod.m", "m.benchmark.outer", "m.benchmark.inner", "m.control.c"],
                vec!["mod.m", "m.benchmark.outer", "m.control.c"],
            ]
        );
    }

    #[test]
    fn controls_cannot_have_children() {
        let mut m = Mod::new("m", "/m", SourceRange::default());
        m.add_resource(Resource::Control(Control::new("m", "a", SourceRange::default())))
            .unwrap();
        m.add_resource(Resource::Control(Control::new("m", "b", SourceRange::default())))
            .unwrap();

        assert!(matches!(
            m.add_child("m.control.a", "m.control.b"),
            Err(TreeError::ChildrenNotSupported { .. })
        ));
    }

    #[test]
    fn diff_detects_changes() {
        let mut old = Mod::new("m", "/m", SourceRange::default());
        old.add_resource(Resource::Query(Query::new("m", "q", SourceRange::default())))
            .unwrap();
        let mut new = old.clone();
        new.queries.get_mut("m.query.q").unwrap().title = Some("changed".to_string());
        new.add_resource(Resource::Query(Query::new("m", "added", SourceRange::default())))
            .unwrap();

        assert!(!old.diff(&old).has_changes());
        assert!(old.equals(&old));

        let diff = old.diff(&new);
        assert_eq!(diff.added, vec!["m.query.added"]);
        assert_eq!(diff.changed.len(), 1);
        assert_eq!(diff.changed[0].changed_properties, vec!["title"]);
        assert!(!old.equals(&new));
    }

    #[test]
    fn changed_children_are_reported_under_their_parent() {
        let mut old = Mod::new("m", "/m", SourceRange::default());
        old.add_resource(Resource::Benchmark(Benchmark::new("m", "b", SourceRange::default())))
            .unwrap();
        old.add_resource(Resource::Control(Control::new("m", "c", SourceRange::default())))
            .unwrap();
        old.add_child("m.benchmark.b", "m.control.c").unwrap();
        let mut new = old.clone();
        new.controls.get_mut("m.control.c").unwrap().title = Some("changed".to_string());

        let diff = old.diff(&new);
        assert_eq!(diff.changed.len(), 1);
        let benchmark = &diff.changed[0];
        assert_eq!(benchmark.name, "m.benchmark.b");
        assert!(benchmark.changed_properties.is_empty());
        assert_eq!(benchmark.child_diffs.len(), 1);
        assert_eq!(benchmark.child_diffs[0].name, "m.control.c");
        assert_eq!(benchmark.child_diffs[0].changed_properties, vec!["title"]);
    }
}
