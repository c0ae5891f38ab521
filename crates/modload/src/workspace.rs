//! A loaded workspace: the mod of a folder, kept up to date while its files change
//!
//! Every accessor takes the workspace lock, and so does a reload. A failed reload leaves the previous mod in
//! place and is reported to the error handler and as a [DashboardEvent::WorkspaceError].
use crate::diagnostics::Diagnostics;
use crate::events::{DashboardChanged, DashboardEvent, DashboardEventHandler};
use crate::listing::{ListOptions, MOD_DATA_EXTENSION, SQL_EXTENSION};
use crate::modconfig::{InputValue, Mod, ModDiff, Variable};
use crate::parse::{load_mod, mod_file_exists, LoadModError, RunContext, RunContextOptions};
use crate::watcher::{FileWatcher, WatchError};
use crate::workspace_lock::{WorkspaceLock, WorkspaceLockError};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Lines of this file in the workspace root are excluded from loading, `#` starts a comment
pub const WORKSPACE_IGNORE_FILE: &str = ".modignore";

pub type WorkspaceErrorHandler = Arc<dyn Fn(&WorkspaceError) + Send + Sync>;

#[derive(thiserror::Error, Debug)]
pub enum WorkspaceError {
    #[error("failed to read {}", path.display())]
    Exclusions {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to load installation cache")]
    Lock(#[from] WorkspaceLockError),
    #[error(transparent)]
    Load(#[from] LoadModError),
    #[error(transparent)]
    Watch(#[from] WatchError),
}

struct WorkspaceState {
    path: PathBuf,
    input_variables: BTreeMap<String, InputValue>,
    current: Arc<Mod>,
    /// warnings of the last successful load
    diagnostics: Diagnostics,
    event_handlers: Vec<DashboardEventHandler>,
    error_handler: Option<WorkspaceErrorHandler>,
}

impl WorkspaceState {
    fn list_options(&self) -> Result<ListOptions, WorkspaceError> {
        let recursive = mod_file_exists(&self.path);
        Ok(ListOptions::for_extensions(&[MOD_DATA_EXTENSION], recursive)
            .with_exclusions(load_exclusions(&self.path)?))
    }

    fn load(&self) -> Result<(Mod, Diagnostics), WorkspaceError> {
        let mut options = RunContextOptions::new(self.path.clone(), self.list_options()?);
        options.input_variables = self.input_variables.clone();
        options.workspace_lock = WorkspaceLock::load(&self.path)?;

        let mut ctx = RunContext::new(options);
        let m = load_mod(&self.path, &mut ctx)?;
        Ok((m, ctx.diagnostics().clone()))
    }
}

pub struct Workspace {
    state: Arc<Mutex<WorkspaceState>>,
    watcher: Option<FileWatcher>,
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Workspace")
            .field("path", &state.path)
            .field("mod", &state.current.full_name)
            .field("watching", &self.watcher.is_some())
            .finish()
    }
}

impl Workspace {
    /// Loads the mod in `path`
    #[tracing::instrument(skip(input_variables))]
    pub fn load(
        path: &Path,
        input_variables: BTreeMap<String, InputValue>,
    ) -> Result<Self, WorkspaceError> {
        let mut state = WorkspaceState {
            path: path.to_owned(),
            input_variables,
            current: Arc::new(Mod::default_mod(path)),
            diagnostics: Diagnostics::default(),
            event_handlers: vec![],
            error_handler: None,
        };
        let (m, diagnostics) = state.load()?;
        state.current = Arc::new(m);
        state.diagnostics = diagnostics;

        Ok(Self {
            state: Arc::new(Mutex::new(state)),
            watcher: None,
        })
    }

    pub fn path(&self) -> PathBuf {
        self.state.lock().path.clone()
    }

    /// The mod as of the last successful load
    pub fn current_mod(&self) -> Arc<Mod> {
        Arc::clone(&self.state.lock().current)
    }

    pub fn variables(&self) -> BTreeMap<String, Variable> {
        self.state.lock().current.variables.clone()
    }

    /// Warnings of the last successful load
    pub fn diagnostics(&self) -> Diagnostics {
        self.state.lock().diagnostics.clone()
    }

    pub fn register_event_handler(&self, handler: DashboardEventHandler) {
        self.state.lock().event_handlers.push(handler);
    }

    /// Called when a reload triggered by the file watcher fails
    pub fn set_error_handler(&self, handler: WorkspaceErrorHandler) {
        self.state.lock().error_handler = Some(handler);
    }

    /// Sends `event` to every registered handler
    pub fn publish(&self, event: &DashboardEvent) {
        let handlers = self.state.lock().event_handlers.clone();
        for handler in handlers {
            handler(event);
        }
    }

    /// Loads the mod again and returns what changed
    pub fn reload(&self) -> Result<ModDiff, WorkspaceError> {
        reload(&self.state)
    }

    /// Reloads whenever a file the mod is loaded from changes, until the workspace is dropped
    pub fn watch(&mut self) -> Result<(), WorkspaceError> {
        let (path, options) = {
            let state = self.state.lock();
            (state.path.clone(), state.list_options()?)
        };
        let options = ListOptions::new(
            vec![
                format!("**/*.{MOD_DATA_EXTENSION}"),
                format!("**/*.{SQL_EXTENSION}"),
            ],
            options.exclude,
            options.recursive,
        );

        let state = Arc::clone(&self.state);
        let watcher = FileWatcher::new(&path, &options, move |changed| {
            tracing::info!(files = changed.len(), "reloading workspace after file change");
            if let Err(err) = reload(&state) {
                let handler = state.lock().error_handler.clone();
                match handler {
                    Some(handler) => handler(&err),
                    None => tracing::warn!(error = %err, "failed to reload mod from file watcher"),
                }
            }
        })?;
        self.watcher = Some(watcher);
        Ok(())
    }
}

/// Replaces the mod of `state` with a fresh load, keeping the previous mod when the load fails
fn reload(state: &Mutex<WorkspaceState>) -> Result<ModDiff, WorkspaceError> {
    let (result, handlers) = {
        let mut state = state.lock();
        let result = match state.load() {
            Ok((m, diagnostics)) => {
                let diff = state.current.diff(&m);
                state.current = Arc::new(m);
                state.diagnostics = diagnostics;
                Ok(diff)
            }
            Err(err) => Err(err),
        };
        (result, state.event_handlers.clone())
    };

    let event = match &result {
        Ok(diff) => {
            tracing::info!(
                added = diff.added.len(),
                removed = diff.removed.len(),
                changed = diff.changed.len(),
                "workspace reloaded"
            );
            let changed = DashboardChanged::from_diff(diff);
            (!changed.is_empty()).then_some(DashboardEvent::DashboardChanged(changed))
        }
        Err(err) => {
            tracing::warn!(error = %err, "workspace reload failed, keeping previous mod");
            Some(DashboardEvent::WorkspaceError {
                error: error_chain(err),
            })
        }
    };
    if let Some(event) = event {
        for handler in handlers {
            handler(&event);
        }
    }
    result
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(err) = source {
        message.push_str(": ");
        message.push_str(&err.to_string());
        source = err.source();
    }
    message
}

/// Exclusion patterns of the workspace ignore file
fn load_exclusions(root: &Path) -> Result<Vec<String>, WorkspaceError> {
    let path = root.join(WORKSPACE_IGNORE_FILE);
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
        Err(source) => return Err(WorkspaceError::Exclusions { path, source }),
    };

    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| line.trim_start_matches('/').trim_end_matches('/').to_string())
        .collect())
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn write(root: &Path, relative: &str, contents: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    fn recorder(workspace: &Workspace) -> Arc<Mutex<Vec<DashboardEvent>>> {
        let events = Arc::new(Mutex::new(vec![]));
        let sink = Arc::clone(&events);
        workspace.register_event_handler(Arc::new(move |event: &DashboardEvent| {
            sink.lock().push(event.clone())
        }));
        events
    }

    #[test]
    fn reload_reports_dashboard_changes() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "mod.sp", r#"mod "demo" {}"#);
        write(
            dir.path(),
            "dashboards/d1.sp",
            r#"dashboard "d1" { title = "One" }"#,
        );

        let workspace = Workspace::load(dir.path(), BTreeMap::new()).unwrap();
        let events = recorder(&workspace);
        assert!(workspace.current_mod().dashboards.contains_key("demo.dashboard.d1"));

        write(
            dir.path(),
            "dashboards/d1.sp",
            r#"dashboard "d1" { title = "Uno" }
               dashboard "d2" {}"#,
        );
        let diff = workspace.reload().unwrap();
        assert_eq!(diff.added, vec!["demo.dashboard.d2"]);

        let events = events.lock();
        let [DashboardEvent::DashboardChanged(changed)] = events.as_slice() else {
            panic!("expected one change event, got {events:?}");
        };
        assert_eq!(changed.new, vec!["demo.dashboard.d2"]);
        assert_eq!(changed.changed[0].changed_properties, vec!["title"]);
    }

    #[test]
    fn failed_reload_keeps_the_previous_mod() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "queries.sp", r#"query "q1" { sql = "select 1" }"#);

        let workspace = Workspace::load(dir.path(), BTreeMap::new()).unwrap();
        let events = recorder(&workspace);

        write(dir.path(), "queries.sp", r#"query "q1" { sql = var.missing }"#);
        assert!(matches!(
            workspace.reload(),
            Err(WorkspaceError::Load(LoadModError::Decode(_)))
        ));

        assert!(workspace.current_mod().queries.contains_key("local.query.q1"));
        assert!(matches!(
            events.lock().as_slice(),
            [DashboardEvent::WorkspaceError { .. }]
        ));
    }

    #[test]
    fn ignore_file_excludes_folders() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "mod.sp", r#"mod "demo" {}"#);
        write(dir.path(), WORKSPACE_IGNORE_FILE, "# generated\n/build/\n\n");
        write(dir.path(), "build/generated.sp", "this is not = valid hcl");
        write(dir.path(), "src/q.sp", r#"query "q" { sql = "select 1" }"#);

        let workspace = Workspace::load(dir.path(), BTreeMap::new()).unwrap();
        assert_eq!(
            workspace.current_mod().queries.keys().collect::<Vec<_>>(),
            vec!["demo.query.q"]
        );
    }

    #[test]
    fn input_variables_are_applied() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "vars.sp", r#"variable "region" { type = string }"#);

        let inputs = BTreeMap::from([(
            "region".to_string(),
            InputValue::text("eu-west-1", crate::modconfig::ValueSource::Cli),
        )]);
        let workspace = Workspace::load(dir.path(), inputs).unwrap();
        assert_eq!(
            workspace.variables()["local.var.region"].value,
            Some(hcl::Value::from("eu-west-1"))
        );

        let missing = Workspace::load(dir.path(), BTreeMap::new()).unwrap_err();
        assert!(matches!(missing, WorkspaceError::Load(_)));
    }
}
