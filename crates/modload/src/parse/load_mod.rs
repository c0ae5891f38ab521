//! Loading a mod from its root folder
use super::run_context::RunContext;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::hcl_documents::{HclDocuments, LoadError};
use crate::listing::{ListOptions, MOD_FILE_NAME, SQL_EXTENSION};
use crate::modconfig::{HclResource, InputValue, Mod, Query, ResourceMetadata, ValueSource};
use hcl::eval::Evaluate;
use hcl_edit::repr::Span;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum LoadModError {
    #[error("mod folder {} does not exist", .0.display())]
    NotFound(PathBuf),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("failed to load mod")]
    Decode(#[source] Diagnostics),
    #[error("invalid variables file {}", path.display())]
    Variables {
        path: PathBuf,
        #[source]
        diagnostics: Diagnostics,
    },
}

/// Whether `mod_path` declares a mod file
///
/// A mod file switches to recursive loading and turns `.sql` files into queries.
pub fn mod_file_exists(mod_path: &Path) -> bool {
    mod_path.join(MOD_FILE_NAME).is_file()
}

/// Loads and decodes every declaration file of the mod at `mod_path`
///
/// All problems are collected before failing: the error carries every diagnostic of the load. Warnings of a
/// successful load stay available through [RunContext::diagnostics].
#[tracing::instrument(skip(ctx), fields(path = %mod_path.display()))]
pub fn load_mod(mod_path: &Path, ctx: &mut RunContext) -> Result<Mod, LoadModError> {
    if !mod_path.is_dir() {
        return Err(LoadModError::NotFound(mod_path.to_owned()));
    }

    let has_mod_file = mod_file_exists(mod_path);
    let mut list_options = ctx.options().list_options.clone();
    list_options.recursive |= has_mod_file;

    let mut documents = HclDocuments::default();
    documents.load_directory(mod_path, &list_options)?;
    tracing::info!(files = documents.source_count(), "loaded declaration files");

    ctx.decode(documents);

    if has_mod_file && ctx.options().create_pseudo_resources {
        add_pseudo_resources(mod_path, &list_options, ctx)?;
    }

    let mut m = ctx.take_mod();
    for err in m.build_resource_tree() {
        ctx.log(Diagnostic::error("Invalid resource tree").with_detail(err.to_string()));
    }
    check_dependencies(&m, ctx);

    if ctx.diagnostics().has_errors() {
        return Err(LoadModError::Decode(ctx.diagnostics().clone()));
    }

    tracing::info!(
        name = m.full_name,
        resources = m.resource_count(),
        "mod loaded"
    );
    Ok(m)
}

/// Adds a query for every `.sql` file unless a query of that name is declared
fn add_pseudo_resources(
    mod_path: &Path,
    list_options: &ListOptions,
    ctx: &mut RunContext,
) -> Result<(), LoadModError> {
    let sql_options = ListOptions::new(
        vec![format!("**/*.{SQL_EXTENSION}")],
        list_options.exclude.clone(),
        true,
    );

    for path in sql_options.list_files(mod_path)? {
        let Some(short_name) = pseudo_resource_name(&path) else {
            continue;
        };
        let sql = std::fs::read_to_string(&path).map_err(|source| LoadError::IoError {
            path: path.clone(),
            source,
        })?;
        let line_count = sql.lines().count().max(1);

        let m = ctx.current_mod();
        let mut query = Query::pseudo(&m.short_name, &short_name, sql.clone());
        query.set_metadata(ResourceMetadata {
            resource_name: query.full_name.clone(),
            file_name: Some(path.clone()),
            start_line_number: 1,
            end_line_number: line_count,
            is_auto_generated: true,
            source_definition: sql,
            mod_name: m.short_name.clone(),
            mod_full_name: m.full_name.clone(),
            anonymous: false,
        });

        let name = query.full_name.clone();
        if ctx.current_mod_mut().add_pseudo_resource(query) {
            tracing::trace!(name, path = %path.display(), "pseudo resource added");
        } else {
            tracing::debug!(name, "query declared, skipping pseudo resource");
        }
    }
    Ok(())
}

/// Short name of the query created for a content file: its stem with every character that may not appear in a
/// name replaced by `_`
pub fn pseudo_resource_name(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_string_lossy();
    let mut name: String = stem
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();
    if name.starts_with(|c: char| c.is_ascii_digit() || c == '-') {
        name.insert(0, '_');
    }
    (!name.is_empty()).then_some(name)
}

/// Required mods that the workspace lock does not list are reported as warnings
fn check_dependencies(m: &Mod, ctx: &mut RunContext) {
    let Some(require) = &m.require else {
        return;
    };
    for constraint in &require.mods {
        if ctx.options().workspace_lock.installed(&constraint.name).is_none() {
            ctx.log(
                Diagnostic::warning("Mod dependency not installed")
                    .with_detail(format!(
                        "{constraint} is required by {} but not installed",
                        m.full_name
                    ))
                    .with_subject(constraint.decl_range.clone()),
            );
        }
    }
}

/// Reads a variables file: one `name = value` attribute per variable
pub fn load_variable_file(path: &Path) -> Result<BTreeMap<String, InputValue>, LoadModError> {
    let mut documents = HclDocuments::default();
    documents.load_file(path)?;

    let mut diagnostics = Diagnostics::default();
    for (source_index, _, block) in documents.blocks().map(|(_, block)| block) {
        diagnostics.log(
            Diagnostic::error("Unexpected block")
                .with_detail("variables files may only contain attributes")
                .with_subject(documents.range(source_index, block.span())),
        );
    }

    let mut values = BTreeMap::new();
    for (source_index, _, attribute) in documents.attributes() {
        let expr = hcl::Expression::from(attribute.value.clone());
        match expr.evaluate(&hcl::eval::Context::new()) {
            Ok(value) => {
                values.insert(
                    attribute.key.value().to_string(),
                    InputValue::value(value, ValueSource::File(path.to_owned())),
                );
            }
            Err(err) => diagnostics.log(
                Diagnostic::error("Invalid variable value")
                    .with_detail(err.to_string())
                    .with_subject(documents.range(source_index, attribute.span())),
            ),
        }
    }

    if diagnostics.has_errors() {
        return Err(LoadModError::Variables {
            path: path.to_owned(),
            diagnostics,
        });
    }
    Ok(values)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::listing::MOD_DATA_EXTENSION;
    use crate::parse::RunContextOptions;
    use crate::workspace_lock::WorkspaceLock;
    use pretty_assertions::assert_eq;

    fn context(root: &Path) -> RunContext {
        RunContext::new(RunContextOptions::new(
            root.to_owned(),
            ListOptions::for_extensions(&[MOD_DATA_EXTENSION], false),
        ))
    }

    #[test]
    fn pseudo_resource_names() {
        assert_eq!(
            pseudo_resource_name(Path::new("queries/my query.v2.sql")),
            Some("my_query_v2".to_string())
        );
        assert_eq!(
            pseudo_resource_name(Path::new("2fa.sql")),
            Some("_2fa".to_string())
        );
    }

    #[test]
    fn sql_files_become_queries_in_a_mod() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("mod.sp"), r#"mod "demo" {}"#).unwrap();
        std::fs::create_dir(dir.path().join("queries")).unwrap();
        std::fs::write(
            dir.path().join("queries/declared.sp"),
            r#"query "users" { sql = "select * from declared_users" }"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("queries/users.sql"), "select * from users").unwrap();
        std::fs::write(dir.path().join("queries/groups.sql"), "select * from groups").unwrap();

        let mut ctx = context(dir.path());
        let m = load_mod(dir.path(), &mut ctx).unwrap();

        assert_eq!(
            m.queries.keys().collect::<Vec<_>>(),
            vec!["demo.query.groups", "demo.query.users"]
        );
        assert_eq!(
            m.queries["demo.query.users"].source.sql.as_deref(),
            Some("select * from declared_users")
        );
        let groups = m.queries["demo.query.groups"].metadata.as_ref().unwrap();
        assert!(groups.is_auto_generated);
    }

    #[test]
    fn without_mod_file_only_the_top_level_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("top.sp"), r#"query "top" { sql = "select 1" }"#).unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(
            dir.path().join("nested/deep.sp"),
            r#"query "deep" { sql = "select 1" }"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("ignored.sql"), "select 1").unwrap();

        let mut ctx = context(dir.path());
        let m = load_mod(dir.path(), &mut ctx).unwrap();

        assert_eq!(m.short_name, "local");
        assert_eq!(m.queries.keys().collect::<Vec<_>>(), vec!["local.query.top"]);
    }

    #[test]
    fn errors_fail_the_load() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("broken.sp"),
            r#"
            query "q1" { sql = "select 1" }
            query "q1" { sql = "select 2" }
            "#,
        )
        .unwrap();

        let mut ctx = context(dir.path());
        let Err(LoadModError::Decode(diagnostics)) = load_mod(dir.path(), &mut ctx) else {
            panic!("expected decode error");
        };
        assert_eq!(
            diagnostics.errors().map(|d| d.summary.as_str()).collect::<Vec<_>>(),
            vec!["Duplicate resource"]
        );
    }

    #[test]
    fn missing_dependencies_are_warnings() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("mod.sp"),
            r#"
            mod "demo" {
                require {
                    mod "github.com/acme/common" { version = "1.0" }
                    mod "github.com/acme/extra" { version = "2.0" }
                }
            }
            "#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join(crate::workspace_lock::WORKSPACE_LOCK_FILE),
            r#"{"install_cache": {"mod.demo": {"github.com/acme/common": {"name": "github.com/acme/common", "version": "1.0.3"}}}}"#,
        )
        .unwrap();

        let mut options = RunContextOptions::new(
            dir.path().to_owned(),
            ListOptions::for_extensions(&[MOD_DATA_EXTENSION], false),
        );
        options.workspace_lock = WorkspaceLock::load(dir.path()).unwrap();
        let mut ctx = RunContext::new(options);
        load_mod(dir.path(), &mut ctx).unwrap();

        let warnings: Vec<_> = ctx.diagnostics().warnings().collect();
        assert_eq!(warnings.len(), 1);
        assert_eq!(
            warnings[0].detail.as_deref(),
            Some("github.com/acme/extra@2.0 is required by mod.demo but not installed")
        );
    }

    #[test]
    fn variable_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demo.spvars");
        std::fs::write(&path, "regions = [\"eu-west-1\"]\nlimit = 10\n").unwrap();

        let values = load_variable_file(&path).unwrap();
        assert_eq!(
            values["limit"],
            InputValue::value(10, ValueSource::File(path.clone()))
        );
        assert_eq!(values.len(), 2);

        std::fs::write(&path, "limit = var.other\n").unwrap();
        assert!(matches!(
            load_variable_file(&path),
            Err(LoadModError::Variables { .. })
        ));
    }

    #[test]
    fn missing_folder() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nowhere");
        let mut ctx = context(&missing);
        assert!(matches!(
            load_mod(&missing, &mut ctx),
            Err(LoadModError::NotFound(_))
        ));
    }
}
