//! End to end tests: mods written to a temporary folder and loaded with [load_mod]

use modload::diagnostics::Diagnostics;
use modload::hcl_documents::HclDocuments;
use modload::listing::{ListOptions, MOD_DATA_EXTENSION};
use modload::modconfig::{Mod, ResourceRef};
use modload::parse::{load_mod, LoadModError, RunContext, RunContextOptions};
use pretty_assertions::assert_eq;
use std::path::Path;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("MODLOAD_LOG"))
        .with_writer(std::io::stderr)
        .try_init();
}

fn context(root: &Path) -> RunContext {
    RunContext::new(RunContextOptions::new(
        root.to_owned(),
        ListOptions::for_extensions(&[MOD_DATA_EXTENSION], false),
    ))
}

/// Loads `files` (name, contents) as a mod, returning the context for inspection
fn load(files: &[(&str, &str)]) -> (Result<Mod, LoadModError>, RunContext) {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    for (name, contents) in files {
        std::fs::write(dir.path().join(name), contents).unwrap();
    }
    let mut ctx = context(dir.path());
    let result = load_mod(dir.path(), &mut ctx);
    (result, ctx)
}

fn load_ok(source: &str) -> Mod {
    let (result, ctx) = load(&[("mod.sp", source)]);
    match result {
        Ok(m) => m,
        Err(err) => panic!("load failed: {err}\n{:#?}", ctx.diagnostics()),
    }
}

fn load_err(source: &str) -> Diagnostics {
    match load(&[("mod.sp", source)]).0 {
        Err(LoadModError::Decode(diagnostics)) => diagnostics,
        other => panic!("expected decode errors, got {other:?}"),
    }
}

fn resource_names(m: &Mod) -> Vec<String> {
    let mut names = vec![];
    let _ = m.walk_resources(|r| {
        names.push(r.name().to_string());
        std::ops::ControlFlow::Continue(())
    });
    names
}

#[test]
fn forward_reference_chain_resolves() {
    let (result, ctx) = load(&[(
        "chain.sp",
        r#"
        query "q1" { sql = query.q2.sql }
        query "q2" { sql = query.q3.sql }
        query "q3" { sql = query.q4.sql }
        query "q4" { sql = query.q5.sql }
        query "q5" { sql = "select 5" }
        "#,
    )]);

    let m = result.unwrap();
    assert_eq!(
        m.queries["local.query.q1"].source.sql.as_deref(),
        Some("select 5")
    );
    assert!(ctx.passes() <= 5, "took {} passes", ctx.passes());
}

#[test]
fn locals_chain_across_blocks() {
    let m = load_ok(
        r#"
        locals {
            l1 = "${local.l2}-1"
        }
        query "q1" { sql = "select '${local.l1}'" }
        locals {
            l2 = "${local.l3}-2"
            l3 = "${var.v4}-3"
        }
        variable "v4" {
            type    = string
            default = "4"
        }
        "#,
    );
    assert_eq!(
        m.queries["local.query.q1"].source.sql.as_deref(),
        Some("select '4-3-2-1'")
    );
}

#[test]
fn benchmark_cycle_is_an_ordering_error() {
    let diagnostics = load_err(
        r#"
        benchmark "x" { children = [benchmark.y] }
        benchmark "y" { children = [benchmark.x] }
        "#,
    );

    let errors: Vec<_> = diagnostics.errors().collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].summary, "Dependency cycle");
    insta::assert_snapshot!(
        errors[0].detail.as_deref().unwrap_or_default(),
        @"local.benchmark.x, local.benchmark.y depend on each other"
    );
}

#[test]
fn dependents_of_a_cycle_name_the_cycle_member() {
    let diagnostics = load_err(
        r#"
        benchmark "x" { children = [benchmark.y] }
        benchmark "y" { children = [benchmark.x] }
        query "q" { sql = benchmark.x.title }
        "#,
    );

    let errors: Vec<_> = diagnostics.errors().collect();
    insta::assert_debug_snapshot!(
        errors.iter().map(|d| (d.summary.as_str(), d.detail.as_deref())).collect::<Vec<_>>(),
        @r###"
    [
        (
            "Dependency cycle",
            Some(
                "local.benchmark.x, local.benchmark.y depend on each other",
            ),
        ),
        (
            "Failed to resolve dependencies for local.query.q",
            Some(
                "local.benchmark.x is part of a dependency cycle",
            ),
        ),
    ]
    "###
    );
}

#[test]
fn duplicate_names_keep_the_first_declaration() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("a.sp");
    let second = dir.path().join("b.sp");
    std::fs::write(&first, r#"query "q1" { sql = "select 'first'" }"#).unwrap();
    std::fs::write(&second, r#"query "q1" { sql = "select 'second'" }"#).unwrap();

    let mut documents = HclDocuments::default();
    documents.load_file(&first).unwrap();
    documents.load_file(&second).unwrap();
    let mut ctx = context(dir.path());
    ctx.decode(documents);

    let errors: Vec<_> = ctx.diagnostics().errors().collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].summary, "Duplicate resource");
    assert_eq!(
        errors[0].detail.as_deref(),
        Some("mod defines more than one resource named 'local.query.q1'")
    );
    assert_eq!(
        ctx.current_mod().queries["local.query.q1"].source.sql.as_deref(),
        Some("select 'first'")
    );

    // the same files through the loader fail as a whole
    assert!(matches!(
        load_mod(dir.path(), &mut context(dir.path())),
        Err(LoadModError::Decode(_))
    ));
}

#[test]
fn anonymous_names_are_stable() {
    let source = r#"
        dashboard "overview" {
            container {
                card { sql = "select 1" }
                card { sql = "select 2" }
            }
            container {
                chart { sql = "select 3" }
            }
        }
    "#;

    let first = resource_names(&load_ok(source));
    let second = resource_names(&load_ok(source));
    assert_eq!(first, second);
    insta::assert_debug_snapshot!(first, @r###"
    [
        "local.dashboard.overview",
        "local.container.dashboard_overview_anonymous_container_0",
        "local.container.dashboard_overview_anonymous_container_1",
        "local.card.container_dashboard_overview_anonymous_container_0_anonymous_card_0",
        "local.card.container_dashboard_overview_anonymous_container_0_anonymous_card_1",
        "local.chart.container_dashboard_overview_anonymous_container_1_anonymous_chart_0",
    ]
    "###);
}

#[test]
fn base_supplies_unset_properties() {
    let m = load_ok(
        r#"
        card "template" {
            title = "Template"
            width = 6
            sql   = "select 1"
        }
        card "derived" {
            base  = card.template
            title = "Derived"
        }
        "#,
    );

    let derived = &m.cards["local.card.derived"];
    assert_eq!(derived.title.as_deref(), Some("Derived"));
    assert_eq!(derived.width, Some(6));
    assert_eq!(derived.source.sql.as_deref(), Some("select 1"));
}

#[test]
fn a_mod_does_not_differ_from_itself() {
    let m = load_ok(
        r#"
        mod "demo" { title = "Demo" }
        benchmark "b1" { children = [control.c1] }
        control "c1" { sql = "select 1" }
        dashboard "d1" {
            text { value = "hello" }
        }
        "#,
    );

    assert!(!m.diff(&m).has_changes());
    assert!(m.equals(&m));
}

#[test]
fn string_children_resolve_to_the_declared_instance() {
    let m = load_ok(
        r#"
        benchmark "b1" {
            children = ["control.c1"]
        }
        control "c1" {
            sql = "select 1"
        }
        "#,
    );

    let b1 = &m.benchmarks["local.benchmark.b1"];
    assert_eq!(b1.child_names[0], "control.c1");

    let Some(ResourceRef::Control(child)) = m.resource(&b1.children[0]) else {
        panic!("child is not a control");
    };
    assert!(std::ptr::eq(child, &m.controls["local.control.c1"]));
    assert_eq!(child.parents, vec!["local.benchmark.b1"]);
    assert_eq!(m.children, vec!["local.benchmark.b1"]);
    assert_eq!(
        m.paths("local.control.c1"),
        [vec![
            "mod.local".to_string(),
            "local.benchmark.b1".to_string(),
            "local.control.c1".to_string()
        ]]
    );
}

#[test]
fn sql_and_query_together_is_one_error() {
    let diagnostics = load_err(
        r#"
        query "q1" { sql = "select 1" }
        table "t1" {
            sql   = "select 2"
            query = query.q1
        }
        "#,
    );

    let errors: Vec<_> = diagnostics.errors().collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].summary.contains("'SQL'"));
    assert!(errors[0].summary.contains("'query'"));
}

#[test]
fn block_order_does_not_matter() {
    let blocks = [
        r#"query "q1" { sql = "select 1" }"#,
        r#"control "c1" { sql = "select 2" }"#,
        r#"benchmark "b1" { title = "B" }"#,
        r#"variable "v1" { default = 1 }"#,
        r#"dashboard "d1" { card { sql = "select 3" } }"#,
        r#"locals { answer = 42 }"#,
    ];

    let expected = resource_names(&load_ok(&blocks.join("\n")));
    assert_eq!(expected.len(), 7);

    let mut reversed = blocks;
    reversed.reverse();
    assert_eq!(resource_names(&load_ok(&reversed.join("\n"))), expected);

    let mut rotated = blocks;
    rotated.rotate_left(2);
    assert_eq!(resource_names(&load_ok(&rotated.join("\n"))), expected);
}

#[test]
fn unknown_references_fail_after_the_fixed_point() {
    let diagnostics = load_err(
        r#"
        query "q1" { sql = query.nowhere.sql }
        query "q2" { sql = "select 2" }
        "#,
    );
    let errors: Vec<_> = diagnostics.errors().collect();
    insta::assert_debug_snapshot!(
        errors.iter().map(|d| (d.summary.as_str(), d.detail.as_deref())).collect::<Vec<_>>(),
        @r###"
    [
        (
            "Failed to resolve dependencies for local.query.q1",
            Some(
                "Unsupported attribute: local.query.nowhere",
            ),
        ),
    ]
    "###
    );
}
