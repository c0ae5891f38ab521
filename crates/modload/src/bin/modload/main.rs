mod cli;

use modload::events::DashboardEvent;
use modload::hcl_documents::HclDocuments;
use modload::listing::{ListOptions, MOD_DATA_EXTENSION};
use modload::modconfig::{HclResource, InputValue, ValueSource};
use modload::parse::{mod_file_exists, LoadModError, RunContext, RunContextOptions};
use modload::workspace::{Workspace, WorkspaceError};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

fn main() {
    use clap::Parser;
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("MODLOAD_LOG"))
        .with_writer(std::io::stderr)
        .init();

    for new_path in cli.directory.iter() {
        match new_path.canonicalize() {
            Err(e) => {
                eprintln!(
                    "Failed to resolve path for -C/--directory {}\n{}",
                    new_path.display(),
                    e
                );
                std::process::exit(1);
            }
            Ok(cwd) => {
                if let Err(err) = std::env::set_current_dir(&cwd) {
                    eprintln!("Failed to set work directory to {}\n{}", cwd.display(), err,);
                    std::process::exit(1);
                }

                tracing::info!(directory=%cwd.display(), "Changed working directory");
            }
        }
    }

    let command_result = match cli.command {
        cli::Command::Inspect(inspect_cli) => inspect(inspect_cli),
        cli::Command::Watch(watch_cli) => watch(watch_cli),
        cli::Command::Dev(dev_cli) => dev(dev_cli),
    };

    if let Err(e) = command_result {
        report(&e);
        std::process::exit(1);
    }
}

/// Prints every diagnostic of a failed load, the error chain otherwise
fn report(e: &anyhow::Error) {
    let load_error = match e.downcast_ref::<WorkspaceError>() {
        Some(WorkspaceError::Load(err)) => Some(err),
        _ => e.downcast_ref::<LoadModError>(),
    };
    let diagnostics = match load_error {
        Some(LoadModError::Decode(diagnostics)) => Some(diagnostics),
        Some(LoadModError::Variables { diagnostics, .. }) => Some(diagnostics),
        _ => None,
    };

    match diagnostics {
        Some(diagnostics) => {
            eprintln!("{e}");
            for diagnostic in diagnostics.iter() {
                eprintln!("{diagnostic}");
            }
        }
        None => print_chain(&**e),
    }
}

fn print_chain(err: &(dyn std::error::Error + 'static)) {
    let mut source = Some(err);
    while let Some(err) = source {
        eprintln!("{err}");
        source = err.source();
    }
}

pub fn inspect(cli: cli::InspectCommand) -> anyhow::Result<()> {
    let workspace = load(&cli.variables)?;
    for warning in workspace.diagnostics().warnings() {
        eprintln!("{warning}");
    }

    let m = workspace.current_mod();
    match &cli.resource {
        None => output(&cli.output, m.as_ref())?,
        Some(name) => {
            let Some(resource) = m.resource(name) else {
                anyhow::bail!("mod {} has no resource named '{name}'", m.full_name);
            };
            output(&cli.output, &resource.as_resource().to_value())?
        }
    }
    Ok(())
}

pub fn watch(cli: cli::WatchCommand) -> anyhow::Result<()> {
    let mut workspace = load(&cli.variables)?;

    let format = cli.output;
    workspace.register_event_handler(Arc::new(move |event: &DashboardEvent| {
        if let Err(err) = output(&format, event) {
            tracing::warn!(%err, "failed to print event");
        }
    }));
    workspace.set_error_handler(Arc::new(|err: &WorkspaceError| print_chain(err)));
    workspace.watch()?;

    tracing::info!(path = %workspace.path().display(), "watching for changes, press ctrl-c to stop");
    loop {
        std::thread::park();
    }
}

fn load(args: &cli::VariableArgs) -> anyhow::Result<Workspace> {
    let mut input_variables = BTreeMap::new();
    for path in &args.files {
        input_variables.extend(modload::parse::load_variable_file(path)?);
    }
    for (name, value) in &args.variables {
        input_variables.insert(name.clone(), InputValue::text(value, ValueSource::Cli));
    }

    Ok(Workspace::load(&std::env::current_dir()?, input_variables)?)
}

fn output(output: &cli::OutputArgs, value: &impl Serialize) -> anyhow::Result<()> {
    match output.format {
        cli::OutputFormat::Yaml => serde_yaml::to_writer(std::io::stdout(), value)?,
        cli::OutputFormat::Json => {
            serde_json::to_writer_pretty(std::io::stdout(), value)?;
            println!();
        }
    };

    Ok(())
}

/// (modload-)developer utilities
///
/// A quick way to expose internal structures for debugging purposes
pub fn dev(cli: cli::DevCommand) -> anyhow::Result<()> {
    use cli::DevSubCommand::*;

    let root = std::env::current_dir()?;
    let list_options =
        ListOptions::for_extensions(&[MOD_DATA_EXTENSION], mod_file_exists(&root));
    let mut documents = HclDocuments::default();
    documents.load_directory(&root, &list_options)?;

    if let Documents = cli.command {
        println!("{documents:#?}");
        return Ok(());
    }

    let mut ctx = RunContext::new(RunContextOptions::new(root, list_options));
    ctx.seed(documents);
    for diagnostic in ctx.diagnostics().iter() {
        eprintln!("{diagnostic}");
    }

    match cli.command {
        Documents => {}
        Blocks => {
            for (key, block) in ctx.pending() {
                println!("{key}: {block:?}");
            }
        }
        Order => match ctx.blocks_to_decode() {
            Ok(order) => order.iter().for_each(|key| println!("{key}")),
            Err(err) => {
                for cycle in &err.cycles {
                    println!("cycle: {}", cycle.join(" -> "));
                }
                err.order.iter().for_each(|key| println!("{key}"));
            }
        },
    }

    Ok(())
}
