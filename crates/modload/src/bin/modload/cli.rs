//! modload cli interface

use clap::{Parser, Subcommand, ValueEnum};
use std::fmt::Formatter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Change the work directory
    ///
    /// Can be specified multiple times. Note that all
    /// paths on the way to the final path must exist.
    ///
    /// This is equivalent to running { cd <directory>; modload ... }
    #[clap(short = 'C', long = "directory", global(true))]
    pub directory: Vec<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load the mod in the work directory and print it
    #[command(alias = "load")]
    Inspect(InspectCommand),

    /// Load the mod and print a change event whenever its files change
    Watch(WatchCommand),

    /// Print debug information for development
    Dev(DevCommand),
}

#[derive(Parser, Debug)]
pub struct InspectCommand {
    #[clap(flatten)]
    pub variables: VariableArgs,

    #[clap(flatten)]
    pub output: OutputArgs,

    /// Print a single resource (fully-qualified name, e.g. `local.query.q1`)
    pub resource: Option<String>,
}

#[derive(Parser, Debug)]
pub struct WatchCommand {
    #[clap(flatten)]
    pub variables: VariableArgs,

    #[clap(flatten)]
    pub output: OutputArgs,
}

#[derive(Parser, Debug)]
pub struct VariableArgs {
    /// Set a variable: `--var name=value`
    ///
    /// Values are parsed according to the declared type of the variable.
    #[clap(long = "var", value_parser = parse_assignment)]
    pub variables: Vec<(String, String)>,

    /// Load variable values from a file of `name = value` attributes
    ///
    /// Values set with --var take precedence.
    #[clap(long = "var-file")]
    pub files: Vec<PathBuf>,
}

fn parse_assignment(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected name=value, got '{value}'")),
    }
}

#[derive(Parser, Debug)]
pub struct OutputArgs {
    #[arg(short = 'F', long = "output-format", default_value_t)]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Clone, Default, Debug)]
pub enum OutputFormat {
    Json,
    #[default]
    Yaml,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Yaml => f.write_str("yaml"),
        }
    }
}

#[derive(Parser, Debug)]
pub struct DevCommand {
    #[command(subcommand)]
    pub command: DevSubCommand,
}

#[derive(Subcommand, Debug)]
pub enum DevSubCommand {
    /// Parsed source documents
    Documents,
    /// Root blocks as seeded for decoding
    Blocks,
    /// Decode order of the first pass
    Order,
}
