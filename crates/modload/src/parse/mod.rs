//! Turning declaration files into a [Mod](crate::modconfig::Mod)
//!
//! - [run_context]: per-load state, seeding and decode order
//! - [decode]: the fixed-point decode loop and the block decoder
//! - [eval]: expression evaluation with structured unresolved symbols
//! - [load_mod]: listing, decoding and post-processing a mod folder
mod decode;
pub mod eval;
mod load_mod;
pub mod ordering;
pub(crate) mod run_context;
pub mod schema;

pub use decode::DecodeResult;
pub use eval::{EvalError, SymbolTable, UnresolvedKind, UnresolvedSymbol};
pub use load_mod::{
    load_mod, load_variable_file, mod_file_exists, pseudo_resource_name, LoadModError,
};
pub use ordering::{DependencyGraph, OrderingError};
pub use run_context::{
    DecodeBlockGuard, Dependencies, PendingBlock, RunContext, RunContextOptions,
};
