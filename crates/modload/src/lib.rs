//! # modload - mod workspace loader
//!
//! Loads a folder of HCL declaration files ("a mod") into a typed, fully resolved resource graph.
//!
//! ## Introduction for developers
//!
//! Read this to understand how `modload` works internally.
//!
//! ### HCL Terms
//!
//! In hcl terms...
//! - a file gets parsed as a `body`
//! - ...which is just a list of `structures`
//! - ...where there are two kinds:
//!   - `attribute`: a "key = value" pair
//!   - or `block`:
//!     - 1 `identifier` (the block type, e.g. `query`)
//!     - followed by 0 or more `labels` (the resource name)
//!     - and a `body` enclosed in `{` and `}`
//!
//! A small mod:
//! ```hcl
//! mod "demo" {
//!   title = "Demo"
//! }
//!
//! variable "region" {
//!   type    = string
//!   default = "us-east-1"
//! }
//!
//! query "instances" {
//!   sql = "select * from instances where region = '${var.region}'"
//! }
//!
//! benchmark "top" {
//!   children = [control.running]
//! }
//!
//! control "running" {
//!   query = query.instances
//! }
//! ```
//!
//! ### Loading files
//!
//! [listing::ListOptions] selects the declaration files below the mod root (include and exclude globs, flat or
//! recursive). Every file is parsed as a [hcl_edit::structure::Body] and stored in [hcl_documents::HclDocuments],
//! which assigns each root block a stable index and keeps the source text so spans can be turned into line
//! numbers. At this point the files only have to be valid HCL.
//!
//! ### Seeding
//!
//! see [parse::RunContext::seed]
//!
//! Every root block is checked (known block type, label count) and queued under the fully-qualified name of
//! the resource it declares: `<mod>.<type>.<name>`. Names in `children` and `base` attributes are recorded as
//! explicit dependencies.
//!
//! ### Decoding
//!
//! see [parse::RunContext::decode]
//!
//! Decoding runs in passes. Each pass orders the pending blocks ([parse::DependencyGraph]) and decodes them
//! against a snapshot of the symbol table ([parse::SymbolTable]). An expression that references a resource
//! which is not decoded yet does not fail: the evaluator reports it as an [parse::UnresolvedSymbol] and the
//! block is retried in the next pass, ordered after the block that declares the missing name. Once a pass
//! makes no progress, whatever is still pending is reported as an error.
//!
//! ### The resource graph
//!
//! Decoded resources are owned by the [modconfig::Mod], one map per type. Parents and children refer to each
//! other by fully-qualified name, so the whole graph can be walked, diffed and serialized without shared
//! ownership.
//!
//! ### Live reload
//!
//! [workspace::Workspace] keeps the mod of a folder loaded and, with [watcher::FileWatcher], reloads it when
//! its files change, reporting the [modconfig::ModDiff] to registered [events::DashboardEvent] handlers.
pub mod diagnostics;
pub mod events;
pub mod hcl_documents;
pub mod listing;
pub mod modconfig;
pub mod parse;
mod util;
pub mod value;
mod visit;
pub mod watcher;
pub mod workspace;
pub mod workspace_lock;
