//! luapack: a source-to-source bundler for Lua project trees.
//!
//! Turns a project plus zero or more libraries into a single self-contained
//! output script and a set of named preload modules:
//! - resolves `require("Library:File")` / `require("File")` references
//!   across project and library boundaries and rewrites them to stable
//!   runtime-loadable keys
//! - expands compile-time conditional directives against build variables
//! - mangles export-marker names so they survive minification
//! - rejects circular module graphs
//! - assigns deterministic synthetic names to files outside the project tree
//!
//! Configuration ([`Project`], [`Build`], [`BuildTarget`]) is consumed as-is
//! from an external loader; writing the produced [`CompileOutput`] to disk is
//! likewise the caller's job.

pub mod compile;
pub mod consts;
pub mod directive;
pub mod emit;
pub mod error;
pub mod extname;
pub mod graph;
pub mod lexer;
pub mod project;
pub mod resolve;
pub mod session;
pub mod transform;

pub use compile::compile;
pub use emit::{BuildFlags, CompileOutput, ModuleOutput};
pub use error::{CompileError, Result};
pub use project::{Build, BuildTarget, Library, Project};
pub use resolve::ModuleSpec;
pub use session::RequireEntry;
