//! Crate-level error type and result alias.
//!
//! Fatal conditions abort the whole compilation; anything recoverable
//! (unresolved references, export markers without a resolvable name) is
//! reported through `tracing` and never surfaces here.

use thiserror::Error;

use crate::resolve::ResolveError;
use crate::transform::TransformError;

pub type Result<T> = std::result::Result<T, CompileError>;

/// Errors that abort a compilation.
#[derive(Debug, Error)]
pub enum CompileError {
  /// The build's own entry file could not be resolved.
  #[error("entry file '{reference}' for build '{build}' not found")]
  RootNotFound { build: String, reference: String },

  /// A module transitively requires itself.
  #[error("circular require of '{file}' (chain: {chain})")]
  Cycle { file: String, chain: String },

  /// Two distinct out-of-tree files hashed to the same synthetic key.
  #[error("synthetic name '{key}' already names '{existing}', clashes with '{path}'")]
  ExternalNameClash {
    key: String,
    existing: String,
    path: String,
  },

  /// Reference resolution failed (explicitly named library missing, etc.).
  #[error(transparent)]
  Resolve(#[from] ResolveError),

  /// Source transformation failed (syntax, directives, helper expansion).
  #[error(transparent)]
  Transform(#[from] TransformError),

  /// A resolved module file could not be read.
  #[error("failed to read '{path}': {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },
}
