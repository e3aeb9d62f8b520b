//! Top-level compilation orchestration.
//!
//! One call compiles one (project, build, target) combination: resolve the
//! build's entry file, transform it (recursively pulling in everything it
//! requires), then serialize the accumulated state. All mutable state lives
//! in the [`Session`], so concurrent calls are fully isolated.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::info;

use crate::emit::{self, CompileOutput};
use crate::error::{CompileError, Result};
use crate::graph;
use crate::project::{Build, BuildTarget, Project};
use crate::resolve;
use crate::session::Session;

/// Compile `build` for `target`, with caller-supplied variable overrides
/// merged over the target's bindings.
pub fn compile(
  project: &Project,
  build: &Build,
  target: &BuildTarget,
  overrides: &BTreeMap<String, Value>,
) -> Result<CompileOutput> {
  let mut session = Session::new(project, build, target, overrides);
  info!(project = %project.name, build = %build.name, target = %target.name, "compiling");

  let own = project.own_library();
  let resolved = resolve::resolve_module(
    &build.entry,
    &project.source_root,
    &own,
    &session.libraries,
    &session.search,
  )?
  .ok_or_else(|| CompileError::RootNotFound {
    build: build.name.clone(),
    reference: build.entry.clone(),
  })?;

  let root = graph::compile_root(&mut session, &resolved)?;
  let output = emit::assemble(&session, root);

  info!(modules = output.modules.len(), "compiled");
  Ok(output)
}
